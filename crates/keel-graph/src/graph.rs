//! Module dependency graph across repositories

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use keel_core::error::{DiscoveryError, GraphError};
use keel_git::find_repository_root;

use crate::discovery::Descriptor;
use crate::gomod::{Dependency, GoMod, Replace};

/// The capabilities the graph needs from a module
pub trait ModuleNode {
    /// Module path, unique by convention
    fn identity(&self) -> &str;
    /// Required module paths in declaration order
    fn dependencies(&self) -> Vec<&str>;
    /// Directory holding the descriptor
    fn directory(&self) -> &Path;
}

/// A module loaded from a go.mod
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Module {
    /// Module path
    pub identity: String,
    /// Module directory
    pub directory: PathBuf,
    /// go.mod path
    pub descriptor: PathBuf,
    /// Declared requirements
    pub requirements: Vec<Dependency>,
    /// Declared replace directives
    pub replaces: Vec<Replace>,
}

impl Module {
    /// Build a module from a parsed descriptor at `path`
    pub fn from_gomod(path: &Path, gomod: GoMod) -> Self {
        let directory = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            identity: gomod.module,
            directory,
            descriptor: path.to_path_buf(),
            requirements: gomod.require,
            replaces: gomod.replace,
        }
    }

    /// Load a module from a go.mod path
    pub fn load(path: &Path) -> Result<Self, DiscoveryError> {
        let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let gomod = GoMod::load(&path)?;
        Ok(Self::from_gomod(&path, gomod))
    }

    /// Requirements that are not marked `// indirect`
    pub fn direct_requirements(&self) -> impl Iterator<Item = &Dependency> {
        self.requirements.iter().filter(|d| !d.indirect)
    }

    /// Whether the descriptor carries any replace directive
    pub fn has_replaces(&self) -> bool {
        !self.replaces.is_empty()
    }
}

impl From<Descriptor> for Module {
    fn from(descriptor: Descriptor) -> Self {
        Self::from_gomod(&descriptor.path, descriptor.gomod)
    }
}

impl ModuleNode for Module {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn dependencies(&self) -> Vec<&str> {
        self.requirements.iter().map(|d| d.path.as_str()).collect()
    }

    fn directory(&self) -> &Path {
        &self.directory
    }
}

/// A checkout holding one or more modules
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Repository {
    /// Repository root directory
    pub root: PathBuf,
    /// Module identities in identity order
    pub modules: Vec<String>,
}

/// Collects modules, then wires them into a [`DependencyGraph`]
pub struct GraphBuilder<M: ModuleNode = Module> {
    entries: Vec<(PathBuf, M)>,
    errors: Vec<GraphError>,
}

impl<M: ModuleNode> Default for GraphBuilder<M> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            errors: Vec::new(),
        }
    }
}

impl<M: ModuleNode> GraphBuilder<M> {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module, locating its repository by walking up for `.git`.
    ///
    /// A module outside any repository is skipped and recorded as an error.
    pub fn add(&mut self, module: M) -> &mut Self {
        match find_repository_root(module.directory()) {
            Some(root) => self.entries.push((root, module)),
            None => {
                warn!(
                    module = module.identity(),
                    dir = %module.directory().display(),
                    "module is not inside a git repository"
                );
                self.errors
                    .push(GraphError::NoRepository(module.directory().to_path_buf()));
            }
        }
        self
    }

    /// Add a module whose repository root is already known
    pub fn add_in(&mut self, repo_root: impl Into<PathBuf>, module: M) -> &mut Self {
        self.entries.push((repo_root.into(), module));
        self
    }

    /// Index everything collected so far
    #[instrument(skip(self), fields(modules = self.entries.len()))]
    pub fn build(self) -> DependencyGraph<M> {
        let mut entries = self.entries;
        entries.sort_by(|a, b| {
            a.1.directory()
                .as_os_str()
                .cmp(b.1.directory().as_os_str())
        });

        let mut repos: BTreeMap<PathBuf, BTreeMap<String, M>> = BTreeMap::new();
        let mut locations: HashMap<String, BTreeSet<PathBuf>> = HashMap::new();
        let mut by_dir: HashMap<PathBuf, (PathBuf, String)> = HashMap::new();

        for (root, module) in entries {
            let identity = module.identity().to_string();
            let dir = module.directory().to_path_buf();
            locations
                .entry(identity.clone())
                .or_default()
                .insert(dir.clone());

            let modules = repos.entry(root.clone()).or_default();
            if modules.contains_key(&identity) {
                warn!(
                    module = %identity,
                    dir = %dir.display(),
                    "module declared twice in one repository, keeping the first"
                );
                continue;
            }
            by_dir.insert(dir, (root, identity.clone()));
            modules.insert(identity, module);
        }

        let repositories = repos
            .iter()
            .map(|(root, modules)| {
                (
                    root.clone(),
                    Repository {
                        root: root.clone(),
                        modules: modules.keys().cloned().collect(),
                    },
                )
            })
            .collect::<BTreeMap<_, _>>();

        info!(
            repositories = repositories.len(),
            modules = by_dir.len(),
            "dependency graph built"
        );

        DependencyGraph {
            repos,
            locations,
            by_dir,
            repositories,
            errors: self.errors,
        }
    }
}

impl GraphBuilder<Module> {
    /// Load and add a go.mod file
    pub fn load(&mut self, path: &Path) -> Result<&mut Self, DiscoveryError> {
        let module = Module::load(path)?;
        Ok(self.add(module))
    }

    /// Add every discovered descriptor
    pub fn add_descriptors(&mut self, descriptors: impl IntoIterator<Item = Descriptor>) -> &mut Self {
        for descriptor in descriptors {
            self.add(Module::from(descriptor));
        }
        self
    }
}

/// Locally resolvable dependencies of one module
#[derive(Debug, Default)]
pub struct LocalDependencies {
    /// Dependency directories in declaration order
    pub dirs: Vec<PathBuf>,
    /// Dependencies that matched more than one directory
    pub ambiguous: Vec<GraphError>,
}

/// Post-order walk result
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Traversal {
    /// Module directories, dependencies first
    pub order: Vec<PathBuf>,
    /// The same directories grouped by repository root
    pub by_repository: BTreeMap<PathBuf, Vec<PathBuf>>,
    /// Ambiguous identities met during the walk
    #[serde(skip)]
    pub warnings: Vec<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// Modules indexed by repository and by identity
#[derive(Debug)]
pub struct DependencyGraph<M: ModuleNode = Module> {
    repos: BTreeMap<PathBuf, BTreeMap<String, M>>,
    locations: HashMap<String, BTreeSet<PathBuf>>,
    by_dir: HashMap<PathBuf, (PathBuf, String)>,
    repositories: BTreeMap<PathBuf, Repository>,
    errors: Vec<GraphError>,
}

impl<M: ModuleNode> DependencyGraph<M> {
    /// Number of indexed modules
    pub fn len(&self) -> usize {
        self.by_dir.len()
    }

    /// Whether the graph holds no module
    pub fn is_empty(&self) -> bool {
        self.by_dir.is_empty()
    }

    /// Problems recorded while building
    pub fn errors(&self) -> &[GraphError] {
        &self.errors
    }

    /// All modules, by repository then identity
    pub fn modules(&self) -> impl Iterator<Item = &M> {
        self.repos.values().flat_map(|m| m.values())
    }

    /// Repositories in path order
    pub fn repositories(&self) -> impl Iterator<Item = &Repository> {
        self.repositories.values()
    }

    /// Repository rooted at `root`
    pub fn repository(&self, root: &Path) -> Option<&Repository> {
        self.repositories.get(root)
    }

    /// Module whose directory is `dir`
    pub fn module_by_dir(&self, dir: &Path) -> Option<&M> {
        let (root, identity) = self.by_dir.get(dir)?;
        self.repos.get(root)?.get(identity)
    }

    /// Repository owning `module`
    pub fn repository_of(&self, module: &M) -> Option<&Repository> {
        let (root, _) = self.by_dir.get(module.directory())?;
        self.repositories.get(root)
    }

    /// Modules of the repository rooted at `root`, in identity order
    pub fn modules_in(&self, root: &Path) -> impl Iterator<Item = &M> {
        self.repos.get(root).into_iter().flat_map(|m| m.values())
    }

    /// Find the module declaring `identity`.
    ///
    /// `Ok(None)` means the identity is external to the scanned roots.
    pub fn resolve(&self, identity: &str) -> Result<Option<&M>, GraphError> {
        let Some(dirs) = self.locations.get(identity) else {
            return Ok(None);
        };
        if dirs.len() > 1 {
            return Err(GraphError::AmbiguousModule {
                path: identity.to_string(),
                dirs: dirs.iter().cloned().collect(),
            });
        }
        Ok(dirs.iter().next().and_then(|dir| self.module_by_dir(dir)))
    }

    /// Directories of the dependencies of `module` found in the graph
    pub fn local_dependencies(&self, module: &M) -> LocalDependencies {
        let mut result = LocalDependencies::default();
        for identity in module.dependencies() {
            match self.resolve(identity) {
                Ok(Some(dep)) => {
                    let dir = dep.directory().to_path_buf();
                    if !result.dirs.contains(&dir) {
                        result.dirs.push(dir);
                    }
                }
                Ok(None) => {}
                Err(err) => result.ambiguous.push(err),
            }
        }
        result
    }

    /// Dependency identities of `module` that are not in the graph
    pub fn external_dependencies<'a>(&self, module: &'a M) -> Vec<&'a str> {
        module
            .dependencies()
            .into_iter()
            .filter(|id| !self.locations.contains_key(*id))
            .collect()
    }

    /// Directories of other modules strictly inside `module`'s directory
    pub fn nested_module_dirs(&self, module: &M) -> Vec<PathBuf> {
        let base = module.directory();
        let nested: BTreeSet<PathBuf> = self
            .locations
            .values()
            .flatten()
            .filter(|dir| dir.as_path() != base && dir.starts_with(base))
            .cloned()
            .collect();
        nested.into_iter().collect()
    }

    /// Post-order walk from the repository that contains `start`
    #[instrument(skip(self), fields(start = %start.display()))]
    pub fn traverse_from(&self, start: &Path) -> Result<Traversal, GraphError> {
        let start = start.canonicalize().unwrap_or_else(|_| start.to_path_buf());
        let root = self
            .repos
            .keys()
            .filter(|root| start.starts_with(root))
            .max_by_key(|root| root.components().count())
            .ok_or_else(|| GraphError::StartNotInGraph(start.clone()))?;

        self.walk(std::iter::once(root))
    }

    /// Post-order walk over every repository in path order
    pub fn traverse_all(&self) -> Result<Traversal, GraphError> {
        self.walk(self.repos.keys())
    }

    fn walk<'a>(&'a self, roots: impl Iterator<Item = &'a PathBuf>) -> Result<Traversal, GraphError> {
        let mut state = WalkState {
            marks: HashMap::new(),
            stack: Vec::new(),
            traversal: Traversal::default(),
        };

        for root in roots {
            for module in self.modules_in(root) {
                self.visit(module, &mut state)?;
            }
        }

        debug!(modules = state.traversal.order.len(), "traversal complete");
        Ok(state.traversal)
    }

    fn visit(&self, module: &M, state: &mut WalkState) -> Result<(), GraphError> {
        let dir = module.directory().to_path_buf();
        match state.marks.get(&dir) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::InProgress) => return Err(self.cycle_error(&state.stack, &dir)),
            None => {}
        }

        state.marks.insert(dir.clone(), Mark::InProgress);
        state.stack.push(dir.clone());

        let deps = self.local_dependencies(module);
        for err in deps.ambiguous {
            warn!(module = module.identity(), error = %err, "ambiguous dependency");
            state.traversal.warnings.push(err.to_string());
        }
        for dep_dir in &deps.dirs {
            if let Some(dep) = self.module_by_dir(dep_dir) {
                self.visit(dep, state)?;
            }
        }

        state.stack.pop();
        state.marks.insert(dir.clone(), Mark::Done);

        if let Some((root, _)) = self.by_dir.get(&dir) {
            state
                .traversal
                .by_repository
                .entry(root.clone())
                .or_default()
                .push(dir.clone());
        }
        state.traversal.order.push(dir);
        Ok(())
    }

    fn cycle_error(&self, stack: &[PathBuf], reentered: &Path) -> GraphError {
        let start = stack.iter().position(|d| d == reentered).unwrap_or(0);
        let mut modules: Vec<String> = stack[start..]
            .iter()
            .filter_map(|dir| self.module_by_dir(dir))
            .map(|m| m.identity().to_string())
            .collect();
        modules.sort();
        modules.dedup();
        GraphError::Cycle { modules }
    }
}

struct WalkState {
    marks: HashMap<PathBuf, Mark>,
    stack: Vec<PathBuf>,
    traversal: Traversal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Node {
        id: String,
        dir: PathBuf,
        deps: Vec<String>,
    }

    impl ModuleNode for Node {
        fn identity(&self) -> &str {
            &self.id
        }
        fn dependencies(&self) -> Vec<&str> {
            self.deps.iter().map(String::as_str).collect()
        }
        fn directory(&self) -> &Path {
            &self.dir
        }
    }

    fn node(id: &str, dir: &str, deps: &[&str]) -> Node {
        Node {
            id: id.to_string(),
            dir: PathBuf::from(dir),
            deps: deps.iter().map(|d| d.to_string()).collect(),
        }
    }

    fn build(repo: &str, nodes: Vec<Node>) -> DependencyGraph<Node> {
        let mut builder = GraphBuilder::new();
        for n in nodes {
            builder.add_in(repo, n);
        }
        builder.build()
    }

    fn dirs(traversal: &Traversal) -> Vec<&str> {
        traversal
            .order
            .iter()
            .map(|p| p.to_str().unwrap())
            .collect()
    }

    #[test]
    fn test_diamond_emits_shared_dependency_once() {
        let graph = build(
            "/r",
            vec![
                node("ex/top", "/r/top", &["ex/left", "ex/right"]),
                node("ex/left", "/r/left", &["ex/base"]),
                node("ex/right", "/r/right", &["ex/base"]),
                node("ex/base", "/r/base", &[]),
            ],
        );

        let traversal = graph.traverse_all().unwrap();
        let order = dirs(&traversal);
        assert_eq!(order.iter().filter(|d| **d == "/r/base").count(), 1);
        let pos = |d: &str| order.iter().position(|x| *x == d).unwrap();
        assert!(pos("/r/base") < pos("/r/left"));
        assert!(pos("/r/base") < pos("/r/right"));
        assert!(pos("/r/left") < pos("/r/top"));
        assert_eq!(order, vec!["/r/base", "/r/left", "/r/right", "/r/top"]);
    }

    #[test]
    fn test_cycle_names_exactly_the_cycle() {
        let graph = build(
            "/r",
            vec![
                node("ex/a", "/r/a", &["ex/b"]),
                node("ex/b", "/r/b", &["ex/c"]),
                node("ex/c", "/r/c", &["ex/b"]),
                node("ex/d", "/r/d", &[]),
            ],
        );

        match graph.traverse_all() {
            Err(GraphError::Cycle { modules }) => {
                assert_eq!(modules, vec!["ex/b".to_string(), "ex/c".to_string()])
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let graph = build("/r", vec![node("ex/a", "/r/a", &["ex/a"])]);
        assert!(matches!(
            graph.traverse_all(),
            Err(GraphError::Cycle { modules }) if modules == vec!["ex/a".to_string()]
        ));
    }

    #[test]
    fn test_external_dependencies_are_dropped() {
        let graph = build(
            "/r",
            vec![node("ex/a", "/r/a", &["github.com/pkg/errors", "ex/b"]), node("ex/b", "/r/b", &[])],
        );
        let a = graph.module_by_dir(Path::new("/r/a")).unwrap();
        let deps = graph.local_dependencies(a);
        assert_eq!(deps.dirs, vec![PathBuf::from("/r/b")]);
        assert!(deps.ambiguous.is_empty());
        assert_eq!(graph.external_dependencies(a), vec!["github.com/pkg/errors"]);
        assert!(graph.resolve("github.com/pkg/errors").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_identity_is_ambiguous_only_when_referenced() {
        let mut builder = GraphBuilder::new();
        builder
            .add_in("/r1", node("ex/dup", "/r1/dup", &[]))
            .add_in("/r2", node("ex/dup", "/r2/dup", &[]))
            .add_in("/r1", node("ex/user", "/r1/user", &["ex/dup"]))
            .add_in("/r1", node("ex/alone", "/r1/alone", &[]));
        let graph = builder.build();

        assert_eq!(graph.len(), 4);
        assert!(matches!(
            graph.resolve("ex/dup"),
            Err(GraphError::AmbiguousModule { ref dirs, .. }) if dirs.len() == 2
        ));

        let traversal = graph.traverse_all().unwrap();
        assert_eq!(traversal.warnings.len(), 1);
        assert!(traversal.order.contains(&PathBuf::from("/r1/user")));
    }

    #[test]
    fn test_duplicate_within_repository_keeps_first_path() {
        let mut builder = GraphBuilder::new();
        builder
            .add_in("/r", node("ex/dup", "/r/z", &[]))
            .add_in("/r", node("ex/dup", "/r/a", &[]));
        let graph = builder.build();

        assert_eq!(graph.len(), 1);
        assert!(graph.module_by_dir(Path::new("/r/a")).is_some());
        assert!(graph.module_by_dir(Path::new("/r/z")).is_none());
    }

    #[test]
    fn test_duplicate_within_repository_orders_by_path_string() {
        let mut builder = GraphBuilder::new();
        builder
            .add_in("/r", node("ex/dup", "/r/a/b", &[]))
            .add_in("/r", node("ex/dup", "/r/a-y", &[]));
        let graph = builder.build();

        assert!(graph.module_by_dir(Path::new("/r/a-y")).is_some());
        assert!(graph.module_by_dir(Path::new("/r/a/b")).is_none());
    }

    #[test]
    fn test_traversal_crosses_repositories() {
        let mut builder = GraphBuilder::new();
        builder
            .add_in("/app", node("ex/app", "/app", &["ex/lib"]))
            .add_in("/lib", node("ex/lib", "/lib", &[]));
        let graph = builder.build();

        let traversal = graph.traverse_from(Path::new("/app")).unwrap();
        assert_eq!(dirs(&traversal), vec!["/lib", "/app"]);
        assert_eq!(traversal.by_repository.len(), 2);
        assert_eq!(
            traversal.by_repository[&PathBuf::from("/lib")],
            vec![PathBuf::from("/lib")]
        );
    }

    #[test]
    fn test_traverse_from_unknown_start() {
        let graph = build("/r", vec![node("ex/a", "/r/a", &[])]);
        assert!(matches!(
            graph.traverse_from(Path::new("/elsewhere")),
            Err(GraphError::StartNotInGraph(_))
        ));
    }

    #[test]
    fn test_traversal_is_deterministic_regardless_of_insertion_order() {
        let nodes = vec![
            node("ex/c", "/r/c", &["ex/a"]),
            node("ex/a", "/r/a", &[]),
            node("ex/b", "/r/b", &["ex/a"]),
        ];
        let mut reversed = nodes.clone();
        reversed.reverse();

        let first = build("/r", nodes).traverse_all().unwrap();
        let second = build("/r", reversed).traverse_all().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_nested_module_dirs() {
        let graph = build(
            "/r",
            vec![
                node("ex/root", "/r", &[]),
                node("ex/root/sub", "/r/sub", &[]),
                node("ex/root/sub/deep", "/r/sub/deep", &[]),
                node("ex/other", "/r2", &[]),
            ],
        );
        let root = graph.module_by_dir(Path::new("/r")).unwrap();
        assert_eq!(
            graph.nested_module_dirs(root),
            vec![PathBuf::from("/r/sub"), PathBuf::from("/r/sub/deep")]
        );

        let repo = graph.repository_of(root).unwrap();
        assert_eq!(repo.modules.len(), 4);
        assert_eq!(graph.modules_in(Path::new("/r")).count(), 4);
    }

    #[test]
    fn test_module_without_repository_is_recorded() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut builder = GraphBuilder::new();
        builder.add(node("ex/loose", temp.path().to_str().unwrap(), &[]));
        let graph = builder.build();

        assert!(graph.is_empty());
        assert!(matches!(graph.errors()[0], GraphError::NoRepository(_)));
    }
}

//! Exported API surface of a Go package, extracted from tree-sitter trees

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;
use tree_sitter::Node;

/// Kind of an exported object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Type,
    Interface,
    Func,
    Const,
    Var,
    Method,
    Field,
}

impl ObjectKind {
    /// Prefix used when describing a change
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Type => "type",
            Self::Interface => "interface",
            Self::Func => "func",
            Self::Const => "const",
            Self::Var => "var",
            Self::Method => "method",
            Self::Field => "field",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// One exported object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiObject {
    /// Display name (`F`, `T`, `T.M`, `T.Field`)
    pub name: String,
    /// Object kind
    pub kind: ObjectKind,
    /// Normalized signature with parameter names dropped
    pub signature: String,
    /// Constant value expression
    pub value: Option<String>,
    /// Owning type for methods and fields
    pub owner: Option<String>,
}

/// A type declared in the package, exported or not
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalType {
    /// `type A = B` rather than `type A B`
    pub alias: bool,
    /// Type parameter list, empty when not generic
    pub type_params: String,
    /// Normalized type expression on the right-hand side
    pub underlying: String,
}

impl LocalType {
    /// Declaration form used in resolved signatures
    pub fn describe(&self) -> String {
        let form = if self.alias { "alias" } else { "defined" };
        format!("{}{} {}", form, self.type_params, self.underlying)
    }

    /// Underlying shape with struct and interface members folded away.
    ///
    /// Member changes are reported on the members themselves.
    pub fn shape(&self) -> &str {
        if self.underlying.starts_with("struct{") {
            "struct"
        } else if self.underlying.starts_with("interface{") {
            "interface"
        } else {
            &self.underlying
        }
    }

    /// `alias` or `defined type`
    pub fn form(&self) -> &'static str {
        if self.alias {
            "alias"
        } else {
            "defined type"
        }
    }
}

/// Exported surface of one package
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PackageApi {
    /// Import path
    pub import_path: String,
    /// Package clause name
    pub name: String,
    /// Exported objects keyed by identity
    pub objects: BTreeMap<String, ApiObject>,
    /// Every declared type, for resolving signatures
    pub types: BTreeMap<String, LocalType>,
    /// Interfaces with unexported methods; nobody outside can implement them
    pub sealed: BTreeSet<String>,
}

impl PackageApi {
    /// Empty surface for `import_path`
    pub fn new(import_path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            import_path: import_path.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Object by display name
    pub fn find(&self, name: &str) -> Option<&ApiObject> {
        self.objects.values().find(|o| o.name == name)
    }

    /// Kind of the object named `name`
    pub fn kind_of(&self, name: &str) -> Option<ObjectKind> {
        self.find(name).map(|o| o.kind)
    }

    /// Whether `interface` has unexported methods
    pub fn is_sealed(&self, interface: &str) -> bool {
        self.sealed.contains(interface)
    }

    /// Package-local types referenced by `signature`
    pub fn referenced_types<'a>(&self, signature: &'a str) -> BTreeSet<&'a str> {
        identifiers(signature)
            .filter(|id| self.types.contains_key(*id))
            .collect()
    }

    /// Signature annotated with the declaration of every package-local type
    /// it mentions, one level deep
    pub fn resolved(&self, object: &ApiObject) -> String {
        let own = matches!(object.kind, ObjectKind::Type | ObjectKind::Interface)
            .then_some(object.name.as_str());
        let notes: Vec<String> = self
            .referenced_types(&object.signature)
            .into_iter()
            .filter(|id| Some(*id) != own)
            .filter_map(|id| self.types.get(id).map(|t| format!("{} = {}", id, t.describe())))
            .collect();

        if notes.is_empty() {
            object.signature.clone()
        } else {
            format!("{} where {}", object.signature, notes.join("; "))
        }
    }

    /// Add the declarations of one parsed file
    pub fn extract_file(&mut self, root: Node, src: &[u8]) {
        let mut cursor = root.walk();
        for decl in root.named_children(&mut cursor) {
            match decl.kind() {
                "function_declaration" => self.add_function(decl, src),
                "method_declaration" => self.add_method(decl, src),
                "type_declaration" => self.add_types(decl, src),
                "const_declaration" => self.add_consts(decl, src),
                "var_declaration" => self.add_vars(decl, src),
                _ => {}
            }
        }
    }

    fn insert(&mut self, key: String, object: ApiObject) {
        self.objects.insert(key, object);
    }

    fn add_function(&mut self, decl: Node, src: &[u8]) {
        let Some(name) = decl.child_by_field_name("name").map(|n| text(n, src)) else {
            return;
        };
        if !is_exported(&name) {
            return;
        }
        self.insert(
            name.clone(),
            ApiObject {
                name,
                kind: ObjectKind::Func,
                signature: func_signature(decl, src),
                value: None,
                owner: None,
            },
        );
    }

    fn add_method(&mut self, decl: Node, src: &[u8]) {
        let Some(name) = decl.child_by_field_name("name").map(|n| text(n, src)) else {
            return;
        };
        let Some(receiver) = decl
            .child_by_field_name("receiver")
            .and_then(|list| named_children(list).into_iter().find(|p| p.kind() == "parameter_declaration"))
            .and_then(|p| p.child_by_field_name("type"))
        else {
            return;
        };

        let receiver = render(receiver, src);
        let pointer = receiver.starts_with('*');
        let base = base_type_name(&receiver).to_string();
        if !is_exported(&base) || !is_exported(&name) {
            return;
        }

        let signature = format!(
            "({}{}) {}",
            if pointer { "*" } else { "" },
            base,
            func_signature(decl, src)
        );
        let display = format!("{}.{}", base, name);
        self.insert(
            display.clone(),
            ApiObject {
                name: display,
                kind: ObjectKind::Method,
                signature,
                value: None,
                owner: Some(base),
            },
        );
    }

    fn add_types(&mut self, decl: Node, src: &[u8]) {
        for spec in named_children(decl) {
            let alias = match spec.kind() {
                "type_spec" => false,
                "type_alias" => true,
                _ => continue,
            };
            let (Some(name), Some(ty)) = (
                spec.child_by_field_name("name").map(|n| text(n, src)),
                spec.child_by_field_name("type"),
            ) else {
                continue;
            };
            let type_params = spec
                .child_by_field_name("type_parameters")
                .map(|n| render(n, src))
                .unwrap_or_default();

            self.types.insert(
                name.clone(),
                LocalType {
                    alias,
                    type_params: type_params.clone(),
                    underlying: render(ty, src),
                },
            );
            if !is_exported(&name) {
                continue;
            }

            let (kind, shape) = match ty.kind() {
                "struct_type" if !alias => {
                    self.add_fields(&name, ty, src);
                    (ObjectKind::Type, "struct".to_string())
                }
                "interface_type" if !alias => {
                    let embeds = self.add_interface_methods(&name, ty, src);
                    let shape = if embeds.is_empty() {
                        "interface".to_string()
                    } else {
                        format!("interface embedding {}", embeds.join(", "))
                    };
                    (ObjectKind::Interface, shape)
                }
                _ => (ObjectKind::Type, render(ty, src)),
            };

            let mut signature = String::new();
            if !type_params.is_empty() {
                signature.push_str(&type_params);
                signature.push(' ');
            }
            if alias {
                signature.push_str("= ");
            }
            signature.push_str(&shape);

            self.insert(
                name.clone(),
                ApiObject {
                    name,
                    kind,
                    signature,
                    value: None,
                    owner: None,
                },
            );
        }
    }

    fn add_fields(&mut self, owner: &str, struct_type: Node, src: &[u8]) {
        let Some(list) = named_children(struct_type)
            .into_iter()
            .find(|n| n.kind() == "field_declaration_list")
        else {
            return;
        };

        for field in named_children(list) {
            if field.kind() != "field_declaration" {
                continue;
            }
            let Some(ty) = field.child_by_field_name("type") else {
                continue;
            };
            let ty_text = render(ty, src);
            let tag = field.child_by_field_name("tag").map(|t| text(t, src));

            let mut cursor = field.walk();
            let names: Vec<String> = field
                .children_by_field_name("name", &mut cursor)
                .map(|n| text(n, src))
                .collect();

            let members: Vec<(String, String)> = if names.is_empty() {
                let mut cursor = field.walk();
                let pointer = field.children(&mut cursor).any(|c| c.kind() == "*");
                let embedded = base_type_name(&ty_text).to_string();
                let sig = format!("embedded {}{}", if pointer { "*" } else { "" }, ty_text);
                vec![(embedded, sig)]
            } else {
                names.into_iter().map(|n| (n, ty_text.clone())).collect()
            };

            for (name, signature) in members {
                if !is_exported(&name) {
                    continue;
                }
                let display = format!("{}.{}", owner, name);
                let key = match &tag {
                    Some(tag) => format!("{} {}", display, tag),
                    None => display.clone(),
                };
                self.insert(
                    key,
                    ApiObject {
                        name: display,
                        kind: ObjectKind::Field,
                        signature,
                        value: None,
                        owner: Some(owner.to_string()),
                    },
                );
            }
        }
    }

    fn add_interface_methods(&mut self, owner: &str, interface: Node, src: &[u8]) -> Vec<String> {
        let mut embeds = Vec::new();
        for elem in named_children(interface) {
            match elem.kind() {
                "method_elem" | "method_spec" => {
                    let Some(name) = elem.child_by_field_name("name").map(|n| text(n, src)) else {
                        continue;
                    };
                    if !is_exported(&name) {
                        self.sealed.insert(owner.to_string());
                        continue;
                    }
                    let display = format!("{}.{}", owner, name);
                    self.insert(
                        display.clone(),
                        ApiObject {
                            name: display,
                            kind: ObjectKind::Method,
                            signature: func_signature(elem, src),
                            value: None,
                            owner: Some(owner.to_string()),
                        },
                    );
                }
                "comment" => {}
                _ => embeds.push(render(elem, src)),
            }
        }
        embeds
    }

    fn add_consts(&mut self, decl: Node, src: &[u8]) {
        let mut prev_values: Vec<Node> = Vec::new();
        let mut prev_type: Option<String> = None;

        for (index, spec) in named_children(decl)
            .into_iter()
            .filter(|s| s.kind() == "const_spec")
            .enumerate()
        {
            let ty = spec.child_by_field_name("type").map(|t| render(t, src));
            // A spec without values repeats the previous expression list
            let (ty, values) = match spec.child_by_field_name("value") {
                Some(value) => {
                    prev_values = expressions(value);
                    prev_type = ty.clone();
                    (ty, prev_values.clone())
                }
                None => (prev_type.clone(), prev_values.clone()),
            };

            for (i, name) in spec_names(spec, src).into_iter().enumerate() {
                if !is_exported(&name) {
                    continue;
                }
                let expr = values.get(i).copied();
                let mut value = expr.map(|e| render(e, src)).unwrap_or_default();
                if identifiers(&value).any(|id| id == "iota") {
                    value = format!("{} (iota={})", value, index);
                }
                let signature = ty.clone().unwrap_or_else(|| match expr.and_then(literal_type) {
                    Some(t) => format!("untyped {}", t),
                    None => "untyped".to_string(),
                });
                self.insert(
                    name.clone(),
                    ApiObject {
                        name,
                        kind: ObjectKind::Const,
                        signature,
                        value: Some(value),
                        owner: None,
                    },
                );
            }
        }
    }

    fn add_vars(&mut self, decl: Node, src: &[u8]) {
        let mut specs = Vec::new();
        for child in named_children(decl) {
            match child.kind() {
                "var_spec" => specs.push(child),
                "var_spec_list" => specs.extend(
                    named_children(child)
                        .into_iter()
                        .filter(|s| s.kind() == "var_spec"),
                ),
                _ => {}
            }
        }

        for spec in specs {
            let ty = spec.child_by_field_name("type").map(|t| render(t, src));
            let values = spec
                .child_by_field_name("value")
                .map(expressions)
                .unwrap_or_default();

            for (i, name) in spec_names(spec, src).into_iter().enumerate() {
                if !is_exported(&name) {
                    continue;
                }
                let signature = ty.clone().unwrap_or_else(|| {
                    values
                        .get(i)
                        .map(|v| inferred_type(*v, src))
                        .unwrap_or_else(|| "unknown".to_string())
                });
                self.insert(
                    name.clone(),
                    ApiObject {
                        name,
                        kind: ObjectKind::Var,
                        signature,
                        value: None,
                        owner: None,
                    },
                );
            }
        }
    }
}

/// Whether a Go identifier is exported
pub fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

/// Identifiers in a rendered type, skipping package qualifiers and
/// selector members
pub fn identifiers(text: &str) -> impl Iterator<Item = &str> {
    let bytes = text.as_bytes();
    let mut found = Vec::new();
    let mut start: Option<usize> = None;

    for (i, c) in text.char_indices().chain(std::iter::once((text.len(), ' '))) {
        let ident_char = c.is_alphanumeric() || c == '_';
        match (start, ident_char) {
            (None, true) => start = Some(i),
            (Some(s), false) => {
                let word = &text[s..i];
                let qualified_member = s > 0 && bytes[s - 1] == b'.';
                let qualifier = c == '.';
                let leading_digit = word.starts_with(|ch: char| ch.is_ascii_digit());
                if !qualified_member && !qualifier && !leading_digit {
                    found.push(word);
                }
                start = None;
            }
            _ => {}
        }
    }
    found.into_iter()
}

/// `*pkg.Name[T]` → `Name`
fn base_type_name(text: &str) -> &str {
    let text = text.trim_start_matches('*');
    let text = text.split('[').next().unwrap_or(text);
    text.rsplit('.').next().unwrap_or(text).trim()
}

fn text(node: Node, src: &[u8]) -> String {
    node.utf8_text(src).unwrap_or_default().to_string()
}

fn named_children(node: Node) -> Vec<Node> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

fn spec_names(spec: Node, src: &[u8]) -> Vec<String> {
    let mut cursor = spec.walk();
    spec.children_by_field_name("name", &mut cursor)
        .map(|n| text(n, src))
        .collect()
}

fn expressions(value: Node) -> Vec<Node> {
    if value.kind() == "expression_list" {
        named_children(value)
            .into_iter()
            .filter(|n| n.kind() != "comment")
            .collect()
    } else {
        vec![value]
    }
}

fn literal_type(expr: Node) -> Option<&'static str> {
    match expr.kind() {
        "int_literal" => Some("int"),
        "float_literal" => Some("float"),
        "imaginary_literal" => Some("complex"),
        "rune_literal" => Some("rune"),
        "interpreted_string_literal" | "raw_string_literal" => Some("string"),
        "true" | "false" => Some("bool"),
        _ => None,
    }
}

fn inferred_type(expr: Node, src: &[u8]) -> String {
    if let Some(t) = literal_type(expr) {
        return match t {
            "float" => "float64".to_string(),
            "complex" => "complex128".to_string(),
            other => other.to_string(),
        };
    }
    match expr.kind() {
        "composite_literal" => expr
            .child_by_field_name("type")
            .map(|t| render(t, src))
            .unwrap_or_else(|| "unknown".to_string()),
        "unary_expression" => {
            let operand = expr.child_by_field_name("operand");
            let is_address = expr
                .child_by_field_name("operator")
                .is_some_and(|op| text(op, src) == "&");
            match operand {
                Some(inner) if is_address => format!("*{}", inferred_type(inner, src)),
                _ => "unknown".to_string(),
            }
        }
        "func_literal" => func_signature(expr, src),
        "call_expression" => expr
            .child_by_field_name("function")
            .map(|f| format!("result of {}", render(f, src)))
            .unwrap_or_else(|| "unknown".to_string()),
        _ => "unknown".to_string(),
    }
}

/// `func[T any](string, ...int) (int, error)` with parameter names dropped
pub(crate) fn func_signature(node: Node, src: &[u8]) -> String {
    let type_params = node
        .child_by_field_name("type_parameters")
        .map(|n| render(n, src))
        .unwrap_or_default();
    let params = node
        .child_by_field_name("parameters")
        .map(|n| parameter_types(n, src))
        .unwrap_or_default();
    let results = match node.child_by_field_name("result") {
        None => String::new(),
        Some(list) if list.kind() == "parameter_list" => {
            let types = parameter_types(list, src);
            match types.len() {
                0 => String::new(),
                1 => format!(" {}", types[0]),
                _ => format!(" ({})", types.join(", ")),
            }
        }
        Some(single) => format!(" {}", render(single, src)),
    };
    format!("func{}({}){}", type_params, params.join(", "), results)
}

fn parameter_types(list: Node, src: &[u8]) -> Vec<String> {
    let mut types = Vec::new();
    for param in named_children(list) {
        match param.kind() {
            "parameter_declaration" => {
                let Some(ty) = param.child_by_field_name("type").map(|t| render(t, src)) else {
                    continue;
                };
                let mut cursor = param.walk();
                let names = param.children_by_field_name("name", &mut cursor).count();
                for _ in 0..names.max(1) {
                    types.push(ty.clone());
                }
            }
            "variadic_parameter_declaration" => {
                if let Some(ty) = param.child_by_field_name("type") {
                    types.push(format!("...{}", render(ty, src)));
                }
            }
            _ => {}
        }
    }
    types
}

/// Normalized source text of a node: comments dropped, whitespace
/// canonicalized, line breaks inside braces turned into `;`
pub(crate) fn render(node: Node, src: &[u8]) -> String {
    let mut tokens = Vec::new();
    collect_tokens(node, src, &mut tokens);

    let mut out = String::new();
    let mut prev: Option<&str> = None;
    for tok in &tokens {
        if let Some(p) = prev {
            if needs_space(p, tok) {
                out.push(' ');
            }
        }
        out.push_str(tok);
        prev = Some(tok);
    }

    out.replace("{; ", "{").replace("{;", "{").replace(";}", "}")
}

fn collect_tokens(node: Node, src: &[u8], out: &mut Vec<String>) {
    let kind = node.kind();
    if kind == "comment" {
        return;
    }
    if node.child_count() == 0 || kind.ends_with("string_literal") {
        let tok = node.utf8_text(src).unwrap_or_default().trim();
        if tok.is_empty() {
            // Newline terminators between struct and interface members
            if out.last().is_some_and(|t| t != ";" && t != "{") {
                out.push(";".to_string());
            }
        } else {
            out.push(tok.to_string());
        }
        return;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_tokens(child, src, out);
    }
}

fn needs_space(prev: &str, next: &str) -> bool {
    if matches!(next, ")" | "]" | "," | ";" | "." | "}" | "(" | "[") {
        return false;
    }
    if matches!(prev, "(" | "[" | "]" | "*" | "." | "..." | "~" | "{" | "&" | "<-") {
        return false;
    }
    !(next == "{" && matches!(prev, "struct" | "interface"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tree_sitter::Parser;

    fn extract(source: &str) -> PackageApi {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_go::LANGUAGE.into())
            .unwrap();
        let tree = parser.parse(source, None).unwrap();
        assert!(!tree.root_node().has_error(), "fixture must parse");
        let mut api = PackageApi::new("example.com/p", "p");
        api.extract_file(tree.root_node(), source.as_bytes());
        api
    }

    fn sig<'a>(api: &'a PackageApi, name: &str) -> &'a str {
        &api.find(name).unwrap().signature
    }

    #[test]
    fn test_function_signatures_drop_names() {
        let api = extract(
            r#"package p

func Parse(s string, n, m int) error { return nil }
func Split(xs ...string) (head string, tail []string) { return "", nil }
func Map[T any](v T) T { return v }
func hidden() {}
"#,
        );
        assert_eq!(sig(&api, "Parse"), "func(string, int, int) error");
        assert_eq!(sig(&api, "Split"), "func(...string) (string, []string)");
        assert_eq!(sig(&api, "Map"), "func[T any](T) T");
        assert!(api.find("hidden").is_none());
    }

    #[test]
    fn test_types_fields_and_methods() {
        let api = extract(
            r#"package p

// Config holds settings
type Config struct {
    Name string `json:"name"`
    Port int // listen port
    inner bool
    *Base
}

type Base struct{}

type ID = string

type Reader interface {
    Read(p []byte) (int, error)
    close()
}

func (c *Config) Validate() error { return nil }
func (b Base) Kind() string { return "" }
func (c *config) Ignored() {}
"#,
        );

        assert_eq!(api.kind_of("Config"), Some(ObjectKind::Type));
        assert_eq!(sig(&api, "Config"), "struct");
        assert_eq!(sig(&api, "Config.Name"), "string");
        assert_eq!(sig(&api, "Config.Port"), "int");
        assert_eq!(sig(&api, "Config.Base"), "embedded *Base");
        assert!(api.find("Config.inner").is_none());
        assert!(api.objects.contains_key("Config.Name `json:\"name\"`"));

        assert_eq!(sig(&api, "ID"), "= string");
        assert!(api.types["ID"].alias);

        assert_eq!(api.kind_of("Reader"), Some(ObjectKind::Interface));
        assert_eq!(sig(&api, "Reader.Read"), "func([]byte) (int, error)");
        assert!(api.is_sealed("Reader"));

        assert_eq!(sig(&api, "Config.Validate"), "(*Config) func() error");
        assert_eq!(sig(&api, "Base.Kind"), "(Base) func() string");
        assert!(api.find("config.Ignored").is_none());
    }

    #[test]
    fn test_constants_inherit_iota() {
        let api = extract(
            r#"package p

const (
    Low Level = iota
    Mid
    High
)

const Name = "p"

type Level int
"#,
        );
        assert_eq!(api.find("Low").unwrap().value.as_deref(), Some("iota (iota=0)"));
        assert_eq!(api.find("High").unwrap().value.as_deref(), Some("iota (iota=2)"));
        assert_eq!(sig(&api, "Mid"), "Level");
        assert_eq!(sig(&api, "Name"), "untyped string");
        assert_eq!(api.find("Name").unwrap().value.as_deref(), Some("\"p\""));
    }

    #[test]
    fn test_variable_types() {
        let api = extract(
            r#"package p

import "errors"

var ErrClosed = errors.New("closed")
var Default = &Config{}
var Limit int
var Count = 3

type Config struct{}
"#,
        );
        assert_eq!(sig(&api, "ErrClosed"), "result of errors.New");
        assert_eq!(sig(&api, "Default"), "*Config");
        assert_eq!(sig(&api, "Limit"), "int");
        assert_eq!(sig(&api, "Count"), "int");
    }

    #[test]
    fn test_resolved_signature_annotates_local_types() {
        let api = extract(
            r#"package p

import "io"

type Mode int

func Open(m Mode, r io.Reader) error { return nil }
"#,
        );
        let open = api.find("Open").unwrap();
        assert_eq!(open.signature, "func(Mode, io.Reader) error");
        assert_eq!(
            api.resolved(open),
            "func(Mode, io.Reader) error where Mode = defined int"
        );
    }

    #[test]
    fn test_identifiers_skip_qualified_names() {
        let ids: Vec<&str> = identifiers("func(io.Reader, map[string]T) *pkg.Name").collect();
        assert_eq!(ids, vec!["func", "map", "string", "T"]);
    }

    #[test]
    fn test_render_normalizes_whitespace_and_comments() {
        let api = extract(
            "package p\n\ntype Pair struct {\n\tA  int // first\n\tB map[string] []byte\n}\n",
        );
        assert_eq!(api.types["Pair"].underlying, "struct{A int; B map[string][]byte}");
        assert_eq!(api.types["Pair"].shape(), "struct");
    }
}

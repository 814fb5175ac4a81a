//! Raw structural diff between two package surfaces

use serde::Serialize;

use crate::surface::{ObjectKind, PackageApi};

/// One difference, before classification and correction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawChange {
    /// Display name of the object concerned
    pub object: String,
    /// `<obj>: removed`, `<obj>: added`, `<obj>: changed from X to Y` or
    /// `<obj>: value changed from X to Y`
    pub message: String,
    /// Whether existing clients keep compiling
    pub compatible: bool,
}

impl RawChange {
    fn removed(object: &str) -> Self {
        Self {
            object: object.to_string(),
            message: format!("{}: removed", object),
            compatible: false,
        }
    }

    fn added(object: &str, compatible: bool) -> Self {
        Self {
            object: object.to_string(),
            message: format!("{}: added", object),
            compatible,
        }
    }

    fn changed(object: &str, from: &str, to: &str) -> Self {
        Self {
            object: object.to_string(),
            message: format!("{}: changed from {} to {}", object, from, to),
            compatible: false,
        }
    }

    fn value_changed(object: &str, from: &str, to: &str) -> Self {
        Self {
            object: object.to_string(),
            message: format!("{}: value changed from {} to {}", object, from, to),
            compatible: false,
        }
    }
}

/// Compare two surfaces of the same package.
///
/// Objects are matched by identity; a struct field's identity includes its
/// tag. Signatures are compared in resolved form, so a change to a
/// package-local type shows up on every object that mentions it.
pub fn diff_packages(old: &PackageApi, new: &PackageApi) -> Vec<RawChange> {
    let mut changes = Vec::new();

    for (key, before) in &old.objects {
        let Some(after) = new.objects.get(key) else {
            // Members of a removed type are covered by the type's removal
            let owner_gone = before
                .owner
                .as_deref()
                .is_some_and(|owner| new.find(owner).is_none());
            if !owner_gone {
                changes.push(RawChange::removed(&before.name));
            }
            continue;
        };

        if before.kind != after.kind || old.resolved(before) != new.resolved(after) {
            changes.push(RawChange::changed(
                &before.name,
                &before.signature,
                &after.signature,
            ));
        }
        if before.value != after.value {
            changes.push(RawChange::value_changed(
                &before.name,
                before.value.as_deref().unwrap_or_default(),
                after.value.as_deref().unwrap_or_default(),
            ));
        }
    }

    for (key, after) in &new.objects {
        if old.objects.contains_key(key) {
            continue;
        }
        let owner = after.owner.as_deref();
        if owner.is_some_and(|owner| old.find(owner).is_none()) {
            continue;
        }

        // Existing implementations of an open interface stop satisfying it
        let breaks_implementers = after.kind == ObjectKind::Method
            && owner.is_some_and(|owner| {
                old.kind_of(owner) == Some(ObjectKind::Interface) && !old.is_sealed(owner)
            });
        changes.push(RawChange::added(&after.name, !breaks_implementers));
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use tree_sitter::Parser;

    fn api(source: &str) -> PackageApi {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_go::LANGUAGE.into())
            .unwrap();
        let tree = parser.parse(source, None).unwrap();
        let mut api = PackageApi::new("example.com/p", "p");
        api.extract_file(tree.root_node(), source.as_bytes());
        api
    }

    fn messages(changes: &[RawChange]) -> Vec<(&str, bool)> {
        changes
            .iter()
            .map(|c| (c.message.as_str(), c.compatible))
            .collect()
    }

    #[test]
    fn test_identical_surfaces() {
        let src = "package p\n\ntype T struct{ A int }\n\nfunc F(t T) error { return nil }\n";
        assert!(diff_packages(&api(src), &api(src)).is_empty());
    }

    #[test]
    fn test_removed_added_and_changed() {
        let old = api("package p\n\nfunc Gone() {}\nfunc Parse(s string) error { return nil }\n");
        let new = api("package p\n\nfunc Parse(s string, n int) error { return nil }\nfunc New() {}\n");

        assert_eq!(
            messages(&diff_packages(&old, &new)),
            vec![
                ("Gone: removed", false),
                (
                    "Parse: changed from func(string) error to func(string, int) error",
                    false
                ),
                ("New: added", true),
            ]
        );
    }

    #[test]
    fn test_interface_method_added_is_incompatible() {
        let old = api("package p\n\ntype I interface {\n\tA()\n}\n\ntype S interface {\n\tA()\n\tseal()\n}\n");
        let new = api(
            "package p\n\ntype I interface {\n\tA()\n\tB()\n}\n\ntype S interface {\n\tA()\n\tB()\n\tseal()\n}\n",
        );

        assert_eq!(
            messages(&diff_packages(&old, &new)),
            vec![("I.B: added", false), ("S.B: added", true)]
        );
    }

    #[test]
    fn test_constant_value_change() {
        let old = api("package p\n\nconst Max = 10\n");
        let new = api("package p\n\nconst Max = 20\n");
        assert_eq!(
            messages(&diff_packages(&old, &new)),
            vec![("Max: value changed from 10 to 20", false)]
        );
    }

    #[test]
    fn test_tag_change_is_removal_plus_addition() {
        let old = api("package p\n\ntype T struct {\n\tA int `json:\"a\"`\n}\n");
        let new = api("package p\n\ntype T struct {\n\tA int `json:\"b\"`\n}\n");
        assert_eq!(
            messages(&diff_packages(&old, &new)),
            vec![("T.A: removed", false), ("T.A: added", true)]
        );
    }

    #[test]
    fn test_members_of_removed_type_are_not_listed() {
        let old = api("package p\n\ntype T struct{ A int }\n\nfunc (T) M() {}\n");
        let new = api("package p\n");
        assert_eq!(messages(&diff_packages(&old, &new)), vec![("T: removed", false)]);
    }

    #[test]
    fn test_local_type_change_surfaces_as_identical_text() {
        let old = api("package p\n\ntype ID = string\n\nfunc Get(id ID) {}\n");
        let new = api("package p\n\ntype ID string\n\nfunc Get(id ID) {}\n");
        let changes = diff_packages(&old, &new);
        assert!(changes
            .iter()
            .any(|c| c.message == "Get: changed from func(ID) to func(ID)"));
        assert!(changes
            .iter()
            .any(|c| c.message == "ID: changed from = string to string"));
    }
}

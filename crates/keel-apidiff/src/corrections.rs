//! Corrections for known false positives in the raw diff.
//!
//! Both rules key off message text. They only fire on the exact phrasing
//! produced by [`crate::diff`]; if that phrasing changes, they silently stop
//! matching.

use std::collections::BTreeSet;

use tracing::debug;

use crate::diff::RawChange;
use crate::surface::PackageApi;

const REMOVED: &str = ": removed";
const ADDED: &str = ": added";
const CHANGED_FROM: &str = ": changed from ";
const TO: &str = " to ";

/// Drop or enrich raw changes that do not reflect a real API difference.
///
/// A member reported as removed (or added) that exists in both trees with
/// an identical resolved signature is dropped. A "changed from X to Y"
/// where X and Y render identically is explained by the package-local type
/// that actually changed, or dropped when no such type is found.
pub fn apply(changes: Vec<RawChange>, old: &PackageApi, new: &PackageApi) -> Vec<RawChange> {
    changes
        .into_iter()
        .filter_map(|change| correct(change, old, new))
        .collect()
}

fn correct(mut change: RawChange, old: &PackageApi, new: &PackageApi) -> Option<RawChange> {
    let message = change.message.as_str();

    if let Some(name) = message
        .strip_suffix(REMOVED)
        .or_else(|| message.strip_suffix(ADDED))
    {
        if unchanged_member(name, old, new) {
            debug!(change = %change.message, "dropping spurious membership change");
            return None;
        }
        return Some(change);
    }

    if let Some((name, rendered)) = identical_change(message) {
        let details = explain(rendered, old, new);
        if details.is_empty() {
            debug!(object = name, "suppressing redundant change");
            return None;
        }
        change.message = format!("{}; {}", change.message, details.join("; "));
    }

    Some(change)
}

fn unchanged_member(name: &str, old: &PackageApi, new: &PackageApi) -> bool {
    match (old.find(name), new.find(name)) {
        (Some(before), Some(after)) => {
            before.kind == after.kind && old.resolved(before) == new.resolved(after)
        }
        _ => false,
    }
}

/// `<obj>: changed from X to X` → `(obj, X)`
fn identical_change(message: &str) -> Option<(&str, &str)> {
    let at = message.find(CHANGED_FROM)?;
    let name = &message[..at];
    let rest = &message[at + CHANGED_FROM.len()..];

    let len = rest.len().checked_sub(TO.len())?;
    if len % 2 != 0 {
        return None;
    }
    let half = len / 2;
    let from = rest.get(..half)?;
    let sep = rest.get(half..half + TO.len())?;
    let to = rest.get(half + TO.len()..)?;
    (sep == TO && from == to).then_some((name, from))
}

/// Deeper reasons behind an identically rendered signature
fn explain(rendered: &str, old: &PackageApi, new: &PackageApi) -> Vec<String> {
    let referenced: BTreeSet<&str> = old
        .referenced_types(rendered)
        .into_iter()
        .chain(new.referenced_types(rendered))
        .collect();

    referenced
        .into_iter()
        .filter_map(|ty| match (old.types.get(ty), new.types.get(ty)) {
            (Some(before), Some(after)) if before.alias != after.alias => Some(format!(
                "{} changed from {} to {}",
                ty,
                before.form(),
                after.form()
            )),
            (Some(before), Some(after)) if before.type_params != after.type_params => {
                Some(format!("declaration of {} changed", ty))
            }
            (Some(before), Some(after)) if before.shape() != after.shape() => Some(format!(
                "underlying type of {} changed from {} to {}",
                ty,
                before.shape(),
                after.shape()
            )),
            (Some(_), None) | (None, Some(_)) => Some(format!("declaration of {} changed", ty)),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::diff_packages;
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

    fn corrected(old: &str, new: &str) -> Vec<String> {
        let (old, new) = (api(old), api(new));
        apply(diff_packages(&old, &new), &old, &new)
            .into_iter()
            .map(|c| c.message)
            .collect()
    }

    #[test]
    fn test_identical_change_parsing() {
        assert_eq!(
            identical_change("F: changed from func(T) to func(T)"),
            Some(("F", "func(T)"))
        );
        assert_eq!(
            identical_change("F: changed from func(a to b) to func(a to b)"),
            Some(("F", "func(a to b)"))
        );
        assert_eq!(identical_change("F: changed from int to string"), None);
        assert_eq!(identical_change("F: removed"), None);
    }

    #[test]
    fn test_tag_only_change_is_dropped() {
        let changes = corrected(
            "package p\n\ntype T struct {\n\tA int `json:\"a\"`\n}\n",
            "package p\n\ntype T struct {\n\tA int `json:\"b\"`\n}\n",
        );
        assert!(changes.is_empty(), "unexpected: {changes:?}");
    }

    #[test]
    fn test_real_removal_is_kept() {
        let changes = corrected(
            "package p\n\ntype T struct {\n\tA int\n\tB int\n}\n",
            "package p\n\ntype T struct {\n\tA int\n}\n",
        );
        assert_eq!(changes, vec!["T.B: removed".to_string()]);
    }

    #[test]
    fn test_member_churn_in_referenced_struct_is_suppressed() {
        let changes = corrected(
            "package p\n\ntype Opts struct {\n\tA int\n}\n\nfunc Run(o Opts) {}\n",
            "package p\n\ntype Opts struct {\n\tA int\n\tB int\n}\n\nfunc Run(o Opts) {}\n",
        );
        assert_eq!(changes, vec!["Opts.B: added".to_string()]);
    }

    #[test]
    fn test_alias_to_defined_is_explained() {
        let changes = corrected(
            "package p\n\ntype ID = string\n\nfunc Get(id ID) {}\n",
            "package p\n\ntype ID string\n\nfunc Get(id ID) {}\n",
        );
        assert!(changes.contains(
            &"Get: changed from func(ID) to func(ID); ID changed from alias to defined type"
                .to_string()
        ));
    }

    #[test]
    fn test_unexported_underlying_change_is_explained() {
        let changes = corrected(
            "package p\n\ntype mode int\n\nfunc Set(m mode) {}\n",
            "package p\n\ntype mode string\n\nfunc Set(m mode) {}\n",
        );
        assert_eq!(
            changes,
            vec![
                "Set: changed from func(mode) to func(mode); underlying type of mode changed from int to string"
                    .to_string()
            ]
        );
    }
}

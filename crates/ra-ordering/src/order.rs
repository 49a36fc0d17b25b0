//! Merging an ordering record with the actual children.

use std::cmp::Ordering;
use std::collections::HashSet;

/// Parse an ordering record: one child name per line.
pub fn parse(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Render an ordering record: every name LF-terminated.
pub fn render<S: AsRef<str>>(names: &[S]) -> String {
    let mut out = String::new();
    for name in names {
        out.push_str(name.as_ref());
        out.push('\n');
    }
    out
}

/// Case-insensitive alphabetical order, ties broken by the exact name.
pub fn alphabetical(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// Effective display order of `actual` children under a possibly partial
/// `listed` record.
///
/// Listed names come first, in record order, but only if they are actual
/// children and only at their first occurrence. The remaining children
/// follow alphabetically. Every actual child appears exactly once.
pub fn effective_order<S: AsRef<str>, T: AsRef<str>>(listed: &[S], actual: &[T]) -> Vec<String> {
    let actual_set: HashSet<&str> = actual.iter().map(AsRef::as_ref).collect();
    let mut placed: HashSet<&str> = HashSet::with_capacity(actual.len());
    let mut order = Vec::with_capacity(actual.len());

    for name in listed.iter().map(AsRef::as_ref) {
        if actual_set.contains(name) && placed.insert(name) {
            order.push(name.to_string());
        }
    }

    let mut rest: Vec<&str> = actual
        .iter()
        .map(AsRef::as_ref)
        .filter(|name| !placed.contains(name))
        .collect();
    rest.sort_by(|a, b| alphabetical(a, b));
    rest.dedup();
    order.extend(rest.into_iter().map(str::to_string));
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parse_skips_blank_lines_and_cr() {
        assert_eq!(parse("b\r\n\na\n"), vec!["b", "a"]);
        assert!(parse("").is_empty());
    }

    #[test]
    fn render_is_lf_terminated() {
        assert_eq!(render(&["b", "a"]), "b\na\n");
        assert_eq!(render::<&str>(&[]), "");
    }

    #[test]
    fn full_record_is_kept() {
        let order = effective_order(&["c", "a", "b"], &["a", "b", "c"]);
        assert_eq!(order, vec!["c", "a", "b"]);
    }

    #[test]
    fn unlisted_children_appended_alphabetically() {
        let order = effective_order(&["zeta"], &["beta", "Alpha", "zeta", "gamma"]);
        assert_eq!(order, vec!["zeta", "Alpha", "beta", "gamma"]);
    }

    #[test]
    fn stale_and_duplicate_names_ignored() {
        let order = effective_order(&["gone", "b", "b", "a"], &["a", "b"]);
        assert_eq!(order, vec!["b", "a"]);
    }

    #[test]
    fn no_record_is_alphabetical() {
        let order = effective_order::<&str, &str>(&[], &["b", "B", "a"]);
        assert_eq!(order, vec!["a", "B", "b"]);
    }

    proptest! {
        #[test]
        fn every_child_exactly_once(
            actual in proptest::collection::hash_set("[a-dA-D]{1,3}", 0..12),
            listed in proptest::collection::vec("[a-dA-D]{1,3}", 0..12),
        ) {
            let actual: Vec<String> = actual.into_iter().collect();
            let order = effective_order(&listed, &actual);
            prop_assert_eq!(order.len(), actual.len());
            let unique: HashSet<&String> = order.iter().collect();
            prop_assert_eq!(unique.len(), order.len());
            for child in &actual {
                prop_assert!(order.contains(child));
            }
        }
    }
}

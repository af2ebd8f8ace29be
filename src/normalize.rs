//! Name normalization for package and member names.
//!
//! Follows the PEP 503 rule (lowercase, collapse separator runs) but uses
//! `_` as the canonical separator so normalized names are also valid Python
//! import names.

use std::collections::HashSet;

/// Normalize a package or import name.
///
/// - Leading/trailing whitespace is stripped
/// - Every run of `-`, `_`, `.` or whitespace becomes a single `_`
/// - The result is lowercased
pub fn normalize(name: &str) -> String {
    let trimmed = name.trim();
    let mut result = String::with_capacity(trimmed.len());
    let mut prev_separator = false;

    for c in trimmed.chars() {
        if is_separator(c) {
            if !prev_separator {
                result.push('_');
                prev_separator = true;
            }
        } else {
            result.extend(c.to_lowercase());
            prev_separator = false;
        }
    }

    result
}

/// Normalize a name taken from a generated list.
///
/// Same as [`normalize`], with leading/trailing underscores removed so that
/// entries like `numpy_` or `.pandas` map to their bare names.
pub fn normalize_list_entry(name: &str) -> String {
    normalize(name).trim_matches('_').to_string()
}

/// Format a list of names, removing empty entries and duplicates.
///
/// Order of first occurrence is preserved. With `normalise` set, every entry
/// goes through [`normalize_list_entry`] first; otherwise entries are only
/// trimmed of surrounding whitespace.
pub fn format_name_list<S: AsRef<str>>(names: &[S], normalise: bool) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .iter()
        .map(|n| {
            if normalise {
                normalize_list_entry(n.as_ref())
            } else {
                n.as_ref().trim().to_string()
            }
        })
        .filter(|n| !n.is_empty())
        .filter(|n| seen.insert(n.clone()))
        .collect()
}

fn is_separator(c: char) -> bool {
    matches!(c, '-' | '_' | '.') || c.is_whitespace()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_basic() {
        assert_eq!(normalize("nochange"), "nochange");
        assert_eq!(normalize("MakeLower"), "makelower");
        assert_eq!(normalize(" strip spaces "), "strip_spaces");
        assert_eq!(normalize("re-place all.things"), "re_place_all_things");
        assert_eq!(normalize("a__b--c..d"), "a_b_c_d");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   "), "");
    }

    #[test]
    fn test_normalize_equivalence() {
        let expected = "my_lib_name";
        assert_eq!(normalize("My-Lib.Name"), expected);
        assert_eq!(normalize("my_lib_name"), expected);
        assert_eq!(normalize(" MY.LIB-NAME "), expected);
    }

    #[test]
    fn test_normalize_keeps_edge_underscores() {
        assert_eq!(normalize("_private_"), "_private_");
        assert_eq!(normalize("__future__"), "_future_");
    }

    #[test]
    fn test_normalize_list_entry() {
        assert_eq!(normalize_list_entry("_strip_underscores_"), "strip_underscores");
        assert_eq!(normalize_list_entry("numpy_"), "numpy");
        assert_eq!(normalize_list_entry(".pandas"), "pandas");
        assert_eq!(normalize_list_entry("-"), "");
    }

    #[test]
    fn test_format_name_list_normalised() {
        let names = ["numpy_", ".pandas", "matplotlib", "matplotlib", "  "];
        assert_eq!(
            format_name_list(&names, true),
            vec!["numpy", "pandas", "matplotlib"]
        );
    }

    #[test]
    fn test_format_name_list_dedupe_only() {
        let names = ["numpy_", ".pandas", "matplotlib", "matplotlib"];
        assert_eq!(
            format_name_list(&names, false),
            vec!["numpy_", ".pandas", "matplotlib"]
        );
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn raw_name() -> impl Strategy<Value = String> {
        "[ \\ta-zA-Z0-9._\\-äöüÄÖÜß]{0,40}"
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(s in raw_name()) {
            let once = normalize(&s);
            prop_assert_eq!(normalize(&once), once);
        }

        #[test]
        fn list_entry_is_idempotent(s in raw_name()) {
            let once = normalize_list_entry(&s);
            prop_assert_eq!(normalize_list_entry(&once), once);
        }

        #[test]
        fn separator_style_does_not_matter(parts in prop::collection::vec("[a-z0-9]{1,6}", 1..5)) {
            let dashed = parts.join("-");
            let dotted = parts.join(".").to_uppercase();
            let spaced = format!(" {} ", parts.join("_"));
            prop_assert_eq!(normalize(&dashed), normalize(&dotted));
            prop_assert_eq!(normalize(&dashed), normalize(&spaced));
        }

        #[test]
        fn normalized_has_no_separator_runs(s in raw_name()) {
            let n = normalize(&s);
            prop_assert!(!n.contains("__"));
            prop_assert!(!n.contains('-'));
            prop_assert!(!n.contains('.'));
        }
    }
}

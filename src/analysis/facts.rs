//! Fact structures extracted from code block analysis.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Source location span with byte offsets and line/column positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    /// Start byte offset (0-indexed).
    pub start_byte: usize,
    /// End byte offset (0-indexed, exclusive).
    pub end_byte: usize,
    /// Start line (1-indexed).
    pub start_line: usize,
    /// Start column (1-indexed).
    pub start_col: usize,
}

impl Span {
    /// Create a span from a tree-sitter node.
    pub fn from_node(node: tree_sitter::Node) -> Self {
        let start = node.start_position();
        Self {
            start_byte: node.start_byte(),
            end_byte: node.end_byte(),
            start_line: start.row + 1, // tree-sitter is 0-indexed
            start_col: start.column + 1,
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start_line, self.start_col)
    }
}

/// A single access of an imported binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occurrence {
    /// Attribute path relative to the imported module, e.g. `array` for
    /// `np.array` or `DataFrame.from_dict` for a `from pandas import
    /// DataFrame` binding.
    pub member: String,
    /// Where the access starts.
    pub span: Span,
}

/// Ordered occurrences keyed by the imported module path.
pub type UsageMap = BTreeMap<String, Vec<Occurrence>>;

/// Everything the analyzer learns about one code block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeFacts {
    /// Top-level module names imported that are not standard library.
    pub external_imports: BTreeSet<String>,
    /// Top-level standard library module names imported.
    pub stdlib_imports: BTreeSet<String>,
    /// Dotted members named directly by import statements
    /// (`from X import N` gives `X.N`, `import X.sub` gives `X.sub`).
    pub imported_members: BTreeSet<String>,
    /// Attribute accesses of imported bindings after their import.
    pub usages: UsageMap,
}

impl CodeFacts {
    /// Empty facts, used for non-Python or unparsable blocks.
    pub fn empty() -> Self {
        Self::default()
    }

    /// All imported top-level module names, external and standard library.
    pub fn imports(&self) -> impl Iterator<Item = &str> {
        self.external_imports
            .iter()
            .chain(self.stdlib_imports.iter())
            .map(String::as_str)
    }

    /// Top-level names of modules with at least one recorded usage.
    pub fn used_modules(&self) -> BTreeSet<&str> {
        self.usages
            .iter()
            .filter(|(_, occ)| !occ.is_empty())
            .map(|(module, _)| top_level(module))
            .collect()
    }

    /// Fully qualified member paths referenced by the block, trimmed at the
    /// first class-like component.
    pub fn members(&self) -> BTreeSet<String> {
        let mut members: BTreeSet<String> = self
            .imported_members
            .iter()
            .map(|m| trim_member_path(m))
            .collect();

        for (module, occurrences) in &self.usages {
            for occ in occurrences {
                members.insert(trim_member_path(&format!("{}.{}", module, occ.member)));
            }
        }

        members
    }
}

/// First component of a dotted module path.
pub fn top_level(module: &str) -> &str {
    module.split('.').next().unwrap_or(module)
}

/// Trim a dotted member path at the first component that looks like a class.
///
/// `lib.sub.Class.method` becomes `lib.sub.Class`. The first component is the
/// library itself and is never treated as a class, so `PIL.Image.open`
/// trims to `PIL.Image`. Paths without a class-like component are returned
/// unchanged.
pub fn trim_member_path(path: &str) -> String {
    let parts: Vec<&str> = path.split('.').collect();
    let class_idx = parts
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, p)| p.chars().next().is_some_and(|c| c.is_ascii_uppercase()))
        .map(|(i, _)| i);

    match class_idx {
        Some(i) => parts[..=i].join("."),
        None => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn occ(member: &str) -> Occurrence {
        Occurrence {
            member: member.to_string(),
            span: Span {
                start_byte: 0,
                end_byte: 0,
                start_line: 1,
                start_col: 1,
            },
        }
    }

    #[test]
    fn test_trim_member_path() {
        assert_eq!(trim_member_path("lib.SomeClass.method_call"), "lib.SomeClass");
        assert_eq!(trim_member_path("lib.sub.Class.attr.deep"), "lib.sub.Class");
        assert_eq!(trim_member_path("numpy.linalg.norm"), "numpy.linalg.norm");
        assert_eq!(trim_member_path("PIL.Image.open"), "PIL.Image");
        assert_eq!(trim_member_path("numpy"), "numpy");
    }

    #[test]
    fn test_members_combines_imports_and_usages() {
        let mut facts = CodeFacts::empty();
        facts
            .imported_members
            .insert("pandas.DataFrame".to_string());
        facts.usages.insert(
            "numpy".to_string(),
            vec![occ("array"), occ("random.Generator.normal")],
        );

        let members = facts.members();
        assert!(members.contains("pandas.DataFrame"));
        assert!(members.contains("numpy.array"));
        assert!(members.contains("numpy.random.Generator"));
        assert_eq!(members.len(), 3);
    }

    #[test]
    fn test_used_modules_uses_top_level() {
        let mut facts = CodeFacts::empty();
        facts
            .usages
            .insert("os.path".to_string(), vec![occ("join")]);
        facts.usages.insert("json".to_string(), vec![]);

        let used = facts.used_modules();
        assert!(used.contains("os"));
        assert!(!used.contains("json"));
    }
}

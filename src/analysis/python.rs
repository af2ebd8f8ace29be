//! Python import/usage analyzer using tree-sitter.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use streaming_iterator::StreamingIterator;
use tracing::{debug, warn};
use tree_sitter::{Language, Node, Parser, Query, QueryCursor, Tree};

use super::facts::{top_level, CodeFacts, Occurrence, Span};
use crate::registry::is_stdlib;

/// Tree-sitter query for extracting import statements.
const IMPORT_QUERY: &str = r#"
; import module / import module as alias
(import_statement) @import

; from module import name
(import_from_statement) @import_from

; from __future__ import feature
(future_import_statement) @future_import
"#;

/// Python 2 statements the grammar still accepts. Their presence means the
/// source is not Python 3.
const PYTHON2_KINDS: &[&str] = &["print_statement", "exec_statement"];

/// Node kinds whose identifiers are import syntax, not usages.
const IMPORT_KINDS: &[&str] = &[
    "import_statement",
    "import_from_statement",
    "future_import_statement",
];

static PYTHON_ANALYZER: Lazy<Option<PythonAnalyzer>> = Lazy::new(|| match PythonAnalyzer::new() {
    Ok(analyzer) => Some(analyzer),
    Err(e) => {
        warn!(error = %e, "python analyzer unavailable");
        None
    }
});

/// Analyze Python source with the shared analyzer.
///
/// Returns `None` when the source does not parse cleanly.
pub fn analyze(source: &str) -> Option<CodeFacts> {
    PYTHON_ANALYZER.as_ref()?.analyze(source)
}

/// Check whether source is syntactically valid Python 3.
pub fn is_valid_python(source: &str) -> bool {
    PYTHON_ANALYZER
        .as_ref()
        .map_or(false, |analyzer| analyzer.parse(source).is_some())
}

/// A name bound by an import statement.
#[derive(Debug, Clone)]
struct Binding {
    /// Module path the name resolves into (`numpy` for `import numpy as np`).
    module: String,
    /// Imported member name for `from X import N` bindings.
    prefix: Option<String>,
    /// Byte offset where the binding becomes visible.
    after_byte: usize,
}

pub struct PythonAnalyzer {
    language: Language,
    import_query: Query,
}

impl PythonAnalyzer {
    pub fn new() -> anyhow::Result<Self> {
        let language: Language = tree_sitter_python::LANGUAGE.into();
        let import_query = Query::new(&language, IMPORT_QUERY)?;
        Ok(Self {
            language,
            import_query,
        })
    }

    fn create_parser(&self) -> anyhow::Result<Parser> {
        let mut parser = Parser::new();
        parser.set_language(&self.language)?;
        Ok(parser)
    }

    /// Parse source, rejecting trees that contain syntax errors or
    /// Python 2 statements.
    pub fn parse(&self, source: &str) -> Option<Tree> {
        let mut parser = match self.create_parser() {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "python grammar unavailable");
                return None;
            }
        };

        let tree = parser.parse(source, None)?;
        if tree.root_node().has_error() {
            debug!("code block has syntax errors, skipping");
            return None;
        }
        if contains_kind(tree.root_node(), PYTHON2_KINDS) {
            debug!("code block uses python 2 statements, skipping");
            return None;
        }
        Some(tree)
    }

    /// Extract imports and usages from source.
    pub fn analyze(&self, source: &str) -> Option<CodeFacts> {
        let tree = self.parse(source)?;
        let src = source.as_bytes();
        let mut facts = CodeFacts::empty();

        let bindings = self.collect_imports(tree.root_node(), src, &mut facts);
        self.collect_usages(tree.root_node(), src, &bindings, &mut facts);
        Some(facts)
    }

    fn collect_imports(
        &self,
        root: Node,
        src: &[u8],
        facts: &mut CodeFacts,
    ) -> HashMap<String, Binding> {
        let query = &self.import_query;
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(query, root, src);

        let mut bindings = HashMap::new();

        while let Some(m) = matches.next() {
            for capture in m.captures {
                let capture_name = query.capture_names()[capture.index as usize];
                let node = capture.node;
                match capture_name {
                    "import" => self.handle_import(node, src, facts, &mut bindings),
                    "import_from" => self.handle_import_from(node, src, facts, &mut bindings),
                    "future_import" => record_import(facts, "__future__"),
                    _ => {}
                }
            }
        }

        bindings
    }

    /// `import a.b.c` binds `a`; `import a.b as c` binds `c` to `a.b`.
    fn handle_import(
        &self,
        node: Node,
        src: &[u8],
        facts: &mut CodeFacts,
        bindings: &mut HashMap<String, Binding>,
    ) {
        let mut cursor = node.walk();
        let names: Vec<Node> = node.children_by_field_name("name", &mut cursor).collect();

        for name_node in names {
            let (module, bound) = match name_node.kind() {
                "dotted_name" => {
                    let module = dotted_text(name_node, src);
                    let bound = top_level(&module).to_string();
                    (module, bound)
                }
                "aliased_import" => {
                    let module = name_node
                        .child_by_field_name("name")
                        .map(|n| dotted_text(n, src))
                        .unwrap_or_default();
                    let alias = name_node
                        .child_by_field_name("alias")
                        .map(|n| node_text(n, src).to_string())
                        .unwrap_or_default();
                    (module, alias)
                }
                _ => continue,
            };

            if module.is_empty() || bound.is_empty() {
                continue;
            }

            record_import(facts, &module);
            if module.contains('.') {
                facts.imported_members.insert(module.clone());
            }

            // Without an alias only the top-level package is bound.
            let target = if name_node.kind() == "aliased_import" {
                module
            } else {
                bound.clone()
            };
            bindings.insert(
                bound,
                Binding {
                    module: target,
                    prefix: None,
                    after_byte: node.end_byte(),
                },
            );
        }
    }

    /// `from X import N` and `from X import N as M` bind members of `X`.
    fn handle_import_from(
        &self,
        node: Node,
        src: &[u8],
        facts: &mut CodeFacts,
        bindings: &mut HashMap<String, Binding>,
    ) {
        let module_node = match node.child_by_field_name("module_name") {
            Some(n) => n,
            None => return,
        };
        // Relative imports refer to local code.
        if module_node.kind() == "relative_import" {
            return;
        }

        let module = dotted_text(module_node, src);
        if module.is_empty() {
            return;
        }
        record_import(facts, &module);

        let mut cursor = node.walk();
        let names: Vec<Node> = node.children_by_field_name("name", &mut cursor).collect();

        for name_node in names {
            let (member, bound) = match name_node.kind() {
                "dotted_name" => {
                    let member = dotted_text(name_node, src);
                    (member.clone(), member)
                }
                "aliased_import" => {
                    let member = name_node
                        .child_by_field_name("name")
                        .map(|n| dotted_text(n, src))
                        .unwrap_or_default();
                    let alias = name_node
                        .child_by_field_name("alias")
                        .map(|n| node_text(n, src).to_string())
                        .unwrap_or_default();
                    (member, alias)
                }
                _ => continue,
            };

            if member.is_empty() || bound.is_empty() {
                continue;
            }

            facts
                .imported_members
                .insert(format!("{}.{}", module, member));
            bindings.insert(
                bound,
                Binding {
                    module: module.clone(),
                    prefix: Some(member),
                    after_byte: node.end_byte(),
                },
            );
        }
    }

    fn collect_usages(
        &self,
        root: Node,
        src: &[u8],
        bindings: &HashMap<String, Binding>,
        facts: &mut CodeFacts,
    ) {
        if bindings.is_empty() {
            return;
        }

        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if IMPORT_KINDS.contains(&node.kind()) {
                continue;
            }
            if node.kind() == "identifier" {
                record_usage(node, src, bindings, facts);
                continue;
            }
            let mut cursor = node.walk();
            stack.extend(node.children(&mut cursor));
        }

        for occurrences in facts.usages.values_mut() {
            occurrences.sort_by_key(|o| o.span.start_byte);
        }
    }
}

/// Classify a module path as external or standard library by its top level.
fn record_import(facts: &mut CodeFacts, module: &str) {
    let top = top_level(module).to_string();
    if is_stdlib(&top) {
        facts.stdlib_imports.insert(top);
    } else {
        facts.external_imports.insert(top);
    }
}

/// Record an identifier that refers to an imported binding.
fn record_usage(
    node: Node,
    src: &[u8],
    bindings: &HashMap<String, Binding>,
    facts: &mut CodeFacts,
) {
    let binding = match bindings.get(node_text(node, src)) {
        Some(b) => b,
        None => return,
    };
    if node.start_byte() < binding.after_byte {
        return;
    }

    if let Some(parent) = node.parent() {
        // `x.np` is an attribute named np, not the binding.
        if parent.kind() == "attribute" && parent.child_by_field_name("attribute") == Some(node) {
            return;
        }
        if parent.kind() == "keyword_argument" && parent.child_by_field_name("name") == Some(node)
        {
            return;
        }
    }

    let mut path = Vec::new();
    let mut current = node;
    while let Some(parent) = current.parent() {
        if parent.kind() != "attribute" || parent.child_by_field_name("object") != Some(current) {
            break;
        }
        match parent.child_by_field_name("attribute") {
            Some(attr) => path.push(node_text(attr, src)),
            None => break,
        }
        current = parent;
    }

    let member = match &binding.prefix {
        Some(prefix) => std::iter::once(prefix.as_str())
            .chain(path.iter().copied())
            .collect::<Vec<_>>()
            .join("."),
        // A bare module reference is not a usage.
        None if path.is_empty() => return,
        None => path.join("."),
    };

    facts
        .usages
        .entry(binding.module.clone())
        .or_default()
        .push(Occurrence {
            member,
            span: Span::from_node(current),
        });
}

/// Whether any node under `root` has one of `kinds`.
fn contains_kind(root: Node, kinds: &[&str]) -> bool {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if kinds.contains(&node.kind()) {
            return true;
        }
        let mut cursor = node.walk();
        stack.extend(node.children(&mut cursor));
    }
    false
}

fn node_text<'a>(node: Node, src: &'a [u8]) -> &'a str {
    node.utf8_text(src).unwrap_or("")
}

/// Dotted name text with any interior whitespace removed.
fn dotted_text(node: Node, src: &[u8]) -> String {
    node_text(node, src)
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

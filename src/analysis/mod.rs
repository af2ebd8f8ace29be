//! Static import/usage analysis of Python code blocks.
//!
//! Code is parsed with tree-sitter and never executed. For each block the
//! analyzer reports:
//! - Imported top-level modules, split into external and standard library
//! - Members named directly by import statements
//! - Attribute accesses off imported bindings that occur after the import
//!
//! # Limitations
//!
//! The analysis is heuristic. Dynamic imports (`importlib.import_module`),
//! rebinding of imported names and metaprogrammed attribute access are not
//! resolved, so some hallucinations go unreported.

mod facts;
mod python;

pub use facts::{top_level, trim_member_path, CodeFacts, Occurrence, Span, UsageMap};
pub use python::{analyze, is_valid_python, PythonAnalyzer};

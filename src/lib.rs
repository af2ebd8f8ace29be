//! hallulib - library hallucination detection for LLM-generated code.
//!
//! hallulib reads model responses (markdown with fenced code blocks) and
//! reports libraries, members and versions that do not exist according to a
//! fixed ground truth: a package-index snapshot, the Python standard library
//! and per-library documentation.
//!
//! # Architecture
//!
//! Checks flow Checker → extractor → analyzer → normalizer → registries:
//!
//! - `check`: `Checker` entry point and `HallucinationLevel`
//! - `extract`: fenced code blocks and `pip install` directives
//! - `analysis`: tree-sitter import/usage analysis of Python code
//! - `normalize`: package-name normalization
//! - `registry`: ground-truth loading, caching and PyPI refresh
//! - `config`: YAML config file schema
//! - `report`: output formatting (pretty, JSON)
//!
//! # Example
//!
//! ```no_run
//! use hallulib::{Checker, GroundTruth, HallucinationLevel};
//!
//! let ground_truth = GroundTruth::new();
//! let checker = Checker::new(&ground_truth);
//! let report = checker
//!     .check("```python\nimport fakepkg\n```", HallucinationLevel::Library, None)
//!     .unwrap();
//! println!("{:?}", report.hallucinations);
//! ```

pub mod analysis;
pub mod check;
pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod normalize;
pub mod registry;
pub mod report;

pub use check::{extract_imports, extract_members, Checker, HallucinationLevel, ResponseReport};
pub use config::Config;
pub use error::{HalluError, Result};
pub use extract::{
    contains_code, extract_code_blocks, extract_install_directives, extract_python, CodeBlock,
};
pub use normalize::{format_name_list, normalize, normalize_list_entry};
pub use registry::{Documentation, GroundTruth, KnownLibraries, LibraryDocs};

//! Code and install-directive extraction from markdown model responses.
//!
//! Responses are parsed as CommonMark. Every fenced code block becomes a
//! [`CodeBlock`]; Python blocks are analyzed for imports and usages when
//! constructed. Responses without any fences are tried as bare Python.

use std::collections::BTreeSet;

use pulldown_cmark::{CodeBlockKind, Event, Parser, Tag, TagEnd};
use regex::Regex;
use tracing::{debug, warn};

use crate::analysis::{self, CodeFacts, UsageMap};
use crate::normalize::normalize;

/// Language tag that marks a block as Python.
pub const PYTHON_MARKER: &str = "python";

/// A fenced code region extracted from a response.
///
/// Python blocks carry their analysis; blocks in other languages (or Python
/// blocks that fail to parse) carry empty facts.
#[derive(Debug, Clone)]
pub struct CodeBlock {
    language: String,
    text: String,
    valid: bool,
    facts: CodeFacts,
}

impl CodeBlock {
    /// Build a block, analyzing it if the language tag is Python.
    pub fn new(language: impl Into<String>, text: impl Into<String>) -> Self {
        let language = language.into();
        let text = text.into();

        let (valid, facts) = if language.eq_ignore_ascii_case(PYTHON_MARKER) {
            match analysis::analyze(&text) {
                Some(facts) => (true, facts),
                None => (false, CodeFacts::empty()),
            }
        } else {
            (false, CodeFacts::empty())
        };

        Self {
            language,
            text,
            valid,
            facts,
        }
    }

    /// Declared language tag, possibly empty.
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Raw block content.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether the language tag marks this as Python (case-insensitive).
    pub fn is_python(&self) -> bool {
        self.language.eq_ignore_ascii_case(PYTHON_MARKER)
    }

    /// Whether this is Python that parsed without syntax errors.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn facts(&self) -> &CodeFacts {
        &self.facts
    }

    pub fn external_imports(&self) -> &BTreeSet<String> {
        &self.facts.external_imports
    }

    pub fn stdlib_imports(&self) -> &BTreeSet<String> {
        &self.facts.stdlib_imports
    }

    pub fn usages(&self) -> &UsageMap {
        &self.facts.usages
    }
}

/// Extract every fenced code block in document order.
///
/// When the response has no fenced blocks at all, the whole text is tried as
/// a single Python block and kept only if it parses. An empty result means
/// the response contains no code.
pub fn extract_code_blocks(text: &str) -> Vec<CodeBlock> {
    let fenced = fenced_blocks(text);

    if !fenced.is_empty() {
        return fenced
            .into_iter()
            .map(|(language, body)| {
                let block = CodeBlock::new(language, body);
                if block.is_python() && !block.is_valid() {
                    warn!("python code block failed to parse, treating as empty");
                }
                block
            })
            .collect();
    }

    if text.trim().is_empty() {
        return Vec::new();
    }

    let block = CodeBlock::new(PYTHON_MARKER, text);
    if block.is_valid() {
        debug!("no fenced blocks, response parsed as bare python");
        vec![block]
    } else {
        debug!("no fenced blocks and response is not valid python");
        Vec::new()
    }
}

/// Extract the Python code blocks of a response.
pub fn extract_python(text: &str) -> Vec<CodeBlock> {
    extract_code_blocks(text)
        .into_iter()
        .filter(CodeBlock::is_python)
        .collect()
}

/// Whether the response contains any code at all.
///
/// Lets callers tell "no code" apart from "checked and found nothing".
pub fn contains_code(text: &str) -> bool {
    !extract_code_blocks(text).is_empty()
}

/// Collect `(language, body)` pairs for fenced blocks.
fn fenced_blocks(text: &str) -> Vec<(String, String)> {
    let mut blocks = Vec::new();
    let mut current: Option<(String, String)> = None;

    for event in Parser::new(text) {
        match event {
            Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(info))) => {
                let language = info.split_whitespace().next().unwrap_or("").to_string();
                current = Some((language, String::new()));
            }
            Event::Text(t) => {
                if let Some((_, body)) = current.as_mut() {
                    body.push_str(&t);
                }
            }
            Event::End(TagEnd::CodeBlock) => {
                if let Some(block) = current.take() {
                    blocks.push(block);
                }
            }
            _ => {}
        }
    }

    blocks
}

/// Extract normalized package names from `pip install` directives.
///
/// Matches directives that follow a backtick (inline code) or start a line
/// (plain text or any fenced block). A match never spans lines. Option flags
/// such as `-U` are skipped.
pub fn extract_install_directives(text: &str) -> BTreeSet<String> {
    lazy_static::lazy_static! {
        static ref PIP_INSTALL_RE: Regex = Regex::new(
            r"(?m)(?:^|`)[ \t]*pip[ \t]+install[ \t]+([A-Za-z0-9_.\-]+(?:[ \t]+[A-Za-z0-9_.\-]+)*)"
        )
        .unwrap();
    }

    let mut installs = BTreeSet::new();

    for caps in PIP_INSTALL_RE.captures_iter(text) {
        let Some(names) = caps.get(1) else {
            continue;
        };
        for token in names.as_str().split_whitespace() {
            if token.starts_with('-') {
                continue;
            }
            let token = token.trim_end_matches('.');
            if !token.chars().any(|c| c.is_ascii_alphanumeric()) {
                continue;
            }
            installs.insert(normalize(token));
        }
    }

    installs
}

//! Output formatting for scan results.
//!
//! Supports two output formats:
//! - Pretty: colored terminal output for human readability
//! - JSON: structured output for programmatic consumption

use colored::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::check::{HallucinationLevel, ResponseReport};

/// Check result for one response file.
#[derive(Debug, Clone)]
pub struct FileReport {
    pub path: PathBuf,
    pub report: ResponseReport,
}

// =============================================================================
// JSON Format
// =============================================================================

/// Top-level JSON report.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonReport {
    pub version: String,
    pub level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library: Option<String>,
    pub files_scanned: usize,
    /// Responses with at least one hallucination.
    pub hallucinating: usize,
    pub hallucination_count: usize,
    /// Each hallucinated name with the responses it appeared in.
    pub hallucinations: Vec<JsonHallucination>,
    pub responses: Vec<JsonResponse>,
    /// Responses that contained no code and were not checked.
    pub no_code: Vec<String>,
}

/// A hallucinated name and where it appeared.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonHallucination {
    pub name: String,
    pub files: Vec<String>,
}

/// Per-response results for responses that contained code.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonResponse {
    pub file: String,
    pub hallucinations: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub versions: Vec<String>,
}

/// Build the JSON report for a set of file results.
pub fn build_json_report(
    level: HallucinationLevel,
    library: Option<&str>,
    files: &[FileReport],
) -> JsonReport {
    let mut by_name: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    let mut responses = Vec::new();
    let mut no_code = Vec::new();

    for file in files {
        let path = file.path.to_string_lossy().to_string();
        if !file.report.has_code {
            no_code.push(path);
            continue;
        }
        for name in &file.report.hallucinations {
            by_name.entry(name.as_str()).or_default().push(path.clone());
        }
        responses.push(JsonResponse {
            file: path,
            hallucinations: file.report.hallucinations.clone(),
            versions: file.report.versions.clone(),
        });
    }

    let hallucinations: Vec<JsonHallucination> = by_name
        .into_iter()
        .map(|(name, files)| JsonHallucination {
            name: name.to_string(),
            files,
        })
        .collect();

    JsonReport {
        version: env!("CARGO_PKG_VERSION").to_string(),
        level: level.to_string(),
        library: library.map(str::to_string),
        files_scanned: files.len(),
        hallucinating: files.iter().filter(|f| !f.report.is_clean()).count(),
        hallucination_count: hallucinations.len(),
        hallucinations,
        responses,
        no_code,
    }
}

/// Write results in JSON format.
pub fn write_json(
    level: HallucinationLevel,
    library: Option<&str>,
    files: &[FileReport],
) -> anyhow::Result<()> {
    let report = build_json_report(level, library, files);
    let json = serde_json::to_string_pretty(&report)?;
    println!("{}", json);
    Ok(())
}

// =============================================================================
// Pretty Format
// =============================================================================

/// Write results in colored terminal format.
pub fn write_pretty(
    path: &str,
    level: HallucinationLevel,
    library: Option<&str>,
    files: &[FileReport],
) {
    // Header
    println!();
    print!("  ");
    print!("{}", "hallulib".cyan().bold());
    println!(" v{}", env!("CARGO_PKG_VERSION"));
    println!();

    print!("  {}", "Scanning: ".dimmed());
    println!("{}", path);
    print!("  {}", "Level:    ".dimmed());
    match library {
        Some(library) => println!("{} ({})", level, library),
        None => println!("{}", level),
    }
    println!();

    let hallucinating: Vec<&FileReport> = files.iter().filter(|f| !f.report.is_clean()).collect();
    let no_code: Vec<&FileReport> = files.iter().filter(|f| !f.report.has_code).collect();

    write_summary(files.len(), hallucinating.len(), no_code.len());
    println!();

    if !hallucinating.is_empty() {
        write_hallucinations(&hallucinating);
        println!();
    }

    if !no_code.is_empty() {
        write_no_code(&no_code);
        println!();
    }
}

fn write_summary(total: usize, hallucinating: usize, no_code: usize) {
    if hallucinating == 0 {
        print!("  {}", "✓ CLEAN".green());
    } else {
        print!("  {}", "✗ HALLUCINATED".red());
    }

    print!("  Responses: {}", total);
    print!("  With hallucinations: ");
    if hallucinating == 0 {
        print!("{}", hallucinating.to_string().green());
    } else {
        print!("{}", hallucinating.to_string().red().bold());
    }

    if no_code > 0 {
        print!("  {}", format!("({} without code)", no_code).dimmed());
    }

    println!();
}

fn write_hallucinations(files: &[&FileReport]) {
    println!("  {} ({}):", "Hallucinations".bold(), files.len());
    println!();

    for file in files {
        println!("    {}", file.path.display().to_string().blue());
        for name in &file.report.hallucinations {
            println!("      {} {}", "-".dimmed(), name.red());
        }
        if !file.report.versions.is_empty() {
            println!(
                "      {}",
                format!("cites versions: {}", file.report.versions.join(", ")).yellow()
            );
        }
    }
}

fn write_no_code(files: &[&FileReport]) {
    println!("  {} ({}):", "No code".dimmed(), files.len());
    for file in files {
        println!("    {}", file.path.display().to_string().dimmed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str, has_code: bool, hallucinations: &[&str]) -> FileReport {
        FileReport {
            path: PathBuf::from(path),
            report: ResponseReport {
                has_code,
                level: HallucinationLevel::Library,
                library: None,
                hallucinations: hallucinations.iter().map(|s| s.to_string()).collect(),
                versions: Vec::new(),
            },
        }
    }

    #[test]
    fn test_build_json_report() {
        let files = vec![
            file("a.md", true, &["fakepkg"]),
            file("b.md", true, &[]),
            file("c.md", false, &[]),
            file("d.md", true, &["fakepkg", "otherfake"]),
        ];

        let report = build_json_report(HallucinationLevel::Library, None, &files);

        assert_eq!(report.level, "library");
        assert_eq!(report.files_scanned, 4);
        assert_eq!(report.hallucinating, 2);
        assert_eq!(report.hallucination_count, 2);
        assert_eq!(report.hallucinations[0].name, "fakepkg");
        assert_eq!(report.hallucinations[0].files, vec!["a.md", "d.md"]);
        assert_eq!(report.responses.len(), 3);
        assert_eq!(report.no_code, vec!["c.md"]);
    }

    #[test]
    fn test_json_report_omits_empty_fields() {
        let files = vec![file("a.md", true, &[])];
        let report = build_json_report(HallucinationLevel::Library, None, &files);
        let value = serde_json::to_value(&report).unwrap();

        assert_eq!(value["level"], "library");
        assert!(value.get("library").is_none());
        assert!(value["responses"][0].get("versions").is_none());
    }
}

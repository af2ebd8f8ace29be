//! Command-line interface for hallulib.

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::check::HallucinationLevel;
use crate::config::{self, Config, CONFIG_TEMPLATE};
use crate::registry::GroundTruth;
use crate::report::{self, FileReport};

/// Exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_ERROR: i32 = 2;

/// Response file extensions picked up when scanning directories.
const RESPONSE_EXTENSIONS: &[&str] = &["md", "markdown", "txt"];

/// Detect hallucinated libraries and members in LLM-generated code.
///
/// hallulib reads model responses (markdown with fenced code), extracts
/// installs, imports and member accesses, and reports names that do not
/// exist in the package index or the library's documentation.
#[derive(Parser)]
#[command(name = "hallulib")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check model responses for hallucinations
    #[command(visible_alias = "check")]
    Scan(ScanArgs),
    /// Download a fresh package registry from the PyPI simple index
    RefreshPypi(RefreshArgs),
    /// Create a hallulib config file
    Init(InitArgs),
}

/// Arguments for the scan command.
#[derive(Parser)]
pub struct ScanArgs {
    /// Response files or directories to check
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Path to config YAML file (default: auto-discover)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Detection level: library or member
    #[arg(short, long)]
    pub level: Option<String>,

    /// Target library for member-level checks
    #[arg(long)]
    pub library: Option<String>,

    /// Only check `pip install` names when a response has any
    #[arg(long)]
    pub installs_only: bool,

    /// Package registry JSON file
    #[arg(long)]
    pub pypi_file: Option<PathBuf>,

    /// Library documentation JSON file
    #[arg(long)]
    pub documentation_file: Option<PathBuf>,

    /// Output format: pretty or json
    #[arg(short, long, default_value = "pretty")]
    pub format: String,
}

/// Arguments for the refresh-pypi command.
#[derive(Parser)]
pub struct RefreshArgs {
    /// Output file (default: platform data directory)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the init command.
#[derive(Parser)]
pub struct InitArgs {
    /// Output file path
    #[arg(short, long, default_value = "hallulib.yaml")]
    pub output: PathBuf,
}

/// Collect response files under `root`.
fn collect_files(root: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            // Skip hidden directories
            !(e.file_type().is_dir() && e.depth() > 0 && name.starts_with('.'))
        })
    {
        let entry = entry?;
        if entry.file_type().is_file() {
            let path = entry.path();
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            if RESPONSE_EXTENSIONS.contains(&ext) {
                files.push(path.to_path_buf());
            }
        }
    }

    Ok(files)
}

/// Apply command-line overrides on top of the config file.
fn merge_args(mut config: Config, args: &ScanArgs) -> Config {
    if args.level.is_some() {
        config.level = args.level.clone();
    }
    if args.library.is_some() {
        config.library = args.library.clone();
    }
    if args.installs_only {
        config.installs_only = true;
    }
    if args.pypi_file.is_some() {
        config.pypi_file = args.pypi_file.clone();
    }
    if args.documentation_file.is_some() {
        config.documentation_file = args.documentation_file.clone();
    }
    config
}

/// Load ground truth up front so missing files fail before any work.
fn preload(
    ground_truth: &GroundTruth,
    config: &Config,
    level: HallucinationLevel,
) -> crate::Result<()> {
    match (level, config.library.as_deref()) {
        (HallucinationLevel::Library, _) => {
            let known = ground_truth.load_known_libraries(
                None,
                config.include_stdlib,
                config.include_valid_extras,
            )?;
            if let Some(fetched_at) = known.fetched_at() {
                debug!(fetched_at, "registry snapshot");
            }
        }
        (HallucinationLevel::Member, Some(library)) => {
            ground_truth.load_library_documentation(None)?.get(library)?;
        }
        (HallucinationLevel::Member, None) => return Err(crate::HalluError::MissingLibrary),
    }
    Ok(())
}

/// Run the scan command.
pub fn run_scan(args: &ScanArgs) -> anyhow::Result<i32> {
    // Validate format
    if args.format != "pretty" && args.format != "json" {
        eprintln!(
            "Error: invalid format {:?}, must be 'pretty' or 'json'",
            args.format
        );
        return Ok(EXIT_ERROR);
    }

    let (config, config_path) = match Config::load(args.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };
    if let Some(path) = &config_path {
        info!(path = %path.display(), "using config");
    }

    let config = merge_args(config, args);
    if let Err(e) = config::validate(&config) {
        eprintln!("Error: invalid configuration: {}", e);
        return Ok(EXIT_ERROR);
    }
    let level = config.get_level()?;
    let library = config.library.as_deref();

    // Collect files to scan
    let mut files = Vec::new();
    for path in &args.paths {
        let metadata = match fs::metadata(path) {
            Ok(m) => m,
            Err(e) => {
                eprintln!("Error: cannot access path {:?}: {}", path, e);
                return Ok(EXIT_ERROR);
            }
        };
        if metadata.is_dir() {
            files.extend(collect_files(path)?);
        } else {
            files.push(path.clone());
        }
    }

    if files.is_empty() {
        eprintln!("Warning: no files to scan");
        return Ok(EXIT_SUCCESS);
    }

    let ground_truth = config.ground_truth();
    if let Err(e) = preload(&ground_truth, &config, level) {
        eprintln!("Error: {}", e);
        return Ok(EXIT_ERROR);
    }
    let checker = config.checker(&ground_truth);

    let progress = if args.format == "pretty" && files.len() > 1 {
        let bar = ProgressBar::new(files.len() as u64);
        bar.set_style(ProgressStyle::with_template(
            "  {spinner} [{bar:30}] {pos}/{len} {msg}",
        )?);
        bar
    } else {
        ProgressBar::hidden()
    };

    // Check files in parallel; any fatal error aborts the scan
    let mut results: Vec<FileReport> = files
        .par_iter()
        .map(|path| -> anyhow::Result<FileReport> {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let report = checker
                .check(&text, level, library)
                .with_context(|| format!("failed to check {}", path.display()))?;
            progress.inc(1);
            Ok(FileReport {
                path: path.clone(),
                report,
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    progress.finish_and_clear();

    results.sort_by(|a, b| a.path.cmp(&b.path));

    let (hits, misses) = ground_truth.cache_stats();
    debug!(files = results.len(), hits, misses, "scan complete");

    let path_str = args
        .paths
        .iter()
        .map(|p| p.to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join(", ");

    match args.format.as_str() {
        "json" => report::write_json(level, library, &results)?,
        _ => report::write_pretty(&path_str, level, library, &results),
    }

    if results.iter().any(|r| !r.report.is_clean()) {
        Ok(EXIT_FAILED)
    } else {
        Ok(EXIT_SUCCESS)
    }
}

/// Run the refresh-pypi command.
pub fn run_refresh(args: &RefreshArgs) -> anyhow::Result<i32> {
    let output = args
        .output
        .clone()
        .unwrap_or_else(config::default_refresh_path);

    let documentation = config::data_dir().join("documentation.json");
    let ground_truth = GroundTruth::with_paths(&output, documentation);
    let runtime = tokio::runtime::Runtime::new()?;
    let count = match runtime.block_on(ground_truth.refresh_known_libraries(None)) {
        Ok(count) => count,
        Err(e) => {
            eprintln!("Error: failed to refresh PyPI registry: {}", e);
            return Ok(EXIT_ERROR);
        }
    };

    println!("Wrote {} packages to {}", count, output.display());
    Ok(EXIT_SUCCESS)
}

/// Run the init command.
pub fn run_init(args: &InitArgs) -> anyhow::Result<i32> {
    // Check if output already exists
    if args.output.exists() {
        eprintln!("Error: file already exists: {}", args.output.display());
        eprintln!("Remove it or use --output to specify a different path");
        return Ok(EXIT_ERROR);
    }

    // Create output directory if needed
    if let Some(parent) = args.output.parent() {
        if !parent.as_os_str().is_empty() && parent != Path::new(".") {
            if let Err(e) = fs::create_dir_all(parent) {
                eprintln!("Error: failed to create directory: {}", e);
                return Ok(EXIT_ERROR);
            }
        }
    }

    if let Err(e) = fs::write(&args.output, CONFIG_TEMPLATE) {
        eprintln!("Error: failed to write config: {}", e);
        return Ok(EXIT_ERROR);
    }

    println!("Created {}", args.output.display());
    println!();
    println!("Next steps:");
    println!("  1. Point pypi_file and documentation_file at your ground truth");
    println!("  2. Run: hallulib scan responses/ --config {}", args.output.display());

    Ok(EXIT_SUCCESS)
}

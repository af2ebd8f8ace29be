//! PyPI (Python Package Index) simple-index download.
//!
//! Fetches `https://pypi.org/simple/`, takes the text of every anchor tag as
//! a project name and writes the normalized, sorted list as a registry file.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use serde::Serialize;
use tracing::info;

use crate::error::{HalluError, Result};
use crate::normalize::normalize;

/// The PyPI simple index page listing every project.
pub const PYPI_SIMPLE_INDEX_URL: &str = "https://pypi.org/simple/";

/// The index is tens of megabytes.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Serialize)]
struct RegistryFile<'a> {
    datetime: String,
    data: Vec<&'a str>,
}

/// Fetch all project names from the PyPI simple index.
pub async fn fetch_package_names(client: &Client) -> Result<BTreeSet<String>> {
    let response = client
        .get(PYPI_SIMPLE_INDEX_URL)
        .timeout(DOWNLOAD_TIMEOUT)
        .send()
        .await?
        .error_for_status()?;

    let html = response.text().await?;
    let names = parse_simple_index(&html);
    info!(count = names.len(), "fetched PyPI simple index");
    Ok(names)
}

/// Extract normalized project names from simple-index HTML.
pub fn parse_simple_index(html: &str) -> BTreeSet<String> {
    lazy_static::lazy_static! {
        static ref ANCHOR_RE: Regex = Regex::new(r"(?is)<a\b[^>]*>([^<]*)</a>").unwrap();
    }

    ANCHOR_RE
        .captures_iter(html)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|name| !name.is_empty())
        .map(normalize)
        .collect()
}

/// Write names as a registry file: `{"datetime": ..., "data": [...]}`.
pub fn write_registry_file(destination: &Path, names: &BTreeSet<String>) -> Result<()> {
    if let Some(parent) = destination.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let file = RegistryFile {
        datetime: chrono::Utc::now().to_rfc3339(),
        data: names.iter().map(String::as_str).collect(),
    };
    let json = serde_json::to_vec(&file).map_err(|e| HalluError::parse(destination, e))?;
    fs::write(destination, json)?;
    Ok(())
}

/// Download the index and save it to `destination`.
///
/// Returns the number of packages written.
pub async fn download_pypi_data(destination: &Path) -> Result<usize> {
    let client = Client::builder()
        .user_agent(concat!("hallulib/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let names = fetch_package_names(&client).await?;
    write_registry_file(destination, &names)?;
    info!(path = %destination.display(), count = names.len(), "wrote PyPI registry");
    Ok(names.len())
}

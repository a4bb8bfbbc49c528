// src/discovery.rs
//
// Layout discovery: every immediate sub-directory of a root whose name parses
// as a layout label is one strategy.

use regex::{escape, Regex};
use std::fs;
use tracing::{debug, info};

use crate::error::{BenchError, Result};
use crate::store::{locator_to_path, BackendType};
use crate::strategy::LayoutLabel;

/// Converts a simple glob (with `*` and `?`) into a fully-anchored regex string.
pub fn glob_to_regex(glob: &str) -> String {
    format!("^{}$", escape(glob).replace(r"\*", ".*").replace(r"\?", "."))
}

/// List layout locators under `root`, sorted by name, optionally filtered by a glob
/// on the directory name.
pub fn discover_layouts(root: &str, filter: Option<&str>) -> Result<Vec<String>> {
    if BackendType::from_uri(root) != Some(BackendType::Directory) {
        return Err(BenchError::Configuration(format!("cannot list layouts under '{}'", root)));
    }
    let pattern = filter
        .map(|g| Regex::new(&glob_to_regex(g)))
        .transpose()
        .map_err(|e| BenchError::Configuration(format!("invalid filter: {}", e)))?;

    let dir = locator_to_path(root)?;
    let entries = fs::read_dir(&dir).map_err(|e| BenchError::open(root, e))?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(re) = &pattern {
            if !re.is_match(&name) {
                continue;
            }
        }
        match LayoutLabel::parse(&name) {
            Ok(_) => names.push(name),
            Err(e) => debug!("Ignoring {}: {}", name, e),
        }
    }
    names.sort();

    let base = root.trim_end_matches('/');
    let locators: Vec<String> = names.iter().map(|n| format!("{}/{}", base, n)).collect();
    info!("Discovered {} layouts under {}", locators.len(), root);
    Ok(locators)
}

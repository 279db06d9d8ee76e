//! Loads prompt templates from disk on top of the built-in ones.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Reads every `*.md` file in `prompts_path`, keyed by file stem, and lays
/// them over the templates compiled into `ispy-core`.
///
/// A missing directory is not an error: the built-in templates are used.
pub fn load_prompts(prompts_path: &Path) -> Result<HashMap<String, String>> {
    if !prompts_path.is_dir() {
        warn!(path = %prompts_path.display(), "Prompts directory not found, using built-in templates");
        return Ok(ispy_core::prompts::default_prompts());
    }

    let mut overrides = HashMap::new();
    for entry in fs::read_dir(prompts_path)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("md") {
            let prompt_key = path
                .file_stem()
                .and_then(|s| s.to_str())
                .context("Could not get file stem")?
                .to_string();
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read prompt {}", path.display()))?;
            overrides.insert(prompt_key, content);
        }
    }
    info!(path = %prompts_path.display(), overrides = overrides.len(), "Loaded prompt templates");
    Ok(ispy_core::prompts::with_overrides(overrides))
}

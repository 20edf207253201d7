//! Finding the engine executable on disk.

use crate::config::EngineConfig;
use crate::provider::{EngineError, EngineResult};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Resolve the engine executable: explicit path first, then the candidate list.
pub fn locate(config: &EngineConfig) -> EngineResult<PathBuf> {
    if let Some(explicit) = &config.executable {
        let resolved = if explicit.is_absolute() {
            explicit.clone()
        } else {
            config.search_root.join(explicit)
        };
        if resolved.is_file() {
            info!("Using configured AXIOM executable: {}", resolved.display());
            return Ok(resolved);
        }
        warn!(
            "Configured executable {} does not exist, probing build directories",
            resolved.display()
        );
    }

    let mut searched = Vec::with_capacity(config.candidates.len());
    for candidate in &config.candidates {
        let path = config.search_root.join(candidate);
        debug!("Probing {}", path.display());
        if path.is_file() {
            info!("Found AXIOM executable: {}", path.display());
            return Ok(path);
        }
        searched.push(path);
    }

    let strays = stray_executables(&config.search_root);
    Err(EngineError::NotFound { searched, strays })
}

/// Files under `root` that look like an engine binary but sit outside the candidate list.
pub fn stray_executables(root: &Path) -> Vec<PathBuf> {
    let pattern = root.join("**").join("*[aA][xX][iI][oO][mM]*");
    let Some(pattern) = pattern.to_str() else {
        return Vec::new();
    };

    let Ok(entries) = glob::glob(pattern) else {
        return Vec::new();
    };

    entries
        .filter_map(Result::ok)
        .filter(|path| path.is_file())
        .filter(|path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            name.ends_with(".exe") || !name.contains('.')
        })
        .collect()
}

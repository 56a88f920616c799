//! Profile persistence
//!
//! Save/load/list/delete analysis profiles as pretty JSON files in a
//! directory chosen by the caller.

use std::path::{Path, PathBuf};

use crate::domain::{AnalysisProfile, SigscopeError, SigscopeResult};

/// Profile that always exists and cannot be deleted
pub const DEFAULT_PROFILE: &str = "Default";

/// Sanitize a profile name to prevent path traversal. Rejects path
/// separators, "..", empty names and anything other than alphanumerics,
/// spaces, hyphens and underscores.
pub fn sanitize_name(name: &str) -> SigscopeResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(SigscopeError::Config("Profile name cannot be empty".into()));
    }
    if trimmed.contains("..") || trimmed.contains('/') || trimmed.contains('\\') {
        return Err(SigscopeError::Config("Invalid profile name".into()));
    }
    if !trimmed
        .chars()
        .all(|c| c.is_alphanumeric() || c == ' ' || c == '-' || c == '_')
    {
        return Err(SigscopeError::Config(
            "Profile name contains invalid characters".into(),
        ));
    }
    Ok(trimmed.to_string())
}

fn profile_path(dir: &Path, name: &str) -> SigscopeResult<PathBuf> {
    let name = sanitize_name(name)?;
    Ok(dir.join(format!("{name}.json")))
}

pub fn save_profile(dir: &Path, profile: &AnalysisProfile) -> SigscopeResult<()> {
    let path = profile_path(dir, &profile.name)?;
    std::fs::create_dir_all(dir)?;
    let json = serde_json::to_string_pretty(profile)
        .map_err(|e| SigscopeError::Config(format!("Serialization error: {e}")))?;
    std::fs::write(&path, json)?;
    log::debug!("Saved profile '{}' to {}", profile.name, path.display());
    Ok(())
}

/// Load a profile. A missing "Default" profile yields the built-in defaults.
pub fn load_profile(dir: &Path, name: &str) -> SigscopeResult<AnalysisProfile> {
    let path = profile_path(dir, name)?;
    if !path.exists() && sanitize_name(name)? == DEFAULT_PROFILE {
        return Ok(AnalysisProfile::default());
    }
    let json = std::fs::read_to_string(&path)
        .map_err(|e| SigscopeError::Config(format!("Failed to read profile '{name}': {e}")))?;
    serde_json::from_str(&json)
        .map_err(|e| SigscopeError::Config(format!("Failed to parse profile '{name}': {e}")))
}

/// Names of the saved profiles, sorted. A missing directory has none.
pub fn list_profiles(dir: &Path) -> SigscopeResult<Vec<String>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut names: Vec<String> = std::fs::read_dir(dir)?
        .filter_map(|entry| {
            let entry = entry.ok()?;
            let path = entry.path();
            if path.extension()?.to_str()? == "json" {
                path.file_stem()?.to_str().map(String::from)
            } else {
                None
            }
        })
        .collect();
    names.sort();
    Ok(names)
}

pub fn delete_profile(dir: &Path, name: &str) -> SigscopeResult<()> {
    let name = sanitize_name(name)?;
    if name == DEFAULT_PROFILE {
        return Err(SigscopeError::Config(
            "Cannot delete the Default profile".into(),
        ));
    }
    let path = dir.join(format!("{name}.json"));
    if !path.exists() {
        return Err(SigscopeError::Config(format!("Profile '{name}' not found")));
    }
    std::fs::remove_file(&path)?;
    log::debug!("Deleted profile '{name}'");
    Ok(())
}

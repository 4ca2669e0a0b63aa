//! Platform-specific paths for templates and configuration.
//!
//! # Directory Structure
//!
//! - **User config**: `~/.config/polykey/` (Linux), `~/Library/Application Support/polykey/` (macOS), `%APPDATA%\polykey\` (Windows)
//! - **User templates**: `templates/` under the user config directory
//! - **Engine config**: `engine.toml` under the user config directory

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Application name used for directory paths.
const APP_NAME: &str = "polykey";

/// Subdirectory name for templates.
const TEMPLATES_SUBDIR: &str = "templates";

/// File name of the engine configuration.
const ENGINE_CONFIG_FILE: &str = "engine.toml";

/// Returns the user-specific configuration directory.
///
/// Returns a fallback path if the config directory cannot be determined.
pub fn user_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Returns the user-specific templates directory.
pub fn user_templates_dir() -> PathBuf {
    user_config_dir().join(TEMPLATES_SUBDIR)
}

/// Returns the default engine configuration file path.
pub fn engine_config_path() -> PathBuf {
    user_config_dir().join(ENGINE_CONFIG_FILE)
}

/// Find a template file by path or by name.
///
/// `name` is first tried as a path, then as a file name (with `.toml`
/// appended if missing) in the user templates directory.
pub fn find_template(name: &str) -> Option<PathBuf> {
    let path = PathBuf::from(name);
    if path.is_file() {
        return Some(path);
    }

    let filename = if name.ends_with(".toml") {
        name.to_string()
    } else {
        format!("{name}.toml")
    };
    let user_path = user_templates_dir().join(filename);
    user_path.is_file().then_some(user_path)
}

/// Ensure the user templates directory exists.
pub fn ensure_user_templates_dir() -> Result<PathBuf, ConfigError> {
    let dir = user_templates_dir();
    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| ConfigError::create_dir(&dir, e))?;
    }
    Ok(dir)
}

/// List template files in the user templates directory.
///
/// Returns an empty vector if the directory doesn't exist or can't be read.
pub fn list_user_templates() -> Vec<PathBuf> {
    list_templates_in_dir(&user_templates_dir())
}

/// List `.toml` files in `dir`, sorted by name.
pub fn list_templates_in_dir(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    paths.sort();
    paths
}

/// Template name from a file path (the file stem).
///
/// ```rust
/// use polykey_config::paths::template_name_from_path;
/// use std::path::Path;
///
/// let name = template_name_from_path(Path::new("/path/to/glass_pad.toml"));
/// assert_eq!(name, Some("glass_pad".to_string()));
/// ```
pub fn template_name_from_path(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string())
}

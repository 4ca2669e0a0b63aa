//! Voice template files.
//!
//! A template file is a [`VoiceTemplate`] serialized as TOML. Loading
//! validates every range; saving writes whatever the engine captured.

use std::path::Path;

use polykey_voice::VoiceTemplate;
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::factory_templates::get_factory_template;
use crate::paths::find_template;
use crate::validation::validate_template;

/// Parse and validate a template from a TOML string.
pub fn template_from_toml(toml_str: &str) -> Result<VoiceTemplate, ConfigError> {
    let template: VoiceTemplate = toml::from_str(toml_str)?;
    validate_template(&template)?;
    Ok(template)
}

/// Convert a template to a TOML string.
pub fn template_to_toml(template: &VoiceTemplate) -> Result<String, ConfigError> {
    Ok(toml::to_string_pretty(template)?)
}

/// Load and validate a template file.
pub fn load_template(path: impl AsRef<Path>) -> Result<VoiceTemplate, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
    let template = template_from_toml(&content)?;
    debug!(path = %path.display(), name = %template.name, "template loaded");
    Ok(template)
}

/// Save a template file, creating parent directories as needed.
pub fn save_template(template: &VoiceTemplate, path: impl AsRef<Path>) -> Result<(), ConfigError> {
    let path = path.as_ref();

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
    }

    let content = template_to_toml(template)?;
    std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))?;
    info!(path = %path.display(), name = %template.name, "template saved");
    Ok(())
}

/// Find a template by factory name, file path, or user template name.
///
/// Factory templates win over files with the same name.
pub fn resolve_template(name: &str) -> Result<VoiceTemplate, ConfigError> {
    if let Some(template) = get_factory_template(name) {
        return Ok(template);
    }
    match find_template(name) {
        Some(path) => load_template(path),
        None => Err(ConfigError::UnknownTemplate(name.to_string())),
    }
}

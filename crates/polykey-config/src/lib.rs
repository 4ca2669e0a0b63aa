//! Configuration and template management for polykey.
//!
//! # Features
//!
//! - **Engine config**: [`EngineConfig`] loaded from TOML and converted into
//!   [`EngineSettings`](polykey_engine::EngineSettings)
//! - **Template files**: load and save [`VoiceTemplate`](polykey_voice::VoiceTemplate)s as TOML
//! - **Validation**: range checks that report every problem in a file
//! - **Paths**: platform-specific config and template directories
//! - **Factory templates**: built-in sounds that need no files
//!
//! # Example
//!
//! ```rust,no_run
//! use polykey_config::{EngineConfig, resolve_template, save_template, user_templates_dir};
//!
//! let config = EngineConfig::load("engine.toml").unwrap();
//! let settings = config.to_settings().unwrap();
//!
//! let template = resolve_template(config.template.as_deref().unwrap_or("init")).unwrap();
//! save_template(&template, user_templates_dir().join("copy.toml")).unwrap();
//! # let _ = settings;
//! ```

mod engine_config;
mod error;
mod template_file;

/// Platform-specific paths for templates and configuration.
pub mod paths;

/// Range validation.
pub mod validation;

/// Factory templates bundled with the library.
pub mod factory_templates;

pub use engine_config::EngineConfig;
pub use error::ConfigError;
pub use factory_templates::{
    FACTORY_TEMPLATE_NAMES, factory_template_names, factory_templates, get_factory_template,
    is_factory_template,
};
pub use paths::{
    engine_config_path, ensure_user_templates_dir, find_template, list_user_templates,
    template_name_from_path, user_config_dir, user_templates_dir,
};
pub use template_file::{
    load_template, resolve_template, save_template, template_from_toml, template_to_toml,
};
pub use validation::{ValidationError, ValidationResult, validate_engine_config, validate_template};

//! Configuration loading, validation, env substitution, and config merging.
//!
//! Config files: `trellis.toml`, `trellis.yaml`, or `trellis.json`.
//! Searched in the app directory, then `~/.config/trellis/`.
//!
//! Supports `${ENV_VAR}` and `${ENV_VAR:-fallback}` substitution in all string values.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod merge;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{LoadedConfig, discover_and_load, find_config_file, load_config, user_config_dir},
    merge::merge_json,
    schema::{
        AppConfig, BundlerSettings, DevConfig, EntrySettings, HtmlConfig, OutputConfig,
        SHELL_HOOK_NAMES, ServerConfig, ShellPluginConfig, SourceConfig, SsrOptions, SsrSetting,
    },
    validate::{Diagnostic, Severity, ValidationResult},
};

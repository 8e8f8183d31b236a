//! Config schema types (source, output, server, html, dev, bundler, plugins).
use std::{
    collections::{BTreeMap, HashMap},
    path::PathBuf,
};

use {
    serde::{Deserialize, Serialize},
    serde_json::Value,
    trellis_common::{Entrypoint, SsrMode},
};

use crate::error::{Context, Result};

/// Hook names a config-declared shell plugin may subscribe to.
pub const SHELL_HOOK_NAMES: &[&str] = &[
    "modify_config",
    "add_watch_files",
    "on_prepare",
    "on_before_create_compiler",
    "on_after_create_compiler",
    "on_before_build",
    "on_after_build",
    "on_before_dev",
    "on_dev_compile_done",
    "on_file_changed",
    "on_after_dev",
    "on_before_exit",
];

/// Root configuration.
///
/// Keys that are not part of the schema are kept in `extra` so that plugins
/// can read their own sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub source: SourceConfig,
    pub output: OutputConfig,
    pub server: ServerConfig,
    pub html: HtmlConfig,
    pub dev: DevConfig,
    pub bundler: BundlerSettings,
    pub plugins: Vec<ShellPluginConfig>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Named entrypoints. When empty a single `main` entry is assumed.
    pub entries: BTreeMap<String, EntrySettings>,
    /// Load each entry through a dynamic `import()` bootstrap.
    pub enable_async_entry: bool,
    /// Name of the implicit entry used when `entries` is empty.
    pub main_entry_name: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            enable_async_entry: false,
            main_entry_name: "main".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntrySettings {
    pub entry: PathBuf,
    /// Skip generated mount code; the entry mounts itself.
    #[serde(default)]
    pub disable_mount: bool,
    #[serde(default)]
    pub custom_entry: bool,
    #[serde(default)]
    pub custom_bootstrap: Option<PathBuf>,
    #[serde(default)]
    pub custom_server_entry: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dist_path: PathBuf,
    /// Static site generation renders every entry to a string.
    pub ssg: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dist_path: PathBuf::from("dist"),
            ssg: false,
        }
    }
}

/// `server.ssr` accepts `true`/`false` or a table such as `{ mode = "stream" }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SsrSetting {
    Enabled(bool),
    Options(SsrOptions),
}

impl Default for SsrSetting {
    fn default() -> Self {
        Self::Enabled(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SsrOptions {
    pub mode: Option<String>,
}

impl SsrSetting {
    fn is_enabled(&self) -> bool {
        !matches!(self, Self::Enabled(false))
    }

    fn mode(&self) -> Option<SsrMode> {
        match self {
            Self::Enabled(false) => None,
            Self::Enabled(true) => Some(SsrMode::String),
            Self::Options(opts) if opts.mode.as_deref() == Some("stream") => Some(SsrMode::Stream),
            Self::Options(_) => Some(SsrMode::String),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub ssr: SsrSetting,
    /// Per-entry SSR override; a disabled override falls back to `ssr`.
    pub ssr_by_entries: BTreeMap<String, SsrSetting>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            ssr: SsrSetting::default(),
            ssr_by_entries: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HtmlConfig {
    /// DOM id the client entry mounts into.
    pub mount_id: String,
    pub title: Option<String>,
}

impl Default for HtmlConfig {
    fn default() -> Self {
        Self {
            mount_id: "root".into(),
            title: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DevConfig {
    /// Paths watched for changes, relative to the app directory.
    pub watch: Vec<PathBuf>,
    pub debounce_ms: u64,
}

impl Default for DevConfig {
    fn default() -> Self {
        Self {
            watch: vec![PathBuf::from("src")],
            debounce_ms: 300,
        }
    }
}

/// How the external bundler is driven.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BundlerSettings {
    pub name: String,
    /// Shell command for a full build. The bundler config is passed on stdin.
    pub build_command: Option<String>,
    /// Shell command for an incremental rebuild; falls back to `build_command`.
    pub rebuild_command: Option<String>,
    pub env: HashMap<String, String>,
    /// Seconds before a bundler command is abandoned. No limit when unset.
    pub timeout: Option<u64>,
}

impl Default for BundlerSettings {
    fn default() -> Self {
        Self {
            name: "rspack".into(),
            build_command: None,
            rebuild_command: None,
            env: HashMap::new(),
            timeout: None,
        }
    }
}

/// A plugin declared in config whose hooks run shell commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShellPluginConfig {
    pub name: String,
    #[serde(default)]
    pub pre: Vec<String>,
    #[serde(default)]
    pub post: Vec<String>,
    #[serde(default)]
    pub rivals: Vec<String>,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Hook name to shell command.
    #[serde(default)]
    pub hooks: BTreeMap<String, String>,
}

fn default_timeout() -> u64 {
    10
}

impl AppConfig {
    /// SSR mode an entry gets from configuration alone.
    ///
    /// Static generation always renders to a string. Otherwise an enabled
    /// per-entry setting wins over the global `server.ssr`.
    pub fn ssr_mode_for(&self, entry_name: &str) -> Option<SsrMode> {
        if self.output.ssg {
            return Some(SsrMode::String);
        }
        match self.server.ssr_by_entries.get(entry_name) {
            Some(setting) if setting.is_enabled() => setting.mode(),
            _ => self.server.ssr.mode(),
        }
    }

    /// Entrypoints declared by `source.entries`, or the implicit main entry.
    pub fn entrypoints(&self) -> Vec<Entrypoint> {
        if self.source.entries.is_empty() {
            return vec![Entrypoint::new(
                self.source.main_entry_name.clone(),
                "src/App.tsx",
            )];
        }
        self.source
            .entries
            .iter()
            .map(|(name, settings)| Entrypoint {
                is_auto_mount: !settings.disable_mount,
                custom_entry: settings.custom_entry,
                custom_bootstrap: settings.custom_bootstrap.clone(),
                custom_server_entry: settings.custom_server_entry.clone(),
                ..Entrypoint::new(name.clone(), settings.entry.clone())
            })
            .collect()
    }

    /// Fill in values that plugins may have blanked while modifying the config.
    pub fn normalize(&mut self) {
        if self.html.mount_id.trim().is_empty() {
            self.html.mount_id = HtmlConfig::default().mount_id;
        }
        if self.source.main_entry_name.trim().is_empty() {
            self.source.main_entry_name = SourceConfig::default().main_entry_name;
        }
        if self.dev.watch.is_empty() {
            self.dev.watch = DevConfig::default().watch;
        }
        if self.output.dist_path.as_os_str().is_empty() {
            self.output.dist_path = OutputConfig::default().dist_path;
        }
    }

    /// Apply a JSON merge patch and re-read the result as a config.
    pub fn merged(&self, patch: Value) -> Result<Self> {
        let mut value = serde_json::to_value(self)?;
        crate::merge::merge_json(&mut value, patch);
        serde_json::from_value(value).context("merged config does not match the schema")
    }

    /// Look up a plugin-owned section kept outside the schema.
    pub fn extra_section(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {rstest::rstest, serde_json::json};

    use super::*;

    fn with_server(ssr: Value, by_entries: Value) -> AppConfig {
        let server: ServerConfig =
            serde_json::from_value(json!({ "ssr": ssr, "ssr_by_entries": by_entries })).unwrap();
        AppConfig {
            server,
            ..Default::default()
        }
    }

    #[rstest]
    #[case(json!(false), json!({}), None)]
    #[case(json!(true), json!({}), Some(SsrMode::String))]
    #[case(json!({"mode": "stream"}), json!({}), Some(SsrMode::Stream))]
    #[case(json!({"mode": "string"}), json!({}), Some(SsrMode::String))]
    #[case(json!({}), json!({}), Some(SsrMode::String))]
    #[case(json!(false), json!({"main": {"mode": "stream"}}), Some(SsrMode::Stream))]
    #[case(json!({"mode": "stream"}), json!({"main": false}), Some(SsrMode::Stream))]
    #[case(json!(true), json!({"other": {"mode": "stream"}}), Some(SsrMode::String))]
    fn ssr_mode_resolution(
        #[case] ssr: Value,
        #[case] by_entries: Value,
        #[case] expected: Option<SsrMode>,
    ) {
        assert_eq!(with_server(ssr, by_entries).ssr_mode_for("main"), expected);
    }

    #[test]
    fn ssg_forces_string_rendering() {
        let mut config = with_server(json!({"mode": "stream"}), json!({}));
        config.output.ssg = true;
        assert_eq!(config.ssr_mode_for("main"), Some(SsrMode::String));
    }

    #[test]
    fn implicit_main_entry() {
        let entries = AppConfig::default().entrypoints();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "main");
        assert_eq!(entries[0].entry, PathBuf::from("src/App.tsx"));
    }

    #[test]
    fn declared_entries_keep_overrides() {
        let config: AppConfig = toml::from_str(
            r#"
[source.entries.admin]
entry = "src/admin/App.tsx"
disable_mount = true

[source.entries.home]
entry = "src/home/index.tsx"
custom_entry = true
custom_bootstrap = "src/home/bootstrap.tsx"
"#,
        )
        .unwrap();
        let entries = config.entrypoints();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "admin");
        assert!(!entries[0].is_auto_mount);
        assert_eq!(entries[1].name, "home");
        assert!(entries[1].custom_entry);
        assert_eq!(
            entries[1].custom_bootstrap.as_deref(),
            Some(std::path::Path::new("src/home/bootstrap.tsx"))
        );
    }

    #[test]
    fn unknown_sections_land_in_extra() {
        let config: AppConfig = toml::from_str(
            r#"
[analytics]
token = "abc"
"#,
        )
        .unwrap();
        assert_eq!(
            config.extra_section("analytics"),
            Some(&json!({"token": "abc"}))
        );
    }

    #[test]
    fn merged_patch_updates_nested_values() {
        let config = AppConfig::default();
        let merged = config
            .merged(json!({"html": {"mount_id": "app"}, "server": {"ssr": true}}))
            .unwrap();
        assert_eq!(merged.html.mount_id, "app");
        assert_eq!(merged.server.ssr, SsrSetting::Enabled(true));
        assert_eq!(merged.output, config.output);
    }

    #[test]
    fn merged_patch_with_wrong_type_is_rejected() {
        let err = AppConfig::default()
            .merged(json!({"server": {"port": "eighty"}}))
            .unwrap_err();
        assert!(err.to_string().contains("does not match the schema"));
    }

    #[test]
    fn normalize_restores_blanked_defaults() {
        let mut config = AppConfig::default();
        config.html.mount_id = " ".into();
        config.dev.watch.clear();
        config.normalize();
        assert_eq!(config.html.mount_id, "root");
        assert_eq!(config.dev.watch, vec![PathBuf::from("src")]);
    }

    #[test]
    fn shell_plugin_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
[[plugins]]
name = "lint"
pre = ["trellis:runtime"]
hooks = { on_before_build = "eslint src" }
"#,
        )
        .unwrap();
        let plugin = &config.plugins[0];
        assert_eq!(plugin.timeout, 10);
        assert_eq!(plugin.pre, vec!["trellis:runtime".to_string()]);
        assert_eq!(plugin.hooks["on_before_build"], "eslint src");
    }
}

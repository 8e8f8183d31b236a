//! Domain types passed between the engine, its plugins and the collaborators.

use std::{fmt, path::PathBuf, time::Duration};

use {
    serde::{Deserialize, Serialize},
    serde_json::Value,
};

// ── Command ─────────────────────────────────────────────────────────────────

/// The top-level command a runner session was started for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Dev,
    Build,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dev => f.write_str("dev"),
            Self::Build => f.write_str("build"),
        }
    }
}

// ── SSR ─────────────────────────────────────────────────────────────────────

/// Server-side rendering flavour of an entrypoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SsrMode {
    /// Render the full document to a string before responding.
    String,
    /// Stream the document as it renders.
    Stream,
}

impl fmt::Display for SsrMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => f.write_str("string"),
            Self::Stream => f.write_str("stream"),
        }
    }
}

// ── Entrypoints ─────────────────────────────────────────────────────────────

/// A runtime plugin that generated entry code registers for one entrypoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimePlugin {
    pub name: String,
    /// Import specifier of the plugin module.
    pub path: String,
    #[serde(default)]
    pub config: Value,
}

/// An application entrypoint as seen by hooks and code generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entrypoint {
    pub name: String,
    /// Source file of the entry, relative to the app directory.
    pub entry: PathBuf,
    /// Whether the framework generates the mount code for this entry.
    #[serde(default = "default_true")]
    pub is_auto_mount: bool,
    /// The entry file is a user-written `index` rather than an `App` component.
    #[serde(default)]
    pub custom_entry: bool,
    #[serde(default)]
    pub custom_bootstrap: Option<PathBuf>,
    #[serde(default)]
    pub custom_server_entry: Option<PathBuf>,
    /// Filled in while the config resolves.
    #[serde(default)]
    pub ssr_mode: Option<SsrMode>,
    /// Filled in while the config resolves.
    #[serde(default)]
    pub runtime_plugins: Vec<RuntimePlugin>,
}

fn default_true() -> bool {
    true
}

impl Entrypoint {
    pub fn new(name: impl Into<String>, entry: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            entry: entry.into(),
            is_auto_mount: true,
            custom_entry: false,
            custom_bootstrap: None,
            custom_server_entry: None,
            ssr_mode: None,
            runtime_plugins: Vec::new(),
        }
    }
}

// ── Generated files ─────────────────────────────────────────────────────────

/// A source file produced by code generation, handed to the file writer as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedFile {
    pub path: PathBuf,
    pub content: String,
    pub encoding: String,
}

impl GeneratedFile {
    pub fn utf8(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            encoding: "utf8".into(),
        }
    }
}

// ── Bundler results ─────────────────────────────────────────────────────────

/// Outcome of one bundler compilation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildStats {
    #[serde(with = "duration_ms")]
    pub duration: Duration,
    pub has_errors: bool,
    #[serde(default)]
    pub assets: Vec<PathBuf>,
    #[serde(default)]
    pub detail: Value,
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

// ── File changes ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
}

/// A file-system change observed while the dev session is watching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl FileChange {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entrypoint_defaults_to_auto_mount() {
        let entry: Entrypoint = serde_json::from_str(r#"{"name":"main","entry":"src/App.tsx"}"#)
            .unwrap();
        assert!(entry.is_auto_mount);
        assert!(entry.ssr_mode.is_none());
        assert_eq!(entry, Entrypoint::new("main", "src/App.tsx"));
    }

    #[test]
    fn build_stats_duration_is_milliseconds() {
        let stats = BuildStats {
            duration: Duration::from_millis(1500),
            ..Default::default()
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["duration"], 1500);
    }

    #[test]
    fn ssr_mode_display_matches_serde() {
        assert_eq!(SsrMode::Stream.to_string(), "stream");
        assert_eq!(
            serde_json::to_value(SsrMode::String).unwrap(),
            serde_json::json!("string")
        );
    }
}

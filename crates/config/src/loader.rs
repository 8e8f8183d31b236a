use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{
    Error, Result,
    env_subst::substitute_env,
    schema::AppConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "trellis.toml",
    "trellis.yaml",
    "trellis.yml",
    "trellis.json",
];

/// A configuration together with the file it came from.
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    pub path: Option<PathBuf>,
    pub config: AppConfig,
}

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config for the app rooted at `app_dir`.
///
/// Search order:
/// 1. `<app_dir>/trellis.{toml,yaml,yml,json}`
/// 2. `~/.config/trellis/trellis.{toml,yaml,yml,json}` (user-global)
///
/// Returns the default config when no file exists. A file that exists but
/// fails to parse is an error.
pub fn discover_and_load(app_dir: &Path) -> Result<LoadedConfig> {
    let Some(path) = find_config_file(app_dir) else {
        debug!(app_dir = %app_dir.display(), "no config file found, using defaults");
        return Ok(LoadedConfig::default());
    };
    debug!(path = %path.display(), "loading config");
    let config = load_config(&path)?;
    Ok(LoadedConfig {
        path: Some(path),
        config,
    })
}

/// Find the first config file in standard locations.
pub fn find_config_file(app_dir: &Path) -> Option<PathBuf> {
    let user_dir = user_config_dir();
    std::iter::once(app_dir.to_path_buf())
        .chain(user_dir)
        .flat_map(|dir| CONFIG_FILENAMES.iter().map(move |name| dir.join(name)))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/trellis/`).
pub fn user_config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "trellis").map(|d| d.config_dir().to_path_buf())
}

fn parse_config(raw: &str, path: &Path) -> Result<AppConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => toml::from_str(raw).map_err(|e| Error::parse(path, e)),
        "yaml" | "yml" => serde_yaml::from_str(raw).map_err(|e| Error::parse(path, e)),
        "json" => serde_json::from_str(raw).map_err(|e| Error::parse(path, e)),
        _ => Err(Error::UnsupportedFormat(ext.to_string())),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_toml_from_app_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("trellis.toml"),
            "[html]\nmount_id = \"app\"\n",
        )
        .unwrap();

        let loaded = discover_and_load(dir.path()).unwrap();
        assert_eq!(loaded.path, Some(dir.path().join("trellis.toml")));
        assert_eq!(loaded.config.html.mount_id, "app");
    }

    #[test]
    fn toml_takes_precedence_over_json() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("trellis.json"), r#"{"server":{"port":1}}"#).unwrap();
        std::fs::write(dir.path().join("trellis.toml"), "[server]\nport = 2\n").unwrap();

        let loaded = discover_and_load(dir.path()).unwrap();
        assert_eq!(loaded.config.server.port, 2);
    }

    #[test]
    fn loads_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trellis.yaml");
        std::fs::write(&path, "output:\n  ssg: true\n").unwrap();
        assert!(load_config(&path).unwrap().output.ssg);
    }

    #[test]
    fn broken_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trellis.toml");
        std::fs::write(&path, "[server\nport = ").unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
        assert!(err.to_string().contains("trellis.toml"));
    }

    #[test]
    fn unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trellis.ini");
        std::fs::write(&path, "x").unwrap();
        assert!(matches!(
            load_config(&path).unwrap_err(),
            Error::UnsupportedFormat(ext) if ext == "ini"
        ));
    }

    #[test]
    fn missing_file_read_error_names_path() {
        let err = load_config(Path::new("/nonexistent/trellis.toml")).unwrap_err();
        assert!(matches!(err, Error::Read { .. }));
    }
}

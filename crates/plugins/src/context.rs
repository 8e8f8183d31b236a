//! Process-wide application context shared with plugins.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::{
        Arc, RwLock,
        atomic::{AtomicBool, Ordering},
    },
};

use {
    serde::Serialize,
    serde_json::Value,
    tracing::{debug, warn},
    trellis_common::{Command, Entrypoint},
    trellis_config::AppConfig,
};

use crate::error::{Error, Result};

/// Directory (relative to the app root) holding generated framework code.
pub const INTERNAL_DIR: &str = "node_modules/.trellis";

/// Well-known locations of the application being built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppPaths {
    pub app_dir: PathBuf,
    pub src_dir: PathBuf,
    pub internal_dir: PathBuf,
    pub config_file: Option<PathBuf>,
}

impl AppPaths {
    pub fn new(app_dir: impl Into<PathBuf>) -> Self {
        let app_dir = app_dir.into();
        Self {
            src_dir: app_dir.join("src"),
            internal_dir: app_dir.join(INTERNAL_DIR),
            app_dir,
            config_file: None,
        }
    }

    #[must_use]
    pub fn with_config_file(mut self, path: Option<PathBuf>) -> Self {
        self.config_file = path;
        self
    }
}

struct State {
    config: Arc<AppConfig>,
    entrypoints: Arc<Vec<Entrypoint>>,
    values: BTreeMap<String, Value>,
}

struct Inner {
    paths: AppPaths,
    command: Command,
    meta_name: String,
    frozen: AtomicBool,
    state: RwLock<State>,
}

/// Cheaply cloneable handle on the run's shared state.
///
/// Once [`freeze`](Self::freeze) has been called the shape is fixed: the
/// config and entrypoints can no longer be replaced and no new metadata keys
/// can be added. Existing metadata keys may still change value.
#[derive(Clone)]
pub struct AppContext {
    inner: Arc<Inner>,
}

impl AppContext {
    pub fn new(paths: AppPaths, command: Command, config: AppConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                paths,
                command,
                meta_name: "trellis".into(),
                frozen: AtomicBool::new(false),
                state: RwLock::new(State {
                    config: Arc::new(config),
                    entrypoints: Arc::new(Vec::new()),
                    values: BTreeMap::new(),
                }),
            }),
        }
    }

    pub fn paths(&self) -> &AppPaths {
        &self.inner.paths
    }

    pub fn app_dir(&self) -> &Path {
        &self.inner.paths.app_dir
    }

    pub fn internal_dir(&self) -> &Path {
        &self.inner.paths.internal_dir
    }

    pub fn command(&self) -> Command {
        self.inner.command
    }

    pub fn meta_name(&self) -> &str {
        &self.inner.meta_name
    }

    /// Output directory, resolved against the app dir.
    pub fn dist_dir(&self) -> PathBuf {
        self.inner
            .paths
            .app_dir
            .join(&self.config().output.dist_path)
    }

    pub fn config(&self) -> Arc<AppConfig> {
        Arc::clone(&self.read().config)
    }

    pub fn entrypoints(&self) -> Arc<Vec<Entrypoint>> {
        Arc::clone(&self.read().entrypoints)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.read().values.get(key).cloned()
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.frozen.load(Ordering::Acquire)
    }

    /// Fix the context's shape. Idempotent.
    pub fn freeze(&self) {
        if !self.inner.frozen.swap(true, Ordering::AcqRel) {
            debug!("app context frozen");
        }
    }

    pub fn set_config(&self, config: AppConfig) -> Result<()> {
        self.ensure_open("replace the config")?;
        self.write().config = Arc::new(config);
        Ok(())
    }

    pub fn set_entrypoints(&self, entrypoints: Vec<Entrypoint>) -> Result<()> {
        self.ensure_open("replace the entrypoints")?;
        self.write().entrypoints = Arc::new(entrypoints);
        Ok(())
    }

    /// Set a metadata value. After freezing only existing keys are accepted.
    pub fn set(&self, key: impl Into<String>, value: Value) -> Result<()> {
        let key = key.into();
        let mut state = self.write();
        match state.values.get_mut(&key) {
            Some(slot) => *slot = value,
            None if self.is_frozen() => {
                warn!(key = %key, "rejected new context key after freeze");
                return Err(Error::context_frozen(format!("add key `{key}`")));
            },
            None => {
                state.values.insert(key, value);
            },
        }
        Ok(())
    }

    /// JSON snapshot handed to shell plugins and printed by the CLI.
    pub fn snapshot(&self) -> Value {
        let state = self.read();
        serde_json::json!({
            "meta_name": self.inner.meta_name,
            "command": self.inner.command,
            "paths": self.inner.paths,
            "frozen": self.is_frozen(),
            "config": *state.config,
            "entrypoints": *state.entrypoints,
            "values": state.values,
        })
    }

    fn ensure_open(&self, action: &str) -> Result<()> {
        if self.is_frozen() {
            warn!(action, "rejected structural change after freeze");
            return Err(Error::context_frozen(action));
        }
        Ok(())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, State> {
        self.inner.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, State> {
        self.inner.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("app_dir", &self.inner.paths.app_dir)
            .field("command", &self.inner.command)
            .field("frozen", &self.is_frozen())
            .finish_non_exhaustive()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {serde_json::json, trellis_common::Entrypoint};

    use super::*;

    fn ctx() -> AppContext {
        AppContext::new(AppPaths::new("/app"), Command::Build, AppConfig::default())
    }

    #[test]
    fn paths_are_derived_from_app_dir() {
        let ctx = ctx();
        assert_eq!(ctx.paths().src_dir, PathBuf::from("/app/src"));
        assert_eq!(ctx.internal_dir(), Path::new("/app/node_modules/.trellis"));
        assert_eq!(ctx.dist_dir(), PathBuf::from("/app/dist"));
        assert_eq!(ctx.meta_name(), "trellis");
    }

    #[test]
    fn open_context_accepts_structural_changes() {
        let ctx = ctx();
        let mut config = AppConfig::default();
        config.html.mount_id = "app".into();
        ctx.set_config(config).unwrap();
        ctx.set_entrypoints(vec![Entrypoint::new("main", "src/App.tsx")])
            .unwrap();
        ctx.set("feature.router", json!(true)).unwrap();

        assert_eq!(ctx.config().html.mount_id, "app");
        assert_eq!(ctx.entrypoints().len(), 1);
        assert_eq!(ctx.get("feature.router"), Some(json!(true)));
    }

    #[test]
    fn frozen_context_rejects_new_shape_but_allows_value_changes() {
        let ctx = ctx();
        ctx.set("feature.router", json!(false)).unwrap();
        ctx.freeze();

        assert!(matches!(
            ctx.set_config(AppConfig::default()),
            Err(Error::ContextFrozen { .. })
        ));
        assert!(matches!(
            ctx.set_entrypoints(Vec::new()),
            Err(Error::ContextFrozen { .. })
        ));
        let err = ctx.set("feature.new", json!(1)).unwrap_err();
        assert!(err.to_string().contains("feature.new"));
        assert_eq!(ctx.get("feature.new"), None);

        ctx.set("feature.router", json!(true)).unwrap();
        assert_eq!(ctx.get("feature.router"), Some(json!(true)));
    }

    #[test]
    fn clones_share_state() {
        let a = ctx();
        let b = a.clone();
        a.set("k", json!("v")).unwrap();
        a.freeze();
        assert!(b.is_frozen());
        assert_eq!(b.get("k"), Some(json!("v")));
    }

    #[test]
    fn snapshot_contains_config_and_command() {
        let snap = ctx().snapshot();
        assert_eq!(snap["command"], json!("build"));
        assert_eq!(snap["config"]["html"]["mount_id"], json!("root"));
        assert_eq!(snap["frozen"], json!(false));
    }
}

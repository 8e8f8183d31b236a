//! The app a command runs against: its paths, its config and its plugins.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    anyhow::{Context, Result},
    tracing::debug,
    trellis_codegen::RuntimeCodegen,
    trellis_config::AppConfig,
    trellis_plugins::{AppPaths, Plugin, ShellPlugin},
};

pub struct Project {
    pub paths: AppPaths,
    pub config: AppConfig,
}

impl Project {
    /// Load the app rooted at `app_dir`. An explicit `config_file` skips
    /// discovery; a missing discovered file means defaults.
    pub fn load(app_dir: &Path, config_file: Option<&Path>) -> Result<Self> {
        let app_dir = app_dir
            .canonicalize()
            .with_context(|| format!("app directory {} not found", app_dir.display()))?;

        let (path, config) = match config_file {
            Some(path) => (Some(path.to_path_buf()), trellis_config::load_config(path)?),
            None => {
                let loaded = trellis_config::discover_and_load(&app_dir)?;
                (loaded.path, loaded.config)
            },
        };
        debug!(
            app_dir = %app_dir.display(),
            config = ?path.as_deref().map(Path::display),
            plugins = config.plugins.len(),
            "project loaded"
        );

        Ok(Self {
            paths: AppPaths::new(app_dir).with_config_file(path),
            config,
        })
    }

    pub fn app_dir(&self) -> &Path {
        &self.paths.app_dir
    }

    pub fn config_file(&self) -> Option<&PathBuf> {
        self.paths.config_file.as_ref()
    }

    /// The built-in runtime codegen followed by every plugin declared in
    /// config, in declaration order.
    pub fn plugins(&self) -> Vec<Arc<dyn Plugin>> {
        let mut plugins: Vec<Arc<dyn Plugin>> = vec![Arc::new(RuntimeCodegen::default())];
        plugins.extend(
            self.config
                .plugins
                .iter()
                .map(|p| Arc::new(ShellPlugin::from_config(p)) as Arc<dyn Plugin>),
        );
        plugins
    }
}

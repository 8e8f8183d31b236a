use std::{
    future::Future,
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use {
    serde::Serialize,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
    trellis_common::{BuildStats, Command, FileChange},
    trellis_config::AppConfig,
    trellis_plugins::{
        AppContext, AppHooks, AppPaths, BundlerConfig, DevCompileDone, Plugin, PluginApi,
        PluginDescriptor, RuntimePluginsInput, SsrQuery, resolve_order,
    },
};

use crate::{
    bundler::{Bundler, FileWriter},
    error::{Error, Result, RunError},
    lifecycle::{Lifecycle, Stage},
    watcher::ChangeFeed,
};

type PluginError = trellis_plugins::Error;

/// Everything a run needs besides plugins and collaborators.
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    pub paths: AppPaths,
    pub command: Command,
    pub config: AppConfig,
}

/// What a finished run reports.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub command: Command,
    pub stages: Vec<Stage>,
    /// Files produced by `generate_files`.
    pub files_generated: usize,
    /// Files the writer actually touched; unchanged files are skipped.
    pub files_written: usize,
    pub compilations: usize,
    /// Stats of the last compilation.
    pub stats: Option<BuildStats>,
    #[serde(with = "elapsed_ms")]
    pub elapsed: Duration,
}

mod elapsed_ms {
    use {serde::Serializer, std::time::Duration};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u128(value.as_millis())
    }
}

/// Drives one dev or build run through its lifecycle.
///
/// Plugin order is resolved and every `setup` has run by the time
/// [`Runner::new`] returns; [`Runner::run`] then walks the stages once.
pub struct Runner {
    order: Vec<Arc<dyn Plugin>>,
    hooks: AppHooks,
    ctx: AppContext,
    bundler: Arc<dyn Bundler>,
    writer: Arc<dyn FileWriter>,
    feed: Option<Box<dyn ChangeFeed>>,
    lifecycle: Lifecycle,
    exit_hook_ran: bool,
    files_generated: usize,
    files_written: usize,
    compilations: usize,
    last_stats: Option<BuildStats>,
}

/// Await a hook call between two cancellation checks. A result produced
/// after cancellation is discarded.
async fn checked<T>(
    cancel: &CancellationToken,
    call: impl Future<Output = trellis_plugins::Result<T>>,
) -> Result<T> {
    if cancel.is_cancelled() {
        return Err(PluginError::Cancelled.into());
    }
    let value = call.await?;
    if cancel.is_cancelled() {
        return Err(PluginError::Cancelled.into());
    }
    Ok(value)
}

/// Attribute a collaborator failure to the pseudo-plugin `who`.
fn collaborator<T>(
    who: &str,
    call: &'static str,
    result: anyhow::Result<T>,
) -> trellis_plugins::Result<T> {
    result.map_err(|source| PluginError::hook_execution(who, call, source))
}

impl Runner {
    pub fn new(
        options: RunnerOptions,
        plugins: Vec<Arc<dyn Plugin>>,
        bundler: Arc<dyn Bundler>,
        writer: Arc<dyn FileWriter>,
    ) -> std::result::Result<Self, RunError> {
        let order = resolve_order(&plugins).map_err(|e| RunError::new(Stage::Init, e))?;
        let command = options.command;
        let ctx = AppContext::new(options.paths, command, options.config);

        let mut api = PluginApi::new(ctx.clone());
        for plugin in &order {
            api.apply(plugin.as_ref()).map_err(|source| {
                RunError::new(
                    Stage::Init,
                    PluginError::hook_execution(plugin.name(), "setup", source),
                )
            })?;
        }

        info!(
            command = %command,
            plugins = order.len(),
            app_dir = %ctx.app_dir().display(),
            "runner initialized"
        );

        Ok(Self {
            order,
            hooks: api.into_hooks(),
            ctx,
            bundler,
            writer,
            feed: None,
            lifecycle: Lifecycle::default(),
            exit_hook_ran: false,
            files_generated: 0,
            files_written: 0,
            compilations: 0,
            last_stats: None,
        })
    }

    /// Source of file changes for dev runs. Without one the dev loop only
    /// waits for cancellation.
    #[must_use]
    pub fn with_change_feed(mut self, feed: Box<dyn ChangeFeed>) -> Self {
        self.feed = Some(feed);
        self
    }

    pub fn context(&self) -> &AppContext {
        &self.ctx
    }

    pub fn hooks(&self) -> &AppHooks {
        &self.hooks
    }

    pub fn stage(&self) -> Stage {
        self.lifecycle.current()
    }

    /// Plugins in execution order.
    pub fn plugins(&self) -> Vec<&PluginDescriptor> {
        self.order.iter().map(|p| p.descriptor()).collect()
    }

    /// Walk the lifecycle to `Done`, or to `Errored` on the first fatal error.
    pub async fn run(
        mut self,
        cancel: CancellationToken,
    ) -> std::result::Result<RunSummary, RunError> {
        let started = Instant::now();
        let command = self.ctx.command();

        match self.drive(&cancel).await {
            Ok(()) => {
                self.lifecycle
                    .advance(Stage::Done)
                    .map_err(|e| RunError::new(self.lifecycle.current(), e))?;
                info!(
                    command = %command,
                    compilations = self.compilations,
                    elapsed_ms = started.elapsed().as_millis(),
                    "run finished"
                );
                Ok(RunSummary {
                    command,
                    stages: self.lifecycle.history().to_vec(),
                    files_generated: self.files_generated,
                    files_written: self.files_written,
                    compilations: self.compilations,
                    stats: self.last_stats.take(),
                    elapsed: started.elapsed(),
                })
            },
            Err(source) => {
                let stage = self.lifecycle.current();
                let err = RunError::new(stage, source);
                if let Err(e) = self.lifecycle.advance(Stage::Errored) {
                    warn!(error = %e, "could not record errored stage");
                }
                warn!(
                    stage = %stage,
                    plugin = err.plugin().unwrap_or("-"),
                    hook = err.hook().unwrap_or("-"),
                    error = %err.source,
                    "run failed"
                );
                if !self.exit_hook_ran
                    && let Err(e) = self.hooks.on_before_exit.call(()).await
                {
                    warn!(error = %e, "on_before_exit failed after error");
                }
                Err(err)
            },
        }
    }

    async fn drive(&mut self, cancel: &CancellationToken) -> Result<()> {
        self.resolve_config(cancel).await?;
        self.prepare(cancel).await?;
        let bundler_config = self.create_compiler(cancel).await?;

        match self.ctx.command() {
            Command::Build => {
                let stats = self.bundle(cancel, &bundler_config).await?;
                self.enter(Stage::AfterEmit)?;
                checked(cancel, self.hooks.on_after_build.call(stats)).await?;
                self.before_exit(cancel).await
            },
            Command::Dev => {
                // Cancellation is how a dev run normally ends; the closing
                // hooks run regardless.
                match self.watch(cancel, &bundler_config).await {
                    Err(Error::Plugin(PluginError::Cancelled)) => debug!("dev run cancelled"),
                    other => other?,
                }
                let closing = CancellationToken::new();
                self.enter(Stage::AfterEmit)?;
                checked(&closing, self.hooks.on_after_dev.call(())).await?;
                self.before_exit(&closing).await
            },
        }
    }

    fn enter(&mut self, stage: Stage) -> Result<()> {
        self.lifecycle.advance(stage)?;
        info!(stage = %stage, "entering stage");
        Ok(())
    }

    // ── ConfigResolving ─────────────────────────────────────────────────────

    async fn resolve_config(&mut self, cancel: &CancellationToken) -> Result<()> {
        self.enter(Stage::ConfigResolving)?;
        let hooks = &self.hooks;

        let initial = AppConfig::clone(&self.ctx.config());
        let mut config = checked(cancel, hooks.modify_config.call(initial)).await?;
        config.normalize();
        let config = checked(cancel, hooks.modify_resolved_config.call(config)).await?;
        self.ctx.set_config(config.clone())?;

        let entrypoints =
            checked(cancel, hooks.modify_entrypoints.call(config.entrypoints())).await?;

        let mut resolved = Vec::with_capacity(entrypoints.len());
        for mut entry in entrypoints {
            let config_default = config.ssr_mode_for(&entry.name);
            let query = SsrQuery {
                entrypoint: entry.clone(),
                config_default,
            };
            entry.ssr_mode = checked(cancel, hooks.resolve_ssr_mode.call(query))
                .await?
                .or(config_default);

            let input = RuntimePluginsInput {
                plugins: entry.runtime_plugins.clone(),
                entrypoint: entry.clone(),
            };
            entry.runtime_plugins = checked(cancel, hooks.internal_runtime_plugins.call(input))
                .await?
                .plugins;

            debug!(
                entry = %entry.name,
                ssr = ?entry.ssr_mode,
                runtime_plugins = entry.runtime_plugins.len(),
                "entrypoint resolved"
            );
            resolved.push(entry);
        }
        self.ctx.set_entrypoints(resolved)?;
        Ok(())
    }

    // ── ConfigResolved ──────────────────────────────────────────────────────

    async fn prepare(&mut self, cancel: &CancellationToken) -> Result<()> {
        self.enter(Stage::ConfigResolved)?;
        self.ctx.freeze();

        checked(cancel, self.hooks.on_prepare.call(self.ctx.clone())).await?;
        let files = checked(cancel, self.hooks.generate_files.call(Vec::new())).await?;
        let written = checked(
            cancel,
            async { collaborator("writer", "write", self.writer.write(&files).await) },
        )
        .await?;
        self.files_generated = files.len();
        self.files_written = written;
        debug!(files = files.len(), written, "generated files handed to writer");
        Ok(())
    }

    // ── CompilerCreating ────────────────────────────────────────────────────

    async fn create_compiler(&mut self, cancel: &CancellationToken) -> Result<BundlerConfig> {
        self.enter(Stage::CompilerCreating)?;
        let hooks = &self.hooks;

        let initial = BundlerConfig::for_context(&self.ctx);
        let config = checked(cancel, hooks.modify_bundler_config.call(initial)).await?;
        checked(cancel, hooks.on_before_create_compiler.call(config.clone())).await?;
        checked(cancel, async {
            collaborator(
                "bundler",
                "create_compiler",
                self.bundler.create_compiler(&config).await,
            )
        })
        .await?;
        checked(cancel, hooks.on_after_create_compiler.call(config.clone())).await?;
        Ok(config)
    }

    // ── Bundling ────────────────────────────────────────────────────────────

    async fn bundle(
        &mut self,
        cancel: &CancellationToken,
        config: &BundlerConfig,
    ) -> Result<BuildStats> {
        self.enter(Stage::Bundling)?;

        checked(cancel, self.hooks.on_before_build.call(config.clone())).await?;
        let stats = checked(cancel, async {
            collaborator("bundler", "build", self.bundler.build(config).await)
        })
        .await?;
        self.compilations += 1;
        self.last_stats = Some(stats.clone());

        if stats.has_errors {
            return Err(PluginError::hook_execution(
                "bundler",
                "build",
                anyhow::anyhow!("bundler reported errors"),
            )
            .into());
        }
        Ok(stats)
    }

    // ── Watching ────────────────────────────────────────────────────────────

    async fn watch(&mut self, cancel: &CancellationToken, config: &BundlerConfig) -> Result<()> {
        self.enter(Stage::Watching)?;

        let extra = checked(cancel, self.hooks.add_watch_files.call(())).await?;
        let app_dir = self.ctx.app_dir().to_path_buf();
        let paths: Vec<PathBuf> = self
            .ctx
            .config()
            .dev
            .watch
            .iter()
            .chain(extra.iter().flatten())
            .map(|p| app_dir.join(p))
            .collect();

        checked(cancel, self.hooks.on_before_dev.call(())).await?;
        self.compile(cancel, config, None).await?;

        let mut events = match self.feed.as_mut() {
            Some(feed) => Some(
                feed.subscribe(&paths)
                    .map_err(|e| PluginError::hook_execution("watcher", "subscribe", e))?,
            ),
            None => None,
        };
        info!(paths = paths.len(), "dev server ready, watching for changes");

        loop {
            let change = match events.as_mut() {
                Some(rx) => tokio::select! {
                    _ = cancel.cancelled() => None,
                    change = rx.recv() => change,
                },
                None => {
                    cancel.cancelled().await;
                    None
                },
            };
            let Some(change) = change else {
                debug!("watch loop ended");
                return Ok(());
            };

            self.on_change(cancel, config, change).await?;
        }
    }

    async fn on_change(
        &mut self,
        cancel: &CancellationToken,
        config: &BundlerConfig,
        change: FileChange,
    ) -> Result<()> {
        info!(path = %change.path.display(), kind = ?change.kind, "file changed");
        checked(cancel, self.hooks.on_file_changed.call(change.clone())).await?;
        self.compile(cancel, config, Some(&change)).await
    }

    /// One dev compilation followed by `on_dev_compile_done`. Compile errors
    /// are reported to plugins, not fatal.
    async fn compile(
        &mut self,
        cancel: &CancellationToken,
        config: &BundlerConfig,
        change: Option<&FileChange>,
    ) -> Result<()> {
        let is_first_compile = change.is_none();
        let stats = checked(cancel, async {
            match change {
                None => collaborator("bundler", "build", self.bundler.build(config).await),
                Some(change) => collaborator(
                    "bundler",
                    "rebuild",
                    self.bundler.rebuild(config, change).await,
                ),
            }
        })
        .await?;
        self.compilations += 1;
        if stats.has_errors {
            warn!(compilation = self.compilations, "compilation finished with errors");
        }
        self.last_stats = Some(stats.clone());

        let done = DevCompileDone {
            stats,
            is_first_compile,
        };
        checked(cancel, self.hooks.on_dev_compile_done.call(done)).await?;
        Ok(())
    }

    // ── Done ────────────────────────────────────────────────────────────────

    async fn before_exit(&mut self, cancel: &CancellationToken) -> Result<()> {
        self.exit_hook_ran = true;
        checked(cancel, self.hooks.on_before_exit.call(())).await?;
        Ok(())
    }
}

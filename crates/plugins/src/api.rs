//! The framework hook set and the registration API handed to plugins.

use std::{collections::BTreeMap, future::Future, path::PathBuf};

use {
    serde::{Deserialize, Serialize},
    serde_json::Value,
    trellis_common::{BuildStats, Command, Entrypoint, FileChange, GeneratedFile, RuntimePlugin, SsrMode},
    trellis_config::AppConfig,
};

use crate::{
    context::AppContext,
    hooks::{AsyncPipeline, BailHook, Hook, HookKind, ParallelWorkflow},
    plugin::Plugin,
};

// ── Payloads ────────────────────────────────────────────────────────────────

/// Question asked of `resolve_ssr_mode` for one entrypoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SsrQuery {
    pub entrypoint: Entrypoint,
    /// What the config alone would decide.
    pub config_default: Option<SsrMode>,
}

/// Value threaded through `internal_runtime_plugins` for one entrypoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimePluginsInput {
    pub entrypoint: Entrypoint,
    pub plugins: Vec<RuntimePlugin>,
}

/// Bundler-facing configuration assembled from the resolved context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundlerConfig {
    pub bundler: String,
    pub mode: Command,
    /// Entry name to the file the bundler starts from.
    pub entries: BTreeMap<String, PathBuf>,
    pub output_path: PathBuf,
    /// Free-form bundler options plugins may add to.
    #[serde(default)]
    pub options: Value,
}

impl BundlerConfig {
    /// Starting point: every entry maps to its source file.
    pub fn for_context(ctx: &AppContext) -> Self {
        let config = ctx.config();
        let entries = ctx
            .entrypoints()
            .iter()
            .map(|e| (e.name.clone(), ctx.app_dir().join(&e.entry)))
            .collect();
        Self {
            bundler: config.bundler.name.clone(),
            mode: ctx.command(),
            entries,
            output_path: ctx.dist_dir(),
            options: Value::Object(Default::default()),
        }
    }
}

/// Payload of `on_dev_compile_done`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevCompileDone {
    pub stats: BuildStats,
    pub is_first_compile: bool,
}

// ── Hook set ────────────────────────────────────────────────────────────────

/// Every hook the framework exposes, one field per extension point.
#[derive(Debug)]
pub struct AppHooks {
    pub modify_config: AsyncPipeline<AppConfig>,
    pub modify_resolved_config: AsyncPipeline<AppConfig>,
    pub modify_entrypoints: AsyncPipeline<Vec<Entrypoint>>,
    pub resolve_ssr_mode: BailHook<SsrQuery, SsrMode>,
    pub internal_runtime_plugins: AsyncPipeline<RuntimePluginsInput>,
    pub add_watch_files: ParallelWorkflow<(), Vec<PathBuf>>,
    pub on_prepare: ParallelWorkflow<AppContext>,
    pub generate_files: AsyncPipeline<Vec<GeneratedFile>>,
    pub modify_bundler_config: AsyncPipeline<BundlerConfig>,
    pub on_before_create_compiler: ParallelWorkflow<BundlerConfig>,
    pub on_after_create_compiler: ParallelWorkflow<BundlerConfig>,
    pub on_before_build: ParallelWorkflow<BundlerConfig>,
    pub on_after_build: ParallelWorkflow<BuildStats>,
    pub on_before_dev: ParallelWorkflow<()>,
    pub on_dev_compile_done: ParallelWorkflow<DevCompileDone>,
    pub on_file_changed: ParallelWorkflow<FileChange>,
    pub on_after_dev: ParallelWorkflow<()>,
    pub on_before_exit: ParallelWorkflow<()>,
}

impl Default for AppHooks {
    fn default() -> Self {
        Self {
            modify_config: AsyncPipeline::new("modify_config"),
            modify_resolved_config: AsyncPipeline::new("modify_resolved_config"),
            modify_entrypoints: AsyncPipeline::new("modify_entrypoints"),
            resolve_ssr_mode: BailHook::new("resolve_ssr_mode"),
            internal_runtime_plugins: AsyncPipeline::new("internal_runtime_plugins"),
            add_watch_files: ParallelWorkflow::new("add_watch_files"),
            on_prepare: ParallelWorkflow::new("on_prepare"),
            generate_files: AsyncPipeline::new("generate_files"),
            modify_bundler_config: AsyncPipeline::new("modify_bundler_config"),
            on_before_create_compiler: ParallelWorkflow::new("on_before_create_compiler"),
            on_after_create_compiler: ParallelWorkflow::new("on_after_create_compiler"),
            on_before_build: ParallelWorkflow::new("on_before_build"),
            on_after_build: ParallelWorkflow::new("on_after_build"),
            on_before_dev: ParallelWorkflow::new("on_before_dev"),
            on_dev_compile_done: ParallelWorkflow::new("on_dev_compile_done"),
            on_file_changed: ParallelWorkflow::new("on_file_changed"),
            on_after_dev: ParallelWorkflow::new("on_after_dev"),
            on_before_exit: ParallelWorkflow::new("on_before_exit"),
        }
    }
}

/// One row of [`AppHooks::describe`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HookSummary {
    pub name: &'static str,
    pub kind: String,
    pub plugins: Vec<String>,
}

impl AppHooks {
    fn all(&self) -> [&dyn Hook; 18] {
        [
            &self.modify_config,
            &self.modify_resolved_config,
            &self.modify_entrypoints,
            &self.resolve_ssr_mode,
            &self.internal_runtime_plugins,
            &self.add_watch_files,
            &self.on_prepare,
            &self.generate_files,
            &self.modify_bundler_config,
            &self.on_before_create_compiler,
            &self.on_after_create_compiler,
            &self.on_before_build,
            &self.on_after_build,
            &self.on_before_dev,
            &self.on_dev_compile_done,
            &self.on_file_changed,
            &self.on_after_dev,
            &self.on_before_exit,
        ]
    }

    /// Every hook with its kind and tapped plugins, in lifecycle order.
    pub fn describe(&self) -> Vec<HookSummary> {
        self.all()
            .into_iter()
            .map(|hook| HookSummary {
                name: hook.name(),
                kind: hook.kind().to_string(),
                plugins: hook.plugins().into_iter().map(str::to_string).collect(),
            })
            .collect()
    }

    pub fn kind_of(&self, name: &str) -> Option<HookKind> {
        self.all()
            .into_iter()
            .find(|h| h.name() == name)
            .map(|h| h.kind())
    }
}

// ── Registration API ────────────────────────────────────────────────────────

/// Handed to [`Plugin::setup`]. Every tap is recorded under the identity of
/// the plugin currently being set up.
pub struct PluginApi {
    plugin: String,
    hooks: AppHooks,
    context: AppContext,
}

macro_rules! pipeline_taps {
    ($($name:ident: $ty:ty;)*) => {
        $(
            pub fn $name<F, Fut>(&mut self, handler: F) -> &mut Self
            where
                F: Fn($ty) -> Fut + Send + Sync + 'static,
                Fut: Future<Output = anyhow::Result<$ty>> + Send + 'static,
            {
                self.hooks.$name.tap(self.plugin.clone(), handler);
                self
            }
        )*
    };
}

macro_rules! parallel_taps {
    ($($name:ident: $payload:ty => $result:ty;)*) => {
        $(
            pub fn $name<F, Fut>(&mut self, handler: F) -> &mut Self
            where
                F: Fn($payload) -> Fut + Send + Sync + 'static,
                Fut: Future<Output = anyhow::Result<$result>> + Send + 'static,
            {
                self.hooks.$name.tap(self.plugin.clone(), handler);
                self
            }
        )*
    };
}

impl PluginApi {
    pub fn new(context: AppContext) -> Self {
        Self {
            plugin: String::new(),
            hooks: AppHooks::default(),
            context,
        }
    }

    /// Run `plugin`'s setup, attributing its taps to it.
    pub fn apply(&mut self, plugin: &dyn Plugin) -> anyhow::Result<()> {
        self.plugin = plugin.name().to_string();
        plugin.setup(self)
    }

    /// Identity taps are currently recorded under.
    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    pub fn into_hooks(self) -> AppHooks {
        self.hooks
    }

    pipeline_taps! {
        modify_config: AppConfig;
        modify_resolved_config: AppConfig;
        modify_entrypoints: Vec<Entrypoint>;
        internal_runtime_plugins: RuntimePluginsInput;
        generate_files: Vec<GeneratedFile>;
        modify_bundler_config: BundlerConfig;
    }

    parallel_taps! {
        add_watch_files: () => Vec<PathBuf>;
        on_prepare: AppContext => ();
        on_before_create_compiler: BundlerConfig => ();
        on_after_create_compiler: BundlerConfig => ();
        on_before_build: BundlerConfig => ();
        on_after_build: BuildStats => ();
        on_before_dev: () => ();
        on_dev_compile_done: DevCompileDone => ();
        on_file_changed: FileChange => ();
        on_after_dev: () => ();
        on_before_exit: () => ();
    }

    /// Answer the SSR mode of an entrypoint; `Ok(None)` defers to the next
    /// plugin and finally to the config.
    pub fn resolve_ssr_mode<F, Fut>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(SsrQuery) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<SsrMode>>> + Send + 'static,
    {
        self.hooks.resolve_ssr_mode.tap(self.plugin.clone(), handler);
        self
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        context::AppPaths,
        plugin::{Plugin, define_plugin},
        resolver::resolve_order,
    };

    fn context() -> AppContext {
        AppContext::new(AppPaths::new("/app"), Command::Build, AppConfig::default())
    }

    fn setup_all(plugins: &[Arc<dyn Plugin>]) -> AppHooks {
        let mut api = PluginApi::new(context());
        for plugin in resolve_order(plugins).unwrap() {
            api.apply(plugin.as_ref()).unwrap();
        }
        api.into_hooks()
    }

    #[tokio::test]
    async fn taps_are_attributed_and_follow_resolved_order() {
        let plugins: Vec<Arc<dyn Plugin>> = vec![
            Arc::new(define_plugin("title").setup(|api| {
                api.modify_config(|mut cfg| async move {
                    cfg.html.title = Some(format!("{}!", cfg.html.title.unwrap_or_default()));
                    Ok(cfg)
                });
                Ok(())
            })),
            Arc::new(define_plugin("base").post(["title"]).setup(|api| {
                api.modify_config(|mut cfg| async move {
                    cfg.html.title = Some("hello".into());
                    Ok(cfg)
                });
                Ok(())
            })),
        ];

        let hooks = setup_all(&plugins);
        assert_eq!(hooks.modify_config.plugins(), vec!["base", "title"]);

        let cfg = hooks.modify_config.call(AppConfig::default()).await.unwrap();
        assert_eq!(cfg.html.title.as_deref(), Some("hello!"));
    }

    #[tokio::test]
    async fn resolve_ssr_mode_falls_through_to_none() {
        let plugins: Vec<Arc<dyn Plugin>> = vec![Arc::new(define_plugin("only-admin").setup(
            |api| {
                api.resolve_ssr_mode(|q| async move {
                    Ok((q.entrypoint.name == "admin").then_some(SsrMode::Stream))
                });
                Ok(())
            },
        ))];
        let hooks = setup_all(&plugins);

        let ask = |name: &str| SsrQuery {
            entrypoint: Entrypoint::new(name, "src/App.tsx"),
            config_default: None,
        };
        assert_eq!(
            hooks.resolve_ssr_mode.call(ask("admin")).await.unwrap(),
            Some(SsrMode::Stream)
        );
        assert_eq!(hooks.resolve_ssr_mode.call(ask("main")).await.unwrap(), None);
    }

    #[test]
    fn describe_lists_every_hook_with_its_kind() {
        let plugins: Vec<Arc<dyn Plugin>> = vec![Arc::new(define_plugin("watch").setup(|api| {
            api.add_watch_files(|()| async move { Ok(vec![PathBuf::from("extra.json")]) });
            Ok(())
        }))];
        let hooks = setup_all(&plugins);
        let rows = hooks.describe();

        assert_eq!(rows.len(), 18);
        assert_eq!(rows[0].name, "modify_config");
        let watch = rows.iter().find(|r| r.name == "add_watch_files").unwrap();
        assert_eq!(watch.kind, "parallel");
        assert_eq!(watch.plugins, vec!["watch"]);
        assert_eq!(hooks.kind_of("resolve_ssr_mode"), Some(HookKind::Bail));
        assert_eq!(hooks.kind_of("nope"), None);
    }

    #[test]
    fn bundler_config_starts_from_source_entries() {
        let ctx = context();
        ctx.set_entrypoints(vec![Entrypoint::new("main", "src/App.tsx")])
            .unwrap();
        let cfg = BundlerConfig::for_context(&ctx);
        assert_eq!(cfg.bundler, "rspack");
        assert_eq!(cfg.mode, Command::Build);
        assert_eq!(cfg.entries["main"], PathBuf::from("/app/src/App.tsx"));
        assert_eq!(cfg.output_path, PathBuf::from("/app/dist"));
    }
}

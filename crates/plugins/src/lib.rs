//! Plugin pipeline: typed hooks, plugin ordering and the registration API.
//!
//! Plugins declare ordering constraints and, in `setup`, tap implementations
//! onto the framework hooks in [`AppHooks`]. The runner resolves the plugin
//! order once with [`resolve_order`] and then invokes hooks per lifecycle
//! stage.

pub mod api;
pub mod context;
pub mod error;
pub mod hooks;
pub mod plugin;
pub mod resolver;
pub mod shell;

pub use {
    api::{AppHooks, BundlerConfig, DevCompileDone, HookSummary, PluginApi, RuntimePluginsInput, SsrQuery},
    context::{AppContext, AppPaths, INTERNAL_DIR},
    error::{ConfigurationError, Error, HookFailure, Result},
    hooks::{AsyncPipeline, BailHook, Hook, HookKind, ParallelWorkflow},
    plugin::{DefinedPlugin, Plugin, PluginDescriptor, define_plugin},
    resolver::resolve_order,
    shell::{ShellCommand, ShellOutcome, ShellPlugin},
};

//! Runs the plugin pipeline for one `dev` or `build` invocation.
//!
//! The [`Runner`] owns the hook set and the [`AppContext`](trellis_plugins::AppContext),
//! walks the [`Stage`]s in order and forwards hook results to its
//! collaborators: a [`Bundler`] and a [`FileWriter`].

pub mod bundler;
pub mod error;
pub mod lifecycle;
pub mod runner;
pub mod watcher;

#[cfg(feature = "file-watcher")]
pub use watcher::FsWatcher;
pub use {
    bundler::{Bundler, FileWriter, FsWriter, ShellBundler},
    error::{Error, RunError},
    lifecycle::{Lifecycle, Stage},
    runner::{RunSummary, Runner, RunnerOptions},
    watcher::{ChangeFeed, ChannelFeed},
};

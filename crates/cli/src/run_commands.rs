//! `trellis dev` and `trellis build`.

use std::sync::Arc;

use {
    anyhow::Result,
    tokio_util::sync::CancellationToken,
    tracing::{info, warn},
    trellis_common::Command,
    trellis_runner::{FsWriter, RunError, RunSummary, Runner, RunnerOptions, ShellBundler},
};

use crate::{
    project::Project,
    term::{BOLD, GREEN, RED, RESET},
};

pub async fn handle_run(project: Project, command: Command) -> Result<()> {
    let plugins = project.plugins();
    let bundler = Arc::new(ShellBundler::new(
        project.config.bundler.clone(),
        project.app_dir(),
    ));
    let writer = Arc::new(FsWriter::new(project.app_dir()));
    #[cfg(feature = "file-watcher")]
    let debounce = std::time::Duration::from_millis(project.config.dev.debounce_ms);

    let runner = match Runner::new(
        RunnerOptions {
            paths: project.paths,
            command,
            config: project.config,
        },
        plugins,
        bundler,
        writer,
    ) {
        Ok(runner) => runner,
        Err(err) => fail(&err),
    };

    #[cfg(feature = "file-watcher")]
    let runner = match command {
        Command::Dev => {
            runner.with_change_feed(Box::new(trellis_runner::FsWatcher::new(debounce)))
        },
        Command::Build => runner,
    };

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("interrupt received, shutting down");
                    cancel.cancel();
                },
                Err(e) => warn!(error = %e, "could not listen for ctrl-c"),
            }
        }
    });

    match runner.run(cancel).await {
        Ok(summary) => {
            report(&summary);
            Ok(())
        },
        Err(err) => fail(&err),
    }
}

fn report(summary: &RunSummary) {
    let assets = summary
        .stats
        .as_ref()
        .map(|s| s.assets.len())
        .unwrap_or_default();
    eprintln!(
        "{BOLD}{GREEN}{}{RESET} finished in {}ms: {} file(s) generated ({} written), {} compilation(s), {} asset(s)",
        summary.command,
        summary.elapsed.as_millis(),
        summary.files_generated,
        summary.files_written,
        summary.compilations,
        assets,
    );
}

/// Print the failing plugin and hook, then exit non-zero.
fn fail(err: &RunError) -> ! {
    eprintln!("{BOLD}{RED}error{RESET} {} stage failed", err.stage);
    if let Some(plugin) = err.plugin() {
        eprintln!("  plugin: {plugin}");
    }
    if let Some(hook) = err.hook() {
        eprintln!("  hook:   {hook}");
    }
    eprintln!("  {}", err.source);
    std::process::exit(1);
}

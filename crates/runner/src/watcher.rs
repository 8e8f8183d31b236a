//! Sources of file-change events for dev runs.

use std::path::PathBuf;

use {tokio::sync::mpsc, trellis_common::FileChange};

/// Delivers file changes to the dev loop.
pub trait ChangeFeed: Send {
    /// Start delivering changes under `paths`. Called once, when the dev
    /// loop begins.
    fn subscribe(&mut self, paths: &[PathBuf]) -> anyhow::Result<mpsc::UnboundedReceiver<FileChange>>;
}

/// Feed backed by a channel the caller pushes changes into.
#[derive(Debug)]
pub struct ChannelFeed {
    rx: Option<mpsc::UnboundedReceiver<FileChange>>,
}

impl ChannelFeed {
    pub fn new() -> (mpsc::UnboundedSender<FileChange>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx: Some(rx) })
    }
}

impl ChangeFeed for ChannelFeed {
    fn subscribe(&mut self, _paths: &[PathBuf]) -> anyhow::Result<mpsc::UnboundedReceiver<FileChange>> {
        self.rx
            .take()
            .ok_or_else(|| anyhow::anyhow!("change feed already subscribed"))
    }
}

#[cfg(feature = "file-watcher")]
pub use fs::FsWatcher;

#[cfg(feature = "file-watcher")]
mod fs {
    use std::{path::PathBuf, time::Duration};

    use {
        notify_debouncer_full::{
            DebounceEventResult, Debouncer, RecommendedCache, new_debouncer,
            notify::{EventKind, RecommendedWatcher, RecursiveMode},
        },
        tokio::sync::mpsc,
        tracing::{debug, info, warn},
        trellis_common::{ChangeKind, FileChange},
    };

    use super::ChangeFeed;

    /// Debounced file-system watcher.
    ///
    /// Paths containing a `node_modules` or `.git` component are ignored so
    /// that generated code and VCS churn never trigger rebuilds.
    pub struct FsWatcher {
        debounce: Duration,
        debouncer: Option<Debouncer<RecommendedWatcher, RecommendedCache>>,
    }

    impl FsWatcher {
        pub fn new(debounce: Duration) -> Self {
            Self {
                debounce,
                debouncer: None,
            }
        }
    }

    fn ignored(path: &std::path::Path) -> bool {
        path.components()
            .any(|c| matches!(c.as_os_str().to_str(), Some("node_modules" | ".git")))
    }

    fn change_kind(kind: &EventKind) -> Option<ChangeKind> {
        match kind {
            EventKind::Create(_) => Some(ChangeKind::Created),
            EventKind::Modify(_) => Some(ChangeKind::Modified),
            EventKind::Remove(_) => Some(ChangeKind::Removed),
            _ => None,
        }
    }

    impl ChangeFeed for FsWatcher {
        fn subscribe(
            &mut self,
            paths: &[PathBuf],
        ) -> anyhow::Result<mpsc::UnboundedReceiver<FileChange>> {
            let (tx, rx) = mpsc::unbounded_channel();

            let mut debouncer = new_debouncer(
                self.debounce,
                None,
                move |result: DebounceEventResult| match result {
                    Ok(events) => {
                        for event in events {
                            let Some(kind) = change_kind(&event.kind) else {
                                continue;
                            };
                            for path in &event.paths {
                                if ignored(path) {
                                    continue;
                                }
                                debug!(path = %path.display(), ?kind, "file watcher event");
                                let _ = tx.send(FileChange::new(path.clone(), kind));
                            }
                        }
                    },
                    Err(errors) => {
                        for e in errors {
                            warn!(error = %e, "file watcher error");
                        }
                    },
                },
            )?;

            for path in paths {
                if path.exists() {
                    debouncer.watch(path, RecursiveMode::Recursive)?;
                    info!(path = %path.display(), "watching");
                } else {
                    debug!(path = %path.display(), "watch path does not exist, skipping");
                }
            }

            self.debouncer = Some(debouncer);
            Ok(rx)
        }
    }

}

use std::{future::Future, time::Instant};

use tracing::debug;

use super::{HookKind, Tap, impl_hook};
use crate::error::{Error, Result};

/// Waterfall hook: every tap receives the previous tap's output.
///
/// Taps run strictly one after another. The first failure aborts the call
/// with [`Error::HookExecution`]; later taps are not invoked and nothing the
/// earlier taps did is rolled back.
pub struct AsyncPipeline<T> {
    name: &'static str,
    taps: Vec<Tap<T, T>>,
}

impl<T: Send + 'static> AsyncPipeline<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            taps: Vec::new(),
        }
    }

    /// Register an implementation for `plugin`. To pass the value through
    /// unchanged, return the input.
    pub fn tap<F, Fut>(&mut self, plugin: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.taps.push(Tap::new(plugin, handler));
        self
    }

    /// Thread `initial` through every tap in order.
    pub async fn call(&self, initial: T) -> Result<T> {
        if self.taps.is_empty() {
            return Ok(initial);
        }
        debug!(hook = self.name, count = self.taps.len(), "calling pipeline hook");

        let mut value = initial;
        for tap in &self.taps {
            let start = Instant::now();
            value = tap
                .handler
                .call(value)
                .await
                .map_err(|source| Error::hook_execution(&tap.plugin, self.name, source))?;
            debug!(
                hook = self.name,
                plugin = %tap.plugin,
                elapsed_ms = start.elapsed().as_millis(),
                "pipeline tap done"
            );
        }
        Ok(value)
    }
}

impl_hook!(AsyncPipeline<T>, HookKind::Pipeline);

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc, Mutex,
            atomic::{AtomicBool, AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use super::*;
    use crate::hooks::Hook;

    #[tokio::test]
    async fn empty_pipeline_returns_initial() {
        let hook: AsyncPipeline<u32> = AsyncPipeline::new("empty");
        assert_eq!(hook.call(7).await.unwrap(), 7);
        assert!(hook.is_empty());
    }

    #[tokio::test]
    async fn composes_in_tap_order() {
        let mut hook = AsyncPipeline::new("compose");
        hook.tap("f1", |s: String| async move { Ok(format!("f1({s})")) })
            .tap("f2", |s: String| async move { Ok(format!("f2({s})")) })
            .tap("f3", |s: String| async move { Ok(format!("f3({s})")) });

        assert_eq!(hook.call("x".into()).await.unwrap(), "f3(f2(f1(x)))");
        assert_eq!(hook.plugins(), vec!["f1", "f2", "f3"]);
    }

    #[tokio::test]
    async fn taps_never_overlap() {
        let running = Arc::new(AtomicBool::new(false));
        let seq = Arc::new(AtomicUsize::new(0));
        let log = Arc::new(Mutex::new(Vec::new()));

        let mut hook = AsyncPipeline::new("sequential");
        for (name, delay) in [("slow", 30), ("medium", 10), ("fast", 0)] {
            let running = Arc::clone(&running);
            let seq = Arc::clone(&seq);
            let log = Arc::clone(&log);
            hook.tap(name, move |n: usize| {
                let running = Arc::clone(&running);
                let seq = Arc::clone(&seq);
                let log = Arc::clone(&log);
                async move {
                    assert!(!running.swap(true, Ordering::SeqCst), "taps overlapped");
                    let start = seq.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    let end = seq.fetch_add(1, Ordering::SeqCst);
                    log.lock().unwrap().push((name, start, end));
                    running.store(false, Ordering::SeqCst);
                    Ok(n + 1)
                }
            });
        }

        assert_eq!(hook.call(0).await.unwrap(), 3);
        let log = log.lock().unwrap();
        assert_eq!(
            *log,
            vec![("slow", 0, 1), ("medium", 2, 3), ("fast", 4, 5)]
        );
    }

    #[tokio::test]
    async fn failure_stops_the_pipeline_and_names_the_plugin() {
        let reached = Arc::new(AtomicBool::new(false));
        let after = Arc::clone(&reached);

        let mut hook = AsyncPipeline::new("modify_config");
        hook.tap("ok", |n: i32| async move { Ok(n * 2) })
            .tap("broken", |_: i32| async move { anyhow::bail!("bad value") })
            .tap("never", move |n: i32| {
                after.store(true, Ordering::SeqCst);
                async move { Ok(n) }
            });

        let err = hook.call(1).await.unwrap_err();
        match &err {
            Error::HookExecution { plugin, hook, .. } => {
                assert_eq!(plugin, "broken");
                assert_eq!(*hook, "modify_config");
            },
            other => panic!("expected HookExecution, got {other:?}"),
        }
        assert!(err.to_string().contains("bad value"));
        assert!(!reached.load(Ordering::SeqCst));
    }

    #[test]
    fn kind_is_pipeline() {
        let hook: AsyncPipeline<()> = AsyncPipeline::new("p");
        assert_eq!(hook.kind(), HookKind::Pipeline);
        assert_eq!(hook.name(), "p");
    }
}

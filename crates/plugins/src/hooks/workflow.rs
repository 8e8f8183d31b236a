use std::{future::Future, time::Instant};

use {futures::future::join_all, tracing::debug};

use super::{HookKind, Tap, impl_hook};
use crate::error::{Error, HookFailure, Result};

/// Fan-out hook: every tap receives its own clone of the payload and all of
/// them run concurrently.
///
/// A call waits for every tap to settle, even when some fail. Results come
/// back in tap order, not completion order. Any failure turns the whole call
/// into [`Error::AggregateExecution`] listing each failing plugin.
pub struct ParallelWorkflow<P, R = ()> {
    name: &'static str,
    taps: Vec<Tap<P, R>>,
}

impl<P, R> ParallelWorkflow<P, R>
where
    P: Clone + Send + 'static,
    R: Send + 'static,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            taps: Vec::new(),
        }
    }

    pub fn tap<F, Fut>(&mut self, plugin: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        self.taps.push(Tap::new(plugin, handler));
        self
    }

    /// Run every tap against `payload` and collect their results.
    pub async fn call(&self, payload: P) -> Result<Vec<R>> {
        if self.taps.is_empty() {
            return Ok(Vec::new());
        }
        debug!(hook = self.name, count = self.taps.len(), "dispatching parallel hook");
        let start = Instant::now();

        let futures = self.taps.iter().map(|tap| tap.handler.call(payload.clone()));
        let outcomes = join_all(futures).await;

        let mut results = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        for (tap, outcome) in self.taps.iter().zip(outcomes) {
            match outcome {
                Ok(value) => results.push(value),
                Err(source) => failures.push(HookFailure {
                    plugin: tap.plugin.clone(),
                    source,
                }),
            }
        }

        debug!(
            hook = self.name,
            failed = failures.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "parallel hook settled"
        );

        if failures.is_empty() {
            Ok(results)
        } else {
            Err(Error::AggregateExecution {
                hook: self.name,
                failures,
            })
        }
    }
}

impl_hook!(ParallelWorkflow<P, R>, HookKind::Parallel);

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use super::*;

    #[tokio::test]
    async fn no_taps_yields_empty_results() {
        let hook: ParallelWorkflow<()> = ParallelWorkflow::new("on_prepare");
        assert!(hook.call(()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn results_follow_tap_order_not_completion_order() {
        let mut hook: ParallelWorkflow<u64, &'static str> = ParallelWorkflow::new("order");
        hook.tap("slow", |base| async move {
            tokio::time::sleep(Duration::from_millis(base * 3)).await;
            Ok("slow")
        })
        .tap("fast", |_| async move { Ok("fast") });

        assert_eq!(hook.call(10).await.unwrap(), vec!["slow", "fast"]);
    }

    #[tokio::test]
    async fn taps_run_concurrently() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut hook: ParallelWorkflow<()> = ParallelWorkflow::new("concurrent");
        for name in ["a", "b", "c"] {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            hook.tap(name, move |()| {
                let in_flight = Arc::clone(&in_flight);
                let peak = Arc::clone(&peak);
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            });
        }

        hook.call(()).await.unwrap();
        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn failures_are_aggregated_after_all_taps_settle() {
        let completed = Arc::new(AtomicUsize::new(0));

        let mut hook: ParallelWorkflow<()> = ParallelWorkflow::new("on_after_build");
        for (name, fails) in [("a", false), ("b", true), ("c", false), ("d", true)] {
            let completed = Arc::clone(&completed);
            hook.tap(name, move |()| {
                let completed = Arc::clone(&completed);
                async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    completed.fetch_add(1, Ordering::SeqCst);
                    if fails {
                        anyhow::bail!("{name} broke");
                    }
                    Ok(())
                }
            });
        }

        let err = hook.call(()).await.unwrap_err();
        assert_eq!(completed.load(Ordering::SeqCst), 4);
        match &err {
            Error::AggregateExecution { hook, failures } => {
                assert_eq!(*hook, "on_after_build");
                assert_eq!(failures.len(), 2);
            },
            other => panic!("expected AggregateExecution, got {other:?}"),
        }
        assert_eq!(err.plugins(), vec!["b", "d"]);
        assert!(err.to_string().contains("b: b broke"));
    }

    #[tokio::test]
    async fn each_tap_gets_its_own_payload() {
        let mut hook: ParallelWorkflow<Vec<u8>, usize> = ParallelWorkflow::new("payload");
        hook.tap("push", |mut v: Vec<u8>| async move {
            v.push(1);
            Ok(v.len())
        })
        .tap("len", |v: Vec<u8>| async move { Ok(v.len()) });

        assert_eq!(hook.call(vec![0]).await.unwrap(), vec![2, 1]);
    }
}

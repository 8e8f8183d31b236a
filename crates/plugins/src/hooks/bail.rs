use std::future::Future;

use tracing::debug;

use super::{HookKind, Tap, impl_hook};
use crate::error::{Error, Result};

/// Short-circuit hook: taps run in order until one returns `Some`.
///
/// `Ok(None)` from a tap means "not handled, ask the next one". The call
/// yields `None` when every tap declined.
pub struct BailHook<I, O> {
    name: &'static str,
    taps: Vec<Tap<I, Option<O>>>,
}

impl<I, O> BailHook<I, O>
where
    I: Clone + Send + 'static,
    O: Send + 'static,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            taps: Vec::new(),
        }
    }

    pub fn tap<F, Fut>(&mut self, plugin: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<O>>> + Send + 'static,
    {
        self.taps.push(Tap::new(plugin, handler));
        self
    }

    pub async fn call(&self, input: I) -> Result<Option<O>> {
        for tap in &self.taps {
            let outcome = tap
                .handler
                .call(input.clone())
                .await
                .map_err(|source| Error::hook_execution(&tap.plugin, self.name, source))?;
            if outcome.is_some() {
                debug!(hook = self.name, plugin = %tap.plugin, "bail hook answered");
                return Ok(outcome);
            }
        }
        Ok(None)
    }
}

impl_hook!(BailHook<I, O>, HookKind::Bail);

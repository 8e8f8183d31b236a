//! Hook primitives.
//!
//! Three hook shapes share the same registration API ([`AsyncPipeline::tap`],
//! [`ParallelWorkflow::tap`], [`BailHook::tap`]) and differ in how a call
//! walks the registered implementations:
//!
//! - [`AsyncPipeline`]: waterfall, each tap transforms the value of the previous one.
//! - [`ParallelWorkflow`]: fan-out, every tap runs concurrently and results are collected.
//! - [`BailHook`]: sequential until the first tap produces a value.
//!
//! The kind of a hook is its type, so it can never change after creation.

mod bail;
mod pipeline;
mod workflow;

use std::{fmt, future::Future, sync::Arc};

use futures::future::BoxFuture;

pub use {bail::BailHook, pipeline::AsyncPipeline, workflow::ParallelWorkflow};

/// Future returned by every hook implementation.
pub type HookFuture<T> = BoxFuture<'static, anyhow::Result<T>>;

/// An async hook implementation taking `I` and producing `O`.
///
/// Implemented for every `Fn(I) -> impl Future<Output = anyhow::Result<O>>`,
/// so plain async closures can be tapped directly.
pub trait Handler<I, O>: Send + Sync + 'static {
    fn call(&self, input: I) -> HookFuture<O>;
}

impl<F, Fut, I, O> Handler<I, O> for F
where
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<O>> + Send + 'static,
{
    fn call(&self, input: I) -> HookFuture<O> {
        Box::pin(self(input))
    }
}

/// Execution semantics of a hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    Pipeline,
    Parallel,
    Bail,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pipeline => f.write_str("pipeline"),
            Self::Parallel => f.write_str("parallel"),
            Self::Bail => f.write_str("bail"),
        }
    }
}

/// Introspection shared by every hook shape.
pub trait Hook {
    fn name(&self) -> &'static str;
    fn kind(&self) -> HookKind;
    /// Identities of the tapped plugins, in execution order.
    fn plugins(&self) -> Vec<&str>;
}

/// One registered implementation: the owning plugin and its handler.
struct Tap<I, O> {
    plugin: String,
    handler: Arc<dyn Handler<I, O>>,
}

impl<I, O> Tap<I, O> {
    fn new(plugin: impl Into<String>, handler: impl Handler<I, O>) -> Self {
        Self {
            plugin: plugin.into(),
            handler: Arc::new(handler),
        }
    }
}

macro_rules! impl_hook {
    ($ty:ident<$($param:ident),+>, $kind:expr) => {
        impl<$($param),+> $crate::hooks::Hook for $ty<$($param),+> {
            fn name(&self) -> &'static str {
                self.name
            }

            fn kind(&self) -> $crate::hooks::HookKind {
                $kind
            }

            fn plugins(&self) -> Vec<&str> {
                self.taps.iter().map(|t| t.plugin.as_str()).collect()
            }
        }

        impl<$($param),+> $ty<$($param),+> {
            /// Number of registered implementations.
            pub fn len(&self) -> usize {
                self.taps.len()
            }

            pub fn is_empty(&self) -> bool {
                self.taps.is_empty()
            }
        }

        impl<$($param),+> std::fmt::Debug for $ty<$($param),+> {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($ty))
                    .field("name", &self.name)
                    .field("plugins", &$crate::hooks::Hook::plugins(self))
                    .finish()
            }
        }
    };
}

use impl_hook;

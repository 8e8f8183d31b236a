use std::fmt;

use thiserror::Error;

/// Invalid plugin graph. Fatal: reported before any hook runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("unknown dependency {dependency} (referenced by plugin {plugin})")]
    UnknownDependency { plugin: String, dependency: String },

    #[error("cyclic dependency between plugins: {}", plugins.join(", "))]
    CyclicDependency { plugins: Vec<String> },

    #[error("plugins {first} and {second} are rivals and cannot be used together")]
    RivalPlugins { first: String, second: String },
}

/// One failed implementation of a parallel hook.
#[derive(Debug)]
pub struct HookFailure {
    pub plugin: String,
    pub source: anyhow::Error,
}

impl fmt::Display for HookFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:#}", self.plugin, self.source)
    }
}

fn join_failures(failures: &[HookFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("plugin {plugin} failed in hook {hook}: {source:#}")]
    HookExecution {
        plugin: String,
        hook: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error(
        "{} plugin(s) failed in hook {hook}: {}",
        failures.len(),
        join_failures(failures)
    )]
    AggregateExecution {
        hook: &'static str,
        failures: Vec<HookFailure>,
    },

    #[error("context is frozen: cannot {action}")]
    ContextFrozen { action: String },

    #[error("run cancelled")]
    Cancelled,
}

impl Error {
    #[must_use]
    pub fn hook_execution(
        plugin: impl Into<String>,
        hook: &'static str,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::HookExecution {
            plugin: plugin.into(),
            hook,
            source: source.into(),
        }
    }

    #[must_use]
    pub fn context_frozen(action: impl Into<String>) -> Self {
        Self::ContextFrozen {
            action: action.into(),
        }
    }

    /// Hook the error was raised in, if it came from a hook.
    pub fn hook(&self) -> Option<&'static str> {
        match self {
            Self::HookExecution { hook, .. } | Self::AggregateExecution { hook, .. } => {
                Some(*hook)
            },
            _ => None,
        }
    }

    /// Identities of the plugins the error is attributed to.
    pub fn plugins(&self) -> Vec<&str> {
        match self {
            Self::HookExecution { plugin, .. } => vec![plugin.as_str()],
            Self::AggregateExecution { failures, .. } => {
                failures.iter().map(|f| f.plugin.as_str()).collect()
            },
            Self::Configuration(ConfigurationError::CyclicDependency { plugins }) => {
                plugins.iter().map(String::as_str).collect()
            },
            Self::Configuration(ConfigurationError::UnknownDependency { plugin, .. }) => {
                vec![plugin.as_str()]
            },
            Self::Configuration(ConfigurationError::RivalPlugins { first, second }) => {
                vec![first.as_str(), second.as_str()]
            },
            _ => Vec::new(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

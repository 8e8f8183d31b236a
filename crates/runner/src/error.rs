use thiserror::Error;

use crate::lifecycle::Stage;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Plugin(#[from] trellis_plugins::Error),

    #[error("invalid lifecycle transition from {from} to {to}")]
    Transition { from: Stage, to: Stage },
}

impl From<trellis_plugins::ConfigurationError> for Error {
    fn from(err: trellis_plugins::ConfigurationError) -> Self {
        Self::Plugin(err.into())
    }
}

/// Failure of a run, tagged with the stage it happened in.
#[derive(Debug, Error)]
#[error("{stage} stage failed: {source}")]
pub struct RunError {
    pub stage: Stage,
    #[source]
    pub source: Error,
}

impl RunError {
    pub fn new(stage: Stage, source: impl Into<Error>) -> Self {
        Self {
            stage,
            source: source.into(),
        }
    }

    /// Plugin the failure is attributed to. For aggregated failures this is
    /// the first failing plugin in execution order.
    pub fn plugin(&self) -> Option<&str> {
        match &self.source {
            Error::Plugin(err) => err.plugins().into_iter().next(),
            Error::Transition { .. } => None,
        }
    }

    pub fn hook(&self) -> Option<&'static str> {
        match &self.source {
            Error::Plugin(err) => err.hook(),
            Error::Transition { .. } => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self.source,
            Error::Plugin(trellis_plugins::Error::Cancelled)
        )
    }

    pub fn is_configuration(&self) -> bool {
        matches!(
            self.source,
            Error::Plugin(trellis_plugins::Error::Configuration(_))
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

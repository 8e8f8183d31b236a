use std::fmt;

use {serde::Serialize, tracing::debug};

use crate::error::Error;

/// Stage of a run. Runs only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Init,
    ConfigResolving,
    ConfigResolved,
    CompilerCreating,
    Watching,
    Bundling,
    AfterEmit,
    Done,
    Errored,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Errored)
    }

    /// Whether `self -> next` is a legal move.
    pub fn can_advance_to(self, next: Stage) -> bool {
        use Stage::*;
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (_, Errored)
                | (Init, ConfigResolving)
                | (ConfigResolving, ConfigResolved)
                | (ConfigResolved, CompilerCreating)
                | (CompilerCreating, Watching | Bundling)
                | (Watching | Bundling, AfterEmit)
                | (AfterEmit, Done)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::ConfigResolving => "config_resolving",
            Self::ConfigResolved => "config_resolved",
            Self::CompilerCreating => "compiler_creating",
            Self::Watching => "watching",
            Self::Bundling => "bundling",
            Self::AfterEmit => "after_emit",
            Self::Done => "done",
            Self::Errored => "errored",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks the current stage and every stage visited.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    history: Vec<Stage>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            history: vec![Stage::Init],
        }
    }
}

impl Lifecycle {
    pub fn current(&self) -> Stage {
        self.history.last().copied().unwrap_or(Stage::Init)
    }

    pub fn history(&self) -> &[Stage] {
        &self.history
    }

    pub fn advance(&mut self, next: Stage) -> Result<(), Error> {
        let from = self.current();
        if !from.can_advance_to(next) {
            return Err(Error::Transition { from, to: next });
        }
        debug!(from = %from, to = %next, "stage transition");
        self.history.push(next);
        Ok(())
    }
}

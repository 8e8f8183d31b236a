//! Shared types, error definitions, and utilities used across all trellis crates.

pub mod error;
pub mod types;

pub use {
    error::{Error, FromMessage},
    types::{
        BuildStats, ChangeKind, Command, Entrypoint, FileChange, GeneratedFile, RuntimePlugin,
        SsrMode,
    },
};

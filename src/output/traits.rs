//! Output trait definitions
//!
//! Host-agnostic view of a recording output and the registry that hands
//! them out. The controller only ever talks to these traits.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors reported by the host when driving an output
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OutputError {
    #[error("Failed to stop output '{kind}': {reason}")]
    StopFailed { kind: String, reason: String },

    #[error("Failed to start output '{kind}': {reason}")]
    StartFailed { kind: String, reason: String },

    #[error("Failed to set path on output '{kind}': {reason}")]
    SetPathFailed { kind: String, reason: String },
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// A borrowed handle to a host recording output.
///
/// The handle is released when dropped. Implementations that wrap a
/// reference-counted host object must release it in `Drop`.
#[async_trait]
pub trait Output: Send {
    /// Kind name this handle was looked up by
    fn kind(&self) -> &str;

    /// Whether the output is currently recording
    fn is_active(&self) -> bool;

    /// Destination file the output is writing to, if the host exposes one
    fn current_path(&self) -> Option<PathBuf>;

    /// Stop recording. Returns once the host has finalized the file.
    async fn stop(&mut self) -> OutputResult<()>;

    /// Start recording to the currently configured path
    async fn start(&mut self) -> OutputResult<()>;

    /// Change the destination used by the next `start`
    fn set_path(&mut self, path: &Path) -> OutputResult<()>;
}

/// Source of output handles, keyed by kind name
pub trait OutputRegistry: Send + Sync {
    type Handle: Output;

    /// Ordered list of kinds to check. Order decides which output wins
    /// when several report themselves active.
    fn known_kinds(&self) -> Vec<String>;

    /// Acquire a handle for `kind`, or `None` if the host has no such output
    fn lookup(&self, kind: &str) -> Option<Self::Handle>;
}

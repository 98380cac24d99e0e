//! Split controller state
//!
//! Defines the controller's state machine and per-recording session tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;

use super::naming::sequenced_path;

/// Current state of the split controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitState {
    /// No active output observed
    Idle,
    /// An output is recording and a session is being tracked
    Recording,
}

impl Default for SplitState {
    fn default() -> Self {
        Self::Idle
    }
}

/// One continuous recording as observed by the controller.
///
/// A session spans zero or more splits. It is created when an output is
/// first seen active and dropped when the output goes inactive on its own
/// or a split stops it without restarting.
#[derive(Debug, Clone)]
pub struct Session {
    /// Output kind that owns this session
    pub kind: String,

    /// Destination captured when the session was detected. Every split
    /// filename derives from this, never from a rewritten path.
    pub base_filename: Option<PathBuf>,

    /// Splits performed since the session began
    pub split_count: u32,

    /// Start of the current segment
    pub started_at: Instant,

    /// Wall-clock start of the session, for reporting
    pub wall_started_at: DateTime<Utc>,
}

impl Session {
    /// Begin a new session now
    pub fn begin(kind: impl Into<String>, base_filename: Option<PathBuf>, now: Instant) -> Self {
        Self {
            kind: kind.into(),
            base_filename,
            split_count: 0,
            started_at: now,
            wall_started_at: Utc::now(),
        }
    }

    /// Time spent in the current segment
    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }

    /// Whether the current segment has reached `split_duration`
    pub fn is_due(&self, now: Instant, split_duration: Duration) -> bool {
        self.elapsed(now) >= split_duration
    }

    /// Path the next split will record to, if the session has a base path
    pub fn next_path(&self) -> Option<PathBuf> {
        self.base_filename
            .as_deref()
            .map(|base| sequenced_path(base, self.split_count + 1))
    }

    /// Record a completed split and start a new segment at `now`
    pub fn advance(&mut self, now: Instant) -> u32 {
        self.split_count += 1;
        self.started_at = now;
        self.split_count
    }

    /// Start a new segment without counting a split
    pub fn restart_window(&mut self, now: Instant) {
        self.started_at = now;
    }
}

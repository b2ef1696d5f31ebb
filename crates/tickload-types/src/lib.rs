//! Shared types for tickload
//!
//! This crate contains the plain data structures shared between the
//! core library and the CLI: transfer session snapshots, scheduler task
//! options and the engine configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

// ============================================================================
// Session Types
// ============================================================================

/// Snapshot of a single resumable transfer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadSession {
    pub id: Uuid,
    pub url: String,
    pub destination: PathBuf,
    /// Total size reported by the size probe (None until probed)
    pub total_size: Option<u64>,
    /// Bytes persisted to disk; always equal to the local file length
    pub written_bytes: u64,
    /// File length found on disk when the session started
    pub resumed_from: u64,
    pub state: SessionState,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl DownloadSession {
    pub fn new(url: String, destination: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4(),
            url,
            destination,
            total_size: None,
            written_bytes: 0,
            resumed_from: 0,
            state: SessionState::Probing,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Fraction of the resource on disk, clamped to [0, 1]
    pub fn progress(&self) -> f32 {
        match self.total_size {
            Some(0) => 1.0,
            Some(total) => (self.written_bytes as f64 / total as f64).clamp(0.0, 1.0) as f32,
            None => 0.0,
        }
    }

    /// Move to `next` if the transition is legal. Returns false otherwise.
    pub fn transition(&mut self, next: SessionState) -> bool {
        if !self.state.can_transition_to(next) {
            return false;
        }
        self.state = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        true
    }
}

/// State of a transfer session. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Probing,
    Downloading,
    Completed,
    Cancelled,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Cancelled | SessionState::Failed
        )
    }

    /// Probing and Downloading sessions own a worker thread
    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }

    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Probing, Downloading) => true,
            (Probing | Downloading, Completed | Cancelled | Failed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Probing => "probing",
            SessionState::Downloading => "downloading",
            SessionState::Completed => "completed",
            SessionState::Cancelled => "cancelled",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Scheduler Types
// ============================================================================

/// Which of the two scheduler clocks feeds a task's elapsed time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockDomain {
    /// Host time affected by the time scale (pausable game/simulation time)
    Scaled,
    /// Real time, unaffected by the time scale
    #[default]
    Unscaled,
}

/// Options accepted when registering a scheduled task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskOptions {
    /// Seconds of clock time before the task fires
    pub duration: f64,
    /// Identity used for deduplication, lookup and cancellation
    pub flag: Option<String>,
    /// Fire every `duration` seconds until removed
    pub looping: bool,
    /// Read the unscaled clock instead of the scaled one
    pub ignore_scale: bool,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            duration: 0.0,
            flag: None,
            looping: false,
            ignore_scale: true,
        }
    }
}

impl TaskOptions {
    pub fn after(duration: f64) -> Self {
        Self {
            duration,
            ..Self::default()
        }
    }

    /// Fire on the next tick
    pub fn next_tick() -> Self {
        Self::default()
    }

    pub fn flag(mut self, flag: impl Into<String>) -> Self {
        let flag = flag.into();
        self.flag = if flag.is_empty() { None } else { Some(flag) };
        self
    }

    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn ignore_scale(mut self, ignore_scale: bool) -> Self {
        self.ignore_scale = ignore_scale;
        self
    }

    pub fn clock_domain(&self) -> ClockDomain {
        if self.ignore_scale {
            ClockDomain::Unscaled
        } else {
            ClockDomain::Scaled
        }
    }
}

// ============================================================================
// Settings Types
// ============================================================================

/// Transfer engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum bytes read from the network per chunk
    pub chunk_size: usize,
    /// fsync file data after every chunk so the file length is a durable checkpoint
    pub sync_writes: bool,
    /// Per-session speed limit in bytes per second (None = unlimited)
    pub speed_limit: Option<u64>,
    pub connect_timeout_secs: u64,
    pub user_agent: String,
    /// How often a host should tick the scheduler
    pub tick_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: 64 * 1024,
            sync_writes: true,
            speed_limit: None,
            connect_timeout_secs: 30,
            user_agent: format!("tickload/{}", env!("CARGO_PKG_VERSION")),
            tick_interval_ms: 16,
        }
    }
}

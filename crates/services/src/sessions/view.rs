use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use assess_core::grading::Verdict;
use assess_core::model::{RunStatus, ScenarioId};
use assess_core::time::{format_remaining, is_low_time};

use crate::engine::EngineState;

/// Identifies one run request in logs and reports.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RunId(Uuid);

impl RunId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RunId({})", self.0)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a run request had no effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunIgnored {
    EngineNotReady,
    AlreadyRunning,
}

/// A run that reached the engine and was classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub run_id: RunId,
    pub level_index: usize,
    pub verdict: Verdict,
    pub output: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Passed
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum RunOutcome {
    Completed(RunReport),
    Ignored(RunIgnored),
}

impl RunOutcome {
    #[must_use]
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            RunOutcome::Completed(report) => Some(report),
            RunOutcome::Ignored(_) => None,
        }
    }
}

/// Point-in-time copy of a session, for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub scenario_id: ScenarioId,
    pub level_index: usize,
    pub level_count: usize,
    pub level_title: String,
    pub code: String,
    pub time_remaining_secs: u32,
    pub status: RunStatus,
    pub last_output: String,
    pub engine: EngineState,
    pub is_complete: bool,
}

impl SessionSnapshot {
    /// Whether a run control should be enabled.
    #[must_use]
    pub fn can_run(&self) -> bool {
        self.engine == EngineState::Ready && self.status != RunStatus::Running
    }

    #[must_use]
    pub fn can_advance(&self) -> bool {
        self.status == RunStatus::Success && self.level_index + 1 < self.level_count
    }

    #[must_use]
    pub fn time_display(&self) -> String {
        format_remaining(self.time_remaining_secs)
    }

    #[must_use]
    pub fn is_low_time(&self) -> bool {
        is_low_time(self.time_remaining_secs)
    }
}

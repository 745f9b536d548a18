use std::fmt;

use serde::{Deserialize, Serialize};

use crate::grading::{self, GradedRun};
use crate::model::ScenarioId;

/// Lifecycle of the most recent run request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    Success,
    Error,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunStatus::Idle => "idle",
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Error => "error",
        };
        f.write_str(label)
    }
}

/// Result of trying to start a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum RunGate {
    Started,
    AlreadyRunning,
}

/// Result of trying to move to the next level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum AdvanceOutcome {
    Advanced { level_index: usize },
    /// The current level has not been passed yet.
    NotPassed,
    /// Already on the last level; there is nothing further to unlock.
    AssessmentComplete,
}

//
// ─── SESSION STATE ─────────────────────────────────────────────────────────────
//

/// Mutable per-scenario state.
///
/// Every operation here is a guarded transition: calls made outside their
/// precondition leave the state untouched and report why through the return
/// value. Persistence and engine access live in the services layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    scenario_id: ScenarioId,
    level_count: usize,
    current_level: usize,
    code: String,
    time_remaining_secs: u32,
    status: RunStatus,
    last_output: String,
    /// The in-flight run was overtaken by a reset; its result must not land.
    discard_run: bool,
}

impl SessionState {
    /// Create state for a scenario with `level_count` levels.
    ///
    /// `code` and `time_remaining_secs` are the already-resolved values: persisted
    /// state if present, otherwise the first level's starter code and the full budget.
    #[must_use]
    pub fn new(
        scenario_id: ScenarioId,
        level_count: usize,
        code: String,
        time_remaining_secs: u32,
    ) -> Self {
        Self {
            scenario_id,
            level_count: level_count.max(1),
            current_level: 0,
            code,
            time_remaining_secs,
            status: RunStatus::Idle,
            last_output: grading::ENGINE_LOADING_MESSAGE.to_string(),
            discard_run: false,
        }
    }

    #[must_use]
    pub fn scenario_id(&self) -> &ScenarioId {
        &self.scenario_id
    }

    #[must_use]
    pub fn level_count(&self) -> usize {
        self.level_count
    }

    #[must_use]
    pub fn current_level(&self) -> usize {
        self.current_level
    }

    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    #[must_use]
    pub fn time_remaining_secs(&self) -> u32 {
        self.time_remaining_secs
    }

    #[must_use]
    pub fn status(&self) -> RunStatus {
        self.status
    }

    #[must_use]
    pub fn last_output(&self) -> &str {
        &self.last_output
    }

    #[must_use]
    pub fn is_last_level(&self) -> bool {
        self.current_level + 1 >= self.level_count
    }

    /// Terminal state: the last level has been passed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.is_last_level() && self.status == RunStatus::Success
    }

    /// Replace the code buffer. Allowed at any time, including during a run.
    pub fn set_code(&mut self, code: impl Into<String>) {
        self.code = code.into();
    }

    /// Replace the message shown to the user without touching the run status.
    pub fn set_message(&mut self, message: impl Into<String>) {
        self.last_output = message.into();
    }

    /// Enter `Running` unless a run is already in flight.
    pub fn begin_run(&mut self) -> RunGate {
        if self.status == RunStatus::Running {
            return RunGate::AlreadyRunning;
        }
        self.status = RunStatus::Running;
        self.discard_run = false;
        self.last_output = grading::RUNNING_MESSAGE.to_string();
        RunGate::Started
    }

    /// Apply a graded result. Ignored unless a run is in flight.
    ///
    /// A run overtaken by `reset` graded code that is no longer in the buffer:
    /// it only releases the run gate and returns `false`.
    pub fn finish_run(&mut self, graded: GradedRun) -> bool {
        if self.status != RunStatus::Running {
            return false;
        }
        if self.discard_run {
            self.discard_run = false;
            self.status = RunStatus::Idle;
            return false;
        }
        self.status = graded.status();
        self.last_output = graded.output;
        true
    }

    /// Move to the next level after a successful run.
    ///
    /// The code buffer is carried over unchanged: later levels extend the same
    /// solution rather than starting from their own starter code.
    pub fn advance(&mut self) -> AdvanceOutcome {
        if self.status != RunStatus::Success {
            return AdvanceOutcome::NotPassed;
        }
        if self.is_last_level() {
            return AdvanceOutcome::AssessmentComplete;
        }
        self.current_level += 1;
        self.status = RunStatus::Idle;
        self.last_output = grading::LEVEL_UP_MESSAGE.to_string();
        AdvanceOutcome::Advanced {
            level_index: self.current_level,
        }
    }

    /// Restore the first level's starter code. Level and timer are kept.
    ///
    /// A run in flight keeps the session `Running` until it finishes, so no
    /// second run can start, and its result is discarded.
    pub fn reset(&mut self, first_level_starter: &str) {
        self.code = first_level_starter.to_string();
        if self.status == RunStatus::Running {
            self.discard_run = true;
        } else {
            self.status = RunStatus::Idle;
        }
        self.last_output = grading::RESET_MESSAGE.to_string();
    }

    /// One second elapsed. Returns the new remaining time, floored at zero.
    pub fn tick(&mut self) -> u32 {
        self.time_remaining_secs = self.time_remaining_secs.saturating_sub(1);
        self.time_remaining_secs
    }
}

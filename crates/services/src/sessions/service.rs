use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::Instrument;

use assess_core::grading::{self, CombinedSource};
use assess_core::model::{AdvanceOutcome, Level, RunGate, RunStatus, Scenario, SessionState};
use storage::session_state::SessionStateRepository;

use super::view::{RunId, RunIgnored, RunOutcome, RunReport, SessionSnapshot};
use crate::config::AssessmentConfig;
use crate::engine::{EngineHost, EngineState, OutputCapture};
use crate::Clock;

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// Controller for one scenario: level navigation, the code buffer, runs,
/// the countdown and persistence.
///
/// All methods take `&self` so a countdown task and user actions can
/// interleave with an in-flight run. The state lock is never held across an
/// await point.
pub struct AssessmentSession {
    scenario: Arc<Scenario>,
    persisted: SessionStateRepository,
    engine: Arc<EngineHost>,
    clock: Clock,
    state: Mutex<SessionState>,
}

impl AssessmentSession {
    /// Open a session, restoring persisted code and timer when present.
    ///
    /// Storage failures are logged and the defaults are used instead.
    pub async fn open(
        scenario: Arc<Scenario>,
        persisted: SessionStateRepository,
        engine: Arc<EngineHost>,
        clock: Clock,
        config: &AssessmentConfig,
    ) -> Self {
        let id = scenario.id();

        let code = match persisted.load_code(id).await {
            Ok(Some(code)) => code,
            Ok(None) => scenario.starter_code().to_string(),
            Err(err) => {
                tracing::warn!(scenario = %id, error = %err, "could not load saved code; using starter code");
                scenario.starter_code().to_string()
            }
        };

        let time_remaining = match persisted.load_time_remaining(id).await {
            Ok(Some(secs)) => secs,
            Ok(None) => config.time_budget_secs,
            Err(err) => {
                tracing::warn!(scenario = %id, error = %err, "could not load saved timer; using full budget");
                config.time_budget_secs
            }
        };

        let mut state = SessionState::new(id.clone(), scenario.level_count(), code, time_remaining);
        match engine.state() {
            EngineState::Ready => state.set_message(grading::ENGINE_READY_MESSAGE),
            EngineState::Failed => state.set_message(grading::ENGINE_FAILED_MESSAGE),
            EngineState::Uninitialized | EngineState::Loading => {}
        }

        tracing::debug!(scenario = %id, time_remaining, "session opened");

        Self {
            scenario,
            persisted,
            engine,
            clock,
            state: Mutex::new(state),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn scenario(&self) -> &Arc<Scenario> {
        &self.scenario
    }

    #[must_use]
    pub fn engine_state(&self) -> EngineState {
        self.engine.state()
    }

    /// Level currently being attempted.
    #[must_use]
    pub fn active_level(&self) -> &Level {
        let index = self.lock_state().current_level();
        self.scenario
            .level(index)
            .unwrap_or_else(|| self.scenario.first_level())
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let engine = self.engine.state();
        let state = self.lock_state();
        let level_title = self
            .scenario
            .level(state.current_level())
            .map(|level| level.title().to_string())
            .unwrap_or_default();

        SessionSnapshot {
            scenario_id: state.scenario_id().clone(),
            level_index: state.current_level(),
            level_count: state.level_count(),
            level_title,
            code: state.code().to_string(),
            time_remaining_secs: state.time_remaining_secs(),
            status: state.status(),
            last_output: state.last_output().to_string(),
            engine,
            is_complete: state.is_complete(),
        }
    }

    /// Bring up the shared engine (once per process) and reflect the outcome.
    pub async fn prepare_engine(&self) -> EngineState {
        let engine_state = self.engine.ensure_ready().await;
        let mut state = self.lock_state();
        match engine_state {
            EngineState::Ready => {
                if state.status() == RunStatus::Idle
                    && state.last_output() == grading::ENGINE_LOADING_MESSAGE
                {
                    state.set_message(grading::ENGINE_READY_MESSAGE);
                }
            }
            EngineState::Failed => state.set_message(grading::ENGINE_FAILED_MESSAGE),
            EngineState::Uninitialized | EngineState::Loading => {}
        }
        engine_state
    }

    /// Replace the code buffer and persist it.
    pub async fn edit_code(&self, code: impl Into<String>) {
        let code = code.into();
        self.lock_state().set_code(code.clone());
        self.persist_code(&code).await;
    }

    /// Run the buffer against the active level's harness.
    ///
    /// Ignored while the engine is not ready or while another run of this
    /// session is in flight. Engine errors are converted into an `error`
    /// status; they never propagate.
    pub async fn run(&self) -> RunOutcome {
        if !self.engine.is_ready() {
            tracing::debug!(scenario = %self.scenario.id(), "run ignored: engine not ready");
            return RunOutcome::Ignored(RunIgnored::EngineNotReady);
        }

        let (source, level_index) = {
            let mut state = self.lock_state();
            if state.begin_run() == RunGate::AlreadyRunning {
                tracing::debug!(scenario = %self.scenario.id(), "run ignored: already running");
                return RunOutcome::Ignored(RunIgnored::AlreadyRunning);
            }
            let level_index = state.current_level();
            let test_code = self
                .scenario
                .level(level_index)
                .map_or("", Level::test_code);
            (CombinedSource::new(state.code(), test_code), level_index)
        };

        let run_id = RunId::new();
        let started_at = self.clock.now();
        let span = tracing::info_span!(
            "run",
            %run_id,
            scenario = %self.scenario.id(),
            level = level_index
        );

        let graded = async {
            let Some(engine) = self.engine.lease().await else {
                return grading::grade_runtime_error(grading::ENGINE_FAILED_MESSAGE);
            };
            let capture = OutputCapture::attach(&*engine);
            match engine.run(source.as_str()).await {
                Ok(()) => grading::grade_output(&capture.finish()),
                Err(err) => {
                    drop(capture);
                    tracing::debug!(error = %err, "engine raised during run");
                    source.grade_runtime_error(&err.to_string())
                }
            }
        }
        .instrument(span.clone())
        .await;

        let finished_at = self.clock.now();
        span.in_scope(|| {
            tracing::info!(verdict = ?graded.verdict, "run finished");
        });

        if !self.lock_state().finish_run(graded.clone()) {
            span.in_scope(|| tracing::debug!("result discarded: buffer was reset during the run"));
        }

        RunOutcome::Completed(RunReport {
            run_id,
            level_index,
            verdict: graded.verdict,
            output: graded.output,
            started_at,
            finished_at,
        })
    }

    /// Move to the next level after a pass. The buffer is carried over.
    pub fn advance(&self) -> AdvanceOutcome {
        let outcome = self.lock_state().advance();
        if let AdvanceOutcome::Advanced { level_index } = outcome {
            tracing::info!(scenario = %self.scenario.id(), level = level_index, "advanced to next level");
        }
        outcome
    }

    /// Restore the first level's starter code.
    ///
    /// The caller is responsible for having obtained the user's confirmation.
    /// A run in flight still finishes, but its result is dropped.
    pub async fn reset(&self) {
        let starter = self.scenario.starter_code();
        self.lock_state().reset(starter);
        self.persist_code(starter).await;
    }

    /// Remove one second from the budget and persist the new value.
    pub async fn tick(&self) -> u32 {
        let remaining = self.lock_state().tick();
        if let Err(err) = self
            .persisted
            .save_time_remaining(self.scenario.id(), remaining)
            .await
        {
            tracing::warn!(scenario = %self.scenario.id(), error = %err, "could not persist timer");
        }
        remaining
    }

    async fn persist_code(&self, code: &str) {
        if let Err(err) = self.persisted.save_code(self.scenario.id(), code).await {
            tracing::warn!(scenario = %self.scenario.id(), error = %err, "could not persist code");
        }
    }
}

impl fmt::Debug for AssessmentSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock_state();
        f.debug_struct("AssessmentSession")
            .field("scenario", self.scenario.id())
            .field("current_level", &state.current_level())
            .field("status", &state.status())
            .field("time_remaining_secs", &state.time_remaining_secs())
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use assess_core::grading::{SENTINEL, Verdict};
    use assess_core::model::{Difficulty, LevelId, ScenarioId};
    use assess_core::time::fixed_clock;
    use storage::repository::InMemoryStore;

    use crate::engine::{Script, ScriptedBootstrap, ScriptedEngine};

    fn scenario() -> Arc<Scenario> {
        let levels = vec![
            Level::new(
                LevelId::new(1),
                "Square",
                "Implement f",
                "def f(x): pass",
                "assert f(2) == 4\nprint('ALL_TESTS_PASSED')",
            ),
            Level::new(
                LevelId::new(2),
                "Cube",
                "Implement g",
                "def g(x): pass",
                "assert g(2) == 8\nprint('ALL_TESTS_PASSED')",
            ),
        ];
        Arc::new(
            Scenario::new(
                ScenarioId::new("squares").unwrap(),
                "Squares",
                Difficulty::Easy,
                "",
                levels,
            )
            .unwrap(),
        )
    }

    /// Passes when the submission defines `f` as a square.
    fn squares_engine() -> Arc<ScriptedEngine> {
        Arc::new(ScriptedEngine::new(|source| {
            if source.contains("return x*x") {
                Script::printing([SENTINEL])
            } else {
                Script::printing(["TEST_FAIL: f(2) returned None"])
            }
        }))
    }

    async fn open_with(engine: Arc<ScriptedEngine>) -> AssessmentSession {
        let host = EngineHost::shared(Arc::new(ScriptedBootstrap::new(engine)));
        let repo = SessionStateRepository::new(Arc::new(InMemoryStore::new()));
        let session = AssessmentSession::open(
            scenario(),
            repo,
            host,
            fixed_clock(),
            &AssessmentConfig::default(),
        )
        .await;
        session.prepare_engine().await;
        session
    }

    #[tokio::test]
    async fn fresh_session_uses_defaults() {
        let session = open_with(squares_engine()).await;
        let snap = session.snapshot();
        assert_eq!(snap.code, "def f(x): pass");
        assert_eq!(snap.time_remaining_secs, 4200);
        assert_eq!(snap.level_index, 0);
        assert_eq!(snap.status, RunStatus::Idle);
        assert_eq!(snap.last_output, grading::ENGINE_READY_MESSAGE);
        assert!(snap.can_run());
    }

    #[tokio::test]
    async fn passing_run_then_advance_keeps_buffer() {
        let session = open_with(squares_engine()).await;
        session.edit_code("def f(x): return x*x").await;

        let outcome = session.run().await;
        let report = outcome.report().unwrap();
        assert_eq!(report.verdict, Verdict::Passed);
        assert_eq!(report.level_index, 0);
        assert_eq!(session.snapshot().status, RunStatus::Success);
        assert!(session.snapshot().last_output.starts_with(grading::PASS_BANNER));

        assert_eq!(session.advance(), AdvanceOutcome::Advanced { level_index: 1 });
        let snap = session.snapshot();
        assert_eq!(snap.level_index, 1);
        assert_eq!(snap.code, "def f(x): return x*x");
        assert_eq!(snap.status, RunStatus::Idle);
        assert_eq!(session.active_level().title(), "Cube");
    }

    #[tokio::test]
    async fn failing_harness_is_an_error_status() {
        let session = open_with(squares_engine()).await;
        let outcome = session.run().await;
        assert_eq!(outcome.report().unwrap().verdict, Verdict::Failed);

        let snap = session.snapshot();
        assert_eq!(snap.status, RunStatus::Error);
        assert!(snap.last_output.starts_with(grading::FAIL_BANNER));
        assert!(snap.last_output.contains("TEST_FAIL"));
        assert_eq!(session.advance(), AdvanceOutcome::NotPassed);
    }

    #[tokio::test]
    async fn runtime_error_is_normalized() {
        let engine = Arc::new(ScriptedEngine::new(|_| {
            Script::silent().raising("PythonError: ZeroDivisionError: division by zero")
        }));
        let session = open_with(engine).await;

        let outcome = session.run().await;
        assert_eq!(outcome.report().unwrap().verdict, Verdict::RuntimeError);

        let snap = session.snapshot();
        assert_eq!(snap.status, RunStatus::Error);
        assert_eq!(
            snap.last_output,
            "RUNTIME ERROR:\nZeroDivisionError: division by zero"
        );
        assert!(!snap.last_output.contains("PythonError"));
        assert!(!snap.last_output.contains("engine error"));
    }

    #[tokio::test]
    async fn run_is_ignored_before_engine_is_ready() {
        let engine = squares_engine();
        let host = EngineHost::shared(Arc::new(ScriptedBootstrap::new(engine.clone())));
        let repo = SessionStateRepository::new(Arc::new(InMemoryStore::new()));
        let session =
            AssessmentSession::open(scenario(), repo, host, fixed_clock(), &AssessmentConfig::default())
                .await;

        assert_eq!(session.run().await, RunOutcome::Ignored(RunIgnored::EngineNotReady));
        assert_eq!(engine.runs(), 0);
        assert_eq!(session.snapshot().status, RunStatus::Idle);
        assert_eq!(session.snapshot().last_output, grading::ENGINE_LOADING_MESSAGE);
    }

    #[tokio::test]
    async fn failed_bootstrap_disables_runs() {
        let host = EngineHost::shared(Arc::new(ScriptedBootstrap::failing("no interpreter")));
        let repo = SessionStateRepository::new(Arc::new(InMemoryStore::new()));
        let session =
            AssessmentSession::open(scenario(), repo, host, fixed_clock(), &AssessmentConfig::default())
                .await;

        assert_eq!(session.prepare_engine().await, EngineState::Failed);
        let snap = session.snapshot();
        assert_eq!(snap.last_output, grading::ENGINE_FAILED_MESSAGE);
        assert!(!snap.can_run());
        assert_eq!(session.run().await, RunOutcome::Ignored(RunIgnored::EngineNotReady));
    }

    #[tokio::test]
    async fn reset_restores_first_level_starter() {
        let session = open_with(squares_engine()).await;
        session.edit_code("def f(x): return x*x").await;
        let _ = session.run().await;
        let _ = session.advance();
        session.edit_code("def g(x): return x**3").await;

        session.reset().await;
        let snap = session.snapshot();
        assert_eq!(snap.code, "def f(x): pass");
        assert_eq!(snap.level_index, 1);
        assert_eq!(snap.status, RunStatus::Idle);
        assert_eq!(snap.last_output, grading::RESET_MESSAGE);
    }

    #[tokio::test]
    async fn reset_during_run_blocks_a_second_run_and_drops_the_stale_pass() {
        let gate = Arc::new(tokio::sync::Notify::new());
        let engine = Arc::new(
            ScriptedEngine::new(|_| Script::printing([SENTINEL])).with_gate(Arc::clone(&gate)),
        );
        let session = open_with(Arc::clone(&engine)).await;
        session.edit_code("def f(x): return x*x").await;

        let (first, second) = tokio::join!(session.run(), async {
            session.reset().await;
            assert_eq!(session.snapshot().status, RunStatus::Running);
            let second = session.run().await;
            gate.notify_one();
            second
        });

        assert_eq!(second, RunOutcome::Ignored(RunIgnored::AlreadyRunning));
        assert_eq!(first.report().unwrap().verdict, Verdict::Passed);
        assert_eq!(engine.runs(), 1);

        let snap = session.snapshot();
        assert_eq!(snap.status, RunStatus::Idle);
        assert_eq!(snap.code, "def f(x): pass");
        assert_eq!(snap.last_output, grading::RESET_MESSAGE);
        assert_eq!(session.advance(), AdvanceOutcome::NotPassed);
    }

    #[tokio::test]
    async fn tick_floors_at_zero() {
        let host = EngineHost::shared(Arc::new(ScriptedBootstrap::new(squares_engine())));
        let repo = SessionStateRepository::new(Arc::new(InMemoryStore::new()));
        let config = AssessmentConfig {
            time_budget_secs: 2,
            ..AssessmentConfig::default()
        };
        let session = AssessmentSession::open(scenario(), repo.clone(), host, fixed_clock(), &config).await;

        assert_eq!(session.tick().await, 1);
        assert_eq!(session.tick().await, 0);
        assert_eq!(session.tick().await, 0);
        assert_eq!(
            repo.load_time_remaining(session.scenario().id()).await.unwrap(),
            Some(0)
        );
    }
}

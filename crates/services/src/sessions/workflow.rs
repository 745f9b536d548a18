use assess_core::model::AdvanceOutcome;

use super::service::AssessmentSession;
use super::view::{RunIgnored, RunOutcome, RunReport};

/// Result of driving one buffer through as many levels as it passes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Walkthrough {
    /// One report per level attempted, in order.
    pub reports: Vec<RunReport>,
    pub levels_passed: usize,
    /// The last level was passed.
    pub completed: bool,
    /// Set when a run request was ignored instead of executed.
    pub stopped: Option<RunIgnored>,
}

impl Walkthrough {
    /// The report for the level that stopped progress, if one failed.
    #[must_use]
    pub fn failure(&self) -> Option<&RunReport> {
        self.reports.last().filter(|report| !report.passed())
    }
}

impl AssessmentSession {
    /// Run the current buffer, advancing after every pass, until a level
    /// fails or the assessment is complete.
    ///
    /// The buffer is carried unchanged into each new level, so a solution
    /// covering every level walks the whole scenario in one call.
    pub async fn run_through(&self) -> Walkthrough {
        let mut walk = Walkthrough::default();

        loop {
            let report = match self.run().await {
                RunOutcome::Completed(report) => report,
                RunOutcome::Ignored(reason) => {
                    walk.stopped = Some(reason);
                    break;
                }
            };
            let passed = report.passed();
            walk.reports.push(report);
            if !passed {
                break;
            }
            walk.levels_passed += 1;

            match self.advance() {
                AdvanceOutcome::Advanced { .. } => {}
                AdvanceOutcome::AssessmentComplete => {
                    walk.completed = true;
                    break;
                }
                AdvanceOutcome::NotPassed => break,
            }
        }

        tracing::info!(
            scenario = %self.scenario().id(),
            levels_passed = walk.levels_passed,
            completed = walk.completed,
            "walkthrough finished"
        );
        walk
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::AssessmentConfig;
    use crate::engine::{EngineHost, Script, ScriptedBootstrap, ScriptedEngine};
    use assess_core::grading::{SENTINEL, Verdict};
    use assess_core::model::{Difficulty, Level, LevelId, Scenario, ScenarioId};
    use assess_core::time::fixed_clock;
    use storage::repository::InMemoryStore;
    use storage::session_state::SessionStateRepository;

    /// Level n's harness checks for `feature_n` in the buffer.
    fn scenario(levels: u32) -> Arc<Scenario> {
        let levels = (1..=levels)
            .map(|n| {
                Level::new(
                    LevelId::new(n),
                    format!("Level {n}"),
                    "",
                    "",
                    format!("check('feature_{n}')"),
                )
            })
            .collect();
        Arc::new(
            Scenario::new(ScenarioId::new("walk").unwrap(), "Walk", Difficulty::Medium, "", levels)
                .unwrap(),
        )
    }

    fn engine() -> Arc<ScriptedEngine> {
        Arc::new(ScriptedEngine::new(|source| {
            let wanted = source
                .rsplit("check('")
                .next()
                .and_then(|rest| rest.split('\'').next())
                .unwrap_or_default();
            let user = source.split("check('").next().unwrap_or_default();
            if user.contains(wanted) {
                Script::printing([SENTINEL])
            } else {
                Script::printing([format!("missing {wanted}")])
            }
        }))
    }

    async fn session(levels: u32, ready: bool) -> AssessmentSession {
        let host = EngineHost::shared(Arc::new(ScriptedBootstrap::new(engine())));
        let repo = SessionStateRepository::new(Arc::new(InMemoryStore::new()));
        let session = AssessmentSession::open(
            scenario(levels),
            repo,
            host,
            fixed_clock(),
            &AssessmentConfig::default(),
        )
        .await;
        if ready {
            session.prepare_engine().await;
        }
        session
    }

    #[tokio::test]
    async fn complete_solution_walks_every_level() {
        let session = session(3, true).await;
        session.edit_code("feature_1 feature_2 feature_3").await;

        let walk = session.run_through().await;
        assert!(walk.completed);
        assert_eq!(walk.levels_passed, 3);
        assert_eq!(walk.reports.len(), 3);
        assert!(walk.failure().is_none());
        assert!(session.snapshot().is_complete);
    }

    #[tokio::test]
    async fn stops_at_first_failing_level() {
        let session = session(3, true).await;
        session.edit_code("feature_1").await;

        let walk = session.run_through().await;
        assert!(!walk.completed);
        assert_eq!(walk.levels_passed, 1);
        let failure = walk.failure().unwrap();
        assert_eq!(failure.level_index, 1);
        assert_eq!(failure.verdict, Verdict::Failed);
        assert!(failure.output.contains("missing feature_2"));
        assert_eq!(session.snapshot().level_index, 1);
    }

    #[tokio::test]
    async fn reports_ignored_run() {
        let session = session(2, false).await;
        let walk = session.run_through().await;
        assert_eq!(walk.stopped, Some(RunIgnored::EngineNotReady));
        assert!(walk.reports.is_empty());
    }
}

mod ids;
mod scenario;
mod session;

pub use ids::{LevelId, ParseIdError, ScenarioId};
pub use scenario::{Difficulty, Level, Scenario, ScenarioDraft, ScenarioError};
pub use session::{AdvanceOutcome, RunGate, RunStatus, SessionState};

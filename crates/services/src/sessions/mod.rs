mod countdown;
mod service;
mod view;
mod workflow;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use countdown::Countdown;
pub use service::AssessmentSession;
pub use view::{RunId, RunIgnored, RunOutcome, RunReport, SessionSnapshot};
pub use workflow::Walkthrough;

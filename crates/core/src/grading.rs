//! Result classification for a single run.
//!
//! The harness decides pass/fail on its own and reports it by printing
//! [`SENTINEL`]. Nothing else crosses the boundary: no exit codes, no
//! structured result objects.

use crate::model::RunStatus;

/// Literal a harness prints to standard output when every check passed.
pub const SENTINEL: &str = "ALL_TESTS_PASSED";

pub const ENGINE_LOADING_MESSAGE: &str = "Initializing Python environment...";
pub const ENGINE_READY_MESSAGE: &str = "Ready to run tests.";
pub const ENGINE_FAILED_MESSAGE: &str = "Error loading Python engine. Please refresh.";
pub const RUNNING_MESSAGE: &str = "Running tests...";
pub const PASS_BANNER: &str = "✅ Tests Passed!";
pub const FAIL_BANNER: &str = "❌ Tests Failed.";
pub const RUNTIME_ERROR_BANNER: &str = "RUNTIME ERROR:";
pub const LEVEL_UP_MESSAGE: &str = "Level up! New requirements loaded.";
pub const RESET_MESSAGE: &str = "Code reset.";

/// Marker placed between user code and the harness.
const HARNESS_BOUNDARY: &str = "\n\n# ---- level tests ----\n";

/// Wrapper prefixes engines put in front of the underlying exception text.
const ENGINE_ERROR_PREFIXES: &[&str] = &["PythonError: ", "engine error: "];

//
// ─── COMBINED SOURCE ───────────────────────────────────────────────────────────
//

/// Where a 1-based line of the combined source came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceRegion {
    User,
    Boundary,
    Harness,
}

/// User code followed by the level harness, as submitted to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinedSource {
    text: String,
    user_lines: usize,
}

impl CombinedSource {
    #[must_use]
    pub fn new(user_code: &str, test_code: &str) -> Self {
        let mut text =
            String::with_capacity(user_code.len() + HARNESS_BOUNDARY.len() + test_code.len());
        text.push_str(user_code);
        text.push_str(HARNESS_BOUNDARY);
        text.push_str(test_code);

        Self {
            text,
            user_lines: user_code.split('\n').count(),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// First line number that belongs to the harness.
    #[must_use]
    pub fn harness_start_line(&self) -> usize {
        self.user_lines + 3
    }

    /// Attribute a line number reported by the engine.
    #[must_use]
    pub fn region_of_line(&self, line: usize) -> SourceRegion {
        if line <= self.user_lines {
            SourceRegion::User
        } else if line < self.harness_start_line() {
            SourceRegion::Boundary
        } else {
            SourceRegion::Harness
        }
    }

    /// Grade an engine error raised while running this source.
    ///
    /// When the innermost `line N` reference in the message lands in the
    /// harness, a note says so: the failure was detected by the level's tests
    /// rather than raised inside the submission.
    #[must_use]
    pub fn grade_runtime_error(&self, raw: &str) -> GradedRun {
        let mut graded = grade_runtime_error(raw);
        if let Some(line) = last_line_reference(&graded.output) {
            if self.region_of_line(line) == SourceRegion::Harness {
                let test_line = line + 1 - self.harness_start_line();
                graded.output.push_str(&format!(
                    "\n\n(line {line} is line {test_line} of the level's test code, not your submission)"
                ));
            }
        }
        graded
    }
}

/// Number after the last standalone `line ` in a traceback-like message.
fn last_line_reference(message: &str) -> Option<usize> {
    message
        .match_indices("line ")
        .filter(|(at, _)| {
            message[..*at]
                .chars()
                .next_back()
                .is_none_or(|c| !c.is_alphanumeric())
        })
        .filter_map(|(at, word)| {
            let rest = &message[at + word.len()..];
            let end = rest
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(rest.len());
            rest[..end].parse().ok()
        })
        .last()
}

//
// ─── GRADING ───────────────────────────────────────────────────────────────────
//

/// How a completed run was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Passed,
    Failed,
    RuntimeError,
}

impl Verdict {
    #[must_use]
    pub fn status(self) -> RunStatus {
        match self {
            Verdict::Passed => RunStatus::Success,
            Verdict::Failed | Verdict::RuntimeError => RunStatus::Error,
        }
    }
}

/// Classified run result, ready to be applied to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradedRun {
    pub verdict: Verdict,
    pub output: String,
}

impl GradedRun {
    #[must_use]
    pub fn status(&self) -> RunStatus {
        self.verdict.status()
    }
}

/// Grade a run that completed without the engine raising.
#[must_use]
pub fn grade_output(captured: &str) -> GradedRun {
    if captured.contains(SENTINEL) {
        GradedRun {
            verdict: Verdict::Passed,
            output: format!("{PASS_BANNER}\n\n{captured}"),
        }
    } else {
        GradedRun {
            verdict: Verdict::Failed,
            output: format!("{FAIL_BANNER}\n\n{captured}"),
        }
    }
}

/// Grade a run where the engine raised during execution.
#[must_use]
pub fn grade_runtime_error(raw: &str) -> GradedRun {
    GradedRun {
        verdict: Verdict::RuntimeError,
        output: format!("{RUNTIME_ERROR_BANNER}\n{}", normalize_runtime_error(raw)),
    }
}

/// Strip engine wrapper prefixes so every runtime error has the same shape.
#[must_use]
pub fn normalize_runtime_error(raw: &str) -> String {
    let mut message = raw.trim_start();
    while let Some(rest) = ENGINE_ERROR_PREFIXES
        .iter()
        .find_map(|prefix| message.strip_prefix(prefix))
    {
        message = rest.trim_start();
    }
    message.trim_end().to_string()
}

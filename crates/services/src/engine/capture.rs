use std::sync::{Arc, Mutex, PoisonError};

use super::ExecutionEngine;

/// Scoped standard output subscription for a single run.
///
/// The hook is installed on `attach` and removed when the capture is dropped,
/// whether the run finished, raised, or the future was abandoned.
pub struct OutputCapture<'a> {
    engine: &'a dyn ExecutionEngine,
    lines: Arc<Mutex<Vec<String>>>,
}

impl<'a> OutputCapture<'a> {
    #[must_use]
    pub fn attach(engine: &'a dyn ExecutionEngine) -> Self {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lines);
        engine.set_stdout(Some(Arc::new(move |chunk: &str| {
            sink.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(chunk.to_string());
        })));
        Self { engine, lines }
    }

    /// Detach and return the captured lines joined with newlines.
    #[must_use]
    pub fn finish(self) -> String {
        let lines = std::mem::take(
            &mut *self.lines.lock().unwrap_or_else(PoisonError::into_inner),
        );
        lines.join("\n")
    }
}

impl Drop for OutputCapture<'_> {
    fn drop(&mut self) {
        self.engine.set_stdout(None);
    }
}

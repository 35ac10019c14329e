use parking_lot::Mutex;
use std::io::Write;

/// Where supervisor progress goes.
///
/// Status lines are user-facing and kept apart from `tracing` diagnostics,
/// which go to stderr and are filtered by `RUST_LOG`.
pub trait UserOutput: Send + Sync {
    /// Plain status line, e.g. "Starting api..."
    fn status(&self, message: &str);

    /// e.g. "api started (PID 4121)"
    fn success(&self, message: &str);

    /// e.g. "Port 8000 in use, skipping api"
    fn warning(&self, message: &str);

    fn error(&self, message: &str);

    /// Inline progress (no trailing newline). Call `finish_progress` after.
    fn progress(&self, message: &str);

    /// Finish an inline progress line with a result.
    fn finish_progress(&self, result: &str);

    fn blank(&self);

    /// Framed heading used by the startup banner.
    fn section(&self, title: &str) {
        let rule = "=".repeat(60);
        self.status(&rule);
        self.status(title);
        self.status(&rule);
    }
}

/// Terminal output: green success, yellow warnings, red errors.
pub struct CliOutput;

impl UserOutput for CliOutput {
    fn status(&self, message: &str) {
        println!("{}", message);
    }

    fn success(&self, message: &str) {
        println!("\x1b[32m{}\x1b[0m", message);
    }

    fn warning(&self, message: &str) {
        eprintln!("\x1b[33m{}\x1b[0m", message);
    }

    fn error(&self, message: &str) {
        eprintln!("\x1b[31m{}\x1b[0m", message);
    }

    fn progress(&self, message: &str) {
        print!("{}", message);
        std::io::stdout().flush().ok();
    }

    fn finish_progress(&self, result: &str) {
        println!("{}", result);
    }

    fn blank(&self) {
        println!();
    }
}

/// Discards everything.
pub struct QuietOutput;

impl UserOutput for QuietOutput {
    fn status(&self, _message: &str) {}
    fn success(&self, _message: &str) {}
    fn warning(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
    fn progress(&self, _message: &str) {}
    fn finish_progress(&self, _result: &str) {}
    fn blank(&self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Status,
    Success,
    Warning,
    Error,
}

/// Keeps every line in memory, for asserting on what a run reported.
#[derive(Default)]
pub struct RecordingOutput {
    lines: Mutex<Vec<(Level, String)>>,
    pending: Mutex<String>,
}

impl RecordingOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<(Level, String)> {
        self.lines.lock().clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.at(Level::Warning)
    }

    pub fn errors(&self) -> Vec<String> {
        self.at(Level::Error)
    }

    fn at(&self, level: Level) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }

    fn push(&self, level: Level, message: &str) {
        self.lines.lock().push((level, message.to_string()));
    }
}

impl UserOutput for RecordingOutput {
    fn status(&self, message: &str) {
        self.push(Level::Status, message);
    }

    fn success(&self, message: &str) {
        self.push(Level::Success, message);
    }

    fn warning(&self, message: &str) {
        self.push(Level::Warning, message);
    }

    fn error(&self, message: &str) {
        self.push(Level::Error, message);
    }

    fn progress(&self, message: &str) {
        self.pending.lock().push_str(message);
    }

    fn finish_progress(&self, result: &str) {
        let line = std::mem::take(&mut *self.pending.lock()) + result;
        self.push(Level::Status, &line);
    }

    fn blank(&self) {
        self.push(Level::Status, "");
    }
}

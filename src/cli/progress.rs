//! Console progress for pipeline runs
//!
//! [`PhaseProgress`] prints one line per detailed phase; [`StdoutSink`]
//! echoes streamed tokens as they arrive.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use console::style;

use crate::ai::TokenSink;
use crate::pipeline::{PhaseObserver, PhaseResult};

/// Prints a line as each phase finishes detailing
pub struct PhaseProgress {
    start: Instant,
    completed: AtomicUsize,
}

impl PhaseProgress {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            completed: AtomicUsize::new(0),
        }
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    fn render(&self, result: &PhaseResult, completed: usize) -> String {
        format!(
            "[{}] Phase {}: {} ({} steps, {})",
            completed,
            result.phase.number,
            result.phase.title,
            result.phase.steps.len(),
            format_duration(self.start.elapsed().as_secs())
        )
    }
}

impl Default for PhaseProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseObserver for PhaseProgress {
    fn on_phase_complete(&self, result: &PhaseResult) {
        let completed = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        println!("  {} {}", style("✓").green(), self.render(result, completed));
    }
}

/// Streams tokens straight to stdout
pub struct StdoutSink;

impl TokenSink for StdoutSink {
    fn on_token(&self, token: &str) {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(token.as_bytes());
        let _ = stdout.flush();
    }

    fn on_completion(&self, _text: &str) {
        println!();
    }
}

/// Format duration as human-readable string
fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

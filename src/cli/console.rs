//! Live console rendering of progress events on stderr

use crate::progress::{ProgressEvent, ProgressHandler};
use crate::workflow::StepOutcome;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleMode {
    /// Print every fragment as it arrives
    Stream,
    /// One spinner line naming the running step
    Spinner,
    Silent,
}

impl ConsoleMode {
    pub fn select(stream: bool, quiet: bool, interactive: bool) -> Self {
        if stream {
            ConsoleMode::Stream
        } else if quiet || !interactive {
            ConsoleMode::Silent
        } else {
            ConsoleMode::Spinner
        }
    }
}

pub struct ConsoleHandler {
    mode: ConsoleMode,
    spinner: Mutex<Option<ProgressBar>>,
}

impl ConsoleHandler {
    pub fn new(mode: ConsoleMode) -> Self {
        Self {
            mode,
            spinner: Mutex::new(None),
        }
    }

    pub fn mode(&self) -> ConsoleMode {
        self.mode
    }

    fn spin(&self, message: String) {
        let Ok(mut guard) = self.spinner.lock() else {
            return;
        };
        let bar = guard.get_or_insert_with(|| {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed}]")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            bar.enable_steady_tick(Duration::from_millis(120));
            bar
        });
        bar.set_message(message);
    }

    fn print_above(&self, line: String) {
        let guard = self.spinner.lock().ok();
        match guard.as_ref().and_then(|g| g.as_ref()) {
            Some(bar) => bar.println(line),
            None => eprintln!("{}", line),
        }
    }

    fn finish_spinner(&self) {
        if let Ok(mut guard) = self.spinner.lock() {
            if let Some(bar) = guard.take() {
                bar.finish_and_clear();
            }
        }
    }

    fn render_stream(&self, event: &ProgressEvent) {
        let mut stderr = std::io::stderr().lock();
        let _ = match event {
            ProgressEvent::StepStarted { title, .. } => writeln!(stderr, "\n=== {} ===", title),
            ProgressEvent::StepOutput { delta, .. } | ProgressEvent::AggregateOutput { delta, .. } => {
                write!(stderr, "{}", delta)
            }
            ProgressEvent::StepCompleted { .. } => writeln!(stderr),
            ProgressEvent::AggregateStarted { .. } => writeln!(stderr, "\n=== Final report ==="),
            ProgressEvent::Completed { .. } => writeln!(stderr),
            ProgressEvent::Cancelled { aggregating, .. } => writeln!(
                stderr,
                "\nCancelled{}",
                if *aggregating { ", summarizing partial results" } else { "" }
            ),
            _ => Ok(()),
        };
        let _ = stderr.flush();
    }

    fn render_spinner(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::StepStarted { title, .. } => self.spin(format!("{}...", title)),
            ProgressEvent::StepCompleted {
                title,
                outcome,
                duration,
                ..
            } => {
                let line = match outcome {
                    StepOutcome::Completed => {
                        format!("\u{2713} {} ({:.1}s)", title, duration.as_secs_f64())
                    }
                    StepOutcome::TransportFailure { error } => format!("\u{2717} {}: {}", title, error),
                    StepOutcome::Cancelled => format!("\u{2717} {} (cancelled)", title),
                };
                self.print_above(line);
            }
            ProgressEvent::RequirementsResolved { required, .. } => {
                let names: Vec<&str> = required.iter().map(|id| id.as_str()).collect();
                let line = if names.is_empty() {
                    "No expert steps required".to_string()
                } else {
                    format!("Required: {}", names.join(", "))
                };
                self.print_above(line);
            }
            ProgressEvent::AggregateStarted { .. } => self.spin("Writing final report...".to_string()),
            ProgressEvent::Completed { .. } | ProgressEvent::Cancelled { aggregating: false, .. } => {
                self.finish_spinner()
            }
            _ => {}
        }
    }
}

impl ProgressHandler for ConsoleHandler {
    fn on_progress(&self, event: &ProgressEvent) {
        match self.mode {
            ConsoleMode::Stream => self.render_stream(event),
            ConsoleMode::Spinner => self.render_spinner(event),
            ConsoleMode::Silent => {}
        }
    }
}

impl Drop for ConsoleHandler {
    fn drop(&mut self) {
        self.finish_spinner();
    }
}

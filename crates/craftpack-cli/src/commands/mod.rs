pub mod clean;
pub mod completions;
pub mod man_pages;
pub mod pack;
pub mod plan;

use craftpack_core::{CoreError, ErrorKind, Level, Reporter};
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt;
use std::num::NonZeroUsize;
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;
pub const EXIT_MISSING_INPUT: u8 = 3;

/// A failed command: the message printed to stderr and the process exit code.
#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        CliError {
            code: exit_code(err.kind()),
            message: err.to_string(),
        }
    }
}

impl From<String> for CliError {
    fn from(message: String) -> Self {
        CliError {
            code: EXIT_FAILURE,
            message,
        }
    }
}

pub fn exit_code(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::Configuration => EXIT_CONFIG_ERROR,
        ErrorKind::MissingInput => EXIT_MISSING_INPUT,
        ErrorKind::StepExecution | ErrorKind::Io | ErrorKind::Cancelled => EXIT_FAILURE,
    }
}

/// `0` means one job per available CPU.
pub fn resolve_jobs(jobs: usize) -> usize {
    if jobs > 0 {
        return jobs;
    }
    std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

fn template(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_spinner())
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        template("{spinner:.cyan} {msg}")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(template("{msg}"));
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(template("{msg}"));
    pb.finish_with_message(format!("✗ {msg}"));
}

/// Forwards engine progress to `tracing` and, when attached, to a spinner.
///
/// Info messages replace the spinner text; warnings and errors are printed
/// above it so they stay visible once the spinner finishes.
pub struct CliReporter {
    progress: Option<ProgressBar>,
}

impl CliReporter {
    pub fn new(progress: Option<ProgressBar>) -> Self {
        CliReporter { progress }
    }
}

impl Reporter for CliReporter {
    fn report(&self, level: Level, message: &str) {
        use console::Style;
        match level {
            Level::Debug => tracing::debug!("{message}"),
            Level::Info => {
                tracing::info!("{message}");
                if let Some(pb) = &self.progress {
                    pb.set_message(message.to_owned());
                }
            }
            Level::Warn | Level::Error => {
                if level == Level::Warn {
                    tracing::warn!("{message}");
                } else {
                    tracing::error!("{message}");
                }
                if let Some(pb) = &self.progress {
                    let style = if level == Level::Warn {
                        Style::new().yellow()
                    } else {
                        Style::new().red()
                    };
                    pb.println(format!("{} {message}", style.apply_to(level)));
                }
            }
        }
    }
}

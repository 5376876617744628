//! Part lifecycle engine for craftpack.
//!
//! This crate ties the schema, store and plugin crates together: it prepares
//! the `BuildPlan`, runs every part through pull, build, stage and prime with
//! fingerprint-based step skipping (`Executor`), assembles the primed tree into
//! an archive, and exposes the `Packer` entry point used by the CLI. It also
//! provides work-directory locking, cancellation, reporting and the shell
//! hooks used for debugging.

pub mod assemble;
pub mod concurrency;
pub mod engine;
pub mod executor;
pub mod lifecycle;
pub mod measure;
pub mod plan;
pub mod report;
pub mod shell;

pub use assemble::{assemble, check_mandatory_files, Manifest, MANIFEST_FILE};
pub use concurrency::{install_signal_handler, CancelFlag, WorkLock};
pub use engine::{PackOptions, PackResult, Packer, DEFAULT_WORK_DIR};
pub use executor::{ExecutionReport, Executor, ExecutorOptions, StepRecord};
pub use lifecycle::{validate_transition, Step};
pub use measure::{MeasureId, Measurement, Measurements};
pub use plan::prepare_plan;
pub use report::{CapturingReporter, Level, Reporter, TracingReporter};
pub use shell::{RecordingShell, ShellLauncher, SystemShell};

use craftpack_plugins::PluginError;
use craftpack_schema::SchemaError;
use craftpack_store::StoreError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of a [`CoreError`], used for exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The project or its parts are declared incorrectly.
    Configuration,
    /// A required file or directory does not exist.
    MissingInput,
    /// A plugin step failed.
    StepExecution,
    Io,
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::MissingInput => "missing-input",
            ErrorKind::StepExecution => "step-execution",
            ErrorKind::Io => "io",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Plugin(#[from] PluginError),
    #[error("Parts processing error: {source}")]
    StepFailed {
        part: String,
        step: Step,
        #[source]
        source: PluginError,
    },
    #[error("Parts processing error: failed to {step} part '{part}': {source}")]
    StepIo {
        part: String,
        step: Step,
        #[source]
        source: StoreError,
    },
    #[error("Parts processing error: Failed to copy '{}': no such file or directory.", .0.display())]
    MissingPrimeFile(PathBuf),
    #[error("Missing mandatory file: '{}'.", .0.display())]
    MissingMandatoryFile(PathBuf),
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("Work directory '{}' is in use by another craftpack process.", .0.display())]
    WorkDirLocked(PathBuf),
    #[error("Interrupted; completed steps were recorded and will be reused.")]
    Cancelled,
    #[error("failed to launch shell: {0}")]
    Shell(String),
    #[error("failed to write manifest: {0}")]
    Manifest(#[from] serde_yaml::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Schema(e) => match e {
                SchemaError::ProjectFileNotFound(_) | SchemaError::InvalidBundleFile(_) => {
                    ErrorKind::MissingInput
                }
                SchemaError::Io(_) => ErrorKind::Io,
                _ => ErrorKind::Configuration,
            },
            CoreError::Plugin(e) => match e {
                PluginError::SourceNotFound { .. } => ErrorKind::MissingInput,
                PluginError::Io(_) | PluginError::Store(_) => ErrorKind::Io,
                PluginError::BuildFailed { .. } => ErrorKind::StepExecution,
                PluginError::UnknownPlugin { .. } | PluginError::InvalidOption { .. } => {
                    ErrorKind::Configuration
                }
            },
            CoreError::StepFailed { source, .. } => match source {
                PluginError::SourceNotFound { .. } => ErrorKind::MissingInput,
                _ => ErrorKind::StepExecution,
            },
            CoreError::InvalidTransition { .. } => ErrorKind::StepExecution,
            CoreError::MissingPrimeFile(_) | CoreError::MissingMandatoryFile(_) => {
                ErrorKind::MissingInput
            }
            CoreError::Cancelled => ErrorKind::Cancelled,
            CoreError::Store(_)
            | CoreError::StepIo { .. }
            | CoreError::WorkDirLocked(_)
            | CoreError::Shell(_)
            | CoreError::Manifest(_)
            | CoreError::Io(_) => ErrorKind::Io,
        }
    }

    /// Part the error is attributed to, when it came from a lifecycle step.
    pub fn part(&self) -> Option<&str> {
        match self {
            CoreError::StepFailed { part, .. } | CoreError::StepIo { part, .. } => Some(part),
            _ => None,
        }
    }
}

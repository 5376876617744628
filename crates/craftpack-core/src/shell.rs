use crate::CoreError;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;
use tracing::debug;

/// Opens an interactive shell for inspecting a work directory.
pub trait ShellLauncher: Send + Sync {
    fn launch(&self, cwd: &Path) -> Result<(), CoreError>;
}

/// Runs `$SHELL` (or `/bin/sh`) in the foreground and waits for it to exit.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemShell;

impl ShellLauncher for SystemShell {
    fn launch(&self, cwd: &Path) -> Result<(), CoreError> {
        let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_owned());
        debug!("launching {shell} in {}", cwd.display());
        let status = Command::new(&shell)
            .current_dir(cwd)
            .status()
            .map_err(|e| CoreError::Shell(format!("{shell}: {e}")))?;
        if !status.success() {
            debug!("shell exited with {status}");
        }
        Ok(())
    }
}

/// Records launch requests instead of running a shell.
#[derive(Debug, Default)]
pub struct RecordingShell {
    calls: Mutex<Vec<PathBuf>>,
}

impl RecordingShell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<PathBuf> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl ShellLauncher for RecordingShell {
    fn launch(&self, cwd: &Path) -> Result<(), CoreError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(cwd.to_path_buf());
        }
        Ok(())
    }
}

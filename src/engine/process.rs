//! Running the engine's client utilities

use std::path::PathBuf;
use std::process::Command;

use tracing::debug;

use crate::error::{VaultError, VaultResult};

/// Captured output of a finished utility
pub(crate) struct ToolOutput {
    pub success: bool,
    /// Exit code; `None` if the child was killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Locates and runs one utility (`pg_ctl`, `psql`, ...)
pub(crate) struct Tool {
    program: PathBuf,
    password: Option<(String, String)>,
}

impl Tool {
    pub fn new(bin_dir: Option<&PathBuf>, name: &str) -> Self {
        let program = match bin_dir {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        };
        Self {
            program,
            password: None,
        }
    }

    /// Pass a password to the child through `PGPASSWORD`. Our own
    /// environment is left alone.
    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.password = password.map(|p| ("PGPASSWORD".to_string(), p));
        self
    }

    /// Run the utility and return its output whatever the exit status
    pub fn output(&self, args: &[&str]) -> VaultResult<ToolOutput> {
        debug!(program = %self.program.display(), ?args, "running engine utility");

        let mut command = Command::new(&self.program);
        command.args(args);
        if let Some((key, value)) = &self.password {
            command.env(key, value);
        }

        let output = command.output().map_err(|e| {
            VaultError::Engine(format!(
                "Failed to run {}: {}",
                self.program.display(),
                e
            ))
        })?;

        Ok(ToolOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    /// Run the utility, failing unless it exits successfully
    pub fn run(&self, args: &[&str]) -> VaultResult<String> {
        let output = self.output(args)?;
        if !output.success {
            return Err(VaultError::Engine(format!(
                "{} failed: {}",
                self.name(),
                output.stderr.trim()
            )));
        }
        Ok(output.stdout)
    }

    fn name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.display().to_string())
    }
}

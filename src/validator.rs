// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

//! validator.rs
//!
//! Runs the external keepalived syntax checker against a generated configuration file.

use std::path::{Path, PathBuf};

use {log::debug, tokio::process::Command};

/// The result of checking one file.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub ok: bool,
    /// Combined stdout and stderr of the checker. Empty when the file passed.
    pub diagnostics: String,
}

impl Verdict {
    fn failed(diagnostics: String) -> Self {
        Verdict {
            ok: false,
            diagnostics,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Validator {
    program: PathBuf,
}

impl Validator {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Validator {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Whether the checker exists and is a regular file.
    pub fn is_available(&self) -> bool {
        self.program.is_file()
    }

    /// Check the file at `path`.
    ///
    /// The checker is run with the absolute path of the file as its only argument, from the
    /// directory it is installed in. An exit status of zero means the file is valid. A checker
    /// that cannot be run at all produces a failed verdict rather than an error.
    pub async fn validate(&self, path: &Path) -> Verdict {
        let path = match std::path::absolute(path) {
            Ok(p) => p,
            Err(e) => {
                return Verdict::failed(format!(
                    "Could not resolve path '{}': {e}",
                    path.display()
                ))
            }
        };

        let program = std::path::absolute(&self.program).unwrap_or(self.program.clone());
        let mut command = Command::new(&program);
        command.arg(&path);
        if let Some(dir) = program.parent() {
            command.current_dir(dir);
        }

        let output = match command.output().await {
            Ok(output) => output,
            Err(e) => {
                return Verdict::failed(format!(
                    "Could not run validator {}: {e}",
                    self.program.display()
                ))
            }
        };

        debug!(
            "validator {} on '{}' exited with {}",
            self.program.display(),
            path.display(),
            output.status
        );

        if output.status.success() {
            return Verdict {
                ok: true,
                diagnostics: String::new(),
            };
        }

        let mut diagnostics = String::from_utf8_lossy(&output.stdout).into_owned();
        diagnostics.push_str(&String::from_utf8_lossy(&output.stderr));
        if diagnostics.is_empty() {
            diagnostics = match output.status.code() {
                Some(code) => format!("validator exited with status {code}"),
                None => "validator was terminated by a signal".to_string(),
            };
        }
        Verdict::failed(diagnostics)
    }
}

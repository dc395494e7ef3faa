//! Subprocess collaborators.
//!
//! A `CommandOracle` runs an external program once per call and speaks JSON
//! over stdin/stdout, so any generator, reviewer, spec writer or downstream
//! stage can be plugged in without linking it.
//!
//! # Protocol
//! - generator:   `{"context": str}` → `{"files": {path: content}}`
//! - reviewer:    `{"files": {...}}` → `{"score": n, "issues": [str], "recommendations": [str], "needs_iteration": bool?}`
//! - spec writer: `{"input": str}` → any JSON value
//! - stage:       `{"specification": v, "files": {...}}` → `{"files": {...}}`
//!
//! A non-zero exit status is a failure. Stderr is captured and included in
//! the error.

use crate::artifact::ArtifactSet;
use crate::error::{RefineError, Result};
use crate::oracle::{Generator, Review, Reviewer, SpecWriter, Stage};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

#[derive(Debug, Deserialize)]
struct FilesResponse {
    files: ArtifactSet,
}

#[derive(Debug, Clone)]
pub struct CommandOracle {
    name: String,
    program: PathBuf,
    args: Vec<String>,
    root: PathBuf,
}

impl CommandOracle {
    /// Parse a whitespace-separated command line. The program is resolved on
    /// `PATH` unless it contains a path separator. Runs with `root` as the
    /// working directory and `REFINE_ROOT` set.
    pub fn parse(command: &str, root: &Path) -> Result<Self> {
        let mut parts = command.split_whitespace();
        let Some(program) = parts.next() else {
            return Err(RefineError::InvalidValue {
                kind: "command",
                value: command.to_string(),
            });
        };
        let resolved = if program.contains('/') || program.contains('\\') {
            let path = PathBuf::from(program);
            let path = if path.is_absolute() { path } else { root.join(path) };
            if !path.is_file() {
                return Err(RefineError::CommandNotFound(program.to_string()));
            }
            path
        } else {
            which::which(program).map_err(|_| RefineError::CommandNotFound(program.to_string()))?
        };
        Ok(Self {
            name: program.to_string(),
            program: resolved,
            args: parts.map(str::to_string).collect(),
            root: root.to_path_buf(),
        })
    }

    /// Rename the oracle; stages report under this name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn call<T: DeserializeOwned>(&self, request: &serde_json::Value) -> Result<T> {
        let payload = serde_json::to_vec(request)?;
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .current_dir(&self.root)
            .env("REFINE_ROOT", &self.root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RefineError::CommandFailed(format!("{}: {e}", self.name)))?;

        if let Some(mut stdin) = child.stdin.take() {
            // A program that exits without reading its input is not an error
            // by itself; its exit status decides.
            if let Err(e) = stdin.write_all(&payload) {
                tracing::debug!(command = %self.name, error = %e, "stdin closed early");
            }
        }

        let output = child
            .wait_with_output()
            .map_err(|e| RefineError::CommandFailed(format!("{}: {e}", self.name)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let hint: String = stderr.trim().chars().take(500).collect();
            return Err(RefineError::CommandFailed(format!(
                "{} exited with {}: {hint}",
                self.name, output.status
            )));
        }
        serde_json::from_slice(&output.stdout).map_err(|e| {
            RefineError::CommandFailed(format!("{} produced invalid JSON: {e}", self.name))
        })
    }
}

impl Generator for CommandOracle {
    fn generate(&mut self, context: &str) -> anyhow::Result<ArtifactSet> {
        let response: FilesResponse = self.call(&serde_json::json!({ "context": context }))?;
        Ok(response.files)
    }
}

impl Reviewer for CommandOracle {
    fn review(&mut self, artifacts: &ArtifactSet) -> anyhow::Result<Review> {
        let review: Review = self.call(&serde_json::json!({ "files": artifacts }))?;
        Ok(review)
    }
}

impl SpecWriter for CommandOracle {
    fn write_spec(&mut self, input: &str) -> anyhow::Result<serde_json::Value> {
        Ok(self.call(&serde_json::json!({ "input": input }))?)
    }
}

impl Stage for CommandOracle {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(
        &mut self,
        specification: &serde_json::Value,
        artifacts: &ArtifactSet,
    ) -> anyhow::Result<ArtifactSet> {
        let response: FilesResponse = self.call(&serde_json::json!({
            "specification": specification,
            "files": artifacts,
        }))?;
        Ok(response.files)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Project lifecycle: specification → iterative generation → downstream
//! stages → packaging.
//!
//! Only the generation phase loops. The specification writer and every
//! downstream stage are called once; their failures are recorded and the
//! pipeline carries on with what it has.

use crate::artifact::ArtifactSet;
use crate::config::Config;
use crate::controller::{CancelToken, IterationController, IterationOutcome, Termination};
use crate::error::Result;
use crate::memory::MemoryStore;
use crate::oracle::{Generator, Reviewer, SpecWriter, Stage};
use crate::project::{generate_id, Project};
use crate::types::ProjectStatus;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Completed,
    Failed,
    /// Not run: cancelled, or nothing was generated to build on.
    Skipped,
}

impl StageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StageStatus::Completed => "completed",
            StageStatus::Failed => "failed",
            StageStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub name: String,
    pub status: StageStatus,
    /// Files the stage added to the package.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    /// Files the stage produced that collided with generated ones.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dropped: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub project: Project,
    pub specification: serde_json::Value,
    pub spec_fallback: bool,
    pub outcome: IterationOutcome,
    pub stages: Vec<StageRecord>,
    /// The packaged result: generated files plus stage contributions, or the
    /// degenerate set when nothing was generated.
    pub artifacts: ArtifactSet,
}

impl PipelineReport {
    pub fn status(&self) -> ProjectStatus {
        self.project.status
    }

    /// Write the packaged artifact set beneath `dir`.
    pub fn write_to(&self, dir: &Path) -> Result<()> {
        self.artifacts.write_to(dir)
    }
}

/// The external collaborators for one run.
pub struct Collaborators<'a> {
    pub spec_writer: Option<&'a mut dyn SpecWriter>,
    pub generator: &'a mut dyn Generator,
    pub reviewer: &'a mut dyn Reviewer,
    pub stages: Vec<Box<dyn Stage + 'a>>,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator<'a> {
    root: &'a Path,
    config: &'a Config,
    cancel: CancelToken,
}

impl<'a> Orchestrator<'a> {
    pub fn new(root: &'a Path, config: &'a Config) -> Self {
        Self {
            root,
            config,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Create a new project, or pick up a pending one with the same id.
    fn open_project(&self, project_id: Option<&str>, input: &str) -> Result<Project> {
        let max = self.config.iteration.max_iterations;
        let Some(id) = project_id else {
            return Project::create(self.root, generate_id(), input, max);
        };
        if !Project::exists(self.root, id) {
            return Project::create(self.root, id, input, max);
        }
        let project = Project::load(self.root, id)?;
        if project.status.is_terminal() {
            return Err(crate::RefineError::ProjectExists(id.to_string()));
        }
        if project.input != input {
            tracing::warn!(project = %id, "resuming with the stored project input");
        }
        tracing::info!(project = %id, "resuming pending project");
        Ok(project)
    }

    fn specification(
        &self,
        store: &mut MemoryStore,
        spec_writer: Option<&mut dyn SpecWriter>,
        input: &str,
    ) -> Result<(serde_json::Value, bool)> {
        if let Some(existing) = store.specification() {
            let fallback = existing.get("fallback").and_then(|v| v.as_bool()) == Some(true);
            return Ok((existing.clone(), fallback));
        }
        let (spec, fallback) = match spec_writer {
            None => (serde_json::json!({ "input": input }), false),
            Some(writer) => match writer.write_spec(input) {
                Ok(spec) => (spec, false),
                Err(e) => {
                    tracing::warn!(project = %store.project_id(), error = %format!("{e:#}"), "spec writer failed, using fallback specification");
                    (serde_json::json!({ "input": input, "fallback": true }), true)
                }
            },
        };
        store.set_specification(spec.clone())?;
        Ok((spec, fallback))
    }

    pub fn run(
        &self,
        project_id: Option<&str>,
        input: &str,
        collaborators: Collaborators<'_>,
    ) -> Result<PipelineReport> {
        let Collaborators {
            spec_writer,
            generator,
            reviewer,
            mut stages,
        } = collaborators;

        let mut project = self.open_project(project_id, input)?;
        let mut store = MemoryStore::open(
            self.root,
            &project.id,
            project.max_iterations,
            &self.config.memory,
        )?;
        let (specification, spec_fallback) =
            self.specification(&mut store, spec_writer, &project.input)?;

        let outcome = if store.can_continue() {
            IterationController::new(&mut store, self.config)
                .with_cancel(self.cancel.clone())
                .run(generator, reviewer)?
        } else {
            tracing::warn!(
                project = %project.id,
                iterations = store.current_iteration(),
                "iteration budget already spent, finalizing from stored history"
            );
            IterationOutcome::from_store(&store)
        };

        let final_score = outcome.final_record().map(|r| r.score);
        let (status, artifacts, stage_records) = match (&outcome.termination, &outcome.artifacts) {
            (Termination::Cancelled, _) => {
                let skipped = stages.iter().map(|s| skipped(s.name())).collect();
                (
                    ProjectStatus::Pending,
                    outcome.artifacts.clone().unwrap_or_default(),
                    skipped,
                )
            }
            (_, None) => {
                tracing::warn!(project = %project.id, "no artifacts were generated, packaging fallback");
                let skipped = stages.iter().map(|s| skipped(s.name())).collect();
                (
                    ProjectStatus::Failed,
                    degenerate_artifacts(&project.input, &outcome),
                    skipped,
                )
            }
            (termination, Some(generated)) => {
                let status = if *termination == Termination::Accepted {
                    ProjectStatus::Accepted
                } else {
                    ProjectStatus::Exhausted
                };
                let (package, records) =
                    self.run_stages(&project.id, &specification, generated, &mut stages);
                (status, package, records)
            }
        };

        project.finish(status, outcome.iterations, final_score);
        project.save(self.root)?;
        tracing::info!(project = %project.id, status = %status, iterations = outcome.iterations, "pipeline finished");

        Ok(PipelineReport {
            project,
            specification,
            spec_fallback,
            outcome,
            stages: stage_records,
            artifacts,
        })
    }

    /// Run every stage once, in order, merging contributions into the
    /// package. Generated files always win over stage output.
    fn run_stages(
        &self,
        project_id: &str,
        specification: &serde_json::Value,
        generated: &ArtifactSet,
        stages: &mut [Box<dyn Stage + '_>],
    ) -> (ArtifactSet, Vec<StageRecord>) {
        let mut package = generated.clone();
        let mut records = Vec::with_capacity(stages.len());
        for stage in stages.iter_mut() {
            if self.cancel.is_cancelled() {
                records.push(skipped(stage.name()));
                continue;
            }
            let result = stage
                .run(specification, &package)
                .and_then(|out| out.validate().map(|_| out).map_err(anyhow::Error::from));
            match result {
                Ok(out) => {
                    let mut files = Vec::new();
                    let mut dropped = Vec::new();
                    for (path, content) in out.iter() {
                        if package.insert_if_absent(path, content) {
                            files.push(path.to_string());
                        } else {
                            dropped.push(path.to_string());
                        }
                    }
                    if !dropped.is_empty() {
                        tracing::debug!(project = %project_id, stage = %stage.name(), dropped = dropped.len(), "stage output collided with existing files");
                    }
                    records.push(StageRecord {
                        name: stage.name().to_string(),
                        status: StageStatus::Completed,
                        files,
                        dropped,
                        error: None,
                    });
                }
                Err(e) => {
                    tracing::warn!(project = %project_id, stage = %stage.name(), error = %format!("{e:#}"), "stage failed");
                    records.push(StageRecord {
                        name: stage.name().to_string(),
                        status: StageStatus::Failed,
                        files: Vec::new(),
                        dropped: Vec::new(),
                        error: Some(format!("{e:#}")),
                    });
                }
            }
        }
        (package, records)
    }
}

fn skipped(name: &str) -> StageRecord {
    StageRecord {
        name: name.to_string(),
        status: StageStatus::Skipped,
        files: Vec::new(),
        dropped: Vec::new(),
        error: None,
    }
}

/// A single README describing the request and why nothing was produced.
fn degenerate_artifacts(input: &str, outcome: &IterationOutcome) -> ArtifactSet {
    let mut readme = format!(
        "# Generated Project\n\nNo source files could be generated for this request.\n\n## Request\n\n{input}\n"
    );
    let failures: Vec<&str> = outcome
        .history
        .iter()
        .flat_map(|r| r.recommendations.iter().map(String::as_str))
        .collect();
    if !failures.is_empty() {
        readme.push_str("\n## Attempts\n\n");
        for (n, failure) in failures.iter().enumerate() {
            readme.push_str(&format!("{}. {failure}\n", n + 1));
        }
    }
    let mut set = ArtifactSet::new();
    set.insert("README.md", readme);
    set
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

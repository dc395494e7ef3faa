use crate::error::{RefineError, Result};
use crate::paths;
use crate::types::ProjectStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// Project
// ---------------------------------------------------------------------------

/// One request's lifecycle record. Created at request start, updated by the
/// orchestrator when the run ends, never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub input: String,
    pub status: ProjectStatus,
    pub max_iterations: u32,
    #[serde(default)]
    pub iterations: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_score: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `project-<YYYYMMDD-HHMMSS>-<8 hex>`.
pub fn generate_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "project-{}-{}",
        Utc::now().format("%Y%m%d-%H%M%S"),
        &suffix[..8]
    )
}

impl Project {
    pub fn new(id: impl Into<String>, input: impl Into<String>, max_iterations: u32) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            input: input.into(),
            status: ProjectStatus::Pending,
            max_iterations,
            iterations: 0,
            final_score: None,
            created_at: now,
            updated_at: now,
        }
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    pub fn create(
        root: &Path,
        id: impl Into<String>,
        input: impl Into<String>,
        max_iterations: u32,
    ) -> Result<Self> {
        let id = id.into();
        paths::validate_project_id(&id)?;
        if paths::project_manifest(root, &id).exists() {
            return Err(RefineError::ProjectExists(id));
        }
        let project = Self::new(id, input, max_iterations);
        project.save(root)?;
        Ok(project)
    }

    pub fn load(root: &Path, id: &str) -> Result<Self> {
        paths::validate_project_id(id)?;
        let manifest = paths::project_manifest(root, id);
        if !manifest.exists() {
            return Err(RefineError::ProjectNotFound(id.to_string()));
        }
        let data = std::fs::read_to_string(&manifest)?;
        Ok(serde_yaml::from_str(&data)?)
    }

    pub fn exists(root: &Path, id: &str) -> bool {
        paths::project_manifest(root, id).exists()
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let manifest = paths::project_manifest(root, &self.id);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&manifest, data.as_bytes())
    }

    /// All projects, oldest first.
    pub fn list(root: &Path) -> Result<Vec<Self>> {
        let dir = paths::projects_dir(root);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut projects = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let id = entry.file_name().to_string_lossy().into_owned();
            match Self::load(root, &id) {
                Ok(p) => projects.push(p),
                Err(RefineError::ProjectNotFound(_) | RefineError::InvalidProjectId(_)) => {}
                Err(e) => return Err(e),
            }
        }
        projects.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(projects)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Record how a run ended.
    pub fn finish(&mut self, status: ProjectStatus, iterations: u32, final_score: Option<u32>) {
        self.status = status;
        self.iterations = iterations;
        self.final_score = final_score;
        self.updated_at = Utc::now();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn generated_ids_are_valid_and_distinct() {
        let a = generate_id();
        let b = generate_id();
        assert_ne!(a, b);
        paths::validate_project_id(&a).unwrap();
        assert!(a.starts_with("project-"));
        assert_eq!(a.len(), "project-20260101-120000-abcdef12".len());
    }

    #[test]
    fn create_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let p = Project::create(dir.path(), "todo-app", "Build a todo app", 3).unwrap();
        assert_eq!(p.status, ProjectStatus::Pending);
        let loaded = Project::load(dir.path(), "todo-app").unwrap();
        assert_eq!(loaded, p);
    }

    #[test]
    fn create_refuses_duplicates_and_bad_ids() {
        let dir = TempDir::new().unwrap();
        Project::create(dir.path(), "dup", "x", 3).unwrap();
        assert!(matches!(
            Project::create(dir.path(), "dup", "x", 3),
            Err(RefineError::ProjectExists(_))
        ));
        assert!(matches!(
            Project::create(dir.path(), "Bad Id", "x", 3),
            Err(RefineError::InvalidProjectId(_))
        ));
    }

    #[test]
    fn load_missing() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Project::load(dir.path(), "nope"),
            Err(RefineError::ProjectNotFound(_))
        ));
    }

    #[test]
    fn list_skips_stray_directories() {
        let dir = TempDir::new().unwrap();
        assert!(Project::list(dir.path()).unwrap().is_empty());
        Project::create(dir.path(), "one", "first", 3).unwrap();
        Project::create(dir.path(), "two", "second", 3).unwrap();
        std::fs::create_dir_all(paths::projects_dir(dir.path()).join("empty")).unwrap();
        std::fs::create_dir_all(paths::projects_dir(dir.path()).join("Not A Slug")).unwrap();
        let ids: Vec<String> = Project::list(dir.path())
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"one".to_string()));
        assert!(ids.contains(&"two".to_string()));
    }

    #[test]
    fn finish_updates_status() {
        let dir = TempDir::new().unwrap();
        let mut p = Project::create(dir.path(), "done", "x", 3).unwrap();
        p.finish(ProjectStatus::Exhausted, 3, Some(70));
        p.save(dir.path()).unwrap();
        let loaded = Project::load(dir.path(), "done").unwrap();
        assert_eq!(loaded.status, ProjectStatus::Exhausted);
        assert_eq!(loaded.iterations, 3);
        assert_eq!(loaded.final_score, Some(70));
        assert!(loaded.status.is_terminal());
    }
}

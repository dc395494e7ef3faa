use crate::error::{RefineError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const REFINE_DIR: &str = ".refine";
pub const PROJECTS_DIR: &str = ".refine/projects";

pub const CONFIG_FILE: &str = ".refine/config.yaml";
pub const PROJECT_FILE: &str = "project.yaml";
pub const MEMORY_FILE: &str = "memory.yaml";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn refine_dir(root: &Path) -> PathBuf {
    root.join(REFINE_DIR)
}

pub fn projects_dir(root: &Path) -> PathBuf {
    root.join(PROJECTS_DIR)
}

pub fn project_dir(root: &Path, id: &str) -> PathBuf {
    projects_dir(root).join(id)
}

pub fn project_manifest(root: &Path, id: &str) -> PathBuf {
    project_dir(root, id).join(PROJECT_FILE)
}

pub fn memory_path(root: &Path, id: &str) -> PathBuf {
    project_dir(root, id).join(MEMORY_FILE)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

// ---------------------------------------------------------------------------
// Project id validation
// ---------------------------------------------------------------------------

static PROJECT_ID_RE: OnceLock<Regex> = OnceLock::new();

fn project_id_re() -> &'static Regex {
    PROJECT_ID_RE.get_or_init(|| {
        Regex::new(r"^[a-z0-9][a-z0-9\-_]*[a-z0-9]$|^[a-z0-9]$").unwrap()
    })
}

/// Project ids double as directory names, so they are restricted to a
/// filesystem-safe slug alphabet.
pub fn validate_project_id(id: &str) -> Result<()> {
    if id.is_empty() || id.len() > 96 || !project_id_re().is_match(id) {
        return Err(RefineError::InvalidProjectId(id.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_ids() {
        for id in ["demo", "a", "project-20260101-120000-ab12cd34", "todo_app"] {
            validate_project_id(id).unwrap_or_else(|_| panic!("expected valid: {id}"));
        }
    }

    #[test]
    fn invalid_ids() {
        for id in ["", "-dash", "trailing-", "Upper", "has space", "../escape", "a/b"] {
            assert!(validate_project_id(id).is_err(), "expected invalid: {id}");
        }
    }

    #[test]
    fn layout() {
        let root = Path::new("/work");
        assert_eq!(
            memory_path(root, "demo"),
            PathBuf::from("/work/.refine/projects/demo/memory.yaml")
        );
        assert_eq!(
            project_manifest(root, "demo"),
            PathBuf::from("/work/.refine/projects/demo/project.yaml")
        );
        assert_eq!(config_path(root), PathBuf::from("/work/.refine/config.yaml"));
    }
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RefineError {
    #[error("not initialized: run 'refine init'")]
    NotInitialized,

    #[error("project not found: {0}")]
    ProjectNotFound(String),

    #[error("project already exists: {0}")]
    ProjectExists(String),

    #[error("invalid project id '{0}': must be lowercase alphanumeric with hyphens or underscores")]
    InvalidProjectId(String),

    #[error("invalid artifact path '{path}': {reason}")]
    InvalidArtifactPath { path: String, reason: String },

    #[error("invalid {kind}: {value}")]
    InvalidValue { kind: &'static str, value: String },

    #[error("generation failed: {0}")]
    Generation(String),

    #[error("review failed: {0}")]
    Review(String),

    #[error("failed to persist memory for project '{project}': {reason}")]
    Persistence { project: String, reason: String },

    #[error("iteration limit reached: {current} of {max} iterations already used")]
    IterationLimit { current: u32, max: u32 },

    #[error("iteration record {attempted} out of order: last recorded iteration is {last}")]
    IterationOutOfOrder { attempted: u32, last: u32 },

    #[error("command not found: {0}")]
    CommandNotFound(String),

    #[error("command failed: {0}")]
    CommandFailed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RefineError>;

use crate::error::{RefineError, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// IterationConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Query hint handed to the memory store when building generation context.
    #[serde(default)]
    pub context_query: String,
}

fn default_max_iterations() -> u32 {
    3
}

impl Default for IterationConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            context_query: String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_window")]
    pub feedback_window: usize,
    #[serde(default = "default_window")]
    pub instruction_window: usize,
    #[serde(default = "default_snippet_limit")]
    pub snippet_limit: usize,
    #[serde(default = "default_recency_window")]
    pub recency_window_secs: u64,
    #[serde(default = "default_max_snippet_chars")]
    pub max_snippet_chars: usize,
}

fn default_window() -> usize {
    3
}

fn default_snippet_limit() -> usize {
    10
}

fn default_recency_window() -> u64 {
    3600
}

fn default_max_snippet_chars() -> usize {
    4000
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            feedback_window: default_window(),
            instruction_window: default_window(),
            snippet_limit: default_snippet_limit(),
            recency_window_secs: default_recency_window(),
            max_snippet_chars: default_max_snippet_chars(),
        }
    }
}

// ---------------------------------------------------------------------------
// AnalyzerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    #[serde(default = "default_context_lines")]
    pub context_lines: usize,
    #[serde(default = "default_lookahead")]
    pub lookahead: usize,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

fn default_context_lines() -> usize {
    3
}

fn default_lookahead() -> usize {
    4
}

fn default_extensions() -> Vec<String> {
    [
        "py", "js", "jsx", "ts", "tsx", "java", "cpp", "c", "h", "cs", "php", "rb", "go", "rs",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            context_lines: default_context_lines(),
            lookahead: default_lookahead(),
            extensions: default_extensions(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

/// Run configuration. Loaded once and passed by reference into the
/// orchestrator and controller; nothing reads it from ambient state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub iteration: IterationConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            iteration: IterationConfig::default(),
            memory: MemoryConfig::default(),
            analyzer: AnalyzerConfig::default(),
        }
    }
}

impl Config {
    /// Load `.refine/config.yaml`. A root without a config file gets the
    /// defaults; a root without `.refine/` at all is not initialized.
    pub fn load(root: &Path) -> Result<Self> {
        if !paths::refine_dir(root).is_dir() {
            return Err(RefineError::NotInitialized);
        }
        let path = paths::config_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(&data)?)
    }

    /// Like [`Config::load`] but falls back to defaults for an uninitialized root.
    pub fn load_or_default(root: &Path) -> Result<Self> {
        match Self::load(root) {
            Err(RefineError::NotInitialized) => Ok(Self::default()),
            other => other,
        }
    }

    /// Write this config unless the root already has one. Returns true if
    /// written.
    pub fn save_if_missing(&self, root: &Path) -> Result<bool> {
        let data = serde_yaml::to_string(self)?;
        crate::io::write_if_missing(&paths::config_path(root), data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.iteration.max_iterations == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "iteration.max_iterations is 0: no generation attempt can run".to_string(),
            });
        } else if self.iteration.max_iterations > 10 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "iteration.max_iterations={} (>10 is unusual)",
                    self.iteration.max_iterations
                ),
            });
        }

        if self.memory.snippet_limit == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "memory.snippet_limit is 0: no prior code reaches the generator"
                    .to_string(),
            });
        }

        if self.analyzer.lookahead == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "analyzer.lookahead is 0: structural checks are disabled".to_string(),
            });
        }

        if self.analyzer.extensions.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "analyzer.extensions is empty: no file will be analyzed".to_string(),
            });
        }

        warnings
    }

    pub fn has_errors(&self) -> bool {
        self.validate().iter().any(|w| w.level == WarnLevel::Error)
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
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, cfg);
        assert_eq!(parsed.iteration.max_iterations, 3);
        assert_eq!(parsed.memory.snippet_limit, 10);
        assert_eq!(parsed.analyzer.lookahead, 4);
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let yaml = "iteration:\n  max_iterations: 5\n";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.iteration.max_iterations, 5);
        assert_eq!(cfg.memory.feedback_window, 3);
        assert_eq!(cfg.analyzer.context_lines, 3);
        assert!(cfg.analyzer.extensions.contains(&"py".to_string()));
    }

    #[test]
    fn load_requires_init() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Config::load(dir.path()),
            Err(RefineError::NotInitialized)
        ));
        assert_eq!(Config::load_or_default(dir.path()).unwrap(), Config::default());
    }

    #[test]
    fn save_and_load() {
        let dir = TempDir::new().unwrap();
        let mut cfg = Config::default();
        cfg.iteration.max_iterations = 7;
        assert!(cfg.save_if_missing(dir.path()).unwrap());
        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded.iteration.max_iterations, 7);

        // an existing config is left alone
        assert!(!Config::default().save_if_missing(dir.path()).unwrap());
        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded.iteration.max_iterations, 7);
    }

    #[test]
    fn validate_zero_iterations_is_error() {
        let mut cfg = Config::default();
        cfg.iteration.max_iterations = 0;
        assert!(cfg.has_errors());
    }

    #[test]
    fn validate_unusual_values_warn() {
        let mut cfg = Config::default();
        cfg.iteration.max_iterations = 20;
        cfg.memory.snippet_limit = 0;
        cfg.analyzer.extensions.clear();
        let warnings = cfg.validate();
        assert_eq!(warnings.len(), 3);
        assert!(warnings.iter().all(|w| w.level == WarnLevel::Warning));
        assert!(!cfg.has_errors());
    }

    #[test]
    fn default_config_is_clean() {
        assert!(Config::default().validate().is_empty());
    }
}

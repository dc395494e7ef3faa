//! Artifact sets: the complete path → content mapping produced by one
//! generation attempt.
//!
//! Paths are relative and `/`-separated. A `BTreeMap` keeps iteration order
//! sorted by path so everything downstream of a set (analysis, snippet
//! absorption, rendering) is deterministic regardless of how the generator
//! built it.

use crate::error::{RefineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactSet {
    files: BTreeMap<String, String>,
}

impl ArtifactSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a file. Returns the previous content, if any.
    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<String>) -> Option<String> {
        self.files.insert(path.into(), content.into())
    }

    /// Insert a file only if the path is not already present.
    pub fn insert_if_absent(&mut self, path: &str, content: &str) -> bool {
        if self.files.contains_key(path) {
            return false;
        }
        self.files.insert(path.to_string(), content.to_string());
        true
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Files in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.files.iter().map(|(p, c)| (p.as_str(), c.as_str()))
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Check every path before the set is allowed into the core.
    ///
    /// Rejects empty, absolute and parent-escaping paths so that a set can
    /// always be written beneath an output directory.
    pub fn validate(&self) -> Result<()> {
        for path in self.files.keys() {
            validate_path(path)?;
        }
        Ok(())
    }

    /// Write every file beneath `dir`, creating parent directories.
    pub fn write_to(&self, dir: &Path) -> Result<()> {
        self.validate()?;
        for (path, content) in &self.files {
            crate::io::atomic_write(&dir.join(path), content.as_bytes())?;
        }
        Ok(())
    }

    /// Load a file or a directory tree as an artifact set. Paths are relative
    /// to `path` (or the file name for a single file). Files that are not
    /// valid UTF-8 are skipped, as are hidden entries.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut set = Self::new();
        if path.is_file() {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if let Some(content) = read_text(path)? {
                set.insert(name, content);
            }
            return Ok(set);
        }
        collect_dir(path, path, &mut set)?;
        Ok(set)
    }
}

impl FromIterator<(String, String)> for ArtifactSet {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            files: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a ArtifactSet {
    type Item = (&'a String, &'a String);
    type IntoIter = std::collections::btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.iter()
    }
}

fn validate_path(path: &str) -> Result<()> {
    let invalid = |reason: &str| RefineError::InvalidArtifactPath {
        path: path.to_string(),
        reason: reason.to_string(),
    };
    if path.trim().is_empty() {
        return Err(invalid("path is empty"));
    }
    if path.starts_with('/') || path.starts_with('\\') || Path::new(path).is_absolute() {
        return Err(invalid("path must be relative"));
    }
    for component in Path::new(path).components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => return Err(invalid("path must stay inside the artifact root")),
        }
    }
    Ok(())
}

fn read_text(path: &Path) -> Result<Option<String>> {
    let bytes = std::fs::read(path)?;
    match String::from_utf8(bytes) {
        Ok(s) => Ok(Some(s)),
        Err(_) => {
            tracing::warn!(path = %path.display(), "skipping non-UTF-8 file");
            Ok(None)
        }
    }
}

fn collect_dir(base: &Path, dir: &Path, set: &mut ArtifactSet) -> Result<()> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)?.collect::<std::io::Result<_>>()?;
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let name = entry.file_name();
        if name.to_string_lossy().starts_with('.') {
            continue;
        }
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_dir(base, &path, set)?;
        } else if file_type.is_file() {
            let rel = path.strip_prefix(base).unwrap_or(&path);
            let key = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if let Some(content) = read_text(&path)? {
                set.insert(key, content);
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn iteration_is_sorted_by_path() {
        let mut set = ArtifactSet::new();
        set.insert("src/z.py", "z");
        set.insert("README.md", "r");
        set.insert("src/a.py", "a");
        let paths: Vec<_> = set.paths().collect();
        assert_eq!(paths, vec!["README.md", "src/a.py", "src/z.py"]);
    }

    #[test]
    fn insert_if_absent_keeps_existing() {
        let mut set = ArtifactSet::new();
        set.insert("app.py", "original");
        assert!(!set.insert_if_absent("app.py", "replacement"));
        assert!(set.insert_if_absent("tests/test_app.py", "t"));
        assert_eq!(set.get("app.py"), Some("original"));
    }

    #[test]
    fn validate_rejects_escaping_paths() {
        for bad in ["", "/etc/passwd", "../outside.py", "src/../../x"] {
            let mut set = ArtifactSet::new();
            set.insert(bad, "x");
            assert!(set.validate().is_err(), "expected invalid: {bad:?}");
        }
        let mut ok = ArtifactSet::new();
        ok.insert("src/app/main.py", "x");
        ok.insert("./README.md", "x");
        ok.validate().unwrap();
    }

    #[test]
    fn serializes_as_plain_map() {
        let mut set = ArtifactSet::new();
        set.insert("main.py", "print('hi')");
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"{"main.py":"print('hi')"}"#);
        let parsed: ArtifactSet = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, set);
    }

    #[test]
    fn write_and_load_tree() {
        let dir = TempDir::new().unwrap();
        let mut set = ArtifactSet::new();
        set.insert("app.py", "def main():\n    return 1\n");
        set.insert("pkg/util.py", "X = 1\n");
        set.write_to(dir.path()).unwrap();

        std::fs::write(dir.path().join("blob.bin"), [0xff, 0xfe, 0x00]).unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git/HEAD"), "ref").unwrap();

        let loaded = ArtifactSet::load_from(dir.path()).unwrap();
        assert_eq!(loaded, set);
    }

    #[test]
    fn load_single_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("solo.py");
        std::fs::write(&file, "pass\n").unwrap();
        let loaded = ArtifactSet::load_from(&file).unwrap();
        assert_eq!(loaded.get("solo.py"), Some("pass\n"));
    }
}

//! Project memory: the persisted, relevance-ranked context accumulator.
//!
//! Layout:
//!   .refine/projects/<id>/memory.yaml   one durable record per project
//!
//! The record is an explicit schema: ordered snippet, iteration-record and
//! feedback lists plus the iteration counter. Every mutation is appended and
//! written through immediately with an atomic replace, so a crash never
//! leaves a half-written record. Mutations take `&mut self`, which gives each
//! store a single writer.

use crate::analyzer::{find_marker, IssueAnalyzer};
use crate::artifact::ArtifactSet;
use crate::config::MemoryConfig;
use crate::error::{RefineError, Result};
use crate::types::{FeedbackKind, IterationStatus, SnippetKind};
use crate::{io, paths};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Inclusive, 1-based line range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

impl LineRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySnippet {
    pub content: String,
    pub file_path: String,
    pub lines: LineRange,
    pub kind: SnippetKind,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub note: String,
    /// Set on whole-file snippets: the cycle whose artifact set they hold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration: Option<u32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: u32,
    /// 0–100.
    pub score: u32,
    pub issue_count: usize,
    pub status: IterationStatus,
    #[serde(default)]
    pub recommendations: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// What the caller knows about a finished cycle. The iteration number and
/// timestamp are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationDraft {
    pub score: u32,
    pub issue_count: usize,
    pub status: IterationStatus,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackItem {
    pub kind: FeedbackKind,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// The durable record. Field order is the on-disk order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    #[serde(default = "default_version")]
    pub version: u32,
    pub project_id: String,
    pub max_iterations: u32,
    pub current_iteration: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specification: Option<serde_json::Value>,
    #[serde(default)]
    pub snippets: Vec<MemorySnippet>,
    #[serde(default)]
    pub iterations: Vec<IterationRecord>,
    #[serde(default)]
    pub feedback: Vec<FeedbackItem>,
}

fn default_version() -> u32 {
    1
}

impl MemoryRecord {
    pub fn new(project_id: impl Into<String>, max_iterations: u32) -> Self {
        Self {
            version: 1,
            project_id: project_id.into(),
            max_iterations,
            current_iteration: 0,
            specification: None,
            snippets: Vec::new(),
            iterations: Vec::new(),
            feedback: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct MemoryStore {
    path: PathBuf,
    settings: MemoryConfig,
    record: MemoryRecord,
}

impl MemoryStore {
    /// Load the project's memory, or create and persist an empty one.
    pub fn open(
        root: &Path,
        project_id: &str,
        max_iterations: u32,
        settings: &MemoryConfig,
    ) -> Result<Self> {
        paths::validate_project_id(project_id)?;
        let path = paths::memory_path(root, project_id);
        if path.exists() {
            return Self::load(root, project_id, settings);
        }
        let store = Self {
            path,
            settings: settings.clone(),
            record: MemoryRecord::new(project_id, max_iterations),
        };
        store.save()?;
        Ok(store)
    }

    /// Load an existing project's memory.
    pub fn load(root: &Path, project_id: &str, settings: &MemoryConfig) -> Result<Self> {
        paths::validate_project_id(project_id)?;
        let path = paths::memory_path(root, project_id);
        if !path.exists() {
            return Err(RefineError::ProjectNotFound(project_id.to_string()));
        }
        let data = std::fs::read_to_string(&path)?;
        let record: MemoryRecord = serde_yaml::from_str(&data)?;
        Ok(Self {
            path,
            settings: settings.clone(),
            record,
        })
    }

    pub fn save(&self) -> Result<()> {
        let persist_err = |reason: String| RefineError::Persistence {
            project: self.record.project_id.clone(),
            reason,
        };
        let data = serde_yaml::to_string(&self.record).map_err(|e| persist_err(e.to_string()))?;
        io::atomic_write(&self.path, data.as_bytes()).map_err(|e| persist_err(e.to_string()))
    }

    /// Persist, undoing the in-memory mutation if the write fails so memory
    /// and disk never disagree.
    fn persist_or_revert(&mut self, revert: impl FnOnce(&mut MemoryRecord)) -> Result<()> {
        if let Err(e) = self.save() {
            revert(&mut self.record);
            tracing::warn!(project = %self.record.project_id, error = %e, "memory write failed");
            return Err(e);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn record(&self) -> &MemoryRecord {
        &self.record
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn project_id(&self) -> &str {
        &self.record.project_id
    }

    pub fn current_iteration(&self) -> u32 {
        self.record.current_iteration
    }

    pub fn max_iterations(&self) -> u32 {
        self.record.max_iterations
    }

    pub fn can_continue(&self) -> bool {
        self.record.current_iteration < self.record.max_iterations
    }

    pub fn snippets(&self) -> &[MemorySnippet] {
        &self.record.snippets
    }

    pub fn iterations(&self) -> &[IterationRecord] {
        &self.record.iterations
    }

    pub fn feedback(&self) -> &[FeedbackItem] {
        &self.record.feedback
    }

    /// The most recently absorbed artifact set, rebuilt from the whole-file
    /// snippets of its absorption batch.
    pub fn last_artifacts(&self) -> Option<ArtifactSet> {
        let last = self.record.snippets.iter().rev().find(|s| s.iteration.is_some())?;
        let batch = (last.iteration, last.created_at);
        let mut set = ArtifactSet::new();
        for snippet in &self.record.snippets {
            if (snippet.iteration, snippet.created_at) == batch {
                set.insert(snippet.file_path.clone(), snippet.content.clone());
            }
        }
        Some(set)
    }

    pub fn specification(&self) -> Option<&serde_json::Value> {
        self.record.specification.as_ref()
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    pub fn append_snippet(
        &mut self,
        content: impl Into<String>,
        file_path: impl Into<String>,
        lines: LineRange,
        kind: SnippetKind,
        note: impl Into<String>,
    ) -> Result<MemorySnippet> {
        let snippet = MemorySnippet {
            content: content.into(),
            file_path: file_path.into(),
            lines,
            kind,
            note: note.into(),
            iteration: None,
            created_at: Utc::now(),
        };
        self.record.snippets.push(snippet.clone());
        self.persist_or_revert(|r| {
            r.snippets.pop();
        })?;
        Ok(snippet)
    }

    /// Absorb a generation attempt: one whole-file snippet per file plus a
    /// `todo`/`placeholder` snippet around every marker comment in a source
    /// file. Written with a single save. Returns the number of snippets added.
    pub fn absorb_artifacts(
        &mut self,
        artifacts: &ArtifactSet,
        iteration: u32,
        analyzer: &IssueAnalyzer,
    ) -> Result<usize> {
        let now = Utc::now();
        let before = self.record.snippets.len();
        let note = format!("Iteration {iteration} code");
        for (path, content) in artifacts.iter() {
            let lines: Vec<&str> = content.lines().collect();
            self.record.snippets.push(MemorySnippet {
                content: content.to_string(),
                file_path: path.to_string(),
                lines: LineRange::new(1, lines.len().max(1)),
                kind: whole_file_kind(content),
                note: note.clone(),
                iteration: Some(iteration),
                created_at: now,
            });
            if !analyzer.is_source_file(path) || content.contains('\0') {
                continue;
            }
            for (idx, line) in lines.iter().enumerate() {
                let Some(hit) = find_marker(line) else {
                    continue;
                };
                let start = idx.saturating_sub(analyzer.context_lines());
                let end = (idx + analyzer.context_lines()).min(lines.len() - 1);
                self.record.snippets.push(MemorySnippet {
                    content: lines[start..=end].join("\n"),
                    file_path: path.to_string(),
                    lines: LineRange::new(start + 1, end + 1),
                    kind: if hit.is_placeholder {
                        SnippetKind::Placeholder
                    } else {
                        SnippetKind::Todo
                    },
                    note: hit.description,
                    iteration: None,
                    created_at: now,
                });
            }
        }
        let added = self.record.snippets.len() - before;
        self.persist_or_revert(|r| r.snippets.truncate(before))?;
        tracing::debug!(project = %self.record.project_id, iteration, added, "absorbed artifacts into memory");
        Ok(added)
    }

    /// Append the record for the cycle that is finishing. Its number comes
    /// from the store's own counter (`current_iteration + 1`), never from the
    /// caller.
    pub fn append_iteration_record(&mut self, draft: IterationDraft) -> Result<IterationRecord> {
        let iteration = self.record.current_iteration + 1;
        if let Some(last) = self.record.iterations.last() {
            if last.iteration >= iteration {
                return Err(RefineError::IterationOutOfOrder {
                    attempted: iteration,
                    last: last.iteration,
                });
            }
        }
        let record = IterationRecord {
            iteration,
            score: draft.score.min(100),
            issue_count: draft.issue_count,
            status: draft.status,
            recommendations: draft.recommendations,
            timestamp: Utc::now(),
        };
        self.record.iterations.push(record.clone());
        self.persist_or_revert(|r| {
            r.iterations.pop();
        })?;
        Ok(record)
    }

    /// Append a review comment.
    pub fn append_feedback(&mut self, text: impl Into<String>) -> Result<()> {
        self.push_feedback(FeedbackKind::Review, text.into())
    }

    /// Append an improvement instruction for the next generation attempt.
    pub fn append_instruction(&mut self, text: impl Into<String>) -> Result<()> {
        self.push_feedback(FeedbackKind::Instruction, text.into())
    }

    fn push_feedback(&mut self, kind: FeedbackKind, text: String) -> Result<()> {
        self.record.feedback.push(FeedbackItem {
            kind,
            text,
            created_at: Utc::now(),
        });
        self.persist_or_revert(|r| {
            r.feedback.pop();
        })
    }

    /// Advance the counter after a completed cycle. Returns the new value.
    pub fn increment_iteration(&mut self) -> Result<u32> {
        self.record.current_iteration += 1;
        self.persist_or_revert(|r| r.current_iteration -= 1)?;
        Ok(self.record.current_iteration)
    }

    pub fn set_specification(&mut self, specification: serde_json::Value) -> Result<()> {
        let previous = self.record.specification.replace(specification);
        self.persist_or_revert(|r| r.specification = previous)
    }

    // -----------------------------------------------------------------------
    // Retrieval
    // -----------------------------------------------------------------------

    /// Relevance score of one snippet. Zero means "leave it out".
    /// `hint` is already lowercased; the empty hint matches every snippet.
    fn relevance(&self, snippet: &MemorySnippet, hint: &str, now: DateTime<Utc>) -> u32 {
        let mut score = 0;
        if snippet.content.to_lowercase().contains(hint) {
            score += 3;
        }
        if snippet.kind.is_unfinished() {
            score += 5;
        }
        let age = now.signed_duration_since(snippet.created_at).num_seconds();
        if age < self.settings.recency_window_secs as i64 {
            score += 2;
        }
        score
    }

    /// Snippets with a non-zero score, best first: score descending, then
    /// newest first. At most `snippet_limit` entries.
    pub fn ranked_snippets_at(
        &self,
        query_hint: &str,
        now: DateTime<Utc>,
    ) -> Vec<(&MemorySnippet, u32)> {
        let hint = query_hint.to_lowercase();
        let mut ranked: Vec<(usize, &MemorySnippet, u32)> = self
            .record
            .snippets
            .iter()
            .enumerate()
            .map(|(idx, s)| (idx, s, self.relevance(s, &hint, now)))
            .filter(|(_, _, score)| *score > 0)
            .collect();
        ranked.sort_by(|a, b| {
            b.2.cmp(&a.2)
                .then_with(|| b.1.created_at.cmp(&a.1.created_at))
                .then_with(|| b.0.cmp(&a.0))
        });
        ranked
            .into_iter()
            .take(self.settings.snippet_limit)
            .map(|(_, s, score)| (s, score))
            .collect()
    }

    pub fn build_context(&self, query_hint: &str) -> String {
        self.build_context_at(query_hint, Utc::now())
    }

    /// Assemble the bounded context handed to the next generation call.
    /// Recent feedback and instructions come first, verbatim; ranked
    /// snippets follow.
    pub fn build_context_at(&self, query_hint: &str, now: DateTime<Utc>) -> String {
        let mut out = format!(
            "# Project Context: {}\nIteration: {}/{}\n",
            self.record.project_id, self.record.current_iteration, self.record.max_iterations
        );

        let review = recent(&self.record.feedback, FeedbackKind::Review, self.settings.feedback_window);
        if !review.is_empty() {
            out.push_str("\n## Recent Review Feedback\n");
            for text in review {
                out.push_str(&format!("- {text}\n"));
            }
        }

        let instructions = recent(
            &self.record.feedback,
            FeedbackKind::Instruction,
            self.settings.instruction_window,
        );
        if !instructions.is_empty() {
            out.push_str("\n## Improvement Instructions\n");
            for text in instructions {
                out.push_str(&format!("- {text}\n"));
            }
        }

        let ranked = self.ranked_snippets_at(query_hint, now);
        out.push_str("\n## Relevant Code Snippets\n");
        if ranked.is_empty() {
            out.push_str("\nNo code context available.\n");
        }
        for (snippet, score) in ranked {
            out.push_str(&format!(
                "\n### {} (lines {}-{})\nType: {} | Relevance: {}\n```\n{}\n```\n",
                snippet.file_path,
                snippet.lines.start,
                snippet.lines.end,
                snippet.kind,
                score,
                truncate(&snippet.content, self.settings.max_snippet_chars),
            ));
            if !snippet.note.is_empty() {
                out.push_str(&format!("Note: {}\n", snippet.note));
            }
        }
        tracing::debug!(project = %self.record.project_id, bytes = out.len(), "built generation context");
        out
    }

    /// Markdown summary of every recorded iteration.
    pub fn iteration_summary(&self) -> String {
        if self.record.iterations.is_empty() {
            return "No iterations recorded yet.".to_string();
        }
        let mut out = format!(
            "# Iteration Summary for {}\nTotal Iterations: {}\nCurrent Iteration: {}/{}\n",
            self.record.project_id,
            self.record.iterations.len(),
            self.record.current_iteration,
            self.record.max_iterations
        );
        for it in &self.record.iterations {
            out.push_str(&format!(
                "\n## Iteration {}\nTimestamp: {}\nStatus: {}\nQuality Score: {}\nIssues Found: {}\nRecommendations: {}\n",
                it.iteration,
                it.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
                it.status,
                it.score,
                it.issue_count,
                it.recommendations.len()
            ));
        }
        out
    }
}

fn recent(items: &[FeedbackItem], kind: FeedbackKind, window: usize) -> Vec<&str> {
    let matching: Vec<&str> = items
        .iter()
        .filter(|f| f.kind == kind)
        .map(|f| f.text.as_str())
        .collect();
    let skip = matching.len().saturating_sub(window);
    matching.into_iter().skip(skip).collect()
}

fn truncate(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}\n... (truncated)", &content[..cut]),
        None => content.to_string(),
    }
}

static CLASS_RE: OnceLock<Regex> = OnceLock::new();

fn whole_file_kind(content: &str) -> SnippetKind {
    let re = CLASS_RE.get_or_init(|| {
        Regex::new(r"(?m)^\s*(?:export\s+)?(?:default\s+)?(?:abstract\s+)?class\s+\w+").unwrap()
    });
    if re.is_match(content) {
        SnippetKind::Class
    } else {
        SnippetKind::Function
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! External collaborator seams.
//!
//! The core never builds prompts or talks to a model. Everything that does is
//! behind one of these traits and returns `anyhow::Result`, so any failure of
//! the collaborator can be carried back into the controller as an ordinary
//! cycle failure. Plain closures implement the traits, which is what the
//! tests use as deterministic stubs.

use crate::analyzer::{improvement_instructions, Issue, IssueAnalyzer};
use crate::artifact::ArtifactSet;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Review
// ---------------------------------------------------------------------------

/// What a reviewer says about one artifact set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    /// 0–100. Informational only; the accept decision never reads it.
    pub score: u32,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    /// An explicit "stop iterating" signal, independent of the issue list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub needs_iteration: Option<bool>,
}

impl Review {
    /// A clean review: full score, nothing to fix.
    pub fn clean() -> Self {
        Self {
            score: 100,
            ..Self::default()
        }
    }

    /// Go decision: zero issues, or the reviewer explicitly says no further
    /// iteration is needed.
    pub fn accepts(&self) -> bool {
        self.issues.is_empty() || self.needs_iteration == Some(false)
    }
}

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// Turns a context string into a full artifact set.
pub trait Generator {
    fn generate(&mut self, context: &str) -> anyhow::Result<ArtifactSet>;
}

impl<F> Generator for F
where
    F: FnMut(&str) -> anyhow::Result<ArtifactSet>,
{
    fn generate(&mut self, context: &str) -> anyhow::Result<ArtifactSet> {
        self(context)
    }
}

/// Judges an artifact set.
pub trait Reviewer {
    fn review(&mut self, artifacts: &ArtifactSet) -> anyhow::Result<Review>;
}

impl<F> Reviewer for F
where
    F: FnMut(&ArtifactSet) -> anyhow::Result<Review>,
{
    fn review(&mut self, artifacts: &ArtifactSet) -> anyhow::Result<Review> {
        self(artifacts)
    }
}

/// Turns the natural-language request into an opaque specification document.
pub trait SpecWriter {
    fn write_spec(&mut self, input: &str) -> anyhow::Result<serde_json::Value>;
}

impl<F> SpecWriter for F
where
    F: FnMut(&str) -> anyhow::Result<serde_json::Value>,
{
    fn write_spec(&mut self, input: &str) -> anyhow::Result<serde_json::Value> {
        self(input)
    }
}

/// A single-shot downstream stage (tests, docs, deployment config). Returns
/// the files it contributes.
pub trait Stage {
    fn name(&self) -> &str;
    fn run(
        &mut self,
        specification: &serde_json::Value,
        artifacts: &ArtifactSet,
    ) -> anyhow::Result<ArtifactSet>;
}

/// A closure with a name attached.
pub struct NamedStage<F> {
    name: String,
    run: F,
}

pub fn stage<F>(name: impl Into<String>, run: F) -> NamedStage<F>
where
    F: FnMut(&serde_json::Value, &ArtifactSet) -> anyhow::Result<ArtifactSet>,
{
    NamedStage {
        name: name.into(),
        run,
    }
}

impl<F> Stage for NamedStage<F>
where
    F: FnMut(&serde_json::Value, &ArtifactSet) -> anyhow::Result<ArtifactSet>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(
        &mut self,
        specification: &serde_json::Value,
        artifacts: &ArtifactSet,
    ) -> anyhow::Result<ArtifactSet> {
        (self.run)(specification, artifacts)
    }
}

// ---------------------------------------------------------------------------
// AnalyzerReviewer
// ---------------------------------------------------------------------------

/// Quality score for a list of issues: 100 minus each issue's severity
/// points, floored at 0.
pub fn score_issues(issues: &[Issue]) -> u32 {
    let deducted: u32 = issues.iter().map(|i| i.severity.points()).sum();
    100u32.saturating_sub(deducted)
}

/// A reviewer backed by the static analyzer alone.
#[derive(Debug, Clone, Default)]
pub struct AnalyzerReviewer {
    analyzer: IssueAnalyzer,
}

impl AnalyzerReviewer {
    pub fn new(analyzer: IssueAnalyzer) -> Self {
        Self { analyzer }
    }
}

impl Reviewer for AnalyzerReviewer {
    fn review(&mut self, artifacts: &ArtifactSet) -> anyhow::Result<Review> {
        let issues = self.analyzer.analyze(artifacts);
        Ok(Review {
            score: score_issues(&issues),
            issues: issues.iter().map(Issue::headline).collect(),
            recommendations: improvement_instructions(&issues),
            needs_iteration: None,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_on_zero_issues_or_explicit_stop() {
        assert!(Review::clean().accepts());
        let mut r = Review {
            score: 40,
            issues: vec!["a.py:3 - stub".into()],
            ..Review::default()
        };
        assert!(!r.accepts());
        r.needs_iteration = Some(true);
        assert!(!r.accepts());
        r.needs_iteration = Some(false);
        assert!(r.accepts());
    }

    #[test]
    fn score_is_ignored_by_decision() {
        let low = Review {
            score: 0,
            ..Review::default()
        };
        assert!(low.accepts());
    }

    #[test]
    fn review_parses_without_optional_fields() {
        let r: Review = serde_json::from_str(r#"{"score": 88}"#).unwrap();
        assert_eq!(r.score, 88);
        assert!(r.issues.is_empty());
        assert_eq!(r.needs_iteration, None);
    }

    #[test]
    fn analyzer_reviewer_scores_by_severity() {
        let mut set = ArtifactSet::new();
        set.insert(
            "app.py",
            "# TODO: wire config\ndef run():\n    pass\n",
        );
        let review = AnalyzerReviewer::default().review(&set).unwrap();
        // medium todo (5) + high stub (10)
        assert_eq!(review.score, 85);
        assert_eq!(review.issues.len(), 2);
        assert!(review.issues[0].starts_with("app.py:1 - "));
        assert!(review.recommendations[0].starts_with("Complete 1 TODO"));
        assert!(!review.accepts());
    }

    #[test]
    fn analyzer_reviewer_accepts_clean_code() {
        let mut set = ArtifactSet::new();
        set.insert("app.py", "def add(a, b):\n    return a + b\n");
        let review = AnalyzerReviewer::default().review(&set).unwrap();
        assert_eq!(review.score, 100);
        assert!(review.accepts());
    }

    #[test]
    fn score_floors_at_zero() {
        let content: String = (0..15).map(|n| format!("def f{n}():\n    pass\n")).collect();
        let mut set = ArtifactSet::new();
        set.insert("many.py", content);
        let review = AnalyzerReviewer::default().review(&set).unwrap();
        assert_eq!(review.score, 0);
    }

    #[test]
    fn closures_implement_collaborators() {
        let mut calls = 0;
        let mut generator = |ctx: &str| -> anyhow::Result<ArtifactSet> {
            calls += 1;
            let mut set = ArtifactSet::new();
            set.insert("ctx.txt", ctx);
            Ok(set)
        };
        let set = Generator::generate(&mut generator, "hello").unwrap();
        assert_eq!(set.get("ctx.txt"), Some("hello"));
        drop(generator);
        assert_eq!(calls, 1);

        let mut docs = stage("docs", |_spec: &serde_json::Value, _files: &ArtifactSet| {
            let mut out = ArtifactSet::new();
            out.insert("README.md", "# docs");
            Ok(out)
        });
        assert_eq!(docs.name(), "docs");
        let out = docs.run(&serde_json::Value::Null, &ArtifactSet::new()).unwrap();
        assert!(out.contains("README.md"));
    }
}

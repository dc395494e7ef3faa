//! Static issue analyzer: a pattern-based completeness gate over an
//! [`ArtifactSet`].
//!
//! Two independent rule families run over every source file:
//!
//! - **comment markers**: `TODO`, `FIXME`, `implement`, `placeholder` and
//!   `missing` directly after a comment delimiter (`#`, `//`, `/*`, `<!--`).
//! - **structural incompleteness**: a small line-scanning state machine that
//!   arms on a function definition and inspects the first few body lines for
//!   a placeholder body, a "not implemented" raise, a bare return, or a marker
//!   comment.
//!
//! Output is sorted by file, then line; on the same line comment-marker issues
//! come first. The analyzer is a pure function of its input.

use crate::artifact::ArtifactSet;
use crate::config::AnalyzerConfig;
use crate::types::{IssueCategory, Severity};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Issue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub file_path: String,
    /// 1-based.
    pub line: usize,
    pub category: IssueCategory,
    pub severity: Severity,
    pub description: String,
    /// The offending line, trimmed.
    pub code: String,
    /// Numbered window of surrounding lines; the offending line is marked `>`.
    pub context: String,
}

impl Issue {
    /// `path:line - description`, the form used in feedback and instructions.
    pub fn headline(&self) -> String {
        format!("{}:{} - {}", self.file_path, self.line, self.description)
    }
}

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

static MARKER_RE: OnceLock<Regex> = OnceLock::new();
static PHRASE_RE: OnceLock<Regex> = OnceLock::new();
static DEF_RES: OnceLock<Vec<Regex>> = OnceLock::new();

fn marker_re() -> &'static Regex {
    MARKER_RE.get_or_init(|| {
        Regex::new(
            r"(?i)(?:#|//|/\*|<!--)\s*(todo|fixme|implement|placeholder|missing)\b\s*:?\s*(.*)$",
        )
        .unwrap()
    })
}

fn phrase_re() -> &'static Regex {
    PHRASE_RE.get_or_init(|| {
        Regex::new(
            r"(?i)(?:#|//|/\*|<!--)\s*(?:(?:todo|fixme)\b\s*:?\s*)?(?:implement\s+this|add\s+(?:the\s+)?implementation|complete\s+this\s+(?:function|method)|fill\s+in\s+(?:the\s+)?implementation)",
        )
        .unwrap()
    })
}

/// Function definition patterns. Groups: 1 = indentation, 2 = name,
/// 3 = whatever follows the body opener on the same line.
fn def_res() -> &'static [Regex] {
    DEF_RES.get_or_init(|| {
        [
            // python
            r"^(\s*)(?:async\s+)?def\s+(\w+)\s*\(.*\)\s*(?:->\s*[^:]+)?:\s*(.*)$",
            // javascript / typescript
            r"^(\s*)(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*(\w+)\s*(?:<[^>]*>)?\s*\(.*\)[^{]*\{\s*(.*)$",
            // rust
            r"^(\s*)(?:pub(?:\([^)]*\))?\s+)?(?:const\s+)?(?:async\s+)?(?:unsafe\s+)?fn\s+(\w+)[^{;]*\{\s*(.*)$",
            // go
            r"^(\s*)func\s+(?:\([^)]*\)\s*)?(\w+)\s*\([^{]*\{\s*(.*)$",
        ]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Todo,
    Fixme,
    Implement,
    Placeholder,
    Missing,
}

impl Marker {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "todo" => Some(Marker::Todo),
            "fixme" => Some(Marker::Fixme),
            "implement" => Some(Marker::Implement),
            "placeholder" => Some(Marker::Placeholder),
            "missing" => Some(Marker::Missing),
            _ => None,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Marker::Todo => "TODO",
            Marker::Fixme => "FIXME",
            Marker::Implement => "IMPLEMENT",
            Marker::Placeholder => "PLACEHOLDER",
            Marker::Missing => "MISSING",
        }
    }
}

/// A comment marker found on a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MarkerHit {
    pub(crate) is_placeholder: bool,
    pub(crate) description: String,
    pub(crate) missing_implementation: bool,
}

pub(crate) fn find_marker(line: &str) -> Option<MarkerHit> {
    let caps = marker_re().captures(line)?;
    let marker = Marker::parse(caps.get(1)?.as_str())?;
    let remainder = caps
        .get(2)
        .map(|m| m.as_str())
        .unwrap_or("")
        .trim()
        .trim_end_matches("-->")
        .trim_end_matches("*/")
        .trim();
    let description = if remainder.is_empty() {
        marker.label().to_string()
    } else {
        remainder.to_string()
    };
    let missing_implementation = phrase_re().is_match(line)
        || (matches!(marker, Marker::Todo | Marker::Fixme)
            && remainder.to_ascii_lowercase().starts_with("implement"));
    Some(MarkerHit {
        is_placeholder: marker == Marker::Placeholder,
        description,
        missing_implementation,
    })
}

// ---------------------------------------------------------------------------
// Body classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum BodyLine {
    Blank,
    Comment { marker: bool },
    Placeholder,
    NotImplemented,
    BareReturn,
    Statement,
}

fn is_comment(trimmed: &str) -> bool {
    ["#", "//", "/*", "*", "<!--"]
        .iter()
        .any(|d| trimmed.starts_with(d))
}

fn strip_trailing_comment(stmt: &str) -> &str {
    let cut = [" #", " //"]
        .iter()
        .filter_map(|d| stmt.find(d))
        .min()
        .unwrap_or(stmt.len());
    stmt[..cut].trim_end()
}

fn classify_statement(stmt: &str) -> BodyLine {
    let stmt = strip_trailing_comment(stmt)
        .trim_end_matches('}')
        .trim_end()
        .trim_end_matches(';')
        .trim_end();
    if stmt.is_empty() {
        return BodyLine::Blank;
    }
    if matches!(stmt, "pass" | "...") {
        return BodyLine::Placeholder;
    }
    let lower = stmt.to_ascii_lowercase();
    if stmt.contains("NotImplementedError")
        || stmt.contains("NotImplementedException")
        || lower.starts_with("unimplemented!")
        || lower.starts_with("todo!(")
        || ((lower.starts_with("raise")
            || lower.starts_with("throw")
            || lower.starts_with("panic"))
            && lower.contains("not implemented"))
    {
        return BodyLine::NotImplemented;
    }
    if matches!(
        stmt,
        "return" | "return None" | "return null" | "return nil" | "return undefined"
    ) {
        return BodyLine::BareReturn;
    }
    BodyLine::Statement
}

fn classify_body_line(line: &str) -> BodyLine {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return BodyLine::Blank;
    }
    if is_comment(trimmed) {
        return BodyLine::Comment {
            marker: marker_re().is_match(trimmed) || phrase_re().is_match(trimmed),
        };
    }
    classify_statement(trimmed)
}

/// A line opening a string-literal statement (a docstring, `"use strict"`).
/// Returns whether a triple-quoted literal stays open past this line.
fn docstring_start(line: &str) -> Option<bool> {
    let line = line.trim();
    let unprefixed = line.trim_start_matches(['r', 'R', 'u', 'U', 'b', 'B']);
    let trimmed = if line.len() - unprefixed.len() <= 2 && unprefixed.starts_with(['"', '\'']) {
        unprefixed
    } else {
        line
    };
    for delim in ["\"\"\"", "'''"] {
        if let Some(rest) = trimmed.strip_prefix(delim) {
            return Some(!rest.contains(delim));
        }
    }
    let literal = trimmed.trim_end_matches(';');
    let quoted = literal.len() >= 2
        && ['"', '\'', '`']
            .iter()
            .any(|q| literal.starts_with(*q) && literal.ends_with(*q));
    quoted.then_some(false)
}

fn closes_docstring(line: &str) -> bool {
    line.contains("\"\"\"") || line.contains("'''")
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

// ---------------------------------------------------------------------------
// Scanner state machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct OpenDef {
    line: usize,
    name: String,
    indent: usize,
    remaining: usize,
    in_docstring: bool,
}

#[derive(Debug, Clone)]
enum ScanState {
    Scanning,
    InBody(OpenDef),
}

/// Rule family, used as the secondary sort key within a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Family {
    Comment,
    Structural,
}

struct FileScan<'a> {
    path: &'a str,
    lines: Vec<&'a str>,
    context_lines: usize,
    found: Vec<(usize, Family, Issue)>,
}

impl<'a> FileScan<'a> {
    fn push(
        &mut self,
        family: Family,
        line: usize,
        category: IssueCategory,
        severity: Severity,
        description: String,
    ) {
        let issue = Issue {
            file_path: self.path.to_string(),
            line,
            category,
            severity,
            description,
            code: self.lines[line - 1].trim().to_string(),
            context: render_context(&self.lines, line, self.context_lines),
        };
        self.found.push((line, family, issue));
    }

    /// Record the structural finding for `def` given a classified body line.
    /// Returns true when the definition is settled.
    fn settle(&mut self, def: &OpenDef, body: &BodyLine) -> bool {
        let (category, severity, what) = match body {
            BodyLine::Blank | BodyLine::Comment { marker: false } => return false,
            BodyLine::Statement => return true,
            BodyLine::Placeholder => (
                IssueCategory::IncompleteStub,
                Severity::High,
                "has a placeholder body",
            ),
            BodyLine::NotImplemented => (
                IssueCategory::IncompleteStub,
                Severity::High,
                "raises not implemented",
            ),
            BodyLine::BareReturn => (
                IssueCategory::EmptyImplementation,
                Severity::Medium,
                "has minimal implementation (bare return)",
            ),
            BodyLine::Comment { marker: true } => (
                IssueCategory::IncompleteStub,
                Severity::Medium,
                "has a TODO comment in its body",
            ),
        };
        self.push(
            Family::Structural,
            def.line,
            category,
            severity,
            format!("Function \"{}\" {}", def.name, what),
        );
        true
    }

    fn run(mut self, lookahead: usize) -> Vec<Issue> {
        let mut state = ScanState::Scanning;
        let lines = self.lines.clone();

        for (idx, raw) in lines.iter().enumerate() {
            let line_no = idx + 1;

            if let Some(hit) = find_marker(raw) {
                self.push(
                    Family::Comment,
                    line_no,
                    IssueCategory::Todo,
                    Severity::Medium,
                    hit.description.clone(),
                );
                if hit.missing_implementation {
                    self.push(
                        Family::Comment,
                        line_no,
                        IssueCategory::MissingImplementation,
                        Severity::High,
                        "Missing implementation".to_string(),
                    );
                }
            } else if phrase_re().is_match(raw) {
                self.push(
                    Family::Comment,
                    line_no,
                    IssueCategory::MissingImplementation,
                    Severity::High,
                    "Missing implementation".to_string(),
                );
            }

            if let ScanState::InBody(mut def) = std::mem::replace(&mut state, ScanState::Scanning)
            {
                let dedented = !raw.trim().is_empty() && indent_of(raw) <= def.indent;
                let settled = if def.in_docstring {
                    def.in_docstring = !closes_docstring(raw);
                    false
                } else if dedented {
                    true
                } else if let Some(open) = docstring_start(raw) {
                    def.in_docstring = open;
                    false
                } else {
                    self.settle(&def, &classify_body_line(raw))
                };
                def.remaining -= 1;
                if !settled && def.remaining > 0 {
                    state = ScanState::InBody(def);
                }
            }

            if let Some(def) = match_def(raw, line_no, lookahead) {
                state = ScanState::Scanning;
                match def {
                    DefStart::Inline(def, body) => {
                        self.settle(&def, &body);
                    }
                    DefStart::Open(def) => state = ScanState::InBody(def),
                    DefStart::Closed => {}
                }
            }
        }

        let mut found = self.found;
        found.sort_by_key(|(line, family, _)| (*line, *family));
        found.into_iter().map(|(_, _, issue)| issue).collect()
    }
}

enum DefStart {
    /// Body starts on the definition line itself.
    Inline(OpenDef, BodyLine),
    /// Body follows on later lines.
    Open(OpenDef),
    /// One-line definition with nothing to inspect.
    Closed,
}

fn match_def(line: &str, line_no: usize, lookahead: usize) -> Option<DefStart> {
    if lookahead == 0 {
        return None;
    }
    let caps = def_res().iter().find_map(|re| re.captures(line))?;
    let def = OpenDef {
        line: line_no,
        name: caps.get(2)?.as_str().to_string(),
        indent: caps.get(1).map(|m| m.as_str().len()).unwrap_or(0),
        remaining: lookahead,
        in_docstring: false,
    };
    let trailing = caps.get(3).map(|m| m.as_str().trim()).unwrap_or("");
    if trailing.is_empty() || is_comment(trailing) {
        return Some(DefStart::Open(def));
    }
    match classify_statement(trailing) {
        BodyLine::Blank => Some(DefStart::Closed),
        BodyLine::Statement if trailing.trim_end().ends_with('}') => Some(DefStart::Closed),
        body => Some(DefStart::Inline(def, body)),
    }
}

fn render_context(lines: &[&str], line: usize, radius: usize) -> String {
    let start = line.saturating_sub(radius).max(1);
    let end = (line + radius).min(lines.len());
    (start..=end)
        .map(|n| {
            let mark = if n == line { '>' } else { ' ' };
            format!("{n:>4} {mark} {}", lines[n - 1])
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// IssueAnalyzer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct IssueAnalyzer {
    context_lines: usize,
    lookahead: usize,
    extensions: Vec<String>,
}

impl Default for IssueAnalyzer {
    fn default() -> Self {
        Self::new(&AnalyzerConfig::default())
    }
}

impl IssueAnalyzer {
    pub fn new(config: &AnalyzerConfig) -> Self {
        Self {
            context_lines: config.context_lines,
            lookahead: config.lookahead,
            extensions: config
                .extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    /// Lines of context kept either side of an offending line.
    pub fn context_lines(&self) -> usize {
        self.context_lines
    }

    pub fn is_source_file(&self, path: &str) -> bool {
        let Some((_, ext)) = path.rsplit_once('.') else {
            return false;
        };
        let ext = ext.to_ascii_lowercase();
        self.extensions.iter().any(|e| *e == ext)
    }

    /// Analyze every source file in the set, in path order.
    pub fn analyze(&self, artifacts: &ArtifactSet) -> Vec<Issue> {
        artifacts
            .iter()
            .filter(|(path, _)| self.is_source_file(path))
            .flat_map(|(path, content)| self.analyze_file(path, content))
            .collect()
    }

    /// Analyze a single file. Content that does not look like text yields no
    /// issues rather than an error.
    pub fn analyze_file(&self, path: &str, content: &str) -> Vec<Issue> {
        if content.contains('\0') {
            tracing::warn!(path, "skipping non-text artifact");
            return Vec::new();
        }
        FileScan {
            path,
            lines: content.lines().collect(),
            context_lines: self.context_lines,
            found: Vec::new(),
        }
        .run(self.lookahead)
    }
}

// ---------------------------------------------------------------------------
// Aggregation helpers
// ---------------------------------------------------------------------------

/// How many issues of one category are listed individually in instructions.
const INSTRUCTION_LIST_LIMIT: usize = 5;

/// Turn issues into improvement instructions for the next generation
/// attempt, grouped by category.
pub fn improvement_instructions(issues: &[Issue]) -> Vec<String> {
    let mut out = Vec::new();
    for &category in IssueCategory::all() {
        let group: Vec<&Issue> = issues.iter().filter(|i| i.category == category).collect();
        if group.is_empty() {
            continue;
        }
        let heading = match category {
            IssueCategory::Todo => format!("Complete {} TODO items found in the code:", group.len()),
            IssueCategory::MissingImplementation => {
                format!("Add missing implementations for {} items:", group.len())
            }
            IssueCategory::IncompleteStub => {
                format!("Implement {} incomplete functions:", group.len())
            }
            IssueCategory::EmptyImplementation => format!(
                "Enhance {} empty or minimal implementations:",
                group.len()
            ),
        };
        out.push(heading);
        for issue in group.iter().take(INSTRUCTION_LIST_LIMIT) {
            out.push(format!("- {}", issue.headline()));
        }
    }
    if out.is_empty() {
        out.push("No specific improvement instructions - code appears complete".to_string());
    }
    out
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueSummary {
    pub total: usize,
    pub by_category: BTreeMap<String, usize>,
    pub by_severity: BTreeMap<String, usize>,
    pub by_file: BTreeMap<String, usize>,
    pub high_priority: Vec<String>,
}

impl IssueSummary {
    pub fn from_issues(issues: &[Issue]) -> Self {
        let mut summary = Self {
            total: issues.len(),
            ..Self::default()
        };
        for issue in issues {
            *summary
                .by_category
                .entry(issue.category.to_string())
                .or_default() += 1;
            *summary
                .by_severity
                .entry(issue.severity.to_string())
                .or_default() += 1;
            *summary.by_file.entry(issue.file_path.clone()).or_default() += 1;
            if issue.severity == Severity::High {
                summary.high_priority.push(issue.headline());
            }
        }
        summary
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

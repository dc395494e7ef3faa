use crate::output::{clip, print_json, print_table};
use anyhow::Context;
use refine_core::analyzer::{improvement_instructions, IssueAnalyzer, IssueSummary};
use refine_core::artifact::ArtifactSet;
use refine_core::config::Config;
use std::path::Path;

pub fn run(root: &Path, path: &Path, summary: bool, json: bool) -> anyhow::Result<()> {
    let config = Config::load_or_default(root).context("failed to load config")?;
    if !path.exists() {
        anyhow::bail!("path not found: {}", path.display());
    }
    let artifacts = ArtifactSet::load_from(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let issues = IssueAnalyzer::new(&config.analyzer).analyze(&artifacts);

    if summary {
        let counts = IssueSummary::from_issues(&issues);
        let instructions = improvement_instructions(&issues);
        if json {
            return print_json(&serde_json::json!({
                "files": artifacts.len(),
                "summary": counts,
                "instructions": instructions,
            }));
        }
        println!("Files scanned: {}", artifacts.len());
        println!("Issues found:  {}", counts.total);
        for (severity, n) in &counts.by_severity {
            println!("  {severity:<8} {n}");
        }
        println!();
        for line in instructions {
            println!("{line}");
        }
        return Ok(());
    }

    if json {
        return print_json(&issues);
    }
    if issues.is_empty() {
        println!("No issues found in {} file(s).", artifacts.len());
        return Ok(());
    }
    let rows = issues
        .iter()
        .map(|i| {
            vec![
                format!("{}:{}", i.file_path, i.line),
                i.category.to_string(),
                i.severity.to_string(),
                clip(&i.description, 60),
            ]
        })
        .collect();
    print_table(&["LOCATION", "CATEGORY", "SEVERITY", "DESCRIPTION"], rows);
    Ok(())
}

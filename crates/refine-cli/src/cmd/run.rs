use crate::output::{clip, print_json, print_table};
use anyhow::Context;
use clap::Args;
use refine_core::analyzer::IssueAnalyzer;
use refine_core::command::CommandOracle;
use refine_core::config::Config;
use refine_core::oracle::{AnalyzerReviewer, Reviewer, SpecWriter, Stage};
use refine_core::orchestrator::{Collaborators, Orchestrator, PipelineReport};
use refine_core::types::ProjectStatus;
use std::path::{Path, PathBuf};

#[derive(Args)]
pub struct RunArgs {
    /// Natural-language request
    pub input: String,

    /// Generator command (JSON over stdin/stdout)
    #[arg(long)]
    pub generator: String,

    /// Reviewer command (default: built-in static analyzer)
    #[arg(long)]
    pub reviewer: Option<String>,

    /// Specification writer command
    #[arg(long = "spec")]
    pub spec_writer: Option<String>,

    /// Downstream stage, run once after generation (repeatable)
    #[arg(long = "stage", value_name = "NAME=CMD")]
    pub stages: Vec<String>,

    /// Project id (default: generated). A pending project with this id is resumed.
    #[arg(long)]
    pub project: Option<String>,

    /// Write the packaged artifact set to this directory
    #[arg(long)]
    pub out: Option<PathBuf>,
}

fn parse_stage(spec: &str, root: &Path) -> anyhow::Result<Box<dyn Stage>> {
    let (name, command) = spec
        .split_once('=')
        .filter(|(name, command)| !name.trim().is_empty() && !command.trim().is_empty())
        .ok_or_else(|| anyhow::anyhow!("invalid --stage '{spec}': expected NAME=CMD"))?;
    let oracle = CommandOracle::parse(command, root)
        .with_context(|| format!("invalid command for stage '{name}'"))?
        .named(name.trim());
    Ok(Box::new(oracle))
}

/// Returns whether the project was accepted.
pub fn run(root: &Path, args: RunArgs, json: bool) -> anyhow::Result<bool> {
    let config = Config::load(root).context("failed to load config")?;
    if config.has_errors() {
        anyhow::bail!("config validation found errors; run 'refine config validate'");
    }

    let mut generator =
        CommandOracle::parse(&args.generator, root).context("invalid --generator")?;
    let mut reviewer: Box<dyn Reviewer> = match &args.reviewer {
        Some(cmd) => Box::new(CommandOracle::parse(cmd, root).context("invalid --reviewer")?),
        None => Box::new(AnalyzerReviewer::new(IssueAnalyzer::new(&config.analyzer))),
    };
    let mut spec_writer = args
        .spec_writer
        .as_deref()
        .map(|cmd| CommandOracle::parse(cmd, root))
        .transpose()
        .context("invalid --spec")?;
    let stages = args
        .stages
        .iter()
        .map(|s| parse_stage(s, root))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let report = Orchestrator::new(root, &config)
        .run(
            args.project.as_deref(),
            &args.input,
            Collaborators {
                spec_writer: spec_writer.as_mut().map(|w| w as &mut dyn SpecWriter),
                generator: &mut generator,
                reviewer: reviewer.as_mut(),
                stages,
            },
        )
        .context("pipeline failed")?;

    if let Some(out) = &args.out {
        report
            .write_to(out)
            .with_context(|| format!("failed to write artifacts to {}", out.display()))?;
    }

    if json {
        print_json(&serde_json::json!({
            "project": report.project.id,
            "status": report.status(),
            "accepted": report.outcome.accepted(),
            "iterations": report.outcome.iterations,
            "max_iterations": report.project.max_iterations,
            "spec_fallback": report.spec_fallback,
            "history": report.outcome.history,
            "stages": report.stages,
            "files": report.artifacts.paths().collect::<Vec<_>>(),
            "output": args.out,
        }))?;
    } else {
        print_report(&report, args.out.as_deref());
    }

    Ok(report.status() == ProjectStatus::Accepted)
}

fn print_report(report: &PipelineReport, out: Option<&Path>) {
    println!("Project:     {}", report.project.id);
    println!("Status:      {}", report.status());
    println!(
        "Iterations:  {}/{}",
        report.outcome.iterations, report.project.max_iterations
    );
    if let Some(score) = report.project.final_score {
        println!("Final score: {score}");
    }
    if report.spec_fallback {
        println!("Spec:        fallback (spec writer failed)");
    }

    if !report.outcome.history.is_empty() {
        println!();
        let rows = report
            .outcome
            .history
            .iter()
            .map(|r| {
                vec![
                    r.iteration.to_string(),
                    r.status.to_string(),
                    r.score.to_string(),
                    r.issue_count.to_string(),
                    r.recommendations
                        .first()
                        .map(|s| clip(s, 60))
                        .unwrap_or_default(),
                ]
            })
            .collect();
        print_table(&["ITER", "STATUS", "SCORE", "ISSUES", "RECOMMENDATION"], rows);
    }

    if !report.stages.is_empty() {
        println!();
        let rows = report
            .stages
            .iter()
            .map(|s| {
                vec![
                    s.name.clone(),
                    s.status.to_string(),
                    s.files.len().to_string(),
                    s.error.as_deref().map(|e| clip(e, 60)).unwrap_or_default(),
                ]
            })
            .collect();
        print_table(&["STAGE", "STATUS", "FILES", "ERROR"], rows);
    }

    println!();
    match out {
        Some(dir) => println!(
            "{} file(s) written to {}",
            report.artifacts.len(),
            dir.display()
        ),
        None => println!("{} file(s) packaged", report.artifacts.len()),
    }
}

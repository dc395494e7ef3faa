use crate::output::{clip, print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use refine_core::config::Config;
use refine_core::memory::MemoryStore;
use refine_core::project::Project;
use std::path::Path;

#[derive(Subcommand)]
pub enum ProjectSubcommand {
    /// List all projects, oldest first
    List,
    /// Show a project's manifest and iteration history
    Show { id: String },
}

pub fn run(root: &Path, subcmd: ProjectSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ProjectSubcommand::List => list(root, json),
        ProjectSubcommand::Show { id } => show(root, &id, json),
    }
}

fn list(root: &Path, json: bool) -> anyhow::Result<()> {
    let projects = Project::list(root).context("failed to list projects")?;
    if json {
        return print_json(&projects);
    }
    if projects.is_empty() {
        println!("No projects.");
        return Ok(());
    }
    let rows = projects
        .iter()
        .map(|p| {
            vec![
                p.id.clone(),
                p.status.to_string(),
                format!("{}/{}", p.iterations, p.max_iterations),
                p.final_score.map(|s| s.to_string()).unwrap_or_else(|| "-".into()),
                p.created_at.format("%Y-%m-%d %H:%M").to_string(),
                clip(&p.input, 40),
            ]
        })
        .collect();
    print_table(
        &["ID", "STATUS", "ITERATIONS", "SCORE", "CREATED", "INPUT"],
        rows,
    );
    Ok(())
}

fn show(root: &Path, id: &str, json: bool) -> anyhow::Result<()> {
    let config = Config::load_or_default(root).context("failed to load config")?;
    let project = Project::load(root, id).with_context(|| format!("failed to load project '{id}'"))?;
    let store = MemoryStore::load(root, id, &config.memory)
        .with_context(|| format!("failed to load memory for '{id}'"))?;

    if json {
        return print_json(&serde_json::json!({
            "project": project,
            "specification": store.specification(),
            "iterations": store.iterations(),
            "snippets": store.snippets().len(),
            "feedback": store.feedback().len(),
        }));
    }

    println!("Project:    {}", project.id);
    println!("Status:     {}", project.status);
    println!("Input:      {}", project.input);
    println!(
        "Iterations: {}/{}",
        store.current_iteration(),
        store.max_iterations()
    );
    if let Some(score) = project.final_score {
        println!("Score:      {score}");
    }
    println!("Created:    {}", project.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("Updated:    {}", project.updated_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!(
        "Memory:     {} snippet(s), {} feedback item(s)",
        store.snippets().len(),
        store.feedback().len()
    );

    if !store.iterations().is_empty() {
        println!();
        let rows = store
            .iterations()
            .iter()
            .map(|r| {
                vec![
                    r.iteration.to_string(),
                    r.status.to_string(),
                    r.score.to_string(),
                    r.issue_count.to_string(),
                    r.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                ]
            })
            .collect();
        print_table(&["ITER", "STATUS", "SCORE", "ISSUES", "TIMESTAMP"], rows);
    }
    Ok(())
}

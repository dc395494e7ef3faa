use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use refine_core::config::Config;
use refine_core::memory::MemoryStore;
use std::path::Path;

#[derive(Subcommand)]
pub enum MemorySubcommand {
    /// Print the context the next generation attempt would receive
    Context {
        id: String,
        /// Query hint for snippet ranking (default: iteration.context_query)
        #[arg(long)]
        query: Option<String>,
    },
    /// Print the iteration history
    History { id: String },
    /// Append a review comment by hand
    Feedback { id: String, text: String },
}

pub fn run(root: &Path, subcmd: MemorySubcommand, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    match subcmd {
        MemorySubcommand::Context { id, query } => {
            let store = open(root, &id, &config)?;
            let query = query.unwrap_or_else(|| config.iteration.context_query.clone());
            let context = store.build_context(&query);
            if json {
                print_json(&serde_json::json!({ "project": id, "query": query, "context": context }))
            } else {
                print!("{context}");
                Ok(())
            }
        }
        MemorySubcommand::History { id } => {
            let store = open(root, &id, &config)?;
            if json {
                print_json(&store.iterations())
            } else {
                println!("{}", store.iteration_summary());
                Ok(())
            }
        }
        MemorySubcommand::Feedback { id, text } => {
            let mut store = open(root, &id, &config)?;
            store
                .append_feedback(text)
                .context("failed to record feedback")?;
            if json {
                print_json(&serde_json::json!({
                    "project": id,
                    "feedback_count": store.feedback().len(),
                }))
            } else {
                println!("Feedback recorded for '{id}'.");
                Ok(())
            }
        }
    }
}

fn open(root: &Path, id: &str, config: &Config) -> anyhow::Result<MemoryStore> {
    MemoryStore::load(root, id, &config.memory)
        .with_context(|| format!("failed to load memory for '{id}'"))
}

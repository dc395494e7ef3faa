mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    config::ConfigSubcommand, memory::MemorySubcommand, project::ProjectSubcommand, run::RunArgs,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "refine",
    about = "Iterative generate-review pipeline with persistent project memory",
    version,
    propagate_version = true
)]
struct Cli {
    /// Workspace root (default: auto-detect from .refine/ or .git/)
    #[arg(long, global = true, env = "REFINE_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize refine in the current directory
    Init,

    /// Inspect and validate the run configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Scan a file or directory for unfinished code
    Analyze {
        /// File or directory to analyze
        path: PathBuf,

        /// Print counts and improvement instructions instead of each issue
        #[arg(long)]
        summary: bool,
    },

    /// Run the full pipeline for a request (exit code 2 when not accepted)
    Run(RunArgs),

    /// List and inspect projects
    Project {
        #[command(subcommand)]
        subcommand: ProjectSubcommand,
    },

    /// Inspect and extend a project's memory
    Memory {
        #[command(subcommand)]
        subcommand: MemorySubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run(_) => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
        Commands::Analyze { path, summary } => cmd::analyze::run(&root, &path, summary, cli.json),
        Commands::Run(args) => match cmd::run::run(&root, args, cli.json) {
            Ok(false) => std::process::exit(2),
            other => other.map(|_| ()),
        },
        Commands::Project { subcommand } => cmd::project::run(&root, subcommand, cli.json),
        Commands::Memory { subcommand } => cmd::memory::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

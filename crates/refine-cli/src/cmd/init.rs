use anyhow::Context;
use refine_core::{config::Config, io, paths};
use std::path::Path;

pub fn run(root: &Path) -> anyhow::Result<()> {
    println!("Initializing refine in: {}", root.display());

    for dir in [paths::REFINE_DIR, paths::PROJECTS_DIR] {
        let p = root.join(dir);
        io::ensure_dir(&p).with_context(|| format!("failed to create {}", p.display()))?;
    }

    let created = Config::default()
        .save_if_missing(root)
        .context("failed to write config.yaml")?;
    let label = if created { "created:" } else { "exists: " };
    println!("  {label} {}", paths::CONFIG_FILE);
    Ok(())
}

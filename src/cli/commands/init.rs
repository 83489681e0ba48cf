//! Init Command
//!
//! Initialize Planforge in the current directory.

use crate::cli::ui::Output;
use crate::config::{CheckpointBackend, ConfigLoader};
use crate::pipeline::open_store;
use crate::types::{ForgeError, Result};

pub fn run(force: bool) -> Result<()> {
    let root = std::env::current_dir()?;
    let project_dir = root.join(ConfigLoader::project_dir());

    if project_dir.exists() && !force {
        return Err(ForgeError::Config(
            "Already initialized. Use --force to overwrite.".to_string(),
        ));
    }

    ConfigLoader::init_project(&root)?;

    // Global config is optional; never overwrite it from here
    if let Err(e) = ConfigLoader::init_global(false) {
        tracing::debug!("Global config init skipped: {}", e);
    }

    // Creates the sqlite schema up front when that backend is configured
    let config = ConfigLoader::load()?;
    if config.checkpoint.backend == CheckpointBackend::Sqlite {
        open_store(&config.checkpoint)?;
    }

    let output = Output::new();
    output.success("Initialized Planforge in .planforge/");
    println!("  Checkpoints: {} ({})", config.checkpoint.backend, checkpoint_location(&config));
    println!();
    println!("Next steps:");
    println!("  1. Write your requirements to a file, e.g. requirements.md");
    println!("  2. Run 'planforge run --name <project> --requirements requirements.md'");

    Ok(())
}

fn checkpoint_location(config: &crate::config::Config) -> String {
    match config.checkpoint.backend {
        CheckpointBackend::File => config.checkpoint.dir.display().to_string(),
        CheckpointBackend::Sqlite => config.checkpoint.database.display().to_string(),
    }
}

//! Resume Command
//!
//! Continue a run from its last checkpoint. The provider and parameters
//! recorded in the checkpoint are reused; `--provider` switches afterwards.

use std::path::PathBuf;

use tokio::runtime::Runtime;

use crate::cli::commands::run::{configure, finish};
use crate::cli::ui::Output;
use crate::cli::util::CommandContext;
use crate::types::Result;

pub fn run(key: &str, provider: Option<String>, stream: bool, output: Option<PathBuf>) -> Result<()> {
    let context = CommandContext::load()?;
    let mut orchestrator = configure(context.orchestrator()?, stream);

    let rt = Runtime::new()?;
    let checkpoint = rt.block_on(context.store.load(key))?;
    if let Some(checkpoint) = &checkpoint {
        Output::new().info(&format!(
            "Resuming {} after {} (written by {})",
            key,
            checkpoint.stage.name(),
            checkpoint.metadata.provider
        ));
    }

    let result = match provider {
        Some(name) => rt.block_on(orchestrator.resume_with_provider(key, &name))?,
        None => rt.block_on(orchestrator.resume_from(key))?,
    };
    finish(&result, output.as_deref())
}

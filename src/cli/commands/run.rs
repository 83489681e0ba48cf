//! Run Command
//!
//! Run the full pipeline for a set of requirements:
//! design → plan skeleton → plan detail → handoff.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use console::style;
use tokio::runtime::Runtime;
use tracing::info;

use crate::cli::progress::{PhaseProgress, StdoutSink};
use crate::cli::ui::Output;
use crate::cli::util::{CommandContext, complexity_from_score, read_requirements, require_initialized};
use crate::config::ConfigLoader;
use crate::pipeline::{PipelineOrchestrator, PipelineOutput, new_run_key};
use crate::types::{PipelineInputs, Result};

/// Run options (consolidated parameters)
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Project name, used in the checkpoint key
    pub name: String,
    /// Requirements file, `-` for stdin
    pub requirements: PathBuf,
    /// LLM provider override
    pub provider: Option<String>,
    /// Model override
    pub model: Option<String>,
    /// Complexity score 1-10
    pub complexity: Option<u8>,
    /// Phase count hint
    pub phases: Option<u32>,
    /// Skip design validation
    pub no_validate: bool,
    /// Echo design, skeleton and handoff tokens as they stream
    pub stream: bool,
    /// Write design.md, plan.md and handoff.md here
    pub output: Option<PathBuf>,
}

pub fn run_with_options(options: RunOptions) -> Result<()> {
    let project_dir = require_initialized()?;
    let mut config = ConfigLoader::load()?;

    // CLI overrides sit on top of every config layer
    if let Some(provider) = &options.provider {
        config.llm.provider = provider.clone();
        config.llm.model = None;
    }
    if let Some(model) = &options.model {
        config.llm.model = Some(model.clone());
    }
    if options.no_validate {
        config.pipeline.validation.enabled = false;
    }
    config.validate()?;

    let requirements = read_requirements(&options.requirements)?;
    let mut inputs = PipelineInputs::new(&options.name, requirements);
    if let Some(score) = options.complexity {
        inputs = inputs.with_complexity(complexity_from_score(score, options.phases)?);
    }

    let context = CommandContext::with_config(project_dir, config)?;
    let orchestrator = configure(context.orchestrator()?, options.stream);
    let key = new_run_key(&options.name);

    let output = Output::new();
    output.header(&format!("Planning {}", options.name));
    output.field("Run key", &key);
    output.field("Provider", orchestrator.provider());
    info!("Requirements: {} chars", inputs.requirements.len());

    let rt = Runtime::new()?;
    match rt.block_on(orchestrator.run_with_key(key.clone(), inputs)) {
        Ok(result) => finish(&result, options.output.as_deref()),
        Err(e) => {
            output.error(&format!("Run failed: {}", e));
            output.info(&format!(
                "Completed stages are checkpointed. Continue with 'planforge resume {}'",
                key
            ));
            Err(e)
        }
    }
}

/// Progress observer and optional token streaming
pub(crate) fn configure(orchestrator: PipelineOrchestrator, stream: bool) -> PipelineOrchestrator {
    let orchestrator = orchestrator.with_observer(Arc::new(PhaseProgress::new()));
    if stream {
        orchestrator.with_sink(Arc::new(StdoutSink))
    } else {
        orchestrator
    }
}

/// Print the run summary and write artifacts when asked
pub(crate) fn finish(result: &PipelineOutput, output_dir: Option<&Path>) -> Result<()> {
    print_result(result);
    if let Some(dir) = output_dir {
        write_artifacts(result, dir)?;
        Output::new().success(&format!("Wrote artifacts to {}", dir.display()));
    }
    Ok(())
}

fn print_result(result: &PipelineOutput) {
    let output = Output::new();
    output.section("Design review");
    match &result.design.review {
        Some(review) => {
            output.field("Outcome", review.outcome.as_str());
            output.field("Iterations", review.iterations);
            output.field("Confidence", format!("{:.0}%", review.confidence * 100.0));
            output.field("Changes", review.changes_applied);
            if review.requires_human_review {
                output.warning(&format!(
                    "Design needs human review: {}",
                    review.remaining_issues.join(", ")
                ));
            }
        }
        None => println!("  (not reviewed)"),
    }

    output.section("Plan");
    for phase in &result.plan.phases {
        println!(
            "  {} {} ({} steps)",
            style(format!("Phase {}:", phase.number)).bold(),
            phase.title,
            phase.steps.len()
        );
    }
    output.field("Steps", result.plan.step_count());

    output.section("Handoff");
    println!("{}", result.handoff.content.trim());
    println!();
    output.success(&format!("Run {} complete", result.key));
}

/// design.md, plan.md, handoff.md and the full output as JSON
pub fn write_artifacts(result: &PipelineOutput, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    fs::write(dir.join("design.md"), &result.design.content)?;
    fs::write(dir.join("plan.md"), result.plan.to_markdown())?;
    fs::write(dir.join("handoff.md"), &result.handoff.content)?;
    fs::write(
        dir.join("output.json"),
        serde_json::to_string_pretty(result)?,
    )?;
    Ok(())
}

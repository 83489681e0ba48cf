//! Checkpoints Command
//!
//! Inspect and manage run checkpoints.
//!
//! Usage:
//!   planforge checkpoints list [-f json]
//!   planforge checkpoints show <key> [-f json]
//!   planforge checkpoints delete <key>
//!   planforge checkpoints prune [--keep N]

use chrono::SecondsFormat;
use console::style;
use tokio::runtime::Runtime;

use crate::cli::ui::Output;
use crate::cli::util::CommandContext;
use crate::pipeline::{CheckpointSummary, PipelineState};
use crate::types::{ForgeError, Result};

pub fn list(format: &str) -> Result<()> {
    let context = CommandContext::load()?;
    let summaries = Runtime::new()?.block_on(context.store.list())?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    if summaries.is_empty() {
        println!("No checkpoints. Start a run with 'planforge run'.");
        return Ok(());
    }

    println!("{}", render_table(&summaries));
    Ok(())
}

fn render_table(summaries: &[CheckpointSummary]) -> String {
    let width = summaries.iter().map(|s| s.key.len()).max().unwrap_or(3).max(3);
    let mut lines = vec![format!(
        "{:<width$}  {:<13}  {:<20}  {}",
        "KEY", "STAGE", "SAVED", "PROVIDER"
    )];
    for summary in summaries {
        lines.push(format!(
            "{:<width$}  {:<13}  {:<20}  {} ({})",
            summary.key,
            summary.stage.as_str(),
            summary.timestamp.format("%Y-%m-%d %H:%M:%S"),
            summary.provider,
            summary.model
        ));
    }
    lines.join("\n")
}

pub fn show(key: &str, format: &str) -> Result<()> {
    let context = CommandContext::load()?;
    let checkpoint = Runtime::new()?
        .block_on(context.store.load(key))?
        .ok_or_else(|| ForgeError::CheckpointNotFound {
            key: key.to_string(),
        })?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&checkpoint)?);
        return Ok(());
    }

    let state = PipelineState::decode(&checkpoint)?;
    let output = Output::new();
    output.header(&checkpoint.key);
    let params = &checkpoint.metadata.stage_params;
    output.field("Project", &state.inputs.project_name);
    output.field("Stage", checkpoint.stage.name());
    output.field(
        "Saved",
        checkpoint.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
    );
    output.field(
        "Provider",
        format!("{} ({})", checkpoint.metadata.provider, checkpoint.metadata.model),
    );
    output.field(
        "Params",
        format!(
            "temperature {}, concurrency {}, swarm design={} detail={}",
            params.temperature,
            params.concurrency,
            params.swarm.enabled_for_design,
            params.swarm.enabled_for_detail
        ),
    );

    output.section("Artifacts");
    if let Some(design) = &state.design {
        let outcome = design
            .review
            .as_ref()
            .map(|r| r.outcome.as_str())
            .unwrap_or("not reviewed");
        println!("  design        {} chars, review {}", design.content.len(), outcome);
    }
    if let Some(skeleton) = &state.skeleton {
        println!("  plan_skeleton {} phases", skeleton.phases.len());
    }
    if let Some(plan) = &state.detailed_plan {
        println!("  plan_detail   {} steps", plan.step_count());
    }
    if let Some(handoff) = &state.handoff {
        println!("  handoff       {} chars", handoff.content.len());
    }

    match checkpoint.stage.next() {
        Some(next) => println!(
            "\n  Next stage: {}. Continue with '{}'",
            next.name(),
            style(format!("planforge resume {}", checkpoint.key)).cyan()
        ),
        None => println!("\n  Run complete."),
    }
    Ok(())
}

pub fn delete(key: &str) -> Result<()> {
    let context = CommandContext::load()?;
    let output = Output::new();
    if Runtime::new()?.block_on(context.store.delete(key))? {
        output.success(&format!("Deleted checkpoint {}", key));
    } else {
        output.warning(&format!("No checkpoint named {}", key));
    }
    Ok(())
}

/// Keep the newest `keep` snapshots per project, config default otherwise
pub fn prune(keep: Option<usize>) -> Result<()> {
    let context = CommandContext::load()?;
    let keep = keep.unwrap_or(context.config.checkpoint.keep_latest);
    let removed = Runtime::new()?.block_on(context.store.prune(keep))?;
    Output::new().success(&format!(
        "Removed {} checkpoint(s), kept the latest {} per project",
        removed, keep
    ));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StageKind;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_render_table() {
        let summaries = vec![CheckpointSummary {
            key: "todo-service--20260101T000000Z-abcd1234".to_string(),
            stage: StageKind::PlanSkeleton,
            timestamp: Utc.with_ymd_and_hms(2026, 1, 1, 12, 30, 0).unwrap(),
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
        }];
        let table = render_table(&summaries);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("KEY"));
        assert!(lines[1].contains("plan_skeleton"));
        assert!(lines[1].contains("2026-01-01 12:30:00"));
        assert!(lines[1].ends_with("openai (gpt-4o)"));
    }
}

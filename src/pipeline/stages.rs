//! Stage helpers: plan skeleton parsing and prompt contexts

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::constants::skeleton::MAX_PHASES;
use crate::pipeline::correction::REQUIRED_SECTIONS;
use crate::types::{
    ComplexityProfile, Design, PhaseOutline, PipelineInputs, PlanSkeleton,
    truncate_chars,
};

/// Characters of design text quoted into each phase prompt
const DESIGN_EXCERPT_CHARS: usize = 3_000;

/// `Phase 2: Title`, `## Phase 2 - Title`, `**Phase 2.** Title`.
/// A separator after the number is required; `Phase 2 depends on ...` is prose.
static PHASE_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[\s#*>\-]*phase\s+(\d+)\s*\**\s*[:.\-–)]+\**\s*(.+?)\s*$")
        .expect("phase heading regex is valid")
});

/// `2. Title`
static NUMBERED_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\s#*]*(\d+)[.)]\s+(.+?)\s*$").expect("numbered heading regex is valid")
});

/// Parse phase headings from a skeleton response.
///
/// Provider numbers only decide duplicates; phases are renumbered
/// 1..n in order of first appearance. `Phase N` lines take precedence
/// over plain numbered lines when both appear.
pub fn parse_skeleton(text: &str) -> PlanSkeleton {
    let phase_lines: Vec<(u32, String)> = text
        .lines()
        .filter_map(|line| capture_heading(&PHASE_HEADING, line))
        .collect();
    let candidates = if phase_lines.is_empty() {
        text.lines()
            .filter_map(|line| capture_heading(&NUMBERED_HEADING, line))
            .collect()
    } else {
        phase_lines
    };

    let mut seen = HashSet::new();
    let mut phases = Vec::new();
    for (suggested, raw_title) in candidates {
        if !seen.insert(suggested) {
            debug!("Dropping repeated phase {} ({})", suggested, raw_title);
            continue;
        }
        if phases.len() == MAX_PHASES {
            warn!("Skeleton exceeds {} phases, truncating", MAX_PHASES);
            break;
        }
        let (title, summary) = split_summary(&raw_title);
        phases.push(PhaseOutline {
            number: phases.len() as u32 + 1,
            title,
            summary,
        });
    }

    PlanSkeleton { phases }
}

fn capture_heading(pattern: &Regex, line: &str) -> Option<(u32, String)> {
    let caps = pattern.captures(line)?;
    let number: u32 = caps[1].parse().ok()?;
    let title = caps[2].trim_matches(|c: char| c == '*' || c.is_whitespace());
    if title.is_empty() {
        return None;
    }
    Some((number, title.to_string()))
}

/// `Title - summary` into its parts
fn split_summary(raw: &str) -> (String, Option<String>) {
    match raw.split_once(" - ") {
        Some((title, summary)) if !title.trim().is_empty() && !summary.trim().is_empty() => {
            (title.trim().to_string(), Some(summary.trim().to_string()))
        }
        _ => (raw.trim().to_string(), None),
    }
}

/// One line per phase, as shown to the detailer
pub fn plan_outline(skeleton: &PlanSkeleton) -> String {
    skeleton
        .phases
        .iter()
        .map(|p| match &p.summary {
            Some(summary) => format!("Phase {}: {} - {}", p.number, p.title, summary),
            None => format!("Phase {}: {}", p.number, p.title),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn design_excerpt(design: &Design) -> String {
    truncate_chars(&design.content, DESIGN_EXCERPT_CHARS)
}

/// Bullet list of required headings for the design prompt
pub fn required_sections() -> String {
    REQUIRED_SECTIONS
        .iter()
        .map(|(name, _)| format!("- ## {}", name))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Complexity used for prompt calibration when none was supplied
pub fn effective_complexity(inputs: &PipelineInputs) -> ComplexityProfile {
    inputs.complexity.clone().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn titles(skeleton: &PlanSkeleton) -> Vec<(u32, &str)> {
        skeleton
            .phases
            .iter()
            .map(|p| (p.number, p.title.as_str()))
            .collect()
    }

    #[test]
    fn test_parse_heading_styles() {
        let text = "Here is the plan:\n\
                    Phase 1: Foundations - repo and CI\n\
                    ## Phase 2 - Storage layer\n\
                    **Phase 3:** API\n\
                    Some commentary.";
        let skeleton = parse_skeleton(text);
        assert_eq!(
            titles(&skeleton),
            vec![(1, "Foundations"), (2, "Storage layer"), (3, "API")]
        );
        assert_eq!(skeleton.phases[0].summary.as_deref(), Some("repo and CI"));
        assert_eq!(skeleton.phases[1].summary, None);
    }

    #[test]
    fn test_numbered_list_fallback() {
        let skeleton = parse_skeleton("1. Setup\n2. Build\n3) Ship");
        assert_eq!(titles(&skeleton), vec![(1, "Setup"), (2, "Build"), (3, "Ship")]);
    }

    #[test]
    fn test_duplicates_dropped_and_renumbered() {
        let text = "Phase 2: Setup\nPhase 5: Build\nPhase 2: Setup again\nPhase 9: Ship";
        let skeleton = parse_skeleton(text);
        assert_eq!(
            titles(&skeleton),
            vec![(1, "Setup"), (2, "Build"), (3, "Ship")]
        );
    }

    #[test]
    fn test_phase_lines_win_over_numbered_steps() {
        let text = "Phase 1: Setup\n1. install tools\n2. configure\nPhase 2: Build";
        let skeleton = parse_skeleton(text);
        assert_eq!(titles(&skeleton), vec![(1, "Setup"), (2, "Build")]);
    }

    #[test]
    fn test_phase_mentions_in_prose_are_not_headings() {
        let text = "Phase 1: Setup\n\
                    - Phase 2 depends on this scaffolding\n\
                    Phase 2: Build API\n\
                    Phase 3: Ship";
        let skeleton = parse_skeleton(text);
        assert_eq!(
            titles(&skeleton),
            vec![(1, "Setup"), (2, "Build API"), (3, "Ship")]
        );
    }

    #[test]
    fn test_phase_heading_separators() {
        let text = "Phase 1) Setup\nPhase 2 – Build\n**Phase 3.** Ship";
        let skeleton = parse_skeleton(text);
        assert_eq!(
            titles(&skeleton),
            vec![(1, "Setup"), (2, "Build"), (3, "Ship")]
        );
    }

    #[test]
    fn test_no_phases() {
        assert!(parse_skeleton("nothing to see").phases.is_empty());
        assert!(parse_skeleton("").phases.is_empty());
    }

    #[test]
    fn test_outline_round_trips_through_parser() {
        let skeleton = parse_skeleton("Phase 1: A - first\nPhase 2: B");
        let outline = plan_outline(&skeleton);
        assert_eq!(outline, "Phase 1: A - first\nPhase 2: B");
        assert_eq!(parse_skeleton(&outline), skeleton);
    }

    #[test]
    fn test_required_sections_listing() {
        let listing = required_sections();
        assert!(listing.starts_with("- ## Overview"));
        assert!(listing.contains("- ## Error Handling"));
    }
}

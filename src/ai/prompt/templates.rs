//! Built-in prompt templates
//!
//! Placeholders use `{{name}}` and are filled by [`super::TemplateSet`].

pub const DESIGN: &str = r#"You are a senior software architect writing a design document.

# Project
{{project_name}}

# Requirements
{{requirements}}

# Calibration
- Complexity score: {{complexity_score}}/10
- Depth: {{depth_level}}

Write the design in Markdown. Use these level-2 headings, in order:
{{required_sections}}

Match the depth to the complexity score. Do not propose infrastructure the
requirements do not need. Do not cite links, packages or products you are
not certain exist.
"#;

pub const PLAN_SKELETON: &str = r#"You are planning the implementation of {{project_name}}.

# Design
{{design}}

Break the work into about {{phase_count}} sequential phases. Output one line
per phase and nothing else, in this exact form:

Phase 1: <title> - <one sentence summary>
Phase 2: <title> - <one sentence summary>
"#;

pub const PLAN_SKELETON_STRICT: &str = r#"List the implementation phases for {{project_name}}.

Design summary:
{{design}}

Output ONLY lines of the form `Phase <number>: <title>`. No preamble, no
Markdown, no blank lines. Use about {{phase_count}} phases.
"#;

pub const PHASE_DETAIL: &str = r#"You are detailing one phase of the implementation plan for {{project_name}}.

# Plan outline
{{plan_outline}}

# Design context
{{design_excerpt}}

# Phase {{phase_number}}: {{phase_title}}
{{phase_summary}}

List the concrete steps for this phase only. Each step starts on its own
line as `{{phase_number}}.<index>: <description>`, followed by optional
detail bullets starting with `- `. Example:

{{phase_number}}.1: Create the project skeleton
- initialise the repository
- add CI configuration
"#;

pub const PHASE_DETAIL_STRICT: &str = r#"Phase {{phase_number}}: {{phase_title}}

Plan outline:
{{plan_outline}}

Respond with steps ONLY. Every step line MUST look exactly like
`{{phase_number}}.1: <description>`, `{{phase_number}}.2: <description>` and so on.
Detail lines start with `- `. No other text.
"#;

pub const PHASE_DETAIL_MINIMAL: &str = r#"Write 3 to 5 steps for phase {{phase_number}} ({{phase_title}}).
Format each line as `{{phase_number}}.<index>: <description>`. Nothing else.
"#;

pub const ARBITER: &str = r#"You are the arbiter for several independent answers to the same task.

# Task
{{prompt}}

# Candidate answers
{{candidates}}

Synthesize the single best answer. Keep what the candidates agree on,
resolve disagreements in favour of the most specific correct answer, and
drop anything unsupported. Follow the output format the task requires.
Output only the final answer.
"#;

pub const HANDOFF: &str = r#"You are preparing a handoff summary for the engineers who will build {{project_name}}.

# Design
{{design}}

# Plan
{{plan}}

Write a concise Markdown summary with these sections: Goal, Key Decisions,
Phase Overview, Risks, First Steps. Reference step numbers from the plan
where useful.
"#;

pub const CORRECT_SECTION: &str = r#"The design document below is missing its "{{section}}" section.

# Requirements
{{requirements}}

# Current design
{{design}}

Write only the body of the "{{section}}" section (no heading). Stay
consistent with the rest of the design.
"#;

pub const SIMPLIFY_SECTION: &str = r#"The following part of a design proposes infrastructure that is too heavy
for a small project ({{patterns}}).

{{paragraph}}

Rewrite it with the simplest approach that still meets the requirements.
Do not mention {{patterns}}. Output only the rewritten text.
"#;

/// Name and body of every built-in template
pub const BUILTIN: &[(&str, &str)] = &[
    ("design", DESIGN),
    ("plan_skeleton", PLAN_SKELETON),
    ("plan_skeleton_strict", PLAN_SKELETON_STRICT),
    ("phase_detail", PHASE_DETAIL),
    ("phase_detail_strict", PHASE_DETAIL_STRICT),
    ("phase_detail_minimal", PHASE_DETAIL_MINIMAL),
    ("arbiter", ARBITER),
    ("handoff", HANDOFF),
    ("correct_section", CORRECT_SECTION),
    ("simplify_section", SIMPLIFY_SECTION),
];

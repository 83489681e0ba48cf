//! Prompt Templates
//!
//! Named templates with `{{key}}` placeholders. The composition root builds
//! one [`TemplateSet`] and hands it down as a [`SharedRenderer`]; nothing
//! reads templates from global state.
//!
//! Project-local overrides live in `.planforge/templates/<name>.md`.

pub mod templates;

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::debug;

use crate::types::{ForgeError, Result};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([a-zA-Z0-9_]+)\s*\}\}").expect("placeholder regex is valid")
});

/// Values substituted into a template
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    values: BTreeMap<String, String>,
}

impl TemplateContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

/// Renders a named template against a context
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, name: &str, context: &TemplateContext) -> Result<String>;
}

pub type SharedRenderer = Arc<dyn TemplateRenderer>;

/// Built-in templates plus optional overrides
#[derive(Debug, Clone)]
pub struct TemplateSet {
    templates: HashMap<String, String>,
}

impl Default for TemplateSet {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TemplateSet {
    pub fn builtin() -> Self {
        Self {
            templates: templates::BUILTIN
                .iter()
                .map(|(name, body)| (name.to_string(), body.to_string()))
                .collect(),
        }
    }

    /// Replace or add a template
    pub fn with_template(mut self, name: &str, body: impl Into<String>) -> Self {
        self.templates.insert(name.to_string(), body.into());
        self
    }

    /// Overlay `<name>.md` files from `dir`; a missing directory is not an error
    pub fn with_overrides_from(mut self, dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Ok(self);
        }
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            if let Some(name) = path.file_stem().and_then(|s| s.to_str()) {
                debug!("Template override: {} ({})", name, path.display());
                let body = fs::read_to_string(&path)?;
                self.templates.insert(name.to_string(), body);
            }
        }
        Ok(self)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl TemplateRenderer for TemplateSet {
    fn render(&self, name: &str, context: &TemplateContext) -> Result<String> {
        let body = self
            .templates
            .get(name)
            .ok_or_else(|| ForgeError::Template(format!("Unknown template: {}", name)))?;

        let mut missing = Vec::new();
        let rendered = PLACEHOLDER.replace_all(body, |caps: &regex::Captures<'_>| {
            let key = &caps[1];
            match context.get(key) {
                Some(value) => value.to_string(),
                None => {
                    missing.push(key.to_string());
                    String::new()
                }
            }
        });

        if !missing.is_empty() {
            missing.dedup();
            return Err(ForgeError::Template(format!(
                "Template '{}' is missing values for: {}",
                name,
                missing.join(", ")
            )));
        }

        Ok(rendered.into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_render_substitutes_placeholders() {
        let set = TemplateSet::builtin().with_template("greet", "Hello {{ name }}, {{name}}!");
        let out = set
            .render("greet", &TemplateContext::new().with("name", "Ada"))
            .unwrap();
        assert_eq!(out, "Hello Ada, Ada!");
    }

    #[test]
    fn test_render_reports_missing_values() {
        let set = TemplateSet::builtin();
        let err = set
            .render("arbiter", &TemplateContext::new().with("prompt", "x"))
            .unwrap_err();
        assert!(err.to_string().contains("candidates"));
        assert!(set.render("nope", &TemplateContext::new()).is_err());
    }

    #[test]
    fn test_builtin_names() {
        let set = TemplateSet::builtin();
        for name in [
            "design",
            "plan_skeleton",
            "plan_skeleton_strict",
            "phase_detail",
            "phase_detail_strict",
            "phase_detail_minimal",
            "arbiter",
            "handoff",
            "correct_section",
            "simplify_section",
        ] {
            assert!(set.names().contains(&name), "missing {}", name);
        }
    }

    #[test]
    fn test_overrides_from_dir() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("handoff.md"), "Custom {{project_name}}").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let set = TemplateSet::builtin()
            .with_overrides_from(dir.path())
            .unwrap();
        let out = set
            .render("handoff", &TemplateContext::new().with("project_name", "X"))
            .unwrap();
        assert_eq!(out, "Custom X");
        assert!(!set.names().contains(&"notes"));

        let missing = TemplateSet::builtin()
            .with_overrides_from(&dir.path().join("absent"))
            .unwrap();
        assert_eq!(missing.names().len(), templates::BUILTIN.len());
    }
}

//! Configuration Loader (Figment-based)
//!
//! Loads and merges configuration from multiple sources using Figment:
//! 1. Built-in defaults (Serialized)
//! 2. Global config (~/.config/planforge/config.toml)
//! 3. Project config (.planforge/config.toml)
//! 4. Environment variables (PLANFORGE_* prefix, `__` between sections)

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::types::Config;
use crate::types::{ForgeError, Result};

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with full resolution chain using Figment:
    /// defaults → global → project → env vars
    pub fn load() -> Result<Config> {
        Self::load_with_project(&Self::project_config_path())
    }

    /// Same chain with an explicit project config file
    pub fn load_with_project(project_path: &Path) -> Result<Config> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if let Some(global_path) = Self::global_config_path()
            && global_path.exists()
        {
            debug!("Loading global config from: {}", global_path.display());
            figment = figment.merge(Toml::file(&global_path));
        }

        if project_path.exists() {
            debug!("Loading project config from: {}", project_path.display());
            figment = figment.merge(Toml::file(project_path));
        }

        // PLANFORGE_LLM__MODEL -> llm.model, PLANFORGE_PIPELINE__SWARM__DRONES -> pipeline.swarm.drones
        figment = figment.merge(Env::prefixed("PLANFORGE_").split("__").lowercase(true));

        let config: Config = figment
            .extract()
            .map_err(|e| ForgeError::Config(format!("Configuration error: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file only
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| ForgeError::Config(format!("Configuration error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    // =========================================================================
    // Path Management
    // =========================================================================

    /// Get path to global config directory (~/.config/planforge/)
    pub fn global_dir() -> Option<PathBuf> {
        env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                env::var("HOME")
                    .ok()
                    .map(|home| PathBuf::from(home).join(".config"))
            })
            .map(|p| p.join("planforge"))
    }

    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_dir().map(|dir| dir.join("config.toml"))
    }

    pub fn project_config_path() -> PathBuf {
        Self::project_dir().join("config.toml")
    }

    /// Get project data directory
    pub fn project_dir() -> PathBuf {
        PathBuf::from(".planforge")
    }

    // =========================================================================
    // Config Commands
    // =========================================================================

    /// Show config file paths
    pub fn show_path() {
        println!("Configuration paths:");
        println!();

        if let Some(global) = Self::global_config_path() {
            let exists = if global.exists() { "✓" } else { "✗" };
            println!("  Global:  {} {}", exists, global.display());
        } else {
            println!("  Global:  (not available)");
        }

        let project = Self::project_config_path();
        let exists = if project.exists() { "✓" } else { "✗" };
        println!("  Project: {} {}", exists, project.display());
    }

    /// Render the effective configuration as toml, json or yaml
    pub fn render_config(config: &Config, format: &str) -> Result<String> {
        match format {
            "json" => Ok(serde_json::to_string_pretty(config)?),
            "yaml" => Ok(serde_yaml::to_string(config)?),
            "toml" => toml::to_string_pretty(config).map_err(|e| ForgeError::Config(e.to_string())),
            other => Err(ForgeError::Config(format!(
                "Unknown format: {}. Supported: toml, json, yaml",
                other
            ))),
        }
    }

    // =========================================================================
    // Initialization
    // =========================================================================

    /// Initialize global configuration
    pub fn init_global(force: bool) -> Result<PathBuf> {
        let global_dir = Self::global_dir().ok_or_else(|| {
            ForgeError::Config("Cannot determine global config directory".to_string())
        })?;

        fs::create_dir_all(&global_dir)?;

        let config_path = global_dir.join("config.toml");
        if !config_path.exists() || force {
            fs::write(&config_path, Self::default_global_config())?;
            info!("Created global config: {}", config_path.display());
        } else {
            info!("Global config exists: {}", config_path.display());
        }

        Ok(global_dir)
    }

    /// Initialize project configuration under `root`
    pub fn init_project(root: &Path) -> Result<PathBuf> {
        let project_dir = root.join(Self::project_dir());

        fs::create_dir_all(&project_dir)?;
        fs::create_dir_all(project_dir.join("checkpoints"))?;

        let config_path = project_dir.join("config.toml");
        if !config_path.exists() {
            fs::write(&config_path, Self::default_project_config())?;
            info!("Created project config: {}", config_path.display());
        }

        Ok(project_dir)
    }

    // =========================================================================
    // Internal
    // =========================================================================

    fn default_global_config() -> String {
        r#"# Planforge Global Configuration
# User-wide defaults. Project settings in .planforge/config.toml override these.

version = "1.0"

[llm]
provider = "claude-code"
timeout_secs = 300
temperature = 0.4
max_tokens = 4096
"#
        .to_string()
    }

    fn default_project_config() -> String {
        r#"# Planforge Project Configuration
# Project-specific settings that override global defaults.

version = "1.0"

# Per-stage overrides (design, plan, handoff)
# [stages.handoff]
# provider = "ollama"
# model = "llama3.2"

[pipeline]
concurrency = 5

[pipeline.swarm]
enabled_for_design = false
enabled_for_detail = false
drones = 3
temperature = 0.7
jitter = true

[pipeline.validation]
enabled = true
max_iterations = 3
confidence_threshold = 0.8

[checkpoint]
backend = "file"
dir = ".planforge/checkpoints"
keep_latest = 3
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CheckpointBackend;
    use tempfile::TempDir;

    #[test]
    fn test_default_templates_parse() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        fs::write(&path, ConfigLoader::default_project_config()).unwrap();
        let project = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(project.pipeline.concurrency, 5);
        assert_eq!(project.checkpoint.backend, CheckpointBackend::File);

        fs::write(&path, ConfigLoader::default_global_config()).unwrap();
        let global = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(global.llm.provider, "claude-code");
    }

    #[test]
    fn test_load_from_file_overrides() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[llm]
provider = "ollama"
model = "llama3.2"

[stages.handoff]
provider = "openai"

[checkpoint]
backend = "sqlite"
"#,
        )
        .unwrap();

        let config = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(config.llm.provider, "ollama");
        assert_eq!(config.llm.model.as_deref(), Some("llama3.2"));
        assert_eq!(
            config.stages.handoff.as_ref().unwrap().provider.as_deref(),
            Some("openai")
        );
        assert_eq!(config.checkpoint.backend, CheckpointBackend::Sqlite);
        // untouched sections keep defaults
        assert_eq!(config.pipeline.swarm.drones, 3);
    }

    #[test]
    fn test_load_from_file_rejects_invalid() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "[pipeline]\nconcurrency = 0\n").unwrap();

        assert!(matches!(
            ConfigLoader::load_from_file(&path),
            Err(ForgeError::Config(_))
        ));
    }

    #[test]
    fn test_init_project() {
        let temp_dir = TempDir::new().unwrap();

        let dir = ConfigLoader::init_project(temp_dir.path()).unwrap();

        assert!(dir.join("config.toml").exists());
        assert!(dir.join("checkpoints").is_dir());
    }

    #[test]
    fn test_env_override() {
        let temp_dir = TempDir::new().unwrap();
        // SAFETY: no other test reads this variable
        unsafe {
            std::env::set_var("PLANFORGE_CHECKPOINT__KEEP_LATEST", "7");
        }
        let config = ConfigLoader::load_with_project(&temp_dir.path().join("missing.toml"));
        unsafe {
            std::env::remove_var("PLANFORGE_CHECKPOINT__KEEP_LATEST");
        }
        assert_eq!(config.unwrap().checkpoint.keep_latest, 7);
    }

    #[test]
    fn test_render_config_formats() {
        let config = Config::default();
        assert!(
            ConfigLoader::render_config(&config, "toml")
                .unwrap()
                .contains("[llm]")
        );
        assert!(
            ConfigLoader::render_config(&config, "json")
                .unwrap()
                .contains("\"llm\"")
        );
        assert!(
            ConfigLoader::render_config(&config, "yaml")
                .unwrap()
                .contains("llm:")
        );
        assert!(ConfigLoader::render_config(&config, "ini").is_err());
    }
}

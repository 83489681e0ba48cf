//! Planforge - Resumable LLM Planning Pipeline
//!
//! Turns free-form requirements into a validated design document, a phased
//! implementation plan and a handoff summary, checkpointing after every
//! stage so interrupted runs resume where they stopped.
//!
//! ## Core Features
//!
//! - **Four-stage pipeline**: design → plan skeleton → plan detail → handoff
//! - **Checkpoint/Resume**: file or SQLite snapshots keyed per run
//! - **Bounded fan-out**: phases detailed concurrently behind a semaphore
//! - **Swarm consensus**: optional drones at spread temperatures plus an arbiter
//! - **Self-correction**: rule-based design validation with targeted repairs
//! - **Provider switching**: claude-code, OpenAI or Ollama, per stage if needed
//!
//! ## Quick Start
//!
//! ```ignore
//! use planforge::{ConfigLoader, PipelineInputs, PipelineOrchestrator, TemplateSet};
//! use planforge::ai::client_factory;
//! use planforge::pipeline::open_store;
//!
//! let config = ConfigLoader::load()?;
//! let orchestrator = PipelineOrchestrator::from_config(
//!     &config,
//!     client_factory(None),
//!     open_store(&config.checkpoint)?,
//!     Arc::new(TemplateSet::builtin()),
//! )?;
//! let output = orchestrator
//!     .run_full(PipelineInputs::new("todo-service", requirements))
//!     .await?;
//! println!("{}", output.plan.to_markdown());
//! ```
//!
//! ## Modules
//!
//! - [`ai`]: generation clients, prompt templates, streaming, timeouts
//! - [`pipeline`]: orchestrator, stages, gate, swarm, correction, checkpoints
//! - [`storage`]: SQLite persistence with connection pooling
//! - [`config`]: layered configuration

pub mod ai;
pub mod cli;
pub mod config;
pub mod constants;
pub mod pipeline;
pub mod storage;
pub mod types;

// =============================================================================
// Core Re-exports
// =============================================================================

// Configuration
pub use config::{CheckpointBackend, Config, ConfigLoader};

// Error Types
pub use types::error::{ErrorCategory, ForgeError, Result, ResultExt};

// Artifacts
pub use types::{
    ComplexityProfile, Design, DesignReview, DetailedPlan, HandoffSummary, Phase,
    PipelineInputs, PlanSkeleton, StageKind, Step,
};

// Storage
pub use storage::database::PoolConfig;
pub use storage::{Database, SharedDatabase};

// =============================================================================
// Pipeline Re-exports
// =============================================================================

pub use pipeline::{
    Checkpoint, CheckpointStore, ConcurrencyGate, CorrectionLoop, FileCheckpointStore, HiveMind,
    PhaseDetailer, PipelineOrchestrator, PipelineOutput, PipelineParams, PipelineState,
    SqliteCheckpointStore,
};

// =============================================================================
// AI Re-exports
// =============================================================================

pub use ai::{
    GenerationClient, GenerationParams, LlmResponse, SharedClient, TemplateSet, TokenSink,
    with_timeout,
};

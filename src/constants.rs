//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// Generation client defaults
pub mod llm {
    /// Request timeout (seconds)
    pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

    /// Base temperature for stage calls
    pub const DEFAULT_TEMPERATURE: f32 = 0.4;

    /// Token budget per call
    pub const DEFAULT_MAX_TOKENS: usize = 4096;

    /// Capacity of the token streaming channel
    pub const STREAM_CHANNEL_CAPACITY: usize = 256;
}

/// Retry policy constants
pub mod retry {
    /// Backoff multiplier
    pub const BACKOFF_FACTOR: f32 = 2.0;

    /// Jitter as a fraction of the computed delay
    pub const JITTER_RATIO: f64 = 0.25;
}

/// Concurrency gate constants
pub mod gate {
    /// Default number of in-flight generation calls
    pub const DEFAULT_CONCURRENCY: usize = 5;
}

/// Swarm and arbiter constants
pub mod swarm {
    /// Default drone count
    pub const DEFAULT_DRONES: usize = 3;

    /// Upper bound on drones accepted from configuration
    pub const MAX_DRONES: usize = 16;

    /// Default base drone temperature
    pub const DEFAULT_TEMPERATURE: f32 = 0.7;

    /// Total temperature spread across drones (base -0.2 .. base +0.2)
    pub const JITTER_SPREAD: f32 = 0.4;

    /// Temperature bounds accepted by providers
    pub const MIN_TEMPERATURE: f32 = 0.0;
    pub const MAX_TEMPERATURE: f32 = 2.0;

    /// Arbiter synthesis temperature
    pub const ARBITER_TEMPERATURE: f32 = 0.2;
}

/// Phase detailing constants
pub mod detail {
    /// Re-prompts after an unparseable response
    pub const MAX_RETRIES: usize = 2;

    /// Pinned temperature for re-prompts
    pub const RETRY_TEMPERATURE: f32 = 0.2;

    /// Token caps for the first and second re-prompt
    pub const RETRY_MAX_TOKENS: [usize; 2] = [1024, 512];

    /// Step description used when every attempt failed to parse
    pub const PLACEHOLDER_STEP: &str = "Implement phase requirements";
}

/// Plan skeleton constants
pub mod skeleton {
    /// Upper bound on phases accepted from one skeleton response
    pub const MAX_PHASES: usize = 20;
}

/// Validation and correction constants
pub mod correction {
    /// Validating passes before the loop gives up
    pub const MAX_ITERATIONS: u32 = 3;

    /// Confidence a valid artifact must exceed to converge
    pub const CONFIDENCE_THRESHOLD: f32 = 0.8;

    /// Confidence penalties per issue severity
    pub const ERROR_PENALTY: f32 = 0.25;
    pub const WARNING_PENALTY: f32 = 0.1;
    pub const INFO_PENALTY: f32 = 0.02;

    /// Complexity score at or above which scalability must be discussed
    pub const SCALABILITY_SCORE: u8 = 7;

    /// Complexity score at or below which distributed patterns are over-engineering
    pub const SIMPLE_PROJECT_SCORE: u8 = 3;

    /// Temperature for correction calls
    pub const CORRECTION_TEMPERATURE: f32 = 0.3;

    /// Token budget for a generated section
    pub const SECTION_MAX_TOKENS: usize = 1500;
}

/// Checkpoint storage constants
pub mod checkpoint {
    /// Stored record format version
    pub const FORMAT_VERSION: u32 = 1;

    /// Separator between project slug and run id in keys
    pub const KEY_SEPARATOR: &str = "--";

    /// Default file backend directory
    pub const DEFAULT_DIR: &str = ".planforge/checkpoints";

    /// Default sqlite backend database
    pub const DEFAULT_DATABASE: &str = ".planforge/planforge.db";

    /// Snapshots kept per project when pruning
    pub const DEFAULT_KEEP_LATEST: usize = 3;
}

/// Database constants
pub mod database {
    /// Default connection pool size
    pub const DEFAULT_POOL_SIZE: u32 = 4;

    /// Connection timeout (seconds)
    pub const CONNECTION_TIMEOUT_SECS: u64 = 30;

    /// SQLite busy timeout (milliseconds)
    pub const BUSY_TIMEOUT_MS: u32 = 5000;
}

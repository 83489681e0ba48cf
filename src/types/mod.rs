pub mod artifact;
pub mod error;
pub mod stage;
pub mod utils;

pub use artifact::*;
pub use error::{ErrorCategory, ErrorClassifier, ForgeError, LlmError, Result, ResultExt};
pub use stage::StageKind;
pub use utils::{log_filter_warn, slugify, truncate_chars};

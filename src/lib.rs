pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use adapters::{GeminiClient, JsonlInteractionStore, LocalStorage};
#[cfg(feature = "cli")]
pub use config::{CliConfig, Command};
pub use config::RunConfig;

pub use crate::core::batch::{BatchJobRunner, BatchSummary, CancellationFlag, JobExecutor};
pub use crate::core::canonicalise::SkillCanonicaliser;
pub use crate::core::merge::MergeStep;
pub use crate::core::taxonomy::Taxonomy;
pub use utils::error::{CanonError, Result};

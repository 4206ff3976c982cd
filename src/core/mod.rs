pub mod batch;
pub mod canonicalise;
pub mod enrich;
pub mod envelope;
pub mod export;
pub mod fenced;
pub mod merge;
pub mod merge_validator;
pub mod skill_validator;
pub mod taxonomy;

pub use crate::domain::model::{
    BatchReport, ExportRow, JobResult, MergeJob, MergeOutcomeRecord, ResponseEnvelope,
    SkillRequest, SkillValidationRecord,
};
pub use crate::domain::ports::{GenerationClient, InteractionStore, PromptConfig, Storage};
pub use crate::utils::error::Result;

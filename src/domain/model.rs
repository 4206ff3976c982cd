use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

use crate::utils::error::{CanonError, Result};

/// 待驗證的技能名稱清單，保證非空
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SkillRequest {
    skills: Vec<String>,
}

impl SkillRequest {
    pub fn new(skills: Vec<String>) -> Result<Self> {
        if skills.is_empty() {
            return Err(CanonError::Precondition {
                message: "Skills array cannot be empty".to_string(),
            });
        }
        Ok(Self { skills })
    }

    /// Builds a request from arbitrary JSON, rejecting anything that is not a
    /// non-empty array of strings.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let items = value.as_array().ok_or_else(|| CanonError::Precondition {
            message: "Skills must be an array".to_string(),
        })?;

        let skills = items
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| CanonError::Precondition {
                message: "All skills must be strings".to_string(),
            })?;

        Self::new(skills)
    }

    pub fn skills(&self) -> &[String] {
        &self.skills
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillRef {
    pub skill_id: String,
    pub skill_name: String,
}

/// One unit of reconciliation work: the valid skills of a single
/// (domain, cluster) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeJob {
    pub domain_id: u32,
    pub cluster_id: u32,
    pub domain: String,
    pub cluster: String,
    pub skills: Vec<SkillRef>,
}

impl MergeJob {
    /// Skill ids in submission order.
    pub fn input_ids(&self) -> Vec<&str> {
        self.skills.iter().map(|s| s.skill_id.as_str()).collect()
    }

    /// 送往生成 API 的 JSON 內容
    pub fn payload(&self) -> serde_json::Value {
        serde_json::json!({
            "domain": self.domain,
            "sub_domain": self.cluster,
            "skills": self.skills,
        })
    }

    pub fn output_filename(&self) -> String {
        cluster_filename(self.domain_id, self.cluster_id)
    }

    pub fn label(&self) -> String {
        format!("{} → {}", self.domain, self.cluster)
    }
}

/// Raw answer of the generation API. Never mutated by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub body: serde_json::Value,
    pub status: u16,
}

impl ResponseEnvelope {
    pub fn new(body: serde_json::Value, status: u16) -> Self {
        Self { body, status }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// `error.message` of an API error body, when present.
    pub fn error_message(&self) -> Option<&str> {
        self.body.pointer("/error/message").and_then(|m| m.as_str())
    }

    /// Non-2xx envelopes become `Transport { kind: "http_status" }`.
    pub fn ensure_success(&self) -> Result<()> {
        if self.is_success() {
            return Ok(());
        }
        let message = match self.error_message() {
            Some(detail) => format!("Generation API responded with status {}: {}", self.status, detail),
            None => format!("Generation API responded with status {}", self.status),
        };
        Err(CanonError::Transport {
            kind: "http_status".to_string(),
            message,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillValidationRecord {
    pub original_input: String,
    pub canonical_name: String,
    pub is_valid: bool,
    pub requires_review: bool,
    #[serde(default)]
    pub review_reason: String,
    #[serde(default)]
    pub clusters: BTreeSet<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    KeepCanonical,
    Merge,
    Uncertain,
}

impl Outcome {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Outcome::KeepCanonical),
            2 => Some(Outcome::Merge),
            3 => Some(Outcome::Uncertain),
            _ => None,
        }
    }

    pub fn id(self) -> u8 {
        match self {
            Outcome::KeepCanonical => 1,
            Outcome::Merge => 2,
            Outcome::Uncertain => 3,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Outcome::KeepCanonical => "Keep as canonical",
            Outcome::Merge => "Merge with another skill",
            Outcome::Uncertain => "Uncertain - needs review",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOutcomeRecord {
    pub skill_id: String,
    pub outcome_id: u8,
    #[serde(default)]
    pub merge_with_skill_id: String,
    #[serde(default)]
    pub reason: String,
}

impl MergeOutcomeRecord {
    pub fn outcome(&self) -> Option<Outcome> {
        Outcome::from_id(self.outcome_id)
    }

    /// Trimmed merge target, `None` when blank.
    pub fn merge_target(&self) -> Option<&str> {
        let target = self.merge_with_skill_id.trim();
        (!target.is_empty()).then_some(target)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobResult {
    Success { records: Vec<MergeOutcomeRecord> },
    ValidationFailure { reason: String },
    Exception { message: String, kind: String },
}

impl JobResult {
    pub fn is_success(&self) -> bool {
        matches!(self, JobResult::Success { .. })
    }

    pub fn status_label(&self) -> &'static str {
        match self {
            JobResult::Success { .. } => "SUCCESS",
            JobResult::ValidationFailure { .. } => "VALIDATION FAILED",
            JobResult::Exception { .. } => "EXCEPTION",
        }
    }

    /// Failure reason or exception message; `None` on success.
    pub fn failure_message(&self) -> Option<&str> {
        match self {
            JobResult::Success { .. } => None,
            JobResult::ValidationFailure { reason } => Some(reason),
            JobResult::Exception { message, .. } => Some(message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobEntry {
    pub domain_id: u32,
    pub cluster_id: u32,
    pub domain: String,
    pub cluster: String,
    pub skills_count: usize,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
    pub result: JobResult,
}

impl JobEntry {
    pub fn output_filename(&self) -> String {
        cluster_filename(self.domain_id, self.cluster_id)
    }
}

fn cluster_filename(domain_id: u32, cluster_id: u32) -> String {
    format!("skills_details_domain_{}_cluster_{}.csv", domain_id, cluster_id)
}

/// 批次執行的最終產出，依提交順序每個 job 一筆
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub entries: Vec<JobEntry>,
    pub interrupted: bool,
}

impl BatchReport {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn successes(&self) -> impl Iterator<Item = (&JobEntry, &[MergeOutcomeRecord])> {
        self.entries.iter().filter_map(|entry| match &entry.result {
            JobResult::Success { records } => Some((entry, records.as_slice())),
            _ => None,
        })
    }
}

/// Denormalised row of the validation export surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRow {
    pub original_input: String,
    pub canonical_name: String,
    pub is_valid: bool,
    pub requires_review: bool,
    pub review_reason: String,
    pub clusters: Vec<u32>,
    pub cluster_names: Vec<String>,
    pub domain_ids: Vec<u32>,
    pub domain_names: Vec<String>,
}

mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }
}

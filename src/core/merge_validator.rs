//! Reconciles a merge answer against the job that produced it.
//!
//! The check works over the job's own identifier space: every input skill
//! must be accounted for, and a skill may only be merged into another skill of
//! the same job. Validation is stateless, so re-validating the same pair
//! always yields the same result.

use crate::domain::model::{MergeJob, MergeOutcomeRecord};
use crate::utils::error::{CanonError, Result};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy)]
pub struct MergeResultValidator {
    reject_unknown_ids: bool,
}

impl Default for MergeResultValidator {
    fn default() -> Self {
        Self {
            reject_unknown_ids: true,
        }
    }
}

impl MergeResultValidator {
    pub fn new(reject_unknown_ids: bool) -> Self {
        Self { reject_unknown_ids }
    }

    pub fn validate(&self, job: &MergeJob, records: &[MergeOutcomeRecord]) -> Result<()> {
        let input_ids = job.input_ids();
        if input_ids.is_empty() {
            return Err(CanonError::ValidationError {
                message: "No input skill IDs available for validation".to_string(),
            });
        }

        let input_set: HashSet<&str> = input_ids.iter().copied().collect();
        let output_ids = unique_in_order(records.iter().map(|r| r.skill_id.as_str()));
        let output_set: HashSet<&str> = output_ids.iter().copied().collect();

        let mut violations = Vec::new();

        let missing: Vec<&str> = input_ids
            .iter()
            .copied()
            .filter(|id| !output_set.contains(id))
            .collect();
        if !missing.is_empty() {
            violations.push(format!(
                "Missing skills in output: {} (Expected: {}, Got: {})",
                missing.join(", "),
                input_ids.join(", "),
                output_ids.join(", ")
            ));
        }

        if self.reject_unknown_ids {
            let unknown: Vec<&str> = output_ids
                .iter()
                .copied()
                .filter(|id| !input_set.contains(id))
                .collect();
            if !unknown.is_empty() {
                violations.push(format!(
                    "Unknown skills in output: {} (Expected: {})",
                    unknown.join(", "),
                    input_ids.join(", ")
                ));
            }
        }

        let invalid_targets: Vec<String> = records
            .iter()
            .filter_map(|record| {
                let target = record.merge_target()?;
                (!input_set.contains(target))
                    .then(|| format!("Skill {} -> '{}'", record.skill_id, target))
            })
            .collect();
        if !invalid_targets.is_empty() {
            violations.push(format!(
                "Invalid merge targets found: {}. Valid targets are: {}",
                invalid_targets.join(", "),
                input_ids.join(", ")
            ));
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(CanonError::ValidationError {
                message: violations.join("; "),
            })
        }
    }
}

fn unique_in_order<'a>(ids: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    ids.filter(|id| seen.insert(*id)).collect()
}

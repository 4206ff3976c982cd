use crate::core::envelope::EnvelopeTextExtractor;
use crate::core::fenced::{ContentMode, FencedContentParser, ParsedRecords};
use crate::core::skill_validator::SkillRecordValidator;
use crate::core::taxonomy::Taxonomy;
use crate::domain::model::{ExportRow, MergeOutcomeRecord, SkillValidationRecord};
use crate::domain::ports::{InteractionFlow, InteractionStore};
use crate::utils::error::{CanonError, Result};
use serde::Serialize;
use std::collections::HashMap;

pub const VALIDATION_HEADERS: [&str; 9] = [
    "Original Input",
    "Canonical Name",
    "Is Valid",
    "Requires Review",
    "Review Reason",
    "Clusters",
    "Cluster Names",
    "Domain IDs",
    "Domain Names",
];

pub const MERGE_HEADERS: [&str; 4] = ["skill_id", "outcome_id", "merge_with_skill_id", "reason"];

const MULTI_VALUE_SEPARATOR: &str = "; ";

fn join<T: ToString>(values: &[T]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(MULTI_VALUE_SEPARATOR)
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<String> {
    let bytes = writer
        .into_inner()
        .map_err(|e| CanonError::IoError(e.into_error()))?;
    String::from_utf8(bytes)
        .map_err(|e| CanonError::IoError(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}

/// 驗證結果匯出，多值欄位以 "; " 串接
pub fn validation_csv(rows: &[ExportRow]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(VALIDATION_HEADERS)?;

    for row in rows {
        writer.write_record([
            row.original_input.clone(),
            row.canonical_name.clone(),
            row.is_valid.to_string(),
            row.requires_review.to_string(),
            row.review_reason.clone(),
            join(&row.clusters),
            join(&row.cluster_names),
            join(&row.domain_ids),
            join(&row.domain_names),
        ])?;
    }

    finish(writer)
}

pub fn merge_csv(records: &[MergeOutcomeRecord]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(MERGE_HEADERS)?;

    for record in records {
        let outcome_id = record.outcome_id.to_string();
        writer.write_record([
            record.skill_id.as_str(),
            outcome_id.as_str(),
            record.merge_with_skill_id.trim(),
            record.reason.as_str(),
        ])?;
    }

    finish(writer)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationStatistics {
    pub total_skills: usize,
    pub valid_skills: usize,
    pub invalid_skills: usize,
    pub review_needed: usize,
    pub validation_rate: f64,
    /// (cluster id, number of valid skills tagged with it), most frequent first.
    pub cluster_distribution: Vec<(u32, usize)>,
}

impl ValidationStatistics {
    pub fn from_records(records: &[SkillValidationRecord]) -> Self {
        if records.is_empty() {
            return Self::default();
        }

        let valid_skills = records.iter().filter(|r| r.is_valid).count();
        let review_needed = records.iter().filter(|r| r.requires_review).count();

        let mut counts: HashMap<u32, usize> = HashMap::new();
        for record in records.iter().filter(|r| r.is_valid) {
            for &cluster in &record.clusters {
                *counts.entry(cluster).or_default() += 1;
            }
        }
        let mut cluster_distribution: Vec<(u32, usize)> = counts.into_iter().collect();
        cluster_distribution.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        Self {
            total_skills: records.len(),
            valid_skills,
            invalid_skills: records.len() - valid_skills,
            review_needed,
            validation_rate: valid_skills as f64 / records.len() as f64,
            cluster_distribution,
        }
    }
}

/// Re-parses stored validation interactions (2xx only) and concatenates their
/// records. `latest` limits the scan to the N most recent stored interactions,
/// failed ones included. Interactions that cannot be parsed are skipped.
pub async fn historical_records<S: InteractionStore>(
    store: &S,
    taxonomy: &Taxonomy,
    latest: Option<usize>,
) -> Result<Vec<SkillValidationRecord>> {
    let stored = match latest {
        Some(count) => store.recent(count).await?,
        None => store.all().await?,
    };
    let interactions: Vec<_> = stored
        .into_iter()
        .filter(|i| i.flow == InteractionFlow::Validation && i.is_successful())
        .collect();

    let extractor = EnvelopeTextExtractor::default();
    let validator = SkillRecordValidator::new(taxonomy);
    let mut records = Vec::new();

    for interaction in &interactions {
        let Some(text) = extractor.extract(&interaction.response_body) else {
            tracing::warn!("⚠️ Interaction {} has no text content, skipped", interaction.id.0);
            continue;
        };

        match FencedContentParser.parse(&text, ContentMode::Json) {
            Ok(ParsedRecords::Json(answer)) => {
                let parse = validator.validate_all(&answer);
                if !parse.rejected.is_empty() {
                    tracing::warn!(
                        "⚠️ Interaction {}: {} records rejected",
                        interaction.id.0,
                        parse.rejected.len()
                    );
                }
                records.extend(parse.records);
            }
            Ok(ParsedRecords::Csv(_)) => {}
            Err(e) => {
                tracing::warn!("⚠️ Failed to parse interaction {}: {}", interaction.id.0, e);
            }
        }
    }

    tracing::debug!(
        "Collected {} historical records from {} interactions",
        records.len(),
        interactions.len()
    );
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn record(input: &str, valid: bool, review: bool, clusters: &[u32]) -> SkillValidationRecord {
        SkillValidationRecord {
            original_input: input.to_string(),
            canonical_name: input.to_string(),
            is_valid: valid,
            requires_review: review,
            review_reason: String::new(),
            clusters: clusters.iter().copied().collect::<BTreeSet<_>>(),
        }
    }

    #[test]
    fn test_validation_csv_layout() {
        let rows = vec![ExportRow {
            original_input: "GDPR".to_string(),
            canonical_name: "GDPR".to_string(),
            is_valid: true,
            requires_review: false,
            review_reason: String::new(),
            clusters: vec![4, 23],
            cluster_names: vec![
                "Cybersecurity & Information Security".to_string(),
                "Legal, Risk & Compliance".to_string(),
            ],
            domain_ids: vec![1, 4],
            domain_names: vec![
                "Technology & IT".to_string(),
                "Business, Finance & Legal".to_string(),
            ],
        }];

        let csv_text = validation_csv(&rows).unwrap();
        let mut lines = csv_text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "Original Input,Canonical Name,Is Valid,Requires Review,Review Reason,Clusters,Cluster Names,Domain IDs,Domain Names"
        );
        assert_eq!(
            lines.next().unwrap(),
            "GDPR,GDPR,true,false,,4; 23,\"Cybersecurity & Information Security; Legal, Risk & Compliance\",1; 4,\"Technology & IT; Business, Finance & Legal\""
        );
    }

    #[test]
    fn test_merge_csv_header_even_when_empty() {
        assert_eq!(
            merge_csv(&[]).unwrap(),
            "skill_id,outcome_id,merge_with_skill_id,reason\n"
        );

        let csv_text = merge_csv(&[MergeOutcomeRecord {
            skill_id: "2".to_string(),
            outcome_id: 2,
            merge_with_skill_id: " 1 ".to_string(),
            reason: "Same skill, different casing".to_string(),
        }])
        .unwrap();
        assert!(csv_text.ends_with("2,2,1,\"Same skill, different casing\"\n"));
    }

    #[test]
    fn test_statistics() {
        let stats = ValidationStatistics::from_records(&[
            record("Python", true, false, &[1, 3]),
            record("SQL", true, true, &[3]),
            record("Synergy", false, false, &[]),
            record("Hindi", true, false, &[37]),
        ]);

        assert_eq!(stats.total_skills, 4);
        assert_eq!(stats.valid_skills, 3);
        assert_eq!(stats.invalid_skills, 1);
        assert_eq!(stats.review_needed, 1);
        assert!((stats.validation_rate - 0.75).abs() < f64::EPSILON);
        assert_eq!(stats.cluster_distribution[0], (3, 2));
        assert_eq!(stats.cluster_distribution.len(), 3);
    }

    #[test]
    fn test_statistics_empty() {
        assert_eq!(
            ValidationStatistics::from_records(&[]),
            ValidationStatistics::default()
        );
    }
}

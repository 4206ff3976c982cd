use crate::core::batch::JobExecutor;
use crate::core::envelope::EnvelopeTextExtractor;
use crate::core::fenced::{preview, ContentMode, CsvRow, FencedContentParser, ParsedRecords};
use crate::core::merge_validator::MergeResultValidator;
use crate::core::taxonomy::Taxonomy;
use crate::domain::model::{JobResult, MergeJob, MergeOutcomeRecord, Outcome, SkillRef};
use crate::domain::ports::{GenerationClient, InteractionFlow, InteractionStore, PromptConfig};
use crate::utils::error::{CanonError, Result};
use serde::Deserialize;

pub const DEFAULT_MAX_SKILLS_PER_JOB: usize = 150;

/// One row of the skill inventory the merge batch is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventorySkill {
    pub skill_id: String,
    pub canonical_name: String,
    pub is_valid: bool,
    pub clusters: Vec<u32>,
}

#[derive(Debug, Deserialize)]
struct InventoryRow {
    skill_id: String,
    canonical_name: String,
    is_valid: bool,
    #[serde(default)]
    clusters: String,
}

/// 讀取技能清單 CSV（skill_id,canonical_name,is_valid,clusters），clusters 以 ';' 分隔
pub fn load_inventory(csv_text: &str) -> Result<Vec<InventorySkill>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(csv_text.as_bytes());

    let mut skills = Vec::new();
    for row in reader.deserialize::<InventoryRow>() {
        let row = row?;
        let clusters = row
            .clusters
            .split(';')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| {
                id.parse::<u32>().map_err(|_| CanonError::ValidationError {
                    message: format!("Skill {} has invalid cluster id '{}'", row.skill_id, id),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        skills.push(InventorySkill {
            skill_id: row.skill_id,
            canonical_name: row.canonical_name,
            is_valid: row.is_valid,
            clusters,
        });
    }
    Ok(skills)
}

/// Groups valid inventory skills into one job per (domain, cluster), in
/// taxonomy order. Clusters without valid skills produce no job.
pub fn build_jobs(
    taxonomy: &Taxonomy,
    inventory: &[InventorySkill],
    max_skills_per_job: usize,
) -> Vec<MergeJob> {
    let mut jobs = Vec::new();

    for domain in taxonomy.domains() {
        for cluster in &domain.clusters {
            let skills: Vec<SkillRef> = inventory
                .iter()
                .filter(|skill| skill.is_valid && skill.clusters.contains(&cluster.id))
                .take(max_skills_per_job)
                .map(|skill| SkillRef {
                    skill_id: skill.skill_id.clone(),
                    skill_name: skill.canonical_name.clone(),
                })
                .collect();

            if skills.is_empty() {
                tracing::debug!("Skipping {} → {}: no valid skills", domain.name, cluster.name);
                continue;
            }

            jobs.push(MergeJob {
                domain_id: domain.id,
                cluster_id: cluster.id,
                domain: domain.name.clone(),
                cluster: cluster.name.clone(),
                skills,
            });
        }
    }

    jobs
}

/// Converts parsed CSV rows into outcome records. Shape problems are reported
/// as malformed content, never as validation failures.
pub fn rows_to_records(rows: &[CsvRow], raw_text: &str) -> Result<Vec<MergeOutcomeRecord>> {
    let malformed = |message: String| CanonError::MalformedContent {
        message,
        preview: preview(raw_text),
    };

    rows.iter()
        .enumerate()
        .map(|(index, row)| {
            let skill_id = row
                .get("skill_id")
                .filter(|id| !id.is_empty())
                .ok_or_else(|| malformed(format!("Row {} has no skill_id", index + 1)))?;

            let raw_outcome = row.get("outcome_id").map(String::as_str).unwrap_or("");
            let outcome = raw_outcome
                .parse::<u8>()
                .ok()
                .and_then(Outcome::from_id)
                .ok_or_else(|| {
                    malformed(format!(
                        "Row {} has invalid outcome_id '{}'",
                        index + 1,
                        raw_outcome
                    ))
                })?;

            Ok(MergeOutcomeRecord {
                skill_id: skill_id.clone(),
                outcome_id: outcome.id(),
                merge_with_skill_id: row.get("merge_with_skill_id").cloned().unwrap_or_default(),
                reason: row.get("reason").cloned().unwrap_or_default(),
            })
        })
        .collect()
}

/// 單一 cluster 的合併步驟：呼叫生成 API、記錄互動、解析 CSV、驗證結果
pub struct MergeStep<C: GenerationClient, S: InteractionStore> {
    client: C,
    store: S,
    prompt: PromptConfig,
    extractor: EnvelopeTextExtractor,
    validator: MergeResultValidator,
}

impl<C: GenerationClient, S: InteractionStore> MergeStep<C, S> {
    pub fn new(client: C, store: S, prompt: PromptConfig) -> Self {
        Self {
            client,
            store,
            prompt,
            extractor: EnvelopeTextExtractor::default(),
            validator: MergeResultValidator::default(),
        }
    }

    pub fn with_validator(mut self, validator: MergeResultValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    async fn run_job(&self, job: &MergeJob) -> Result<Vec<MergeOutcomeRecord>> {
        let payload = job.payload();
        let envelope = self.client.invoke(&self.prompt, &payload).await?;

        if let Err(e) = self.store.record(InteractionFlow::Merge, &payload, &envelope).await {
            tracing::error!("Failed to store merge interaction for {}: {}", job.label(), e);
        }

        envelope.ensure_success()?;

        let text = self
            .extractor
            .extract(&envelope.body)
            .filter(|text| !text.trim().is_empty())
            .ok_or(CanonError::AbsentContent)?;

        let rows = match FencedContentParser.parse(&text, ContentMode::Csv)? {
            ParsedRecords::Csv(rows) => rows,
            ParsedRecords::Json(_) => Vec::new(),
        };
        let records = rows_to_records(&rows, &text)?;
        tracing::debug!("{}: parsed {} outcome rows", job.label(), records.len());

        self.validator.validate(job, &records)?;
        Ok(records)
    }
}

#[async_trait::async_trait]
impl<C: GenerationClient, S: InteractionStore> JobExecutor for MergeStep<C, S> {
    async fn execute(&self, job: &MergeJob) -> JobResult {
        match self.run_job(job).await {
            Ok(records) => JobResult::Success { records },
            Err(CanonError::AbsentContent) => JobResult::ValidationFailure {
                reason: "No CSV content found in response".to_string(),
            },
            Err(CanonError::ValidationError { message }) => {
                JobResult::ValidationFailure { reason: message }
            }
            Err(e) if e.is_content_failure() => JobResult::ValidationFailure {
                reason: e.to_string(),
            },
            Err(e) => JobResult::Exception {
                message: e.to_string(),
                kind: e.kind().to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::taxonomy::shipped_taxonomy;

    fn row(pairs: &[(&str, &str)]) -> CsvRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_load_inventory() {
        let csv_text = "skill_id,canonical_name,is_valid,clusters\n\
                        1,Python,true,1; 3\n\
                        2,Synergy,false,\n\
                        3,SQL,true,3\n";
        let inventory = load_inventory(csv_text).unwrap();

        assert_eq!(inventory.len(), 3);
        assert_eq!(inventory[0].clusters, vec![1, 3]);
        assert!(inventory[1].clusters.is_empty());
        assert!(!inventory[1].is_valid);
    }

    #[test]
    fn test_load_inventory_bad_cluster() {
        let csv_text = "skill_id,canonical_name,is_valid,clusters\n1,Python,true,one\n";
        assert!(load_inventory(csv_text).is_err());
    }

    #[test]
    fn test_build_jobs_groups_by_cluster_in_taxonomy_order() {
        let taxonomy = shipped_taxonomy();
        let inventory = load_inventory(
            "skill_id,canonical_name,is_valid,clusters\n\
             10,Hindi,true,37\n\
             11,Python,true,1;3\n\
             12,Pandas,true,3\n\
             13,Synergy,false,3\n",
        )
        .unwrap();

        let jobs = build_jobs(&taxonomy, &inventory, DEFAULT_MAX_SKILLS_PER_JOB);
        let keys: Vec<(u32, u32)> = jobs.iter().map(|j| (j.domain_id, j.cluster_id)).collect();
        assert_eq!(keys, vec![(1, 1), (1, 3), (6, 37)]);
        assert_eq!(jobs[1].input_ids(), vec!["11", "12"]);
        assert_eq!(jobs[2].cluster, "Languages & Localization");
    }

    #[test]
    fn test_build_jobs_caps_skills() {
        let taxonomy = shipped_taxonomy();
        let inventory: Vec<InventorySkill> = (0..5)
            .map(|i| InventorySkill {
                skill_id: i.to_string(),
                canonical_name: format!("Skill {}", i),
                is_valid: true,
                clusters: vec![20],
            })
            .collect();

        let jobs = build_jobs(&taxonomy, &inventory, 2);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].skills.len(), 2);
    }

    #[test]
    fn test_rows_to_records() {
        let rows = vec![
            row(&[("skill_id", "1"), ("outcome_id", "1"), ("merge_with_skill_id", ""), ("reason", "Canonical")]),
            row(&[("skill_id", "2"), ("outcome_id", "2"), ("merge_with_skill_id", "1"), ("reason", "Duplicate")]),
        ];
        let records = rows_to_records(&rows, "raw").unwrap();
        assert_eq!(records[1].merge_target(), Some("1"));
        assert_eq!(records[1].outcome(), Some(Outcome::Merge));
    }

    #[test]
    fn test_rows_to_records_shape_errors_are_malformed() {
        let missing_id = vec![row(&[("outcome_id", "1")])];
        assert!(matches!(
            rows_to_records(&missing_id, "outcome_id\n1"),
            Err(CanonError::MalformedContent { .. })
        ));

        let bad_outcome = vec![row(&[("skill_id", "1"), ("outcome_id", "keep")])];
        assert!(matches!(
            rows_to_records(&bad_outcome, "skill_id,outcome_id\n1,keep"),
            Err(CanonError::MalformedContent { .. })
        ));

        let out_of_range = vec![row(&[("skill_id", "1"), ("outcome_id", "4")])];
        assert!(rows_to_records(&out_of_range, "").is_err());
    }
}

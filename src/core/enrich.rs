use crate::core::taxonomy::Taxonomy;
use crate::domain::model::{ExportRow, SkillValidationRecord};

#[derive(Debug, Clone, Copy)]
pub struct TaxonomyEnricher<'a> {
    taxonomy: &'a Taxonomy,
}

impl<'a> TaxonomyEnricher<'a> {
    pub fn new(taxonomy: &'a Taxonomy) -> Self {
        Self { taxonomy }
    }

    pub fn enrich(&self, records: &[SkillValidationRecord]) -> Vec<ExportRow> {
        records.iter().map(|record| self.enrich_one(record)).collect()
    }

    /// 以分類表補上 cluster 名稱與所屬 domain；未知的 cluster id 直接略過
    pub fn enrich_one(&self, record: &SkillValidationRecord) -> ExportRow {
        let mut cluster_names = Vec::new();
        let mut domain_ids: Vec<u32> = Vec::new();
        let mut domain_names: Vec<String> = Vec::new();

        for &cluster_id in &record.clusters {
            let Some(info) = self.taxonomy.cluster(cluster_id) else {
                tracing::debug!(
                    "Cluster id {} of '{}' not in taxonomy, omitted",
                    cluster_id,
                    record.original_input
                );
                continue;
            };

            cluster_names.push(info.cluster.name.clone());
            if !domain_ids.contains(&info.domain.id) {
                domain_ids.push(info.domain.id);
            }
            if !domain_names.contains(&info.domain.name) {
                domain_names.push(info.domain.name.clone());
            }
        }

        ExportRow {
            original_input: record.original_input.clone(),
            canonical_name: record.canonical_name.clone(),
            is_valid: record.is_valid,
            requires_review: record.requires_review,
            review_reason: record.review_reason.clone(),
            clusters: record.clusters.iter().copied().collect(),
            cluster_names,
            domain_ids,
            domain_names,
        }
    }
}

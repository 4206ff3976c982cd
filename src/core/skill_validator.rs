use crate::core::taxonomy::Taxonomy;
use crate::domain::model::SkillValidationRecord;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRecord {
    pub index: usize,
    pub original_input: Option<String>,
    pub reason: String,
}

/// Outcome of validating every record of one answer. Rejections never hide
/// the records that did pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationParse {
    pub records: Vec<SkillValidationRecord>,
    pub rejected: Vec<RejectedRecord>,
}

#[derive(Debug, Clone, Copy)]
pub struct SkillRecordValidator<'a> {
    taxonomy: &'a Taxonomy,
}

impl<'a> SkillRecordValidator<'a> {
    pub fn new(taxonomy: &'a Taxonomy) -> Self {
        Self { taxonomy }
    }

    pub fn validate(&self, record: &Value) -> Result<SkillValidationRecord, String> {
        let object = record
            .as_object()
            .ok_or_else(|| "Record is not a JSON object".to_string())?;

        let original_input = required_string(object, "original_input")?;
        let canonical_name = required_string(object, "canonical_name")?;
        let is_valid = required_bool(object, "is_valid")?;
        let requires_review = required_bool(object, "requires_review")?;

        let review_reason = match object.get("review_reason") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(reason)) => reason.clone(),
            Some(_) => return Err("review_reason must be a string".to_string()),
        };

        let clusters = self.clusters(object.get("clusters"))?;
        if !is_valid && !clusters.is_empty() {
            return Err(format!(
                "Invalid skill '{}' must not carry clusters",
                original_input
            ));
        }

        Ok(SkillValidationRecord {
            original_input,
            canonical_name,
            is_valid,
            requires_review,
            review_reason,
            clusters,
        })
    }

    fn clusters(&self, value: Option<&Value>) -> Result<BTreeSet<u32>, String> {
        let items = match value {
            None | Some(Value::Null) => return Ok(BTreeSet::new()),
            Some(Value::Array(items)) => items,
            Some(_) => return Err("clusters must be an array".to_string()),
        };

        let mut ids = Vec::with_capacity(items.len());
        for item in items {
            let id = item
                .as_u64()
                .and_then(|id| u32::try_from(id).ok())
                .ok_or_else(|| format!("Cluster id {} is not an integer", item))?;
            if !self.taxonomy.contains_cluster(id) {
                return Err(format!("Cluster id {} is not in the taxonomy", id));
            }
            ids.push(id);
        }

        if ids.windows(2).any(|pair| pair[0] == pair[1]) {
            return Err(format!("Cluster ids must be unique: {:?}", ids));
        }
        if ids.windows(2).any(|pair| pair[0] > pair[1]) {
            return Err(format!("Cluster ids must be ascending: {:?}", ids));
        }

        Ok(ids.into_iter().collect())
    }

    /// 逐筆驗證整個回答，失敗的記錄個別回報
    pub fn validate_all(&self, answer: &Value) -> ValidationParse {
        let items: Vec<&Value> = match answer {
            Value::Array(items) => items.iter().collect(),
            Value::Object(_) => vec![answer],
            _ => Vec::new(),
        };

        let mut parse = ValidationParse::default();
        for (index, item) in items.into_iter().enumerate() {
            match self.validate(item) {
                Ok(record) => parse.records.push(record),
                Err(reason) => {
                    let original_input = item
                        .get("original_input")
                        .and_then(Value::as_str)
                        .map(str::to_string);
                    tracing::warn!("Rejected record #{} ({:?}): {}", index, original_input, reason);
                    parse.rejected.push(RejectedRecord {
                        index,
                        original_input,
                        reason,
                    });
                }
            }
        }
        parse
    }
}

fn required_string(object: &Map<String, Value>, field: &str) -> Result<String, String> {
    match object.get(field) {
        Some(Value::String(value)) if !value.trim().is_empty() => Ok(value.clone()),
        Some(Value::String(_)) => Err(format!("{} cannot be empty", field)),
        Some(_) => Err(format!("{} must be a string", field)),
        None => Err(format!("Missing {}", field)),
    }
}

fn required_bool(object: &Map<String, Value>, field: &str) -> Result<bool, String> {
    match object.get(field) {
        Some(Value::Bool(value)) => Ok(*value),
        Some(_) => Err(format!("{} must be a boolean", field)),
        None => Err(format!("Missing {}", field)),
    }
}

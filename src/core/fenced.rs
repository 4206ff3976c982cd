use crate::utils::error::{CanonError, Result};
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::LazyLock;

const PREVIEW_LIMIT: usize = 200;

static LEADING_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*```[A-Za-z0-9_+-]*[ \t]*\r?\n?").expect("leading fence pattern")
});
static TRAILING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\r?\n?```\s*$").expect("trailing fence pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentMode {
    Json,
    Csv,
}

pub type CsvRow = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedRecords {
    Json(Value),
    Csv(Vec<CsvRow>),
}

impl ParsedRecords {
    pub fn len(&self) -> usize {
        match self {
            ParsedRecords::Json(Value::Array(items)) => items.len(),
            ParsedRecords::Json(Value::Object(_)) => 1,
            ParsedRecords::Json(_) => 0,
            ParsedRecords::Csv(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 去掉 markdown code fence 與前後空白
pub fn strip_fences(text: &str) -> String {
    let without_leading = LEADING_FENCE.replace(text, "");
    TRAILING_FENCE
        .replace(&without_leading, "")
        .trim()
        .to_string()
}

/// Truncates diagnostics text to at most 200 characters.
pub fn preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_LIMIT {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(PREVIEW_LIMIT - 3).collect();
    truncated.push_str("...");
    truncated
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FencedContentParser;

impl FencedContentParser {
    pub fn parse(&self, text: &str, mode: ContentMode) -> Result<ParsedRecords> {
        let cleaned = strip_fences(text);
        match mode {
            ContentMode::Json => Self::parse_json(&cleaned),
            ContentMode::Csv => Self::parse_csv(&cleaned),
        }
    }

    fn parse_json(cleaned: &str) -> Result<ParsedRecords> {
        // 模型常回傳空白或說明文字，當作沒有資料而不是錯誤
        if !cleaned.starts_with('[') && !cleaned.starts_with('{') {
            tracing::debug!("Response text is not JSON, treating as empty");
            return Ok(ParsedRecords::Json(Value::Array(Vec::new())));
        }

        serde_json::from_str(cleaned)
            .map(ParsedRecords::Json)
            .map_err(|e| CanonError::MalformedContent {
                message: format!("JSON parsing error: {}", e),
                preview: preview(cleaned),
            })
    }

    fn parse_csv(cleaned: &str) -> Result<ParsedRecords> {
        let malformed = |e: csv::Error| CanonError::MalformedContent {
            message: format!("CSV parsing error: {}", e),
            preview: preview(cleaned),
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(cleaned.as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .map_err(malformed)?
            .iter()
            .map(|header| header.trim().to_string())
            .collect();
        let Some(last) = headers.len().checked_sub(1) else {
            return Ok(ParsedRecords::Csv(Vec::new()));
        };

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(malformed)?;
            if record.len() != headers.len() {
                tracing::debug!(
                    "CSV row has {} fields, header has {}",
                    record.len(),
                    headers.len()
                );
            }

            // 多出的欄位併回最後一欄（通常是 reason 裡未加引號的逗號），缺少的欄位視為空白
            let row: CsvRow = headers
                .iter()
                .enumerate()
                .map(|(index, header)| {
                    let value = if index == last && record.len() > headers.len() {
                        record.iter().skip(last).collect::<Vec<_>>().join(",")
                    } else {
                        record.get(index).unwrap_or_default().to_string()
                    };
                    (header.clone(), value.trim().to_string())
                })
                .collect();
            rows.push(row);
        }

        tracing::debug!("Parsed {} CSV rows", rows.len());
        Ok(ParsedRecords::Csv(rows))
    }
}

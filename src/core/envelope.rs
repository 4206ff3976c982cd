use serde_json::Value;

/// A single way of locating the generated text inside an envelope.
pub type LookupStrategy = fn(&Value) -> Option<&Value>;

/// 依序嘗試的查找策略：thinking 模式包在 `data` 底下，一般模式直接是 `candidates`，
/// 最後把整個 envelope 當成唯一的 candidate
pub const DEFAULT_STRATEGIES: &[LookupStrategy] =
    &[wrapped_candidates, bare_candidates, envelope_as_candidate];

fn candidate_text(candidate: &Value) -> Option<&Value> {
    candidate
        .get("content")?
        .get("parts")?
        .get(0)?
        .get("text")
        .filter(|text| !text.is_null())
}

fn wrapped_candidates(envelope: &Value) -> Option<&Value> {
    candidate_text(envelope.get("data")?.get("candidates")?.get(0)?)
}

fn bare_candidates(envelope: &Value) -> Option<&Value> {
    candidate_text(envelope.get("candidates")?.get(0)?)
}

fn envelope_as_candidate(envelope: &Value) -> Option<&Value> {
    candidate_text(envelope)
}

#[derive(Debug, Clone)]
pub struct EnvelopeTextExtractor {
    strategies: Vec<LookupStrategy>,
}

impl Default for EnvelopeTextExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_STRATEGIES.to_vec())
    }
}

impl EnvelopeTextExtractor {
    pub fn new(strategies: Vec<LookupStrategy>) -> Self {
        Self { strategies }
    }

    /// Returns the first text leaf any strategy resolves. `None` means there is
    /// nothing to validate, which callers report as zero records.
    pub fn extract(&self, envelope: &Value) -> Option<String> {
        self.strategies
            .iter()
            .find_map(|strategy| strategy(envelope))
            .map(|leaf| match leaf {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            })
    }
}

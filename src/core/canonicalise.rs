use crate::core::envelope::EnvelopeTextExtractor;
use crate::core::fenced::{ContentMode, FencedContentParser, ParsedRecords};
use crate::core::skill_validator::{SkillRecordValidator, ValidationParse};
use crate::core::taxonomy::Taxonomy;
use crate::domain::model::SkillRequest;
use crate::domain::ports::{
    GenerationClient, InteractionFlow, InteractionHandle, InteractionStore, PromptConfig,
};
use crate::utils::error::Result;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalisationOutcome {
    /// Stored interaction, `None` when the store rejected the write.
    pub interaction: Option<InteractionHandle>,
    pub parse: ValidationParse,
}

/// 技能驗證與正規化流程
pub struct SkillCanonicaliser<C: GenerationClient, S: InteractionStore> {
    client: C,
    store: S,
    prompt: PromptConfig,
    taxonomy: Arc<Taxonomy>,
    extractor: EnvelopeTextExtractor,
}

impl<C: GenerationClient, S: InteractionStore> SkillCanonicaliser<C, S> {
    pub fn new(client: C, store: S, prompt: PromptConfig, taxonomy: Arc<Taxonomy>) -> Self {
        Self {
            client,
            store,
            prompt,
            taxonomy,
            extractor: EnvelopeTextExtractor::default(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Canonicalises one request. An answer without text yields zero records;
    /// transport and malformed-content failures are returned to the caller.
    pub async fn canonicalise(&self, request: &SkillRequest) -> Result<CanonicalisationOutcome> {
        let payload = serde_json::to_value(request)?;
        tracing::info!("🚀 Validating {} skills", request.len());

        let envelope = self.client.invoke(&self.prompt, &payload).await?;

        let interaction = match self
            .store
            .record(InteractionFlow::Validation, &payload, &envelope)
            .await
        {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::error!("Failed to store skills validation record: {}", e);
                None
            }
        };

        envelope.ensure_success()?;

        let Some(text) = self.extractor.extract(&envelope.body) else {
            tracing::warn!("⚠️ No text content in response, nothing to validate");
            return Ok(CanonicalisationOutcome {
                interaction,
                parse: ValidationParse::default(),
            });
        };

        let parse = match FencedContentParser.parse(&text, ContentMode::Json)? {
            ParsedRecords::Json(answer) => {
                SkillRecordValidator::new(&self.taxonomy).validate_all(&answer)
            }
            ParsedRecords::Csv(_) => ValidationParse::default(),
        };

        if parse.records.len() + parse.rejected.len() != request.len() {
            tracing::warn!(
                "⚠️ Answer covers {} of {} submitted skills",
                parse.records.len() + parse.rejected.len(),
                request.len()
            );
        }
        tracing::info!(
            "✅ {} records accepted, {} rejected",
            parse.records.len(),
            parse.rejected.len()
        );

        Ok(CanonicalisationOutcome { interaction, parse })
    }
}

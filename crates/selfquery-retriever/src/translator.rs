use std::sync::Arc;

use serde::{Deserialize, Serialize};

use selfquery_core::types::validate_schema;
use selfquery_core::{AttributeInfo, Context, Error, LanguageModel, Result, StructuredQuery};

use crate::parser::{parse_output, RawQuery};
use crate::prompt::build_prompt;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslatorConfig {
    /// What a document's content represents, in plain words.
    pub document_contents: String,
    pub metadata_field_info: Vec<AttributeInfo>,
    /// Whether the model may cap the number of results.
    #[serde(default)]
    pub enable_limit: bool,
    /// Cap used when limiting is enabled and the model proposes none.
    #[serde(default = "default_limit")]
    pub default_limit: usize,
}

fn default_limit() -> usize {
    10
}

impl TranslatorConfig {
    pub fn new(document_contents: impl Into<String>, metadata_field_info: Vec<AttributeInfo>) -> Self {
        Self {
            document_contents: document_contents.into(),
            metadata_field_info,
            enable_limit: false,
            default_limit: default_limit(),
        }
    }

    pub fn with_limit(mut self, enable: bool, default_limit: usize) -> Self {
        self.enable_limit = enable;
        self.default_limit = default_limit;
        self
    }
}

/// Turns natural-language queries into [`StructuredQuery`] values with the
/// help of a language model.
pub struct QueryTranslator {
    model: Arc<dyn LanguageModel>,
    config: TranslatorConfig,
}

impl QueryTranslator {
    pub fn new(model: Arc<dyn LanguageModel>, config: TranslatorConfig) -> Result<Self> {
        validate_schema(&config.metadata_field_info)?;
        if config.default_limit == 0 {
            return Err(Error::InvalidConfig("default_limit must be positive".to_string()));
        }
        Ok(Self { model, config })
    }

    pub fn config(&self) -> &TranslatorConfig {
        &self.config
    }

    /// One model call, no retries. Parse failures, undeclared attributes and
    /// non-positive limits are errors.
    pub async fn translate(&self, ctx: &Context, query: &str) -> Result<StructuredQuery> {
        let prompt = build_prompt(
            query,
            &self.config.document_contents,
            &self.config.metadata_field_info,
            self.config.enable_limit,
        );
        let output = self.model.complete(ctx, &prompt).await?;
        let raw = parse_output(&output)?;
        let structured = self.finish(query, raw)?;
        tracing::debug!(
            model = self.model.model_id(),
            query = %structured.semantic_query,
            filter = ?structured.filter.as_ref().map(ToString::to_string),
            limit = ?structured.limit,
            "query translated"
        );
        Ok(structured)
    }

    /// Validate the parsed reply against the schema and apply the limit policy.
    pub fn finish(&self, original: &str, raw: RawQuery) -> Result<StructuredQuery> {
        let filter = raw
            .filter
            .map(|f| f.validated(&self.config.metadata_field_info))
            .transpose()?;
        let limit = if self.config.enable_limit {
            match raw.limit {
                None => Some(self.config.default_limit),
                Some(n) if n <= 0 => return Err(Error::InvalidLimit { limit: n }),
                Some(n) => Some(usize::try_from(n).map_err(|_| Error::InvalidLimit { limit: n })?),
            }
        } else {
            None
        };
        let semantic_query = if raw.query.is_empty() { original.to_string() } else { raw.query };
        Ok(StructuredQuery { semantic_query, filter, limit })
    }
}

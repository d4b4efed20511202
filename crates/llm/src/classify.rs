//! The classification contract: one article in, one validated payload out,
//! with token usage and USD cost attached.

use std::time::Duration;

use tracing::{debug, warn};

use newswire_core::{ErrorKind, ItemAnalysisPayload};

use crate::pricing::cost_usd;
use crate::prompt::{classification_messages, extract_json};
use crate::provider::{LlmError, LlmProvider};
use crate::validate::normalize;

/// Transient-retry budget for provider errors.
const MAX_RETRIES: u32 = 2;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// A successful classification with cost accounting.
#[derive(Debug, Clone)]
pub struct Classification {
    pub payload: ItemAnalysisPayload,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("classification timed out")]
    Timeout,
    #[error("provider rate limited the request")]
    RateLimited,
    #[error("provider rejected credentials: {0}")]
    Auth(String),
    #[error("provider error {status}: {body}")]
    Provider { status: u16, body: String },
    #[error("invalid model response: {0}")]
    InvalidResponse(String),
    #[error("classifier not configured: {0}")]
    NotConfigured(String),
    #[error("transport error: {0}")]
    Transport(String),
}

impl ClassifyError {
    /// Error-kind tag recorded on failed run items.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout => ErrorKind::LlmTimeout,
            Self::RateLimited => ErrorKind::LlmRateLimited,
            Self::Auth(_) => ErrorKind::ProviderAuthError,
            Self::Provider { .. } | Self::Transport(_) => ErrorKind::InternalError,
            Self::InvalidResponse(_) => ErrorKind::InvalidResponse,
            Self::NotConfigured(_) => ErrorKind::InternalError,
        }
    }

    /// Whether the failure should count against the circuit breaker.
    pub fn is_provider_fault(&self) -> bool {
        !matches!(self, Self::InvalidResponse(_) | Self::NotConfigured(_))
    }
}

impl From<LlmError> for ClassifyError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Timeout => Self::Timeout,
            LlmError::RateLimited => Self::RateLimited,
            LlmError::Auth(body) => Self::Auth(body),
            LlmError::Api { status, body } => Self::Provider { status, body },
            LlmError::Parse(msg) => Self::InvalidResponse(msg),
            LlmError::NotConfigured(msg) => Self::NotConfigured(msg),
            LlmError::Http(e) => Self::Transport(e.to_string()),
        }
    }
}

/// LLM classification client.
pub struct Classifier {
    provider: Box<dyn LlmProvider>,
    default_model: String,
    temperature: f32,
    max_tokens: u32,
}

impl Classifier {
    pub fn new(
        provider: Box<dyn LlmProvider>,
        default_model: String,
        temperature: f32,
        max_tokens: u32,
    ) -> Self {
        Self {
            provider,
            default_model,
            temperature,
            max_tokens,
        }
    }

    pub fn from_config(
        config: &newswire_core::config::LlmConfig,
    ) -> Result<Self, ClassifyError> {
        let provider = crate::providers::create_provider(config)?;
        Ok(Self::new(
            provider,
            config.default_model_tag.clone(),
            config.temperature,
            config.max_tokens,
        ))
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Classify one article. Transient provider errors are retried with
    /// exponential backoff up to [`MAX_RETRIES`]; a JSON parse failure is
    /// an `invalid_response` and is not retried.
    pub async fn classify(
        &self,
        title: &str,
        summary: &str,
        model_tag: Option<&str>,
    ) -> Result<Classification, ClassifyError> {
        let model = match model_tag {
            Some(tag) if !tag.is_empty() => tag,
            _ => &self.default_model,
        };
        let messages = classification_messages(title, summary);

        let mut attempt = 0u32;
        let completion = loop {
            match self
                .provider
                .complete(model, messages.clone(), self.temperature, self.max_tokens)
                .await
            {
                Ok(completion) => break completion,
                Err(e) if e.is_transient() && attempt < MAX_RETRIES => {
                    attempt += 1;
                    let delay = RETRY_BASE_DELAY * 2u32.pow(attempt - 1);
                    warn!(
                        model = %model,
                        attempt = attempt,
                        error = %e,
                        "transient provider error — retrying in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        };

        debug!(
            model = %model,
            input_tokens = completion.input_tokens,
            output_tokens = completion.output_tokens,
            "classification response received"
        );

        let json_str = extract_json(&completion.text);
        let raw: serde_json::Value = serde_json::from_str(json_str)
            .map_err(|e| ClassifyError::InvalidResponse(e.to_string()))?;
        let payload = normalize(&raw, model).map_err(ClassifyError::InvalidResponse)?;

        Ok(Classification {
            payload,
            input_tokens: completion.input_tokens,
            output_tokens: completion.output_tokens,
            cost_usd: cost_usd(model, completion.input_tokens, completion.output_tokens),
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Completion, Message};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Scripted provider: fails `failures` times, then succeeds with `body`.
    struct ScriptedProvider {
        failures: u32,
        calls: Arc<AtomicU32>,
        body: String,
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn complete(
            &self,
            _model: &str,
            _messages: Vec<Message>,
            _temperature: f32,
            _max_tokens: u32,
        ) -> Result<Completion, LlmError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(LlmError::Api {
                    status: 503,
                    body: "overloaded".to_string(),
                });
            }
            Ok(Completion {
                text: self.body.clone(),
                input_tokens: 400,
                output_tokens: 100,
            })
        }
    }

    fn valid_body() -> String {
        r#"{"sentiment":{"overall":{"label":"neutral","score":0.0,"confidence":0.5},
            "market":{"bullish":0.2,"bearish":0.2,"uncertainty":0.6,"time_horizon":"medium"},
            "urgency":0.1,"themes":[]},
            "impact":{"overall":0.3,"volatility":0.2}}"#
            .to_string()
    }

    fn classifier_with(provider: ScriptedProvider) -> Classifier {
        Classifier::new(Box::new(provider), "claude-haiku-4-5".to_string(), 0.1, 1024)
    }

    #[tokio::test]
    async fn test_classify_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let classifier = classifier_with(ScriptedProvider {
            failures: 0,
            calls: calls.clone(),
            body: valid_body(),
        });

        let result = classifier.classify("Title", "Summary", None).await.unwrap();
        assert_eq!(result.input_tokens, 400);
        assert!(result.cost_usd > 0.0);
        assert_eq!(result.payload.model_tag, "claude-haiku-4-5");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_errors_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let classifier = classifier_with(ScriptedProvider {
            failures: 2,
            calls: calls.clone(),
            body: valid_body(),
        });

        let result = classifier.classify("Title", "Summary", None).await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_budget_exhausted() {
        let calls = Arc::new(AtomicU32::new(0));
        let classifier = classifier_with(ScriptedProvider {
            failures: 10,
            calls: calls.clone(),
            body: valid_body(),
        });

        let err = classifier.classify("Title", "Summary", None).await.unwrap_err();
        assert!(matches!(err, ClassifyError::Provider { status: 503, .. }));
        // Initial call + MAX_RETRIES.
        assert_eq!(calls.load(Ordering::SeqCst), 1 + MAX_RETRIES);
    }

    #[tokio::test]
    async fn test_unparseable_response_is_invalid_response() {
        let calls = Arc::new(AtomicU32::new(0));
        let classifier = classifier_with(ScriptedProvider {
            failures: 0,
            calls,
            body: "the article seems fine to me".to_string(),
        });

        let err = classifier.classify("Title", "Summary", None).await.unwrap_err();
        assert!(matches!(err, ClassifyError::InvalidResponse(_)));
        assert_eq!(err.kind(), ErrorKind::InvalidResponse);
        assert!(!err.is_provider_fault());
    }

    #[tokio::test]
    async fn test_explicit_model_tag_used_for_pricing() {
        let calls = Arc::new(AtomicU32::new(0));
        let classifier = classifier_with(ScriptedProvider {
            failures: 0,
            calls,
            body: valid_body(),
        });

        let result = classifier
            .classify("Title", "Summary", Some("gpt-4o-mini"))
            .await
            .unwrap();
        assert_eq!(result.payload.model_tag, "gpt-4o-mini");
        // 400*0.15/1e6 + 100*0.6/1e6
        assert!((result.cost_usd - 0.00012).abs() < 1e-12);
    }

    #[test]
    fn test_error_kind_mapping() {
        assert_eq!(ClassifyError::Timeout.kind(), ErrorKind::LlmTimeout);
        assert_eq!(ClassifyError::RateLimited.kind(), ErrorKind::LlmRateLimited);
        assert_eq!(
            ClassifyError::Auth("no".into()).kind(),
            ErrorKind::ProviderAuthError
        );
    }
}

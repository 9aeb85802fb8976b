//! Provider construction and the credential fallback policy.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::warn;

use super::error::ProviderError;
use super::mock::MockProvider;
use super::ollama::OllamaProvider;
use super::openai::OpenAiCompatProvider;
use super::provider::LlmProvider;
use super::types::{ProviderKind, ProviderSettings};

const DEFAULT_MOCK_DELAY: Duration = Duration::from_millis(50);

/// What to do when a configuration selects a backend that needs a
/// credential and none is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackPolicy {
    /// Silently downgrade to the mock provider (logged at warn). Keeps
    /// the conversation flowing on misconfigured installs.
    AvailabilityOverStrictness,
    /// Fail the turn with `ProviderError::MissingApiKey`.
    Strict,
}

/// Builds a provider for each call from the stored configuration.
///
/// Holds the shared HTTP client so connection pools are reused across
/// turns and backends.
pub struct ProviderFactory {
    client: Client,
    policy: FallbackPolicy,
    mock_delay: Duration,
}

impl ProviderFactory {
    #[must_use]
    pub fn new(policy: FallbackPolicy) -> Self {
        Self {
            client: Client::new(),
            policy,
            mock_delay: DEFAULT_MOCK_DELAY,
        }
    }

    /// Override the mock typing delay. Tests use `Duration::ZERO`.
    #[must_use]
    pub fn with_mock_delay(mut self, delay: Duration) -> Self {
        self.mock_delay = delay;
        self
    }

    pub fn build(&self, settings: &ProviderSettings) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        match settings.kind {
            ProviderKind::Mock => Ok(Arc::new(MockProvider::new(self.mock_delay))),
            ProviderKind::Ollama => Ok(Arc::new(OllamaProvider::new(
                self.client.clone(),
                settings,
            ))),
            ProviderKind::OpenAi => match settings.api_key.as_deref() {
                Some(key) if !key.is_empty() => Ok(Arc::new(OpenAiCompatProvider::new(
                    self.client.clone(),
                    settings,
                    key.to_string(),
                ))),
                _ => match self.policy {
                    FallbackPolicy::AvailabilityOverStrictness => {
                        warn!(
                            provider = %settings.kind,
                            model = %settings.model,
                            "no api key configured, downgrading to mock provider"
                        );
                        Ok(Arc::new(MockProvider::new(self.mock_delay)))
                    }
                    FallbackPolicy::Strict => Err(ProviderError::MissingApiKey(
                        settings.kind.to_string(),
                    )),
                },
            },
        }
    }
}

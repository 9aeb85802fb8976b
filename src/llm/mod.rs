//! LLM provider abstraction.
//!
//! One streaming interface (`LlmProvider`) over the supported backends,
//! plus the factory that builds a provider per call from stored
//! configuration and applies the credential fallback policy.

mod error;
mod factory;
mod mock;
mod ollama;
mod openai;
mod provider;
mod types;

pub use error::ProviderError;
pub use factory::{FallbackPolicy, ProviderFactory};
pub use mock::MockProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiCompatProvider;
pub use provider::LlmProvider;
pub use types::{ChatMessage, ProviderKind, ProviderSettings, Role, TokenStream};

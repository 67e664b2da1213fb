pub mod embeddings;
pub mod knowledge;
pub mod llm;
pub mod onboarding;
pub mod replies;
pub mod responder;
pub mod state;

pub use embeddings::{EmbeddingProvider, OpenAiEmbeddingProvider};
pub use knowledge::vector_search;
pub use llm::{ChatMessage, LlmProvider, LlmRequest, LlmResponse, OpenAiProvider};
pub use onboarding::ConversationalOnboarding;
pub use responder::{Responder, ResponderSettings};
pub use state::{OnboardingProcessor, StateDispatcher, StateOutcome};

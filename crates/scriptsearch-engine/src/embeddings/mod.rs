//! Query embeddings for similarity search
//!
//! ```text
//! EmbeddingProvider (trait)
//!     └── OpenAIProvider    - HTTP client for /v1/embeddings API
//! ```
//!
//! The engine only ever embeds the query text; stored embeddings are produced
//! by an external batch process and read through [`crate::vector`].

pub mod factory;
pub mod openai;
mod provider;

pub use provider::{EmbeddingProvider, EmbeddingProviderType, ProviderStatus};

pub use factory::{create as create_provider, EmbeddingConfig};

pub use openai::{OpenAIConfig, OpenAIProvider};

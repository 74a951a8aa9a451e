//! Provider gateway for Conduit
//!
//! Resolves a requested model to one configured upstream provider,
//! translates the canonical chat-completion request into that provider's
//! wire format, dispatches it, and normalizes the unary response or SSE
//! stream back into the canonical `OpenAI`-compatible shape.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod credentials;
pub mod dispatch;
pub mod error;
pub mod gateway;
#[cfg(feature = "http")]
pub mod handler;
pub mod protocol;
pub mod provider;
pub mod resolver;
pub mod sse;
pub mod types;
pub mod usage;

pub use dispatch::Dispatcher;
pub use error::GatewayError;
pub use gateway::{ChunkStream, Gateway};
#[cfg(feature = "http")]
pub use handler::gateway_router;
pub use provider::{ProviderAdapter, ProviderRegistry, SystemPrompt};
pub use resolver::{ProviderResolver, ResolvedProvider};
pub use sse::{SseData, SseEvent, SseParser};
pub use types::{CompletionRequest, CompletionResponse, Message, Role, StreamChunk};

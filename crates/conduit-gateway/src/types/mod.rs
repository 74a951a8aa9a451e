//! Canonical types for chat-completion requests, responses and stream chunks
//!
//! These types are provider-agnostic and form the gateway's public
//! contract. Every provider wire format converts to and from them.

pub mod message;
pub mod request;
pub mod response;
pub mod stream;

pub use message::{Message, Role};
pub use request::{CompletionRequest, SamplingParams, StopSequences};
pub use response::{CHAT_COMPLETION_OBJECT, Choice, CompletionResponse, Usage};
pub use stream::{CHAT_COMPLETION_CHUNK_OBJECT, Delta, StreamChoice, StreamChunk, StreamContext};

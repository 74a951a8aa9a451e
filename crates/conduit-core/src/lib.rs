//! Contracts shared between the gateway, server and telemetry crates

#![allow(clippy::must_use_candidate)]

mod error;
mod observer;

pub use error::HttpError;
pub use observer::{CompletionObserver, CompletionRecord, Observers};

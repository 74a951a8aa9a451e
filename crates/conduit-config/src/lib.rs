#![allow(clippy::must_use_candidate)]

mod env;
pub mod gateway;
pub mod health;
mod loader;
pub mod provider;
pub mod server;
mod store;
pub mod telemetry;

use serde::Deserialize;

pub use gateway::*;
pub use health::*;
pub use provider::*;
pub use server::*;
pub use store::ConfigStore;
pub use telemetry::{ExportProtocol, ExporterConfig, LogFormat, TelemetryConfig};

/// Top-level Conduit configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Orchestrator behavior shared by all providers
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Upstream providers in resolution order
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    /// Telemetry configuration
    #[serde(default)]
    pub telemetry: Option<TelemetryConfig>,
}

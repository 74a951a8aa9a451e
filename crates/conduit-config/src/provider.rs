use std::time::Duration;

use indexmap::IndexMap;
use serde::Deserialize;
use url::Url;

/// Configuration for a single upstream provider
///
/// Providers are declared as a TOML array of tables (`[[providers]]`).
/// Their declaration order is the tie-break order used when resolving a
/// model name.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Unique provider name
    pub name: String,
    /// Wire protocol spoken by the provider; defaults to `name`
    #[serde(default)]
    pub protocol: Option<String>,
    /// API base URL, endpoint paths are appended to it
    pub base_url: Url,
    /// How the credential is attached to outbound requests
    #[serde(default)]
    pub auth_type: AuthType,
    /// Header carrying the credential when `auth_type = "header"`
    #[serde(default)]
    pub auth_header: Option<String>,
    /// Environment variable holding the credential
    #[serde(default)]
    pub key_env: String,
    /// Model name patterns (regex, anchored at the start)
    #[serde(default)]
    pub patterns: Vec<String>,
    /// Headers sent with every request to this provider
    #[serde(default)]
    pub headers: IndexMap<String, String>,
    /// Upper bound for a single upstream call (e.g. "30s")
    #[serde(
        default = "default_timeout",
        deserialize_with = "duration_str::deserialize_duration"
    )]
    pub timeout: Duration,
    /// Usage field names, when they differ from the protocol defaults
    #[serde(default)]
    pub usage: Option<UsageKeysConfig>,
}

impl ProviderConfig {
    /// Protocol name used to pick the adapter
    pub fn protocol(&self) -> &str {
        self.protocol.as_deref().unwrap_or(&self.name)
    }

    /// Header name used for `auth_type = "header"`
    pub fn auth_header(&self) -> &str {
        self.auth_header.as_deref().unwrap_or(DEFAULT_AUTH_HEADER)
    }
}

/// Wire protocols a provider may speak
pub const PROTOCOLS: &[&str] = &["openai", "anthropic", "google"];

/// Header used for header-based credentials when none is configured
pub const DEFAULT_AUTH_HEADER: &str = "x-api-key";

/// Credential placement on outbound requests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    /// `Authorization: Bearer <key>`
    #[default]
    Bearer,
    /// `<auth_header>: <key>`
    Header,
    /// `?key=<key>` query parameter
    Query,
    /// No credential
    None,
}

/// Overrides for the JSON keys holding token usage
///
/// Each field replaces the matching protocol default. `field` names the
/// object containing the counters and may be a dotted path.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UsageKeysConfig {
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub prompt_tokens: Option<String>,
    #[serde(default)]
    pub completion_tokens: Option<String>,
    #[serde(default)]
    pub total_tokens: Option<String>,
}

const fn default_timeout() -> Duration {
    Duration::from_secs(60)
}

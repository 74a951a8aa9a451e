use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;
use http::{HeaderName, HeaderValue};

use crate::{AuthType, Config, PROTOCOLS, ProviderConfig};

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, environment variable
    /// expansion fails, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;

        Self::from_toml(&raw)
    }

    /// Parse and validate configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if expansion, parsing or validation fails
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error if no provider is configured or a provider entry
    /// is invalid
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.providers.is_empty() {
            anyhow::bail!("at least one provider must be configured");
        }

        let mut seen = HashSet::new();
        for provider in &self.providers {
            if !seen.insert(provider.name.as_str()) {
                anyhow::bail!("duplicate provider name '{}'", provider.name);
            }
            validate_provider(provider)?;
        }

        if self.gateway.retry.max_attempts == 0 {
            anyhow::bail!("gateway.retry.max_attempts must be at least 1");
        }

        Ok(())
    }
}

/// Validate a single provider entry
fn validate_provider(provider: &ProviderConfig) -> anyhow::Result<()> {
    let name = &provider.name;

    if name.is_empty() {
        anyhow::bail!("provider name must not be empty");
    }

    if !PROTOCOLS.contains(&provider.protocol()) {
        anyhow::bail!(
            "provider '{name}' uses unknown protocol '{}' (expected one of: {})",
            provider.protocol(),
            PROTOCOLS.join(", ")
        );
    }

    if provider.patterns.is_empty() {
        tracing::warn!(provider = %name, "provider has no model patterns and will never be selected");
    }

    for pattern in &provider.patterns {
        regex::Regex::new(&format!("^(?:{pattern})"))
            .map_err(|e| anyhow::anyhow!("invalid model pattern for provider '{name}': {e}"))?;
    }

    if provider.auth_type != AuthType::None && provider.key_env.trim().is_empty() {
        anyhow::bail!("provider '{name}' must set key_env unless auth_type is \"none\"");
    }

    if provider.auth_type == AuthType::Header {
        HeaderName::try_from(provider.auth_header())
            .map_err(|e| anyhow::anyhow!("invalid auth_header for provider '{name}': {e}"))?;
    }

    for (header, value) in &provider.headers {
        HeaderName::try_from(header.as_str())
            .map_err(|e| anyhow::anyhow!("invalid header name '{header}' for provider '{name}': {e}"))?;
        HeaderValue::try_from(value.as_str())
            .map_err(|e| anyhow::anyhow!("invalid value for header '{header}' of provider '{name}': {e}"))?;
    }

    if provider.timeout.is_zero() {
        anyhow::bail!("provider '{name}' timeout must be greater than zero");
    }

    Ok(())
}

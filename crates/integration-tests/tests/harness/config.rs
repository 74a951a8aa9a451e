//! Configuration builder for integration tests
//!
//! Produces TOML and runs it through the regular loader, so tests also
//! exercise env expansion and validation.

use conduit_config::Config;

/// Builder for constructing test configurations
pub struct ConfigBuilder {
    sections: Vec<String>,
    providers: Vec<String>,
}

impl ConfigBuilder {
    /// Create a new builder with minimal defaults
    pub fn new() -> Self {
        Self {
            sections: vec!["[server]\nlisten_address = \"127.0.0.1:0\"".to_owned()],
            providers: Vec::new(),
        }
    }

    /// Add a provider without credentials
    pub fn with_provider(self, name: &str, protocol: &str, base_url: &str, patterns: &[&str]) -> Self {
        self.with_provider_entry(name, protocol, base_url, patterns, "auth_type = \"none\"")
    }

    /// Add a provider with extra TOML lines (auth, headers, timeout, ...)
    pub fn with_provider_entry(
        mut self,
        name: &str,
        protocol: &str,
        base_url: &str,
        patterns: &[&str],
        extra: &str,
    ) -> Self {
        let patterns = patterns
            .iter()
            .map(|p| format!("{p:?}"))
            .collect::<Vec<_>>()
            .join(", ");

        self.providers.push(format!(
            "[[providers]]\nname = \"{name}\"\nprotocol = \"{protocol}\"\nbase_url = \"{base_url}\"\npatterns = [{patterns}]\n{extra}"
        ));
        self
    }

    /// Enable retries for transient upstream failures
    pub fn with_retry(mut self, max_attempts: u32, backoff: &str) -> Self {
        self.sections.push(format!(
            "[gateway.retry]\nmax_attempts = {max_attempts}\nbackoff = \"{backoff}\""
        ));
        self
    }

    /// Disable health endpoint
    pub fn without_health(mut self) -> Self {
        self.sections.push("[server.health]\nenabled = false".to_owned());
        self
    }

    /// Rendered TOML
    pub fn toml(&self) -> String {
        let mut parts = self.sections.clone();
        parts.extend(self.providers.iter().cloned());
        parts.join("\n\n")
    }

    /// Build the final config
    pub fn build(self) -> Config {
        Config::from_toml(&self.toml()).unwrap()
    }
}

//! Lazily resolved, cached provider credentials

use std::collections::HashMap;
use std::sync::OnceLock;

use conduit_config::{AuthType, ProviderConfig};
use secrecy::{ExposeSecret, SecretString};

use crate::error::GatewayError;

/// Per-provider credential cache
///
/// Slots are created up front for every configured provider so lookups
/// never take a lock. Each slot is filled at most once, on first use.
#[derive(Debug, Default)]
pub struct CredentialStore {
    slots: HashMap<String, OnceLock<SecretString>>,
}

impl CredentialStore {
    pub fn new<'a>(providers: impl IntoIterator<Item = &'a ProviderConfig>) -> Self {
        Self {
            slots: providers
                .into_iter()
                .map(|provider| (provider.name.clone(), OnceLock::new()))
                .collect(),
        }
    }

    /// Credential for `provider`, read from its `key_env` variable on first use
    ///
    /// A missing or empty variable is a configuration error and is not
    /// cached, so setting the variable later takes effect.
    pub fn resolve(&self, provider: &ProviderConfig) -> Result<SecretString, GatewayError> {
        if provider.auth_type == AuthType::None {
            return Ok(SecretString::from(String::new()));
        }

        let slot = self.slots.get(&provider.name).ok_or_else(|| {
            GatewayError::Configuration(format!("provider '{}' is not registered", provider.name))
        })?;

        if let Some(cached) = slot.get() {
            return Ok(cached.clone());
        }

        let value = read_env(&provider.key_env).ok_or_else(|| {
            tracing::error!(provider = %provider.name, key_env = %provider.key_env, "credential not set");
            GatewayError::Configuration(format!(
                "credential for provider '{}' is missing: environment variable {} is not set",
                provider.name, provider.key_env
            ))
        })?;

        // A concurrent first load may have won; both read the same variable
        let cached = slot.get_or_init(|| value);
        tracing::debug!(provider = %provider.name, credential = %mask(cached), "credential loaded");

        Ok(cached.clone())
    }
}

fn read_env(name: &str) -> Option<SecretString> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(SecretString::from)
}

/// Masked form of a credential for diagnostics, e.g. `sk-a…(redacted)`
pub fn mask(secret: &SecretString) -> String {
    let prefix: String = secret.expose_secret().chars().take(4).collect();
    format!("{prefix}\u{2026}(redacted)")
}

//! Model-name to provider resolution

use std::sync::Arc;

use conduit_config::ProviderConfig;
use regex::Regex;
use secrecy::SecretString;

use crate::credentials::CredentialStore;
use crate::error::GatewayError;

/// Provider selected for a request, with its credential
#[derive(Debug, Clone)]
pub struct ResolvedProvider {
    pub config: Arc<ProviderConfig>,
    pub credential: SecretString,
}

impl ResolvedProvider {
    pub fn name(&self) -> &str {
        &self.config.name
    }
}

struct Candidate {
    config: Arc<ProviderConfig>,
    patterns: Vec<(String, Regex)>,
}

/// Ordered pattern table built once from configuration
///
/// Providers are tried in declaration order and, within a provider,
/// patterns in file order. The first pattern matching from the start of
/// the model name wins.
pub struct ProviderResolver {
    candidates: Vec<Candidate>,
    credentials: CredentialStore,
}

impl ProviderResolver {
    pub fn new(providers: &[Arc<ProviderConfig>]) -> Result<Self, GatewayError> {
        let candidates = providers
            .iter()
            .map(|config| {
                let patterns = config
                    .patterns
                    .iter()
                    .map(|pattern| {
                        Regex::new(&format!("^(?:{pattern})"))
                            .map(|regex| (pattern.clone(), regex))
                            .map_err(|e| {
                                GatewayError::Configuration(format!(
                                    "invalid model pattern '{pattern}' for provider '{}': {e}",
                                    config.name
                                ))
                            })
                    })
                    .collect::<Result<Vec<_>, _>>()?;

                Ok(Candidate {
                    config: Arc::clone(config),
                    patterns,
                })
            })
            .collect::<Result<Vec<_>, GatewayError>>()?;

        Ok(Self {
            credentials: CredentialStore::new(providers.iter().map(AsRef::as_ref)),
            candidates,
        })
    }

    /// Provider whose patterns match `model`, without touching credentials
    pub fn match_provider(&self, model: &str) -> Option<&Arc<ProviderConfig>> {
        self.candidates
            .iter()
            .find(|candidate| candidate.patterns.iter().any(|(_, regex)| regex.is_match(model)))
            .map(|candidate| &candidate.config)
    }

    /// Resolve `model` to a provider and its credential
    pub fn resolve(&self, model: &str) -> Result<ResolvedProvider, GatewayError> {
        let config = self.match_provider(model).ok_or_else(|| GatewayError::UnsupportedModel {
            model: model.to_owned(),
        })?;

        let credential = self.credentials.resolve(config)?;

        tracing::debug!(model, provider = %config.name, "model resolved");

        Ok(ResolvedProvider {
            config: Arc::clone(config),
            credential,
        })
    }

    /// Configured providers with their raw patterns, in resolution order
    pub fn providers(&self) -> impl Iterator<Item = (&ProviderConfig, impl Iterator<Item = &str>)> {
        self.candidates.iter().map(|candidate| {
            (
                candidate.config.as_ref(),
                candidate.patterns.iter().map(|(raw, _)| raw.as_str()),
            )
        })
    }
}

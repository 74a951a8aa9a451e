//! Token usage extraction from provider JSON

use conduit_config::UsageKeysConfig;
use serde_json::Value;

use crate::types::Usage;

/// JSON keys holding token usage in a provider payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageKeys {
    /// Object containing the counters, as a dotted path
    pub field: String,
    pub prompt_tokens: String,
    pub completion_tokens: String,
    /// Total key, computed from the other two when `None`
    pub total_tokens: Option<String>,
}

impl UsageKeys {
    pub fn new(field: &str, prompt_tokens: &str, completion_tokens: &str, total_tokens: Option<&str>) -> Self {
        Self {
            field: field.to_owned(),
            prompt_tokens: prompt_tokens.to_owned(),
            completion_tokens: completion_tokens.to_owned(),
            total_tokens: total_tokens.map(str::to_owned),
        }
    }

    /// Apply per-provider overrides on top of protocol defaults
    #[must_use]
    pub fn with_overrides(mut self, overrides: Option<&UsageKeysConfig>) -> Self {
        let Some(overrides) = overrides else {
            return self;
        };

        if let Some(field) = &overrides.field {
            self.field.clone_from(field);
        }
        if let Some(prompt) = &overrides.prompt_tokens {
            self.prompt_tokens.clone_from(prompt);
        }
        if let Some(completion) = &overrides.completion_tokens {
            self.completion_tokens.clone_from(completion);
        }
        if let Some(total) = &overrides.total_tokens {
            self.total_tokens = Some(total.clone());
        }

        self
    }

    /// Extract usage from a payload, or `None` if the usage object is absent
    ///
    /// Missing counters read as zero. A missing total is computed.
    pub fn extract(&self, payload: &Value) -> Option<Usage> {
        let object = self
            .field
            .split('.')
            .filter(|segment| !segment.is_empty())
            .try_fold(payload, |value, segment| value.get(segment))?;

        if !object.is_object() {
            return None;
        }

        let prompt_tokens = read_count(object, &self.prompt_tokens);
        let completion_tokens = read_count(object, &self.completion_tokens);
        let total_tokens = self
            .total_tokens
            .as_deref()
            .and_then(|key| object.get(key))
            .and_then(Value::as_u64)
            .map_or_else(
                || prompt_tokens.saturating_add(completion_tokens),
                |total| u32::try_from(total).unwrap_or(u32::MAX),
            );

        Some(Usage {
            prompt_tokens,
            completion_tokens,
            total_tokens,
        })
    }
}

fn read_count(object: &Value, key: &str) -> u32 {
    object
        .get(key)
        .and_then(Value::as_u64)
        .map_or(0, |count| u32::try_from(count).unwrap_or(u32::MAX))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn anthropic_keys() -> UsageKeys {
        UsageKeys::new("usage", "input_tokens", "output_tokens", None)
    }

    #[test]
    fn computes_missing_total() {
        let usage = anthropic_keys()
            .extract(&json!({"usage": {"input_tokens": 10, "output_tokens": 5}}))
            .unwrap();

        assert_eq!(usage.total_tokens, 15);
    }

    #[test]
    fn missing_counters_read_as_zero() {
        let usage = anthropic_keys()
            .extract(&json!({"usage": {"output_tokens": 3}}))
            .unwrap();

        assert_eq!(usage.prompt_tokens, 0);
        assert_eq!(usage.completion_tokens, 3);
    }

    #[test]
    fn absent_usage_object_is_none() {
        assert!(anthropic_keys().extract(&json!({"id": "msg_1"})).is_none());
        assert!(anthropic_keys().extract(&json!({"usage": null})).is_none());
    }

    #[test]
    fn overrides_support_dotted_paths() {
        let overrides = UsageKeysConfig {
            field: Some("meta.billing".to_owned()),
            prompt_tokens: Some("in".to_owned()),
            completion_tokens: Some("out".to_owned()),
            total_tokens: Some("all".to_owned()),
        };
        let keys = anthropic_keys().with_overrides(Some(&overrides));

        let usage = keys
            .extract(&json!({"meta": {"billing": {"in": 1, "out": 2, "all": 4}}}))
            .unwrap();

        assert_eq!(
            usage,
            Usage {
                prompt_tokens: 1,
                completion_tokens: 2,
                total_tokens: 4
            }
        );
    }
}

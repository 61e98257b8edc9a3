//! Configuration validation.
//!
//! Semantic checks on top of serde's syntactic ones. All errors are
//! collected and reported together rather than failing on the first.

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::{GatewayConfig, MAX_TOKEN_TTL_SECS, MIN_TOKEN_TTL_SECS};

/// A single semantic problem in the configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("listener.bind_address '{0}' is not a valid socket address")]
    BindAddress(String),

    #[error("observability.metrics_address '{0}' is not a valid socket address")]
    MetricsAddress(String),

    #[error("token.ttl_secs {0} outside {MIN_TOKEN_TTL_SECS}..={MAX_TOKEN_TTL_SECS}")]
    TokenTtl(u64),

    #[error("rate_limit.requests_per_second must be > 0 when enabled")]
    RateLimitZero,

    #[error("chain.rpc_url '{0}' is not a valid URL")]
    RpcUrl(String),

    #[error("contracts.{field} '{value}' is not a valid address")]
    ContractAddress { field: &'static str, value: String },

    #[error("chain.gas_price_multiplier {0} must be >= 1.0")]
    GasMultiplier(f64),

    #[error("chain.confirmation_blocks must be > 0")]
    ConfirmationBlocks,

    #[error("admin.api_key must be set to a non-default value when admin is enabled")]
    AdminKey,

    #[error("retries.max_attempts must be > 0")]
    RetryAttempts,
}

/// Validate a configuration, returning every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if !(MIN_TOKEN_TTL_SECS..=MAX_TOKEN_TTL_SECS).contains(&config.token.ttl_secs) {
        errors.push(ValidationError::TokenTtl(config.token.ttl_secs));
    }

    if config.rate_limit.enabled && config.rate_limit.requests_per_second == 0 {
        errors.push(ValidationError::RateLimitZero);
    }

    if config.retries.max_attempts == 0 {
        errors.push(ValidationError::RetryAttempts);
    }

    if config.chain.enabled {
        if config.chain.rpc_url.parse::<url::Url>().is_err() {
            errors.push(ValidationError::RpcUrl(config.chain.rpc_url.clone()));
        }
        if config.chain.gas_price_multiplier < 1.0 {
            errors.push(ValidationError::GasMultiplier(
                config.chain.gas_price_multiplier,
            ));
        }
        if config.chain.confirmation_blocks == 0 {
            errors.push(ValidationError::ConfirmationBlocks);
        }
        for (field, value) in [
            ("unit_registry", &config.contracts.unit_registry),
            ("settlement_registry", &config.contracts.settlement_registry),
        ] {
            if value.parse::<alloy::primitives::Address>().is_err() {
                errors.push(ValidationError::ContractAddress {
                    field,
                    value: value.clone(),
                });
            }
        }
    }

    if config.admin.enabled
        && (config.admin.api_key.is_empty() || config.admin.api_key == "CHANGE_ME_IN_PRODUCTION")
    {
        errors.push(ValidationError::AdminKey);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        assert!(validate_config(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn test_chain_enabled_requires_contracts() {
        let mut config = GatewayConfig::default();
        config.chain.enabled = true;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors
                .iter()
                .filter(|e| matches!(e, ValidationError::ContractAddress { .. }))
                .count(),
            2
        );
    }

    #[test]
    fn test_all_errors_collected() {
        let mut config = GatewayConfig::default();
        config.listener.bind_address = "nonsense".to_string();
        config.token.ttl_secs = 5;
        config.rate_limit.requests_per_second = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_admin_default_key_rejected() {
        let mut config = GatewayConfig::default();
        config.admin.enabled = true;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::AdminKey)));
    }
}

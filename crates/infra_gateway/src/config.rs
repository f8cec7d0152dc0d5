//! Gateway adapter configuration

use core_kernel::CircuitBreakerConfig;

/// Connection settings for the payment processor's REST API
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL of the processor API (e.g. "https://api.processor.com/v1")
    pub base_url: String,

    /// Secret API key for authentication
    pub api_key: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Retry attempts for transient transport failures
    pub retry_attempts: u32,

    /// Circuit breaker configuration, None disables the breaker
    pub circuit_breaker: Option<CircuitBreakerConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            timeout_secs: 30,
            retry_attempts: 3,
            circuit_breaker: Some(CircuitBreakerConfig::default()),
        }
    }
}

impl GatewayConfig {
    /// Reads the configuration from the environment
    ///
    /// `GATEWAY_BASE_URL` and `GATEWAY_API_KEY` are required; the rest
    /// fall back to the defaults.
    pub fn from_env() -> Result<Self, std::env::VarError> {
        let defaults = Self::default();
        Ok(Self {
            base_url: std::env::var("GATEWAY_BASE_URL")?,
            api_key: std::env::var("GATEWAY_API_KEY")?,
            timeout_secs: std::env::var("GATEWAY_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.timeout_secs),
            retry_attempts: std::env::var("GATEWAY_RETRY_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.retry_attempts),
            circuit_breaker: defaults.circuit_breaker,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.retry_attempts, 3);
        assert!(config.circuit_breaker.is_some());
    }
}

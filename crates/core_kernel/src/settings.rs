//! Runtime-mutable settings
//!
//! Fee percentages, deadlines, and retry limits are operational knobs that
//! change without a redeploy. Components never read process-wide globals;
//! they take a [`SettingsPort`] (usually wrapped in [`CachedSettings`]) and
//! load a typed [`PaymentPolicy`] snapshot when they need one.
//!
//! The cache has a bounded TTL and is invalidated on write, so a changed
//! setting is visible within one TTL window at worst and immediately on the
//! writing process.

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;

/// A typed setting value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SettingValue {
    Integer(i64),
    Float(Decimal),
    Boolean(bool),
    Text(String),
    Json(serde_json::Value),
}

impl SettingValue {
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            SettingValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            SettingValue::Float(v) => Some(*v),
            SettingValue::Integer(v) => Some(Decimal::from(*v)),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            SettingValue::Boolean(v) => Some(*v),
            _ => None,
        }
    }
}

/// Errors from the settings subsystem
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Setting {key} has wrong type, expected {expected}")]
    TypeMismatch { key: String, expected: &'static str },

    #[error("Settings backend error: {0}")]
    Backend(String),
}

/// Port for reading and writing runtime settings
#[async_trait]
pub trait SettingsPort: Send + Sync {
    /// Returns the value for a key, or None if unset
    async fn get(&self, key: &str) -> Result<Option<SettingValue>, SettingsError>;

    /// Writes a value for a key
    async fn put(&self, key: &str, value: SettingValue) -> Result<(), SettingsError>;
}

/// In-memory settings store
///
/// Used in tests and as the default backend when no database is wired up.
#[derive(Debug, Default)]
pub struct InMemorySettings {
    values: RwLock<HashMap<String, SettingValue>>,
}

impl InMemorySettings {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsPort for InMemorySettings {
    async fn get(&self, key: &str) -> Result<Option<SettingValue>, SettingsError> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: SettingValue) -> Result<(), SettingsError> {
        self.values.write().await.insert(key.to_string(), value);
        Ok(())
    }
}

/// Bounded-TTL caching decorator over a [`SettingsPort`]
///
/// Reads hit the inner port at most once per TTL per key; writes pass
/// through and evict the cached entry.
pub struct CachedSettings<S> {
    inner: S,
    ttl: Duration,
    cache: RwLock<HashMap<String, (Option<SettingValue>, Instant)>>,
}

impl<S: SettingsPort> CachedSettings<S> {
    pub fn new(inner: S, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            cache: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl<S: SettingsPort> SettingsPort for CachedSettings<S> {
    async fn get(&self, key: &str) -> Result<Option<SettingValue>, SettingsError> {
        {
            let cache = self.cache.read().await;
            if let Some((value, fetched_at)) = cache.get(key) {
                if fetched_at.elapsed() < self.ttl {
                    return Ok(value.clone());
                }
            }
        }

        let value = self.inner.get(key).await?;
        self.cache
            .write()
            .await
            .insert(key.to_string(), (value.clone(), Instant::now()));
        Ok(value)
    }

    async fn put(&self, key: &str, value: SettingValue) -> Result<(), SettingsError> {
        self.inner.put(key, value).await?;
        self.cache.write().await.remove(key);
        Ok(())
    }
}

/// Setting keys for the payment policy
pub mod keys {
    pub const CONFIRMATION_DEADLINE_HOURS: &str = "payment.confirmation_deadline_hours";
    pub const CAPTURE_LEAD_HOURS: &str = "payment.capture_lead_hours";
    pub const AUTO_CAPTURE_MARGIN_HOURS: &str = "payment.auto_capture_margin_hours";
    pub const MAX_HOLD_HOURS: &str = "payment.max_hold_hours";
    pub const MAX_CAPTURE_ATTEMPTS: &str = "payment.max_capture_attempts";
    pub const RETRY_BACKOFF_BASE_MINUTES: &str = "payment.retry_backoff_base_minutes";
    pub const PLATFORM_FEE_PERCENT: &str = "payment.platform_fee_percent";
    pub const PLATFORM_FEE_MINIMUM_CENTS: &str = "payment.platform_fee_minimum_cents";
    pub const AUTO_CAPTURE_ENABLED: &str = "payment.auto_capture_enabled";
    pub const STRONG_AUTH_THRESHOLD_CENTS: &str = "payment.strong_auth_threshold_cents";
    pub const LATE_CANCELLATION_THRESHOLD_HOURS: &str = "cancellation.late_threshold_hours";
    pub const GATEWAY_FEE_PERCENT: &str = "payment.gateway_fee_percent";
    pub const MONTHLY_CANCELLATION_ALLOWANCE: &str = "cancellation.monthly_allowance";
}

/// Typed snapshot of the payment policy settings
///
/// A snapshot is loaded per operation; the TTL cache underneath keeps the
/// load cheap. All timing values are whole hours, all money values minor
/// units, all percentages decimal percents (5 means 5%).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentPolicy {
    /// Hours the sender has to confirm after acceptance
    pub confirmation_deadline_hours: i64,
    /// Capture must happen this many hours before trip departure
    pub capture_lead_hours: i64,
    /// Auto-capture fires this many hours before the capture deadline
    pub auto_capture_margin_hours: i64,
    /// Maximum hold window on an authorization, regardless of departure
    pub max_hold_hours: i64,
    /// Maximum automatic capture attempts before the job goes terminal
    pub max_capture_attempts: u32,
    /// Base delay for capture retry backoff
    pub retry_backoff_base_minutes: i64,
    /// Platform commission percentage
    pub platform_fee_percent: Decimal,
    /// Platform commission floor in minor units
    pub platform_fee_minimum_cents: i64,
    /// Whether the auto-capture job is scheduled at all
    pub auto_capture_enabled: bool,
    /// Amounts at or above this require strong authentication at the gateway
    pub strong_auth_threshold_cents: i64,
    /// Cancellations closer to departure than this are "late"
    pub late_cancellation_threshold_hours: i64,
    /// Unrecoverable gateway processing fee percentage
    pub gateway_fee_percent: Decimal,
    /// Traveler cancellations-with-bookings allowed per calendar month
    pub monthly_cancellation_allowance: u32,
}

impl Default for PaymentPolicy {
    fn default() -> Self {
        Self {
            confirmation_deadline_hours: 24,
            capture_lead_hours: 12,
            auto_capture_margin_hours: 1,
            max_hold_hours: 7 * 24,
            max_capture_attempts: 3,
            retry_backoff_base_minutes: 5,
            platform_fee_percent: dec!(5),
            platform_fee_minimum_cents: 50,
            auto_capture_enabled: true,
            strong_auth_threshold_cents: 50_000,
            late_cancellation_threshold_hours: 24,
            gateway_fee_percent: dec!(2.9),
            monthly_cancellation_allowance: 1,
        }
    }
}

impl PaymentPolicy {
    /// Loads a policy snapshot from the settings port
    ///
    /// Unset keys fall back to the defaults; set keys with the wrong type
    /// are an error rather than a silent default.
    pub async fn load(port: &dyn SettingsPort) -> Result<Self, SettingsError> {
        let defaults = Self::default();

        Ok(Self {
            confirmation_deadline_hours: read_integer(
                port,
                keys::CONFIRMATION_DEADLINE_HOURS,
                defaults.confirmation_deadline_hours,
            )
            .await?,
            capture_lead_hours: read_integer(
                port,
                keys::CAPTURE_LEAD_HOURS,
                defaults.capture_lead_hours,
            )
            .await?,
            auto_capture_margin_hours: read_integer(
                port,
                keys::AUTO_CAPTURE_MARGIN_HOURS,
                defaults.auto_capture_margin_hours,
            )
            .await?,
            max_hold_hours: read_integer(port, keys::MAX_HOLD_HOURS, defaults.max_hold_hours)
                .await?,
            max_capture_attempts: read_integer(
                port,
                keys::MAX_CAPTURE_ATTEMPTS,
                defaults.max_capture_attempts as i64,
            )
            .await? as u32,
            retry_backoff_base_minutes: read_integer(
                port,
                keys::RETRY_BACKOFF_BASE_MINUTES,
                defaults.retry_backoff_base_minutes,
            )
            .await?,
            platform_fee_percent: read_decimal(
                port,
                keys::PLATFORM_FEE_PERCENT,
                defaults.platform_fee_percent,
            )
            .await?,
            platform_fee_minimum_cents: read_integer(
                port,
                keys::PLATFORM_FEE_MINIMUM_CENTS,
                defaults.platform_fee_minimum_cents,
            )
            .await?,
            auto_capture_enabled: read_boolean(
                port,
                keys::AUTO_CAPTURE_ENABLED,
                defaults.auto_capture_enabled,
            )
            .await?,
            strong_auth_threshold_cents: read_integer(
                port,
                keys::STRONG_AUTH_THRESHOLD_CENTS,
                defaults.strong_auth_threshold_cents,
            )
            .await?,
            late_cancellation_threshold_hours: read_integer(
                port,
                keys::LATE_CANCELLATION_THRESHOLD_HOURS,
                defaults.late_cancellation_threshold_hours,
            )
            .await?,
            gateway_fee_percent: read_decimal(
                port,
                keys::GATEWAY_FEE_PERCENT,
                defaults.gateway_fee_percent,
            )
            .await?,
            monthly_cancellation_allowance: read_integer(
                port,
                keys::MONTHLY_CANCELLATION_ALLOWANCE,
                defaults.monthly_cancellation_allowance as i64,
            )
            .await? as u32,
        })
    }
}

async fn read_integer(
    port: &dyn SettingsPort,
    key: &str,
    default: i64,
) -> Result<i64, SettingsError> {
    match port.get(key).await? {
        None => Ok(default),
        Some(value) => value.as_integer().ok_or(SettingsError::TypeMismatch {
            key: key.to_string(),
            expected: "integer",
        }),
    }
}

async fn read_decimal(
    port: &dyn SettingsPort,
    key: &str,
    default: Decimal,
) -> Result<Decimal, SettingsError> {
    match port.get(key).await? {
        None => Ok(default),
        Some(value) => value.as_decimal().ok_or(SettingsError::TypeMismatch {
            key: key.to_string(),
            expected: "float",
        }),
    }
}

async fn read_boolean(
    port: &dyn SettingsPort,
    key: &str,
    default: bool,
) -> Result<bool, SettingsError> {
    match port.get(key).await? {
        None => Ok(default),
        Some(value) => value.as_boolean().ok_or(SettingsError::TypeMismatch {
            key: key.to_string(),
            expected: "boolean",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_policy_defaults_when_unset() {
        let store = InMemorySettings::new();
        let policy = PaymentPolicy::load(&store).await.unwrap();
        assert_eq!(policy, PaymentPolicy::default());
    }

    #[tokio::test]
    async fn test_policy_reads_overrides() {
        let store = InMemorySettings::new();
        store
            .put(keys::PLATFORM_FEE_PERCENT, SettingValue::Float(dec!(7.5)))
            .await
            .unwrap();
        store
            .put(keys::MAX_CAPTURE_ATTEMPTS, SettingValue::Integer(5))
            .await
            .unwrap();

        let policy = PaymentPolicy::load(&store).await.unwrap();
        assert_eq!(policy.platform_fee_percent, dec!(7.5));
        assert_eq!(policy.max_capture_attempts, 5);
    }

    #[tokio::test]
    async fn test_type_mismatch_is_an_error() {
        let store = InMemorySettings::new();
        store
            .put(
                keys::MAX_CAPTURE_ATTEMPTS,
                SettingValue::Text("three".to_string()),
            )
            .await
            .unwrap();

        let result = PaymentPolicy::load(&store).await;
        assert!(matches!(result, Err(SettingsError::TypeMismatch { .. })));
    }

    #[tokio::test]
    async fn test_cache_invalidated_on_write() {
        let cached = CachedSettings::new(InMemorySettings::new(), Duration::from_secs(60));

        cached
            .put(keys::AUTO_CAPTURE_ENABLED, SettingValue::Boolean(true))
            .await
            .unwrap();
        assert_eq!(
            cached.get(keys::AUTO_CAPTURE_ENABLED).await.unwrap(),
            Some(SettingValue::Boolean(true))
        );

        // Write-through must evict the cached entry
        cached
            .put(keys::AUTO_CAPTURE_ENABLED, SettingValue::Boolean(false))
            .await
            .unwrap();
        assert_eq!(
            cached.get(keys::AUTO_CAPTURE_ENABLED).await.unwrap(),
            Some(SettingValue::Boolean(false))
        );
    }
}

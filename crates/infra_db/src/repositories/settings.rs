//! Key-value settings repository
//!
//! Values are stored as the tagged JSON form of `SettingValue`, so a row
//! written by one deploy stays readable by the next.

use serde_json::Value;
use sqlx::PgPool;

use core_kernel::SettingValue;

use crate::error::DatabaseError;

#[derive(Debug, Clone)]
pub struct SettingsRepository {
    pool: PgPool,
}

impl SettingsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, key: &str) -> Result<Option<SettingValue>, DatabaseError> {
        let row: Option<(Value,)> =
            sqlx::query_as("SELECT value FROM settings WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        row.map(|(value,)| {
            serde_json::from_value(value)
                .map_err(|_| DatabaseError::CorruptRow(format!("setting '{key}' does not decode")))
        })
        .transpose()
    }

    pub async fn put(&self, key: &str, value: &SettingValue) -> Result<(), DatabaseError> {
        let json = serde_json::to_value(value)
            .map_err(|e| DatabaseError::QueryFailed(format!("setting '{key}' does not encode: {e}")))?;
        sqlx::query(
            r#"
            INSERT INTO settings (key, value, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (key) DO UPDATE SET
                value = EXCLUDED.value,
                updated_at = now()
            "#,
        )
        .bind(key)
        .bind(json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

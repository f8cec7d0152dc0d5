//! Row types and row-to-domain conversion
//!
//! Columns are plain SQL types; enums are stored as their snake_case
//! text form and money as (cents BIGINT, currency TEXT). A row that no
//! longer decodes into its domain type is surfaced as `CorruptRow`
//! rather than silently defaulted.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use core_kernel::{
    AuthorizationId, BookingId, Currency, EscrowAccountId, EventId, Money, TransactionId, TripId,
    UserId,
};
use domain_payment::{
    AuthorizationRecord, EscrowRecord, EventRecord, LedgerTransaction, PaymentAuthorization,
};
use domain_scheduler::ScheduledJob;

use crate::error::DatabaseError;

/// Decodes a snake_case text column into a serde enum
pub(crate) fn parse_enum<T: DeserializeOwned>(text: &str, column: &str) -> Result<T, DatabaseError> {
    serde_json::from_value(Value::String(text.to_string()))
        .map_err(|_| DatabaseError::CorruptRow(format!("unknown {column} value '{text}'")))
}

pub(crate) fn parse_currency(code: &str) -> Result<Currency, DatabaseError> {
    parse_enum(code, "currency")
}

pub(crate) fn money(cents: i64, currency: &str) -> Result<Money, DatabaseError> {
    Ok(Money::from_minor(cents, parse_currency(currency)?))
}

#[derive(Debug, FromRow)]
pub struct AuthorizationRow {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub trip_id: Uuid,
    pub payer_id: Uuid,
    pub traveler_id: Uuid,
    pub gateway_handle: Option<String>,
    pub destination_account: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub platform_fee_cents: i64,
    pub status: String,
    pub confirm_by: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub auto_capture_at: Option<DateTime<Utc>>,
    pub departure_at: DateTime<Utc>,
    pub capture_reason: Option<String>,
    pub capture_attempts: i32,
    pub last_error: Option<String>,
    pub delivery_code: Option<String>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub captured_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<AuthorizationRow> for PaymentAuthorization {
    type Error = DatabaseError;

    fn try_from(row: AuthorizationRow) -> Result<Self, DatabaseError> {
        let record = AuthorizationRecord {
            id: AuthorizationId::from(row.id),
            booking_id: BookingId::from(row.booking_id),
            trip_id: TripId::from(row.trip_id),
            payer_id: UserId::from(row.payer_id),
            traveler_id: UserId::from(row.traveler_id),
            gateway_handle: row.gateway_handle,
            destination_account: row.destination_account,
            amount: money(row.amount_cents, &row.currency)?,
            platform_fee: money(row.platform_fee_cents, &row.currency)?,
            status: parse_enum(&row.status, "status")?,
            confirm_by: row.confirm_by,
            expires_at: row.expires_at,
            auto_capture_at: row.auto_capture_at,
            departure_at: row.departure_at,
            capture_reason: row.capture_reason,
            capture_attempts: row.capture_attempts as u32,
            last_error: row.last_error,
            delivery_code: row.delivery_code,
            confirmed_at: row.confirmed_at,
            captured_at: row.captured_at,
            cancelled_at: row.cancelled_at,
            version: row.version as u32,
            created_at: row.created_at,
            updated_at: row.updated_at,
        };
        Ok(PaymentAuthorization::from(record))
    }
}

#[derive(Debug, FromRow)]
pub struct JobRow {
    pub id: Uuid,
    pub kind: String,
    pub authorization_id: Uuid,
    pub booking_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
    pub status: String,
    pub priority: i32,
    pub attempts: i32,
    pub max_attempts: i32,
    pub payload: Value,
    pub result: Option<Value>,
    pub last_error: Option<String>,
    pub executed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for ScheduledJob {
    type Error = DatabaseError;

    fn try_from(row: JobRow) -> Result<Self, DatabaseError> {
        Ok(ScheduledJob {
            id: row.id.into(),
            kind: parse_enum(&row.kind, "kind")?,
            authorization_id: AuthorizationId::from(row.authorization_id),
            booking_id: BookingId::from(row.booking_id),
            scheduled_at: row.scheduled_at,
            status: parse_enum(&row.status, "status")?,
            priority: row.priority,
            attempts: row.attempts as u32,
            max_attempts: row.max_attempts as u32,
            payload: row.payload,
            result: row.result,
            last_error: row.last_error,
            executed_at: row.executed_at,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct TransactionRow {
    pub id: Uuid,
    pub authorization_id: Uuid,
    pub booking_id: Uuid,
    pub kind: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: String,
    pub gateway_reference: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl TryFrom<TransactionRow> for LedgerTransaction {
    type Error = DatabaseError;

    fn try_from(row: TransactionRow) -> Result<Self, DatabaseError> {
        Ok(LedgerTransaction {
            id: TransactionId::from(row.id),
            authorization_id: AuthorizationId::from(row.authorization_id),
            booking_id: BookingId::from(row.booking_id),
            kind: parse_enum(&row.kind, "kind")?,
            amount: money(row.amount_cents, &row.currency)?,
            status: parse_enum(&row.status, "status")?,
            gateway_reference: row.gateway_reference,
            failure_reason: row.failure_reason,
            created_at: row.created_at,
            settled_at: row.settled_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct EscrowRow {
    pub id: Uuid,
    pub authorization_id: Uuid,
    pub held_cents: i64,
    pub released_cents: i64,
    pub refunded_cents: i64,
    pub currency: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<EscrowRow> for EscrowRecord {
    type Error = DatabaseError;

    fn try_from(row: EscrowRow) -> Result<Self, DatabaseError> {
        Ok(EscrowRecord {
            id: EscrowAccountId::from(row.id),
            authorization_id: AuthorizationId::from(row.authorization_id),
            held: money(row.held_cents, &row.currency)?,
            released: money(row.released_cents, &row.currency)?,
            refunded: money(row.refunded_cents, &row.currency)?,
            status: parse_enum(&row.status, "status")?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct EventRow {
    pub id: Uuid,
    pub authorization_id: Uuid,
    pub booking_id: Uuid,
    pub kind: String,
    pub actor_id: Option<Uuid>,
    pub payload: Value,
    pub recorded_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for EventRecord {
    type Error = DatabaseError;

    fn try_from(row: EventRow) -> Result<Self, DatabaseError> {
        Ok(EventRecord {
            id: EventId::from(row.id),
            authorization_id: AuthorizationId::from(row.authorization_id),
            booking_id: BookingId::from(row.booking_id),
            kind: parse_enum(&row.kind, "kind")?,
            actor_id: row.actor_id.map(UserId::from),
            payload: row.payload,
            recorded_at: row.recorded_at,
        })
    }
}

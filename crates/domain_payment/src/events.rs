//! Append-only event log
//!
//! Every state transition lands here with enough payload to reconstruct
//! the timeline of an authorization. Records are written once and never
//! updated.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use core_kernel::{AuthorizationId, BookingId, EventId, PortError, UserId};

use crate::authorization::PaymentEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    AuthorizationCreated,
    GatewayHandleAttached,
    PaymentConfirmed,
    PaymentCaptured,
    CaptureFailed,
    AuthorizationCancelled,
    AuthorizationExpired,
    RefundIssued,
    CompensationPaid,
    /// Raised when automated retries are exhausted and a human must act
    OperatorAlert,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::AuthorizationCreated => "authorization_created",
            EventKind::GatewayHandleAttached => "gateway_handle_attached",
            EventKind::PaymentConfirmed => "payment_confirmed",
            EventKind::PaymentCaptured => "payment_captured",
            EventKind::CaptureFailed => "capture_failed",
            EventKind::AuthorizationCancelled => "authorization_cancelled",
            EventKind::AuthorizationExpired => "authorization_expired",
            EventKind::RefundIssued => "refund_issued",
            EventKind::CompensationPaid => "compensation_paid",
            EventKind::OperatorAlert => "operator_alert",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One immutable log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: EventId,
    pub authorization_id: AuthorizationId,
    pub booking_id: BookingId,
    pub kind: EventKind,
    /// Who triggered the transition; None for system actions
    pub actor_id: Option<UserId>,
    pub payload: Value,
    pub recorded_at: DateTime<Utc>,
}

impl EventRecord {
    pub fn new(
        authorization_id: AuthorizationId,
        booking_id: BookingId,
        kind: EventKind,
        actor_id: Option<UserId>,
        payload: Value,
    ) -> Self {
        Self {
            id: EventId::new_v7(),
            authorization_id,
            booking_id,
            kind,
            actor_id,
            payload,
            recorded_at: Utc::now(),
        }
    }

    /// Builds a log record from an aggregate's domain event
    pub fn from_domain_event(event: &PaymentEvent) -> Self {
        match event {
            PaymentEvent::AuthorizationCreated {
                authorization_id,
                booking_id,
                amount_cents,
                platform_fee_cents,
                gateway_reserved,
                ..
            } => Self::new(
                *authorization_id,
                *booking_id,
                EventKind::AuthorizationCreated,
                None,
                json!({
                    "amount_cents": amount_cents,
                    "platform_fee_cents": platform_fee_cents,
                    "gateway_reserved": gateway_reserved,
                }),
            ),
            PaymentEvent::GatewayHandleAttached {
                authorization_id,
                booking_id,
                ..
            } => Self::new(
                *authorization_id,
                *booking_id,
                EventKind::GatewayHandleAttached,
                None,
                Value::Null,
            ),
            PaymentEvent::PaymentConfirmed {
                authorization_id,
                booking_id,
                actor_id,
                capture_deadline,
                auto_capture_at,
                ..
            } => Self::new(
                *authorization_id,
                *booking_id,
                EventKind::PaymentConfirmed,
                Some(*actor_id),
                json!({
                    "capture_deadline": capture_deadline,
                    "auto_capture_at": auto_capture_at,
                }),
            ),
            PaymentEvent::PaymentCaptured {
                authorization_id,
                booking_id,
                amount_cents,
                reason,
                ..
            } => Self::new(
                *authorization_id,
                *booking_id,
                EventKind::PaymentCaptured,
                None,
                json!({ "amount_cents": amount_cents, "reason": reason }),
            ),
            PaymentEvent::CaptureFailed {
                authorization_id,
                booking_id,
                attempt,
                error,
                attempts_remaining,
                ..
            } => Self::new(
                *authorization_id,
                *booking_id,
                EventKind::CaptureFailed,
                None,
                json!({
                    "attempt": attempt,
                    "error": error,
                    "attempts_remaining": attempts_remaining,
                }),
            ),
            PaymentEvent::AuthorizationCancelled {
                authorization_id,
                booking_id,
                actor_id,
                reason,
                ..
            } => Self::new(
                *authorization_id,
                *booking_id,
                EventKind::AuthorizationCancelled,
                *actor_id,
                json!({ "reason": reason }),
            ),
            PaymentEvent::AuthorizationExpired {
                authorization_id,
                booking_id,
                ..
            } => Self::new(
                *authorization_id,
                *booking_id,
                EventKind::AuthorizationExpired,
                None,
                Value::Null,
            ),
        }
    }
}

/// Persistence boundary for the event log
#[async_trait]
pub trait EventLogPort: Send + Sync {
    /// Appends one record
    async fn append(&self, record: EventRecord) -> Result<(), PortError>;

    /// All records for an authorization, oldest first
    async fn for_authorization(
        &self,
        authorization_id: AuthorizationId,
    ) -> Result<Vec<EventRecord>, PortError>;
}

/// In-memory log for tests and local runs
#[derive(Default)]
pub struct InMemoryEventLog {
    records: Mutex<HashMap<AuthorizationId, Vec<EventRecord>>>,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventLogPort for InMemoryEventLog {
    async fn append(&self, record: EventRecord) -> Result<(), PortError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| PortError::internal("event log lock poisoned"))?;
        records
            .entry(record.authorization_id)
            .or_default()
            .push(record);
        Ok(())
    }

    async fn for_authorization(
        &self,
        authorization_id: AuthorizationId,
    ) -> Result<Vec<EventRecord>, PortError> {
        let records = self
            .records
            .lock()
            .map_err(|_| PortError::internal("event log lock poisoned"))?;
        Ok(records.get(&authorization_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_preserves_order() {
        let log = InMemoryEventLog::new();
        let auth_id = AuthorizationId::new();
        let booking_id = BookingId::new();

        for kind in [
            EventKind::AuthorizationCreated,
            EventKind::PaymentConfirmed,
            EventKind::PaymentCaptured,
        ] {
            log.append(EventRecord::new(auth_id, booking_id, kind, None, Value::Null))
                .await
                .unwrap();
        }

        let records = log.for_authorization(auth_id).await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].kind, EventKind::AuthorizationCreated);
        assert_eq!(records[2].kind, EventKind::PaymentCaptured);
    }

    #[tokio::test]
    async fn test_unknown_authorization_is_empty() {
        let log = InMemoryEventLog::new();
        let records = log.for_authorization(AuthorizationId::new()).await.unwrap();
        assert!(records.is_empty());
    }
}

//! Notification outbox
//!
//! Transitions enqueue notices here instead of calling a delivery
//! channel directly. A separate dispatcher drains the outbox, so a slow
//! or failing notification provider never blocks a payment transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use uuid::Uuid;

use core_kernel::{AuthorizationId, BookingId, Money, PortError, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    /// Ask the sender to confirm payment
    ConfirmationRequested,
    /// Nudge before the confirmation deadline
    ConfirmationReminder,
    PaymentConfirmed,
    PaymentCaptured,
    /// Capture failed and a retry is scheduled
    PaymentRetrying,
    /// Capture failed with no retries left
    PaymentFailed,
    CancellationProcessed,
    RefundIssued,
    AuthorizationExpired,
}

/// One queued notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionNotice {
    pub id: Uuid,
    pub recipient: UserId,
    pub authorization_id: AuthorizationId,
    pub booking_id: BookingId,
    pub kind: NoticeKind,
    /// The money amount the transition concerns, for message rendering
    pub amount: Money,
    pub enqueued_at: DateTime<Utc>,
}

impl TransitionNotice {
    pub fn new(
        recipient: UserId,
        authorization_id: AuthorizationId,
        booking_id: BookingId,
        kind: NoticeKind,
        amount: Money,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            recipient,
            authorization_id,
            booking_id,
            kind,
            amount,
            enqueued_at: Utc::now(),
        }
    }
}

/// In-process outbox queue
///
/// Backed by a mutex-guarded vec; the database-backed deployment swaps
/// this for an outbox table drained by the same dispatcher loop.
#[derive(Default)]
pub struct NotificationOutbox {
    pending: Mutex<Vec<TransitionNotice>>,
}

impl NotificationOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, notice: TransitionNotice) -> Result<(), PortError> {
        let mut pending = self
            .pending
            .lock()
            .map_err(|_| PortError::internal("outbox lock poisoned"))?;
        pending.push(notice);
        Ok(())
    }

    /// Takes all pending notices for dispatch
    pub fn drain(&self) -> Result<Vec<TransitionNotice>, PortError> {
        let mut pending = self
            .pending
            .lock()
            .map_err(|_| PortError::internal("outbox lock poisoned"))?;
        Ok(std::mem::take(&mut *pending))
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::Currency;

    #[test]
    fn test_drain_empties_queue() {
        let outbox = NotificationOutbox::new();
        let recipient = UserId::new();
        let auth_id = AuthorizationId::new();
        let booking_id = BookingId::new();

        outbox
            .enqueue(TransitionNotice::new(
                recipient,
                auth_id,
                booking_id,
                NoticeKind::ConfirmationRequested,
                Money::from_minor(10_000, Currency::USD),
            ))
            .unwrap();
        outbox
            .enqueue(TransitionNotice::new(
                recipient,
                auth_id,
                booking_id,
                NoticeKind::PaymentConfirmed,
                Money::from_minor(10_000, Currency::USD),
            ))
            .unwrap();
        assert_eq!(outbox.pending_count(), 2);

        let drained = outbox.drain().unwrap();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].kind, NoticeKind::ConfirmationRequested);
        assert_eq!(outbox.pending_count(), 0);
    }
}

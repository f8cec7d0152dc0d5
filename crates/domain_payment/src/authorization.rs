//! Payment Authorization Aggregate
//!
//! The PaymentAuthorization is the consistency boundary for one booking's
//! payment cycle. All status checks are pure functions of the single
//! `status` enum; the deadline fields only say *when*, never *whether*.
//!
//! # Invariants
//!
//! - Amount and platform fee are non-negative minor units; fee <= amount
//! - At most one non-terminal authorization per booking (enforced by the store)
//! - `auto_capture_at <= expires_at`
//! - No transition leaves a terminal state (`captured`, `cancelled`, `expired`)

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::{AuthorizationId, BookingId, Money, PaymentPolicy, TripId, UserId};

use crate::error::PaymentError;

/// Authorization lifecycle status
///
/// The single authoritative source for "what can happen next". Every
/// `is_*` question is answered from this enum alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationStatus {
    /// Funds reserved, waiting for sender confirmation
    Pending,
    /// No payable destination account yet; nothing reserved at the gateway
    PendingGatewaySetup,
    /// Sender confirmed; waiting for capture
    Confirmed,
    /// Funds moved; terminal
    Captured,
    /// Explicitly cancelled; terminal
    Cancelled,
    /// A deadline elapsed; terminal
    Expired,
    /// Capture attempt failed; still manually capturable
    Failed,
}

impl AuthorizationStatus {
    /// Terminal states permit no further transition
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AuthorizationStatus::Captured
                | AuthorizationStatus::Cancelled
                | AuthorizationStatus::Expired
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthorizationStatus::Pending => "pending",
            AuthorizationStatus::PendingGatewaySetup => "pending_gateway_setup",
            AuthorizationStatus::Confirmed => "confirmed",
            AuthorizationStatus::Captured => "captured",
            AuthorizationStatus::Cancelled => "cancelled",
            AuthorizationStatus::Expired => "expired",
            AuthorizationStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for AuthorizationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Domain events emitted by authorization transitions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PaymentEvent {
    AuthorizationCreated {
        authorization_id: AuthorizationId,
        booking_id: BookingId,
        amount_cents: i64,
        platform_fee_cents: i64,
        gateway_reserved: bool,
        timestamp: DateTime<Utc>,
    },
    GatewayHandleAttached {
        authorization_id: AuthorizationId,
        booking_id: BookingId,
        timestamp: DateTime<Utc>,
    },
    PaymentConfirmed {
        authorization_id: AuthorizationId,
        booking_id: BookingId,
        actor_id: UserId,
        capture_deadline: DateTime<Utc>,
        auto_capture_at: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },
    PaymentCaptured {
        authorization_id: AuthorizationId,
        booking_id: BookingId,
        amount_cents: i64,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    CaptureFailed {
        authorization_id: AuthorizationId,
        booking_id: BookingId,
        attempt: u32,
        error: String,
        attempts_remaining: bool,
        timestamp: DateTime<Utc>,
    },
    AuthorizationCancelled {
        authorization_id: AuthorizationId,
        booking_id: BookingId,
        actor_id: Option<UserId>,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    AuthorizationExpired {
        authorization_id: AuthorizationId,
        booking_id: BookingId,
        timestamp: DateTime<Utc>,
    },
}

/// Capture timing derived at confirmation
///
/// The capture deadline is tied to the trip departure, which is scheduled
/// independently of the payment: capture must land `capture_lead` hours
/// before departure, but the gateway will not hold funds longer than
/// `max_hold` hours, whichever is sooner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSchedule {
    /// Capture-expiry deadline
    pub expires_at: DateTime<Utc>,
    /// When the auto-capture job fires (deadline minus safety margin)
    pub auto_capture_at: DateTime<Utc>,
}

impl CaptureSchedule {
    /// Computes the schedule for a confirmation happening at `now`
    pub fn for_confirmation(
        departure_at: DateTime<Utc>,
        now: DateTime<Utc>,
        policy: &PaymentPolicy,
    ) -> Self {
        let by_departure = departure_at - Duration::hours(policy.capture_lead_hours);
        let by_hold = now + Duration::hours(policy.max_hold_hours);
        let expires_at = by_departure.min(by_hold);
        let auto_capture_at = expires_at - Duration::hours(policy.auto_capture_margin_hours);
        Self {
            expires_at,
            auto_capture_at,
        }
    }
}

/// One booking's payment authorization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentAuthorization {
    id: AuthorizationId,
    booking_id: BookingId,
    trip_id: TripId,
    /// The sender paying for shipment
    payer_id: UserId,
    /// The traveler carrying the package (payout destination owner)
    traveler_id: UserId,
    /// Gateway reservation handle; None until a payout destination exists
    gateway_handle: Option<String>,
    /// Traveler's payable account at the gateway
    destination_account: Option<String>,
    amount: Money,
    platform_fee: Money,
    status: AuthorizationStatus,
    /// Sender must confirm by this instant
    confirm_by: DateTime<Utc>,
    /// Capture must happen by this instant (set at confirmation)
    expires_at: Option<DateTime<Utc>>,
    /// When auto-capture fires (set at confirmation)
    auto_capture_at: Option<DateTime<Utc>>,
    /// Trip departure driving the capture deadline
    departure_at: DateTime<Utc>,
    capture_reason: Option<String>,
    capture_attempts: u32,
    last_error: Option<String>,
    /// Handover verification code, assigned at confirmation
    delivery_code: Option<String>,
    confirmed_at: Option<DateTime<Utc>>,
    captured_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    /// Domain events to be published
    #[serde(skip)]
    events: Vec<PaymentEvent>,
    /// Version for optimistic concurrency
    version: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PaymentAuthorization {
    /// Creates a new authorization for an accepted booking
    ///
    /// Starts `pending` when a gateway reservation exists (handle present),
    /// otherwise `pending_gateway_setup` with no external reservation.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the amount is negative or the fee
    /// exceeds the amount.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        booking_id: BookingId,
        trip_id: TripId,
        payer_id: UserId,
        traveler_id: UserId,
        amount: Money,
        platform_fee: Money,
        destination_account: Option<String>,
        gateway_handle: Option<String>,
        departure_at: DateTime<Utc>,
        confirm_by: DateTime<Utc>,
    ) -> Result<Self, PaymentError> {
        if amount.is_negative() {
            return Err(PaymentError::Money(core_kernel::MoneyError::InvalidAmount(
                format!("amount must be non-negative, got {}", amount.cents()),
            )));
        }
        if platform_fee.is_negative() || platform_fee.cents() > amount.cents() {
            return Err(PaymentError::Money(core_kernel::MoneyError::InvalidAmount(
                format!(
                    "platform fee {} out of range for amount {}",
                    platform_fee.cents(),
                    amount.cents()
                ),
            )));
        }

        let now = Utc::now();
        let id = AuthorizationId::new_v7();
        let gateway_reserved = gateway_handle.is_some();
        let status = if gateway_reserved {
            AuthorizationStatus::Pending
        } else {
            AuthorizationStatus::PendingGatewaySetup
        };

        Ok(Self {
            id,
            booking_id,
            trip_id,
            payer_id,
            traveler_id,
            gateway_handle,
            destination_account,
            amount,
            platform_fee,
            status,
            confirm_by,
            expires_at: None,
            auto_capture_at: None,
            departure_at,
            capture_reason: None,
            capture_attempts: 0,
            last_error: None,
            delivery_code: None,
            confirmed_at: None,
            captured_at: None,
            cancelled_at: None,
            events: vec![PaymentEvent::AuthorizationCreated {
                authorization_id: id,
                booking_id,
                amount_cents: amount.cents(),
                platform_fee_cents: platform_fee.cents(),
                gateway_reserved,
                timestamp: now,
            }],
            version: 1,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn id(&self) -> AuthorizationId {
        self.id
    }

    pub fn booking_id(&self) -> BookingId {
        self.booking_id
    }

    pub fn trip_id(&self) -> TripId {
        self.trip_id
    }

    pub fn payer_id(&self) -> UserId {
        self.payer_id
    }

    pub fn traveler_id(&self) -> UserId {
        self.traveler_id
    }

    pub fn gateway_handle(&self) -> Option<&str> {
        self.gateway_handle.as_deref()
    }

    pub fn destination_account(&self) -> Option<&str> {
        self.destination_account.as_deref()
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn platform_fee(&self) -> Money {
        self.platform_fee
    }

    pub fn status(&self) -> AuthorizationStatus {
        self.status
    }

    pub fn confirm_by(&self) -> DateTime<Utc> {
        self.confirm_by
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn auto_capture_at(&self) -> Option<DateTime<Utc>> {
        self.auto_capture_at
    }

    pub fn departure_at(&self) -> DateTime<Utc> {
        self.departure_at
    }

    pub fn capture_attempts(&self) -> u32 {
        self.capture_attempts
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn delivery_code(&self) -> Option<&str> {
        self.delivery_code.as_deref()
    }

    pub fn confirmed_at(&self) -> Option<DateTime<Utc>> {
        self.confirmed_at
    }

    pub fn captured_at(&self) -> Option<DateTime<Utc>> {
        self.captured_at
    }

    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.cancelled_at
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Returns accumulated domain events and clears them
    pub fn take_events(&mut self) -> Vec<PaymentEvent> {
        std::mem::take(&mut self.events)
    }

    /// Attaches the gateway reservation once a payout destination exists
    ///
    /// Transitions `pending_gateway_setup` -> `pending`.
    pub fn attach_gateway_handle(
        &mut self,
        handle: impl Into<String>,
        destination_account: impl Into<String>,
    ) -> Result<(), PaymentError> {
        match self.status {
            AuthorizationStatus::PendingGatewaySetup => {
                self.gateway_handle = Some(handle.into());
                self.destination_account = Some(destination_account.into());
                self.status = AuthorizationStatus::Pending;
                self.touch();
                self.events.push(PaymentEvent::GatewayHandleAttached {
                    authorization_id: self.id,
                    booking_id: self.booking_id,
                    timestamp: self.updated_at,
                });
                Ok(())
            }
            status => Err(PaymentError::InvalidState {
                operation: "attach gateway handle to",
                status,
            }),
        }
    }

    /// Confirms the payment (sender action)
    ///
    /// # Errors
    ///
    /// - `InvalidState` unless the authorization is `pending`
    /// - `Unauthorized` unless the actor is the payer
    /// - `DeadlineElapsed` after the confirmation deadline
    pub fn confirm(&mut self, actor: UserId, schedule: CaptureSchedule) -> Result<(), PaymentError> {
        if self.status != AuthorizationStatus::Pending {
            return Err(PaymentError::InvalidState {
                operation: "confirm",
                status: self.status,
            });
        }
        if actor != self.payer_id {
            return Err(PaymentError::Unauthorized(format!(
                "only the payer may confirm, got {actor}"
            )));
        }
        let now = Utc::now();
        if now > self.confirm_by {
            return Err(PaymentError::DeadlineElapsed {
                operation: "confirm",
            });
        }
        debug_assert!(schedule.auto_capture_at <= schedule.expires_at);

        self.status = AuthorizationStatus::Confirmed;
        self.confirmed_at = Some(now);
        self.expires_at = Some(schedule.expires_at);
        self.auto_capture_at = Some(schedule.auto_capture_at);
        self.touch();
        self.events.push(PaymentEvent::PaymentConfirmed {
            authorization_id: self.id,
            booking_id: self.booking_id,
            actor_id: actor,
            capture_deadline: schedule.expires_at,
            auto_capture_at: schedule.auto_capture_at,
            timestamp: now,
        });
        Ok(())
    }

    /// Attaches the handover verification code
    ///
    /// # Errors
    ///
    /// `InvalidState` unless the authorization is `confirmed`; terminal
    /// and unconfirmed holds have no handover to verify.
    pub fn assign_delivery_code(&mut self, code: &str) -> Result<(), PaymentError> {
        if self.status != AuthorizationStatus::Confirmed {
            return Err(PaymentError::InvalidState {
                operation: "assign a delivery code to",
                status: self.status,
            });
        }
        self.delivery_code = Some(code.to_string());
        Ok(())
    }

    /// Records a successful capture
    ///
    /// Legal from `confirmed` or `failed` (a retry succeeding). Calling it
    /// on an already-captured authorization is a no-op so that duplicate
    /// capture requests never double-charge.
    pub fn mark_captured(&mut self, reason: impl Into<String>) -> Result<(), PaymentError> {
        match self.status {
            AuthorizationStatus::Captured => Ok(()),
            AuthorizationStatus::Confirmed | AuthorizationStatus::Failed => {
                let now = Utc::now();
                self.status = AuthorizationStatus::Captured;
                self.captured_at = Some(now);
                self.capture_reason = Some(reason.into());
                self.last_error = None;
                self.touch();
                self.events.push(PaymentEvent::PaymentCaptured {
                    authorization_id: self.id,
                    booking_id: self.booking_id,
                    amount_cents: self.amount.cents(),
                    reason: self.capture_reason.clone().unwrap_or_default(),
                    timestamp: now,
                });
                Ok(())
            }
            status => Err(PaymentError::InvalidState {
                operation: "capture",
                status,
            }),
        }
    }

    /// Records a failed capture attempt
    ///
    /// Increments the attempt counter and moves to `failed`. Returns true
    /// when attempts remain under `max_attempts`.
    pub fn record_capture_failure(
        &mut self,
        error: impl Into<String>,
        max_attempts: u32,
    ) -> Result<bool, PaymentError> {
        match self.status {
            AuthorizationStatus::Confirmed | AuthorizationStatus::Failed => {
                let now = Utc::now();
                self.capture_attempts += 1;
                self.last_error = Some(error.into());
                self.status = AuthorizationStatus::Failed;
                self.touch();
                let attempts_remaining = self.capture_attempts < max_attempts;
                self.events.push(PaymentEvent::CaptureFailed {
                    authorization_id: self.id,
                    booking_id: self.booking_id,
                    attempt: self.capture_attempts,
                    error: self.last_error.clone().unwrap_or_default(),
                    attempts_remaining,
                    timestamp: now,
                });
                Ok(attempts_remaining)
            }
            status => Err(PaymentError::InvalidState {
                operation: "record capture failure on",
                status,
            }),
        }
    }

    /// Cancels the authorization
    ///
    /// Legal from any non-terminal state.
    pub fn cancel(
        &mut self,
        actor: Option<UserId>,
        reason: impl Into<String>,
    ) -> Result<(), PaymentError> {
        if self.status.is_terminal() {
            return Err(PaymentError::InvalidState {
                operation: "cancel",
                status: self.status,
            });
        }
        let now = Utc::now();
        self.status = AuthorizationStatus::Cancelled;
        self.cancelled_at = Some(now);
        self.touch();
        self.events.push(PaymentEvent::AuthorizationCancelled {
            authorization_id: self.id,
            booking_id: self.booking_id,
            actor_id: actor,
            reason: reason.into(),
            timestamp: now,
        });
        Ok(())
    }

    /// Expires the authorization after a deadline elapsed
    ///
    /// Invoked only by the job runner. Local state must not be blocked by
    /// gateway failure, so this transition carries no gateway precondition.
    pub fn expire(&mut self) -> Result<(), PaymentError> {
        if self.status.is_terminal() {
            return Err(PaymentError::InvalidState {
                operation: "expire",
                status: self.status,
            });
        }
        let now = Utc::now();
        self.status = AuthorizationStatus::Expired;
        self.touch();
        self.events.push(PaymentEvent::AuthorizationExpired {
            authorization_id: self.id,
            booking_id: self.booking_id,
            timestamp: now,
        });
        Ok(())
    }

    /// The deadline currently governing this authorization, if any
    pub fn active_deadline(&self) -> Option<DateTime<Utc>> {
        match self.status {
            AuthorizationStatus::Pending | AuthorizationStatus::PendingGatewaySetup => {
                Some(self.confirm_by)
            }
            AuthorizationStatus::Confirmed | AuthorizationStatus::Failed => self.expires_at,
            _ => None,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
        self.version += 1;
    }
}

/// Used by the persistence layer to reconstruct an aggregate from a row
/// without replaying transitions.
#[derive(Debug, Clone)]
pub struct AuthorizationRecord {
    pub id: AuthorizationId,
    pub booking_id: BookingId,
    pub trip_id: TripId,
    pub payer_id: UserId,
    pub traveler_id: UserId,
    pub gateway_handle: Option<String>,
    pub destination_account: Option<String>,
    pub amount: Money,
    pub platform_fee: Money,
    pub status: AuthorizationStatus,
    pub confirm_by: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub auto_capture_at: Option<DateTime<Utc>>,
    pub departure_at: DateTime<Utc>,
    pub capture_reason: Option<String>,
    pub capture_attempts: u32,
    pub last_error: Option<String>,
    pub delivery_code: Option<String>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub captured_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&PaymentAuthorization> for AuthorizationRecord {
    fn from(auth: &PaymentAuthorization) -> Self {
        Self {
            id: auth.id,
            booking_id: auth.booking_id,
            trip_id: auth.trip_id,
            payer_id: auth.payer_id,
            traveler_id: auth.traveler_id,
            gateway_handle: auth.gateway_handle.clone(),
            destination_account: auth.destination_account.clone(),
            amount: auth.amount,
            platform_fee: auth.platform_fee,
            status: auth.status,
            confirm_by: auth.confirm_by,
            expires_at: auth.expires_at,
            auto_capture_at: auth.auto_capture_at,
            departure_at: auth.departure_at,
            capture_reason: auth.capture_reason.clone(),
            capture_attempts: auth.capture_attempts,
            last_error: auth.last_error.clone(),
            delivery_code: auth.delivery_code.clone(),
            confirmed_at: auth.confirmed_at,
            captured_at: auth.captured_at,
            cancelled_at: auth.cancelled_at,
            version: auth.version,
            created_at: auth.created_at,
            updated_at: auth.updated_at,
        }
    }
}

impl From<AuthorizationRecord> for PaymentAuthorization {
    fn from(row: AuthorizationRecord) -> Self {
        Self {
            id: row.id,
            booking_id: row.booking_id,
            trip_id: row.trip_id,
            payer_id: row.payer_id,
            traveler_id: row.traveler_id,
            gateway_handle: row.gateway_handle,
            destination_account: row.destination_account,
            amount: row.amount,
            platform_fee: row.platform_fee,
            status: row.status,
            confirm_by: row.confirm_by,
            expires_at: row.expires_at,
            auto_capture_at: row.auto_capture_at,
            departure_at: row.departure_at,
            capture_reason: row.capture_reason,
            capture_attempts: row.capture_attempts,
            last_error: row.last_error,
            delivery_code: row.delivery_code,
            confirmed_at: row.confirmed_at,
            captured_at: row.captured_at,
            cancelled_at: row.cancelled_at,
            events: Vec::new(),
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

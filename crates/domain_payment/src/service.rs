//! Authorization service
//!
//! Orchestrates the aggregate, the gateway, the escrow ledger, the job
//! queue, the event log, and the notification outbox. Every public
//! operation follows the same shape: load, guard, call out, mutate,
//! persist, then publish.

use chrono::{Duration, Utc};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use core_kernel::{AuthorizationId, BookingId, PaymentPolicy, SettingsPort, UserId};
use domain_scheduler::{JobKind, JobStore, ScheduledJob};

use crate::authorization::{AuthorizationStatus, CaptureSchedule, PaymentAuthorization};
use crate::delivery_code::generate_delivery_code;
use crate::error::PaymentError;
use crate::escrow::EscrowAccount;
use crate::events::{EventKind, EventLogPort, EventRecord};
use crate::fees::FeeBreakdown;
use crate::gateway::{AuthorizeRequest, GatewayChargeStatus, GatewayError, PaymentGatewayPort};
use crate::jobs::PAYMENT_REMINDER_INTERVAL_HOURS;
use crate::outbox::{NoticeKind, NotificationOutbox, TransitionNotice};
use crate::ports::{AuthorizationStore, BookingPort};
use crate::transaction::{LedgerTransaction, TransactionKind};

/// Retry budget for expiry jobs, which must eventually land even when
/// the store flakes
const MAINTENANCE_JOB_ATTEMPTS: u32 = 5;

/// Reminders are best effort
const REMINDER_JOB_ATTEMPTS: u32 = 2;

/// Why a capture happened, recorded on the aggregate and the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureReason {
    /// Fired by the auto-capture job ahead of the deadline
    Automatic,
    /// Requested by an operator or the payer
    Manual,
}

impl CaptureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureReason::Automatic => "auto_capture",
            CaptureReason::Manual => "manual",
        }
    }
}

impl fmt::Display for CaptureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

pub struct AuthorizationService<S, J> {
    store: Arc<S>,
    jobs: Arc<J>,
    gateway: Arc<dyn PaymentGatewayPort>,
    booking: Arc<dyn BookingPort>,
    event_log: Arc<dyn EventLogPort>,
    outbox: Arc<NotificationOutbox>,
    settings: Arc<dyn SettingsPort>,
}

impl<S, J> AuthorizationService<S, J>
where
    S: AuthorizationStore,
    J: JobStore,
{
    pub fn new(
        store: Arc<S>,
        jobs: Arc<J>,
        gateway: Arc<dyn PaymentGatewayPort>,
        booking: Arc<dyn BookingPort>,
        event_log: Arc<dyn EventLogPort>,
        outbox: Arc<NotificationOutbox>,
        settings: Arc<dyn SettingsPort>,
    ) -> Self {
        Self {
            store,
            jobs,
            gateway,
            booking,
            event_log,
            outbox,
            settings,
        }
    }

    /// Current policy values from the settings provider
    pub async fn policy(&self) -> Result<PaymentPolicy, PaymentError> {
        Ok(PaymentPolicy::load(self.settings.as_ref()).await?)
    }

    /// Creates an authorization for an accepted booking
    ///
    /// Reserves funds at the gateway when the traveler already has a
    /// payable destination account; otherwise the authorization starts in
    /// `pending_gateway_setup` with nothing reserved.
    ///
    /// # Errors
    ///
    /// - `DuplicateAuthorization` when the booking already has a live one
    /// - `GatewayRejected` / `GatewayUnavailable` from the reservation call
    pub async fn create_authorization(
        &self,
        booking_id: BookingId,
    ) -> Result<PaymentAuthorization, PaymentError> {
        let policy = self.policy().await?;
        let snapshot = self.booking.snapshot(booking_id).await?;

        if self.store.find_active_for_booking(booking_id).await?.is_some() {
            return Err(PaymentError::DuplicateAuthorization(booking_id));
        }

        let fees = FeeBreakdown::compute(snapshot.amount, &policy)?;
        let now = Utc::now();
        let confirm_by = now + Duration::hours(policy.confirmation_deadline_hours);

        let gateway_handle = match snapshot.destination_account.as_deref() {
            Some(destination) => {
                let reservation = self
                    .gateway
                    .authorize(AuthorizeRequest {
                        amount: snapshot.amount,
                        payer_id: snapshot.sender_id,
                        booking_id,
                        destination_account: destination.to_string(),
                        application_fee: fees.platform_fee,
                        strong_auth: snapshot.amount.cents()
                            >= policy.strong_auth_threshold_cents,
                    })
                    .await?;
                Some(reservation.handle)
            }
            None => None,
        };

        let mut auth = PaymentAuthorization::new(
            booking_id,
            snapshot.trip_id,
            snapshot.sender_id,
            snapshot.traveler_id,
            snapshot.amount,
            fees.platform_fee,
            snapshot.destination_account.clone(),
            gateway_handle.clone(),
            snapshot.departure_at,
            confirm_by,
        )?;

        self.store.insert(&auth).await?;

        if let Some(handle) = gateway_handle {
            let txn = LedgerTransaction::new(
                auth.id(),
                booking_id,
                TransactionKind::Authorization,
                snapshot.amount,
            )
            .settle(handle);
            self.store.record_transaction(&txn).await?;

            let escrow = EscrowAccount::open(auth.id(), snapshot.amount)?;
            self.store.save_escrow(&escrow).await?;
        }

        // The expiry job enforces the confirmation deadline; the reminder
        // fires halfway through the window.
        self.schedule_job(&auth, JobKind::Expiry, confirm_by, MAINTENANCE_JOB_ATTEMPTS)
            .await?;
        let reminder_at = now + Duration::seconds((confirm_by - now).num_seconds() / 2);
        self.schedule_job(
            &auth,
            JobKind::ConfirmationReminder,
            reminder_at,
            REMINDER_JOB_ATTEMPTS,
        )
        .await?;

        self.publish(&mut auth).await?;
        self.notify(&auth, auth.payer_id(), NoticeKind::ConfirmationRequested)?;
        self.booking
            .payment_state_changed(booking_id, auth.status())
            .await?;

        info!(
            authorization_id = %auth.id(),
            booking_id = %booking_id,
            amount_cents = auth.amount().cents(),
            status = %auth.status(),
            "authorization created"
        );
        Ok(auth)
    }

    /// Reserves funds for an authorization created before the traveler
    /// had a payable account
    pub async fn attach_gateway(
        &self,
        authorization_id: AuthorizationId,
        destination_account: &str,
    ) -> Result<PaymentAuthorization, PaymentError> {
        let policy = self.policy().await?;
        let mut auth = self.store.get(authorization_id).await?;
        let loaded_version = auth.version();

        if auth.status() != AuthorizationStatus::PendingGatewaySetup {
            return Err(PaymentError::InvalidState {
                operation: "attach gateway handle to",
                status: auth.status(),
            });
        }

        let reservation = self
            .gateway
            .authorize(AuthorizeRequest {
                amount: auth.amount(),
                payer_id: auth.payer_id(),
                booking_id: auth.booking_id(),
                destination_account: destination_account.to_string(),
                application_fee: auth.platform_fee(),
                strong_auth: auth.amount().cents() >= policy.strong_auth_threshold_cents,
            })
            .await?;

        auth.attach_gateway_handle(reservation.handle.clone(), destination_account)?;
        self.store.update(&auth, loaded_version).await?;

        let txn = LedgerTransaction::new(
            auth.id(),
            auth.booking_id(),
            TransactionKind::Authorization,
            auth.amount(),
        )
        .settle(reservation.handle);
        self.store.record_transaction(&txn).await?;

        let escrow = EscrowAccount::open(auth.id(), auth.amount())?;
        self.store.save_escrow(&escrow).await?;

        self.publish(&mut auth).await?;
        Ok(auth)
    }

    /// Confirms the payment on behalf of the payer
    ///
    /// Computes the capture schedule and swaps the confirmation-window
    /// jobs for capture-window jobs.
    pub async fn confirm(
        &self,
        authorization_id: AuthorizationId,
        actor: UserId,
    ) -> Result<PaymentAuthorization, PaymentError> {
        let policy = self.policy().await?;
        let mut auth = self.store.get(authorization_id).await?;
        let loaded_version = auth.version();

        let schedule = CaptureSchedule::for_confirmation(auth.departure_at(), Utc::now(), &policy);
        auth.confirm(actor, schedule)?;

        // The reservation may have been voided or may have lapsed on the
        // processor side; confirming locally would only schedule capture
        // jobs doomed to fail.
        let handle = auth
            .gateway_handle()
            .ok_or(PaymentError::InvalidState {
                operation: "confirm",
                status: auth.status(),
            })?
            .to_string();
        let remote = self.gateway.retrieve(&handle).await?;
        if remote != GatewayChargeStatus::RequiresCapture {
            return Err(PaymentError::Conflict(format!(
                "gateway reservation is {remote:?}, not capturable"
            )));
        }

        // The code only has to be unique among this trip's in-flight
        // handovers; the traveler sees one list of deliveries.
        let in_flight = self.store.list_active_for_trip(auth.trip_id()).await?;
        let code = generate_delivery_code(|candidate| {
            in_flight
                .iter()
                .any(|other| other.delivery_code() == Some(candidate))
        })
        .map_err(|e| PaymentError::Conflict(e.to_string()))?;
        auth.assign_delivery_code(&code)?;

        self.store.update(&auth, loaded_version).await?;

        self.jobs
            .cancel_for_authorization(
                authorization_id,
                &[JobKind::Expiry, JobKind::ConfirmationReminder],
            )
            .await
            .map_err(PaymentError::from_scheduler)?;

        if policy.auto_capture_enabled {
            self.schedule_job(
                &auth,
                JobKind::AutoCapture,
                schedule.auto_capture_at,
                policy.max_capture_attempts,
            )
            .await?;
        }
        self.schedule_job(
            &auth,
            JobKind::Expiry,
            schedule.expires_at,
            MAINTENANCE_JOB_ATTEMPTS,
        )
        .await?;
        // A nudge partway through the capture window; the handler no-ops
        // unless the payment has failed by then.
        let nudge_at = Utc::now() + Duration::hours(PAYMENT_REMINDER_INTERVAL_HOURS);
        if nudge_at < schedule.expires_at {
            self.schedule_job(&auth, JobKind::PaymentReminder, nudge_at, 1)
                .await?;
        }

        self.publish(&mut auth).await?;
        self.notify(&auth, auth.traveler_id(), NoticeKind::PaymentConfirmed)?;
        self.booking
            .payment_state_changed(auth.booking_id(), auth.status())
            .await?;

        info!(
            authorization_id = %authorization_id,
            expires_at = %schedule.expires_at,
            auto_capture_at = %schedule.auto_capture_at,
            "payment confirmed"
        );
        Ok(auth)
    }

    /// Captures a confirmed authorization
    ///
    /// Idempotent: capturing an already-captured authorization returns it
    /// unchanged. A gateway rejection counts a capture attempt; an
    /// unavailable gateway leaves the aggregate untouched because the
    /// remote outcome is unknown.
    pub async fn capture(
        &self,
        authorization_id: AuthorizationId,
        reason: CaptureReason,
    ) -> Result<PaymentAuthorization, PaymentError> {
        let policy = self.policy().await?;
        let mut auth = self.store.get(authorization_id).await?;
        let loaded_version = auth.version();

        if auth.status() == AuthorizationStatus::Captured {
            return Ok(auth);
        }
        if !matches!(
            auth.status(),
            AuthorizationStatus::Confirmed | AuthorizationStatus::Failed
        ) {
            return Err(PaymentError::InvalidState {
                operation: "capture",
                status: auth.status(),
            });
        }
        if let Some(expires_at) = auth.expires_at() {
            if Utc::now() > expires_at {
                return Err(PaymentError::DeadlineElapsed {
                    operation: "capture",
                });
            }
        }
        let handle = auth
            .gateway_handle()
            .ok_or_else(|| PaymentError::Conflict("no gateway reservation to capture".into()))?
            .to_string();

        match self.gateway.capture(&handle, auth.amount()).await {
            Ok(reference) => {
                auth.mark_captured(reason.as_str())?;
                self.store.update(&auth, loaded_version).await?;

                let txn = LedgerTransaction::new(
                    auth.id(),
                    auth.booking_id(),
                    TransactionKind::Capture,
                    auth.amount(),
                )
                .settle(reference);
                self.store.record_transaction(&txn).await?;

                // The whole hold moves toward the traveler payout
                if let Some(mut escrow) = self.store.escrow_for(auth.id()).await? {
                    escrow.release(auth.amount())?;
                    self.store.save_escrow(&escrow).await?;
                }

                self.jobs
                    .cancel_for_authorization(
                        authorization_id,
                        &[JobKind::AutoCapture, JobKind::Expiry, JobKind::PaymentReminder],
                    )
                    .await
                    .map_err(PaymentError::from_scheduler)?;

                self.publish(&mut auth).await?;
                self.notify(&auth, auth.payer_id(), NoticeKind::PaymentCaptured)?;
                self.booking
                    .payment_state_changed(auth.booking_id(), auth.status())
                    .await?;

                info!(authorization_id = %authorization_id, reason = %reason, "payment captured");
                Ok(auth)
            }
            Err(GatewayError::Unavailable { message }) => {
                warn!(
                    authorization_id = %authorization_id,
                    error = %message,
                    "gateway unavailable during capture, outcome unknown"
                );
                let txn = LedgerTransaction::new(
                    auth.id(),
                    auth.booking_id(),
                    TransactionKind::Capture,
                    auth.amount(),
                )
                .fail(message.clone());
                self.store.record_transaction(&txn).await?;
                Err(PaymentError::GatewayUnavailable(message))
            }
            Err(err) => {
                let message = err.to_string();
                let attempts_remaining =
                    auth.record_capture_failure(&message, policy.max_capture_attempts)?;
                self.store.update(&auth, loaded_version).await?;

                let txn = LedgerTransaction::new(
                    auth.id(),
                    auth.booking_id(),
                    TransactionKind::Capture,
                    auth.amount(),
                )
                .fail(message.clone());
                self.store.record_transaction(&txn).await?;
                self.publish(&mut auth).await?;

                if attempts_remaining {
                    self.notify(&auth, auth.payer_id(), NoticeKind::PaymentRetrying)?;
                } else {
                    self.notify(&auth, auth.payer_id(), NoticeKind::PaymentFailed)?;
                    self.raise_operator_alert(&auth, &message).await?;
                }
                Err(PaymentError::GatewayRejected(message))
            }
        }
    }

    /// Cancels an authorization and returns any held funds to the payer
    ///
    /// The gateway void is best effort: when the processor is down the
    /// local state still moves, and reconciliation settles the remote
    /// side later.
    pub async fn cancel(
        &self,
        authorization_id: AuthorizationId,
        actor: Option<UserId>,
        reason: &str,
    ) -> Result<PaymentAuthorization, PaymentError> {
        let mut auth = self.store.get(authorization_id).await?;
        let loaded_version = auth.version();

        if auth.is_terminal() {
            return Err(PaymentError::InvalidState {
                operation: "cancel",
                status: auth.status(),
            });
        }

        if let Some(handle) = auth.gateway_handle() {
            if let Err(err) = self.gateway.cancel(handle).await {
                warn!(
                    authorization_id = %authorization_id,
                    error = %err,
                    "gateway void failed, continuing with local cancellation"
                );
            }
        }

        auth.cancel(actor, reason)?;
        self.store.update(&auth, loaded_version).await?;
        self.void_escrow(&auth).await?;
        self.clear_jobs(authorization_id).await?;

        self.publish(&mut auth).await?;
        self.notify(&auth, auth.payer_id(), NoticeKind::CancellationProcessed)?;
        self.booking
            .payment_state_changed(auth.booking_id(), auth.status())
            .await?;

        info!(authorization_id = %authorization_id, reason = %reason, "authorization cancelled");
        Ok(auth)
    }

    /// Expires an authorization whose deadline has elapsed
    ///
    /// Invoked by the expiry job. Never blocked by the gateway: the local
    /// transition always lands, and the remote void is best effort.
    pub async fn expire(
        &self,
        authorization_id: AuthorizationId,
    ) -> Result<PaymentAuthorization, PaymentError> {
        let mut auth = self.store.get(authorization_id).await?;
        let loaded_version = auth.version();

        auth.expire()?;

        if let Some(handle) = auth.gateway_handle() {
            if let Err(err) = self.gateway.cancel(handle).await {
                warn!(
                    authorization_id = %authorization_id,
                    error = %err,
                    "gateway void failed during expiry, will reconcile"
                );
            }
        }

        self.store.update(&auth, loaded_version).await?;
        self.void_escrow(&auth).await?;
        self.clear_jobs(authorization_id).await?;

        self.publish(&mut auth).await?;
        self.notify(&auth, auth.payer_id(), NoticeKind::AuthorizationExpired)?;
        self.booking
            .payment_state_changed(auth.booking_id(), auth.status())
            .await?;

        info!(authorization_id = %authorization_id, "authorization expired");
        Ok(auth)
    }

    pub async fn get(
        &self,
        authorization_id: AuthorizationId,
    ) -> Result<PaymentAuthorization, PaymentError> {
        Ok(self.store.get(authorization_id).await?)
    }

    pub async fn list_by_status(
        &self,
        status: AuthorizationStatus,
    ) -> Result<Vec<PaymentAuthorization>, PaymentError> {
        Ok(self.store.list_by_status(status).await?)
    }

    /// The full event history for an authorization, oldest first
    pub async fn timeline(
        &self,
        authorization_id: AuthorizationId,
    ) -> Result<Vec<EventRecord>, PaymentError> {
        // Touch the aggregate first so an unknown id reads as NotFound
        // rather than an empty timeline.
        self.store.get(authorization_id).await?;
        Ok(self.event_log.for_authorization(authorization_id).await?)
    }

    pub async fn transactions(
        &self,
        authorization_id: AuthorizationId,
    ) -> Result<Vec<LedgerTransaction>, PaymentError> {
        Ok(self.store.transactions_for(authorization_id).await?)
    }

    pub fn outbox(&self) -> &NotificationOutbox {
        &self.outbox
    }

    /// Refunds whatever escrow is still held back to the payer
    async fn void_escrow(&self, auth: &PaymentAuthorization) -> Result<(), PaymentError> {
        if let Some(mut escrow) = self.store.escrow_for(auth.id()).await? {
            let available = escrow.available();
            if available.is_positive() {
                escrow.refund(available)?;
                self.store.save_escrow(&escrow).await?;

                let txn = LedgerTransaction::new(
                    auth.id(),
                    auth.booking_id(),
                    TransactionKind::Refund,
                    available,
                )
                .settle("reservation_void");
                self.store.record_transaction(&txn).await?;
            }
        }
        Ok(())
    }

    async fn clear_jobs(&self, authorization_id: AuthorizationId) -> Result<(), PaymentError> {
        self.jobs
            .cancel_for_authorization(
                authorization_id,
                &[
                    JobKind::AutoCapture,
                    JobKind::Expiry,
                    JobKind::ConfirmationReminder,
                    JobKind::PaymentReminder,
                ],
            )
            .await
            .map_err(PaymentError::from_scheduler)?;
        Ok(())
    }

    async fn schedule_job(
        &self,
        auth: &PaymentAuthorization,
        kind: JobKind,
        at: chrono::DateTime<Utc>,
        max_attempts: u32,
    ) -> Result<(), PaymentError> {
        let job = ScheduledJob::new(kind, auth.id(), auth.booking_id(), at, max_attempts);
        self.jobs
            .schedule(job)
            .await
            .map_err(PaymentError::from_scheduler)?;
        Ok(())
    }

    /// Drains aggregate events into the append-only log
    async fn publish(&self, auth: &mut PaymentAuthorization) -> Result<(), PaymentError> {
        for event in auth.take_events() {
            self.event_log
                .append(EventRecord::from_domain_event(&event))
                .await?;
        }
        Ok(())
    }

    fn notify(
        &self,
        auth: &PaymentAuthorization,
        recipient: UserId,
        kind: NoticeKind,
    ) -> Result<(), PaymentError> {
        self.outbox.enqueue(TransitionNotice::new(
            recipient,
            auth.id(),
            auth.booking_id(),
            kind,
            auth.amount(),
        ))?;
        Ok(())
    }

    pub(crate) async fn raise_operator_alert(
        &self,
        auth: &PaymentAuthorization,
        detail: &str,
    ) -> Result<(), PaymentError> {
        warn!(
            authorization_id = %auth.id(),
            detail = %detail,
            "capture attempts exhausted, operator intervention required"
        );
        self.event_log
            .append(EventRecord::new(
                auth.id(),
                auth.booking_id(),
                EventKind::OperatorAlert,
                None,
                serde_json::json!({ "detail": detail, "status": auth.status().as_str() }),
            ))
            .await?;
        Ok(())
    }
}

impl PaymentError {
    fn from_scheduler(err: domain_scheduler::SchedulerError) -> Self {
        match err {
            domain_scheduler::SchedulerError::Store(port) => PaymentError::from(port),
            other => PaymentError::Conflict(other.to_string()),
        }
    }
}

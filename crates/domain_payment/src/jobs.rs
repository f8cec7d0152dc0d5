//! Job executor for payment work
//!
//! The scheduler is domain-agnostic; this executor gives each job kind
//! its payment meaning. Every handler re-checks aggregate state before
//! acting, because the world may have moved between scheduling and
//! execution.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

use core_kernel::PortError;
use domain_scheduler::{JobExecutor, JobKind, JobOutcome, JobStore, ScheduledJob};

use crate::authorization::AuthorizationStatus;
use crate::error::PaymentError;
use crate::outbox::{NoticeKind, TransitionNotice};
use crate::ports::AuthorizationStore;
use crate::service::{AuthorizationService, CaptureReason};

/// Hours between payment-failure nudges once retries are exhausted
pub(crate) const PAYMENT_REMINDER_INTERVAL_HOURS: i64 = 24;

pub struct PaymentJobExecutor<S, J> {
    service: Arc<AuthorizationService<S, J>>,
    jobs: Arc<J>,
}

impl<S, J> PaymentJobExecutor<S, J>
where
    S: AuthorizationStore,
    J: JobStore,
{
    pub fn new(service: Arc<AuthorizationService<S, J>>, jobs: Arc<J>) -> Self {
        Self { service, jobs }
    }

    async fn run_auto_capture(&self, job: &ScheduledJob) -> Result<JobOutcome, PortError> {
        let auth = self
            .service
            .get(job.authorization_id)
            .await
            .map_err(to_port_error)?;

        match auth.status() {
            AuthorizationStatus::Confirmed | AuthorizationStatus::Failed => {}
            status => {
                return Ok(JobOutcome::Superseded {
                    reason: format!("authorization is {status}, nothing to capture"),
                })
            }
        }
        let policy = self.service.policy().await.map_err(to_port_error)?;
        if !policy.auto_capture_enabled {
            return Ok(JobOutcome::Superseded {
                reason: "auto capture disabled".to_string(),
            });
        }

        match self
            .service
            .capture(job.authorization_id, CaptureReason::Automatic)
            .await
        {
            Ok(auth) => Ok(JobOutcome::Completed {
                result: Some(json!({
                    "captured_at": auth.captured_at(),
                    "amount_cents": auth.amount().cents(),
                })),
            }),
            // Deadline races with the expiry job; let expiry win
            Err(PaymentError::DeadlineElapsed { .. }) => Ok(JobOutcome::Superseded {
                reason: "capture deadline elapsed".to_string(),
            }),
            Err(err) => Err(to_port_error(err)),
        }
    }

    async fn run_expiry(&self, job: &ScheduledJob) -> Result<JobOutcome, PortError> {
        let auth = self
            .service
            .get(job.authorization_id)
            .await
            .map_err(to_port_error)?;

        if auth.is_terminal() {
            return Ok(JobOutcome::Superseded {
                reason: format!("authorization already {}", auth.status()),
            });
        }
        // Confirmation moves the governing deadline; a stale expiry job
        // must not fire early.
        match auth.active_deadline() {
            Some(deadline) if deadline <= Utc::now() => {}
            _ => {
                return Ok(JobOutcome::Superseded {
                    reason: "deadline was rescheduled".to_string(),
                })
            }
        }

        let expired = self
            .service
            .expire(job.authorization_id)
            .await
            .map_err(to_port_error)?;
        Ok(JobOutcome::Completed {
            result: Some(json!({ "status": expired.status().as_str() })),
        })
    }

    async fn run_confirmation_reminder(&self, job: &ScheduledJob) -> Result<JobOutcome, PortError> {
        let auth = self
            .service
            .get(job.authorization_id)
            .await
            .map_err(to_port_error)?;

        if auth.status() != AuthorizationStatus::Pending {
            return Ok(JobOutcome::Superseded {
                reason: format!("authorization is {}, no reminder needed", auth.status()),
            });
        }
        self.service.outbox().enqueue(TransitionNotice::new(
            auth.payer_id(),
            auth.id(),
            auth.booking_id(),
            NoticeKind::ConfirmationReminder,
            auth.amount(),
        ))?;
        Ok(JobOutcome::Completed {
            result: Some(json!({ "recipient": auth.payer_id() })),
        })
    }

    async fn run_payment_reminder(&self, job: &ScheduledJob) -> Result<JobOutcome, PortError> {
        let auth = self
            .service
            .get(job.authorization_id)
            .await
            .map_err(to_port_error)?;

        if auth.status() != AuthorizationStatus::Failed {
            return Ok(JobOutcome::Superseded {
                reason: format!("authorization is {}, no nudge needed", auth.status()),
            });
        }
        self.service.outbox().enqueue(TransitionNotice::new(
            auth.payer_id(),
            auth.id(),
            auth.booking_id(),
            NoticeKind::PaymentFailed,
            auth.amount(),
        ))?;

        // Keep nudging until the payer acts or the expiry job lands. The
        // capture deadline bounds this chain.
        let next = Utc::now() + Duration::hours(PAYMENT_REMINDER_INTERVAL_HOURS);
        if auth.expires_at().map(|e| next < e).unwrap_or(false) {
            let follow_up = ScheduledJob::new(
                JobKind::PaymentReminder,
                auth.id(),
                auth.booking_id(),
                next,
                job.max_attempts,
            );
            self.jobs
                .schedule(follow_up)
                .await
                .map_err(|e| PortError::internal(e.to_string()))?;
        }
        Ok(JobOutcome::Completed {
            result: Some(json!({ "recipient": auth.payer_id() })),
        })
    }
}

#[async_trait]
impl<S, J> JobExecutor for PaymentJobExecutor<S, J>
where
    S: AuthorizationStore + Send + Sync + 'static,
    J: JobStore + Send + Sync + 'static,
{
    async fn execute(&self, job: &ScheduledJob) -> Result<JobOutcome, PortError> {
        match job.kind {
            JobKind::AutoCapture => self.run_auto_capture(job).await,
            JobKind::Expiry => self.run_expiry(job).await,
            JobKind::ConfirmationReminder => self.run_confirmation_reminder(job).await,
            JobKind::PaymentReminder => self.run_payment_reminder(job).await,
        }
    }

    async fn on_exhausted(&self, job: &ScheduledJob) {
        if job.kind != JobKind::AutoCapture {
            return;
        }
        // All automated attempts spent: flag for an operator and start
        // nudging the payer toward a manual retry.
        let Ok(auth) = self.service.get(job.authorization_id).await else {
            warn!(job_id = %job.id, "exhausted job references unknown authorization");
            return;
        };
        let detail = job
            .last_error
            .clone()
            .unwrap_or_else(|| "capture attempts exhausted".to_string());
        if let Err(err) = self.service.raise_operator_alert(&auth, &detail).await {
            warn!(authorization_id = %auth.id(), error = %err, "failed to raise operator alert");
        }

        let nudge_at = Utc::now() + Duration::hours(PAYMENT_REMINDER_INTERVAL_HOURS);
        if auth.expires_at().map(|e| nudge_at < e).unwrap_or(false) {
            let reminder = ScheduledJob::new(
                JobKind::PaymentReminder,
                auth.id(),
                auth.booking_id(),
                nudge_at,
                1,
            );
            if let Err(err) = self.jobs.schedule(reminder).await {
                warn!(authorization_id = %auth.id(), error = %err, "failed to schedule payment reminder");
            }
        }
    }
}

/// Gateway failures map to transient port errors so the runner retries
/// them with backoff; everything else is terminal for the job.
fn to_port_error(err: PaymentError) -> PortError {
    match err {
        PaymentError::GatewayUnavailable(message) | PaymentError::GatewayRejected(message) => {
            PortError::connection(message)
        }
        PaymentError::NotFound(message) => PortError::not_found("PaymentAuthorization", message),
        PaymentError::Storage(port) => port,
        other => PortError::internal(other.to_string()),
    }
}

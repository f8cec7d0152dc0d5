//! Gateway reconciliation
//!
//! A capture attempt that ends in `Unavailable` leaves the true outcome
//! unknown: the processor may or may not have moved the money. The
//! reconciler re-reads the remote charge for every authorization with a
//! failed capture on the ledger and converges local state to whatever
//! the processor actually did. Safe to run from a cron loop; every
//! operation is idempotent.

use std::sync::Arc;
use tracing::{info, warn};

use core_kernel::AuthorizationId;
use domain_payment::ports::AuthorizationStore;
use domain_payment::{
    AuthorizationStatus, EventKind, EventLogPort, EventRecord, GatewayChargeStatus,
    LedgerTransaction, PaymentAuthorization, PaymentError, PaymentGatewayPort, TransactionKind,
    TransactionStatus,
};
use domain_scheduler::{JobKind, JobStore};

/// What reconciliation did to one authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The processor had captured; local state now agrees
    AdoptedCapture,
    /// The processor had cancelled; local state now agrees
    AdoptedCancellation,
    /// Remote and local already agree
    Unchanged,
    /// The processor is still unreachable; try again next run
    Unresolved,
}

/// Aggregate counts for one reconciliation sweep
#[derive(Debug, Default, Clone, Copy)]
pub struct ReconcileReport {
    pub examined: usize,
    pub adopted_captures: usize,
    pub adopted_cancellations: usize,
    pub unresolved: usize,
}

pub struct Reconciler<S, J> {
    store: Arc<S>,
    jobs: Arc<J>,
    gateway: Arc<dyn PaymentGatewayPort>,
    event_log: Arc<dyn EventLogPort>,
}

impl<S, J> Reconciler<S, J>
where
    S: AuthorizationStore,
    J: JobStore,
{
    pub fn new(
        store: Arc<S>,
        jobs: Arc<J>,
        gateway: Arc<dyn PaymentGatewayPort>,
        event_log: Arc<dyn EventLogPort>,
    ) -> Self {
        Self {
            store,
            jobs,
            gateway,
            event_log,
        }
    }

    /// Sweeps every authorization whose last gateway outcome is in doubt
    pub async fn run_once(&self) -> Result<ReconcileReport, PaymentError> {
        let mut report = ReconcileReport::default();

        let mut candidates = self
            .store
            .list_by_status(AuthorizationStatus::Confirmed)
            .await?;
        candidates.extend(
            self.store
                .list_by_status(AuthorizationStatus::Failed)
                .await?,
        );

        for auth in candidates {
            if !self.has_failed_capture(auth.id()).await? {
                continue;
            }
            report.examined += 1;
            match self.reconcile_loaded(auth).await? {
                ReconcileOutcome::AdoptedCapture => report.adopted_captures += 1,
                ReconcileOutcome::AdoptedCancellation => report.adopted_cancellations += 1,
                ReconcileOutcome::Unresolved => report.unresolved += 1,
                ReconcileOutcome::Unchanged => {}
            }
        }

        if report.examined > 0 {
            info!(
                examined = report.examined,
                adopted_captures = report.adopted_captures,
                adopted_cancellations = report.adopted_cancellations,
                unresolved = report.unresolved,
                "reconciliation sweep finished"
            );
        }
        Ok(report)
    }

    /// Reconciles a single authorization, for operator use
    pub async fn reconcile(
        &self,
        authorization_id: AuthorizationId,
    ) -> Result<ReconcileOutcome, PaymentError> {
        let auth = self.store.get(authorization_id).await?;
        self.reconcile_loaded(auth).await
    }

    async fn reconcile_loaded(
        &self,
        mut auth: PaymentAuthorization,
    ) -> Result<ReconcileOutcome, PaymentError> {
        if auth.is_terminal() {
            return Ok(ReconcileOutcome::Unchanged);
        }
        let Some(handle) = auth.gateway_handle().map(str::to_string) else {
            return Ok(ReconcileOutcome::Unchanged);
        };
        let loaded_version = auth.version();

        let remote = match self.gateway.retrieve(&handle).await {
            Ok(status) => status,
            Err(err) if err.is_ambiguous() => {
                warn!(
                    authorization_id = %auth.id(),
                    error = %err,
                    "gateway still unreachable, reconciliation deferred"
                );
                return Ok(ReconcileOutcome::Unresolved);
            }
            Err(err) => return Err(err.into()),
        };

        match remote {
            GatewayChargeStatus::Captured => {
                auth.mark_captured("reconciliation")?;
                self.store.update(&auth, loaded_version).await?;

                let txn = LedgerTransaction::new(
                    auth.id(),
                    auth.booking_id(),
                    TransactionKind::Capture,
                    auth.amount(),
                )
                .settle(format!("reconciled:{handle}"));
                self.store.record_transaction(&txn).await?;
                self.release_escrow(&auth).await?;
                self.clear_jobs(auth.id()).await?;
                self.publish(&mut auth).await?;

                info!(authorization_id = %auth.id(), "adopted remote capture");
                Ok(ReconcileOutcome::AdoptedCapture)
            }
            GatewayChargeStatus::Cancelled => {
                auth.cancel(None, "gateway reports charge cancelled")?;
                self.store.update(&auth, loaded_version).await?;
                self.refund_escrow(&auth).await?;
                self.clear_jobs(auth.id()).await?;
                self.publish(&mut auth).await?;

                info!(authorization_id = %auth.id(), "adopted remote cancellation");
                Ok(ReconcileOutcome::AdoptedCancellation)
            }
            // Still held or still pending payer action; the capture jobs
            // keep retrying
            GatewayChargeStatus::RequiresCapture
            | GatewayChargeStatus::RequiresAction
            | GatewayChargeStatus::Failed => Ok(ReconcileOutcome::Unchanged),
        }
    }

    async fn has_failed_capture(
        &self,
        authorization_id: AuthorizationId,
    ) -> Result<bool, PaymentError> {
        let transactions = self.store.transactions_for(authorization_id).await?;
        Ok(transactions.iter().any(|t| {
            t.kind == TransactionKind::Capture && t.status == TransactionStatus::Failed
        }))
    }

    async fn release_escrow(&self, auth: &PaymentAuthorization) -> Result<(), PaymentError> {
        if let Some(mut escrow) = self.store.escrow_for(auth.id()).await? {
            let available = escrow.available();
            if available.is_positive() {
                escrow.release(available)?;
                self.store.save_escrow(&escrow).await?;
            }
        }
        Ok(())
    }

    async fn refund_escrow(&self, auth: &PaymentAuthorization) -> Result<(), PaymentError> {
        if let Some(mut escrow) = self.store.escrow_for(auth.id()).await? {
            let available = escrow.available();
            if available.is_positive() {
                escrow.refund(available)?;
                self.store.save_escrow(&escrow).await?;
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
                    JobKind::PaymentReminder,
                ],
            )
            .await
            .map_err(|e| PaymentError::Conflict(e.to_string()))?;
        Ok(())
    }

    async fn publish(&self, auth: &mut PaymentAuthorization) -> Result<(), PaymentError> {
        for event in auth.take_events() {
            self.event_log
                .append(EventRecord::from_domain_event(&event))
                .await?;
        }
        self.event_log
            .append(EventRecord::new(
                auth.id(),
                auth.booking_id(),
                EventKind::OperatorAlert,
                None,
                serde_json::json!({
                    "detail": "state converged by reconciliation",
                    "status": auth.status().as_str(),
                }),
            ))
            .await?;
        Ok(())
    }
}

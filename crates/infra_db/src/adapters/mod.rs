//! Port implementations backed by PostgreSQL
//!
//! Thin layers over the repositories that translate `DatabaseError` into
//! the error surface each domain port declares.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use core_kernel::{
    AuthorizationId, BookingId, DomainPort, JobId, PortError, SettingValue, SettingsError,
    SettingsPort, TripId, UserId,
};
use domain_cancellation::{AllowancePeriod, CancellationLedger};
use domain_payment::{
    AuthorizationStatus, AuthorizationStore, EscrowAccount, EventLogPort, EventRecord,
    LedgerTransaction, PaymentAuthorization,
};
use domain_scheduler::{JobKind, JobStore, QueueStats, ScheduledJob, SchedulerError};

use crate::repositories::{
    AllowanceRepository, AuthorizationRepository, EscrowRepository, EventLogRepository,
    JobRepository, SettingsRepository, TransactionRepository,
};

/// [`AuthorizationStore`] over `payment_authorizations` and its side tables
#[derive(Debug, Clone)]
pub struct PgAuthorizationStore {
    authorizations: AuthorizationRepository,
    transactions: TransactionRepository,
    escrow: EscrowRepository,
}

impl PgAuthorizationStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            authorizations: AuthorizationRepository::new(pool.clone()),
            transactions: TransactionRepository::new(pool.clone()),
            escrow: EscrowRepository::new(pool),
        }
    }
}

#[async_trait]
impl AuthorizationStore for PgAuthorizationStore {
    async fn insert(&self, auth: &PaymentAuthorization) -> Result<(), PortError> {
        Ok(self.authorizations.insert(auth).await?)
    }

    async fn get(&self, id: AuthorizationId) -> Result<PaymentAuthorization, PortError> {
        self.authorizations
            .fetch(id)
            .await?
            .ok_or_else(|| PortError::not_found("PaymentAuthorization", id.to_string()))
    }

    async fn find_active_for_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<Option<PaymentAuthorization>, PortError> {
        Ok(self.authorizations.fetch_active_for_booking(booking_id).await?)
    }

    async fn update(
        &self,
        auth: &PaymentAuthorization,
        loaded_version: u32,
    ) -> Result<(), PortError> {
        Ok(self.authorizations.update_versioned(auth, loaded_version).await?)
    }

    async fn list_by_status(
        &self,
        status: AuthorizationStatus,
    ) -> Result<Vec<PaymentAuthorization>, PortError> {
        Ok(self.authorizations.list_by_status(status).await?)
    }

    async fn list_active_for_trip(
        &self,
        trip_id: TripId,
    ) -> Result<Vec<PaymentAuthorization>, PortError> {
        Ok(self.authorizations.list_active_for_trip(trip_id).await?)
    }

    async fn record_transaction(&self, txn: &LedgerTransaction) -> Result<(), PortError> {
        Ok(self.transactions.insert(txn).await?)
    }

    async fn transactions_for(
        &self,
        authorization_id: AuthorizationId,
    ) -> Result<Vec<LedgerTransaction>, PortError> {
        Ok(self.transactions.for_authorization(authorization_id).await?)
    }

    async fn save_escrow(&self, escrow: &EscrowAccount) -> Result<(), PortError> {
        Ok(self.escrow.save(escrow).await?)
    }

    async fn escrow_for(
        &self,
        authorization_id: AuthorizationId,
    ) -> Result<Option<EscrowAccount>, PortError> {
        Ok(self.escrow.for_authorization(authorization_id).await?)
    }
}

/// [`JobStore`] over `scheduled_jobs`
///
/// Claim exclusivity comes from `FOR UPDATE SKIP LOCKED` inside the
/// repository, so any number of workers can poll the same table.
#[derive(Debug, Clone)]
pub struct PgJobStore {
    jobs: JobRepository,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            jobs: JobRepository::new(pool),
        }
    }
}

impl DomainPort for PgJobStore {}

#[async_trait]
impl JobStore for PgJobStore {
    async fn schedule(&self, job: ScheduledJob) -> Result<Option<JobId>, SchedulerError> {
        if job.scheduled_at < Utc::now() {
            tracing::debug!(kind = %job.kind, scheduled_at = %job.scheduled_at, "dropping past-dated job");
            return Ok(None);
        }
        let id = job.id;
        self.jobs
            .insert(&job)
            .await
            .map_err(|e| SchedulerError::Store(e.into()))?;
        Ok(Some(id))
    }

    async fn get(&self, id: JobId) -> Result<ScheduledJob, SchedulerError> {
        self.jobs
            .fetch(id)
            .await
            .map_err(|e| SchedulerError::Store(e.into()))?
            .ok_or(SchedulerError::JobNotFound(id))
    }

    async fn claim_next_due(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<ScheduledJob>, SchedulerError> {
        self.jobs
            .claim_due(now)
            .await
            .map_err(|e| SchedulerError::Store(e.into()))
    }

    async fn persist(&self, job: &ScheduledJob) -> Result<(), SchedulerError> {
        self.jobs
            .persist(job)
            .await
            .map_err(|e| match e {
                e if e.is_not_found() => SchedulerError::JobNotFound(job.id),
                other => SchedulerError::Store(other.into()),
            })
    }

    async fn cancel_for_authorization(
        &self,
        authorization_id: AuthorizationId,
        kinds: &[JobKind],
    ) -> Result<u32, SchedulerError> {
        self.jobs
            .cancel_for_authorization(authorization_id, kinds)
            .await
            .map_err(|e| SchedulerError::Store(e.into()))
    }

    async fn pending_for_authorization(
        &self,
        authorization_id: AuthorizationId,
    ) -> Result<Vec<ScheduledJob>, SchedulerError> {
        self.jobs
            .pending_for_authorization(authorization_id)
            .await
            .map_err(|e| SchedulerError::Store(e.into()))
    }

    async fn stats(&self) -> Result<QueueStats, SchedulerError> {
        self.jobs
            .stats(Utc::now())
            .await
            .map_err(|e| SchedulerError::Store(e.into()))
    }
}

/// [`EventLogPort`] over `payment_events`
#[derive(Debug, Clone)]
pub struct PgEventLog {
    events: EventLogRepository,
}

impl PgEventLog {
    pub fn new(pool: PgPool) -> Self {
        Self {
            events: EventLogRepository::new(pool),
        }
    }
}

#[async_trait]
impl EventLogPort for PgEventLog {
    async fn append(&self, record: EventRecord) -> Result<(), PortError> {
        Ok(self.events.append(&record).await?)
    }

    async fn for_authorization(
        &self,
        authorization_id: AuthorizationId,
    ) -> Result<Vec<EventRecord>, PortError> {
        Ok(self.events.timeline(authorization_id).await?)
    }
}

/// [`CancellationLedger`] over `cancellation_charges`
#[derive(Debug, Clone)]
pub struct PgCancellationLedger {
    charges: AllowanceRepository,
}

impl PgCancellationLedger {
    pub fn new(pool: PgPool) -> Self {
        Self {
            charges: AllowanceRepository::new(pool),
        }
    }
}

#[async_trait]
impl CancellationLedger for PgCancellationLedger {
    async fn count(&self, traveler: UserId, period: AllowancePeriod) -> Result<u32, PortError> {
        Ok(self
            .charges
            .count_in_month(traveler, period.year, period.month)
            .await?)
    }

    async fn record(&self, traveler: UserId, at: DateTime<Utc>) -> Result<(), PortError> {
        Ok(self.charges.record(traveler, at).await?)
    }
}

/// [`SettingsPort`] over `settings`
#[derive(Debug, Clone)]
pub struct PgSettings {
    settings: SettingsRepository,
}

impl PgSettings {
    pub fn new(pool: PgPool) -> Self {
        Self {
            settings: SettingsRepository::new(pool),
        }
    }
}

#[async_trait]
impl SettingsPort for PgSettings {
    async fn get(&self, key: &str) -> Result<Option<SettingValue>, SettingsError> {
        self.settings
            .get(key)
            .await
            .map_err(|e| SettingsError::Backend(e.to_string()))
    }

    async fn put(&self, key: &str, value: SettingValue) -> Result<(), SettingsError> {
        self.settings
            .put(key, &value)
            .await
            .map_err(|e| SettingsError::Backend(e.to_string()))
    }
}

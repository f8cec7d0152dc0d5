//! In-memory engine harness
//!
//! Wires the authorization service and cancellation engine over the
//! in-memory ports and the mock gateway, so scenario tests exercise the
//! full engine without a database or a live processor.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use core_kernel::{BookingId, CachedSettings, InMemorySettings, UserId};
use domain_cancellation::{CancellationEngine, InMemoryCancellationLedger};
use domain_payment::{
    AuthorizationService, InMemoryAuthorizationStore, InMemoryEventLog, NotificationOutbox,
    PaymentAuthorization, PaymentError, PaymentJobExecutor, StaticBookingPort,
};
use domain_scheduler::{InMemoryJobStore, JobRunner, RunnerConfig, SchedulerError};
use infra_gateway::MockGateway;

use crate::builders::BookingSnapshotBuilder;

/// A fully wired payment engine over in-memory ports
pub struct PaymentHarness {
    pub store: Arc<InMemoryAuthorizationStore>,
    pub jobs: Arc<InMemoryJobStore>,
    pub gateway: Arc<MockGateway>,
    pub booking: Arc<StaticBookingPort>,
    pub event_log: Arc<InMemoryEventLog>,
    pub outbox: Arc<NotificationOutbox>,
    pub settings: Arc<CachedSettings<InMemorySettings>>,
    pub ledger: Arc<InMemoryCancellationLedger>,
    pub service: Arc<AuthorizationService<InMemoryAuthorizationStore, InMemoryJobStore>>,
    pub cancellations: CancellationEngine<InMemoryAuthorizationStore, InMemoryJobStore>,
}

impl Default for PaymentHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl PaymentHarness {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryAuthorizationStore::new());
        let jobs = Arc::new(InMemoryJobStore::new());
        let gateway = Arc::new(MockGateway::new());
        let booking = Arc::new(StaticBookingPort::new());
        let event_log = Arc::new(InMemoryEventLog::new());
        let outbox = Arc::new(NotificationOutbox::new());
        let settings = Arc::new(CachedSettings::new(
            InMemorySettings::new(),
            StdDuration::from_secs(60),
        ));
        let ledger = Arc::new(InMemoryCancellationLedger::new());

        let service = Arc::new(AuthorizationService::new(
            Arc::clone(&store),
            Arc::clone(&jobs),
            gateway.clone(),
            booking.clone(),
            event_log.clone(),
            Arc::clone(&outbox),
            settings.clone(),
        ));
        let cancellations = CancellationEngine::new(
            Arc::clone(&store),
            Arc::clone(&jobs),
            gateway.clone(),
            booking.clone(),
            event_log.clone(),
            Arc::clone(&outbox),
            ledger.clone(),
            settings.clone(),
        );

        Self {
            store,
            jobs,
            gateway,
            booking,
            event_log,
            outbox,
            settings,
            ledger,
            service,
            cancellations,
        }
    }

    /// Registers the snapshot and returns its booking id
    pub fn register(&self, builder: BookingSnapshotBuilder) -> BookingId {
        let booking_id = builder.booking_id();
        self.booking.register(builder.build());
        booking_id
    }

    /// Creates and confirms an authorization for the booking, acting as
    /// the booking's sender
    pub async fn confirmed_authorization(
        &self,
        booking_id: BookingId,
        sender_id: UserId,
    ) -> Result<PaymentAuthorization, PaymentError> {
        let auth = self.service.create_authorization(booking_id).await?;
        self.service.confirm(auth.id(), sender_id).await
    }

    /// Sweeps the queue once as the background worker would, treating
    /// `now` as the current time for due-job selection
    pub async fn run_due_jobs(&self, now: DateTime<Utc>) -> Result<u32, SchedulerError> {
        let executor = Arc::new(PaymentJobExecutor::new(
            Arc::clone(&self.service),
            Arc::clone(&self.jobs),
        ));
        let runner = JobRunner::new(Arc::clone(&self.jobs), executor, RunnerConfig::default());
        runner.run_once(now).await
    }
}

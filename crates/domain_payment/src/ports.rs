//! Persistence and upstream ports
//!
//! Traits the infrastructure layer implements, plus in-memory versions
//! used by tests and local runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use core_kernel::{AuthorizationId, BookingId, Money, PortError, TripId, UserId};

use crate::authorization::{AuthorizationStatus, PaymentAuthorization};
use crate::escrow::EscrowAccount;
use crate::transaction::LedgerTransaction;

/// Storage boundary for authorizations
///
/// Implementations enforce two things the domain cannot: at most one
/// non-terminal authorization per booking, and optimistic versioning on
/// update.
#[async_trait]
pub trait AuthorizationStore: Send + Sync {
    /// Inserts a new authorization
    ///
    /// Fails with `Conflict` when the booking already has a non-terminal
    /// authorization.
    async fn insert(&self, auth: &PaymentAuthorization) -> Result<(), PortError>;

    async fn get(&self, id: AuthorizationId) -> Result<PaymentAuthorization, PortError>;

    /// The booking's live (non-terminal) authorization, if any
    async fn find_active_for_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<Option<PaymentAuthorization>, PortError>;

    /// Persists a mutated aggregate
    ///
    /// `loaded_version` is the version read before mutation; fails with
    /// `Conflict` when another writer got there first.
    async fn update(
        &self,
        auth: &PaymentAuthorization,
        loaded_version: u32,
    ) -> Result<(), PortError>;

    async fn list_by_status(
        &self,
        status: AuthorizationStatus,
    ) -> Result<Vec<PaymentAuthorization>, PortError>;

    /// Non-terminal authorizations for every booking on a trip
    async fn list_active_for_trip(
        &self,
        trip_id: TripId,
    ) -> Result<Vec<PaymentAuthorization>, PortError>;

    async fn record_transaction(&self, txn: &LedgerTransaction) -> Result<(), PortError>;

    async fn transactions_for(
        &self,
        authorization_id: AuthorizationId,
    ) -> Result<Vec<LedgerTransaction>, PortError>;

    async fn save_escrow(&self, escrow: &EscrowAccount) -> Result<(), PortError>;

    async fn escrow_for(
        &self,
        authorization_id: AuthorizationId,
    ) -> Result<Option<EscrowAccount>, PortError>;
}

/// What the payment engine needs to know about a booking
#[derive(Debug, Clone)]
pub struct BookingSnapshot {
    pub booking_id: BookingId,
    pub trip_id: TripId,
    /// The sender paying for the shipment
    pub sender_id: UserId,
    /// The traveler carrying the package
    pub traveler_id: UserId,
    pub amount: Money,
    pub departure_at: DateTime<Utc>,
    /// Traveler's payable account at the gateway, None until onboarded
    pub destination_account: Option<String>,
    /// Confirmed bookings the traveler carries on this trip
    pub traveler_confirmed_bookings: u32,
}

/// Upstream booking context
#[async_trait]
pub trait BookingPort: Send + Sync {
    async fn snapshot(&self, booking_id: BookingId) -> Result<BookingSnapshot, PortError>;

    /// Notifies the booking domain of a payment status change
    async fn payment_state_changed(
        &self,
        booking_id: BookingId,
        status: AuthorizationStatus,
    ) -> Result<(), PortError>;
}

/// Booking port that knows nothing and accepts everything
///
/// For deployments where booking sync runs through a separate channel.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBookingPort;

#[async_trait]
impl BookingPort for NoopBookingPort {
    async fn snapshot(&self, booking_id: BookingId) -> Result<BookingSnapshot, PortError> {
        Err(PortError::not_found("Booking", booking_id.to_string()))
    }

    async fn payment_state_changed(
        &self,
        _booking_id: BookingId,
        _status: AuthorizationStatus,
    ) -> Result<(), PortError> {
        Ok(())
    }
}

/// Booking port serving a fixed set of snapshots
#[derive(Default)]
pub struct StaticBookingPort {
    snapshots: Mutex<HashMap<BookingId, BookingSnapshot>>,
}

impl StaticBookingPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, snapshot: BookingSnapshot) {
        if let Ok(mut snapshots) = self.snapshots.lock() {
            snapshots.insert(snapshot.booking_id, snapshot);
        }
    }
}

#[async_trait]
impl BookingPort for StaticBookingPort {
    async fn snapshot(&self, booking_id: BookingId) -> Result<BookingSnapshot, PortError> {
        let snapshots = self
            .snapshots
            .lock()
            .map_err(|_| PortError::internal("booking port lock poisoned"))?;
        snapshots
            .get(&booking_id)
            .cloned()
            .ok_or_else(|| PortError::not_found("Booking", booking_id.to_string()))
    }

    async fn payment_state_changed(
        &self,
        _booking_id: BookingId,
        _status: AuthorizationStatus,
    ) -> Result<(), PortError> {
        Ok(())
    }
}

#[derive(Default)]
struct StoreInner {
    authorizations: HashMap<AuthorizationId, PaymentAuthorization>,
    transactions: Vec<LedgerTransaction>,
    escrows: HashMap<AuthorizationId, EscrowAccount>,
}

/// Mutex-guarded store for tests and local runs
#[derive(Default)]
pub struct InMemoryAuthorizationStore {
    inner: Mutex<StoreInner>,
}

impl InMemoryAuthorizationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, StoreInner>, PortError> {
        self.inner
            .lock()
            .map_err(|_| PortError::internal("authorization store lock poisoned"))
    }
}

#[async_trait]
impl AuthorizationStore for InMemoryAuthorizationStore {
    async fn insert(&self, auth: &PaymentAuthorization) -> Result<(), PortError> {
        let mut inner = self.lock()?;
        let duplicate = inner
            .authorizations
            .values()
            .any(|a| a.booking_id() == auth.booking_id() && !a.is_terminal());
        if duplicate {
            return Err(PortError::conflict(format!(
                "booking {} already has an active authorization",
                auth.booking_id()
            )));
        }
        inner.authorizations.insert(auth.id(), auth.clone());
        Ok(())
    }

    async fn get(&self, id: AuthorizationId) -> Result<PaymentAuthorization, PortError> {
        let inner = self.lock()?;
        inner
            .authorizations
            .get(&id)
            .cloned()
            .ok_or_else(|| PortError::not_found("PaymentAuthorization", id.to_string()))
    }

    async fn find_active_for_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<Option<PaymentAuthorization>, PortError> {
        let inner = self.lock()?;
        Ok(inner
            .authorizations
            .values()
            .find(|a| a.booking_id() == booking_id && !a.is_terminal())
            .cloned())
    }

    async fn update(
        &self,
        auth: &PaymentAuthorization,
        loaded_version: u32,
    ) -> Result<(), PortError> {
        let mut inner = self.lock()?;
        let current = inner
            .authorizations
            .get(&auth.id())
            .ok_or_else(|| PortError::not_found("PaymentAuthorization", auth.id().to_string()))?;
        if current.version() != loaded_version {
            return Err(PortError::conflict(format!(
                "authorization {} was modified concurrently (stored v{}, loaded v{})",
                auth.id(),
                current.version(),
                loaded_version
            )));
        }
        inner.authorizations.insert(auth.id(), auth.clone());
        Ok(())
    }

    async fn list_by_status(
        &self,
        status: AuthorizationStatus,
    ) -> Result<Vec<PaymentAuthorization>, PortError> {
        let inner = self.lock()?;
        let mut matches: Vec<_> = inner
            .authorizations
            .values()
            .filter(|a| a.status() == status)
            .cloned()
            .collect();
        matches.sort_by_key(|a| a.created_at());
        Ok(matches)
    }

    async fn list_active_for_trip(
        &self,
        trip_id: TripId,
    ) -> Result<Vec<PaymentAuthorization>, PortError> {
        let inner = self.lock()?;
        let mut matches: Vec<_> = inner
            .authorizations
            .values()
            .filter(|a| a.trip_id() == trip_id && !a.is_terminal())
            .cloned()
            .collect();
        matches.sort_by_key(|a| a.created_at());
        Ok(matches)
    }

    async fn record_transaction(&self, txn: &LedgerTransaction) -> Result<(), PortError> {
        let mut inner = self.lock()?;
        inner.transactions.push(txn.clone());
        Ok(())
    }

    async fn transactions_for(
        &self,
        authorization_id: AuthorizationId,
    ) -> Result<Vec<LedgerTransaction>, PortError> {
        let inner = self.lock()?;
        Ok(inner
            .transactions
            .iter()
            .filter(|t| t.authorization_id == authorization_id)
            .cloned()
            .collect())
    }

    async fn save_escrow(&self, escrow: &EscrowAccount) -> Result<(), PortError> {
        let mut inner = self.lock()?;
        inner
            .escrows
            .insert(escrow.authorization_id(), escrow.clone());
        Ok(())
    }

    async fn escrow_for(
        &self,
        authorization_id: AuthorizationId,
    ) -> Result<Option<EscrowAccount>, PortError> {
        let inner = self.lock()?;
        Ok(inner.escrows.get(&authorization_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use core_kernel::{Currency, Money};

    fn snapshot() -> BookingSnapshot {
        BookingSnapshot {
            booking_id: BookingId::new(),
            trip_id: TripId::new(),
            sender_id: UserId::new(),
            traveler_id: UserId::new(),
            amount: Money::from_minor(10_000, Currency::USD),
            departure_at: Utc::now() + Duration::hours(72),
            destination_account: Some("acct_1".to_string()),
            traveler_confirmed_bookings: 0,
        }
    }

    fn build_auth(booking_id: BookingId) -> PaymentAuthorization {
        PaymentAuthorization::new(
            booking_id,
            TripId::new(),
            UserId::new(),
            UserId::new(),
            Money::from_minor(10_000, Currency::USD),
            Money::from_minor(500, Currency::USD),
            Some("acct_1".to_string()),
            Some("pi_1".to_string()),
            Utc::now() + Duration::hours(72),
            Utc::now() + Duration::hours(24),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_one_active_authorization_per_booking() {
        let store = InMemoryAuthorizationStore::new();
        let booking_id = BookingId::new();

        store.insert(&build_auth(booking_id)).await.unwrap();
        let second = store.insert(&build_auth(booking_id)).await;
        assert!(matches!(second, Err(PortError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_terminal_authorization_frees_booking() {
        let store = InMemoryAuthorizationStore::new();
        let booking_id = BookingId::new();

        let mut first = build_auth(booking_id);
        store.insert(&first).await.unwrap();

        let loaded = first.version();
        first.cancel(None, "sender withdrew").unwrap();
        store.update(&first, loaded).await.unwrap();

        store.insert(&build_auth(booking_id)).await.unwrap();
        let active = store.find_active_for_booking(booking_id).await.unwrap();
        assert!(active.is_some());
    }

    #[tokio::test]
    async fn test_stale_update_conflicts() {
        let store = InMemoryAuthorizationStore::new();
        let auth = build_auth(BookingId::new());
        store.insert(&auth).await.unwrap();

        let mut copy_a = store.get(auth.id()).await.unwrap();
        let mut copy_b = store.get(auth.id()).await.unwrap();
        let loaded = copy_a.version();

        copy_a.cancel(None, "first writer").unwrap();
        store.update(&copy_a, loaded).await.unwrap();

        copy_b.expire().unwrap();
        let stale = store.update(&copy_b, loaded).await;
        assert!(matches!(stale, Err(PortError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_static_booking_port_round_trip() {
        let port = StaticBookingPort::new();
        let snap = snapshot();
        let booking_id = snap.booking_id;
        port.register(snap);

        let loaded = port.snapshot(booking_id).await.unwrap();
        assert_eq!(loaded.booking_id, booking_id);

        let missing = port.snapshot(BookingId::new()).await;
        assert!(missing.is_err());
    }
}

//! Payment Domain - deferred-capture authorization engine
//!
//! Money in this marketplace changes hands only after several real-world
//! milestones separated by days: a traveler accepts a booking, the sender
//! confirms, the package is delivered. Funds are therefore reserved early
//! (gateway authorization with manual capture) and captured late, and every
//! waiting period carries a deadline enforced by the scheduler domain.
//!
//! # Lifecycle
//!
//! ```text
//! pending_gateway_setup ──> pending ──confirm──> confirmed ──capture──> captured
//!        │                     │                   │    │
//!        │                     │ deadline          │    └──gateway fail──> failed ──retry──> captured
//!        │                     v                   v deadline
//!        └──cancel──────>  expired            expired
//!                 (cancel exits from any non-terminal state)
//! ```
//!
//! `captured`, `cancelled`, and `expired` are terminal. `failed` can still
//! be captured (scheduled retry or operator action) while its deadline has
//! not elapsed.

pub mod authorization;
pub mod fees;
pub mod transaction;
pub mod escrow;
pub mod events;
pub mod outbox;
pub mod gateway;
pub mod ports;
pub mod service;
pub mod jobs;
pub mod delivery_code;
pub mod error;

pub use authorization::{
    AuthorizationRecord, AuthorizationStatus, CaptureSchedule, PaymentAuthorization, PaymentEvent,
};
pub use fees::FeeBreakdown;
pub use transaction::{LedgerTransaction, TransactionKind, TransactionStatus};
pub use escrow::{EscrowAccount, EscrowError, EscrowRecord, EscrowStatus};
pub use events::{EventKind, EventLogPort, EventRecord, InMemoryEventLog};
pub use outbox::{NotificationOutbox, NoticeKind, TransitionNotice};
pub use gateway::{
    AuthorizeRequest, GatewayAuthorization, GatewayChargeStatus, GatewayError, PaymentGatewayPort,
};
pub use ports::{
    AuthorizationStore, BookingPort, BookingSnapshot, InMemoryAuthorizationStore, NoopBookingPort,
    StaticBookingPort,
};
pub use service::{AuthorizationService, CaptureReason};
pub use jobs::PaymentJobExecutor;
pub use delivery_code::{generate_delivery_code, DeliveryCodeError};
pub use error::PaymentError;

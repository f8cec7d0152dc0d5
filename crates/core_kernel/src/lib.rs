//! Core Kernel - Foundational types and utilities for the payment engine
//!
//! This crate provides the fundamental building blocks used across all domain modules:
//! - Money types in integer minor units with exact percentage arithmetic
//! - Strongly-typed identifiers for bookings, authorizations, and jobs
//! - The runtime-mutable settings provider and payment policy snapshot
//! - Port abstractions for infrastructure adapters

pub mod money;
pub mod identifiers;
pub mod error;
pub mod ports;
pub mod settings;

pub use money::{Money, Currency, Rate, MoneyError};
pub use identifiers::{
    BookingId, AuthorizationId, JobId, TransactionId,
    EscrowAccountId, UserId, TripId, EventId,
};
pub use error::CoreError;
pub use ports::{PortError, DomainPort, CircuitBreakerConfig};
pub use settings::{
    SettingValue, SettingsPort, SettingsError, CachedSettings,
    InMemorySettings, PaymentPolicy,
};

//! Test Utilities Crate
//!
//! Shared test infrastructure for the payment engine test suite.
//!
//! # Modules
//!
//! - `fixtures`: pre-built money and time values
//! - `builders`: builder patterns for test data construction
//! - `harness`: a fully wired in-memory engine for scenario tests
//! - `assertions`: custom assertion helpers for domain types

pub mod assertions;
pub mod builders;
pub mod fixtures;
pub mod harness;

pub use assertions::*;
pub use builders::*;
pub use fixtures::*;
pub use harness::*;

//! Cancellation Domain - policy classification and refund settlement
//!
//! Given who is cancelling and when, this crate decides the policy
//! bucket, computes how the held funds split between sender refund and
//! traveler compensation, enforces the traveler's monthly cancellation
//! allowance, and settles everything atomically against the payment
//! domain's stores.

pub mod allowance;
pub mod engine;
pub mod error;
pub mod policy;

pub use allowance::{AllowancePeriod, CancellationLedger, InMemoryCancellationLedger};
pub use engine::{CancellationEngine, CancellationOutcome, CancellationRequest};
pub use error::CancellationError;
pub use policy::{
    classify, compute_split, CancellationActor, CancellationBucket, CancellationContext,
    CancellationSplit,
};

//! Payment gateway infrastructure
//!
//! Everything between the payment domain's gateway port and the real
//! processor: the REST adapter with retries and a circuit breaker, a
//! transport seam for scripting responses in tests, an in-process
//! simulator for local runs, and the reconciler that converges local
//! state after ambiguous gateway outcomes.

pub mod adapter;
pub mod breaker;
pub mod config;
pub mod mock;
pub mod reconciler;
pub mod transport;

pub use adapter::HttpPaymentGateway;
pub use breaker::CircuitBreaker;
pub use config::GatewayConfig;
pub use mock::MockGateway;
pub use reconciler::{ReconcileOutcome, ReconcileReport, Reconciler};
pub use transport::{ApiRequest, ApiResponse, GatewayTransport, HttpMethod, MockTransport, TransportError};

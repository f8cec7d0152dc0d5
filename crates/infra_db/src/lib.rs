//! Infrastructure Database Layer
//!
//! PostgreSQL persistence for the payment engine, built on SQLx. The crate
//! splits into two layers: `repositories` speak SQL and return
//! [`DatabaseError`], and `adapters` wrap them into the port traits the
//! domain crates consume.
//!
//! Two invariants the schema enforces that the domain cannot:
//! a partial unique index keeps at most one non-terminal authorization per
//! booking, and job claims use `FOR UPDATE SKIP LOCKED` so concurrent
//! workers never execute the same job.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, run_migrations, DatabaseConfig, PgAuthorizationStore};
//!
//! let pool = create_pool(DatabaseConfig::default()).await?;
//! run_migrations(&pool).await?;
//! let store = PgAuthorizationStore::new(pool);
//! ```

pub mod pool;
pub mod error;
pub mod rows;
pub mod repositories;
pub mod adapters;

pub use pool::{DatabasePool, create_pool, run_migrations, DatabaseConfig};
pub use error::DatabaseError;
pub use adapters::{PgAuthorizationStore, PgCancellationLedger, PgEventLog, PgJobStore, PgSettings};

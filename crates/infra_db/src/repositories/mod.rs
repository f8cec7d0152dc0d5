//! Repository implementations over the connection pool

pub mod allowance;
pub mod authorizations;
pub mod escrow;
pub mod events;
pub mod jobs;
pub mod settings;
pub mod transactions;

pub use allowance::AllowanceRepository;
pub use authorizations::AuthorizationRepository;
pub use escrow::EscrowRepository;
pub use events::EventLogRepository;
pub use jobs::JobRepository;
pub use settings::SettingsRepository;
pub use transactions::TransactionRepository;

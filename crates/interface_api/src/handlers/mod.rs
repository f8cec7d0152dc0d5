//! Request handlers

pub mod authorizations;
pub mod health;
pub mod jobs;

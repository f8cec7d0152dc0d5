//! Job queue handlers

use axum::{extract::State, Json};

use domain_payment::AuthorizationStore;
use domain_scheduler::{JobStore, QueueStats};

use crate::{error::ApiError, AppState};

/// Queue depth and due-work statistics
pub async fn stats<S, J>(
    State(state): State<AppState<S, J>>,
) -> Result<Json<QueueStats>, ApiError>
where
    S: AuthorizationStore + 'static,
    J: JobStore,
{
    Ok(Json(state.jobs.stats().await?))
}

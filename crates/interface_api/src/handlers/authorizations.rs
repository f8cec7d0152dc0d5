//! Authorization handlers

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use uuid::Uuid;
use validator::Validate;

use core_kernel::{AuthorizationId, UserId};
use domain_payment::{
    AuthorizationStore, CaptureReason, EventRecord, LedgerTransaction,
};
use domain_scheduler::JobStore;

use crate::auth::Claims;
use crate::dto::authorizations::{
    AuthorizationResponse, CancelAuthorizationRequest, ListAuthorizationsQuery,
};
use crate::{error::ApiError, AppState};

/// Lists authorizations in a given status
pub async fn list<S, J>(
    State(state): State<AppState<S, J>>,
    Query(query): Query<ListAuthorizationsQuery>,
) -> Result<Json<Vec<AuthorizationResponse>>, ApiError>
where
    S: AuthorizationStore + 'static,
    J: JobStore,
{
    let auths = state.service.list_by_status(query.status).await?;
    Ok(Json(auths.iter().map(AuthorizationResponse::from).collect()))
}

/// Gets one authorization
pub async fn get<S, J>(
    State(state): State<AppState<S, J>>,
    Path(id): Path<Uuid>,
) -> Result<Json<AuthorizationResponse>, ApiError>
where
    S: AuthorizationStore + 'static,
    J: JobStore,
{
    let auth = state.service.get(AuthorizationId::from(id)).await?;
    Ok(Json(AuthorizationResponse::from(&auth)))
}

/// The authorization's full event history, oldest first
pub async fn timeline<S, J>(
    State(state): State<AppState<S, J>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<EventRecord>>, ApiError>
where
    S: AuthorizationStore + 'static,
    J: JobStore,
{
    Ok(Json(state.service.timeline(AuthorizationId::from(id)).await?))
}

/// Ledger transactions recorded against the authorization
pub async fn transactions<S, J>(
    State(state): State<AppState<S, J>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<LedgerTransaction>>, ApiError>
where
    S: AuthorizationStore + 'static,
    J: JobStore,
{
    Ok(Json(
        state.service.transactions(AuthorizationId::from(id)).await?,
    ))
}

/// Operator force-capture
///
/// The one path that can retry a capture after automatic attempts are
/// exhausted.
pub async fn capture<S, J>(
    State(state): State<AppState<S, J>>,
    Path(id): Path<Uuid>,
) -> Result<Json<AuthorizationResponse>, ApiError>
where
    S: AuthorizationStore + 'static,
    J: JobStore,
{
    let auth = state
        .service
        .capture(AuthorizationId::from(id), CaptureReason::Manual)
        .await?;
    Ok(Json(AuthorizationResponse::from(&auth)))
}

/// Cancels an authorization on behalf of a sender or traveler
pub async fn cancel<S, J>(
    State(state): State<AppState<S, J>>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<CancelAuthorizationRequest>,
) -> Result<Json<domain_cancellation::CancellationOutcome>, ApiError>
where
    S: AuthorizationStore + 'static,
    J: JobStore,
{
    request.validate()?;

    let actor_id = claims
        .sub
        .parse::<Uuid>()
        .map(UserId::from)
        .map_err(|_| ApiError::BadRequest(format!("token subject '{}' is not a user id", claims.sub)))?;

    let outcome = state
        .cancellations
        .cancel(domain_cancellation::CancellationRequest {
            authorization_id: AuthorizationId::from(id),
            actor_id,
            actor: request.actor,
            reason: request.reason,
            no_show: request.no_show,
        })
        .await?;
    Ok(Json(outcome))
}

//! HTTP API Layer
//!
//! Operator surface over the payment engine using Axum. Sender and
//! traveler traffic flows through the marketplace backend; this API is
//! for operators: inspecting authorizations and their histories,
//! force-capturing after retry exhaustion, and cancelling on a user's
//! behalf.
//!
//! # Architecture
//!
//! - **Handlers**: thin translations from HTTP to the domain services
//! - **Middleware**: JWT authentication and audit logging
//! - **DTOs**: request/response data transfer objects
//! - **Error Handling**: one mapping from the domain taxonomy to status codes
//!
//! # Example
//!
//! ```rust,ignore
//! use interface_api::{create_router, AppState};
//!
//! let app = create_router(state);
//! axum::serve(listener, app).await?;
//! ```

pub mod config;
pub mod error;
pub mod middleware;
pub mod handlers;
pub mod dto;
pub mod auth;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use domain_cancellation::CancellationEngine;
use domain_payment::{AuthorizationService, AuthorizationStore};
use domain_scheduler::JobStore;

use crate::config::ApiConfig;
use crate::handlers::{authorizations, health, jobs};
use crate::middleware::{audit_middleware, auth_middleware};

/// Application state shared across handlers
pub struct AppState<S, J> {
    pub service: Arc<AuthorizationService<S, J>>,
    pub cancellations: Arc<CancellationEngine<S, J>>,
    pub jobs: Arc<J>,
    pub config: ApiConfig,
}

impl<S, J> Clone for AppState<S, J> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            cancellations: Arc::clone(&self.cancellations),
            jobs: Arc::clone(&self.jobs),
            config: self.config.clone(),
        }
    }
}

/// Creates the main API router
pub fn create_router<S, J>(state: AppState<S, J>) -> Router
where
    S: AuthorizationStore + 'static,
    J: JobStore,
{
    // Public routes (no auth required)
    let public_routes = Router::new().route("/health", get(health::health_check));

    let authorization_routes = Router::new()
        .route("/", get(authorizations::list::<S, J>))
        .route("/:id", get(authorizations::get::<S, J>))
        .route("/:id/timeline", get(authorizations::timeline::<S, J>))
        .route("/:id/transactions", get(authorizations::transactions::<S, J>))
        .route("/:id/capture", post(authorizations::capture::<S, J>))
        .route("/:id/cancel", post(authorizations::cancel::<S, J>));

    let job_routes = Router::new().route("/stats", get(jobs::stats::<S, J>));

    // Protected API routes
    let api_routes = Router::new()
        .nest("/authorizations", authorization_routes)
        .nest("/jobs", job_routes)
        .layer(axum_middleware::from_fn(audit_middleware))
        .layer(axum_middleware::from_fn_with_state(
            state.config.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

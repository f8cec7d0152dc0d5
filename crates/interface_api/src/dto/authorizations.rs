//! Authorization DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use domain_cancellation::CancellationActor;
use domain_payment::PaymentAuthorization;

#[derive(Debug, Deserialize)]
pub struct ListAuthorizationsQuery {
    pub status: domain_payment::AuthorizationStatus,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CancelAuthorizationRequest {
    pub actor: CancellationActor,
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
    /// Sender reporting the traveler absent at handoff
    #[serde(default)]
    pub no_show: bool,
}

#[derive(Debug, Serialize)]
pub struct AuthorizationResponse {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub trip_id: Uuid,
    pub status: String,
    pub amount_cents: i64,
    pub currency: String,
    pub platform_fee_cents: i64,
    pub gateway_handle: Option<String>,
    pub confirm_by: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub auto_capture_at: Option<DateTime<Utc>>,
    pub departure_at: DateTime<Utc>,
    pub capture_attempts: u32,
    pub last_error: Option<String>,
    pub delivery_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&PaymentAuthorization> for AuthorizationResponse {
    fn from(auth: &PaymentAuthorization) -> Self {
        Self {
            id: auth.id().into(),
            booking_id: auth.booking_id().into(),
            trip_id: auth.trip_id().into(),
            status: auth.status().as_str().to_string(),
            amount_cents: auth.amount().cents(),
            currency: auth.amount().currency().code().to_string(),
            platform_fee_cents: auth.platform_fee().cents(),
            gateway_handle: auth.gateway_handle().map(String::from),
            confirm_by: auth.confirm_by(),
            expires_at: auth.expires_at(),
            auto_capture_at: auth.auto_capture_at(),
            departure_at: auth.departure_at(),
            capture_attempts: auth.capture_attempts(),
            last_error: auth.last_error().map(String::from),
            delivery_code: auth.delivery_code().map(String::from),
            created_at: auth.created_at(),
        }
    }
}

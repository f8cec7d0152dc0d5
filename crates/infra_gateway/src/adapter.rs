//! REST adapter for the payment processor
//!
//! Implements [`PaymentGatewayPort`] over a [`GatewayTransport`]. Every
//! write carries an idempotency key, so transient transport failures are
//! retried with exponential backoff without double-charging. HTTP
//! statuses map onto the port's error taxonomy: 402 is a decline, 409 a
//! state conflict, timeouts and 5xx an unknown outcome.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use core_kernel::Money;
use domain_payment::{
    AuthorizeRequest, GatewayAuthorization, GatewayChargeStatus, GatewayError, PaymentGatewayPort,
};

use crate::breaker::CircuitBreaker;
use crate::config::GatewayConfig;
use crate::transport::{ApiRequest, ApiResponse, GatewayTransport, HttpMethod, TransportError};

pub struct HttpPaymentGateway {
    config: GatewayConfig,
    transport: Arc<dyn GatewayTransport>,
    breaker: Option<CircuitBreaker>,
}

impl HttpPaymentGateway {
    pub fn new(config: GatewayConfig, transport: Arc<dyn GatewayTransport>) -> Self {
        let breaker = config.circuit_breaker.clone().map(CircuitBreaker::new);
        Self {
            config,
            transport,
            breaker,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    pub async fn is_circuit_open(&self) -> bool {
        match &self.breaker {
            Some(cb) => !cb.is_available().await,
            None => false,
        }
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, GatewayError> {
        self.request(ApiRequest {
            method: HttpMethod::Post,
            path: path.to_string(),
            body: Some(body),
            idempotency_key: Some(Uuid::now_v7().to_string()),
            bearer_token: self.config.api_key.clone(),
            timeout_secs: self.config.timeout_secs,
        })
        .await
    }

    async fn get(&self, path: &str) -> Result<Value, GatewayError> {
        self.request(ApiRequest {
            method: HttpMethod::Get,
            path: path.to_string(),
            body: None,
            idempotency_key: None,
            bearer_token: self.config.api_key.clone(),
            timeout_secs: self.config.timeout_secs,
        })
        .await
    }

    /// Sends a request with breaker check, bounded retries, and status
    /// mapping
    ///
    /// Only transport failures and 5xx are retried; the idempotency key
    /// makes the replayed POST a no-op at the processor.
    async fn request(&self, request: ApiRequest) -> Result<Value, GatewayError> {
        if let Some(cb) = &self.breaker {
            if !cb.is_available().await {
                return Err(GatewayError::unavailable("circuit breaker is open"));
            }
        }

        let mut last_error = GatewayError::unavailable("no attempts made");
        for attempt in 0..=self.config.retry_attempts {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(100 * (1 << attempt))).await;
            }

            match self.transport.send(request.clone()).await {
                Ok(response) if response.status < 300 => {
                    if let Some(cb) = &self.breaker {
                        cb.record_success();
                    }
                    debug!(path = %request.path, status = response.status, "gateway call ok");
                    return Ok(response.body);
                }
                Ok(response) if response.status >= 500 || response.status == 429 => {
                    warn!(
                        path = %request.path,
                        status = response.status,
                        attempt,
                        "gateway server error, retrying"
                    );
                    if let Some(cb) = &self.breaker {
                        cb.record_failure().await;
                    }
                    last_error = map_status(&response);
                }
                Ok(response) => {
                    // Client errors are definitive; no retry, and they do
                    // not count against the breaker
                    if let Some(cb) = &self.breaker {
                        cb.record_success();
                    }
                    return Err(map_status(&response));
                }
                Err(err) => {
                    warn!(path = %request.path, error = %err, attempt, "gateway transport failure");
                    if let Some(cb) = &self.breaker {
                        cb.record_failure().await;
                    }
                    last_error = match err {
                        TransportError::Timeout(secs) => GatewayError::unavailable(format!(
                            "request timed out after {secs}s"
                        )),
                        TransportError::Connection(message) => {
                            GatewayError::unavailable(message)
                        }
                    };
                }
            }
        }
        Err(last_error)
    }
}

fn error_message(body: &Value) -> String {
    body.pointer("/error/message")
        .and_then(Value::as_str)
        .unwrap_or("unknown gateway error")
        .to_string()
}

fn map_status(response: &ApiResponse) -> GatewayError {
    match response.status {
        402 => GatewayError::rejected(error_message(&response.body)),
        409 => GatewayError::NotCapturable {
            state: response
                .body
                .pointer("/error/charge_status")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
        },
        status if status >= 500 || status == 429 => GatewayError::unavailable(format!(
            "gateway returned {status}: {}",
            error_message(&response.body)
        )),
        status => GatewayError::rejected(format!(
            "gateway returned {status}: {}",
            error_message(&response.body)
        )),
    }
}

fn parse_charge(body: &Value) -> Result<GatewayAuthorization, GatewayError> {
    let handle = body
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| GatewayError::unavailable("malformed gateway response: missing id"))?
        .to_string();
    Ok(GatewayAuthorization {
        handle,
        status: parse_charge_status(body)?,
    })
}

fn parse_charge_status(body: &Value) -> Result<GatewayChargeStatus, GatewayError> {
    let status = body
        .get("status")
        .cloned()
        .ok_or_else(|| GatewayError::unavailable("malformed gateway response: missing status"))?;
    serde_json::from_value(status)
        .map_err(|e| GatewayError::unavailable(format!("unrecognized charge status: {e}")))
}

#[async_trait]
impl PaymentGatewayPort for HttpPaymentGateway {
    async fn authorize(
        &self,
        request: AuthorizeRequest,
    ) -> Result<GatewayAuthorization, GatewayError> {
        let body = self
            .post(
                "charges",
                json!({
                    "amount": request.amount.cents(),
                    "currency": request.amount.currency().code(),
                    "capture_method": "manual",
                    "destination": request.destination_account,
                    "application_fee_amount": request.application_fee.cents(),
                    "strong_auth": request.strong_auth,
                    "metadata": {
                        "booking_id": request.booking_id.to_string(),
                        "payer_id": request.payer_id.to_string(),
                    },
                }),
            )
            .await?;
        parse_charge(&body)
    }

    async fn capture(&self, handle: &str, amount: Money) -> Result<String, GatewayError> {
        let body = self
            .post(
                &format!("charges/{handle}/capture"),
                json!({ "amount": amount.cents() }),
            )
            .await?;
        body.get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| GatewayError::unavailable("malformed capture response: missing id"))
    }

    async fn cancel(&self, handle: &str) -> Result<(), GatewayError> {
        self.post(&format!("charges/{handle}/cancel"), json!({}))
            .await?;
        Ok(())
    }

    async fn refund(&self, handle: &str, amount: Money) -> Result<String, GatewayError> {
        let body = self
            .post(
                "refunds",
                json!({ "charge": handle, "amount": amount.cents() }),
            )
            .await?;
        body.get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| GatewayError::unavailable("malformed refund response: missing id"))
    }

    async fn retrieve(&self, handle: &str) -> Result<GatewayChargeStatus, GatewayError> {
        let body = self.get(&format!("charges/{handle}")).await?;
        parse_charge_status(&body)
    }
}

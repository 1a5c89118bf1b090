//! The gateway trait and its HTTP implementation.
//!
//! [`TicketGateway`] is the seam between the booking coordinator and the
//! backend: production code talks to [`HttpTicketGateway`], tests inject a
//! programmable double. All methods take the attempt's correlation ID and
//! attach it as the `x-correlation-id` request header.

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::feed::{self, FeedErrorCallback, QueueFeedHandle, StatusCallback};
use crate::types::{
    CheckoutFailure, ClaimOutcome, CorrelationId, ExtendOutcome, HoldOutcome, HoldRequest,
    HoldToken, IdempotencyKey, OrderReceipt, OrderRequest, QueueId, QueueJoinOutcome, QueueStatus,
};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Request header carrying the booking attempt's correlation ID
pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// Request header carrying the checkout deduplication key
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Network operations against the hold, queue, and order services
///
/// Implementations absorb the backend's error surface into the typed
/// results of [`crate::types`]. Transport failures are retryable; business
/// rejections are definitive.
#[async_trait]
pub trait TicketGateway: Send + Sync {
    /// Request a time-boxed hold on the selected ticket categories
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] on transport, timeout, or decode failure.
    async fn attempt_hold(
        &self,
        request: &HoldRequest,
        correlation_id: CorrelationId,
    ) -> Result<HoldOutcome, GatewayError>;

    /// Explicitly join the admission queue
    ///
    /// Fallback path when the hold endpoint rejects without offering queue
    /// placement.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] on transport, timeout, or decode failure.
    async fn join_queue(
        &self,
        request: &HoldRequest,
        correlation_id: CorrelationId,
    ) -> Result<QueueJoinOutcome, GatewayError>;

    /// Fetch the current status of a queue entry
    ///
    /// A transport failure is not terminal for the queue entry; the watch
    /// keeps polling.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] on transport, timeout, or decode failure.
    async fn queue_status(
        &self,
        queue_id: &QueueId,
        correlation_id: CorrelationId,
    ) -> Result<QueueStatus, GatewayError>;

    /// Claim the hold after queue admission when no credential was inlined
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] on transport, timeout, or decode failure.
    async fn claim_hold(
        &self,
        queue_id: &QueueId,
        correlation_id: CorrelationId,
    ) -> Result<ClaimOutcome, GatewayError>;

    /// Request a later expiry for an existing hold
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] on transport, timeout, or decode failure.
    async fn extend_hold(
        &self,
        hold_token: &HoldToken,
        correlation_id: CorrelationId,
    ) -> Result<ExtendOutcome, GatewayError>;

    /// Leave the admission queue, best effort
    ///
    /// Failures are logged and swallowed; the caller proceeds with its
    /// local reset regardless of the result.
    async fn leave_queue(&self, queue_id: &QueueId, correlation_id: CorrelationId) -> bool;

    /// Submit an order-create request
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutFailure`] classifying conflict (409), rate limit
    /// (429), business rejection, or transport failure.
    async fn create_order(
        &self,
        request: &OrderRequest,
        idempotency_key: IdempotencyKey,
        correlation_id: CorrelationId,
    ) -> Result<OrderReceipt, CheckoutFailure>;

    /// Open a push channel for queue-status updates
    ///
    /// Returns immediately. When no realtime endpoint is configured the
    /// handle reports `is_realtime() == false` and performs no work, so
    /// the coordinator transparently relies on polling alone.
    fn subscribe_to_queue(
        &self,
        queue_id: QueueId,
        correlation_id: CorrelationId,
        on_status: StatusCallback,
        on_error: FeedErrorCallback,
    ) -> QueueFeedHandle;
}

/// Production gateway over HTTP with an optional WebSocket push channel
#[derive(Clone)]
pub struct HttpTicketGateway {
    client: Client,
    config: GatewayConfig,
}

impl HttpTicketGateway {
    /// Create a gateway from configuration
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Transport`] if the HTTP client cannot be
    /// constructed (e.g., TLS backend initialization failure).
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Create a gateway from environment configuration
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Transport`] if the HTTP client cannot be
    /// constructed.
    pub fn from_env() -> Result<Self, GatewayError> {
        Self::new(GatewayConfig::from_env())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }

    /// POST a JSON body and decode a JSON response
    async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        op: &'static str,
        url: String,
        body: &B,
        correlation_id: CorrelationId,
    ) -> Result<T, GatewayError> {
        tracing::debug!(correlation_id = %correlation_id, op, url = %url, "Gateway request");
        metrics::counter!("gateway.requests.total", "op" => op).increment(1);

        let response = self
            .client
            .post(url)
            .header(CORRELATION_HEADER, correlation_id.to_string())
            .json(body)
            .send()
            .await
            .map_err(|e| {
                metrics::counter!("gateway.requests.failed", "op" => op).increment(1);
                GatewayError::from_reqwest(&e)
            })?;

        Self::decode(op, response).await
    }

    /// GET and decode a JSON response
    async fn get_json<T: DeserializeOwned>(
        &self,
        op: &'static str,
        url: String,
        correlation_id: CorrelationId,
    ) -> Result<T, GatewayError> {
        tracing::debug!(correlation_id = %correlation_id, op, url = %url, "Gateway request");
        metrics::counter!("gateway.requests.total", "op" => op).increment(1);

        let response = self
            .client
            .get(url)
            .header(CORRELATION_HEADER, correlation_id.to_string())
            .send()
            .await
            .map_err(|e| {
                metrics::counter!("gateway.requests.failed", "op" => op).increment(1);
                GatewayError::from_reqwest(&e)
            })?;

        Self::decode(op, response).await
    }

    async fn decode<T: DeserializeOwned>(
        op: &'static str,
        response: reqwest::Response,
    ) -> Result<T, GatewayError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(op, status = status.as_u16(), "Gateway request refused");
            metrics::counter!("gateway.requests.failed", "op" => op).increment(1);
            return Err(GatewayError::Http {
                status: status.as_u16(),
                message: body,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))
    }
}

#[async_trait]
impl TicketGateway for HttpTicketGateway {
    async fn attempt_hold(
        &self,
        request: &HoldRequest,
        correlation_id: CorrelationId,
    ) -> Result<HoldOutcome, GatewayError> {
        self.post_json("attempt_hold", self.url("/hold"), request, correlation_id)
            .await
    }

    async fn join_queue(
        &self,
        request: &HoldRequest,
        correlation_id: CorrelationId,
    ) -> Result<QueueJoinOutcome, GatewayError> {
        self.post_json("join_queue", self.url("/queue/join"), request, correlation_id)
            .await
    }

    async fn queue_status(
        &self,
        queue_id: &QueueId,
        correlation_id: CorrelationId,
    ) -> Result<QueueStatus, GatewayError> {
        let url = format!(
            "{}?correlationId={correlation_id}",
            self.url(&format!("/queue/status/{queue_id}"))
        );
        self.get_json("queue_status", url, correlation_id).await
    }

    async fn claim_hold(
        &self,
        queue_id: &QueueId,
        correlation_id: CorrelationId,
    ) -> Result<ClaimOutcome, GatewayError> {
        let body = serde_json::json!({
            "queueId": queue_id,
            "correlationId": correlation_id,
        });
        self.post_json("claim_hold", self.url("/queue/claim"), &body, correlation_id)
            .await
    }

    async fn extend_hold(
        &self,
        hold_token: &HoldToken,
        correlation_id: CorrelationId,
    ) -> Result<ExtendOutcome, GatewayError> {
        let body = serde_json::json!({
            "holdToken": hold_token,
            "correlationId": correlation_id,
        });
        self.post_json("extend_hold", self.url("/hold/extend"), &body, correlation_id)
            .await
    }

    async fn leave_queue(&self, queue_id: &QueueId, correlation_id: CorrelationId) -> bool {
        let url = self.url(&format!("/queue/leave/{queue_id}"));
        let result = self
            .client
            .post(url)
            .header(CORRELATION_HEADER, correlation_id.to_string())
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::warn!(
                    correlation_id = %correlation_id,
                    queue_id = %queue_id,
                    status = response.status().as_u16(),
                    "leave_queue refused, proceeding with local reset"
                );
                false
            }
            Err(error) => {
                tracing::warn!(
                    correlation_id = %correlation_id,
                    queue_id = %queue_id,
                    error = %error,
                    "leave_queue failed, proceeding with local reset"
                );
                false
            }
        }
    }

    async fn create_order(
        &self,
        request: &OrderRequest,
        idempotency_key: IdempotencyKey,
        correlation_id: CorrelationId,
    ) -> Result<OrderReceipt, CheckoutFailure> {
        tracing::debug!(
            correlation_id = %correlation_id,
            idempotency_key = %idempotency_key,
            "Submitting order-create"
        );
        metrics::counter!("gateway.requests.total", "op" => "create_order").increment(1);

        let response = self
            .client
            .post(self.url("/orders/create"))
            .header(CORRELATION_HEADER, correlation_id.to_string())
            .header(IDEMPOTENCY_HEADER, idempotency_key.to_string())
            .json(request)
            .send()
            .await
            .map_err(|e| {
                metrics::counter!("gateway.requests.failed", "op" => "create_order").increment(1);
                CheckoutFailure::Network(GatewayError::from_reqwest(&e))
            })?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED => {
                metrics::counter!("gateway.checkout.succeeded").increment(1);
                response
                    .json::<OrderReceipt>()
                    .await
                    .map_err(|e| CheckoutFailure::Network(GatewayError::Decode(e.to_string())))
            }
            StatusCode::CONFLICT => {
                metrics::counter!("gateway.checkout.conflict").increment(1);
                Err(CheckoutFailure::Processing)
            }
            StatusCode::TOO_MANY_REQUESTS => {
                metrics::counter!("gateway.checkout.rate_limited").increment(1);
                Err(CheckoutFailure::RateLimited)
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                tracing::warn!(
                    correlation_id = %correlation_id,
                    status = status.as_u16(),
                    "Order-create rejected"
                );
                metrics::counter!("gateway.checkout.rejected").increment(1);
                Err(CheckoutFailure::Rejected {
                    status: status.as_u16(),
                    message: body,
                })
            }
        }
    }

    fn subscribe_to_queue(
        &self,
        queue_id: QueueId,
        correlation_id: CorrelationId,
        on_status: StatusCallback,
        on_error: FeedErrorCallback,
    ) -> QueueFeedHandle {
        match &self.config.realtime_url {
            Some(realtime_url) => feed::spawn_websocket_feed(
                realtime_url.clone(),
                self.config.realtime_hub.clone(),
                queue_id,
                correlation_id,
                on_status,
                on_error,
            ),
            None => QueueFeedHandle::disabled(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_base_and_path() {
        #[allow(clippy::unwrap_used)]
        let gateway = HttpTicketGateway::new(GatewayConfig {
            base_url: "http://backend/api".to_string(),
            ..GatewayConfig::default()
        })
        .unwrap();
        assert_eq!(gateway.url("/hold"), "http://backend/api/hold");
        assert_eq!(
            gateway.url("/queue/status/q-1"),
            "http://backend/api/queue/status/q-1"
        );
    }
}

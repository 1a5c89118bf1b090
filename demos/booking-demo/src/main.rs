//! Scripted walkthrough of the booking coordinator.
//!
//! Runs the full reservation flow against an in-process backend double:
//! the hold attempt lands in the admission queue, the queue drains over a
//! few polls, the hold is claimed, extended once, and checked out.
//!
//! ```text
//! cargo run -p booking-demo
//! ```

use anyhow::Result;
use async_trait::async_trait;
use boxoffice_booking::{
    BookingConfig, BookingCoordinator, BookingStage, CheckoutPayload, SnapshotAdapter,
};
use boxoffice_core::environment::SystemClock;
use boxoffice_gateway::client::TicketGateway;
use boxoffice_gateway::config::PollConfig;
use boxoffice_gateway::error::GatewayError;
use boxoffice_gateway::feed::{FeedErrorCallback, QueueFeedHandle, StatusCallback};
use boxoffice_gateway::types::{
    CheckoutFailure, ClaimOutcome, CorrelationId, ExtendOutcome, GrantedHold, HoldOutcome,
    HoldRequest, HoldToken, IdempotencyKey, OrderReceipt, OrderRequest, QueueId,
    QueueJoinOutcome, QueuePlacement, QueueStatus, SelectionInput,
};
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// In-process backend: admits the caller through a short queue, grants a
/// ninety-second hold, honors one extension, and accepts the order.
struct ScriptedBackend {
    polls_left: AtomicU32,
}

impl ScriptedBackend {
    fn new(queue_len: u32) -> Self {
        Self {
            polls_left: AtomicU32::new(queue_len),
        }
    }

    fn grant(&self) -> GrantedHold {
        GrantedHold {
            hold_id: "hold-demo".into(),
            hold_token: HoldToken::new("tok-demo"),
            hold_expires_at: Utc::now() + ChronoDuration::seconds(90),
        }
    }
}

#[async_trait]
impl TicketGateway for ScriptedBackend {
    async fn attempt_hold(
        &self,
        _request: &HoldRequest,
        _correlation_id: CorrelationId,
    ) -> Result<HoldOutcome, GatewayError> {
        Ok(HoldOutcome::Queued {
            placement: QueuePlacement {
                queue_id: "q-demo".into(),
                position: self.polls_left.load(Ordering::SeqCst),
                eta_seconds: 8,
            },
        })
    }

    async fn join_queue(
        &self,
        _request: &HoldRequest,
        _correlation_id: CorrelationId,
    ) -> Result<QueueJoinOutcome, GatewayError> {
        Ok(QueueJoinOutcome::Rejected {
            reason: "queue_closed".into(),
            detail: None,
        })
    }

    async fn queue_status(
        &self,
        _queue_id: &QueueId,
        _correlation_id: CorrelationId,
    ) -> Result<QueueStatus, GatewayError> {
        let left = self
            .polls_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)))
            .unwrap_or(0);

        if left > 1 {
            Ok(QueueStatus::Queued {
                position: left - 1,
                eta_seconds: (left - 1) * 4,
            })
        } else {
            Ok(QueueStatus::ready())
        }
    }

    async fn claim_hold(
        &self,
        _queue_id: &QueueId,
        _correlation_id: CorrelationId,
    ) -> Result<ClaimOutcome, GatewayError> {
        Ok(ClaimOutcome::Granted { hold: self.grant() })
    }

    async fn extend_hold(
        &self,
        _hold_token: &HoldToken,
        _correlation_id: CorrelationId,
    ) -> Result<ExtendOutcome, GatewayError> {
        Ok(ExtendOutcome::Extended {
            hold_expires_at: Utc::now() + ChronoDuration::seconds(180),
        })
    }

    async fn leave_queue(&self, _queue_id: &QueueId, _correlation_id: CorrelationId) -> bool {
        true
    }

    async fn create_order(
        &self,
        request: &OrderRequest,
        idempotency_key: IdempotencyKey,
        _correlation_id: CorrelationId,
    ) -> Result<OrderReceipt, CheckoutFailure> {
        tracing::info!(
            event_id = %request.event_id,
            idempotency_key = %idempotency_key,
            "Backend accepted order"
        );
        Ok(OrderReceipt {
            order_id: "ord-demo-0001".into(),
            payment_redirect_url: Some("https://pay.example/ord-demo-0001".into()),
        })
    }

    fn subscribe_to_queue(
        &self,
        _queue_id: QueueId,
        _correlation_id: CorrelationId,
        _on_status: StatusCallback,
        _on_error: FeedErrorCallback,
    ) -> QueueFeedHandle {
        // No push channel in the demo; the poll fallback carries the watch
        QueueFeedHandle::disabled()
    }
}

async fn wait_for_stage(coordinator: &BookingCoordinator, stage: BookingStage) {
    loop {
        let snapshot = coordinator.snapshot().await;
        if snapshot.stage == stage {
            return;
        }
        if let (Some(position), Some(eta)) = (snapshot.queue_position, snapshot.queue_eta_seconds)
        {
            tracing::info!(position, eta_seconds = eta, "Waiting in queue");
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let backend = Arc::new(ScriptedBackend::new(4));
    let config = BookingConfig {
        queue_stale_after_secs: 900,
        checkout_wait_ms: 5_000,
        poll: PollConfig {
            min_interval_ms: 250,
            max_interval_ms: 1_000,
        },
    };

    let coordinator = BookingCoordinator::new(
        backend,
        Arc::new(SystemClock),
        SnapshotAdapter::memory_only(),
        config,
    )
    .await;

    tracing::info!("Starting booking for two general-admission tickets");
    coordinator
        .start(
            "evt-demo".into(),
            vec![SelectionInput::new("general-admission", 2)],
            Some("demo-shopper".into()),
        )
        .await;

    wait_for_stage(&coordinator, BookingStage::ReadyWithHold).await;
    let remaining = coordinator.countdown_seconds().await.unwrap_or(0);
    tracing::info!(remaining_seconds = remaining, "Hold granted, countdown running");

    coordinator.extend_hold().await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    let remaining = coordinator.countdown_seconds().await.unwrap_or(0);
    tracing::info!(remaining_seconds = remaining, "Hold extended");

    let payload = CheckoutPayload {
        customer_details: serde_json::json!({
            "name": "Demo Shopper",
            "email": "demo@example.com",
        }),
        payment: serde_json::json!({"method": "card", "token": "tok-visa"}),
    };

    match coordinator.checkout(payload).await {
        Ok(receipt) => {
            tracing::info!(
                order_id = %receipt.order_id,
                redirect = receipt.payment_redirect_url.as_deref().unwrap_or("-"),
                "Order confirmed"
            );
        }
        Err(error) => {
            tracing::error!(error = %error, "Checkout failed");
        }
    }

    coordinator.shutdown(Duration::from_secs(5)).await.ok();
    Ok(())
}

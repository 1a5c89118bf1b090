//! End-to-end coordinator tests against a programmable gateway.
//!
//! These drive the full stack - store, reducer, queue watch, persistence -
//! with a scripted gateway double, covering the scenarios the coordinator
//! must survive: immediate holds, queue admission over poll and push,
//! countdown expiry, exactly-once checkout, and reload resumption.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code

use async_trait::async_trait;
use boxoffice_booking::{
    BookingConfig, BookingCoordinator, BookingErrorCode, BookingSnapshot, BookingStage,
    CheckoutError, CheckoutPayload, FileSnapshotStore, SnapshotAdapter,
};
use boxoffice_core::environment::SystemClock;
use boxoffice_gateway::config::PollConfig;
use boxoffice_gateway::client::TicketGateway;
use boxoffice_gateway::error::GatewayError;
use boxoffice_gateway::feed::{FeedErrorCallback, QueueFeedHandle, StatusCallback};
use boxoffice_gateway::types::{
    CheckoutFailure, ClaimOutcome, CorrelationId, ExtendOutcome, GrantedHold, HoldOutcome,
    HoldRequest, HoldToken, IdempotencyKey, OrderReceipt, OrderRequest, QueueId,
    QueueJoinOutcome, QueuePlacement, QueueStatus, SelectionInput,
};
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Gateway double
// ============================================================================

#[derive(Default)]
struct Calls {
    attempt_hold: AtomicUsize,
    join_queue: AtomicUsize,
    queue_status: AtomicUsize,
    claim_hold: AtomicUsize,
    extend_hold: AtomicUsize,
    leave_queue: AtomicUsize,
    create_order: AtomicUsize,
}

/// Scripted gateway: every operation pops its next scripted answer;
/// a captured push callback lets tests inject realtime frames.
struct MockGateway {
    hold_outcomes: Mutex<VecDeque<Result<HoldOutcome, GatewayError>>>,
    join_outcomes: Mutex<VecDeque<Result<QueueJoinOutcome, GatewayError>>>,
    statuses: Mutex<VecDeque<Result<QueueStatus, GatewayError>>>,
    claim_outcomes: Mutex<VecDeque<Result<ClaimOutcome, GatewayError>>>,
    extend_outcomes: Mutex<VecDeque<Result<ExtendOutcome, GatewayError>>>,
    order_outcomes: Mutex<VecDeque<Result<OrderReceipt, CheckoutFailure>>>,
    order_delay: Duration,
    realtime: bool,
    pushed: Mutex<Option<StatusCallback>>,
    calls: Calls,
}

impl MockGateway {
    fn new() -> Self {
        Self {
            hold_outcomes: Mutex::new(VecDeque::new()),
            join_outcomes: Mutex::new(VecDeque::new()),
            statuses: Mutex::new(VecDeque::new()),
            claim_outcomes: Mutex::new(VecDeque::new()),
            extend_outcomes: Mutex::new(VecDeque::new()),
            order_outcomes: Mutex::new(VecDeque::new()),
            order_delay: Duration::ZERO,
            realtime: false,
            pushed: Mutex::new(None),
            calls: Calls::default(),
        }
    }

    fn with_hold(self, outcome: HoldOutcome) -> Self {
        self.hold_outcomes.lock().unwrap().push_back(Ok(outcome));
        self
    }

    fn with_status(self, status: QueueStatus) -> Self {
        self.statuses.lock().unwrap().push_back(Ok(status));
        self
    }

    fn with_claim(self, outcome: ClaimOutcome) -> Self {
        self.claim_outcomes.lock().unwrap().push_back(Ok(outcome));
        self
    }

    fn with_extend(self, outcome: ExtendOutcome) -> Self {
        self.extend_outcomes.lock().unwrap().push_back(Ok(outcome));
        self
    }

    fn with_order(self, outcome: Result<OrderReceipt, CheckoutFailure>) -> Self {
        self.order_outcomes.lock().unwrap().push_back(outcome);
        self
    }

    fn with_order_delay(mut self, delay: Duration) -> Self {
        self.order_delay = delay;
        self
    }

    fn with_realtime(mut self) -> Self {
        self.realtime = true;
        self
    }

    /// Inject a frame as if the push channel delivered it
    fn push(&self, status: QueueStatus) {
        let guard = self.pushed.lock().unwrap();
        let callback = guard.as_ref().expect("no push subscription open");
        callback(status);
    }
}

#[async_trait]
impl TicketGateway for MockGateway {
    async fn attempt_hold(
        &self,
        _request: &HoldRequest,
        _correlation_id: CorrelationId,
    ) -> Result<HoldOutcome, GatewayError> {
        self.calls.attempt_hold.fetch_add(1, Ordering::SeqCst);
        self.hold_outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(GatewayError::Transport("unscripted attempt_hold".into())))
    }

    async fn join_queue(
        &self,
        _request: &HoldRequest,
        _correlation_id: CorrelationId,
    ) -> Result<QueueJoinOutcome, GatewayError> {
        self.calls.join_queue.fetch_add(1, Ordering::SeqCst);
        self.join_outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(GatewayError::Transport("unscripted join_queue".into())))
    }

    async fn queue_status(
        &self,
        _queue_id: &QueueId,
        _correlation_id: CorrelationId,
    ) -> Result<QueueStatus, GatewayError> {
        self.calls.queue_status.fetch_add(1, Ordering::SeqCst);
        self.statuses.lock().unwrap().pop_front().unwrap_or(Ok(QueueStatus::Queued {
            position: 10,
            eta_seconds: 60,
        }))
    }

    async fn claim_hold(
        &self,
        _queue_id: &QueueId,
        _correlation_id: CorrelationId,
    ) -> Result<ClaimOutcome, GatewayError> {
        self.calls.claim_hold.fetch_add(1, Ordering::SeqCst);
        self.claim_outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(GatewayError::Transport("unscripted claim_hold".into())))
    }

    async fn extend_hold(
        &self,
        _hold_token: &HoldToken,
        _correlation_id: CorrelationId,
    ) -> Result<ExtendOutcome, GatewayError> {
        self.calls.extend_hold.fetch_add(1, Ordering::SeqCst);
        self.extend_outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(GatewayError::Transport("unscripted extend_hold".into())))
    }

    async fn leave_queue(&self, _queue_id: &QueueId, _correlation_id: CorrelationId) -> bool {
        self.calls.leave_queue.fetch_add(1, Ordering::SeqCst);
        true
    }

    async fn create_order(
        &self,
        _request: &OrderRequest,
        _idempotency_key: IdempotencyKey,
        _correlation_id: CorrelationId,
    ) -> Result<OrderReceipt, CheckoutFailure> {
        self.calls.create_order.fetch_add(1, Ordering::SeqCst);
        if self.order_delay > Duration::ZERO {
            tokio::time::sleep(self.order_delay).await;
        }
        self.order_outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(CheckoutFailure::Network(GatewayError::Transport(
                "unscripted create_order".into(),
            ))))
    }

    fn subscribe_to_queue(
        &self,
        _queue_id: QueueId,
        _correlation_id: CorrelationId,
        on_status: StatusCallback,
        _on_error: FeedErrorCallback,
    ) -> QueueFeedHandle {
        if self.realtime {
            *self.pushed.lock().unwrap() = Some(on_status);
            QueueFeedHandle::from_task(tokio::spawn(std::future::pending::<()>()))
        } else {
            QueueFeedHandle::disabled()
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn fast_config() -> BookingConfig {
    BookingConfig {
        queue_stale_after_secs: 900,
        checkout_wait_ms: 2_000,
        poll: PollConfig {
            min_interval_ms: 10,
            max_interval_ms: 50,
        },
    }
}

async fn coordinator_with(gateway: Arc<MockGateway>) -> BookingCoordinator {
    BookingCoordinator::new(
        gateway,
        Arc::new(SystemClock),
        SnapshotAdapter::memory_only(),
        fast_config(),
    )
    .await
}

fn selections() -> Vec<SelectionInput> {
    vec![SelectionInput::new("cat-a", 2)]
}

fn granted(expires_in: ChronoDuration) -> GrantedHold {
    GrantedHold {
        hold_id: "hold-1".into(),
        hold_token: HoldToken::new("tok-abc"),
        hold_expires_at: Utc::now() + expires_in,
    }
}

fn placement() -> QueuePlacement {
    QueuePlacement {
        queue_id: "q-1".into(),
        position: 10,
        eta_seconds: 60,
    }
}

fn payload() -> CheckoutPayload {
    CheckoutPayload {
        customer_details: serde_json::json!({"name": "Ada", "email": "ada@example.com"}),
        payment: serde_json::json!({"method": "card", "token": "pay-tok"}),
    }
}

async fn wait_for(
    coordinator: &BookingCoordinator,
    what: &str,
    predicate: impl Fn(&BookingSnapshot) -> bool,
) -> BookingSnapshot {
    tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            let snapshot = coordinator.snapshot().await;
            if predicate(&snapshot) {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn immediate_hold_reaches_ready_with_credential() {
    let gateway = Arc::new(
        MockGateway::new().with_hold(HoldOutcome::Acquired {
            hold: granted(ChronoDuration::minutes(10)),
        }),
    );
    let coordinator = coordinator_with(Arc::clone(&gateway)).await;

    coordinator.start("evt-1".into(), selections(), None).await;

    let snapshot = wait_for(&coordinator, "ready-with-hold", |s| {
        s.stage == BookingStage::ReadyWithHold
    })
    .await;

    assert!(snapshot.hold_token.is_some());
    assert!(snapshot.queue_id.is_none());
    assert_eq!(gateway.calls.attempt_hold.load(Ordering::SeqCst), 1);
    assert!(coordinator.countdown_seconds().await.unwrap() > 0);
}

#[tokio::test]
async fn invalid_start_makes_no_network_call() {
    let gateway = Arc::new(MockGateway::new());
    let coordinator = coordinator_with(Arc::clone(&gateway)).await;

    let snapshot = coordinator.start("evt-1".into(), Vec::new(), None).await;

    assert_eq!(snapshot.stage, BookingStage::Idle);
    assert_eq!(
        snapshot.error.unwrap().code,
        BookingErrorCode::SelectionRequired
    );
    assert_eq!(gateway.calls.attempt_hold.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn queued_then_poll_admission_with_claim() {
    let gateway = Arc::new(
        MockGateway::new()
            .with_hold(HoldOutcome::Queued {
                placement: placement(),
            })
            .with_status(QueueStatus::Queued {
                position: 3,
                eta_seconds: 15,
            })
            .with_status(QueueStatus::ready())
            .with_claim(ClaimOutcome::Granted {
                hold: granted(ChronoDuration::minutes(10)),
            }),
    );
    let coordinator = coordinator_with(Arc::clone(&gateway)).await;

    coordinator.start("evt-1".into(), selections(), None).await;

    let snapshot = wait_for(&coordinator, "ready after claim", |s| {
        s.stage == BookingStage::ReadyWithHold
    })
    .await;

    assert!(snapshot.hold_token.is_some());
    assert_eq!(gateway.calls.claim_hold.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn queued_then_push_ready_with_inline_credential() {
    let gateway = Arc::new(
        MockGateway::new()
            .with_realtime()
            .with_hold(HoldOutcome::Queued {
                placement: placement(),
            }),
    );
    let coordinator = coordinator_with(Arc::clone(&gateway)).await;

    coordinator.start("evt-1".into(), selections(), None).await;

    let snapshot = wait_for(&coordinator, "in-queue", |s| {
        s.stage == BookingStage::InQueue
    })
    .await;
    assert_eq!(snapshot.queue_position, Some(10));

    wait_for(&coordinator, "realtime active", |s| s.realtime_active).await;

    gateway.push(QueueStatus::ready_with(granted(ChronoDuration::minutes(10))));

    let snapshot = wait_for(&coordinator, "ready via push", |s| {
        s.stage == BookingStage::ReadyWithHold
    })
    .await;
    assert!(snapshot.hold_token.is_some());
}

#[tokio::test]
async fn hold_rejection_falls_back_to_queue_join() {
    let gateway = Arc::new(MockGateway::new().with_hold(HoldOutcome::Rejected {
        reason: "at_capacity".into(),
        detail: None,
    }));
    gateway
        .join_outcomes
        .lock()
        .unwrap()
        .push_back(Ok(QueueJoinOutcome::Queued {
            placement: placement(),
        }));
    let coordinator = coordinator_with(Arc::clone(&gateway)).await;

    coordinator.start("evt-1".into(), selections(), None).await;

    let snapshot = wait_for(&coordinator, "in-queue after fallback", |s| {
        s.stage == BookingStage::InQueue
    })
    .await;

    assert_eq!(snapshot.queue_id, Some("q-1".into()));
    assert_eq!(gateway.calls.join_queue.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn hold_expiry_fires_without_network_activity() {
    let gateway = Arc::new(
        MockGateway::new().with_hold(HoldOutcome::Acquired {
            hold: granted(ChronoDuration::milliseconds(300)),
        }),
    );
    let coordinator = coordinator_with(Arc::clone(&gateway)).await;

    coordinator.start("evt-1".into(), selections(), None).await;
    wait_for(&coordinator, "ready", |s| {
        s.stage == BookingStage::ReadyWithHold
    })
    .await;

    let snapshot = wait_for(&coordinator, "expired", |s| {
        s.stage == BookingStage::Expired
    })
    .await;

    assert!(snapshot.hold_token.is_none());
    assert!(snapshot.hold_id.is_none());
    assert_eq!(snapshot.error.unwrap().code, BookingErrorCode::HoldExpired);
}

#[tokio::test]
async fn concurrent_checkouts_submit_exactly_once() {
    let gateway = Arc::new(
        MockGateway::new()
            .with_hold(HoldOutcome::Acquired {
                hold: granted(ChronoDuration::minutes(10)),
            })
            .with_order_delay(Duration::from_millis(200))
            .with_order(Ok(OrderReceipt {
                order_id: "ord-1".into(),
                payment_redirect_url: Some("https://pay.example/ord-1".into()),
            })),
    );
    let coordinator = coordinator_with(Arc::clone(&gateway)).await;

    coordinator.start("evt-1".into(), selections(), None).await;
    wait_for(&coordinator, "ready", |s| {
        s.stage == BookingStage::ReadyWithHold
    })
    .await;

    let (first, second) =
        tokio::join!(coordinator.checkout(payload()), coordinator.checkout(payload()));

    let results = [first, second];
    let receipts: Vec<_> = results.iter().filter(|r| r.is_ok()).collect();
    assert_eq!(receipts.len(), 1, "exactly one submission may succeed");
    assert!(
        results
            .iter()
            .any(|r| matches!(r, Err(CheckoutError::AlreadyInProgress))),
        "the loser must short-circuit locally"
    );
    assert_eq!(gateway.calls.create_order.load(Ordering::SeqCst), 1);

    wait_for(&coordinator, "idle after success", |s| {
        s.stage == BookingStage::Idle
    })
    .await;
}

#[tokio::test]
async fn checkout_without_hold_is_refused_without_network() {
    let gateway = Arc::new(MockGateway::new());
    let coordinator = coordinator_with(Arc::clone(&gateway)).await;

    let result = coordinator.checkout(payload()).await;

    assert!(matches!(result, Err(CheckoutError::HoldNotReady)));
    assert_eq!(gateway.calls.create_order.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn checkout_conflict_keeps_hold_for_retry() {
    let gateway = Arc::new(
        MockGateway::new()
            .with_hold(HoldOutcome::Acquired {
                hold: granted(ChronoDuration::minutes(10)),
            })
            .with_order(Err(CheckoutFailure::Processing))
            .with_order(Ok(OrderReceipt {
                order_id: "ord-2".into(),
                payment_redirect_url: None,
            })),
    );
    let coordinator = coordinator_with(Arc::clone(&gateway)).await;

    coordinator.start("evt-1".into(), selections(), None).await;
    wait_for(&coordinator, "ready", |s| {
        s.stage == BookingStage::ReadyWithHold
    })
    .await;

    let first = coordinator.checkout(payload()).await;
    assert!(matches!(first, Err(CheckoutError::Processing)));

    // The hold survived; a caller-driven retry succeeds
    let snapshot = coordinator.snapshot().await;
    assert_eq!(snapshot.stage, BookingStage::ReadyWithHold);

    let second = coordinator.checkout(payload()).await;
    assert_eq!(second.unwrap().order_id, "ord-2".into());
    assert_eq!(gateway.calls.create_order.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn extend_replaces_expiry_without_stage_change() {
    let new_expiry = Utc::now() + ChronoDuration::minutes(12);
    let gateway = Arc::new(
        MockGateway::new()
            .with_hold(HoldOutcome::Acquired {
                hold: granted(ChronoDuration::minutes(5)),
            })
            .with_extend(ExtendOutcome::Extended {
                hold_expires_at: new_expiry,
            }),
    );
    let coordinator = coordinator_with(Arc::clone(&gateway)).await;

    coordinator.start("evt-1".into(), selections(), None).await;
    wait_for(&coordinator, "ready", |s| {
        s.stage == BookingStage::ReadyWithHold
    })
    .await;

    coordinator.extend_hold().await;

    let snapshot = wait_for(&coordinator, "extended expiry", |s| {
        s.hold_expires_at == Some(new_expiry)
    })
    .await;
    assert_eq!(snapshot.stage, BookingStage::ReadyWithHold);
}

#[tokio::test]
async fn cancel_queue_resets_locally_whatever_the_backend_says() {
    let gateway = Arc::new(MockGateway::new().with_hold(HoldOutcome::Queued {
        placement: placement(),
    }));
    let coordinator = coordinator_with(Arc::clone(&gateway)).await;

    coordinator.start("evt-1".into(), selections(), None).await;
    wait_for(&coordinator, "in-queue", |s| s.stage == BookingStage::InQueue).await;

    let snapshot = coordinator.cancel_queue().await;
    assert_eq!(snapshot.stage, BookingStage::Idle);

    wait_for(&coordinator, "leave dispatched", |_| {
        gateway.calls.leave_queue.load(Ordering::SeqCst) == 1
    })
    .await;
}

// ============================================================================
// Persistence round trips
// ============================================================================

#[tokio::test]
async fn reload_resumes_unexpired_hold() {
    let dir = tempfile::tempdir().unwrap();

    {
        let gateway = Arc::new(
            MockGateway::new().with_hold(HoldOutcome::Acquired {
                hold: granted(ChronoDuration::minutes(10)),
            }),
        );
        let coordinator = BookingCoordinator::new(
            gateway,
            Arc::new(SystemClock),
            SnapshotAdapter::new(Box::new(FileSnapshotStore::new(dir.path()))),
            fast_config(),
        )
        .await;

        coordinator.start("evt-1".into(), selections(), None).await;
        wait_for(&coordinator, "ready", |s| {
            s.stage == BookingStage::ReadyWithHold
        })
        .await;
        coordinator.shutdown(Duration::from_secs(1)).await.unwrap();
    }

    // A new session against the same storage resumes the hold
    let coordinator = BookingCoordinator::new(
        Arc::new(MockGateway::new()),
        Arc::new(SystemClock),
        SnapshotAdapter::new(Box::new(FileSnapshotStore::new(dir.path()))),
        fast_config(),
    )
    .await;

    let snapshot = coordinator.snapshot().await;
    assert_eq!(snapshot.stage, BookingStage::ReadyWithHold);
    assert_eq!(snapshot.hold_id, Some("hold-1".into()));
    assert!(coordinator.countdown_seconds().await.unwrap() > 0);
}

#[tokio::test]
async fn reload_discards_expired_hold() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileSnapshotStore::new(dir.path());

    // Seed storage with a hold that has already lapsed
    {
        use boxoffice_booking::SnapshotStore;
        let now = Utc::now();
        let mut snapshot = BookingSnapshot::idle(now);
        snapshot.stage = BookingStage::ReadyWithHold;
        snapshot.hold_id = Some("hold-old".into());
        snapshot.hold_token = Some(HoldToken::new("tok-old"));
        snapshot.hold_expires_at = Some(now - ChronoDuration::minutes(1));
        store.save(&snapshot).unwrap();
    }

    let coordinator = BookingCoordinator::new(
        Arc::new(MockGateway::new()),
        Arc::new(SystemClock),
        SnapshotAdapter::new(Box::new(store)),
        fast_config(),
    )
    .await;

    let snapshot = coordinator.snapshot().await;
    assert_eq!(snapshot.stage, BookingStage::Idle);
    assert!(snapshot.hold_token.is_none());
}

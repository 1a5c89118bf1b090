//! The booking coordinator facade.
//!
//! Owns the store running [`crate::reducer::BookingReducer`], the queue
//! watch (poll loop plus optional push feed), and snapshot persistence.
//! Outside callers get a small action interface and read-only snapshot
//! copies; every mutation flows through the reducer.

use crate::actions::{BookingAction, CheckoutError, CheckoutPayload};
use crate::config::BookingConfig;
use crate::persistence::{SnapshotAdapter, restore_or_idle};
use crate::reducer::{BookingEnvironment, BookingReducer};
use crate::types::{BookingSnapshot, BookingStage};
use boxoffice_core::environment::Clock;
use boxoffice_gateway::client::TicketGateway;
use boxoffice_gateway::config::PollConfig;
use boxoffice_gateway::feed::{FeedErrorCallback, QueueFeedHandle, StatusCallback};
use boxoffice_gateway::poll_interval;
use boxoffice_gateway::types::{
    CorrelationId, EventId, IdempotencyKey, OrderReceipt, QueueId, SelectionInput,
};
use boxoffice_runtime::{Store, StoreError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;

/// Store specialization for the booking state machine
pub type BookingStore = Store<BookingSnapshot, BookingAction, BookingEnvironment, BookingReducer>;

/// Open watch on one queue entry: the poll loop and the push feed
struct QueueWatch {
    queue_id: QueueId,
    poll_task: JoinHandle<()>,
    feed: QueueFeedHandle,
}

impl Drop for QueueWatch {
    fn drop(&mut self) {
        self.poll_task.abort();
        self.feed.stop();
    }
}

/// Client-resident coordinator for one booking session
///
/// # Example
///
/// ```ignore
/// let coordinator = BookingCoordinator::new(
///     Arc::new(HttpTicketGateway::from_env()?),
///     Arc::new(SystemClock),
///     SnapshotAdapter::new(Box::new(FileSnapshotStore::from_env())),
///     BookingConfig::from_env(),
/// ).await;
///
/// coordinator.start("evt-1".into(), vec![SelectionInput::new("cat-a", 2)], None).await;
/// ```
pub struct BookingCoordinator {
    store: BookingStore,
    clock: Arc<dyn Clock>,
    config: BookingConfig,
    watch: Arc<Mutex<Option<QueueWatch>>>,
    observer: JoinHandle<()>,
}

impl BookingCoordinator {
    /// Build a coordinator, restoring any resumable snapshot from storage
    ///
    /// A stored `ReadyWithHold` snapshot whose expiry has not passed
    /// resumes with its countdown re-armed; a fresh `InQueue` snapshot
    /// resumes with its watch reopened; anything else starts idle.
    pub async fn new(
        gateway: Arc<dyn TicketGateway>,
        clock: Arc<dyn Clock>,
        persistence: SnapshotAdapter,
        config: BookingConfig,
    ) -> Self {
        let now = clock.now();
        let snapshot = restore_or_idle(persistence.load(), now, config.queue_stale_after());
        let needs_resume = snapshot.stage.is_active();

        let environment = BookingEnvironment::new(Arc::clone(&gateway), Arc::clone(&clock));
        let store = Store::with_broadcast_capacity(snapshot, BookingReducer::new(), environment, 64);
        let persistence = Arc::new(persistence);
        let watch = Arc::new(Mutex::new(None));

        let observer = Self::spawn_observer(
            store.clone(),
            Arc::clone(&gateway),
            persistence,
            Arc::clone(&watch),
            config.poll,
        );

        let coordinator = Self {
            store,
            clock,
            config,
            watch,
            observer,
        };

        if needs_resume {
            let _ = coordinator.store.send(BookingAction::Resume).await;
        }

        coordinator
    }

    /// Begin a booking attempt
    ///
    /// Validation failures and backend rejections land in the returned
    /// snapshot's `error` field; this method never fails outright.
    pub async fn start(
        &self,
        event_id: EventId,
        selections: Vec<SelectionInput>,
        requester_id: Option<String>,
    ) -> BookingSnapshot {
        let _ = self
            .store
            .send(BookingAction::Start {
                event_id,
                selections,
                requester_id,
            })
            .await;
        self.snapshot().await
    }

    /// Request a later expiry for the current hold
    ///
    /// A refused extension leaves the stage untouched; the failure is
    /// recorded on the snapshot's `error` field.
    pub async fn extend_hold(&self) -> BookingSnapshot {
        let _ = self.store.send(BookingAction::ExtendHold).await;
        self.snapshot().await
    }

    /// Leave the admission queue and return to idle
    ///
    /// The backend leave call is best effort; the local reset stands
    /// regardless of its result.
    pub async fn cancel_queue(&self) -> BookingSnapshot {
        let _ = self.store.send(BookingAction::CancelQueue).await;
        self.snapshot().await
    }

    /// Abandon the attempt and return to idle
    pub async fn reset(&self) -> BookingSnapshot {
        let _ = self.store.send(BookingAction::Reset).await;
        self.snapshot().await
    }

    /// Submit checkout for the current hold
    ///
    /// Mints a fresh idempotency key for this invocation and waits for the
    /// terminal result. A second invocation while one is outstanding is
    /// refused locally without a network call.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError`] for local refusals (`HoldNotReady`,
    /// `AlreadyInProgress`), backend conflicts (`Processing`,
    /// `RateLimited`), business rejections, and transport failures. The
    /// hold is kept on every recoverable failure so the caller can retry
    /// without re-queueing.
    pub async fn checkout(&self, payload: CheckoutPayload) -> Result<OrderReceipt, CheckoutError> {
        let submission = IdempotencyKey::new();

        let result = self
            .store
            .send_and_wait_for(
                BookingAction::Checkout {
                    payload,
                    submission,
                },
                move |action| {
                    matches!(
                        action,
                        BookingAction::CheckoutResolved { submission: s, .. }
                        | BookingAction::CheckoutRefused { submission: s, .. }
                        if *s == submission
                    )
                },
                self.config.checkout_wait(),
            )
            .await;

        match result {
            Ok(BookingAction::CheckoutResolved { outcome, .. }) => outcome,
            Ok(BookingAction::CheckoutRefused { reason, .. }) => Err(reason),
            Ok(_) | Err(StoreError::ChannelClosed | StoreError::ShutdownInProgress) => {
                Err(CheckoutError::Network {
                    message: "coordinator is shutting down".to_string(),
                    retryable: false,
                })
            }
            Err(_) => Err(CheckoutError::Network {
                message: "checkout timed out waiting for a result".to_string(),
                retryable: true,
            }),
        }
    }

    /// Read-only copy of the authoritative snapshot
    pub async fn snapshot(&self) -> BookingSnapshot {
        self.store.state(Clone::clone).await
    }

    /// Seconds left on the hold countdown, if one is running
    pub async fn countdown_seconds(&self) -> Option<i64> {
        let now = self.clock.now();
        self.store
            .state(move |s| s.remaining_hold_seconds(now))
            .await
    }

    /// Observe every action the coordinator processes
    ///
    /// Lets the UI stream booking progress without polling snapshots.
    #[must_use]
    pub fn updates(&self) -> broadcast::Receiver<BookingAction> {
        self.store.subscribe_actions()
    }

    /// Stop the watch and drain in-flight effects
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownTimeout`] if effects were still
    /// running when the timeout elapsed.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
        {
            let mut guard = self.watch.lock().await;
            guard.take(); // Drop stops poll task and feed
        }
        self.observer.abort();
        self.store.shutdown(timeout).await
    }

    /// Spawn the task that persists snapshots and reconciles the queue
    /// watch after every processed action
    fn spawn_observer(
        store: BookingStore,
        gateway: Arc<dyn TicketGateway>,
        persistence: Arc<SnapshotAdapter>,
        watch: Arc<Mutex<Option<QueueWatch>>>,
        poll: PollConfig,
    ) -> JoinHandle<()> {
        let mut rx = store.subscribe_actions();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {
                        Self::reconcile(&store, &gateway, &persistence, &watch, poll).await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Bring persistence and the queue watch in line with the snapshot
    ///
    /// Idempotent and state-driven: whatever action just ran, the snapshot
    /// decides whether a watch should be open and what gets persisted.
    async fn reconcile(
        store: &BookingStore,
        gateway: &Arc<dyn TicketGateway>,
        persistence: &Arc<SnapshotAdapter>,
        watch: &Arc<Mutex<Option<QueueWatch>>>,
        poll: PollConfig,
    ) {
        let snapshot = store.state(Clone::clone).await;

        if snapshot.stage == BookingStage::Idle {
            persistence.clear();
        } else {
            persistence.save(&snapshot);
        }

        let desired = if snapshot.stage == BookingStage::InQueue {
            snapshot.queue_id.clone()
        } else {
            None
        };

        let mut guard = watch.lock().await;
        let current = guard.as_ref().map(|w| w.queue_id.clone());
        if current == desired {
            return;
        }

        // Stop the watch for the abandoned queue before opening another
        guard.take();

        if let (Some(queue_id), Some(correlation_id)) = (desired, snapshot.correlation_id) {
            *guard = Some(Self::open_watch(
                store.clone(),
                Arc::clone(gateway),
                poll,
                queue_id,
                correlation_id,
            ));
        }
    }

    /// Open the push feed and the poll loop for one queue entry
    fn open_watch(
        store: BookingStore,
        gateway: Arc<dyn TicketGateway>,
        poll: PollConfig,
        queue_id: QueueId,
        correlation_id: CorrelationId,
    ) -> QueueWatch {
        tracing::debug!(queue_id = %queue_id, "Opening queue watch");

        let feed = {
            let status_store = store.clone();
            let status_queue = queue_id.clone();
            let on_status: StatusCallback = Box::new(move |status| {
                let store = status_store.clone();
                let queue_id = status_queue.clone();
                tokio::spawn(async move {
                    let _ = store
                        .send(BookingAction::QueueStatusReceived { queue_id, status })
                        .await;
                });
            });

            let error_store = store.clone();
            let error_queue = queue_id.clone();
            let on_error: FeedErrorCallback = Box::new(move |error| {
                tracing::warn!(error = %error, "Realtime feed failed, polling resumes");
                let store = error_store.clone();
                let queue_id = error_queue.clone();
                tokio::spawn(async move {
                    let _ = store
                        .send(BookingAction::RealtimeStateChanged {
                            queue_id,
                            active: false,
                        })
                        .await;
                });
            });

            gateway.subscribe_to_queue(queue_id.clone(), correlation_id, on_status, on_error)
        };

        if feed.is_realtime() {
            let store = store.clone();
            let feed_queue = queue_id.clone();
            tokio::spawn(async move {
                let _ = store
                    .send(BookingAction::RealtimeStateChanged {
                        queue_id: feed_queue,
                        active: true,
                    })
                    .await;
            });
        }

        let poll_task = tokio::spawn(Self::poll_loop(
            store,
            gateway,
            poll,
            queue_id.clone(),
            correlation_id,
        ));

        QueueWatch {
            queue_id,
            poll_task,
            feed,
        }
    }

    /// Poll the queue-status endpoint until the entry leaves the queue
    ///
    /// Suspended (no requests issued) while the realtime feed is active;
    /// transport failures are logged and never treated as terminal.
    async fn poll_loop(
        store: BookingStore,
        gateway: Arc<dyn TicketGateway>,
        poll: PollConfig,
        queue_id: QueueId,
        correlation_id: CorrelationId,
    ) {
        loop {
            let (stage, current, realtime) = store
                .state(|s| (s.stage, s.queue_id.clone(), s.realtime_active))
                .await;

            if stage != BookingStage::InQueue || current.as_ref() != Some(&queue_id) {
                break;
            }

            if realtime {
                // The push channel is authoritative; only watch for it to drop
                tokio::time::sleep(poll.min_interval()).await;
                continue;
            }

            match gateway.queue_status(&queue_id, correlation_id).await {
                Ok(status) => {
                    let _ = store
                        .send(BookingAction::QueueStatusReceived {
                            queue_id: queue_id.clone(),
                            status,
                        })
                        .await;
                }
                Err(error) => {
                    tracing::warn!(
                        queue_id = %queue_id,
                        error = %error,
                        "Status poll failed, keeping the watch alive"
                    );
                }
            }

            let (position, eta) = store
                .state(|s| {
                    (
                        s.queue_position.unwrap_or(0),
                        s.queue_eta_seconds.unwrap_or(0),
                    )
                })
                .await;
            tokio::time::sleep(poll_interval(position, eta, &poll)).await;
        }

        tracing::debug!(queue_id = %queue_id, "Queue watch poll loop ended");
    }
}

impl Drop for BookingCoordinator {
    fn drop(&mut self) {
        self.observer.abort();
    }
}

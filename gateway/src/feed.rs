//! Push-channel subscription for queue status updates.
//!
//! The realtime feed is an optional WebSocket connection pushing the same
//! `QueueStatus` shape as the polling endpoint. It is represented as a
//! handle with `stop()` and `is_realtime()`, so the coordinator never
//! touches transport specifics; a deployment without a realtime endpoint
//! gets a disabled handle and polling carries the watch alone.

use crate::error::GatewayError;
use crate::types::{CorrelationId, QueueId, QueueStatus};
use futures::{SinkExt, StreamExt};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Callback invoked for every status frame pushed by the backend
pub type StatusCallback = Box<dyn Fn(QueueStatus) + Send + Sync>;

/// Callback invoked when the push channel fails or closes
pub type FeedErrorCallback = Box<dyn Fn(GatewayError) + Send + Sync>;

/// Handle to an open (or disabled) queue-status push subscription
#[derive(Debug)]
pub struct QueueFeedHandle {
    task: Option<JoinHandle<()>>,
    is_realtime: bool,
}

impl QueueFeedHandle {
    /// Handle for a deployment without a realtime endpoint
    ///
    /// Performs no work; `is_realtime()` reports `false` so the caller
    /// relies on polling alone.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            task: None,
            is_realtime: false,
        }
    }

    /// Handle over a custom realtime feed task
    ///
    /// For alternate transports and test doubles; the task is aborted when
    /// the handle is stopped or dropped.
    #[must_use]
    pub const fn from_task(task: JoinHandle<()>) -> Self {
        Self {
            task: Some(task),
            is_realtime: true,
        }
    }

    /// Whether a push subscription is supplying updates
    #[must_use]
    pub const fn is_realtime(&self) -> bool {
        self.is_realtime
    }

    /// Stop the subscription
    ///
    /// Idempotent; a disabled handle is a no-op.
    pub fn stop(&self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

impl Drop for QueueFeedHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Open a WebSocket connection and forward status frames to `on_status`
///
/// The connection is established inside the spawned task; a connect
/// failure surfaces through `on_error` so the caller can fall back to
/// polling without ever blocking on the subscription.
#[must_use]
pub fn spawn_websocket_feed(
    realtime_url: String,
    hub: String,
    queue_id: QueueId,
    correlation_id: CorrelationId,
    on_status: StatusCallback,
    on_error: FeedErrorCallback,
) -> QueueFeedHandle {
    let task = tokio::spawn(async move {
        let url = format!("{realtime_url}?queueId={queue_id}&hub={hub}&correlationId={correlation_id}");
        tracing::debug!(
            correlation_id = %correlation_id,
            queue_id = %queue_id,
            "Opening realtime queue feed"
        );

        let (stream, _) = match connect_async(url).await {
            Ok(connected) => connected,
            Err(error) => {
                tracing::warn!(
                    correlation_id = %correlation_id,
                    queue_id = %queue_id,
                    error = %error,
                    "Realtime connect failed, caller falls back to polling"
                );
                on_error(GatewayError::Realtime(error.to_string()));
                return;
            }
        };
        metrics::counter!("gateway.feed.connected").increment(1);

        let (mut write, mut read) = stream.split();

        while let Some(frame) = read.next().await {
            match frame {
                Ok(Message::Text(text)) => match serde_json::from_str::<QueueStatus>(&text) {
                    Ok(status) => {
                        tracing::trace!(queue_id = %queue_id, ?status, "Realtime status frame");
                        on_status(status);
                    }
                    Err(error) => {
                        // A malformed frame is not fatal for the feed;
                        // skip it and keep reading.
                        tracing::warn!(
                            queue_id = %queue_id,
                            error = %error,
                            "Discarding undecodable realtime frame"
                        );
                    }
                },
                Ok(Message::Ping(payload)) => {
                    if write.send(Message::Pong(payload)).await.is_err() {
                        on_error(GatewayError::Realtime("pong send failed".to_string()));
                        return;
                    }
                }
                Ok(Message::Close(_)) => {
                    tracing::debug!(queue_id = %queue_id, "Realtime feed closed by server");
                    on_error(GatewayError::Realtime("closed by server".to_string()));
                    return;
                }
                Ok(_) => {} // Binary/Pong frames carry nothing for us
                Err(error) => {
                    tracing::warn!(queue_id = %queue_id, error = %error, "Realtime read failed");
                    on_error(GatewayError::Realtime(error.to_string()));
                    return;
                }
            }
        }

        // Stream ended without a close frame
        on_error(GatewayError::Realtime("stream ended".to_string()));
    });

    QueueFeedHandle {
        task: Some(task),
        is_realtime: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_handle_reports_no_realtime() {
        let handle = QueueFeedHandle::disabled();
        assert!(!handle.is_realtime());
        handle.stop(); // No-op, must not panic
    }
}

//! Offline request queue.
//!
//! Requests that could not reach the server are stored locally and replayed
//! on demand. The cart session queues its item and cart deletions here when
//! the server is unreachable. There is no backoff and no idempotency: a
//! replayed request may reach the server twice if an earlier attempt was
//! answered but the answer was lost.
//!
//! Clones of an [`OfflineQueue`] share its locks. Every change to the stored
//! list happens under one lock, so a request queued while a flush is
//! sending is kept.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use bazaar_core::ProductId;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::api::{ApiClient, CartKey};
use crate::error::ClientError;
use crate::storage::{LocalStore, StorageError, get_json, keys, set_json};

/// HTTP method of a queued request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueuedMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl From<QueuedMethod> for Method {
    fn from(method: QueuedMethod) -> Self {
        match method {
            QueuedMethod::Get => Self::GET,
            QueuedMethod::Post => Self::POST,
            QueuedMethod::Put => Self::PUT,
            QueuedMethod::Patch => Self::PATCH,
            QueuedMethod::Delete => Self::DELETE,
        }
    }
}

impl std::fmt::Display for QueuedMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(Method::from(*self).as_str())
    }
}

/// A request waiting to be replayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedRequest {
    pub id: Uuid,
    pub method: QueuedMethod,
    /// Path relative to the API base URL, e.g. `delivery/cart/add`.
    pub path: String,
    #[serde(default)]
    pub body: Option<serde_json::Value>,
    pub queued_at: DateTime<Utc>,
    /// Failed replay attempts so far.
    #[serde(default)]
    pub attempts: u32,
}

impl QueuedRequest {
    #[must_use]
    pub fn new(method: QueuedMethod, path: impl Into<String>, body: Option<serde_json::Value>) -> Self {
        Self {
            id: Uuid::new_v4(),
            method,
            path: path.into(),
            body,
            queued_at: Utc::now(),
            attempts: 0,
        }
    }

    /// Deletion of a whole cart.
    #[must_use]
    pub fn clear_cart(key: &CartKey) -> Self {
        Self::new(QueuedMethod::Delete, key.segments().join("/"), None)
    }

    /// Deletion of one item from a cart.
    #[must_use]
    pub fn remove_item(key: &CartKey, item_id: &ProductId) -> Self {
        Self::new(
            QueuedMethod::Delete,
            key.item_segments(item_id).join("/"),
            None,
        )
    }
}

/// Something that can deliver a queued request.
pub trait RequestSender: Send + Sync {
    fn send(&self, request: &QueuedRequest) -> impl Future<Output = Result<(), ClientError>> + Send;
}

impl RequestSender for ApiClient {
    async fn send(&self, request: &QueuedRequest) -> Result<(), ClientError> {
        self.send_raw(request.method.into(), &request.path, request.body.clone())
            .await?;
        Ok(())
    }
}

/// Outcome of a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlushReport {
    /// Requests delivered and removed from the queue.
    pub delivered: usize,
    /// Requests the server refused, removed without delivery.
    pub dropped: usize,
    /// Requests still queued.
    pub remaining: usize,
}

#[derive(Debug, Default)]
struct QueueLocks {
    /// Held for every read-modify-write of the stored list.
    edit: Mutex<()>,
    /// Held for a whole flush so two flushes never send the same request.
    flush: Mutex<()>,
}

/// Persisted queue of undelivered requests.
#[derive(Debug, Clone)]
pub struct OfflineQueue<S> {
    store: S,
    locks: Arc<QueueLocks>,
}

impl<S: LocalStore> OfflineQueue<S> {
    #[must_use]
    pub fn new(store: S) -> Self {
        Self {
            store,
            locks: Arc::new(QueueLocks::default()),
        }
    }

    /// Requests currently queued, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or holds a corrupt queue.
    pub async fn pending(&self) -> Result<Vec<QueuedRequest>, StorageError> {
        Ok(get_json(&self.store, keys::OFFLINE_QUEUE)
            .await?
            .unwrap_or_default())
    }

    /// Append a request.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    #[instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    pub async fn enqueue(&self, request: QueuedRequest) -> Result<(), StorageError> {
        let _edit = self.locks.edit.lock().await;
        let mut queue = self.pending().await?;
        queue.push(request);
        set_json(&self.store, keys::OFFLINE_QUEUE, &queue).await?;
        info!(queued = queue.len(), "Request queued for later delivery");
        Ok(())
    }

    /// Drop every queued request.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn clear(&self) -> Result<(), StorageError> {
        let _edit = self.locks.edit.lock().await;
        self.store.remove(keys::OFFLINE_QUEUE).await
    }

    /// Replay every queued request in order.
    ///
    /// Delivered requests are removed. Requests the server refuses with a
    /// client error are removed too, since replaying them gets the same
    /// answer. Anything else stays queued, in its original order, with
    /// `attempts` incremented. Requests queued while the flush runs are kept
    /// for the next one.
    ///
    /// # Errors
    ///
    /// Returns an error only if the store fails. Delivery failures are
    /// reported through the [`FlushReport`].
    #[instrument(skip(self, sender))]
    pub async fn flush<T: RequestSender>(&self, sender: &T) -> Result<FlushReport, StorageError> {
        let _flushing = self.locks.flush.lock().await;

        let queue = {
            let _edit = self.locks.edit.lock().await;
            self.pending().await?
        };
        if queue.is_empty() {
            return Ok(FlushReport::default());
        }

        let mut finished = HashSet::new();
        let mut failed = HashSet::new();
        let mut delivered = 0;
        let mut dropped = 0;
        for request in &queue {
            match sender.send(request).await {
                Ok(()) => {
                    delivered += 1;
                    finished.insert(request.id);
                }
                Err(e) if e.is_rejection() => {
                    warn!(
                        id = %request.id,
                        path = %request.path,
                        error = %e,
                        "Queued request refused, dropping it"
                    );
                    dropped += 1;
                    finished.insert(request.id);
                }
                Err(e) => {
                    warn!(
                        id = %request.id,
                        path = %request.path,
                        attempts = request.attempts + 1,
                        error = %e,
                        "Queued request still failing"
                    );
                    failed.insert(request.id);
                }
            }
        }

        // Re-read so requests queued during the sends survive
        let _edit = self.locks.edit.lock().await;
        let remaining: Vec<QueuedRequest> = self
            .pending()
            .await?
            .into_iter()
            .filter(|r| !finished.contains(&r.id))
            .map(|mut r| {
                if failed.contains(&r.id) {
                    r.attempts += 1;
                }
                r
            })
            .collect();

        if remaining.is_empty() {
            self.store.remove(keys::OFFLINE_QUEUE).await?;
        } else {
            set_json(&self.store, keys::OFFLINE_QUEUE, &remaining).await?;
        }

        info!(delivered, dropped, remaining = remaining.len(), "Offline queue flushed");
        Ok(FlushReport {
            delivered,
            dropped,
            remaining: remaining.len(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use bazaar_core::{GuestCartId, UserId};

    use super::*;
    use crate::storage::MemoryStore;

    /// Answers 503 for paths containing `fail_marker` and 404 for paths
    /// containing `gone_marker`; delivers everything else.
    struct ScriptedSender {
        fail_marker: &'static str,
        gone_marker: &'static str,
        delay: Duration,
        sent: StdMutex<Vec<String>>,
    }

    impl RequestSender for ScriptedSender {
        async fn send(&self, request: &QueuedRequest) -> Result<(), ClientError> {
            self.sent.lock().unwrap().push(request.path.clone());
            tokio::time::sleep(self.delay).await;
            if request.path.contains(self.fail_marker) {
                return Err(ClientError::Api {
                    status: 503,
                    message: "unavailable".to_string(),
                });
            }
            if request.path.contains(self.gone_marker) {
                return Err(ClientError::NotFound(request.path.clone()));
            }
            Ok(())
        }
    }

    fn sender(fail_marker: &'static str) -> ScriptedSender {
        ScriptedSender {
            fail_marker,
            gone_marker: "gone",
            delay: Duration::ZERO,
            sent: StdMutex::new(Vec::new()),
        }
    }

    async fn queue_with(paths: &[&str]) -> OfflineQueue<MemoryStore> {
        let queue = OfflineQueue::new(MemoryStore::new());
        for path in paths {
            queue
                .enqueue(QueuedRequest::new(QueuedMethod::Post, *path, None))
                .await
                .unwrap();
        }
        queue
    }

    #[tokio::test]
    async fn test_enqueue_persists_in_order() {
        let queue = OfflineQueue::new(MemoryStore::new());
        queue
            .enqueue(QueuedRequest::new(QueuedMethod::Post, "delivery/cart/add", None))
            .await
            .unwrap();
        queue
            .enqueue(QueuedRequest::new(QueuedMethod::Delete, "delivery/cart/g1", None))
            .await
            .unwrap();

        let pending = queue.pending().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].path, "delivery/cart/add");
        assert_eq!(pending[1].method, QueuedMethod::Delete);
    }

    #[tokio::test]
    async fn test_flush_drops_delivered_and_keeps_failed() {
        let queue = queue_with(&["a/ok", "b/fail", "c/ok", "d/fail"]).await;

        let sender = sender("fail");
        let report = queue.flush(&sender).await.unwrap();

        assert_eq!(
            report,
            FlushReport {
                delivered: 2,
                dropped: 0,
                remaining: 2
            }
        );
        assert_eq!(sender.sent.lock().unwrap().len(), 4);

        let pending = queue.pending().await.unwrap();
        let paths: Vec<_> = pending.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, ["b/fail", "d/fail"]);
        assert!(pending.iter().all(|r| r.attempts == 1));
    }

    #[tokio::test]
    async fn test_flush_discards_refused_requests() {
        let queue = queue_with(&["a/gone", "b/fail", "c/ok"]).await;

        let report = queue.flush(&sender("fail")).await.unwrap();

        assert_eq!(
            report,
            FlushReport {
                delivered: 1,
                dropped: 1,
                remaining: 1
            }
        );
        let pending = queue.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].path, "b/fail");

        // A second flush does not send the refused request again
        let again = sender("fail");
        queue.flush(&again).await.unwrap();
        assert_eq!(*again.sent.lock().unwrap(), ["b/fail"]);
    }

    #[tokio::test]
    async fn test_enqueue_during_flush_is_kept() {
        let queue = queue_with(&["a/ok"]).await;
        let producer = queue.clone();
        let slow = ScriptedSender {
            delay: Duration::from_millis(50),
            ..sender("fail")
        };

        let (report, queued) = tokio::join!(queue.flush(&slow), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            producer
                .enqueue(QueuedRequest::new(QueuedMethod::Post, "b/ok", None))
                .await
        });
        queued.unwrap();

        assert_eq!(report.unwrap().delivered, 1);
        let pending = queue.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].path, "b/ok");
        assert_eq!(pending[0].attempts, 0);
    }

    #[tokio::test]
    async fn test_flush_empty_queue_sends_nothing() {
        let queue = OfflineQueue::new(MemoryStore::new());
        let sender = sender("fail");
        let report = queue.flush(&sender).await.unwrap();
        assert_eq!(report, FlushReport::default());
        assert!(sender.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_full_flush_removes_key() {
        let store = MemoryStore::new();
        let queue = OfflineQueue::new(store.clone());
        queue
            .enqueue(QueuedRequest::new(
                QueuedMethod::Post,
                "delivery/cart/add",
                Some(serde_json::json!({"quantity": 1})),
            ))
            .await
            .unwrap();

        let report = queue.flush(&sender("never")).await.unwrap();

        assert_eq!(report.delivered, 1);
        assert!(!store.contains(keys::OFFLINE_QUEUE));
    }

    #[test]
    fn test_cart_deletions_target_cart_paths() {
        let guest = CartKey::Anonymous(GuestCartId::new("g1"));
        let user = CartKey::User(UserId::new("u1"));

        let clear = QueuedRequest::clear_cart(&guest);
        assert_eq!(clear.method, QueuedMethod::Delete);
        assert_eq!(clear.path, "delivery/cart/g1");

        let remove = QueuedRequest::remove_item(&user, &ProductId::new("p1"));
        assert_eq!(remove.method, QueuedMethod::Delete);
        assert_eq!(remove.path, "delivery/cart/user/u1/items/p1");
        assert!(remove.body.is_none());
    }

    #[test]
    fn test_queued_request_wire_format() {
        let request = QueuedRequest::new(QueuedMethod::Delete, "delivery/cart/g1", None);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["method"], "DELETE");
        assert!(value.get("queuedAt").is_some());
        assert_eq!(request.method.to_string(), "DELETE");
    }
}

//! End-to-end cart session tests against the in-process mock backend.
//!
//! Run with: cargo test -p bazaar-integration-tests

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use bazaar_client::storage::{keys, set_json};
use bazaar_client::{
    AddItemRequest, ApiClient, CartSession, FlushReport, HttpCartApi, LocalStore, MemoryStore,
    MergeOutcome, OfflineQueue, QueuedMethod, QueuedRequest,
};
use bazaar_core::{CartPhase, GuestCartId, ProductId};
use bazaar_integration_tests::{CartRef, Method, MockBackend, StatusCode, cart_item};
use rust_decimal::Decimal;

type Session = CartSession<HttpCartApi, MemoryStore>;

fn new_session(backend: &MockBackend, store: MemoryStore, token: Option<&str>) -> Session {
    let config = backend.api_config(token).unwrap();
    CartSession::new(HttpCartApi::new(ApiClient::new(&config).unwrap()), store)
}

async fn guest_ref(store: &MemoryStore) -> CartRef {
    CartRef::Guest(store.get(keys::GUEST_CART_ID).await.unwrap().unwrap())
}

// ============================================================================
// Add and totals
// ============================================================================

#[tokio::test]
async fn test_guest_add_creates_server_cart() {
    let backend = MockBackend::start().await.unwrap();
    let store = MemoryStore::new();
    let session = new_session(&backend, store.clone(), None);

    assert!(session.add_to_cart(&cart_item("p1", 10, 1, "s1"), 2).await);

    let totals = session.totals();
    assert_eq!(totals.total_price, Decimal::from(20));
    assert_eq!(totals.total_quantity, 2);
    assert_eq!(session.phase(), CartPhase::Anonymous);

    let server_cart = backend.cart(&guest_ref(&store).await).unwrap();
    assert_eq!(server_cart.len(), 1);
    assert_eq!(server_cart[0].quantity, 2);

    let requests = backend.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, Method::POST);
    assert_eq!(requests[0].path, "/api/delivery/cart/add");
    assert!(requests[0].authorization.is_none());
}

#[tokio::test]
async fn test_sequential_adds_match_server_after_reload() {
    let backend = MockBackend::start().await.unwrap();
    let store = MemoryStore::new();
    let session = new_session(&backend, store.clone(), None);

    assert!(session.add_to_cart(&cart_item("p1", 10, 1, "s1"), 2).await);
    assert!(session.add_to_cart(&cart_item("p2", 4, 1, "s1"), 3).await);
    assert!(session.add_to_cart(&cart_item("p1", 10, 1, "s1"), 1).await);

    // A fresh session over the same storage sees the same cart
    let reloaded = new_session(&backend, store, None);
    reloaded.load(None).await;

    let totals = reloaded.totals();
    assert_eq!(totals.total_quantity, 6);
    assert_eq!(totals.total_price, Decimal::from(42));
}

#[tokio::test]
async fn test_cross_store_add_is_rejected() {
    let backend = MockBackend::start().await.unwrap();
    let session = new_session(&backend, MemoryStore::new(), None);

    assert!(session.add_to_cart(&cart_item("p1", 10, 1, "s1"), 1).await);
    let before = session.items();

    assert!(!session.add_to_cart(&cart_item("p9", 3, 1, "s2"), 1).await);
    assert_eq!(session.items(), before);
}

#[tokio::test]
async fn test_bearer_token_sent_on_every_request() {
    let backend = MockBackend::start().await.unwrap();
    let session = new_session(&backend, MemoryStore::new(), Some("tok-1"));

    assert!(session.add_to_cart(&cart_item("p1", 10, 1, "s1"), 1).await);
    session.load(None).await;

    let requests = backend.requests();
    assert_eq!(requests.len(), 2);
    assert!(
        requests
            .iter()
            .all(|r| r.authorization.as_deref() == Some("Bearer tok-1"))
    );
}

// ============================================================================
// Update, remove, clear
// ============================================================================

#[tokio::test]
async fn test_update_quantity_sends_negative_delta() {
    let backend = MockBackend::start().await.unwrap();
    let session = new_session(&backend, MemoryStore::new(), None);
    assert!(session.add_to_cart(&cart_item("p1", 10, 1, "s1"), 2).await);

    assert!(session.update_quantity(&ProductId::new("p1"), 1).await);

    let adds = backend.adds();
    assert_eq!(adds.last().unwrap().quantity, -1);
    assert_eq!(session.totals().total_quantity, 1);
}

#[tokio::test]
async fn test_update_to_zero_removes_item() {
    let backend = MockBackend::start().await.unwrap();
    let store = MemoryStore::new();
    let session = new_session(&backend, store.clone(), None);
    assert!(session.add_to_cart(&cart_item("p1", 10, 1, "s1"), 2).await);
    assert!(session.add_to_cart(&cart_item("p2", 5, 1, "s1"), 1).await);

    assert!(session.update_quantity(&ProductId::new("p1"), 0).await);

    let cart_id = store.get(keys::GUEST_CART_ID).await.unwrap().unwrap();
    let requests = backend.requests();
    let delete = requests
        .iter()
        .find(|r| r.method == Method::DELETE)
        .unwrap();
    assert_eq!(delete.path, format!("/api/delivery/cart/{cart_id}/items/p1"));

    let ids: Vec<_> = session.items().into_iter().map(|i| i.id).collect();
    assert_eq!(ids, [ProductId::new("p2")]);
}

#[tokio::test]
async fn test_update_absent_item_sends_nothing() {
    let backend = MockBackend::start().await.unwrap();
    let session = new_session(&backend, MemoryStore::new(), None);
    assert!(session.add_to_cart(&cart_item("p1", 10, 1, "s1"), 2).await);
    let before = session.items();
    let count = backend.request_count();

    assert!(session.update_quantity(&ProductId::new("ghost"), 4).await);

    assert_eq!(backend.request_count(), count);
    assert_eq!(session.items(), before);
}

#[tokio::test]
async fn test_clear_empties_cart_even_when_server_refuses() {
    let backend = MockBackend::start().await.unwrap();
    let store = MemoryStore::new();
    let session = new_session(&backend, store.clone(), None);
    assert!(session.add_to_cart(&cart_item("p1", 10, 1, "s1"), 2).await);

    backend.fail_with(Some(StatusCode::INTERNAL_SERVER_ERROR));
    session.clear_cart().await;
    backend.fail_with(None);

    assert!(session.items().is_empty());
    // The server still holds the cart; only the local view was emptied
    assert!(backend.cart(&guest_ref(&store).await).is_some());
}

#[tokio::test]
async fn test_clear_deletes_server_cart() {
    let backend = MockBackend::start().await.unwrap();
    let store = MemoryStore::new();
    let session = new_session(&backend, store.clone(), None);
    assert!(session.add_to_cart(&cart_item("p1", 10, 1, "s1"), 2).await);

    session.clear_cart().await;

    assert!(session.items().is_empty());
    assert!(backend.cart(&guest_ref(&store).await).is_none());
}

// ============================================================================
// Load
// ============================================================================

#[tokio::test]
async fn test_missing_user_cart_falls_back_to_guest() {
    let backend = MockBackend::start().await.unwrap();
    let store = MemoryStore::new();
    let session = new_session(&backend, store.clone(), None);
    assert!(session.add_to_cart(&cart_item("p1", 10, 1, "s1"), 1).await);

    store.set(keys::USER_ID, "u-new").await.unwrap();
    session.load(None).await;

    assert_eq!(session.phase(), CartPhase::Anonymous);
    assert_eq!(session.items().len(), 1);
    let paths: Vec<_> = backend.requests().into_iter().map(|r| r.path).collect();
    assert!(paths.contains(&"/api/delivery/cart/user/u-new".to_owned()));
}

#[tokio::test]
async fn test_load_user_cart() {
    let backend = MockBackend::start().await.unwrap();
    backend.seed(
        CartRef::User("u1".to_owned()),
        vec![cart_item("p1", 7, 3, "s1")],
    );
    let session = new_session(&backend, MemoryStore::new(), None);

    session.load(Some(&"u1".into())).await;

    assert_eq!(session.phase(), CartPhase::User);
    assert_eq!(session.totals().total_price, Decimal::from(21));
}

// ============================================================================
// Merge
// ============================================================================

async fn store_guest_snapshot(store: &MemoryStore) {
    set_json(store, keys::GUEST_CART_SNAPSHOT, &[cart_item("p1", 10, 2, "s1")])
        .await
        .unwrap();
    store.set(keys::GUEST_CART_STORE_ID, "s1").await.unwrap();
}

#[tokio::test]
async fn test_merge_without_snapshot_sends_nothing() {
    let backend = MockBackend::start().await.unwrap();
    let session = new_session(&backend, MemoryStore::new(), Some("tok-1"));

    let outcome = session.merge_guest_cart(&"u1".into()).await;

    assert_eq!(outcome, MergeOutcome::NoSnapshot);
    assert_eq!(backend.request_count(), 0);
    assert!(session.items().is_empty());
}

#[tokio::test]
async fn test_merge_moves_snapshot_into_user_cart() {
    let backend = MockBackend::start().await.unwrap();
    backend.register_token("tok-1", "u1");
    backend.seed(
        CartRef::User("u1".to_owned()),
        vec![cart_item("p1", 10, 1, "s1")],
    );
    let store = MemoryStore::new();
    store_guest_snapshot(&store).await;
    let session = new_session(&backend, store.clone(), Some("tok-1"));

    let outcome = session.merge_guest_cart(&"u1".into()).await;

    assert_eq!(outcome, MergeOutcome::Merged);
    assert_eq!(session.phase(), CartPhase::User);
    assert_eq!(session.totals().total_quantity, 3);

    let merges = backend.merges();
    assert_eq!(merges.len(), 1);
    assert_eq!(merges[0].store_id.as_ref().unwrap().as_str(), "s1");

    let merge_request = backend
        .requests()
        .into_iter()
        .find(|r| r.path == "/api/delivery/cart/merge")
        .unwrap();
    assert!(merge_request.idempotency_key.is_some());

    assert!(!store.contains(keys::GUEST_CART_SNAPSHOT));
    assert!(!store.contains(keys::GUEST_CART_STORE_ID));
    assert!(!store.contains(keys::GUEST_CART_MERGE_TOKEN));
}

#[tokio::test]
async fn test_failed_merge_retries_with_same_key() {
    let backend = MockBackend::start().await.unwrap();
    backend.register_token("tok-1", "u1");
    let store = MemoryStore::new();
    store_guest_snapshot(&store).await;
    let session = new_session(&backend, store.clone(), Some("tok-1"));

    backend.fail_with(Some(StatusCode::SERVICE_UNAVAILABLE));
    assert_eq!(
        session.merge_guest_cart(&"u1".into()).await,
        MergeOutcome::Failed
    );
    backend.fail_with(None);
    assert!(store.contains(keys::GUEST_CART_SNAPSHOT));

    assert_eq!(
        session.merge_guest_cart(&"u1".into()).await,
        MergeOutcome::Merged
    );

    let keys_sent: Vec<_> = backend
        .requests()
        .into_iter()
        .filter(|r| r.path == "/api/delivery/cart/merge")
        .map(|r| r.idempotency_key.unwrap())
        .collect();
    assert_eq!(keys_sent.len(), 2);
    assert_eq!(keys_sent[0], keys_sent[1]);

    let user_cart = backend.cart(&CartRef::User("u1".to_owned())).unwrap();
    assert_eq!(user_cart[0].quantity, 2);
}

#[tokio::test]
async fn test_merge_without_valid_token_fails() {
    let backend = MockBackend::start().await.unwrap();
    let store = MemoryStore::new();
    store_guest_snapshot(&store).await;
    let session = new_session(&backend, store.clone(), Some("unknown"));

    let outcome = session.merge_guest_cart(&"u1".into()).await;

    assert_eq!(outcome, MergeOutcome::Failed);
    assert!(store.contains(keys::GUEST_CART_SNAPSHOT));
}

// ============================================================================
// Offline queue
// ============================================================================

#[tokio::test]
async fn test_offline_queue_replays_against_backend() {
    let backend = MockBackend::start().await.unwrap();
    let config = backend.api_config(None).unwrap();
    let client = ApiClient::new(&config).unwrap();
    let queue = OfflineQueue::new(MemoryStore::new());

    let add = AddItemRequest::new(
        GuestCartId::new("offline-cart"),
        None,
        &cart_item("p1", 10, 1, "s1"),
        2,
    );
    queue
        .enqueue(QueuedRequest::new(
            QueuedMethod::Post,
            "delivery/cart/add",
            Some(serde_json::to_value(&add).unwrap()),
        ))
        .await
        .unwrap();
    queue
        .enqueue(QueuedRequest::new(
            QueuedMethod::Delete,
            "delivery/cart/does-not-exist",
            None,
        ))
        .await
        .unwrap();

    let report = queue.flush(&client).await.unwrap();

    // The 404 is final, so the delete is dropped instead of retried
    assert_eq!(
        report,
        FlushReport {
            delivered: 1,
            dropped: 1,
            remaining: 0
        }
    );
    let cart = backend
        .cart(&CartRef::Guest("offline-cart".to_owned()))
        .unwrap();
    assert_eq!(cart[0].quantity, 2);
    assert!(queue.pending().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_offline_queue_keeps_requests_while_server_errors() {
    let backend = MockBackend::start().await.unwrap();
    let config = backend.api_config(None).unwrap();
    let client = ApiClient::new(&config).unwrap();
    let queue = OfflineQueue::new(MemoryStore::new());
    backend.seed(
        CartRef::Guest("g-queued".to_owned()),
        vec![cart_item("p1", 10, 1, "s1")],
    );
    queue
        .enqueue(QueuedRequest::new(
            QueuedMethod::Delete,
            "delivery/cart/g-queued",
            None,
        ))
        .await
        .unwrap();

    backend.fail_with(Some(StatusCode::SERVICE_UNAVAILABLE));
    let report = queue.flush(&client).await.unwrap();
    assert_eq!(report.remaining, 1);
    assert_eq!(queue.pending().await.unwrap()[0].attempts, 1);

    backend.fail_with(None);
    let report = queue.flush(&client).await.unwrap();
    assert_eq!(report.delivered, 1);
    assert!(queue.pending().await.unwrap().is_empty());
    assert!(backend.cart(&CartRef::Guest("g-queued".to_owned())).is_none());
}

//! Integration test support for the Bazaar cart client.
//!
//! [`MockBackend`] is an in-process axum server that models the delivery
//! cart backend closely enough to exercise the real HTTP client end to end:
//!
//! - carts keyed by guest cart ID or user ID, created by the first add
//! - one store per cart (a second store answers `409 Conflict`)
//! - signed quantity deltas; a line reaching zero is dropped
//! - `404 Not Found` for carts that do not exist
//! - merge resolves the user from the bearer token and applies each
//!   `Idempotency-Key` once
//!
//! Every request is recorded, and a failure status can be injected for all
//! requests.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p bazaar-integration-tests
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::extract::{Path, Request, State};
use axum::http::HeaderMap;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use bazaar_client::{AddItemRequest, ApiConfig, ConfigError, MergeRequest};
use bazaar_core::{CartItem, ProductId, StoreId};
use rust_decimal::Decimal;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

pub use axum::http::{Method, StatusCode};

/// A cart as the backend addresses it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CartRef {
    Guest(String),
    User(String),
}

/// A request as it reached the backend.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    /// Full path including the `/api` prefix.
    pub path: String,
    pub authorization: Option<String>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Default)]
struct BackendState {
    carts: HashMap<CartRef, Vec<CartItem>>,
    /// Bearer token to user ID.
    tokens: HashMap<String, String>,
    requests: Vec<RecordedRequest>,
    adds: Vec<AddItemRequest>,
    merges: Vec<MergeRequest>,
    merge_keys: HashSet<String>,
    fail_with: Option<StatusCode>,
}

type Shared = Arc<Mutex<BackendState>>;

fn lock(state: &Shared) -> MutexGuard<'_, BackendState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-process delivery cart backend bound to a random local port.
///
/// The server stops when the value is dropped.
pub struct MockBackend {
    addr: SocketAddr,
    state: Shared,
    server: JoinHandle<()>,
}

impl MockBackend {
    /// Bind to `127.0.0.1:0` and start serving.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn start() -> std::io::Result<Self> {
        let state = Shared::default();
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let app = router(state.clone());
        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("Mock backend stopped: {e}");
            }
        });

        Ok(Self {
            addr,
            state,
            server,
        })
    }

    /// Base URL to configure the client with.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    /// Client configuration pointing at this backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL does not parse.
    pub fn api_config(&self, token: Option<&str>) -> Result<ApiConfig, ConfigError> {
        let mut config = ApiConfig::new(&self.base_url())?;
        config.token = token.map(|t| t.to_owned().into());
        Ok(config)
    }

    /// Accept `token` as a bearer token for `user_id`.
    pub fn register_token(&self, token: &str, user_id: &str) {
        lock(&self.state)
            .tokens
            .insert(token.to_owned(), user_id.to_owned());
    }

    /// Replace the contents of a cart.
    pub fn seed(&self, cart: CartRef, items: Vec<CartItem>) {
        lock(&self.state).carts.insert(cart, items);
    }

    /// Current contents of a cart, `None` if it does not exist.
    #[must_use]
    pub fn cart(&self, cart: &CartRef) -> Option<Vec<CartItem>> {
        lock(&self.state).carts.get(cart).cloned()
    }

    /// Every request received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.state).requests.clone()
    }

    /// Number of requests received so far.
    #[must_use]
    pub fn request_count(&self) -> usize {
        lock(&self.state).requests.len()
    }

    /// Bodies of add requests that reached the handler.
    #[must_use]
    pub fn adds(&self) -> Vec<AddItemRequest> {
        lock(&self.state).adds.clone()
    }

    /// Bodies of merge requests that reached the handler.
    #[must_use]
    pub fn merges(&self) -> Vec<MergeRequest> {
        lock(&self.state).merges.clone()
    }

    /// Answer every request with `status` until reset with `None`.
    pub fn fail_with(&self, status: Option<StatusCode>) {
        lock(&self.state).fail_with = status;
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// Build a cart item with the fields the backend cares about.
#[must_use]
pub fn cart_item(id: &str, price: i64, quantity: u32, store_id: &str) -> CartItem {
    CartItem {
        id: ProductId::new(id),
        name: format!("Product {id}"),
        price: Decimal::from(price),
        quantity,
        image: None,
        original_price: None,
        store_id: StoreId::new(store_id),
        store_type: "restaurant".to_owned(),
    }
}

// ============================================================================
// Router
// ============================================================================

fn router(state: Shared) -> Router {
    let api = Router::new()
        .route("/delivery/cart/add", post(add_item))
        .route("/delivery/cart/merge", post(merge))
        .route(
            "/delivery/cart/user/{user_id}",
            get(fetch_user).delete(clear_user),
        )
        .route(
            "/delivery/cart/user/{user_id}/items/{item_id}",
            delete(remove_user_item),
        )
        .route(
            "/delivery/cart/{cart_id}",
            get(fetch_guest).delete(clear_guest),
        )
        .route(
            "/delivery/cart/{cart_id}/items/{item_id}",
            delete(remove_guest_item),
        );

    Router::new()
        .nest("/api", api)
        .layer(middleware::from_fn_with_state(state.clone(), record))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Record the request and apply any injected failure.
async fn record(State(state): State<Shared>, request: Request, next: Next) -> Response {
    let recorded = {
        let header = |name: &str| {
            request
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        };
        RecordedRequest {
            method: request.method().clone(),
            path: request.uri().path().to_owned(),
            authorization: header("authorization"),
            idempotency_key: header("idempotency-key"),
        }
    };

    let fail_with = {
        let mut state = lock(&state);
        state.requests.push(recorded);
        state.fail_with
    };
    if let Some(status) = fail_with {
        return error(status, "Injected failure");
    }

    next.run(request).await
}

// ============================================================================
// Handlers
// ============================================================================

async fn fetch_guest(State(state): State<Shared>, Path(cart_id): Path<String>) -> Response {
    fetch(&state, &CartRef::Guest(cart_id))
}

async fn fetch_user(State(state): State<Shared>, Path(user_id): Path<String>) -> Response {
    fetch(&state, &CartRef::User(user_id))
}

fn fetch(state: &Shared, cart: &CartRef) -> Response {
    match lock(state).carts.get(cart) {
        Some(items) => cart_body(items),
        None => error(StatusCode::NOT_FOUND, "Cart not found"),
    }
}

async fn add_item(State(state): State<Shared>, Json(request): Json<AddItemRequest>) -> Response {
    let mut state = lock(&state);
    state.adds.push(request.clone());

    let cart = match &request.user_id {
        Some(user_id) => CartRef::User(user_id.to_string()),
        None => CartRef::Guest(request.cart_id.to_string()),
    };
    let items = state.carts.entry(cart).or_default();

    if let Some(other) = items.iter().find(|i| i.store_id != request.store_id) {
        return error(
            StatusCode::CONFLICT,
            &format!("Cart already holds items from store {}", other.store_id),
        );
    }

    match items.iter().position(|i| i.id == request.product_id) {
        Some(index) => {
            let current = items.get(index).map_or(0, |i| i64::from(i.quantity));
            let updated = current + request.quantity;
            if updated <= 0 {
                items.remove(index);
            } else if let Some(line) = items.get_mut(index) {
                line.quantity = clamp_quantity(updated);
            }
        }
        None if request.quantity > 0 => items.push(CartItem {
            id: request.product_id.clone(),
            name: request.name.clone(),
            price: request.price,
            quantity: clamp_quantity(request.quantity),
            image: request.image.clone(),
            original_price: None,
            store_id: request.store_id.clone(),
            store_type: String::new(),
        }),
        None => {
            return error(
                StatusCode::BAD_REQUEST,
                "Quantity must be positive for a new item",
            );
        }
    }

    cart_body(items)
}

async fn merge(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(request): Json<MergeRequest>,
) -> Response {
    let mut state = lock(&state);

    let user_id = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .and_then(|token| state.tokens.get(token).cloned());
    let Some(user_id) = user_id else {
        return error(StatusCode::UNAUTHORIZED, "Unknown or missing token");
    };

    state.merges.push(request.clone());

    if let Some(key) = headers.get("idempotency-key").and_then(|v| v.to_str().ok())
        && !state.merge_keys.insert(key.to_owned())
    {
        return Json(json!({ "merged": false, "replayed": true })).into_response();
    }

    let items = state.carts.entry(CartRef::User(user_id)).or_default();
    for incoming in request.items {
        match items.iter_mut().find(|i| i.id == incoming.id) {
            Some(line) => line.quantity = line.quantity.saturating_add(incoming.quantity),
            None => items.push(incoming),
        }
    }

    Json(json!({ "merged": true })).into_response()
}

async fn remove_guest_item(
    State(state): State<Shared>,
    Path((cart_id, item_id)): Path<(String, String)>,
) -> Response {
    remove_item(&state, &CartRef::Guest(cart_id), &item_id)
}

async fn remove_user_item(
    State(state): State<Shared>,
    Path((user_id, item_id)): Path<(String, String)>,
) -> Response {
    remove_item(&state, &CartRef::User(user_id), &item_id)
}

fn remove_item(state: &Shared, cart: &CartRef, item_id: &str) -> Response {
    let mut state = lock(state);
    let Some(items) = state.carts.get_mut(cart) else {
        return error(StatusCode::NOT_FOUND, "Cart not found");
    };
    items.retain(|i| i.id.as_str() != item_id);
    StatusCode::NO_CONTENT.into_response()
}

async fn clear_guest(State(state): State<Shared>, Path(cart_id): Path<String>) -> Response {
    clear(&state, &CartRef::Guest(cart_id))
}

async fn clear_user(State(state): State<Shared>, Path(user_id): Path<String>) -> Response {
    clear(&state, &CartRef::User(user_id))
}

fn clear(state: &Shared, cart: &CartRef) -> Response {
    if lock(state).carts.remove(cart).is_some() {
        StatusCode::NO_CONTENT.into_response()
    } else {
        error(StatusCode::NOT_FOUND, "Cart not found")
    }
}

// ============================================================================
// Responses
// ============================================================================

fn cart_body(items: &[CartItem]) -> Response {
    Json(json!({
        "items": items,
        "storeId": items.first().map(|i| i.store_id.as_str()),
    }))
    .into_response()
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "message": message }))).into_response()
}

fn clamp_quantity(quantity: i64) -> u32 {
    u32::try_from(quantity).unwrap_or(u32::MAX)
}

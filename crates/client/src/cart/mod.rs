//! Cart session manager.
//!
//! Owns the client's mirror of the server cart and mediates between the
//! guest cart identifier and the signed-in user's ID.
//!
//! # Error policy
//!
//! The server is authoritative and the cart is not critical, so most
//! failures are absorbed here instead of propagated:
//!
//! - [`CartSession::load`] resets the items to empty on any failure
//! - [`CartSession::add_to_cart`] reports a single `bool`
//! - [`CartSession::remove_from_cart`] and [`CartSession::clear_cart`] log,
//!   and queue the deletion for replay when the server was unreachable and
//!   an [`OfflineQueue`] is attached
//! - [`CartSession::merge_guest_cart`] logs at error level and returns a
//!   [`MergeOutcome`]
//!
//! # Ordering
//!
//! Every operation runs under a single-flight lock. A second call waits
//! for the first to finish, so responses are applied in the order the
//! calls were issued.


use bazaar_core::{CartItem, CartPhase, CartTotals, GuestCartId, ProductId, StoreId, UserId};
use rand::Rng;
use rand::distr::Alphanumeric;
use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::api::{AddItemRequest, CartApi, CartKey, MergeRequest};
use crate::error::{ClientError, add_breadcrumb};
use crate::queue::{OfflineQueue, QueuedRequest};
use crate::storage::{LocalStore, StorageError, get_json, keys};

/// Length of generated guest cart identifiers.
const GUEST_CART_ID_LENGTH: usize = 32;

/// The cart as last reported by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CartSnapshot {
    pub items: Vec<CartItem>,
    pub phase: CartPhase,
}

impl CartSnapshot {
    /// Totals derived from the items.
    #[must_use]
    pub fn totals(&self) -> CartTotals {
        CartTotals::from_items(&self.items)
    }
}

/// Result of [`CartSession::merge_guest_cart`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// There was no guest snapshot to merge; nothing was sent.
    NoSnapshot,
    /// The snapshot was merged and removed from local storage.
    Merged,
    /// The merge failed; the snapshot is still stored for a later attempt.
    Failed,
}

/// Client-side cart state over a cart backend and a local store.
///
/// Share it between tasks with an `Arc`. Consumers read the current state
/// with [`items`](Self::items) or [`totals`](Self::totals), or watch it with
/// [`subscribe`](Self::subscribe).
pub struct CartSession<A, S> {
    api: A,
    store: S,
    state: watch::Sender<CartSnapshot>,
    flight: Mutex<()>,
    offline: Option<OfflineQueue<S>>,
}

impl<A, S> std::fmt::Debug for CartSession<A, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartSession")
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl<A: CartApi, S: LocalStore> CartSession<A, S> {
    /// Create a session with an empty cart. Call [`load`](Self::load) to
    /// fetch the server's copy.
    #[must_use]
    pub fn new(api: A, store: S) -> Self {
        let (state, _) = watch::channel(CartSnapshot::default());
        Self {
            api,
            store,
            state,
            flight: Mutex::new(()),
            offline: None,
        }
    }

    /// Queue deletions that could not reach the server on `queue`.
    #[must_use]
    pub fn with_offline_queue(mut self, queue: OfflineQueue<S>) -> Self {
        self.offline = Some(queue);
        self
    }

    /// The cart backend.
    pub const fn api(&self) -> &A {
        &self.api
    }

    /// The local store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Current items.
    #[must_use]
    pub fn items(&self) -> Vec<CartItem> {
        self.state.borrow().items.clone()
    }

    /// Current items and phase.
    #[must_use]
    pub fn snapshot(&self) -> CartSnapshot {
        self.state.borrow().clone()
    }

    /// Totals over the current items.
    #[must_use]
    pub fn totals(&self) -> CartTotals {
        self.state.borrow().totals()
    }

    /// Where the cart currently lives.
    #[must_use]
    pub fn phase(&self) -> CartPhase {
        self.state.borrow().phase
    }

    /// Receive every change to the cart.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CartSnapshot> {
        self.state.subscribe()
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Replace the local items with the server's cart.
    ///
    /// Uses `user_id`, or the stored user ID when `None`. A user cart that
    /// does not exist on the server falls back to the guest cart. Any failure
    /// leaves the cart empty.
    #[instrument(skip(self))]
    pub async fn load(&self, user_id: Option<&UserId>) {
        let _flight = self.flight.lock().await;
        let user_id = match user_id {
            Some(id) => Some(id.clone()),
            None => self.current_user().await,
        };
        self.load_unlocked(user_id).await;
    }

    /// Add `quantity` of `item` to the server cart.
    ///
    /// `quantity` is a signed delta; `item.quantity` is ignored. Returns
    /// `true` and adopts the server's cart on success. Returns `false`
    /// without touching local state on any failure, including the server
    /// refusing an item from a different store.
    #[instrument(skip(self, item), fields(product_id = %item.id, store_id = %item.store_id))]
    pub async fn add_to_cart(&self, item: &CartItem, quantity: i64) -> bool {
        let _flight = self.flight.lock().await;
        self.add_unlocked(item, quantity).await
    }

    /// Set the quantity of an item already in the cart.
    ///
    /// Items not in the local cart are ignored without a request. For items
    /// in the cart, a quantity of zero or less removes the item; otherwise
    /// the difference from the local quantity is sent through the add
    /// endpoint, and an unchanged quantity sends nothing. Returns `false`
    /// only if the server rejected the delta.
    #[instrument(skip(self))]
    pub async fn update_quantity(&self, id: &ProductId, new_quantity: i64) -> bool {
        let _flight = self.flight.lock().await;

        let current = {
            let state = self.state.borrow();
            state.items.iter().find(|i| &i.id == id).cloned()
        };
        let Some(item) = current else {
            debug!("Item not in cart, nothing to update");
            return true;
        };

        if new_quantity <= 0 {
            self.remove_unlocked(id).await;
            return true;
        }

        let delta = new_quantity - i64::from(item.quantity);
        if delta == 0 {
            return true;
        }

        self.add_unlocked(&item, delta).await
    }

    /// Remove an item from the server cart, then reload.
    ///
    /// The local items change only once the reload completes.
    #[instrument(skip(self))]
    pub async fn remove_from_cart(&self, id: &ProductId) {
        let _flight = self.flight.lock().await;
        self.remove_unlocked(id).await;
    }

    /// Delete the server cart and empty the local items.
    ///
    /// Any answer from the server empties the list. A transport failure,
    /// where no answer arrived, leaves the items in place and queues the
    /// deletion for replay.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self) {
        let _flight = self.flight.lock().await;

        if let Some(key) = self.resolve_key(None).await {
            match self.api.clear_cart(&key).await {
                Ok(()) => info!(cart = %key, "Cart cleared"),
                Err(e) if e.is_transport() => {
                    error!(cart = %key, error = %e, "Failed to reach server to clear cart");
                    self.queue_for_replay(QueuedRequest::clear_cart(&key)).await;
                    return;
                }
                Err(e) => warn!(cart = %key, error = %e, kind = e.kind(), "Server refused cart clear"),
            }
        }

        self.state.send_modify(|state| state.items.clear());
    }

    /// Merge the stored guest cart snapshot into `user_id`'s cart.
    ///
    /// Without a snapshot nothing is sent. On success the snapshot is
    /// removed and the user's cart is loaded. On failure the snapshot stays
    /// so a later call can retry with the same idempotency key.
    #[instrument(skip(self))]
    pub async fn merge_guest_cart(&self, user_id: &UserId) -> MergeOutcome {
        let _flight = self.flight.lock().await;

        let items = match get_json::<_, Vec<CartItem>>(&self.store, keys::GUEST_CART_SNAPSHOT).await
        {
            Ok(Some(items)) => items,
            Ok(None) => return MergeOutcome::NoSnapshot,
            Err(e) => {
                error!(error = %e, "Guest cart snapshot unreadable, leaving it in place");
                return MergeOutcome::Failed;
            }
        };

        if items.is_empty() {
            debug!("Guest cart snapshot is empty, discarding it");
            if let Err(e) = self.discard_guest_snapshot().await {
                warn!(error = %e, "Failed to discard empty guest snapshot");
            }
            return MergeOutcome::NoSnapshot;
        }

        let previous_phase = self.phase();
        self.state.send_modify(|state| state.phase = CartPhase::Merging);

        match self.try_merge(items).await {
            Ok(()) => {
                info!(user_id = %user_id, "Guest cart merged");
                if let Err(e) = self.discard_guest_snapshot().await {
                    warn!(error = %e, "Merged guest snapshot could not be removed");
                }
                self.load_unlocked(Some(user_id.clone())).await;
                MergeOutcome::Merged
            }
            Err(e) => {
                error!(user_id = %user_id, error = %e, kind = e.kind(), "Guest cart merge failed");
                self.state.send_modify(|state| state.phase = previous_phase);
                MergeOutcome::Failed
            }
        }
    }

    /// Forget the stored guest cart identifier.
    ///
    /// The next add creates a fresh guest cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn forget_guest_cart(&self) -> Result<(), StorageError> {
        let _flight = self.flight.lock().await;
        self.store.remove(keys::GUEST_CART_ID).await
    }

    // =========================================================================
    // Unlocked internals (caller holds `flight`)
    // =========================================================================

    async fn load_unlocked(&self, user_id: Option<UserId>) {
        let guest_id = self.guest_cart_id().await;

        let result = match (user_id, guest_id) {
            (Some(user_id), guest_id) => {
                match self.api.fetch_cart(&CartKey::User(user_id.clone())).await {
                    Ok(items) => Ok((items, CartPhase::User)),
                    Err(ClientError::NotFound(_)) => match guest_id {
                        Some(guest_id) => {
                            debug!(user_id = %user_id, "No user cart, falling back to guest cart");
                            self.fetch_guest(guest_id).await
                        }
                        None => Ok((Vec::new(), CartPhase::NoCart)),
                    },
                    Err(e) => Err(e),
                }
            }
            (None, Some(guest_id)) => self.fetch_guest(guest_id).await,
            (None, None) => Ok((Vec::new(), CartPhase::NoCart)),
        };

        match result {
            Ok((items, phase)) => {
                debug!(items = items.len(), ?phase, "Cart loaded");
                self.publish(items, phase);
            }
            Err(e) => {
                warn!(error = %e, kind = e.kind(), "Cart load failed, showing empty cart");
                self.state.send_modify(|state| state.items.clear());
            }
        }
    }

    async fn fetch_guest(
        &self,
        guest_id: GuestCartId,
    ) -> Result<(Vec<CartItem>, CartPhase), ClientError> {
        let items = self.api.fetch_cart(&CartKey::Anonymous(guest_id)).await?;
        Ok((items, CartPhase::Anonymous))
    }

    async fn add_unlocked(&self, item: &CartItem, quantity: i64) -> bool {
        let cart_id = match self.ensure_guest_cart_id().await {
            Ok(id) => id,
            Err(e) => {
                error!(error = %e, "Could not obtain guest cart ID");
                return false;
            }
        };
        let user_id = self.current_user().await;
        let phase = if user_id.is_some() {
            CartPhase::User
        } else {
            CartPhase::Anonymous
        };

        let request = AddItemRequest::new(cart_id, user_id, item, quantity);
        match self.api.add_item(&request).await {
            Ok(items) => {
                debug!(items = items.len(), "Add accepted");
                self.publish(items, phase);
                true
            }
            Err(e) => {
                warn!(error = %e, kind = e.kind(), "Add to cart failed");
                add_breadcrumb(
                    "cart",
                    "Add to cart failed",
                    Some(&[("product_id", item.id.as_str()), ("kind", e.kind())][..]),
                );
                false
            }
        }
    }

    async fn remove_unlocked(&self, id: &ProductId) {
        let user_id = self.current_user().await;

        if let Some(key) = self.resolve_key(user_id.clone()).await
            && let Err(e) = self.api.remove_item(&key, id).await
        {
            warn!(cart = %key, item_id = %id, error = %e, kind = e.kind(), "Remove from cart failed");
            if e.is_transport() {
                self.queue_for_replay(QueuedRequest::remove_item(&key, id)).await;
            }
        }

        self.load_unlocked(user_id).await;
    }

    /// Merge request with the token kept for this snapshot.
    async fn try_merge(&self, items: Vec<CartItem>) -> Result<(), ClientError> {
        let store_id = match self.store.get(keys::GUEST_CART_STORE_ID).await? {
            Some(id) => Some(StoreId::new(id)),
            None => items.first().map(|item| item.store_id.clone()),
        };
        let token = self.merge_token().await?;

        let request = MergeRequest { items, store_id };
        self.api.merge_cart(&request, &token).await
    }

    async fn merge_token(&self) -> Result<String, StorageError> {
        if let Some(token) = self.store.get(keys::GUEST_CART_MERGE_TOKEN).await? {
            return Ok(token);
        }
        let token = Uuid::new_v4().to_string();
        self.store.set(keys::GUEST_CART_MERGE_TOKEN, &token).await?;
        Ok(token)
    }

    async fn queue_for_replay(&self, request: QueuedRequest) {
        let Some(queue) = &self.offline else {
            return;
        };
        if let Err(e) = queue.enqueue(request).await {
            warn!(error = %e, "Could not queue request for replay");
        }
    }

    async fn discard_guest_snapshot(&self) -> Result<(), StorageError> {
        self.store.remove(keys::GUEST_CART_SNAPSHOT).await?;
        self.store.remove(keys::GUEST_CART_STORE_ID).await?;
        self.store.remove(keys::GUEST_CART_MERGE_TOKEN).await
    }

    // =========================================================================
    // Identity helpers
    // =========================================================================

    /// User ID if given, else the stored one, keyed as a user cart; the
    /// guest cart otherwise.
    async fn resolve_key(&self, user_id: Option<UserId>) -> Option<CartKey> {
        let user_id = match user_id {
            Some(id) => Some(id),
            None => self.current_user().await,
        };
        match user_id {
            Some(id) => Some(CartKey::User(id)),
            None => self.guest_cart_id().await.map(CartKey::Anonymous),
        }
    }

    async fn current_user(&self) -> Option<UserId> {
        match self.store.get(keys::USER_ID).await {
            Ok(id) => id.filter(|id| !id.is_empty()).map(UserId::new),
            Err(e) => {
                warn!(error = %e, "Could not read stored user ID");
                None
            }
        }
    }

    async fn guest_cart_id(&self) -> Option<GuestCartId> {
        match self.store.get(keys::GUEST_CART_ID).await {
            Ok(id) => id.filter(|id| !id.is_empty()).map(GuestCartId::new),
            Err(e) => {
                warn!(error = %e, "Could not read stored guest cart ID");
                None
            }
        }
    }

    async fn ensure_guest_cart_id(&self) -> Result<GuestCartId, StorageError> {
        if let Some(id) = self.store.get(keys::GUEST_CART_ID).await?
            && !id.is_empty()
        {
            return Ok(GuestCartId::new(id));
        }

        let id = generate_guest_cart_id();
        self.store.set(keys::GUEST_CART_ID, id.as_str()).await?;
        info!("Created guest cart ID");
        Ok(id)
    }

    fn publish(&self, items: Vec<CartItem>, phase: CartPhase) {
        self.state.send_replace(CartSnapshot { items, phase });
    }
}

/// Generate a random alphanumeric guest cart identifier.
fn generate_guest_cart_id() -> GuestCartId {
    let id: String = rand::rng()
        .sample_iter(Alphanumeric)
        .take(GUEST_CART_ID_LENGTH)
        .map(char::from)
        .collect();
    GuestCartId::new(id)
}

//! Delivery cart backend.
//!
//! [`CartApi`] is the seam between the cart session and the network: one
//! method per backend endpoint. [`HttpCartApi`] implements it over
//! [`ApiClient`]; tests substitute an in-memory backend.
//!
//! | Operation | Method | Path |
//! |---|---|---|
//! | load (guest) | GET | `delivery/cart/{cartId}` |
//! | load (user) | GET | `delivery/cart/user/{userId}` |
//! | add / delta | POST | `delivery/cart/add` |
//! | remove item | DELETE | `delivery/cart/{key}/items/{itemId}` |
//! | clear | DELETE | `delivery/cart/{key}` |
//! | merge | POST | `delivery/cart/merge` |

mod cart;
mod http;

pub use cart::HttpCartApi;
pub use http::ApiClient;

use std::future::Future;

use bazaar_core::{CartItem, GuestCartId, ProductId, StoreId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// How a cart is addressed on the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CartKey {
    /// Guest cart, keyed by the locally generated identifier.
    Anonymous(GuestCartId),
    /// Signed-in user's cart.
    User(UserId),
}

impl CartKey {
    /// Path segments of the cart resource.
    #[must_use]
    pub fn segments(&self) -> Vec<&str> {
        match self {
            Self::Anonymous(cart_id) => vec!["delivery", "cart", cart_id.as_str()],
            Self::User(user_id) => vec!["delivery", "cart", "user", user_id.as_str()],
        }
    }

    /// Path segments of one item inside the cart.
    #[must_use]
    pub fn item_segments<'a>(&'a self, item_id: &'a ProductId) -> Vec<&'a str> {
        let mut segments = self.segments();
        segments.extend(["items", item_id.as_str()]);
        segments
    }
}

impl std::fmt::Display for CartKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anonymous(cart_id) => write!(f, "guest:{cart_id}"),
            Self::User(user_id) => write!(f, "user:{user_id}"),
        }
    }
}

/// Body of the add endpoint.
///
/// `quantity` is a signed delta: the server adds it to whatever the cart
/// already holds for `product_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    pub cart_id: GuestCartId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    pub product_id: ProductId,
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub quantity: i64,
    pub store_id: StoreId,
    pub image: Option<String>,
}

impl AddItemRequest {
    /// Build a request adding `quantity` of `item` to the cart.
    ///
    /// The item's own `quantity` is ignored.
    #[must_use]
    pub fn new(
        cart_id: GuestCartId,
        user_id: Option<UserId>,
        item: &CartItem,
        quantity: i64,
    ) -> Self {
        Self {
            cart_id,
            user_id,
            product_id: item.id.clone(),
            name: item.name.clone(),
            price: item.price,
            quantity,
            store_id: item.store_id.clone(),
            image: item.image.clone(),
        }
    }
}

/// Body of the merge endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRequest {
    pub items: Vec<CartItem>,
    pub store_id: Option<StoreId>,
}

/// Cart representation returned by reads and adds.
///
/// The backend answers either with an object carrying `items` or with the
/// bare item array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum CartPayload {
    Wrapped { items: Vec<CartItem> },
    Bare(Vec<CartItem>),
}

impl CartPayload {
    pub(crate) fn into_items(self) -> Vec<CartItem> {
        match self {
            Self::Wrapped { items } | Self::Bare(items) => items,
        }
    }
}

/// Backend operations the cart session relies on.
pub trait CartApi: Send + Sync {
    /// Fetch the cart stored under `key`.
    fn fetch_cart(
        &self,
        key: &CartKey,
    ) -> impl Future<Output = Result<Vec<CartItem>, ClientError>> + Send;

    /// Apply a quantity delta and return the resulting cart.
    fn add_item(
        &self,
        request: &AddItemRequest,
    ) -> impl Future<Output = Result<Vec<CartItem>, ClientError>> + Send;

    /// Delete one product from the cart under `key`.
    fn remove_item(
        &self,
        key: &CartKey,
        item_id: &ProductId,
    ) -> impl Future<Output = Result<(), ClientError>> + Send;

    /// Delete the whole cart under `key`.
    fn clear_cart(&self, key: &CartKey) -> impl Future<Output = Result<(), ClientError>> + Send;

    /// Merge a guest cart snapshot into the signed-in user's cart.
    ///
    /// `idempotency_key` identifies the merge attempt across retries.
    fn merge_cart(
        &self,
        request: &MergeRequest,
        idempotency_key: &str,
    ) -> impl Future<Output = Result<(), ClientError>> + Send;
}

//! HTTP implementation of the cart backend.

use bazaar_core::{CartItem, ProductId};
use tracing::instrument;

use super::{AddItemRequest, ApiClient, CartApi, CartKey, CartPayload, MergeRequest};
use crate::error::ClientError;

const ADD_PATH: [&str; 3] = ["delivery", "cart", "add"];
const MERGE_PATH: [&str; 3] = ["delivery", "cart", "merge"];

/// Cart backend reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpCartApi {
    client: ApiClient,
}

impl HttpCartApi {
    #[must_use]
    pub const fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// The underlying HTTP client.
    #[must_use]
    pub const fn client(&self) -> &ApiClient {
        &self.client
    }
}

impl CartApi for HttpCartApi {
    #[instrument(skip(self), fields(cart = %key))]
    async fn fetch_cart(&self, key: &CartKey) -> Result<Vec<CartItem>, ClientError> {
        let payload: CartPayload = self.client.get_json(&key.segments()).await?;
        Ok(payload.into_items())
    }

    #[instrument(skip(self, request), fields(product_id = %request.product_id, quantity = request.quantity))]
    async fn add_item(&self, request: &AddItemRequest) -> Result<Vec<CartItem>, ClientError> {
        let payload: CartPayload = self.client.post_json(&ADD_PATH, request).await?;
        Ok(payload.into_items())
    }

    #[instrument(skip(self), fields(cart = %key, item_id = %item_id))]
    async fn remove_item(&self, key: &CartKey, item_id: &ProductId) -> Result<(), ClientError> {
        self.client.delete(&key.item_segments(item_id)).await
    }

    #[instrument(skip(self), fields(cart = %key))]
    async fn clear_cart(&self, key: &CartKey) -> Result<(), ClientError> {
        self.client.delete(&key.segments()).await
    }

    #[instrument(skip(self, request), fields(items = request.items.len()))]
    async fn merge_cart(
        &self,
        request: &MergeRequest,
        idempotency_key: &str,
    ) -> Result<(), ClientError> {
        self.client
            .post_ignore_body(&MERGE_PATH, request, Some(idempotency_key))
            .await
    }
}

//! Persisted key/value storage on the device.
//!
//! The cart session keeps a handful of small string values across runs: the
//! guest cart ID, the guest cart snapshot awaiting merge, the signed-in user,
//! the selected address, and the offline queue. Structured values are stored
//! as JSON strings.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use std::future::Future;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Errors from local storage.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing the backing file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backing file or a stored value is not valid JSON.
    #[error("Corrupt storage: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Async string key/value store.
pub trait LocalStore: Send + Sync {
    /// Read a value.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, StorageError>> + Send;

    /// Write a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Delete a value. Deleting a missing key is not an error.
    fn remove(&self, key: &str) -> impl Future<Output = Result<(), StorageError>> + Send;
}

/// Read a JSON value stored under `key`.
///
/// # Errors
///
/// Returns an error if the store fails or the value does not parse as `T`.
pub async fn get_json<S, T>(store: &S, key: &str) -> Result<Option<T>, StorageError>
where
    S: LocalStore,
    T: DeserializeOwned,
{
    match store.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Store `value` as JSON under `key`.
///
/// # Errors
///
/// Returns an error if serialization or the store fails.
pub async fn set_json<S, T>(store: &S, key: &str, value: &T) -> Result<(), StorageError>
where
    S: LocalStore,
    T: Serialize + Sync + ?Sized,
{
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw).await
}

/// Storage keys.
pub mod keys {
    /// Anonymous cart identifier for guests.
    pub const GUEST_CART_ID: &str = "guestCartId";

    /// Guest cart item snapshot (JSON array) waiting to be merged.
    pub const GUEST_CART_SNAPSHOT: &str = "guestCart";

    /// Store ID belonging to the guest cart snapshot.
    pub const GUEST_CART_STORE_ID: &str = "guestCartStoreId";

    /// Idempotency token reused across attempts to merge the same snapshot.
    pub const GUEST_CART_MERGE_TOKEN: &str = "guestCartMergeToken";

    /// Signed-in user's ID, written by the identity flow.
    pub const USER_ID: &str = "userId";

    /// Bearer token issued by the identity provider.
    pub const AUTH_TOKEN: &str = "authToken";

    /// Last delivery address the user picked (JSON).
    pub const SELECTED_ADDRESS: &str = "selectedAddress";

    /// Requests waiting to be replayed (JSON array).
    pub const OFFLINE_QUEUE: &str = "offlineQueue";
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_json_helpers_round_trip_through_store() {
        let store = MemoryStore::new();
        set_json(&store, "numbers", &vec![1, 2, 3]).await.unwrap();

        let numbers: Option<Vec<i32>> = get_json(&store, "numbers").await.unwrap();
        assert_eq!(numbers, Some(vec![1, 2, 3]));

        let missing: Option<Vec<i32>> = get_json(&store, "missing").await.unwrap();
        assert_eq!(missing, None);
    }

    #[tokio::test]
    async fn test_get_json_reports_corrupt_value() {
        let store = MemoryStore::new();
        store.set("numbers", "not json").await.unwrap();

        let result: Result<Option<Vec<i32>>, _> = get_json(&store, "numbers").await;
        assert!(matches!(result, Err(StorageError::Corrupt(_))));
    }

    #[tokio::test]
    async fn test_out_of_range_address_is_corrupt() {
        let store = MemoryStore::new();
        store
            .set(
                keys::SELECTED_ADDRESS,
                r#"{"label":"Home","location":{"latitude":999.0,"longitude":0.0}}"#,
            )
            .await
            .unwrap();

        let result: Result<Option<bazaar_core::SelectedAddress>, _> =
            get_json(&store, keys::SELECTED_ADDRESS).await;
        assert!(matches!(result, Err(StorageError::Corrupt(_))));
    }
}

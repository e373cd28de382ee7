//! Bazaar client library.
//!
//! Client-side cart session for the delivery backend: a thin HTTP client,
//! the persisted guest cart identifier, guest-to-user cart merging, and the
//! offline request queue.
//!
//! # Example
//!
//! ```rust,ignore
//! use bazaar_client::{ApiClient, CartSession, ClientConfig, FileStore, HttpCartApi};
//!
//! let config = ClientConfig::from_env()?;
//! let api = HttpCartApi::new(ApiClient::new(&config.api)?);
//! let session = CartSession::new(api, FileStore::new(&config.storage_path));
//!
//! session.load(None).await;
//! if !session.add_to_cart(&item, 1).await {
//!     // Rejected, usually because the cart holds another store's items
//! }
//! println!("{} items", session.totals().total_quantity);
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod cart;
pub mod config;
pub mod error;
pub mod queue;
pub mod storage;

pub use api::{AddItemRequest, ApiClient, CartApi, CartKey, HttpCartApi, MergeRequest};
pub use cart::{CartSession, CartSnapshot, MergeOutcome};
pub use config::{ApiConfig, ClientConfig, ConfigError};
pub use error::ClientError;
pub use queue::{FlushReport, OfflineQueue, QueuedMethod, QueuedRequest, RequestSender};
pub use storage::{FileStore, LocalStore, MemoryStore, StorageError};

//! CLI command implementations.
//!
//! Every command runs against a [`Context`] built once from the loaded
//! configuration: the file-backed store, the HTTP client, the offline queue,
//! and a cart session over all of them.

pub mod address;
pub mod cart;
pub mod eta;
pub mod queue;
pub mod session;

use bazaar_client::storage::keys;
use bazaar_client::{
    ApiClient, CartSession, ClientConfig, ClientError, FileStore, HttpCartApi, LocalStore,
    OfflineQueue, StorageError,
};
use bazaar_core::{EtaModel, GeoError};
use secrecy::SecretString;
use thiserror::Error;

/// Errors surfaced to the user by a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The HTTP client could not be built.
    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    /// Local storage failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Coordinates out of range.
    #[error("Invalid coordinates: {0}")]
    Geo(#[from] GeoError),

    /// A required precondition was not met.
    #[error("{0}")]
    Precondition(&'static str),

    /// The server refused an operation.
    #[error("Rejected: {0}")]
    Rejected(String),
}

/// Shared state for one CLI invocation.
pub struct Context {
    pub store: FileStore,
    pub client: ApiClient,
    pub queue: OfflineQueue<FileStore>,
    pub session: CartSession<HttpCartApi, FileStore>,
    pub eta: EtaModel,
}

impl Context {
    /// Build the context from configuration.
    ///
    /// A token stored by `session login` takes precedence over the
    /// configured one.
    pub async fn new(config: &ClientConfig) -> Result<Self, CommandError> {
        let store = FileStore::new(&config.storage_path);
        tracing::debug!(path = %store.path().display(), "Using local storage");

        let mut api_config = config.api.clone();
        if let Some(token) = store.get(keys::AUTH_TOKEN).await? {
            api_config.token = Some(SecretString::from(token));
        }

        let client = ApiClient::new(&api_config)?;
        let queue = OfflineQueue::new(store.clone());
        let session = CartSession::new(HttpCartApi::new(client.clone()), store.clone())
            .with_offline_queue(queue.clone());

        Ok(Self {
            store,
            client,
            queue,
            session,
            eta: config.eta,
        })
    }
}

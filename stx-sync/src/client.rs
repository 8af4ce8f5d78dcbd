//! Module for handling all connections to the server

use std::{marker::PhantomData, sync::Arc};

use serde::de::DeserializeOwned;

use crate::{
    error::{SyncError, TransportError},
    ledger::{CollectionKey, Page, PageEnvelope},
};

pub mod fetch;

/// A response as seen by the sync engine. Status handling is left to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code
    pub status: u16,
    /// Reason phrase
    pub status_text: String,
    /// Raw body
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Returns true for any 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns the body as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decodes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, SyncError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Converts a non-2xx response into [`SyncError::HttpStatus`].
    pub fn error_for_status(self) -> Result<Self, SyncError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(SyncError::HttpStatus {
                status: self.status,
                status_text: self.status_text,
            })
        }
    }
}

/// Body of a POST request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// No body
    Empty,
    /// Raw bytes sent as `application/octet-stream`
    Octets(Vec<u8>),
    /// JSON document
    Json(serde_json::Value),
}

/// Sends requests to the ledger API. Paths are relative to the configured server and include their query.
///
/// Implemented over HTTP by [`crate::client::fetch::HttpTransport`]. Tests substitute scripted transports.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Sends a GET request.
    async fn get(&self, path: &str) -> Result<HttpResponse, TransportError>;

    /// Sends a POST request.
    async fn post(&self, path: &str, body: RequestBody) -> Result<HttpResponse, TransportError>;
}

/// Gets `path` and decodes the JSON body of a 2xx response.
pub async fn get_json<T: DeserializeOwned>(
    transport: &dyn Transport,
    path: &str,
) -> Result<T, SyncError> {
    transport.get(path).await?.error_for_status()?.json()
}

/// Source of collection pages.
#[async_trait::async_trait]
pub trait PageSource<T>: Send + Sync {
    /// Fetches `limit` items starting at `offset`.
    async fn fetch_page(&self, offset: u64, limit: u64) -> Result<Page<T>, SyncError>;
}

/// A collection served by the ledger API.
pub struct RemoteCollection<T> {
    transport: Arc<dyn Transport>,
    key: CollectionKey,
    _item: PhantomData<fn() -> T>,
}

impl<T> RemoteCollection<T> {
    /// Creates a page source for `key` over `transport`.
    pub fn new(transport: Arc<dyn Transport>, key: CollectionKey) -> Self {
        Self {
            transport,
            key,
            _item: PhantomData,
        }
    }

    /// Collection key
    pub fn key(&self) -> &CollectionKey {
        &self.key
    }
}

#[async_trait::async_trait]
impl<T> PageSource<T> for RemoteCollection<T>
where
    T: DeserializeOwned + Send + 'static,
{
    async fn fetch_page(&self, offset: u64, limit: u64) -> Result<Page<T>, SyncError> {
        let path = self.key.path(offset, limit);
        let envelope: PageEnvelope<T> = get_json(self.transport.as_ref(), &path).await?;
        tracing::debug!(
            "Fetched {} {} at offset {offset}.",
            envelope.results.len(),
            self.key
        );

        Ok(Page::from_envelope(envelope, offset, limit))
    }
}

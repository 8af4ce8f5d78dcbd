//! HTTP transport to the ledger API

use std::{
    sync::{Arc, RwLock},
    time::Duration,
};

use crate::{
    client::{HttpResponse, RequestBody, Transport},
    error::TransportError,
};

/// Seconds before a request is abandoned.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Sends requests to the server currently stored in the shared `api_server` uri.
///
/// The uri is shared with the client config so changing servers takes effect on the next request.
#[derive(Clone)]
pub struct HttpTransport {
    api_server: Arc<RwLock<http::Uri>>,
    client: reqwest::Client,
}

impl HttpTransport {
    /// Creates a transport with the default request timeout.
    pub fn new(api_server: Arc<RwLock<http::Uri>>) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(classify)?;

        Ok(Self::with_client(api_server, client))
    }

    /// Creates a transport from a preconfigured client.
    pub fn with_client(api_server: Arc<RwLock<http::Uri>>, client: reqwest::Client) -> Self {
        Self { api_server, client }
    }

    fn url(&self, path: &str) -> String {
        let api_server = self
            .api_server
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .to_string();

        format!("{}{path}", api_server.trim_end_matches('/'))
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn get(&self, path: &str) -> Result<HttpResponse, TransportError> {
        let url = self.url(path);
        tracing::debug!("Fetching {url}");
        let response = self.client.get(&url).send().await.map_err(classify)?;

        into_response(response).await
    }

    async fn post(&self, path: &str, body: RequestBody) -> Result<HttpResponse, TransportError> {
        let url = self.url(path);
        tracing::debug!("Posting to {url}");
        let request = self.client.post(&url);
        let request = match body {
            RequestBody::Empty => request,
            RequestBody::Octets(bytes) => request
                .header(http::header::CONTENT_TYPE, "application/octet-stream")
                .body(bytes),
            RequestBody::Json(value) => request.json(&value),
        };
        let response = request.send().await.map_err(classify)?;

        into_response(response).await
    }
}

async fn into_response(response: reqwest::Response) -> Result<HttpResponse, TransportError> {
    let status = response.status();
    let body = response.bytes().await.map_err(classify)?;

    Ok(HttpResponse {
        status: status.as_u16(),
        status_text: status.canonical_reason().unwrap_or_default().to_string(),
        body: body.to_vec(),
    })
}

fn classify(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout(error.to_string())
    } else {
        TransportError::Network(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_server_and_path() {
        let api_server = Arc::new(RwLock::new(http::Uri::from_static(
            "https://stacks-node-api.testnet.stacks.co",
        )));
        let transport = HttpTransport::with_client(api_server.clone(), reqwest::Client::new());
        assert_eq!(
            transport.url("/v2/info"),
            "https://stacks-node-api.testnet.stacks.co/v2/info"
        );

        *api_server.write().unwrap() = http::Uri::from_static("http://localhost:3999");
        assert_eq!(
            transport.url("/extended/v1/tx?limit=30&offset=0"),
            "http://localhost:3999/extended/v1/tx?limit=30&offset=0"
        );
    }
}

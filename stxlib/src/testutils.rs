//! Stx-Testutils
//! Scripted transport, signer and ledger fixtures for testing against a node that does not exist.

use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
    time::Duration,
};

use stx_status::tx_status::TxStatus;
use stx_sync::{
    client::{HttpResponse, RequestBody, Transport},
    error::TransportError,
    ledger::{ConfirmedTx, MempoolTx},
};

use crate::{
    error::BuildError,
    submit::{TransactionSigner, UnsignedTransaction},
};

/// A request seen by [`MockTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    /// `GET` or `POST`
    pub method: &'static str,
    /// Path including the query
    pub path: String,
    /// Body, [`RequestBody::Empty`] for GET requests
    pub body: RequestBody,
}

/// Transport answering from scripted responses.
///
/// Responses are queued per path and served in order. The last response of a path is repeated once the queue
/// runs dry. Unscripted paths answer `404 Not Found`.
#[derive(Debug, Default)]
pub struct MockTransport {
    responses: Mutex<HashMap<String, VecDeque<Result<HttpResponse, TransportError>>>>,
    requests: Mutex<Vec<RecordedRequest>>,
    latency: Mutex<Option<Duration>>,
}

impl MockTransport {
    /// Creates a transport without scripted responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `response` for `path`.
    pub fn respond(&self, path: &str, response: Result<HttpResponse, TransportError>) {
        self.responses
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(response);
    }

    /// Queues a `200 OK` response with a JSON body.
    pub fn respond_json(&self, path: &str, body: &str) {
        self.respond(path, Ok(response(200, "OK", body)));
    }

    /// Queues an empty response with a non-success status.
    pub fn respond_status(&self, path: &str, status: u16, status_text: &str) {
        self.respond(path, Ok(response(status, status_text, "")));
    }

    /// Queues a response with `status` and `body`.
    pub fn respond_body(&self, path: &str, status: u16, body: &str) {
        self.respond(path, Ok(response(status, "Bad Request", body)));
    }

    /// Queues a transport failure.
    pub fn fail(&self, path: &str, error: TransportError) {
        self.respond(path, Err(error));
    }

    /// Delays every response by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = Some(latency);
    }

    /// Requests seen so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of requests seen for `path`.
    pub fn request_count(&self, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.path == path)
            .count()
    }

    async fn answer(
        &self,
        method: &'static str,
        path: &str,
        body: RequestBody,
    ) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            method,
            path: path.to_string(),
            body,
        });
        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut responses = self.responses.lock().unwrap();
        match responses.get_mut(path) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if !queue.is_empty() => queue[0].clone(),
            _ => Ok(response(404, "Not Found", "")),
        }
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn get(&self, path: &str) -> Result<HttpResponse, TransportError> {
        self.answer("GET", path, RequestBody::Empty).await
    }

    async fn post(&self, path: &str, body: RequestBody) -> Result<HttpResponse, TransportError> {
        self.answer("POST", path, body).await
    }
}

fn response(status: u16, status_text: &str, body: &str) -> HttpResponse {
    HttpResponse {
        status,
        status_text: status_text.to_string(),
        body: body.as_bytes().to_vec(),
    }
}

/// Signer returning the JSON encoding of the transaction, recording every nonce it signs.
#[derive(Debug, Default)]
pub struct MockSigner {
    signed_nonces: Mutex<Vec<u64>>,
}

impl MockSigner {
    /// Creates a signer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Nonces signed so far, in order.
    pub fn signed_nonces(&self) -> Vec<u64> {
        self.signed_nonces.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl TransactionSigner for MockSigner {
    async fn sign(&self, transaction: &UnsignedTransaction) -> Result<Vec<u8>, BuildError> {
        self.signed_nonces.lock().unwrap().push(transaction.nonce);
        serde_json::to_vec(transaction).map_err(|e| BuildError::Signer(e.to_string()))
    }
}

/// A successful confirmed transaction in an anchor block.
pub fn confirmed_tx(tx_id: &str) -> ConfirmedTx {
    ConfirmedTx {
        tx_id: tx_id.to_string(),
        tx_type: "token_transfer".to_string(),
        tx_status: TxStatus::Success,
        sender_address: "ST2SENDER".to_string(),
        nonce: 0,
        fee_rate: "180".to_string(),
        block_height: 100,
        block_hash: "0xb100".to_string(),
        burn_block_time: 1_600_000_000,
        microblock_hash: None,
    }
}

/// A successful confirmed transaction streamed in a microblock.
pub fn microblock_tx(tx_id: &str) -> ConfirmedTx {
    ConfirmedTx {
        microblock_hash: Some("0xm100".to_string()),
        ..confirmed_tx(tx_id)
    }
}

/// A pending mempool transaction received at `receipt_time` seconds.
pub fn mempool_tx(tx_id: &str, receipt_time: u64) -> MempoolTx {
    MempoolTx {
        tx_id: tx_id.to_string(),
        tx_type: "contract_call".to_string(),
        tx_status: TxStatus::Pending,
        receipt_time,
        sender_address: "ST2SENDER".to_string(),
        nonce: 0,
        fee_rate: "180".to_string(),
    }
}

/// JSON envelope of a page holding `results`.
pub fn page_json<T: serde::Serialize>(results: &[T]) -> String {
    serde_json::json!({
        "limit": results.len(),
        "offset": 0,
        "total": results.len(),
        "results": results,
    })
    .to_string()
}

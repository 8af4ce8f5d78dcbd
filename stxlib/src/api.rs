//! Account, faucet, broadcast and status endpoints of the node and ledger API.

use std::collections::BTreeMap;

use serde::Deserialize;

use stx_sync::{
    client::{RequestBody, Transport, get_json},
    ledger::{CollectionKey, ConfirmedTx, MempoolTx, PageEnvelope, ResourceKind},
};

use crate::{
    account::AccountSnapshot,
    error::ClientError,
    submit::{BROADCAST_PATH, parse_broadcast_response},
    utils,
};

/// `GET /v2/accounts/{principal}` response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccountResponse {
    /// `0x` prefixed hex balance in micro-STX
    pub balance: String,
    /// Next nonce
    pub nonce: u64,
}

/// STX balance of an address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StxBalance {
    /// Balance in micro-STX, as a decimal string
    pub balance: String,
    /// Total sent
    #[serde(default)]
    pub total_sent: String,
    /// Total received
    #[serde(default)]
    pub total_received: String,
    /// Amount locked in stacking
    #[serde(default)]
    pub locked: String,
}

/// `GET /extended/v1/address/{principal}/balances` response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AddressBalances {
    /// STX balance
    pub stx: StxBalance,
    /// Fungible token balances by asset identifier
    #[serde(default)]
    pub fungible_tokens: BTreeMap<String, serde_json::Value>,
    /// Non-fungible token holdings by asset identifier
    #[serde(default)]
    pub non_fungible_tokens: BTreeMap<String, serde_json::Value>,
}

impl From<AddressBalances> for json::JsonValue {
    fn from(value: AddressBalances) -> Self {
        json::object! {
            "stx" => json::object! {
                "balance" => value.stx.balance,
                "total_sent" => value.stx.total_sent,
                "total_received" => value.stx.total_received,
                "locked" => value.stx.locked,
            },
            "fungible_tokens" => value.fungible_tokens.keys().cloned().collect::<Vec<String>>(),
            "non_fungible_tokens" => value.non_fungible_tokens.keys().cloned().collect::<Vec<String>>(),
        }
    }
}

/// Faucet grant.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FaucetResponse {
    /// Whether the faucet sent funds
    #[serde(default)]
    pub success: bool,
    /// Id of the faucet transaction
    #[serde(rename = "txId")]
    pub tx_id: String,
    /// Hex encoded faucet transaction
    #[serde(rename = "txRaw", default)]
    pub tx_raw: String,
}

/// `GET /extended/v1/status` response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiStatus {
    /// `ready` once the API serves requests
    pub status: String,
    /// Server version
    #[serde(default)]
    pub server_version: Option<String>,
}

impl ApiStatus {
    /// Returns true if the API reports itself ready.
    pub fn is_ready(&self) -> bool {
        self.status == "ready"
    }
}

/// Options of [`fetch_all_account_data`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountDataOptions {
    /// Principal
    pub principal: String,
    /// Number of confirmed transactions to fetch
    pub tx_limit: u64,
    /// Skips the confirmed transactions fetch
    pub skip_transactions: bool,
}

/// Balances, confirmed transactions and mempool entries of one principal.
#[derive(Debug, Clone, PartialEq)]
pub struct AllAccountData {
    /// Balances
    pub balances: AddressBalances,
    /// Confirmed transactions, newest first. `None` if skipped.
    pub transactions: Option<Vec<ConfirmedTx>>,
    /// Mempool entries
    pub mempool: Vec<MempoolTx>,
}

/// Fetches the confirmed balance and nonce of `principal`.
pub async fn get_account(
    transport: &dyn Transport,
    principal: &str,
) -> Result<AccountSnapshot, ClientError> {
    let account: AccountResponse = get_json(transport, &format!("/v2/accounts/{principal}")).await?;
    let balance = utils::parse_hex_balance(&account.balance).ok_or_else(|| {
        ClientError::Network(format!("invalid account balance '{}'", account.balance))
    })?;

    Ok(AccountSnapshot {
        balance,
        nonce: account.nonce,
    })
}

/// Fetches the balances of `principal`.
pub async fn get_balances(
    transport: &dyn Transport,
    principal: &str,
) -> Result<AddressBalances, ClientError> {
    Ok(get_json(
        transport,
        &format!("/extended/v1/address/{principal}/balances"),
    )
    .await?)
}

/// Fetches the newest `limit` confirmed transactions of `principal`.
pub async fn get_address_transactions(
    transport: &dyn Transport,
    principal: &str,
    limit: u64,
) -> Result<Vec<ConfirmedTx>, ClientError> {
    let path = CollectionKey::new(ResourceKind::Transaction)
        .with_principal(principal)
        .path(0, limit);
    let envelope: PageEnvelope<ConfirmedTx> = get_json(transport, &path).await?;

    Ok(envelope.results)
}

/// Fetches up to `limit` mempool entries, of `principal` if given.
pub async fn get_mempool(
    transport: &dyn Transport,
    principal: Option<&str>,
    limit: u64,
) -> Result<Vec<MempoolTx>, ClientError> {
    let mut key = CollectionKey::new(ResourceKind::MempoolTransaction);
    if let Some(principal) = principal {
        key = key.with_principal(principal);
    }
    let envelope: PageEnvelope<MempoolTx> = get_json(transport, &key.path(0, limit)).await?;

    Ok(envelope.results)
}

/// Fetches balances, confirmed transactions and mempool entries concurrently. Fails with the first error.
pub async fn fetch_all_account_data(
    transport: &dyn Transport,
    options: &AccountDataOptions,
) -> Result<AllAccountData, ClientError> {
    let principal = options.principal.as_str();
    let transactions = async {
        if options.skip_transactions {
            Ok(None)
        } else {
            get_address_transactions(transport, principal, options.tx_limit)
                .await
                .map(Some)
        }
    };
    let (balances, transactions, mempool) = tokio::try_join!(
        get_balances(transport, principal),
        transactions,
        get_mempool(transport, Some(principal), options.tx_limit),
    )?;

    Ok(AllAccountData {
        balances,
        transactions,
        mempool,
    })
}

/// Asks the test network faucet to fund `principal`.
pub async fn request_faucet(
    transport: &dyn Transport,
    principal: &str,
) -> Result<FaucetResponse, ClientError> {
    let response = transport
        .post(
            &format!("/extended/v1/debug/faucet?address={principal}"),
            RequestBody::Empty,
        )
        .await?;
    if !response.is_success() {
        return Err(ClientError::HttpStatus {
            status: response.status,
            status_text: response.status_text,
        });
    }
    let mut faucet: FaucetResponse = response.json()?;
    faucet.tx_id = utils::prefix_tx_id(&faucet.tx_id);

    Ok(faucet)
}

/// Posts signed transaction bytes to the node. Returns the `0x` prefixed transaction id.
pub async fn broadcast_transaction(
    transport: &dyn Transport,
    transaction: Vec<u8>,
) -> Result<String, ClientError> {
    let response = transport
        .post(BROADCAST_PATH, RequestBody::Octets(transaction))
        .await?;

    parse_broadcast_response(response)
}

/// Fetches the API status.
pub async fn get_status(transport: &dyn Transport) -> Result<ApiStatus, ClientError> {
    Ok(get_json(transport, "/extended/v1/status").await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::MockTransport;

    const PRINCIPAL: &str = "ST2SENDER";

    #[tokio::test]
    async fn account_balance_is_hex() {
        let transport = MockTransport::new();
        transport.respond_json(
            "/v2/accounts/ST2SENDER",
            r#"{"balance": "0x0000000000000000000000003b9aca00", "nonce": 5}"#,
        );
        assert_eq!(
            get_account(&transport, PRINCIPAL).await,
            Ok(AccountSnapshot {
                balance: 1_000_000_000,
                nonce: 5
            })
        );
    }

    #[tokio::test]
    async fn account_status_error() {
        let transport = MockTransport::new();
        transport.respond_status("/v2/accounts/ST2SENDER", 429, "Too Many Requests");
        let error = get_account(&transport, PRINCIPAL).await.unwrap_err();
        assert_eq!(error.name(), "Status 429");
    }

    #[tokio::test]
    async fn all_account_data_can_skip_transactions() {
        let transport = MockTransport::new();
        transport.respond_json(
            "/extended/v1/address/ST2SENDER/balances",
            r#"{"stx": {"balance": "100"}, "fungible_tokens": {}, "non_fungible_tokens": {}}"#,
        );
        transport.respond_json(
            "/extended/v1/tx/mempool?address=ST2SENDER&limit=50&offset=0",
            r#"{"results": [{"tx_id": "0x01", "tx_type": "token_transfer", "receipt_time": 1}]}"#,
        );
        let data = fetch_all_account_data(
            &transport,
            &AccountDataOptions {
                principal: PRINCIPAL.to_string(),
                tx_limit: 50,
                skip_transactions: true,
            },
        )
        .await
        .unwrap();
        assert_eq!(data.balances.stx.balance, "100");
        assert_eq!(data.transactions, None);
        assert_eq!(data.mempool.len(), 1);
        assert!(
            !transport
                .requests()
                .iter()
                .any(|request| request.path.contains("/transactions"))
        );
    }

    #[tokio::test]
    async fn faucet_posts_address() {
        let transport = MockTransport::new();
        transport.respond_json(
            "/extended/v1/debug/faucet?address=ST2SENDER",
            r#"{"success": true, "txId": "abc", "txRaw": "8080"}"#,
        );
        let faucet = request_faucet(&transport, PRINCIPAL).await.unwrap();
        assert_eq!(faucet.tx_id, "0xabc");
        assert!(faucet.success);
        assert_eq!(transport.requests()[0].method, "POST");
    }

    #[tokio::test]
    async fn broadcast_sends_octets() {
        let transport = MockTransport::new();
        transport.respond_json(BROADCAST_PATH, "\"d1e4\"");
        assert_eq!(
            broadcast_transaction(&transport, vec![0x80, 0x80]).await,
            Ok("0xd1e4".to_string())
        );
        assert_eq!(
            transport.requests()[0].body,
            RequestBody::Octets(vec![0x80, 0x80])
        );
    }

    #[tokio::test]
    async fn status_reports_ready() {
        let transport = MockTransport::new();
        transport.respond_json(
            "/extended/v1/status",
            r#"{"status": "ready", "server_version": "stacks-blockchain-api v0.1"}"#,
        );
        assert!(get_status(&transport).await.unwrap().is_ready());
    }
}

//! Ledger records and collection keys.
//!
//! Field names follow the JSON returned by the extended ledger API so records deserialize without renaming.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use stx_status::tx_status::{Anchoring, TxStatus};

/// One fetched page of a paginated collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items in server order.
    pub items: Vec<T>,
    /// Offset the page was requested at.
    pub offset: u64,
    /// Limit the page was requested with. Termination is decided against this value.
    pub limit: u64,
    /// Total number of items reported by the server, if any.
    pub total: Option<u64>,
}

impl<T> Page<T> {
    /// Creates a page from the server envelope and the request parameters.
    ///
    /// The requested limit is kept rather than the echoed one, the server may clamp its echo.
    pub fn from_envelope(envelope: PageEnvelope<T>, offset: u64, limit: u64) -> Self {
        Self {
            items: envelope.results,
            offset,
            limit,
            total: envelope.total,
        }
    }

    /// Returns the number of items in the page.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the page holds no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// JSON envelope of every paginated endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PageEnvelope<T> {
    /// Echoed limit
    #[serde(default)]
    pub limit: Option<u64>,
    /// Echoed offset
    #[serde(default)]
    pub offset: Option<u64>,
    /// Total number of items
    #[serde(default)]
    pub total: Option<u64>,
    /// Items
    pub results: Vec<T>,
}

/// Kind of resource a collection streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    /// Anchor blocks, newest first.
    Block,
    /// Confirmed transactions, newest first.
    Transaction,
    /// Mempool transactions.
    MempoolTransaction,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Block => write!(f, "blocks"),
            Self::Transaction => write!(f, "transactions"),
            Self::MempoolTransaction => write!(f, "mempool"),
        }
    }
}

/// Identifies one paginated stream. Two keys that compare equal address the same server resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionKey {
    /// Kind of resource.
    pub resource_kind: ResourceKind,
    /// Restricts transactions to those involving this principal. Ignored for blocks.
    pub principal: Option<String>,
    /// Restricts transactions to these transaction types. Empty means all types.
    pub type_filters: BTreeSet<String>,
}

impl CollectionKey {
    /// Creates an unfiltered key for `resource_kind`.
    pub fn new(resource_kind: ResourceKind) -> Self {
        Self {
            resource_kind,
            principal: None,
            type_filters: BTreeSet::new(),
        }
    }

    /// Restricts the key to `principal`.
    pub fn with_principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(principal.into());
        self
    }

    /// Restricts the key to the given transaction types.
    pub fn with_type_filters<I, S>(mut self, type_filters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.type_filters = type_filters.into_iter().map(Into::into).collect();
        self
    }

    /// Returns the request path, including the query, for the page at `offset`.
    ///
    /// # Examples
    ///
    /// ```
    /// use stx_sync::ledger::{CollectionKey, ResourceKind};
    ///
    /// let key = CollectionKey::new(ResourceKind::Transaction).with_type_filters(["token_transfer"]);
    /// assert_eq!(
    ///     key.path(31, 30),
    ///     "/extended/v1/tx?limit=30&offset=31&type%5B%5D=token_transfer"
    /// );
    /// ```
    pub fn path(&self, offset: u64, limit: u64) -> String {
        let (base, mut query) = match (self.resource_kind, self.principal.as_deref()) {
            (ResourceKind::Block, _) => ("/extended/v1/block".to_string(), Vec::new()),
            (ResourceKind::Transaction, None) => ("/extended/v1/tx".to_string(), Vec::new()),
            (ResourceKind::Transaction, Some(principal)) => (
                format!("/extended/v1/address/{principal}/transactions"),
                Vec::new(),
            ),
            (ResourceKind::MempoolTransaction, None) => {
                ("/extended/v1/tx/mempool".to_string(), Vec::new())
            }
            (ResourceKind::MempoolTransaction, Some(principal)) => (
                "/extended/v1/tx/mempool".to_string(),
                vec![format!("address={principal}")],
            ),
        };
        query.push(format!("limit={limit}"));
        query.push(format!("offset={offset}"));
        if self.resource_kind != ResourceKind::Block {
            query.extend(
                self.type_filters
                    .iter()
                    .map(|tx_type| format!("type%5B%5D={tx_type}")),
            );
        }

        format!("{base}?{}", query.join("&"))
    }
}

impl std::fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.resource_kind)?;
        if let Some(principal) = &self.principal {
            write!(f, " of {principal}")?;
        }
        if !self.type_filters.is_empty() {
            let types: Vec<&str> = self.type_filters.iter().map(String::as_str).collect();
            write!(f, " [{}]", types.join(", "))?;
        }
        Ok(())
    }
}

/// A transaction that was included in a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedTx {
    /// Transaction id
    pub tx_id: String,
    /// Transaction type, for example `token_transfer` or `contract_call`
    pub tx_type: String,
    /// Status
    pub tx_status: TxStatus,
    /// Sender principal
    #[serde(default)]
    pub sender_address: String,
    /// Sender nonce
    #[serde(default)]
    pub nonce: u64,
    /// Fee in micro-STX, as a decimal string
    #[serde(default)]
    pub fee_rate: String,
    /// Height of the anchor block
    #[serde(default)]
    pub block_height: u64,
    /// Hash of the anchor block
    #[serde(default)]
    pub block_hash: String,
    /// Burn chain time of the anchor block in seconds
    #[serde(default)]
    pub burn_block_time: u64,
    /// Hash of the microblock the transaction was streamed in. Empty or absent for anchor block transactions.
    #[serde(default)]
    pub microblock_hash: Option<String>,
}

impl ConfirmedTx {
    /// Returns whether the transaction was confirmed in a microblock or an anchor block.
    pub fn anchoring(&self) -> Anchoring {
        Anchoring::from_microblock_hash(self.microblock_hash.as_deref())
    }
}

/// A transaction known to the mempool, or inserted locally after broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MempoolTx {
    /// Transaction id
    pub tx_id: String,
    /// Transaction type
    pub tx_type: String,
    /// Status, `pending` unless dropped
    #[serde(default = "pending")]
    pub tx_status: TxStatus,
    /// Time the node received the transaction in seconds since the unix epoch
    pub receipt_time: u64,
    /// Sender principal
    #[serde(default)]
    pub sender_address: String,
    /// Sender nonce
    #[serde(default)]
    pub nonce: u64,
    /// Fee in micro-STX, as a decimal string
    #[serde(default)]
    pub fee_rate: String,
}

fn pending() -> TxStatus {
    TxStatus::Pending
}

/// A reconciled timeline entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TxRecord {
    /// Confirmed record
    Confirmed(ConfirmedTx),
    /// Pending record
    Mempool(MempoolTx),
}

impl TxRecord {
    /// Transaction id
    pub fn tx_id(&self) -> &str {
        match self {
            Self::Confirmed(tx) => &tx.tx_id,
            Self::Mempool(tx) => &tx.tx_id,
        }
    }

    /// Transaction type
    pub fn tx_type(&self) -> &str {
        match self {
            Self::Confirmed(tx) => &tx.tx_type,
            Self::Mempool(tx) => &tx.tx_type,
        }
    }

    /// Transaction status
    pub fn tx_status(&self) -> TxStatus {
        match self {
            Self::Confirmed(tx) => tx.tx_status,
            Self::Mempool(tx) => tx.tx_status,
        }
    }

    /// Sender nonce
    pub fn nonce(&self) -> u64 {
        match self {
            Self::Confirmed(tx) => tx.nonce,
            Self::Mempool(tx) => tx.nonce,
        }
    }

    /// Classifies the record. Mempool records are always pending.
    pub fn anchoring(&self) -> Anchoring {
        match self {
            Self::Confirmed(tx) => tx.anchoring(),
            Self::Mempool(_) => Anchoring::Pending,
        }
    }
}

/// An anchor block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Height
    pub height: u64,
    /// Block hash
    pub hash: String,
    /// Burn chain time in seconds
    #[serde(default)]
    pub burn_block_time: u64,
    /// False if the block was orphaned
    #[serde(default = "canonical")]
    pub canonical: bool,
    /// Hashes of the microblocks confirmed by this block
    #[serde(default)]
    pub microblocks_accepted: Vec<String>,
    /// Ids of the transactions in this block
    #[serde(default)]
    pub txs: Vec<String>,
}

fn canonical() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_paths() {
        assert_eq!(
            CollectionKey::new(ResourceKind::Block).path(0, 30),
            "/extended/v1/block?limit=30&offset=0"
        );
        assert_eq!(
            CollectionKey::new(ResourceKind::Transaction)
                .with_principal("ST1ABC")
                .path(0, 50),
            "/extended/v1/address/ST1ABC/transactions?limit=50&offset=0"
        );
        assert_eq!(
            CollectionKey::new(ResourceKind::MempoolTransaction)
                .with_principal("ST1ABC")
                .path(0, 30),
            "/extended/v1/tx/mempool?address=ST1ABC&limit=30&offset=0"
        );
        assert_eq!(
            CollectionKey::new(ResourceKind::Transaction)
                .with_type_filters(["smart_contract", "contract_call"])
                .path(61, 30),
            "/extended/v1/tx?limit=30&offset=61&type%5B%5D=contract_call&type%5B%5D=smart_contract"
        );
    }

    #[test]
    fn equal_keys_for_equal_filters() {
        let a = CollectionKey::new(ResourceKind::Transaction).with_type_filters(["a", "b"]);
        let b = CollectionKey::new(ResourceKind::Transaction).with_type_filters(["b", "a"]);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "transactions [a, b]");
    }

    #[test]
    fn decodes_api_records() {
        let envelope: PageEnvelope<ConfirmedTx> = serde_json::from_str(
            r#"{
                "limit": 30, "offset": 0, "total": 2,
                "results": [
                    {"tx_id": "0x01", "tx_type": "token_transfer", "tx_status": "success",
                     "nonce": 4, "fee_rate": "180", "block_height": 10, "microblock_hash": "0xaa"},
                    {"tx_id": "0x02", "tx_type": "coinbase", "tx_status": "success",
                     "block_height": 10, "microblock_hash": ""}
                ]
            }"#,
        )
        .unwrap();
        let page = Page::from_envelope(envelope, 0, 30);
        assert_eq!(page.len(), 2);
        assert_eq!(page.total, Some(2));
        assert_eq!(page.items[0].anchoring(), Anchoring::Microblock);
        assert_eq!(page.items[1].anchoring(), Anchoring::AnchorBlock);

        let mempool: MempoolTx = serde_json::from_str(
            r#"{"tx_id": "0x03", "tx_type": "contract_call", "receipt_time": 1600000000}"#,
        )
        .unwrap();
        assert_eq!(mempool.tx_status, TxStatus::Pending);
        assert_eq!(TxRecord::Mempool(mempool).anchoring(), Anchoring::Pending);
    }
}

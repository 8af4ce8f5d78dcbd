//! Per-principal account state with the optimistic local nonce.

use stx_sync::ledger::{ConfirmedTx, MempoolTx};

use crate::error::ClientError;

pub mod disk;

/// Load state of an account. `Ready` and `Error` both move back to `Loading` on the next fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoadState {
    /// Never fetched
    #[default]
    Uninitialized,
    /// Fetch in flight
    Loading,
    /// Last fetch succeeded
    Ready,
    /// Last fetch failed
    Error,
}

impl std::fmt::Display for LoadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Loading => write!(f, "loading"),
            Self::Ready => write!(f, "ready"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Confirmed balance and nonce as reported by the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountSnapshot {
    /// Balance in micro-STX
    pub balance: u128,
    /// Next nonce expected by the node
    pub nonce: u64,
}

/// Account state of one principal.
///
/// `local_nonce` is an overlay ahead of the chain: it is never lower than `confirmed_nonce` once an account fetch
/// succeeded and it never decreases except through [`Self::reset_local_nonce`].
#[derive(Debug, Clone, PartialEq)]
pub struct AccountLedgerState {
    principal: String,
    load_state: LoadState,
    confirmed_balance: Option<u128>,
    confirmed_nonce: Option<u64>,
    local_nonce: u64,
    last_fetch_timestamp: Option<u64>,
    last_error: Option<ClientError>,
    pending_transactions: Vec<MempoolTx>,
}

impl AccountLedgerState {
    /// Creates the uninitialized state of `principal`.
    pub fn new(principal: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            load_state: LoadState::Uninitialized,
            confirmed_balance: None,
            confirmed_nonce: None,
            local_nonce: 0,
            last_fetch_timestamp: None,
            last_error: None,
            pending_transactions: Vec::new(),
        }
    }

    /// Principal
    pub fn principal(&self) -> &str {
        &self.principal
    }

    /// Load state
    pub fn load_state(&self) -> LoadState {
        self.load_state
    }

    /// Last confirmed balance in micro-STX.
    pub fn confirmed_balance(&self) -> Option<u128> {
        self.confirmed_balance
    }

    /// Last confirmed nonce.
    pub fn confirmed_nonce(&self) -> Option<u64> {
        self.confirmed_nonce
    }

    /// Nonce the next built transaction uses.
    pub fn local_nonce(&self) -> u64 {
        self.local_nonce
    }

    /// Time of the last successful fetch in milliseconds since the unix epoch.
    pub fn last_fetch_timestamp(&self) -> Option<u64> {
        self.last_fetch_timestamp
    }

    /// Error of the last failed operation, if not cleared.
    pub fn last_error(&self) -> Option<&ClientError> {
        self.last_error.as_ref()
    }

    /// Transactions inserted locally after a faucet grant or broadcast, not yet seen confirmed.
    pub fn pending_transactions(&self) -> &[MempoolTx] {
        &self.pending_transactions
    }

    /// Marks a fetch as started.
    pub fn begin_fetch(&mut self) {
        self.load_state = LoadState::Loading;
    }

    /// Applies a successful account fetch.
    ///
    /// Raises the local nonce to the confirmed nonce if the chain moved past it.
    pub fn apply_account(&mut self, snapshot: AccountSnapshot, fetched_at_ms: u64) {
        self.confirmed_balance = Some(snapshot.balance);
        self.confirmed_nonce = Some(snapshot.nonce);
        self.local_nonce = self.local_nonce.max(snapshot.nonce);
        self.last_fetch_timestamp = Some(fetched_at_ms);
        self.last_error = None;
        self.load_state = LoadState::Ready;
    }

    /// Applies a failed account fetch. Confirmed fields keep their last known values.
    pub fn apply_fetch_error(&mut self, error: ClientError) {
        self.last_error = Some(error);
        self.load_state = LoadState::Error;
    }

    /// Sets the local nonce to `max(local_nonce, nonce)`.
    pub fn increment_local_nonce(&mut self, nonce: u64) {
        self.local_nonce = self.local_nonce.max(nonce);
    }

    /// Discards the optimistic overlay, falling back to the confirmed nonce or 0 if it is unknown.
    pub fn reset_local_nonce(&mut self) {
        self.local_nonce = self.confirmed_nonce.unwrap_or(0);
    }

    /// Records an error that did not come from an account fetch. The load state is left unchanged.
    pub fn set_error(&mut self, error: ClientError) {
        self.last_error = Some(error);
    }

    /// Clears the last error without touching any other field.
    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// Inserts a locally known pending transaction, newest first. A transaction already present is replaced.
    pub fn add_pending_transaction(&mut self, transaction: MempoolTx) {
        self.pending_transactions
            .retain(|pending| pending.tx_id != transaction.tx_id);
        self.pending_transactions.insert(0, transaction);
    }

    /// Drops pending transactions that appear in `confirmed`. Returns the number dropped.
    pub fn absorb_confirmed(&mut self, confirmed: &[ConfirmedTx]) -> usize {
        let before = self.pending_transactions.len();
        self.pending_transactions
            .retain(|pending| !confirmed.iter().any(|tx| tx.tx_id == pending.tx_id));

        before - self.pending_transactions.len()
    }
}

impl From<AccountLedgerState> for json::JsonValue {
    fn from(value: AccountLedgerState) -> Self {
        json::object! {
            "principal" => value.principal,
            "state" => value.load_state.to_string(),
            "balance" => value.confirmed_balance.map(|balance| balance.to_string()),
            "nonce" => value.confirmed_nonce,
            "local_nonce" => value.local_nonce,
            "last_fetch" => value.last_fetch_timestamp,
            "error" => value.last_error.map(json::JsonValue::from),
            "pending" => value
                .pending_transactions
                .iter()
                .map(|tx| json::object! {
                    "txid" => tx.tx_id.clone(),
                    "type" => tx.tx_type.clone(),
                    "receipt_time" => tx.receipt_time,
                })
                .collect::<Vec<json::JsonValue>>(),
        }
    }
}

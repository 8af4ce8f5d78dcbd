//! Reconciles mempool and confirmed transactions into one timeline.
//!
//! Steps, in order:
//! 1. drop stale mempool entries
//! 2. de-duplicate by transaction id, confirmed entries win
//! 3. apply the caller's limit with pending entries first
//! 4. select a view and apply the secondary filters
//!
//! Filtering never alters the de-duplicated set so relaxing a filter restores the hidden entries.

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    hash::Hash,
};

use stx_status::tx_status::Anchoring;

use crate::{
    config::PENDING_WINDOW_MS,
    ledger::{Block, ConfirmedTx, MempoolTx, TxRecord},
};

/// Secondary timeline filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxFilters {
    /// Show mempool entries.
    pub show_pending: bool,
    /// Show confirmed entries whose status is not `success`.
    pub show_failed: bool,
    /// Only show these transaction types. `None` shows all types.
    pub types: Option<BTreeSet<String>>,
}

impl Default for TxFilters {
    fn default() -> Self {
        Self {
            show_pending: true,
            show_failed: true,
            types: None,
        }
    }
}

impl TxFilters {
    fn allows(&self, record: &TxRecord) -> bool {
        if !self.show_pending && matches!(record, TxRecord::Mempool(_)) {
            return false;
        }
        if !self.show_failed
            && matches!(record, TxRecord::Confirmed(tx) if !tx.tx_status.is_success())
        {
            return false;
        }
        self.types
            .as_ref()
            .is_none_or(|types| types.contains(record.tx_type()))
    }
}

/// Reconciliation parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Current time in milliseconds since the unix epoch.
    pub now_ms: u64,
    /// Freshness window in milliseconds, inclusive.
    pub pending_window_ms: u64,
    /// Maximum number of entries before filtering. Pending entries fill the first slots.
    pub limit: Option<usize>,
    /// Restricts the timeline to one classification. `None` shows every classification.
    pub view: Option<Anchoring>,
    /// Secondary filters.
    pub filters: TxFilters,
}

impl ReconcileOptions {
    /// Creates options with the default freshness window and no limit, view or filters.
    pub fn new(now_ms: u64) -> Self {
        Self {
            now_ms,
            pending_window_ms: PENDING_WINDOW_MS,
            limit: None,
            view: None,
            filters: TxFilters::default(),
        }
    }
}

/// Why a timeline holds no entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyReason {
    /// Confirmed transactions have not been fetched yet.
    Loading,
    /// Neither source holds any displayable transaction.
    NoTransactions,
    /// Transactions exist but the view or filters hide all of them.
    AllFilteredOut,
}

impl std::fmt::Display for EmptyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Loading => write!(f, "loading"),
            Self::NoTransactions => write!(f, "no transactions yet"),
            Self::AllFilteredOut => write!(f, "all transactions are filtered out"),
        }
    }
}

/// A reconciled timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeline {
    /// Visible entries, pending first then confirmed in server order.
    pub items: Vec<TxRecord>,
    /// Number of fresh pending entries not yet confirmed, before the limit and filters.
    pub pending_count: usize,
    /// Number of mempool entries dropped as stale.
    pub stale_count: usize,
    /// Set when `items` is empty.
    pub empty_reason: Option<EmptyReason>,
}

/// Returns true if `tx` was received no more than `window_ms` before `now_ms`.
///
/// Receipt times in the future count as fresh.
pub fn is_fresh(tx: &MempoolTx, now_ms: u64, window_ms: u64) -> bool {
    now_ms.saturating_sub(tx.receipt_time.saturating_mul(1000)) <= window_ms
}

/// Splits mempool entries into fresh and stale entries, preserving order.
pub fn partition_fresh(
    mempool: &[MempoolTx],
    now_ms: u64,
    window_ms: u64,
) -> (Vec<MempoolTx>, Vec<MempoolTx>) {
    mempool
        .iter()
        .cloned()
        .partition(|tx| is_fresh(tx, now_ms, window_ms))
}

/// Removes repeated keys. Each key keeps the position of its first occurrence and the value of its last.
pub fn dedup_by_key<T, K, F>(items: impl IntoIterator<Item = T>, key: F) -> Vec<T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut positions: HashMap<K, usize> = HashMap::new();
    let mut deduped: Vec<T> = Vec::new();
    for item in items {
        let item_key = key(&item);
        match positions.get(&item_key).copied() {
            Some(position) => deduped[position] = item,
            None => {
                positions.insert(item_key, deduped.len());
                deduped.push(item);
            }
        }
    }

    deduped
}

/// Reconciles `mempool` and `confirmed` into one timeline.
///
/// `confirmed` is `None` until the first confirmed page arrives, an empty result then reports
/// [`EmptyReason::Loading`].
pub fn reconcile(
    confirmed: Option<&[ConfirmedTx]>,
    mempool: &[MempoolTx],
    options: &ReconcileOptions,
) -> Timeline {
    let (fresh, stale) = partition_fresh(mempool, options.now_ms, options.pending_window_ms);
    if !stale.is_empty() {
        tracing::debug!("Dropped {} stale mempool transactions.", stale.len());
    }

    let loaded = confirmed.is_some();
    let confirmed = dedup_by_key(
        confirmed.unwrap_or_default().iter().cloned(),
        |tx: &ConfirmedTx| tx.tx_id.clone(),
    );
    let confirmed_ids: HashSet<&str> = confirmed.iter().map(|tx| tx.tx_id.as_str()).collect();
    let pending: Vec<MempoolTx> = dedup_by_key(fresh, |tx: &MempoolTx| tx.tx_id.clone())
        .into_iter()
        .filter(|tx| !confirmed_ids.contains(tx.tx_id.as_str()))
        .collect();
    let pending_count = pending.len();

    let (pending_slots, confirmed_slots) = match options.limit {
        Some(limit) => {
            let pending_slots = pending_count.min(limit);
            (pending_slots, limit - pending_slots)
        }
        None => (pending_count, confirmed.len()),
    };
    let merged: Vec<TxRecord> = pending
        .into_iter()
        .take(pending_slots)
        .map(TxRecord::Mempool)
        .chain(
            confirmed
                .iter()
                .take(confirmed_slots)
                .cloned()
                .map(TxRecord::Confirmed),
        )
        .collect();

    let items: Vec<TxRecord> = merged
        .iter()
        .filter(|record| options.view.is_none_or(|view| record.anchoring() == view))
        .filter(|record| options.filters.allows(record))
        .cloned()
        .collect();

    let empty_reason = if !items.is_empty() {
        None
    } else if !loaded && pending_count == 0 {
        Some(EmptyReason::Loading)
    } else if pending_count == 0 && confirmed.is_empty() {
        Some(EmptyReason::NoTransactions)
    } else {
        Some(EmptyReason::AllFilteredOut)
    };

    Timeline {
        items,
        pending_count,
        stale_count: stale.len(),
        empty_reason,
    }
}

/// One entry of the block feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockFeedEntry {
    /// An anchor block.
    Anchor(Block),
    /// A microblock confirmed by the preceding anchor block.
    Microblock {
        /// Microblock hash
        hash: String,
        /// Height of the confirming anchor block
        anchor_height: u64,
        /// Burn chain time of the confirming anchor block in seconds
        burn_block_time: u64,
    },
}

/// Expands anchor blocks into a feed where each block is followed by the microblocks it confirmed.
///
/// Blocks repeated across pages appear once. A `limit` restricts the number of anchor blocks.
pub fn block_feed(blocks: &[Block], limit: Option<usize>) -> Vec<BlockFeedEntry> {
    dedup_by_key(blocks.iter().cloned(), |block: &Block| block.hash.clone())
        .into_iter()
        .take(limit.unwrap_or(usize::MAX))
        .flat_map(|block| {
            let microblocks = block
                .microblocks_accepted
                .iter()
                .map(|hash| BlockFeedEntry::Microblock {
                    hash: hash.clone(),
                    anchor_height: block.height,
                    burn_block_time: block.burn_block_time,
                })
                .collect::<Vec<_>>();
            std::iter::once(BlockFeedEntry::Anchor(block)).chain(microblocks)
        })
        .collect()
}

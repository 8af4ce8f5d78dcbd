//! If a transaction is anchored, it is:
//!  Microblock === confirmed in a microblock streamed between anchor blocks
//!  AnchorBlock === confirmed directly in an anchor block

use serde::{Deserialize, Serialize};

/// Status string reported by the API for a transaction. Every transaction record includes exactly one of these
/// variants.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    /// The transaction was included in a block and executed successfully.
    Success,
    /// The transaction is known to be in the mempool.
    Pending,
    /// The transaction was included but the contract call returned an error response.
    AbortByResponse,
    /// The transaction was included but a post condition failed.
    AbortByPostCondition,
    /// The transaction was dropped from the mempool in favour of a higher fee replacement.
    DroppedReplaceByFee,
    /// The transaction was dropped because it was replaced on another fork.
    DroppedReplaceAcrossFork,
    /// The transaction was dropped because it was too expensive to include.
    DroppedTooExpensive,
    /// The transaction was dropped after sitting in the mempool for too long.
    DroppedStaleGarbageCollect,
    /// Any status this client does not know about.
    #[default]
    #[serde(other)]
    Unknown,
}

impl TxStatus {
    /// A wrapper matching the Success case.
    /// # Examples
    ///
    /// ```
    /// use stx_status::tx_status::TxStatus;
    ///
    /// assert!(TxStatus::Success.is_success());
    /// assert!(!TxStatus::Pending.is_success());
    /// assert!(!TxStatus::AbortByResponse.is_success());
    /// ```
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// A wrapper matching the Pending case.
    /// # Examples
    ///
    /// ```
    /// use stx_status::tx_status::TxStatus;
    ///
    /// assert!(TxStatus::Pending.is_pending());
    /// assert!(!TxStatus::Success.is_pending());
    /// assert!(!TxStatus::DroppedReplaceByFee.is_pending());
    /// ```
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// To return true, the transaction must have been included in a block and aborted.
    /// # Examples
    ///
    /// ```
    /// use stx_status::tx_status::TxStatus;
    ///
    /// assert!(TxStatus::AbortByResponse.is_failed());
    /// assert!(TxStatus::AbortByPostCondition.is_failed());
    /// assert!(!TxStatus::Success.is_failed());
    /// assert!(!TxStatus::Pending.is_failed());
    /// assert!(!TxStatus::DroppedTooExpensive.is_failed());
    /// ```
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::AbortByResponse | Self::AbortByPostCondition)
    }

    /// To return true, the transaction must have left the mempool without being included in a block.
    /// # Examples
    ///
    /// ```
    /// use stx_status::tx_status::TxStatus;
    ///
    /// assert!(TxStatus::DroppedReplaceByFee.is_dropped());
    /// assert!(TxStatus::DroppedReplaceAcrossFork.is_dropped());
    /// assert!(TxStatus::DroppedTooExpensive.is_dropped());
    /// assert!(TxStatus::DroppedStaleGarbageCollect.is_dropped());
    /// assert!(!TxStatus::Pending.is_dropped());
    /// assert!(!TxStatus::AbortByResponse.is_dropped());
    /// ```
    #[must_use]
    pub fn is_dropped(&self) -> bool {
        matches!(
            self,
            Self::DroppedReplaceByFee
                | Self::DroppedReplaceAcrossFork
                | Self::DroppedTooExpensive
                | Self::DroppedStaleGarbageCollect
        )
    }
}

impl std::fmt::Display for TxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Success => "success",
            Self::Pending => "pending",
            Self::AbortByResponse => "abort_by_response",
            Self::AbortByPostCondition => "abort_by_post_condition",
            Self::DroppedReplaceByFee => "dropped_replace_by_fee",
            Self::DroppedReplaceAcrossFork => "dropped_replace_across_fork",
            Self::DroppedTooExpensive => "dropped_too_expensive",
            Self::DroppedStaleGarbageCollect => "dropped_stale_garbage_collect",
            Self::Unknown => "unknown",
        };
        write!(f, "{name}")
    }
}

/// Where a transaction sits relative to the chain. The three variants are disjoint views over one reconciled
/// timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Anchoring {
    /// Confirmed in a microblock.
    Microblock,
    /// Confirmed in an anchor block.
    AnchorBlock,
    /// Not yet confirmed; sourced from the mempool or inserted locally after broadcast.
    Pending,
}

impl Anchoring {
    /// Classifies a confirmed transaction by its microblock hash. An empty hash counts as absent.
    /// # Examples
    ///
    /// ```
    /// use stx_status::tx_status::Anchoring;
    ///
    /// assert_eq!(Anchoring::from_microblock_hash(Some("0xabc")), Anchoring::Microblock);
    /// assert_eq!(Anchoring::from_microblock_hash(Some("")), Anchoring::AnchorBlock);
    /// assert_eq!(Anchoring::from_microblock_hash(None), Anchoring::AnchorBlock);
    /// ```
    #[must_use]
    pub fn from_microblock_hash(microblock_hash: Option<&str>) -> Self {
        match microblock_hash {
            Some(hash) if !hash.is_empty() => Self::Microblock,
            _ => Self::AnchorBlock,
        }
    }

    /// A wrapper matching both confirmed cases.
    /// # Examples
    ///
    /// ```
    /// use stx_status::tx_status::Anchoring;
    ///
    /// assert!(Anchoring::Microblock.is_confirmed());
    /// assert!(Anchoring::AnchorBlock.is_confirmed());
    /// assert!(!Anchoring::Pending.is_confirmed());
    /// ```
    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for Anchoring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Microblock => write!(f, "microblock"),
            Self::AnchorBlock => write!(f, "anchor-block"),
            Self::Pending => write!(f, "pending"),
        }
    }
}

impl std::str::FromStr for Anchoring {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "microblock" => Ok(Self::Microblock),
            "anchor-block" | "anchor_block" | "anchorBlock" => Ok(Self::AnchorBlock),
            "pending" => Ok(Self::Pending),
            other => Err(format!("invalid anchoring '{other}'")),
        }
    }
}

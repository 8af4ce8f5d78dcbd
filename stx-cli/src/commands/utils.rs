//! Module containing utility functions for the commands interface

use std::collections::BTreeSet;

use json::JsonValue;

use stxlib::stx_status::tx_status::Anchoring;
use stxlib::stx_sync::ledger::TxRecord;
use stxlib::stx_sync::reconcile::{BlockFeedEntry, ReconcileOptions, Timeline};

use crate::commands::error::CommandError;

// Parses `[principal] [view=<view>] [limit=<n>] [hide_failed] [hide_pending] [types=<type>,<type>]`.
pub(super) fn parse_timeline_args(
    args: &[&str],
    now_ms: u64,
) -> Result<(Option<String>, ReconcileOptions), CommandError> {
    let mut principal = None;
    let mut options = ReconcileOptions::new(now_ms);
    for arg in args {
        match arg.split_once('=') {
            Some(("view", view)) => {
                options.view = Some(view.parse::<Anchoring>().map_err(CommandError::InvalidView)?);
            }
            Some(("limit", limit)) => options.limit = Some(limit.trim().parse::<usize>()?),
            Some(("types", types)) => {
                let types: BTreeSet<String> = types
                    .split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(ToString::to_string)
                    .collect();
                options.filters.types = Some(types);
            }
            Some(_) => return Err(CommandError::UnknownOption(arg.to_string())),
            None => match *arg {
                "hide_failed" => options.filters.show_failed = false,
                "hide_pending" => options.filters.show_pending = false,
                p if principal.is_none() => principal = Some(p.to_string()),
                _ => return Err(CommandError::InvalidArguments),
            },
        }
    }

    Ok((principal, options))
}

pub(super) fn tx_record_json(record: &TxRecord) -> JsonValue {
    let mut entry = json::object! {
        "txid" => record.tx_id(),
        "tx_type" => record.tx_type(),
        "status" => record.tx_status().to_string(),
        "anchoring" => record.anchoring().to_string(),
        "nonce" => record.nonce(),
    };
    match record {
        TxRecord::Confirmed(tx) => {
            entry["sender"] = tx.sender_address.clone().into();
            entry["block_height"] = tx.block_height.into();
            entry["burn_block_time"] = tx.burn_block_time.into();
        }
        TxRecord::Mempool(tx) => {
            entry["sender"] = tx.sender_address.clone().into();
            entry["receipt_time"] = tx.receipt_time.into();
        }
    }
    entry
}

pub(super) fn timeline_json(timeline: &Timeline) -> JsonValue {
    json::object! {
        "transactions" => timeline.items.iter().map(tx_record_json).collect::<Vec<_>>(),
        "pending_count" => timeline.pending_count,
        "stale_count" => timeline.stale_count,
        "empty_reason" => timeline.empty_reason.map(|reason| reason.to_string()),
    }
}

pub(super) fn block_feed_json(entry: &BlockFeedEntry) -> JsonValue {
    match entry {
        BlockFeedEntry::Anchor(block) => json::object! {
            "kind" => "anchor_block",
            "height" => block.height,
            "hash" => block.hash.clone(),
            "burn_block_time" => block.burn_block_time,
            "canonical" => block.canonical,
            "tx_count" => block.txs.len(),
        },
        BlockFeedEntry::Microblock {
            hash,
            anchor_height,
            burn_block_time,
        } => json::object! {
            "kind" => "microblock",
            "height" => *anchor_height,
            "hash" => hash.clone(),
            "burn_block_time" => *burn_block_time,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeline_options() {
        let (principal, options) = parse_timeline_args(
            &["ST2SENDER", "view=microblock", "limit=5", "hide_failed", "types=token_transfer,coinbase"],
            42,
        )
        .unwrap();
        assert_eq!(principal.as_deref(), Some("ST2SENDER"));
        assert_eq!(options.now_ms, 42);
        assert_eq!(options.view, Some(Anchoring::Microblock));
        assert_eq!(options.limit, Some(5));
        assert!(!options.filters.show_failed);
        assert!(options.filters.show_pending);
        assert_eq!(options.filters.types.unwrap().len(), 2);
    }

    #[test]
    fn timeline_without_principal() {
        let (principal, options) = parse_timeline_args(&["hide_pending"], 0).unwrap();
        assert_eq!(principal, None);
        assert!(!options.filters.show_pending);
    }

    #[test]
    fn bad_timeline_arguments() {
        assert!(matches!(
            parse_timeline_args(&["view=sideways"], 0),
            Err(CommandError::InvalidView(_))
        ));
        assert!(matches!(
            parse_timeline_args(&["limit=many"], 0),
            Err(CommandError::ParseIntFromString(_))
        ));
        assert_eq!(
            parse_timeline_args(&["sort=asc"], 0),
            Err(CommandError::UnknownOption("sort=asc".to_string()))
        );
        assert_eq!(
            parse_timeline_args(&["ST1", "ST2"], 0),
            Err(CommandError::InvalidArguments)
        );
    }
}

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![doc = r#"
# Stx Sync

## Overview
Stx-sync is the client-side sync engine of the stx sandbox. It keeps a local view of an append-only, paginated
ledger API consistent while the user submits transactions that the server has not yet confirmed:
- Cursor based paging, with the API's one-based continuation offsets and short-page termination detection.
- Infinite collections, which only ever grow by appending pages until explicitly refreshed. Concurrent requests for
  the next page join the fetch already in flight.
- Reconciliation of speculative mempool entries with confirmed, block-anchored entries into one de-duplicated,
  classified and filterable timeline.

## Terminology
- Principal - an account address.
- Page - one response of a paginated endpoint. A page holding fewer items than its limit is the last page.
- Collection - one paginated stream identified by a [`crate::ledger::CollectionKey`].
- Fresh - a mempool entry received by the node no more than the pending window (one hour) ago.
- Anchor block - a fully confirmed block. Microblocks are streamed between anchor blocks.

## Paging
1. Page 0 starts at offset 0. Page `i > 0` starts at offset `limit * i + 1`.
2. A collection is subscribed with [`crate::collection::InfiniteCollectionSync::subscribe`], which starts loading
   page 0 immediately.
3. `load_more` fetches page `page_count`. It is a no-op once the last fetched page is short. While a fetch is in flight
   every further call returns the same shared future.
4. `refresh` fetches the whole visible window again in one request and replaces all pages at once. A `load_more`
   that completes after a refresh started is discarded.
5. Transport failures are stored in the collection state and never discard fetched pages.
6. Responses that arrive after the collection was unsubscribed are dropped.

## Reconciliation
1. Partition mempool entries into fresh and stale. Stale entries are not shown.
2. De-duplicate by transaction id across fresh mempool entries and confirmed entries, confirmed entries win.
3. Apply the caller's limit, pending entries first.
4. Select a view (microblock, anchor block, pending) and apply the secondary filters.
"#]

pub mod client;
pub mod collection;
pub mod config;
pub mod cursor;
pub mod error;
pub mod ledger;
pub mod reconcile;

pub use client::{HttpResponse, PageSource, RemoteCollection, RequestBody, Transport};
pub use collection::{InfiniteCollectionSync, LoadMore, LoadOutcome};
pub use cursor::{compute_next_offset, is_last_page, merge_all};
pub use reconcile::{ReconcileOptions, Timeline, reconcile};

#![forbid(unsafe_code)]
#![warn(missing_docs)]
//! Client library for the stx sandbox.
//!
//! [`client::StxClient`] is the context object holding one [`account::AccountLedgerState`] per principal. Account
//! fetches, faucet requests and submissions all go through it so the local nonce of a principal has a single owner.

pub mod account;
pub mod api;
pub mod clarity;
pub mod client;
pub mod config;
pub mod error;
pub mod store;
pub mod submit;
pub mod utils;

#[cfg(any(test, feature = "testutils"))]
pub mod testutils;

pub use stx_status;
pub use stx_sync;

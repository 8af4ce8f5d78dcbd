#![forbid(unsafe_code)]
#![warn(missing_docs)]
//! Status types shared by the sync engine and the client library.

pub mod tx_status;

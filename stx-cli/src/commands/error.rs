//! Errors parsing command arguments.

use std::num::ParseIntError;

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub(crate) enum CommandError {
    #[error("invalid arguments")]
    InvalidArguments,
    #[error("failed to parse integer. {0}")]
    ParseIntFromString(#[from] ParseIntError),
    #[error("unknown view. {0}")]
    InvalidView(String),
    #[error("unknown option '{0}'")]
    UnknownOption(String),
}

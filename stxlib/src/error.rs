//! Errors returned by account operations and the submission pipeline.

use stx_sync::error::{SyncError, TransportError};

/// Structured rejection reasons returned by the broadcast endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectionReason {
    /// The fee is below the node's minimum.
    FeeTooLow,
    /// The sender cannot pay for the transaction.
    NotEnoughFunds,
    /// The called contract does not exist.
    NoSuchContract,
    /// A contract with this name was already deployed by the sender.
    ContractAlreadyExists,
    /// The nonce conflicts with a transaction already known to the node.
    BadNonce,
}

impl RejectionReason {
    /// Fixed user-facing explanation of the rejection.
    pub fn explanation(&self) -> &'static str {
        match self {
            Self::FeeTooLow => "Fee was too low.",
            Self::NotEnoughFunds => "Not enough funds at the sending address.",
            Self::NoSuchContract => "Contract not found.",
            Self::ContractAlreadyExists => {
                "A contract with this name already exists at your address. Please change the contract name and try \
                 again."
            }
            Self::BadNonce => {
                "There is a pending transaction, please wait until your previous transaction has completed."
            }
        }
    }
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::FeeTooLow => "FeeTooLow",
            Self::NotEnoughFunds => "NotEnoughFunds",
            Self::NoSuchContract => "NoSuchContract",
            Self::ContractAlreadyExists => "ContractAlreadyExists",
            Self::BadNonce => "BadNonce",
        };
        write!(f, "{name}")
    }
}

impl std::str::FromStr for RejectionReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FeeTooLow" => Ok(Self::FeeTooLow),
            "NotEnoughFunds" => Ok(Self::NotEnoughFunds),
            "NoSuchContract" => Ok(Self::NoSuchContract),
            "ContractAlreadyExists" => Ok(Self::ContractAlreadyExists),
            "BadNonce" => Ok(Self::BadNonce),
            other => Err(format!("unknown rejection reason '{other}'")),
        }
    }
}

/// Errors raised while building a transaction. A build error never reaches the server.
#[allow(missing_docs)] // error types document themselves
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("argument '{name}' is not a valid {expected}. got '{input}'.")]
    InvalidArgument {
        name: String,
        expected: String,
        input: String,
    },
    #[error("argument '{name}' exceeds the buffer length of {length} bytes.")]
    BufferTooLong { name: String, length: u32 },
    #[error("contract function contains unsupported Clarity ABI type: {0}.")]
    UnsupportedAbiType(String),
    #[error("expected {expected} function arguments, got {actual}.")]
    ArgumentCount { expected: usize, actual: usize },
    #[error("raw transaction is not valid hex. {0}")]
    InvalidHex(String),
    #[error("no transaction signer is configured.")]
    NoSigner,
    #[error("signing failed. {0}")]
    Signer(String),
}

impl From<hex::FromHexError> for BuildError {
    fn from(value: hex::FromHexError) -> Self {
        Self::InvalidHex(value.to_string())
    }
}

/// Error taxonomy of the client library.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClientError {
    /// Transport failure or a response that is not valid JSON. Recoverable by retrying.
    #[error("network error. {0}")]
    Network(String),
    /// Server responded with a non-2xx status.
    #[error("status {status}. {status_text}")]
    HttpStatus {
        /// Status code
        status: u16,
        /// Reason phrase
        status_text: String,
    },
    /// Local argument coercion or signing failed.
    #[error("transaction could not be built. {0}")]
    Build(#[from] BuildError),
    /// The broadcast endpoint rejected the transaction with a structured reason.
    #[error("transaction rejected. {reason}")]
    Rejection {
        /// Reason
        reason: RejectionReason,
        /// Additional data returned with the reason, for example the expected fee
        reason_data: Option<serde_json::Value>,
    },
    /// The server returned an error body without a structured reason. The body is passed through verbatim.
    #[error("{0}")]
    Unstructured(String),
}

impl ClientError {
    /// Short name of the error. Status errors are named after their status, for example `Status 429`.
    pub fn name(&self) -> String {
        match self {
            Self::Network(_) => "NetworkError".to_string(),
            Self::HttpStatus { status, .. } => format!("Status {status}"),
            Self::Build(_) => "BuildError".to_string(),
            Self::Rejection { reason, .. } => reason.to_string(),
            Self::Unstructured(_) => "UnstructuredError".to_string(),
        }
    }

    /// Message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::HttpStatus { status: 429, .. } => {
                "Too many requests to the faucet, try again later.".to_string()
            }
            Self::Rejection {
                reason,
                reason_data,
            } => {
                let expected = reason_data
                    .as_ref()
                    .and_then(|data| data.get("expected"))
                    .map(|expected| match expected {
                        serde_json::Value::String(expected) => expected.clone(),
                        other => other.to_string(),
                    });
                match (reason, expected) {
                    (RejectionReason::FeeTooLow, Some(expected)) => {
                        format!("Fee was too low, expected {expected} uSTX.")
                    }
                    (RejectionReason::NotEnoughFunds, Some(expected)) => {
                        format!("Not enough funds at address provided, expected {expected} uSTX.")
                    }
                    (reason, _) => reason.explanation().to_string(),
                }
            }
            Self::HttpStatus { status_text, .. } => status_text.clone(),
            Self::Network(message) | Self::Unstructured(message) => message.clone(),
            Self::Build(error) => error.to_string(),
        }
    }

    /// Returns true if the error is a rejection for the given reason.
    pub fn is_rejection(&self, rejection: RejectionReason) -> bool {
        matches!(self, Self::Rejection { reason, .. } if *reason == rejection)
    }
}

impl From<TransportError> for ClientError {
    fn from(value: TransportError) -> Self {
        Self::Network(value.to_string())
    }
}

impl From<SyncError> for ClientError {
    fn from(value: SyncError) -> Self {
        match value {
            SyncError::HttpStatus {
                status,
                status_text,
            } => Self::HttpStatus {
                status,
                status_text,
            },
            SyncError::Transport(error) => error.into(),
            SyncError::InvalidResponse(_) | SyncError::Unsubscribed => {
                Self::Network(value.to_string())
            }
        }
    }
}

impl From<ClientError> for json::JsonValue {
    fn from(value: ClientError) -> Self {
        json::object! {
            "name" => value.name(),
            "message" => value.user_message(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_errors_are_named_after_status() {
        let error = ClientError::HttpStatus {
            status: 429,
            status_text: "Too Many Requests".to_string(),
        };
        assert_eq!(error.name(), "Status 429");
        assert_eq!(
            error.user_message(),
            "Too many requests to the faucet, try again later."
        );
    }

    #[test]
    fn rejection_messages_use_reason_data() {
        let error = ClientError::Rejection {
            reason: RejectionReason::FeeTooLow,
            reason_data: Some(serde_json::json!({ "expected": 180, "actual": 1 })),
        };
        assert_eq!(error.name(), "FeeTooLow");
        assert_eq!(error.user_message(), "Fee was too low, expected 180 uSTX.");

        let error = ClientError::Rejection {
            reason: RejectionReason::BadNonce,
            reason_data: None,
        };
        assert!(error.is_rejection(RejectionReason::BadNonce));
        assert!(error.user_message().contains("pending transaction"));
    }

    #[test]
    fn transport_errors_are_network_errors() {
        let error: ClientError =
            SyncError::Transport(TransportError::Timeout("30s elapsed".to_string())).into();
        assert_eq!(error.name(), "NetworkError");
        let error: ClientError = SyncError::InvalidResponse("expected value".to_string()).into();
        assert!(matches!(error, ClientError::Network(_)));
    }

    #[test]
    fn reasons_parse() {
        for reason in [
            RejectionReason::FeeTooLow,
            RejectionReason::NotEnoughFunds,
            RejectionReason::NoSuchContract,
            RejectionReason::ContractAlreadyExists,
            RejectionReason::BadNonce,
        ] {
            assert_eq!(reason.to_string().parse::<RejectionReason>(), Ok(reason));
        }
        assert!("Conflict".parse::<RejectionReason>().is_err());
    }
}

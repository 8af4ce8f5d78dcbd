//! Transaction building, broadcast response parsing and submission progress.
//!
//! A submission moves through `Building -> Broadcasting -> Accepted | Rejected`. The nonce of a built transaction is
//! always the local nonce of the sender's [`crate::account::AccountLedgerState`], read by
//! [`crate::client::StxClient::submit`] while it holds the sender's submission lock.

use serde::{Deserialize, Serialize};
use stx_sync::client::HttpResponse;

use crate::{
    clarity::{ClarityValue, FunctionArg, coerce_arguments},
    error::{BuildError, ClientError, RejectionReason},
    utils,
};

/// Path of the node's broadcast endpoint.
pub const BROADCAST_PATH: &str = "/v2/transactions";

/// Whether post conditions not listed in the transaction abort it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostConditionMode {
    /// Transfers not covered by a post condition are allowed.
    Allow,
    /// Transfers not covered by a post condition abort the transaction.
    #[default]
    Deny,
}

/// What the user asked to submit, before arguments are coerced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionIntent {
    /// STX transfer
    TokenTransfer {
        /// Receiving principal
        recipient: String,
        /// Amount in micro-STX
        amount: u128,
        /// Memo
        memo: String,
    },
    /// Call of a public contract function
    ContractCall {
        /// Principal that deployed the contract
        contract_address: String,
        /// Contract name
        contract_name: String,
        /// Function name
        function_name: String,
        /// Argument schema of the function
        function_args: Vec<FunctionArg>,
        /// One raw input per argument
        inputs: Vec<String>,
        /// Post condition mode
        post_condition_mode: PostConditionMode,
    },
    /// Contract deployment
    SmartContract {
        /// Contract name
        contract_name: String,
        /// Clarity source
        code_body: String,
    },
}

impl TransactionIntent {
    /// Transaction type as named by the ledger API.
    pub fn tx_type(&self) -> &'static str {
        match self {
            Self::TokenTransfer { .. } => "token_transfer",
            Self::ContractCall { .. } => "contract_call",
            Self::SmartContract { .. } => "smart_contract",
        }
    }
}

/// Payload of a built transaction with every argument coerced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tx_type", rename_all = "snake_case")]
pub enum TransactionPayload {
    /// STX transfer
    TokenTransfer {
        /// Receiving principal
        recipient: String,
        /// Amount in micro-STX
        amount: u128,
        /// Memo
        memo: String,
    },
    /// Contract call
    ContractCall {
        /// Principal that deployed the contract
        contract_address: String,
        /// Contract name
        contract_name: String,
        /// Function name
        function_name: String,
        /// Coerced arguments
        function_args: Vec<ClarityValue>,
        /// Post condition mode
        post_condition_mode: PostConditionMode,
    },
    /// Contract deployment
    SmartContract {
        /// Contract name
        contract_name: String,
        /// Clarity source
        code_body: String,
    },
}

/// A transaction ready to be signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTransaction {
    /// Sending principal
    pub sender: String,
    /// Sequence number, taken from the local nonce
    pub nonce: u64,
    /// Fee in micro-STX
    pub fee: u64,
    /// Payload
    pub payload: TransactionPayload,
}

/// Builds an unsigned transaction for `intent` at `nonce`.
///
/// Fails before any network call if an input does not coerce to its declared argument type.
pub fn build_transaction(
    sender: &str,
    intent: &TransactionIntent,
    nonce: u64,
    fee: u64,
) -> Result<UnsignedTransaction, BuildError> {
    let payload = match intent {
        TransactionIntent::TokenTransfer {
            recipient,
            amount,
            memo,
        } => TransactionPayload::TokenTransfer {
            recipient: recipient.clone(),
            amount: *amount,
            memo: memo.clone(),
        },
        TransactionIntent::ContractCall {
            contract_address,
            contract_name,
            function_name,
            function_args,
            inputs,
            post_condition_mode,
        } => TransactionPayload::ContractCall {
            contract_address: contract_address.clone(),
            contract_name: contract_name.clone(),
            function_name: function_name.clone(),
            function_args: coerce_arguments(inputs, function_args)?,
            post_condition_mode: *post_condition_mode,
        },
        TransactionIntent::SmartContract {
            contract_name,
            code_body,
        } => TransactionPayload::SmartContract {
            contract_name: contract_name.clone(),
            code_body: code_body.clone(),
        },
    };

    Ok(UnsignedTransaction {
        sender: sender.to_string(),
        nonce,
        fee,
        payload,
    })
}

/// Serializes and signs transactions. Signing is the only suspension point of the build step.
#[async_trait::async_trait]
pub trait TransactionSigner: Send + Sync {
    /// Returns the signed wire bytes of `transaction`.
    async fn sign(&self, transaction: &UnsignedTransaction) -> Result<Vec<u8>, BuildError>;
}

/// Either pre-signed bytes or an intent to be built and signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionPayload {
    /// Hex encoded signed transaction
    Raw(String),
    /// Transaction intent
    Intent(TransactionIntent),
}

impl SubmissionPayload {
    /// Returns true for pre-signed bytes.
    pub fn is_raw(&self) -> bool {
        matches!(self, Self::Raw(_))
    }

    /// Transaction type recorded for the optimistic pending entry.
    pub fn tx_type(&self) -> &'static str {
        match self {
            Self::Raw(_) => "raw",
            Self::Intent(intent) => intent.tx_type(),
        }
    }
}

/// One submission attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRequest {
    /// Sending principal
    pub principal: String,
    /// Payload
    pub payload: SubmissionPayload,
    /// Fee in micro-STX, used when building an intent
    pub fee: u64,
}

impl SubmissionRequest {
    /// Submits a hex encoded signed transaction.
    pub fn raw(principal: impl Into<String>, tx_hex: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            payload: SubmissionPayload::Raw(tx_hex.into()),
            fee: 0,
        }
    }

    /// Submits an intent to be built at the local nonce and signed.
    pub fn intent(principal: impl Into<String>, intent: TransactionIntent, fee: u64) -> Self {
        Self {
            principal: principal.into(),
            payload: SubmissionPayload::Intent(intent),
            fee,
        }
    }
}

/// Phase of the latest submission.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SubmissionPhase {
    /// Nothing submitted yet
    #[default]
    Idle,
    /// Coercing arguments and signing
    Building,
    /// Waiting for the broadcast endpoint
    Broadcasting,
    /// The node accepted the transaction
    Accepted {
        /// Transaction id, `0x` prefixed
        tx_id: String,
    },
    /// The transaction was not accepted
    Rejected {
        /// Reason
        error: ClientError,
    },
}

impl SubmissionPhase {
    /// Returns true while building or broadcasting.
    pub fn is_in_progress(&self) -> bool {
        matches!(self, Self::Building | Self::Broadcasting)
    }
}

impl std::fmt::Display for SubmissionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Building => write!(f, "building"),
            Self::Broadcasting => write!(f, "broadcasting"),
            Self::Accepted { .. } => write!(f, "accepted"),
            Self::Rejected { .. } => write!(f, "rejected"),
        }
    }
}

/// Progress of the latest submission of a client.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmissionProgress {
    /// Incremented for every submission
    pub id: u32,
    /// Sending principal
    pub principal: Option<String>,
    /// Phase
    pub phase: SubmissionPhase,
}

impl SubmissionProgress {
    /// Progress of a new submission by `principal`.
    #[must_use]
    pub fn start(id: u32, principal: &str) -> Self {
        Self {
            id,
            principal: Some(principal.to_string()),
            phase: SubmissionPhase::Building,
        }
    }
}

impl From<SubmissionProgress> for json::JsonValue {
    fn from(value: SubmissionProgress) -> Self {
        let mut progress = json::object! {
            "id" => value.id,
            "principal" => value.principal,
            "phase" => value.phase.to_string(),
            "in_progress" => value.phase.is_in_progress(),
        };
        match value.phase {
            SubmissionPhase::Accepted { tx_id } => progress["txid"] = tx_id.into(),
            SubmissionPhase::Rejected { error } => progress["error"] = error.into(),
            _ => {}
        }
        progress
    }
}

/// Interprets the broadcast endpoint's response.
///
/// A 2xx body holds the quoted transaction id. Any other body is searched for an embedded JSON object with a
/// `reason`; without one the body is passed through verbatim.
pub fn parse_broadcast_response(response: HttpResponse) -> Result<String, ClientError> {
    if response.is_success() {
        return parse_tx_id(&response.text())
            .map(|tx_id| utils::prefix_tx_id(&tx_id))
            .ok_or_else(|| ClientError::Unstructured(response.text()));
    }

    let body = response.text();
    if let Some(error) = extract_json_object(&body)
        && let Some(reason) = error
            .get("reason")
            .and_then(serde_json::Value::as_str)
            .and_then(|reason| reason.parse::<RejectionReason>().ok())
    {
        return Err(ClientError::Rejection {
            reason,
            reason_data: error.get("reason_data").cloned(),
        });
    }

    if body.trim().is_empty() {
        Err(ClientError::HttpStatus {
            status: response.status,
            status_text: response.status_text,
        })
    } else {
        Err(ClientError::Unstructured(body.trim().to_string()))
    }
}

fn parse_tx_id(body: &str) -> Option<String> {
    if let Some(quoted) = body.split('"').nth(1)
        && is_tx_id(quoted)
    {
        return Some(quoted.to_string());
    }
    if let Some(object) = extract_json_object(body) {
        return object
            .get("txid")
            .or_else(|| object.get("txId"))
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);
    }
    let trimmed = body.trim();
    is_tx_id(trimmed).then(|| trimmed.to_string())
}

fn is_tx_id(candidate: &str) -> bool {
    let digits = candidate.strip_prefix("0x").unwrap_or(candidate);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_hexdigit())
}

/// Returns the first JSON object embedded in `text`.
fn extract_json_object(text: &str) -> Option<serde_json::Value> {
    text.match_indices('{').find_map(|(start, _)| {
        serde_json::Deserializer::from_str(&text[start..])
            .into_iter::<serde_json::Value>()
            .next()
            .and_then(Result::ok)
            .filter(serde_json::Value::is_object)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clarity::ClarityAbiType;

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            status_text: "Bad Request".to_string(),
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn builds_at_given_nonce() {
        let intent = TransactionIntent::ContractCall {
            contract_address: "ST1PQHQKV0RJXZFY1DGX8MNSNYVE3VGZJSRTPGZGM".to_string(),
            contract_name: "counter".to_string(),
            function_name: "add".to_string(),
            function_args: vec![FunctionArg::new("n", ClarityAbiType::Uint128)],
            inputs: vec!["7".to_string()],
            post_condition_mode: PostConditionMode::Allow,
        };
        let transaction = build_transaction("ST2SENDER", &intent, 6, 180).unwrap();
        assert_eq!(transaction.nonce, 6);
        assert_eq!(
            transaction.payload,
            TransactionPayload::ContractCall {
                contract_address: "ST1PQHQKV0RJXZFY1DGX8MNSNYVE3VGZJSRTPGZGM".to_string(),
                contract_name: "counter".to_string(),
                function_name: "add".to_string(),
                function_args: vec![ClarityValue::UInt(7)],
                post_condition_mode: PostConditionMode::Allow,
            }
        );
    }

    #[test]
    fn coercion_failure_is_build_error() {
        let intent = TransactionIntent::ContractCall {
            contract_address: "ST1PQHQKV0RJXZFY1DGX8MNSNYVE3VGZJSRTPGZGM".to_string(),
            contract_name: "counter".to_string(),
            function_name: "add".to_string(),
            function_args: vec![FunctionArg::new("n", ClarityAbiType::Uint128)],
            inputs: vec!["seven".to_string()],
            post_condition_mode: PostConditionMode::Deny,
        };
        assert!(matches!(
            build_transaction("ST2SENDER", &intent, 0, 180),
            Err(BuildError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn accepted_tx_id_is_prefixed() {
        assert_eq!(
            parse_broadcast_response(response(200, "\"d1e4c7\"")),
            Ok("0xd1e4c7".to_string())
        );
        assert_eq!(
            parse_broadcast_response(response(200, r#"{"txid": "0xd1e4c7"}"#)),
            Ok("0xd1e4c7".to_string())
        );
    }

    #[test]
    fn structured_rejection_is_parsed_from_body() {
        let body = r#"transaction rejected: {"error": "transaction rejected", "reason": "BadNonce", "reason_data": {"expected": 6, "actual": 5}, "txid": "abc"}"#;
        let error = parse_broadcast_response(response(400, body)).unwrap_err();
        assert!(error.is_rejection(RejectionReason::BadNonce));

        let body = r#"{"error": "transaction rejected", "reason": "FeeTooLow", "reason_data": {"expected": 180, "actual": 1}}"#;
        assert_eq!(
            parse_broadcast_response(response(400, body))
                .unwrap_err()
                .user_message(),
            "Fee was too low, expected 180 uSTX."
        );
    }

    #[test]
    fn unstructured_body_is_verbatim() {
        assert_eq!(
            parse_broadcast_response(response(400, "Deserialization failure")),
            Err(ClientError::Unstructured("Deserialization failure".to_string()))
        );
        assert_eq!(
            parse_broadcast_response(response(400, r#"{"reason": "Serialization"}"#)),
            Err(ClientError::Unstructured(r#"{"reason": "Serialization"}"#.to_string()))
        );
        assert_eq!(
            parse_broadcast_response(response(502, "")),
            Err(ClientError::HttpStatus {
                status: 502,
                status_text: "Bad Request".to_string()
            })
        );
    }

    #[test]
    fn progress_json() {
        let progress = SubmissionProgress {
            id: 2,
            principal: Some("ST2SENDER".to_string()),
            phase: SubmissionPhase::Accepted {
                tx_id: "0xabc".to_string(),
            },
        };
        let json: json::JsonValue = progress.into();
        assert_eq!(json["phase"], "accepted");
        assert_eq!(json["txid"], "0xabc");
        assert_eq!(json["in_progress"], false);
    }
}

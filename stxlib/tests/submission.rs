use std::sync::Arc;

use stxlib::{
    clarity::{ClarityAbiType, FunctionArg},
    client::StxClient,
    config::{ClientConfig, Network},
    error::{BuildError, ClientError, RejectionReason},
    submit::{BROADCAST_PATH, PostConditionMode, SubmissionPhase, SubmissionRequest, TransactionIntent},
    testutils::{MockSigner, MockTransport},
};

const PRINCIPAL: &str = "ST2SENDER";

fn client(transport: Arc<MockTransport>, signer: Arc<MockSigner>) -> StxClient {
    StxClient::with_transport(ClientConfig::build(Network::Testnet).create(), transport)
        .with_signer(signer)
}

fn contract_call(input: &str) -> TransactionIntent {
    TransactionIntent::ContractCall {
        contract_address: "ST1PQHQKV0RJXZFY1DGX8MNSNYVE3VGZJSRTPGZGM".to_string(),
        contract_name: "faucet".to_string(),
        function_name: "claim".to_string(),
        function_args: vec![FunctionArg::new("amount", ClarityAbiType::Uint128)],
        inputs: vec![input.to_string()],
        post_condition_mode: PostConditionMode::Allow,
    }
}

#[tokio::test]
async fn fee_too_low_keeps_optimistic_nonce() {
    let transport = Arc::new(MockTransport::new());
    transport.respond_body(
        BROADCAST_PATH,
        400,
        r#"{"error": "transaction rejected", "reason": "FeeTooLow", "reason_data": {"expected": 180, "actual": 1}}"#,
    );
    let client = client(transport, Arc::new(MockSigner::new()));
    client.increment_local_nonce(PRINCIPAL, 3).await;

    let error = client
        .submit(SubmissionRequest::intent(PRINCIPAL, contract_call("5"), 1))
        .await
        .unwrap_err();
    assert!(error.is_rejection(RejectionReason::FeeTooLow));
    assert_eq!(error.user_message(), "Fee was too low, expected 180 uSTX.");
    assert_eq!(client.account(PRINCIPAL).await.unwrap().local_nonce(), 3);
    assert_eq!(
        client.submission_progress().await.phase,
        SubmissionPhase::Rejected { error }
    );
}

#[tokio::test]
async fn unstructured_error_passes_through() {
    let transport = Arc::new(MockTransport::new());
    transport.respond_body(BROADCAST_PATH, 400, "transaction deserialization failed");
    let client = client(transport, Arc::new(MockSigner::new()));

    assert_eq!(
        client
            .submit(SubmissionRequest::raw(PRINCIPAL, "00"))
            .await,
        Err(ClientError::Unstructured(
            "transaction deserialization failed".to_string()
        ))
    );
}

#[tokio::test]
async fn coercion_failure_skips_signing_and_broadcast() {
    let transport = Arc::new(MockTransport::new());
    let signer = Arc::new(MockSigner::new());
    let client = client(transport.clone(), signer.clone());

    let error = client
        .submit(SubmissionRequest::intent(PRINCIPAL, contract_call("-5"), 180))
        .await
        .unwrap_err();
    assert!(matches!(
        error,
        ClientError::Build(BuildError::InvalidArgument { .. })
    ));
    assert!(signer.signed_nonces().is_empty());
    assert!(transport.requests().is_empty());
    assert_eq!(client.account(PRINCIPAL).await.unwrap().local_nonce(), 0);
}

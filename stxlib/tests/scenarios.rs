use std::sync::Arc;

use stxlib::{
    client::StxClient,
    config::{ClientConfig, Network},
    error::RejectionReason,
    stx_status::tx_status::Anchoring,
    stx_sync::{
        collection::LoadOutcome,
        ledger::{CollectionKey, ConfirmedTx, ResourceKind, TxRecord},
        reconcile::{ReconcileOptions, reconcile},
    },
    submit::{BROADCAST_PATH, SubmissionRequest, TransactionIntent},
    testutils::{MockSigner, MockTransport, confirmed_tx, mempool_tx, microblock_tx, page_json},
};

const PRINCIPAL: &str = "ST2SENDER";
const ACCOUNT: &str = "/v2/accounts/ST2SENDER";

fn client(transport: Arc<MockTransport>) -> StxClient {
    StxClient::with_transport(ClientConfig::build(Network::Mocknet).create(), transport)
}

#[tokio::test]
async fn stale_account_fetch_keeps_optimistic_nonce() {
    let transport = Arc::new(MockTransport::new());
    transport.respond_json(ACCOUNT, r#"{"balance": "0x64", "nonce": 5}"#);
    let client = client(transport);

    client.fetch_account(PRINCIPAL).await.unwrap();
    assert_eq!(client.increment_local_nonce(PRINCIPAL, 6).await, 6);
    client.fetch_account(PRINCIPAL).await.unwrap();

    let account = client.account(PRINCIPAL).await.unwrap();
    assert_eq!(account.confirmed_nonce(), Some(5));
    assert_eq!(account.local_nonce(), 6);
}

#[tokio::test]
async fn bad_nonce_rejection_resets_local_nonce() {
    let transport = Arc::new(MockTransport::new());
    transport.respond_json(ACCOUNT, r#"{"balance": "0x64", "nonce": 5}"#);
    transport.respond_body(
        BROADCAST_PATH,
        400,
        r#"{"error": "transaction rejected", "reason": "BadNonce", "reason_data": {"expected": 5, "actual": 8}, "txid": "0xbb"}"#,
    );
    let client = client(transport);
    client.fetch_account(PRINCIPAL).await.unwrap();
    client.increment_local_nonce(PRINCIPAL, 8).await;

    let error = client
        .submit(SubmissionRequest::raw(PRINCIPAL, "8080"))
        .await
        .unwrap_err();
    assert!(error.is_rejection(RejectionReason::BadNonce));

    let account = client.account(PRINCIPAL).await.unwrap();
    assert_eq!(account.local_nonce(), 5);
    assert_eq!(account.last_error(), Some(&error));
    assert!(account.pending_transactions().is_empty());
}

#[tokio::test]
async fn concurrent_load_more_fetches_once() {
    let transport = Arc::new(MockTransport::new());
    let first_page: Vec<ConfirmedTx> = (0..30).map(|i| confirmed_tx(&format!("0x{i:02x}"))).collect();
    transport.respond_json("/extended/v1/tx?limit=30&offset=0", &page_json(&first_page));
    transport.respond_json(
        "/extended/v1/tx?limit=30&offset=31",
        &page_json(&[confirmed_tx("0xff")]),
    );
    let client = client(transport.clone());
    let collection =
        client.subscribe::<ConfirmedTx>(CollectionKey::new(ResourceKind::Transaction));
    collection.settled().await;
    assert_eq!(collection.page_count(), 1);
    assert!(!collection.is_reaching_end());

    let first = collection.load_more();
    let second = collection.load_more();
    let (first, second) = tokio::join!(first, second);

    assert_eq!(first, second);
    assert!(matches!(first, LoadOutcome::Loaded { page_index: 1, len: 1 }));
    assert_eq!(transport.request_count("/extended/v1/tx?limit=30&offset=31"), 1);
    assert_eq!(collection.items().len(), 31);
    assert!(collection.is_reaching_end());
    assert_eq!(collection.load_more().await, LoadOutcome::ReachedEnd);
}

#[test]
fn pending_entries_lead_a_limited_timeline() {
    let now_ms = 1_700_000_000_000;
    let confirmed = [confirmed_tx("0x01"), microblock_tx("0x02"), confirmed_tx("0x03")];
    let mempool = [
        mempool_tx("0x0a", now_ms / 1000 - 10),
        mempool_tx("0x0b", now_ms / 1000 - 20),
    ];
    let mut options = ReconcileOptions::new(now_ms);
    options.limit = Some(4);

    let timeline = reconcile(Some(confirmed.as_slice()), &mempool, &options);
    let ids: Vec<&str> = timeline.items.iter().map(TxRecord::tx_id).collect();
    assert_eq!(ids, ["0x0a", "0x0b", "0x01", "0x02"]);
    assert_eq!(timeline.items[0].anchoring(), Anchoring::Pending);
    assert_eq!(timeline.items[3].anchoring(), Anchoring::Microblock);
}

#[tokio::test]
async fn concurrent_submissions_use_distinct_nonces() {
    let transport = Arc::new(MockTransport::new());
    transport.respond_json(ACCOUNT, r#"{"balance": "0x3b9aca00", "nonce": 2}"#);
    transport.respond_json(BROADCAST_PATH, "\"aa\"");
    transport.respond_json(BROADCAST_PATH, "\"bb\"");
    transport.set_latency(std::time::Duration::from_millis(5));
    let signer = Arc::new(MockSigner::new());
    let client = client(transport).with_signer(signer.clone());
    client.fetch_account(PRINCIPAL).await.unwrap();

    let intent = |memo: &str| {
        SubmissionRequest::intent(
            PRINCIPAL,
            TransactionIntent::TokenTransfer {
                recipient: "ST1PQHQKV0RJXZFY1DGX8MNSNYVE3VGZJSRTPGZGM".to_string(),
                amount: 10,
                memo: memo.to_string(),
            },
            180,
        )
    };
    let (first, second) = tokio::join!(client.submit(intent("a")), client.submit(intent("b")));
    first.unwrap();
    second.unwrap();

    let mut nonces = signer.signed_nonces();
    nonces.sort_unstable();
    assert_eq!(nonces, [2, 3]);
    let account = client.account(PRINCIPAL).await.unwrap();
    assert_eq!(account.local_nonce(), 4);
    assert_eq!(account.pending_transactions().len(), 2);
}

//! Transaction submission.

use stx_status::tx_status::TxStatus;
use stx_sync::ledger::MempoolTx;

use super::StxClient;
use crate::{
    api,
    error::{BuildError, ClientError, RejectionReason},
    submit::{
        SubmissionPayload, SubmissionPhase, SubmissionProgress, SubmissionRequest,
        build_transaction,
    },
    utils,
};

impl StxClient {
    /// Builds, signs and broadcasts `request`, returning the `0x` prefixed transaction id.
    ///
    /// Submissions of the same principal run one at a time. The transaction is built at the account's local nonce,
    /// which is raised past it once the node accepts the transaction. The accepted transaction is inserted into the
    /// account's pending transactions. A `BadNonce` rejection resets the local nonce to the confirmed nonce.
    pub async fn submit(&self, request: SubmissionRequest) -> Result<String, ClientError> {
        let lock = self.submission_lock(&request.principal);
        let _submitting = lock.lock().await;

        let id = {
            let mut progress = self.submission_progress.write().await;
            *progress = SubmissionProgress::start(progress.id + 1, &request.principal);
            progress.id
        };

        let nonce = self
            .update_account(&request.principal, |account| account.local_nonce())
            .await;
        let result = self.build_and_broadcast(&request, nonce).await;
        match &result {
            Ok(tx_id) => {
                tracing::info!(
                    "Submission {id} of {} accepted as {tx_id} with nonce {nonce}.",
                    request.principal
                );
                let fee_rate = match request.payload {
                    SubmissionPayload::Raw(_) => String::new(),
                    SubmissionPayload::Intent(_) => request.fee.to_string(),
                };
                self.update_account(&request.principal, |account| {
                    account.increment_local_nonce(nonce + 1);
                    account.add_pending_transaction(MempoolTx {
                        tx_id: tx_id.clone(),
                        tx_type: request.payload.tx_type().to_string(),
                        tx_status: TxStatus::Pending,
                        receipt_time: utils::now_secs(),
                        sender_address: request.principal.clone(),
                        nonce,
                        fee_rate,
                    });
                })
                .await;
                self.set_phase(SubmissionPhase::Accepted {
                    tx_id: tx_id.clone(),
                })
                .await;
                if let Err(e) = self.save_account(&request.principal).await {
                    log::error!("Failed to save account {}. {e}", request.principal);
                }
            }
            Err(error) => {
                tracing::warn!("Submission {id} of {} rejected. {error}", request.principal);
                self.update_account(&request.principal, |account| {
                    if error.is_rejection(RejectionReason::BadNonce) {
                        account.reset_local_nonce();
                    }
                    account.set_error(error.clone());
                })
                .await;
                self.set_phase(SubmissionPhase::Rejected {
                    error: error.clone(),
                })
                .await;
            }
        }

        result
    }

    async fn build_and_broadcast(
        &self,
        request: &SubmissionRequest,
        nonce: u64,
    ) -> Result<String, ClientError> {
        let transaction = match &request.payload {
            SubmissionPayload::Raw(tx_hex) => {
                let tx_hex = tx_hex.trim();
                hex::decode(tx_hex.strip_prefix("0x").unwrap_or(tx_hex)).map_err(BuildError::from)?
            }
            SubmissionPayload::Intent(intent) => {
                let signer = self.signer.as_ref().ok_or(BuildError::NoSigner)?;
                let unsigned = build_transaction(&request.principal, intent, nonce, request.fee)?;
                signer.sign(&unsigned).await?
            }
        };

        self.set_phase(SubmissionPhase::Broadcasting).await;
        api::broadcast_transaction(self.transport.as_ref(), transaction).await
    }

    async fn set_phase(&self, phase: SubmissionPhase) {
        self.submission_progress.write().await.phase = phase;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::{
        account::AccountSnapshot,
        client::StxClient,
        config::{ClientConfig, Network},
        error::{BuildError, ClientError},
        submit::{BROADCAST_PATH, SubmissionPhase, SubmissionRequest, TransactionIntent},
        testutils::{MockSigner, MockTransport},
    };

    fn transfer() -> TransactionIntent {
        TransactionIntent::TokenTransfer {
            recipient: "ST1PQHQKV0RJXZFY1DGX8MNSNYVE3VGZJSRTPGZGM".to_string(),
            amount: 100,
            memo: String::new(),
        }
    }

    #[tokio::test]
    async fn raw_submission_advances_local_nonce() {
        let transport = Arc::new(MockTransport::new());
        transport.respond_json(BROADCAST_PATH, "\"d1e4\"");
        let client = StxClient::with_transport(
            ClientConfig::build(Network::Mocknet).create(),
            transport,
        );
        client
            .update_account("ST2SENDER", |account| {
                account.apply_account(AccountSnapshot { balance: 1, nonce: 4 }, 0);
            })
            .await;

        let tx_id = client
            .submit(SubmissionRequest::raw("ST2SENDER", "0x8080"))
            .await
            .unwrap();
        assert_eq!(tx_id, "0xd1e4");

        let account = client.account("ST2SENDER").await.unwrap();
        assert_eq!(account.local_nonce(), 5);
        assert_eq!(account.pending_transactions()[0].tx_id, "0xd1e4");
        assert_eq!(account.pending_transactions()[0].nonce, 4);
        assert_eq!(
            client.submission_progress().await.phase,
            SubmissionPhase::Accepted {
                tx_id: "0xd1e4".to_string()
            }
        );
    }

    #[tokio::test]
    async fn invalid_hex_never_reaches_the_node() {
        let transport = Arc::new(MockTransport::new());
        let client = StxClient::with_transport(
            ClientConfig::build(Network::Mocknet).create(),
            transport.clone(),
        );
        let error = client
            .submit(SubmissionRequest::raw("ST2SENDER", "zz"))
            .await
            .unwrap_err();
        assert!(matches!(error, ClientError::Build(BuildError::InvalidHex(_))));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn intent_without_signer_is_build_error() {
        let client = StxClient::with_transport(
            ClientConfig::build(Network::Mocknet).create(),
            Arc::new(MockTransport::new()),
        );
        assert_eq!(
            client
                .submit(SubmissionRequest::intent("ST2SENDER", transfer(), 180))
                .await,
            Err(ClientError::Build(BuildError::NoSigner))
        );
    }

    #[tokio::test]
    async fn intent_is_signed_at_local_nonce() {
        let transport = Arc::new(MockTransport::new());
        transport.respond_json(BROADCAST_PATH, "\"aa\"");
        let signer = Arc::new(MockSigner::new());
        let client = StxClient::with_transport(
            ClientConfig::build(Network::Mocknet).create(),
            transport,
        )
        .with_signer(signer.clone());
        client.increment_local_nonce("ST2SENDER", 7).await;

        client
            .submit(SubmissionRequest::intent("ST2SENDER", transfer(), 180))
            .await
            .unwrap();
        assert_eq!(signer.signed_nonces(), [7]);
        let account = client.account("ST2SENDER").await.unwrap();
        assert_eq!(account.local_nonce(), 8);
        assert_eq!(account.pending_transactions()[0].tx_type, "token_transfer");
    }
}

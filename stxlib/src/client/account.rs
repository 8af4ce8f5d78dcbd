//! Account operations of [`StxClient`]. Failures are recorded on the account state and also returned.

use stx_status::tx_status::TxStatus;
use stx_sync::ledger::MempoolTx;

use super::StxClient;
use crate::{
    account::AccountSnapshot,
    api::{self, AccountDataOptions, AllAccountData, FaucetResponse},
    error::ClientError,
    utils,
};

impl StxClient {
    /// Fetches the confirmed balance and nonce of `principal`.
    ///
    /// The account moves to `Loading` until the response arrives. On failure the confirmed fields keep their last
    /// known values.
    pub async fn fetch_account(&self, principal: &str) -> Result<AccountSnapshot, ClientError> {
        self.update_account(principal, |account| account.begin_fetch())
            .await;

        let result = api::get_account(self.transport.as_ref(), principal).await;
        self.update_account(principal, |account| match &result {
            Ok(snapshot) => {
                account.apply_account(*snapshot, utils::now_ms());
                tracing::info!(
                    "Account {principal} ready. nonce: {}, local nonce: {}",
                    snapshot.nonce,
                    account.local_nonce()
                );
            }
            Err(error) => {
                tracing::warn!("Account {principal} fetch failed. {error}");
                account.apply_fetch_error(error.clone());
            }
        })
        .await;

        result
    }

    /// Sets the local nonce of `principal` to at least `nonce`.
    pub async fn increment_local_nonce(&self, principal: &str, nonce: u64) -> u64 {
        self.update_account(principal, |account| {
            account.increment_local_nonce(nonce);
            account.local_nonce()
        })
        .await
    }

    /// Resets the local nonce of `principal` to its confirmed nonce.
    pub async fn reset_local_nonce(&self, principal: &str) -> u64 {
        self.update_account(principal, |account| {
            account.reset_local_nonce();
            account.local_nonce()
        })
        .await
    }

    /// Clears the last error of `principal`.
    pub async fn clear_error(&self, principal: &str) {
        self.update_account(principal, |account| account.clear_error())
            .await;
    }

    /// Requests test funds for `principal`.
    ///
    /// The faucet transaction is added to the account's pending transactions. The nonce is not touched, the
    /// faucet pays from its own account.
    pub async fn request_faucet_funds(&self, principal: &str) -> Result<FaucetResponse, ClientError> {
        let result = api::request_faucet(self.transport.as_ref(), principal).await;
        self.update_account(principal, |account| match &result {
            Ok(faucet) => account.add_pending_transaction(MempoolTx {
                tx_id: faucet.tx_id.clone(),
                tx_type: "token_transfer".to_string(),
                tx_status: TxStatus::Pending,
                receipt_time: utils::now_secs(),
                sender_address: String::new(),
                nonce: 0,
                fee_rate: String::new(),
            }),
            Err(error) => {
                tracing::warn!("Faucet request for {principal} failed. {error}");
                account.set_error(error.clone());
            }
        })
        .await;

        result
    }

    /// Fetches balances, confirmed transactions and mempool entries of `principal` concurrently.
    ///
    /// Pending transactions of the account that appear among the confirmed transactions are dropped.
    pub async fn fetch_all_account_data(
        &self,
        principal: &str,
        skip_transactions: bool,
    ) -> Result<AllAccountData, ClientError> {
        let options = AccountDataOptions {
            principal: principal.to_string(),
            tx_limit: self.config.sync_config.account_tx_limit,
            skip_transactions,
        };
        let result = api::fetch_all_account_data(self.transport.as_ref(), &options).await;
        self.update_account(principal, |account| match &result {
            Ok(data) => {
                if let Some(transactions) = &data.transactions {
                    account.absorb_confirmed(transactions);
                }
            }
            Err(error) => account.set_error(error.clone()),
        })
        .await;

        result
    }
}

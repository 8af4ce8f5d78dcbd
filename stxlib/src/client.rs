//! The client context object. Owns the account states, the transport and the optional signer and store.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, PoisonError},
};

use serde::de::DeserializeOwned;
use tokio::sync::{Mutex, RwLock};

use stx_sync::{
    client::{PageSource, RemoteCollection, Transport, fetch::HttpTransport, get_json},
    collection::InfiniteCollectionSync,
    ledger::{Block, CollectionKey, ConfirmedTx, PageEnvelope, ResourceKind},
    reconcile::{BlockFeedEntry, ReconcileOptions, Timeline, block_feed, reconcile},
};

use crate::{
    account::AccountLedgerState,
    api,
    config::ClientConfig,
    error::ClientError,
    store::ScopedStore,
    submit::{SubmissionProgress, TransactionSigner},
};

pub mod account;
pub mod save;
pub mod send;

/// Client of one network. Holds one [`AccountLedgerState`] per principal.
///
/// Account states are only mutated through the client's operations. Submissions of a principal are serialized so
/// two transactions never read the same local nonce.
pub struct StxClient {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    signer: Option<Arc<dyn TransactionSigner>>,
    store: Option<Arc<dyn ScopedStore>>,
    accounts: Arc<RwLock<BTreeMap<String, AccountLedgerState>>>,
    submission_locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
    submission_progress: Arc<RwLock<SubmissionProgress>>,
}

impl StxClient {
    /// Creates a client talking HTTP to the config's API server.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let transport = HttpTransport::new(config.api_server.clone())?;

        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Creates a client over `transport`.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            signer: None,
            store: None,
            accounts: Arc::new(RwLock::new(BTreeMap::new())),
            submission_locks: std::sync::Mutex::new(HashMap::new()),
            submission_progress: Arc::new(RwLock::new(SubmissionProgress::default())),
        }
    }

    /// Sets the signer used to submit transaction intents.
    #[must_use]
    pub fn with_signer(mut self, signer: Arc<dyn TransactionSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Sets the store account snapshots are saved to.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn ScopedStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Returns config used to create the client.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Transport shared by every request of the client.
    pub fn transport(&self) -> Arc<dyn Transport> {
        self.transport.clone()
    }

    /// Returns URI of the API server the client is connected to.
    pub fn server_uri(&self) -> http::Uri {
        self.config.get_api_server()
    }

    /// Set the server uri. Applies to the next request of every subscription.
    pub fn set_server(&self, server: http::Uri) {
        self.config.set_api_server(server);
    }

    /// Returns a copy of the state of `principal`.
    pub async fn account(&self, principal: &str) -> Option<AccountLedgerState> {
        self.accounts.read().await.get(principal).cloned()
    }

    /// Returns copies of every account state, ordered by principal.
    pub async fn accounts(&self) -> Vec<AccountLedgerState> {
        self.accounts.read().await.values().cloned().collect()
    }

    /// Destroys the state of `principal`, for example when switching accounts.
    pub async fn forget_account(&self, principal: &str) -> Option<AccountLedgerState> {
        self.accounts.write().await.remove(principal)
    }

    /// Applies `update` to the state of `principal`, creating it if it does not exist.
    pub(crate) async fn update_account<R>(
        &self,
        principal: &str,
        update: impl FnOnce(&mut AccountLedgerState) -> R,
    ) -> R {
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .entry(principal.to_string())
            .or_insert_with(|| AccountLedgerState::new(principal));

        update(account)
    }

    /// Progress of the latest submission.
    pub async fn submission_progress(&self) -> SubmissionProgress {
        self.submission_progress.read().await.clone()
    }

    pub(crate) fn submission_lock(&self, principal: &str) -> Arc<Mutex<()>> {
        self.submission_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(principal.to_string())
            .or_default()
            .clone()
    }

    /// Subscribes to the paginated collection identified by `key`, using the configured page limit.
    pub fn subscribe<T>(&self, key: CollectionKey) -> InfiniteCollectionSync<T>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let source: Arc<dyn PageSource<T>> =
            Arc::new(RemoteCollection::new(self.transport.clone(), key.clone()));

        InfiniteCollectionSync::subscribe(key, source, self.config.sync_config.page_limit)
    }

    /// Fetches the newest anchor blocks and expands their microblocks.
    pub async fn block_feed(&self, limit: Option<usize>) -> Result<Vec<BlockFeedEntry>, ClientError> {
        let page_limit = self.config.sync_config.page_limit;
        let blocks: PageEnvelope<Block> = get_json(
            self.transport.as_ref(),
            &CollectionKey::new(ResourceKind::Block).path(0, page_limit),
        )
        .await?;

        Ok(block_feed(&blocks.results, limit))
    }

    /// Fetches confirmed and mempool transactions and reconciles them into one timeline.
    ///
    /// With a principal the locally inserted pending transactions of that principal join the mempool entries, and
    /// those that now appear confirmed are dropped from the account.
    pub async fn timeline(
        &self,
        principal: Option<&str>,
        mut options: ReconcileOptions,
    ) -> Result<Timeline, ClientError> {
        let sync_config = self.config.sync_config;
        options.pending_window_ms = sync_config.pending_window_ms;
        let transport = self.transport.as_ref();

        let (confirmed, mempool) = match principal {
            Some(principal) => tokio::try_join!(
                api::get_address_transactions(transport, principal, sync_config.account_tx_limit),
                api::get_mempool(transport, Some(principal), sync_config.account_tx_limit),
            )?,
            None => {
                let key = CollectionKey::new(ResourceKind::Transaction);
                let confirmed = async {
                    get_json::<PageEnvelope<ConfirmedTx>>(transport, &key.path(0, sync_config.page_limit))
                        .await
                        .map(|envelope| envelope.results)
                        .map_err(ClientError::from)
                };
                tokio::try_join!(
                    confirmed,
                    api::get_mempool(transport, None, sync_config.page_limit),
                )?
            }
        };

        let mempool = match principal {
            Some(principal) => {
                let mut local = self
                    .update_account(principal, |account| {
                        let absorbed = account.absorb_confirmed(&confirmed);
                        if absorbed > 0 {
                            tracing::debug!("{absorbed} pending transactions of {principal} confirmed.");
                        }
                        account.pending_transactions().to_vec()
                    })
                    .await;
                local.extend(mempool);
                local
            }
            None => mempool,
        };

        Ok(reconcile(Some(confirmed.as_slice()), &mempool, &options))
    }
}

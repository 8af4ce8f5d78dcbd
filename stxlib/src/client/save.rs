//! `StxClient` saves an account to its store after every accepted submission. Accounts are scoped by network.

use std::io;

use super::StxClient;
use crate::account::AccountLedgerState;

impl StxClient {
    fn store_scope(&self) -> String {
        self.config.network.to_string()
    }

    /// Saves the state of `principal`. Does nothing without a store or if the account is unknown.
    pub async fn save_account(&self, principal: &str) -> io::Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let Some(account) = self.account(principal).await else {
            return Ok(());
        };
        let mut bytes = Vec::new();
        account.write(&mut bytes)?;

        store.put(&self.store_scope(), principal, &bytes)
    }

    /// Saves every account state.
    pub async fn save_accounts(&self) -> io::Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let scope = self.store_scope();
        for account in self.accounts().await {
            let mut bytes = Vec::new();
            account.write(&mut bytes)?;
            store.put(&scope, account.principal(), &bytes)?;
        }
        log::debug!("Saved accounts to the {scope} store");

        Ok(())
    }

    /// Restores the saved accounts of this network, replacing any state held for the same principals.
    ///
    /// Unreadable snapshots are logged and skipped. Returns the number of accounts restored.
    pub async fn load_accounts(&self) -> io::Result<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let scope = self.store_scope();
        let mut restored = Vec::new();
        for principal in store.keys(&scope)? {
            let Some(bytes) = store.get(&scope, &principal)? else {
                continue;
            };
            match AccountLedgerState::read(bytes.as_slice()) {
                Ok(account) => restored.push(account),
                Err(e) => log::error!("Failed to read saved account {principal}. {e}"),
            }
        }

        let count = restored.len();
        let mut accounts = self.accounts.write().await;
        for account in restored {
            accounts.insert(account.principal().to_string(), account);
        }

        Ok(count)
    }

    /// Removes the saved state of `principal`.
    pub async fn delete_saved_account(&self, principal: &str) -> io::Result<()> {
        match &self.store {
            Some(store) => store.remove(&self.store_scope(), principal),
            None => Ok(()),
        }
    }
}

//! Sync configuration.

/// Number of items requested per page when no limit is configured.
pub const DEFAULT_PAGE_LIMIT: u64 = 30;

/// Mempool entries received longer ago than this many milliseconds are considered stale.
pub const PENDING_WINDOW_MS: u64 = 60 * 60 * 1000;

/// Number of confirmed transactions requested for a single account when no limit is configured.
pub const DEFAULT_ACCOUNT_TX_LIMIT: u64 = 50;

/// Sync configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Number of items requested per page.
    pub page_limit: u64,
    /// Width of the freshness window for mempool entries in milliseconds. The boundary is inclusive.
    pub pending_window_ms: u64,
    /// Number of confirmed transactions fetched for an account overview.
    pub account_tx_limit: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_limit: DEFAULT_PAGE_LIMIT,
            pending_window_ms: PENDING_WINDOW_MS,
            account_tx_limit: DEFAULT_ACCOUNT_TX_LIMIT,
        }
    }
}

impl SyncConfig {
    /// Constructs a config requesting small pages. Useful for constrained displays such as the home feed.
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            page_limit: 10,
            account_tx_limit: 10,
            ..Self::default()
        }
    }

    /// Sets the page limit, ignoring zero.
    #[must_use]
    pub fn with_page_limit(mut self, page_limit: u64) -> Self {
        if page_limit > 0 {
            self.page_limit = page_limit;
        }
        self
    }
}

impl std::fmt::Display for SyncConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "page limit: {}, pending window: {}ms, account transaction limit: {}",
            self.page_limit, self.pending_window_ms, self.account_tx_limit
        )
    }
}

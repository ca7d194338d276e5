//! Sync configuration.

use std::time::Duration;

/// Configuration for reconciliation runs.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Fixed page size of the remote list endpoints.
    ///
    /// A page shorter than this ends pagination.
    pub page_size: usize,

    /// Maximum pages fetched in one run before giving up.
    ///
    /// Bounds memory if the remote keeps returning full pages.
    pub max_pages: usize,

    /// Timeout for each individual page fetch.
    pub fetch_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: 20,
            max_pages: 500,
            fetch_timeout: Duration::from_secs(30),
        }
    }
}

impl SyncConfig {
    /// Create a config with a custom page size.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            page_size,
            ..Default::default()
        }
    }

    /// Set the page limit.
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Set the per-page timeout.
    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }
}

use std::sync::Arc;

use crate::logging::LogContext;
use crate::models::{is_valid_address, Transaction};
use crate::store::Store;

/// Entry points exposed to clients. Invalid addresses are answered with
/// `false` or an empty list, never an error.
#[derive(Debug, Clone)]
pub struct QueryFacade {
    store: Arc<Store>,
}

impl QueryFacade {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Last block height stored by the tracker, 0 before the first pass
    pub fn get_current_block(&self) -> u64 {
        self.store.get_latest_block()
    }

    /// Subscribe `address` for indexing from the next pass onward. Returns
    /// `true` for a valid address, whether or not it was already subscribed.
    pub fn subscribe(&self, address: &str) -> bool {
        if !is_valid_address(address) {
            LogContext::new("facade", "subscribe")
                .with_address(address)
                .debug("Rejected invalid address");
            return false;
        }

        self.store.add_subscriber(address);
        LogContext::new("facade", "subscribe")
            .with_address(address)
            .info("Address subscribed");
        true
    }

    pub fn get_transactions(&self, address: &str) -> Vec<Transaction> {
        if !is_valid_address(address) {
            return Vec::new();
        }
        self.store.get_transactions_by_address(address)
    }
}

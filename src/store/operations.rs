use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::models::Transaction;

/// Per-address transactions produced by one indexing pass
pub type TransactionDelta = HashMap<String, Vec<Transaction>>;

/// Subscriber set and transaction index. Always locked together so that a
/// membership test and the matching index update see the same state.
#[derive(Debug, Default)]
struct Index {
    subscribers: HashSet<String>,
    transactions: HashMap<String, Vec<Transaction>>,
}

/// In-memory repository shared by the tracker and the query handlers.
///
/// Every read returns an owned copy; nothing hands out references into the
/// guarded maps.
#[derive(Debug, Default)]
pub struct Store {
    latest_block: AtomicU64,
    index: RwLock<Index>,
    /// Maximum transactions kept per address, 0 = unbounded
    history_limit: usize,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that keeps only the most recent `limit` transactions
    /// for each address. A limit of 0 keeps everything.
    pub fn with_history_limit(limit: usize) -> Self {
        Self {
            history_limit: limit,
            ..Self::default()
        }
    }

    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    // Mutations never leave the index half-updated, so a poisoned lock still
    // guards consistent data.
    fn read_index(&self) -> RwLockReadGuard<'_, Index> {
        self.index.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_index(&self) -> RwLockWriteGuard<'_, Index> {
        self.index.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Most recently stored block height, 0 before the first successful pass
    pub fn get_latest_block(&self) -> u64 {
        self.latest_block.load(Ordering::Acquire)
    }

    /// Overwrite the stored height. No ordering check is applied here.
    pub fn set_latest_block(&self, height: u64) {
        self.latest_block.store(height, Ordering::Release);
    }

    /// Register an address. Re-adding an existing subscriber keeps its history.
    pub fn add_subscriber(&self, address: &str) {
        let mut index = self.write_index();
        if index.subscribers.insert(address.to_string()) {
            index
                .transactions
                .entry(address.to_string())
                .or_default();
        }
    }

    pub fn get_subscriber_addresses(&self) -> HashSet<String> {
        self.read_index().subscribers.clone()
    }

    pub fn is_subscribed(&self, address: &str) -> bool {
        self.read_index().subscribers.contains(address)
    }

    pub fn subscriber_count(&self) -> usize {
        self.read_index().subscribers.len()
    }

    /// History for `address` in observation order, empty if none exists
    pub fn get_transactions_by_address(&self, address: &str) -> Vec<Transaction> {
        self.read_index()
            .transactions
            .get(address)
            .cloned()
            .unwrap_or_default()
    }

    /// Total number of indexed entries across all addresses
    pub fn transaction_count(&self) -> usize {
        self.read_index()
            .transactions
            .values()
            .map(Vec::len)
            .sum()
    }

    /// Append each address's transactions to its existing history.
    ///
    /// The whole delta is applied under a single write lock, so readers see
    /// either none or all of it.
    pub fn save_transactions(&self, delta: TransactionDelta) {
        if delta.is_empty() {
            return;
        }

        let mut index = self.write_index();
        for (address, transactions) in delta {
            let history = index.transactions.entry(address).or_default();
            history.extend(transactions);

            if self.history_limit > 0 && history.len() > self.history_limit {
                let excess = history.len() - self.history_limit;
                history.drain(..excess);
            }
        }
    }
}

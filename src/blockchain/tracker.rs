use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use log::{debug, info};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::blockchain::RpcClient;
use crate::config::AppConfig;
use crate::error::RpcError;
use crate::logging::{ErrorLogger, LogContext, MetricsLogger, PerformanceMonitor};
use crate::models::{Block, Transaction};
use crate::retry::{RetryConfig, RetryManager};
use crate::store::{Store, TransactionDelta};

/// Lifecycle of the polling loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Idle,
    Polling,
    Stopped,
}

impl TrackerState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => TrackerState::Polling,
            2 => TrackerState::Stopped,
            _ => TrackerState::Idle,
        }
    }
}

/// What one indexing pass did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// Height stored and matching transactions merged into the index
    Indexed { block_number: u64, matched: usize },
    /// Height stored; nobody is subscribed so filtering was skipped
    NoSubscribers { block_number: u64 },
    /// The node reported a block at or below the last indexed height
    AlreadyIndexed { block_number: u64 },
    /// Another pass was in flight, or the tracker has stopped
    Skipped,
}

/// Resets the in-flight flag when a pass ends, however it ends
struct PassGuard<'a>(&'a AtomicBool);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Polls the node on a fixed interval and folds each new block into the store
pub struct Tracker {
    rpc_client: RpcClient,
    store: Arc<Store>,
    poll_interval: Duration,
    retry: RetryManager,
    pass_in_flight: AtomicBool,
    state: AtomicU8,
    last_indexed: Mutex<Option<u64>>,
}

impl Tracker {
    pub fn new(
        rpc_client: RpcClient,
        store: Arc<Store>,
        poll_interval: Duration,
        retry_config: RetryConfig,
    ) -> Self {
        Self {
            rpc_client,
            store,
            poll_interval,
            retry: RetryManager::new("fetch_latest_block", retry_config),
            pass_in_flight: AtomicBool::new(false),
            state: AtomicU8::new(TrackerState::Idle as u8),
            last_indexed: Mutex::new(None),
        }
    }

    pub fn from_config(rpc_client: RpcClient, store: Arc<Store>, config: &AppConfig) -> Self {
        Self::new(
            rpc_client,
            store,
            Duration::from_secs(config.tracker.poll_interval_seconds),
            RetryConfig::from_rpc_config(&config.rpc),
        )
    }

    pub fn state(&self) -> TrackerState {
        TrackerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: TrackerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Run the polling loop until `cancel` fires.
    ///
    /// A pass that has already started is allowed to finish; no new pass is
    /// started once cancellation has been observed.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            "Starting tracker with {}s polling interval against {}",
            self.poll_interval.as_secs_f64(),
            self.rpc_client.endpoint()
        );

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match self.run_pass(&cancel).await {
                        Ok(outcome) => debug!("Indexing pass finished: {:?}", outcome),
                        Err(e) => ErrorLogger::log_pass_failure(&e),
                    }
                }
            }
        }

        self.set_state(TrackerState::Stopped);
        info!("Tracker stopped");
    }

    /// Execute one fetch-decode-filter-store cycle.
    ///
    /// On error the store is left exactly as it was.
    pub async fn run_pass(&self, cancel: &CancellationToken) -> Result<PassOutcome, RpcError> {
        if self.state() == TrackerState::Stopped {
            return Ok(PassOutcome::Skipped);
        }

        if self
            .pass_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Previous indexing pass still running, skipping tick");
            return Ok(PassOutcome::Skipped);
        }
        let _guard = PassGuard(&self.pass_in_flight);

        self.set_state(TrackerState::Polling);
        let result = self.fetch_and_index(cancel).await;
        if self.state() == TrackerState::Polling {
            self.set_state(TrackerState::Idle);
        }
        result
    }

    async fn fetch_and_index(&self, cancel: &CancellationToken) -> Result<PassOutcome, RpcError> {
        let monitor = PerformanceMonitor::new("indexing_pass");
        let block = self
            .retry
            .execute(cancel, || self.rpc_client.fetch_latest_block())
            .await?;

        let block_number = block.number;
        let transaction_count = block.transactions.len();
        let outcome = self.index_block(block);

        if let PassOutcome::Indexed { matched, .. } = outcome {
            MetricsLogger::log_block_indexed(block_number, transaction_count, matched, monitor.elapsed_ms());
        }

        Ok(outcome)
    }

    fn index_block(&self, block: Block) -> PassOutcome {
        let block_number = block.number;

        {
            let mut last_indexed = self.last_indexed.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(last) = *last_indexed {
                if block_number <= last {
                    LogContext::new("tracker", "index_block")
                        .with_block_number(block_number)
                        .with_metadata("last_indexed", serde_json::json!(last))
                        .debug("Block already indexed");
                    return PassOutcome::AlreadyIndexed { block_number };
                }
            }
            *last_indexed = Some(block_number);
        }

        self.store.set_latest_block(block_number);

        let subscribers = self.store.get_subscriber_addresses();
        if subscribers.is_empty() {
            debug!("No subscribers, skipping transaction filtering for block {}", block_number);
            return PassOutcome::NoSubscribers { block_number };
        }

        let delta = filter_transactions(&subscribers, block.transactions);
        let matched = delta.values().map(Vec::len).sum();
        self.store.save_transactions(delta);

        PassOutcome::Indexed { block_number, matched }
    }
}

/// Group `transactions` under every subscribed sender and receiver, keeping
/// block order. A self-transfer is recorded once.
pub fn filter_transactions(subscribers: &HashSet<String>, transactions: Vec<Transaction>) -> TransactionDelta {
    let mut delta = TransactionDelta::new();

    for tx in transactions {
        let from_matches = subscribers.contains(&tx.from);
        let to_matches = !tx.to.is_empty() && tx.to != tx.from && subscribers.contains(&tx.to);

        for (address, matches) in [(&tx.from, from_matches), (&tx.to, to_matches)] {
            if matches {
                LogContext::new("tracker", "filter_transactions")
                    .with_address(address)
                    .with_transaction_hash(&tx.hash)
                    .debug("Matched subscribed address");
                delta.entry(address.clone()).or_default().push(tx.clone());
            }
        }
    }

    delta
}

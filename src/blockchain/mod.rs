pub mod rpc_client;
pub mod tracker;

pub use rpc_client::{parse_hex_to_u64, RpcClient};
pub use tracker::{filter_transactions, PassOutcome, Tracker, TrackerState};

use serde::{Deserialize, Serialize};

/// A transaction as routed by the tracker: only the fields needed to index
/// it under its sender and receiver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    pub hash: String,
    pub from: String,
    /// Empty for contract-creation transactions
    pub to: String,
}

impl Transaction {
    pub fn new(hash: impl Into<String>, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            from: from.into(),
            to: to.into(),
        }
    }
}

/// A decoded block. Consumed by one indexing pass and then dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub number: u64,
    pub transactions: Vec<Transaction>,
}

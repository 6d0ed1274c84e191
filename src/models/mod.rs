pub mod transaction;
pub mod address;

pub use transaction::{Block, Transaction};
pub use address::is_valid_address;

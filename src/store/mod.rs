pub mod operations;


pub use operations::{Store, TransactionDelta};

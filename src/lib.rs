//! mergerfs-balance: balances file-level storage utilization across the member drives of a
//! mergerfs pool by moving files from over-full to under-full members.

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod glob;
pub mod logging;
pub mod pool;
pub mod size;
pub mod transfer;
pub mod types;
pub mod walker;

pub use coordinator::{BalanceOutcome, Coordinator};
pub use error::BalanceError;

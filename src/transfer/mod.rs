//! Transfer layer: a single file move (worker) and bounded concurrency over many (pool).

pub mod pool;
pub mod worker;

pub use pool::TransferPool;
pub use worker::TransferWorker;

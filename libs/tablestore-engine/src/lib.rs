pub mod config;
pub mod error;
pub mod iterator;
pub mod retry;

pub use config::ClientConfig;
pub use error::EngineError;
pub use iterator::{PageOutcome, RangeIterator, RangeIteratorParameter};
pub use retry::{Operation, RetryPolicy, RetryState, RetryStrategy, execute, execute_async};

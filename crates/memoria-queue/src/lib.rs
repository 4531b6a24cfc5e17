//! The durable FIFO-per-document work queue.

pub mod error;
pub mod queue;
pub mod retry;

pub use error::{QueueError, Result};
pub use queue::{InMemoryQueue, LeaseToken, Message, NackOutcome, Queue};
pub use retry::{RetryConfig, RetryPolicy};

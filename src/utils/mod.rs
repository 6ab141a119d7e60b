pub mod retry;

pub use retry::{retry_transient, IsTransient, RetryConfig};

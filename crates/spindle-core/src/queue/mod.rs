//! Queue module: admission ordering, retry backoff and terminal history.

mod admission;
mod history;
mod retry;

pub use admission::AdmissionQueue;
pub use history::TaskHistory;
pub use retry::RetryPolicy;

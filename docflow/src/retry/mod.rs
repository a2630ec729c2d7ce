//! Retry executor for remote calls.
//!
//! Every remote call in the pipeline goes through [`RetryExecutor::execute`]
//! with an immutable [`RetryPolicy`]. Failures are classified with the
//! policy's classifier; transient ones consume a bounded exponential
//! schedule, everything else fails immediately.

mod executor;
mod policy;

pub use executor::{RetryExecutor, Sleeper, TokioSleeper};
pub use policy::{Classifier, JitterStrategy, RetryPolicy};

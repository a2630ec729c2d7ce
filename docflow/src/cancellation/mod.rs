//! Cooperative cancellation for document runs.
//!
//! The engine checks a [`CancellationToken`] at every stage boundary. A
//! cancelled run stops before the next stage and unwinds any resources it
//! has already created.

mod token;

pub use token::{CancelCallback, CancellationToken};

//! Infrastructure shared by the clients and the orchestrator
//!
//! - Error taxonomy (chain, signature, KYC rejection, run errors)
//! - Bounded retry for read-only chain calls

mod error;
mod retry;

pub use error::*;
pub use retry::{Retry, RetryConfig, RetryResult};

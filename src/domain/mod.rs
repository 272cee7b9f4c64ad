//! Domain models for the purchase orchestrator
//!
//! Attestations, receipts and the purchase state machine stages.

mod attestation;
mod purchase;
mod types;

pub use attestation::*;
pub use purchase::*;
pub use types::*;

//! Cryptographic utilities for KYC attestations
//!
//! Provides:
//! - EIP-712 typed-data payloads bound to the verifier's domain
//! - Schema checks against the verifier's expected `KYC` type
//! - Attestation signing with a local key or a node-managed account

mod signer;
mod typed_data;

pub use signer::*;
pub use typed_data::*;

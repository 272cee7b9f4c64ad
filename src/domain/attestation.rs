//! KYC attestation issued off-chain and consumed by the verifier contract.

use alloy::primitives::{Address, Bytes};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Length of an ECDSA signature in `r || s || v` form
pub const SIGNATURE_LENGTH: usize = 65;

/// Signed claim binding a subject address to an issuance time.
///
/// Produced once by the signature builder and handed to the verifier client;
/// there are no mutators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    subject: Address,
    issued_at: u64,
    signature: Bytes,
}

impl Attestation {
    pub fn new(subject: Address, issued_at: u64, signature: Bytes) -> Self {
        Self {
            subject,
            issued_at,
            signature,
        }
    }

    pub fn subject(&self) -> Address {
        self.subject
    }

    /// Unix timestamp (seconds) the attestation was issued at
    pub fn issued_at(&self) -> u64 {
        self.issued_at
    }

    pub fn signature(&self) -> &Bytes {
        &self.signature
    }

    pub fn issued_at_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.issued_at as i64, 0).single()
    }

    /// Seconds elapsed between issuance and `now`; zero if issued in the future
    pub fn age_secs(&self, now: u64) -> u64 {
        now.saturating_sub(self.issued_at)
    }
}

/// Current wall-clock time as unix seconds.
pub fn unix_now() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

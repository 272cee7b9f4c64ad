//! Error types for the purchase orchestrator

use alloy::primitives::B256;
use thiserror::Error;

use crate::contracts::RevertReason;
use crate::domain::PurchaseStage;

/// Errors raised by a single contract interaction.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChainError {
    /// The node or the mined transaction reported a revert with decodable data
    #[error("execution reverted: {0}")]
    Reverted(RevertReason),

    /// Mined with a failed status and no revert payload available
    #[error("transaction {0} failed on-chain")]
    Failed(B256),

    /// Mined with a failed status; the reason came from replaying the call
    #[error("transaction {tx_hash} reverted: {reason}")]
    RevertedOnChain { tx_hash: B256, reason: RevertReason },

    /// Network or RPC transport failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Submitted but confirmation could not be observed
    #[error("confirmation failed: {0}")]
    Confirmation(String),

    /// Any other contract call failure (decoding, provider setup)
    #[error("contract call failed: {0}")]
    Call(String),
}

impl ChainError {
    /// Transport failures are the only kind worth retrying for read-only calls.
    pub fn is_transient(&self) -> bool {
        matches!(self, ChainError::Transport(_))
    }

    pub fn revert_reason(&self) -> Option<&RevertReason> {
        match self {
            ChainError::Reverted(reason) | ChainError::RevertedOnChain { reason, .. } => {
                Some(reason)
            }
            _ => None,
        }
    }
}

/// Errors building or signing the typed-data attestation payload.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SignatureError {
    /// Local type declaration differs from the verifier's expected schema
    #[error("typed-data schema mismatch: expected `{expected}`, got `{actual}`")]
    SchemaMismatch { expected: String, actual: String },

    /// Local type hash differs from the verifier's on-chain KYC_TYPEHASH
    #[error("type hash mismatch: verifier has {on_chain}, local payload has {local}")]
    TypeHashMismatch { on_chain: B256, local: B256 },

    /// Verifier's EIP-712 domain differs from the configured one
    #[error("domain mismatch on `{field}`: verifier has `{on_chain}`, configured `{local}`")]
    DomainMismatch {
        field: &'static str,
        on_chain: String,
        local: String,
    },

    #[error("signer unavailable: {0}")]
    SignerUnavailable(String),

    #[error("signing failed: {0}")]
    SigningFailed(String),

    #[error("invalid signature length: expected 65 bytes, got {0}")]
    InvalidLength(usize),
}

/// The distinguishable ways the KYC verifier can reject an attestation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KycRejection {
    #[error("invalid signature ({0})")]
    InvalidSignature(RevertReason),

    #[error("stale attestation ({0})")]
    StaleAttestation(RevertReason),

    #[error("signer is not the authorized issuer ({0})")]
    WrongSigner(RevertReason),

    #[error("rejected: {0}")]
    Other(RevertReason),
}

/// Errors that abort a purchase run.
#[derive(Error, Debug)]
pub enum PurchaseError {
    /// Missing or invalid configuration; raised before any transaction
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("signature error: {0}")]
    Signature(#[from] SignatureError),

    #[error("KYC verification rejected: {0}")]
    KycRejected(KycRejection),

    #[error("approval rejected: {0}")]
    ApprovalRejected(RevertReason),

    /// Post-mint read-back did not match what was minted
    #[error("mint verification failed: {0}")]
    MintVerification(String),

    /// A contract interaction failed at the given stage
    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: PurchaseStage,
        #[source]
        source: ChainError,
    },

    #[error("invalid state transition: {from} -> {to}")]
    InvalidStateTransition {
        from: PurchaseStage,
        to: PurchaseStage,
    },

    #[error(transparent)]
    Chain(#[from] ChainError),
}

impl PurchaseError {
    pub fn stage(stage: PurchaseStage, source: ChainError) -> Self {
        PurchaseError::Stage { stage, source }
    }
}

/// Result type for orchestrator operations
pub type Result<T> = std::result::Result<T, PurchaseError>;

/// Result type for single contract interactions
pub type ChainResult<T> = std::result::Result<T, ChainError>;

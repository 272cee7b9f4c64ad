//! Gbese Purchase Orchestrator
//!
//! Drives a KYC-gated, token-priced NFT purchase across three deployed
//! contracts: the `GbeseArts` NFT, the ERC-20 payment token and an EIP-712
//! KYC attestation verifier.
//!
//! ## Modules
//!
//! - [`domain`] - Receipts, attestations, purchase stages and snapshots
//! - [`contracts`] - Contract interfaces, alloy clients and revert decoding
//! - [`crypto`] - EIP-712 typed data and attestation signing
//! - [`kyc`] - KYC verifier client and rejection classification
//! - [`token`] - Payment token client and approval policy
//! - [`orchestrator`] - The purchase state machine
//! - [`runner`] - Builds an orchestrator from configuration
//! - [`config`] - Environment-driven configuration
//! - [`infra`] - Error types and retry for read-only calls
//! - [`telemetry`] - Logging and OpenTelemetry integration

pub mod config;
pub mod contracts;
pub mod crypto;
pub mod domain;
pub mod infra;
pub mod kyc;
pub mod orchestrator;
pub mod runner;
pub mod telemetry;
pub mod token;

// Re-export commonly used types
pub use config::{MintFailurePolicy, OrchestratorConfig, RunSettings, SignerMode};
pub use contracts::{KycVerifier, NftContract, PaymentToken, RevertReason};
pub use domain::{
    Attestation, ContractAddresses, MintReceipt, Participants, PurchaseReceipt, PurchaseStage,
    PurchaseState, TokenAmount, TxReceipt,
};
pub use infra::{ChainError, KycRejection, PurchaseError, Result, SignatureError};
pub use orchestrator::{
    KycOutcome, LinkOutcome, MintOutcome, PurchaseOrchestrator, PurchaseOutcome, RunReport,
    StageRecord, StageStatus,
};
pub use token::{AllowanceStrategy, Approval};

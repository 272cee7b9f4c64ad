//! Core type definitions shared by the contract clients and the orchestrator.

use alloy::primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Payment token amount (raw units, no decimal scaling)
pub type TokenAmount = U256;

/// Confirmation of an on-chain state transition.
///
/// Only produced for transactions that were mined; a transaction that fails
/// before or during inclusion surfaces as a [`crate::infra::ChainError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    /// Transaction hash
    pub tx_hash: B256,
    /// Block the transaction was included in, if the node reported it
    pub block_number: Option<u64>,
    /// Execution status from the receipt
    pub success: bool,
}

impl TxReceipt {
    pub fn new(tx_hash: B256, block_number: Option<u64>, success: bool) -> Self {
        Self {
            tx_hash,
            block_number,
            success,
        }
    }
}

impl fmt::Display for TxReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.block_number {
            Some(block) => write!(f, "{} (block {})", self.tx_hash, block),
            None => write!(f, "{}", self.tx_hash),
        }
    }
}

/// Receipt for a privileged mint, with the token id decoded from the
/// ERC-721 `Transfer` log when one was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintReceipt {
    pub receipt: TxReceipt,
    pub token_id: Option<U256>,
}

/// Receipt for a successful purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseReceipt {
    pub receipt: TxReceipt,
    /// Token id transferred/minted to the buyer, if decodable from the logs
    pub token_id: Option<U256>,
    /// Index from the payment token's `TransferLogged` event
    pub transfer_index: Option<U256>,
}

/// The three deployed contracts a run operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractAddresses {
    pub nft: Address,
    pub token: Address,
    pub kyc_verifier: Address,
}

/// Run participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participants {
    /// Contract owner; sends link and mint transactions
    pub owner: Address,
    /// Buyer; holds payment tokens, approves and purchases
    pub buyer: Address,
    /// Recipient of the privileged mint
    pub mint_recipient: Address,
}

//! RPC connection settings and the error/receipt plumbing shared by the
//! alloy-backed contract clients.

use std::time::Duration;

use alloy::network::EthereumWallet;
use alloy::primitives::{Address, B256};
use alloy::providers::PendingTransactionError;
use alloy::rpc::types::TransactionReceipt;
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::http::reqwest::Url;
use alloy::transports::{RpcError, TransportErrorKind};

use super::RevertReason;
use crate::domain::TxReceipt;
use crate::infra::ChainError;

/// An HTTP RPC endpoint plus the account that signs transactions sent through it.
#[derive(Clone)]
pub struct ChainConnection {
    rpc_url: Url,
    wallet: EthereumWallet,
    from: Address,
    confirmations: u64,
    confirmation_timeout: Option<Duration>,
}

impl std::fmt::Debug for ChainConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainConnection")
            .field("rpc_url", &self.rpc_url.as_str())
            .field("from", &self.from)
            .field("confirmations", &self.confirmations)
            .finish_non_exhaustive()
    }
}

impl ChainConnection {
    pub fn new(rpc_url: &str, signer: PrivateKeySigner) -> Result<Self, ChainError> {
        let rpc_url: Url = rpc_url
            .parse()
            .map_err(|e| ChainError::Call(format!("Invalid RPC URL: {}", e)))?;
        let from = signer.address();

        Ok(Self {
            rpc_url,
            wallet: EthereumWallet::from(signer),
            from,
            confirmations: 1,
            confirmation_timeout: Some(Duration::from_secs(120)),
        })
    }

    /// Number of block confirmations to wait for per transaction
    pub fn with_confirmations(mut self, confirmations: u64) -> Self {
        self.confirmations = confirmations.max(1);
        self
    }

    pub fn with_confirmation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    /// Account transactions are sent from
    pub fn from(&self) -> Address {
        self.from
    }

    pub fn rpc_url(&self) -> &Url {
        &self.rpc_url
    }

    pub fn wallet(&self) -> &EthereumWallet {
        &self.wallet
    }

    pub fn confirmations(&self) -> u64 {
        self.confirmations
    }

    pub fn confirmation_timeout(&self) -> Option<Duration> {
        self.confirmation_timeout
    }
}

/// Provider with nonce/gas/chain-id fillers and the connection's wallet.
macro_rules! signing_provider {
    ($conn:expr) => {
        ::alloy::providers::ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet($conn.wallet().clone())
            .on_http($conn.rpc_url().clone())
    };
}

/// Read-only provider.
macro_rules! read_provider {
    ($conn:expr) => {
        ::alloy::providers::ProviderBuilder::new().on_http($conn.rpc_url().clone())
    };
}

/// Send a prepared call and wait for its receipt, whatever its status. Must be
/// used inside a function returning `ChainResult`.
macro_rules! send_and_wait {
    ($conn:expr, $call:expr, $label:expr) => {{
        let pending = $call
            .send()
            .await
            .map_err($crate::contracts::connection::map_contract_error)?;

        ::tracing::info!(
            tx_hash = %pending.tx_hash(),
            from = %$conn.from(),
            "{} transaction sent",
            $label
        );

        let receipt = pending
            .with_required_confirmations($conn.confirmations())
            .with_timeout($conn.confirmation_timeout())
            .get_receipt()
            .await
            .map_err($crate::contracts::connection::map_pending_error)?;

        receipt
    }};
}

/// [`send_and_wait!`] that evaluates to the receipt only when it succeeded.
macro_rules! send_and_confirm {
    ($conn:expr, $call:expr, $label:expr) => {{
        let receipt = $crate::contracts::connection::send_and_wait!($conn, $call, $label);
        $crate::contracts::connection::ensure_success(receipt)?
    }};
}

pub(crate) use read_provider;
pub(crate) use send_and_confirm;
pub(crate) use send_and_wait;
pub(crate) use signing_provider;

/// Map a contract call error, extracting revert data when the node returned it.
pub(crate) fn map_contract_error(err: alloy::contract::Error) -> ChainError {
    match err {
        alloy::contract::Error::TransportError(rpc) => map_rpc_error(rpc),
        other => ChainError::Call(other.to_string()),
    }
}

pub(crate) fn map_pending_error(err: PendingTransactionError) -> ChainError {
    match err {
        PendingTransactionError::TransportError(rpc) => map_rpc_error(rpc),
        other => ChainError::Confirmation(other.to_string()),
    }
}

fn map_rpc_error(err: RpcError<TransportErrorKind>) -> ChainError {
    if let Some(payload) = err.as_error_resp() {
        if let Some(data) = payload.as_revert_data() {
            return ChainError::Reverted(RevertReason::decode(&data));
        }
        // Some nodes only put the reason in the message
        if payload.message.contains("revert") {
            return ChainError::Reverted(RevertReason::from_message(&payload.message));
        }
        return ChainError::Call(payload.to_string());
    }

    match err {
        RpcError::Transport(kind) => ChainError::Transport(kind.to_string()),
        other => ChainError::Call(other.to_string()),
    }
}

/// Reject mined-but-failed receipts.
pub(crate) fn ensure_success(receipt: TransactionReceipt) -> Result<TransactionReceipt, ChainError> {
    if receipt.status() {
        Ok(receipt)
    } else {
        Err(ChainError::Failed(receipt.transaction_hash))
    }
}

/// Error for a mined-but-failed transaction, given the result of replaying
/// it as a call against the block it was mined in.
///
/// Only a replay that reverts with data yields a reason; anything else keeps
/// the bare failure. The transaction hash is kept either way.
pub(crate) fn replayed_failure(tx_hash: B256, replay: Result<(), ChainError>) -> ChainError {
    match replay {
        Err(ChainError::Reverted(reason)) if reason != RevertReason::Empty => {
            ChainError::RevertedOnChain { tx_hash, reason }
        }
        Err(other) => {
            tracing::warn!(
                tx_hash = %tx_hash,
                error = %other,
                "Replay did not yield a revert reason"
            );
            ChainError::Failed(tx_hash)
        }
        _ => {
            tracing::warn!(tx_hash = %tx_hash, "Replay of failed transaction succeeded");
            ChainError::Failed(tx_hash)
        }
    }
}

pub(crate) fn to_tx_receipt(receipt: &TransactionReceipt) -> TxReceipt {
    TxReceipt::new(
        receipt.transaction_hash,
        receipt.block_number,
        receipt.status(),
    )
}

//! Payment token client and approval policy.

use std::fmt;
use std::str::FromStr;

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::contracts::PaymentToken;
use crate::domain::{PurchaseStage, PurchaseState, TokenAmount, TxReceipt};
use crate::infra::{ChainError, ChainResult, PurchaseError, Result};

/// How an insufficient allowance is raised to the price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllowanceStrategy {
    /// Approve the new amount directly. Only safe with a single purchaser:
    /// a spender watching the mempool can use the old and the new allowance.
    #[default]
    Direct,
    /// Approve zero first when a non-zero allowance exists, then the new amount.
    ResetThenApprove,
}

impl FromStr for AllowanceStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "direct" => Ok(AllowanceStrategy::Direct),
            "reset" | "reset_then_approve" | "reset-then-approve" => {
                Ok(AllowanceStrategy::ResetThenApprove)
            }
            other => Err(format!("unknown allowance strategy: {other}")),
        }
    }
}

impl fmt::Display for AllowanceStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllowanceStrategy::Direct => f.write_str("direct"),
            AllowanceStrategy::ResetThenApprove => f.write_str("reset_then_approve"),
        }
    }
}

/// Approval transactions submitted to cover a price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    pub spender: Address,
    pub amount: TokenAmount,
    pub receipt: TxReceipt,
    /// Zero-approval sent first under [`AllowanceStrategy::ResetThenApprove`]
    pub reset_receipt: Option<TxReceipt>,
}

#[derive(Debug, Clone)]
pub struct TokenClient<T> {
    token: T,
    strategy: AllowanceStrategy,
}

impl<T: PaymentToken> TokenClient<T> {
    pub fn new(token: T) -> Self {
        Self {
            token,
            strategy: AllowanceStrategy::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: AllowanceStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn address(&self) -> Address {
        self.token.address()
    }

    pub fn strategy(&self) -> AllowanceStrategy {
        self.strategy
    }

    pub async fn get_balance(&self, holder: Address) -> ChainResult<TokenAmount> {
        self.token.balance_of(holder).await
    }

    pub async fn get_allowance(&self, holder: Address, spender: Address) -> ChainResult<TokenAmount> {
        self.token.allowance(holder, spender).await
    }

    /// Submit an approval and wait for confirmation.
    pub async fn approve(&self, spender: Address, amount: TokenAmount) -> Result<TxReceipt> {
        match self.token.approve(spender, amount).await {
            Ok(receipt) => Ok(receipt),
            Err(ChainError::Reverted(reason)) => Err(PurchaseError::ApprovalRejected(reason)),
            Err(other) => Err(PurchaseError::stage(PurchaseStage::Approved, other)),
        }
    }

    /// Approve exactly `state.price` for `spender` if the snapshot allowance is short.
    ///
    /// Returns `None` when no transaction was needed.
    pub async fn ensure_allowance(
        &self,
        spender: Address,
        state: &PurchaseState,
    ) -> Result<Option<Approval>> {
        if !state.needs_approval() {
            info!(
                allowance = %state.buyer_allowance,
                price = %state.price,
                "Allowance covers price, no approval needed"
            );
            return Ok(None);
        }

        if !state.can_afford() {
            warn!(
                balance = %state.buyer_balance,
                price = %state.price,
                "Buyer balance below price, purchase is expected to revert"
            );
        }

        let reset_receipt = match self.strategy {
            AllowanceStrategy::ResetThenApprove if state.buyer_allowance > U256::ZERO => {
                info!(spender = %spender, "Resetting existing allowance to zero");
                Some(self.approve(spender, U256::ZERO).await?)
            }
            _ => None,
        };

        info!(spender = %spender, amount = %state.price, "Approving spender");
        let receipt = self.approve(spender, state.price).await?;

        Ok(Some(Approval {
            spender,
            amount: state.price,
            receipt,
            reset_receipt,
        }))
    }
}

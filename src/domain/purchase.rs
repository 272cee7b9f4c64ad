//! Purchase state machine stages and the pre-purchase snapshot.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::TokenAmount;

/// Stages of a purchase run, in the order they are reached.
///
/// `Approved` is optional: it is skipped when the buyer's allowance already
/// covers the price. `Purchased` and `Reverted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStage {
    Deployed,
    Linked,
    KycPending,
    KycVerified,
    Minted,
    PriceChecked,
    Approved,
    Purchased,
    Reverted,
}

impl PurchaseStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseStage::Deployed => "deployed",
            PurchaseStage::Linked => "linked",
            PurchaseStage::KycPending => "kyc_pending",
            PurchaseStage::KycVerified => "kyc_verified",
            PurchaseStage::Minted => "minted",
            PurchaseStage::PriceChecked => "price_checked",
            PurchaseStage::Approved => "approved",
            PurchaseStage::Purchased => "purchased",
            PurchaseStage::Reverted => "reverted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PurchaseStage::Purchased | PurchaseStage::Reverted)
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(&self, next: PurchaseStage) -> bool {
        use PurchaseStage::*;
        matches!(
            (self, next),
            (Deployed, Linked)
                | (Linked, KycPending)
                | (KycPending, KycVerified)
                | (KycVerified, Minted)
                | (Minted, PriceChecked)
                | (PriceChecked, Approved)
                | (PriceChecked, Purchased)
                | (PriceChecked, Reverted)
                | (Approved, Purchased)
                | (Approved, Reverted)
        )
    }
}

impl fmt::Display for PurchaseStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot read immediately before the approval decision.
///
/// Not stored anywhere; other actors can change any of these values between
/// the read and the purchase transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseState {
    pub price: TokenAmount,
    pub buyer_balance: TokenAmount,
    pub buyer_allowance: TokenAmount,
}

impl PurchaseState {
    /// Approval is requested only when the current allowance does not cover the price.
    pub fn needs_approval(&self) -> bool {
        self.buyer_allowance < self.price
    }

    pub fn can_afford(&self) -> bool {
        self.buyer_balance >= self.price
    }
}

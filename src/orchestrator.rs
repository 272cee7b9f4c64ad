//! Purchase orchestrator.
//!
//! Drives one run through the stages of [`PurchaseStage`]:
//!
//! ```text
//! Deployed -> Linked -> KycPending -> KycVerified -> Minted -> PriceChecked
//!                                                                  |
//!                                              (allowance < price) Approved
//!                                                                  |
//!                                                     Purchased | Reverted
//! ```
//!
//! Each stage waits for its transaction to be confirmed before the next one
//! starts. Nothing is atomic across contracts: KYC, allowance and balance can
//! change between the stage that checked them and the purchase, and the
//! purchase transaction is the final arbiter.

use alloy::primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn, Instrument};
use uuid::Uuid;

use crate::config::{MintFailurePolicy, RunSettings};
use crate::contracts::{KycVerifier, NftContract, PaymentToken, RevertReason, INTERFACE_VERSION};
use crate::crypto::SignatureBuilder;
use crate::domain::{
    unix_now, Attestation, ContractAddresses, Participants, PurchaseReceipt, PurchaseStage,
    PurchaseState, TxReceipt,
};
use crate::infra::{ChainError, PurchaseError, Result, Retry};
use crate::kyc::KycVerifierClient;
use crate::telemetry::{attributes, spans};
use crate::token::{Approval, TokenClient};

/// How a stage ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Completed,
    /// Already satisfied on-chain, no transaction sent
    Skipped,
    /// Failed but the run continued
    Failed,
}

/// One entry of the run history.
#[derive(Debug, Clone, Serialize)]
pub struct StageRecord {
    pub stage: PurchaseStage,
    pub status: StageStatus,
    pub tx_hash: Option<B256>,
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LinkOutcome {
    Linked { receipt: TxReceipt },
    AlreadyLinked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum KycOutcome {
    Verified {
        receipt: TxReceipt,
        issued_at: u64,
    },
    AlreadyVerified,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MintOutcome {
    Minted {
        receipt: TxReceipt,
        token_id: Option<U256>,
        recipient_balance: U256,
    },
    /// Recipient already held a token and reuse was enabled
    Reused { recipient_balance: U256 },
    /// Mint failed under [`MintFailurePolicy::Continue`]
    Failed { error: String },
}

/// Terminal result of the purchase transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PurchaseOutcome {
    Purchased { receipt: PurchaseReceipt },
    Reverted {
        reason: RevertReason,
        tx_hash: Option<B256>,
    },
}

impl PurchaseOutcome {
    pub fn is_purchased(&self) -> bool {
        matches!(self, PurchaseOutcome::Purchased { .. })
    }

    pub fn revert_reason(&self) -> Option<&RevertReason> {
        match self {
            PurchaseOutcome::Reverted { reason, .. } => Some(reason),
            PurchaseOutcome::Purchased { .. } => None,
        }
    }

    pub fn stage(&self) -> PurchaseStage {
        match self {
            PurchaseOutcome::Purchased { .. } => PurchaseStage::Purchased,
            PurchaseOutcome::Reverted { .. } => PurchaseStage::Reverted,
        }
    }
}

/// Everything a run did, in order.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    /// Contract interface descriptors the run was driven with
    pub interface_version: &'static str,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub contracts: ContractAddresses,
    pub participants: Participants,
    pub issuer: Address,
    pub link: LinkOutcome,
    pub kyc: KycOutcome,
    pub mint: MintOutcome,
    pub state: PurchaseState,
    pub approval: Option<Approval>,
    pub outcome: PurchaseOutcome,
    pub stages: Vec<StageRecord>,
}

/// Read-only view of the deployment, used by `status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub contracts: ContractAddresses,
    pub linked_token: Address,
    pub kyc_verified: bool,
    pub recipient_balance: U256,
    pub state: PurchaseState,
    pub approval_needed: bool,
}

pub struct PurchaseOrchestrator<N, T, K> {
    nft: N,
    token: TokenClient<T>,
    kyc: KycVerifierClient<K>,
    signatures: SignatureBuilder,
    settings: RunSettings,
    retry: Retry,
    stage: PurchaseStage,
    history: Vec<StageRecord>,
}

impl<N, T, K> PurchaseOrchestrator<N, T, K>
where
    N: NftContract,
    T: PaymentToken,
    K: KycVerifier,
{
    pub fn new(
        nft: N,
        token: TokenClient<T>,
        kyc: KycVerifierClient<K>,
        signatures: SignatureBuilder,
        settings: RunSettings,
    ) -> Self {
        let retry = Retry::new(settings.read_retry.clone());
        Self {
            nft,
            token,
            kyc,
            signatures,
            settings,
            retry,
            stage: PurchaseStage::Deployed,
            history: Vec::new(),
        }
    }

    pub fn stage(&self) -> PurchaseStage {
        self.stage
    }

    pub fn history(&self) -> &[StageRecord] {
        &self.history
    }

    pub fn contracts(&self) -> ContractAddresses {
        ContractAddresses {
            nft: self.nft.address(),
            token: self.token.address(),
            kyc_verifier: self.kyc.address(),
        }
    }

    fn ensure_can_enter(&self, next: PurchaseStage) -> Result<()> {
        if self.stage.can_transition_to(next) {
            Ok(())
        } else {
            Err(PurchaseError::InvalidStateTransition {
                from: self.stage,
                to: next,
            })
        }
    }

    fn advance(
        &mut self,
        next: PurchaseStage,
        status: StageStatus,
        tx_hash: Option<B256>,
        detail: Option<String>,
    ) -> Result<()> {
        self.ensure_can_enter(next)?;

        info!(
            from = %self.stage,
            to = %next,
            status = ?status,
            tx_hash = ?tx_hash,
            "Stage transition"
        );

        self.stage = next;
        self.history.push(StageRecord {
            stage: next,
            status,
            tx_hash,
            detail,
            at: Utc::now(),
        });
        Ok(())
    }

    /// Point the NFT at the payment token; skipped when already linked.
    #[instrument(skip(self), fields(nft = %self.nft.address()))]
    pub async fn link_token(&mut self) -> Result<LinkOutcome> {
        self.ensure_can_enter(PurchaseStage::Linked)?;
        let token = self.token.address();

        let current = self
            .retry
            .read("gbeseTokenAddress", || self.nft.token_contract())
            .await
            .map_err(|e| PurchaseError::stage(PurchaseStage::Linked, e))?;

        if current == token {
            info!(token = %token, "Token contract already linked");
            self.advance(PurchaseStage::Linked, StageStatus::Skipped, None, None)?;
            return Ok(LinkOutcome::AlreadyLinked);
        }

        let receipt = self
            .nft
            .set_token_contract(token)
            .await
            .map_err(|e| PurchaseError::stage(PurchaseStage::Linked, e))?;

        info!(token = %token, tx_hash = %receipt.tx_hash, "Token contract linked");
        self.advance(
            PurchaseStage::Linked,
            StageStatus::Completed,
            Some(receipt.tx_hash),
            None,
        )?;
        Ok(LinkOutcome::Linked { receipt })
    }

    /// Sign a fresh attestation for the NFT contract.
    #[instrument(skip(self))]
    pub async fn obtain_attestation(&mut self) -> Result<Attestation> {
        self.ensure_can_enter(PurchaseStage::KycPending)?;

        let subject = self.nft.address();
        let issued_at = unix_now();

        if self.settings.validate_schema_on_chain {
            let payload = self.signatures.build(subject, issued_at);
            self.kyc.check_schema(&payload).await?;
        }

        let attestation = self.signatures.attest(subject, issued_at).await?;
        self.advance(PurchaseStage::KycPending, StageStatus::Completed, None, None)?;
        Ok(attestation)
    }

    /// Get the NFT contract verified; skipped when the verifier already has it.
    #[instrument(skip(self), fields(verifier = %self.kyc.address()))]
    pub async fn verify_kyc(&mut self) -> Result<KycOutcome> {
        self.ensure_can_enter(PurchaseStage::KycPending)?;
        let subject = self.nft.address();

        let verified = self
            .retry
            .read("isVerified", || self.kyc.is_verified(subject))
            .await
            .map_err(|e| PurchaseError::stage(PurchaseStage::KycPending, e))?;

        if verified {
            info!(subject = %subject, "Subject already KYC verified, skipping attestation");
            self.advance(PurchaseStage::KycPending, StageStatus::Skipped, None, None)?;
            self.advance(PurchaseStage::KycVerified, StageStatus::Skipped, None, None)?;
            return Ok(KycOutcome::AlreadyVerified);
        }

        let attestation = self.obtain_attestation().await?;
        let receipt = self.kyc.submit_attestation(&attestation).await?;

        self.advance(
            PurchaseStage::KycVerified,
            StageStatus::Completed,
            Some(receipt.tx_hash),
            None,
        )?;
        Ok(KycOutcome::Verified {
            receipt,
            issued_at: attestation.issued_at(),
        })
    }

    /// Owner mints one token to the configured recipient and the result is read back.
    #[instrument(skip(self), fields(recipient = %self.settings.participants.mint_recipient))]
    pub async fn mint(&mut self) -> Result<MintOutcome> {
        self.ensure_can_enter(PurchaseStage::Minted)?;
        let recipient = self.settings.participants.mint_recipient;

        let before = self
            .retry
            .read("balanceOf", || self.nft.balance_of(recipient))
            .await
            .map_err(|e| PurchaseError::stage(PurchaseStage::Minted, e))?;

        if self.settings.reuse_existing_mint && before > U256::ZERO {
            info!(balance = %before, "Recipient already holds a token, reusing it");
            self.advance(
                PurchaseStage::Minted,
                StageStatus::Skipped,
                None,
                Some(format!("recipient holds {before}")),
            )?;
            return Ok(MintOutcome::Reused {
                recipient_balance: before,
            });
        }

        match self.mint_and_verify(recipient, before).await {
            Ok(outcome) => {
                let tx_hash = match &outcome {
                    MintOutcome::Minted { receipt, .. } => Some(receipt.tx_hash),
                    _ => None,
                };
                self.advance(PurchaseStage::Minted, StageStatus::Completed, tx_hash, None)?;
                Ok(outcome)
            }
            Err(err) => match self.settings.mint_failure_policy {
                MintFailurePolicy::Fatal => Err(err),
                MintFailurePolicy::Continue => {
                    warn!(error = %err, "Mint failed, continuing to purchase");
                    let error = err.to_string();
                    self.advance(
                        PurchaseStage::Minted,
                        StageStatus::Failed,
                        None,
                        Some(error.clone()),
                    )?;
                    Ok(MintOutcome::Failed { error })
                }
            },
        }
    }

    async fn mint_and_verify(&self, recipient: Address, before: U256) -> Result<MintOutcome> {
        let uri = self.settings.token_uri.as_str();

        let minted = self
            .nft
            .mint(recipient, uri)
            .await
            .map_err(|e| PurchaseError::stage(PurchaseStage::Minted, e))?;

        info!(
            tx_hash = %minted.receipt.tx_hash,
            token_id = ?minted.token_id,
            "Token minted"
        );

        let after = self
            .retry
            .read("balanceOf", || self.nft.balance_of(recipient))
            .await
            .map_err(|e| PurchaseError::stage(PurchaseStage::Minted, e))?;

        if after != before + U256::from(1) {
            return Err(PurchaseError::MintVerification(format!(
                "recipient balance went from {before} to {after}, expected one more"
            )));
        }

        if let Some(token_id) = minted.token_id {
            let stored = self
                .retry
                .read("tokenURI", || self.nft.token_uri(token_id))
                .await
                .map_err(|e| PurchaseError::stage(PurchaseStage::Minted, e))?;
            if stored != uri {
                return Err(PurchaseError::MintVerification(format!(
                    "token {token_id} has URI `{stored}`, expected `{uri}`"
                )));
            }
        } else {
            warn!("Mint receipt carried no Transfer log, URI not checked");
        }

        Ok(MintOutcome::Minted {
            receipt: minted.receipt,
            token_id: minted.token_id,
            recipient_balance: after,
        })
    }

    async fn read_state(&self) -> std::result::Result<PurchaseState, ChainError> {
        let buyer = self.settings.participants.buyer;
        let spender = self.nft.address();

        let price = self
            .retry
            .read("nftPriceInTokens", || self.nft.price_in_tokens())
            .await?;
        let buyer_balance = self
            .retry
            .read("token.balanceOf", || self.token.get_balance(buyer))
            .await?;
        let buyer_allowance = self
            .retry
            .read("token.allowance", || self.token.get_allowance(buyer, spender))
            .await?;

        Ok(PurchaseState {
            price,
            buyer_balance,
            buyer_allowance,
        })
    }

    /// Snapshot price, buyer balance and buyer allowance.
    #[instrument(skip(self))]
    pub async fn check_price(&mut self) -> Result<PurchaseState> {
        self.ensure_can_enter(PurchaseStage::PriceChecked)?;

        let state = self
            .read_state()
            .await
            .map_err(|e| PurchaseError::stage(PurchaseStage::PriceChecked, e))?;

        info!(
            price = %state.price,
            balance = %state.buyer_balance,
            allowance = %state.buyer_allowance,
            "Pre-purchase state"
        );

        self.advance(PurchaseStage::PriceChecked, StageStatus::Completed, None, None)?;
        Ok(state)
    }

    /// Approve exactly the price when the snapshot allowance is short.
    #[instrument(skip(self, state))]
    pub async fn approve_if_needed(&mut self, state: &PurchaseState) -> Result<Option<Approval>> {
        if self.stage != PurchaseStage::PriceChecked {
            return Err(PurchaseError::InvalidStateTransition {
                from: self.stage,
                to: PurchaseStage::Approved,
            });
        }

        let approval = self.token.ensure_allowance(self.nft.address(), state).await?;
        if let Some(approval) = &approval {
            self.advance(
                PurchaseStage::Approved,
                StageStatus::Completed,
                Some(approval.receipt.tx_hash),
                None,
            )?;
        }
        Ok(approval)
    }

    /// Submit the purchase; a revert becomes the run's terminal outcome.
    #[instrument(skip(self), fields(buyer = %self.settings.participants.buyer))]
    pub async fn purchase(&mut self) -> Result<PurchaseOutcome> {
        self.ensure_can_enter(PurchaseStage::Purchased)?;

        let outcome = match self.nft.purchase(&self.settings.token_uri).await {
            Ok(receipt) => {
                info!(
                    tx_hash = %receipt.receipt.tx_hash,
                    token_id = ?receipt.token_id,
                    transfer_index = ?receipt.transfer_index,
                    "Purchase succeeded"
                );
                PurchaseOutcome::Purchased { receipt }
            }
            Err(ChainError::Reverted(reason)) => {
                warn!(reason = %reason, "Purchase reverted");
                PurchaseOutcome::Reverted {
                    reason,
                    tx_hash: None,
                }
            }
            Err(ChainError::RevertedOnChain { tx_hash, reason }) => {
                warn!(tx_hash = %tx_hash, reason = %reason, "Purchase reverted on-chain");
                PurchaseOutcome::Reverted {
                    reason,
                    tx_hash: Some(tx_hash),
                }
            }
            Err(ChainError::Failed(tx_hash)) => {
                warn!(tx_hash = %tx_hash, "Purchase failed without revert data");
                PurchaseOutcome::Reverted {
                    reason: RevertReason::Empty,
                    tx_hash: Some(tx_hash),
                }
            }
            Err(other) => return Err(PurchaseError::stage(PurchaseStage::Purchased, other)),
        };

        let (status, tx_hash, detail) = match &outcome {
            PurchaseOutcome::Purchased { receipt } => {
                (StageStatus::Completed, Some(receipt.receipt.tx_hash), None)
            }
            PurchaseOutcome::Reverted { reason, tx_hash } => {
                (StageStatus::Completed, *tx_hash, Some(reason.to_string()))
            }
        };
        self.advance(outcome.stage(), status, tx_hash, detail)?;
        Ok(outcome)
    }

    /// Run every stage in order.
    pub async fn run(&mut self) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!(
            spans::PURCHASE_RUN,
            { attributes::RUN_ID } = %run_id,
            { attributes::CONTRACT } = %self.nft.address(),
        );
        self.run_stages(run_id).instrument(span).await
    }

    async fn run_stages(&mut self, run_id: Uuid) -> Result<RunReport> {
        let started_at = Utc::now();
        info!(
            { attributes::STAGE } = %self.stage,
            issuer = %self.signatures.issuer(),
            "Starting purchase run"
        );

        let link = self.link_token().await?;
        let kyc = self.verify_kyc().await?;
        let mint = self.mint().await?;
        let state = self.check_price().await?;
        let approval = self.approve_if_needed(&state).await?;
        let outcome = self.purchase().await?;

        info!(
            { attributes::STAGE } = %self.stage,
            purchased = outcome.is_purchased(),
            "Purchase run finished"
        );

        Ok(RunReport {
            run_id,
            interface_version: INTERFACE_VERSION,
            started_at,
            finished_at: Utc::now(),
            contracts: self.contracts(),
            participants: self.settings.participants,
            issuer: self.signatures.issuer(),
            link,
            kyc,
            mint,
            state,
            approval,
            outcome,
            stages: self.history.clone(),
        })
    }

    /// Read-only snapshot; sends no transactions.
    pub async fn status(&self) -> Result<StatusSnapshot> {
        let linked_token = self.retry.read("gbeseTokenAddress", || self.nft.token_contract()).await?;
        let subject = self.nft.address();
        let kyc_verified = self.retry.read("isVerified", || self.kyc.is_verified(subject)).await?;
        let recipient = self.settings.participants.mint_recipient;
        let recipient_balance = self
            .retry
            .read("balanceOf", || self.nft.balance_of(recipient))
            .await?;
        let state = self.read_state().await?;

        Ok(StatusSnapshot {
            contracts: self.contracts(),
            linked_token,
            kyc_verified,
            recipient_balance,
            approval_needed: state.needs_approval(),
            state,
        })
    }
}

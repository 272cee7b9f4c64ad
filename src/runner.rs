//! Wires an [`OrchestratorConfig`] to the alloy-backed contract clients.

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use alloy::signers::local::PrivateKeySigner;
use serde::Serialize;
use tracing::{info, warn, Instrument};

use crate::config::{OrchestratorConfig, SignerMode};
use crate::contracts::{
    AlloyKycVerifier, AlloyNftContract, AlloyPaymentToken, ChainConnection, KycVerifier,
};
use crate::crypto::{
    AttestationSigner, LocalKeySigner, NodeSigner, SignatureBuilder, TypedDataPayload,
};
use crate::domain::unix_now;
use crate::infra::{PurchaseError, Result};
use crate::kyc::KycVerifierClient;
use crate::orchestrator::{PurchaseOrchestrator, RunReport, StatusSnapshot};
use crate::telemetry::spans;
use crate::token::TokenClient;

pub type AlloyOrchestrator =
    PurchaseOrchestrator<AlloyNftContract, AlloyPaymentToken, AlloyKycVerifier>;

/// `status` output: the orchestrator snapshot plus token and issuer details.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    #[serde(flatten)]
    pub snapshot: StatusSnapshot,
    pub token_decimals: Option<u8>,
    pub transfer_index: Option<U256>,
    pub verifier_issuer: Option<Address>,
    pub configured_issuer: Address,
}

fn connection(config: &OrchestratorConfig, key: &PrivateKeySigner) -> Result<ChainConnection> {
    Ok(ChainConnection::new(&config.rpc_url, key.clone())?
        .with_confirmations(config.confirmations)
        .with_confirmation_timeout(Some(config.confirmation_timeout())))
}

fn attestation_signer(config: &OrchestratorConfig) -> Result<Arc<dyn AttestationSigner>> {
    match (config.signer_mode, &config.issuer_key) {
        (SignerMode::Local, Some(key)) => Ok(Arc::new(LocalKeySigner::new(key.clone()))),
        (SignerMode::Local, None) => Err(PurchaseError::Configuration(
            "local signer mode requires ISSUER_PRIVATE_KEY".to_string(),
        )),
        (SignerMode::Node, _) => Ok(Arc::new(NodeSigner::new(
            &config.rpc_url,
            config.issuer_address,
        )?)),
    }
}

pub fn signature_builder(config: &OrchestratorConfig) -> Result<SignatureBuilder> {
    Ok(SignatureBuilder::new(
        config.kyc_domain(),
        attestation_signer(config)?,
    ))
}

/// Build the clients for every contract. No RPC call is made.
pub fn connect(config: &OrchestratorConfig) -> Result<AlloyOrchestrator> {
    let owner = connection(config, &config.owner_key)?;
    let buyer = connection(config, &config.buyer_key)?;

    let nft = AlloyNftContract::new(
        config.contracts.nft,
        config.contracts.token,
        owner.clone(),
        buyer.clone(),
    );
    let token = TokenClient::new(AlloyPaymentToken::new(config.contracts.token, buyer))
        .with_strategy(config.allowance_strategy);
    let kyc = KycVerifierClient::new(AlloyKycVerifier::new(config.contracts.kyc_verifier, owner));

    Ok(PurchaseOrchestrator::new(
        nft,
        token,
        kyc,
        signature_builder(config)?,
        config.run_settings(),
    ))
}

/// Warn when the verifier's issuer is not the account that will sign.
///
/// The verifier is the only authority on signatures; a mismatch here only
/// predicts the rejection.
async fn check_issuer(verifier: &AlloyKycVerifier, configured: Address) -> Option<Address> {
    match verifier.issuer().await {
        Ok(on_chain) if on_chain != configured => {
            warn!(
                on_chain = %on_chain,
                configured = %configured,
                "Configured signer is not the verifier's issuer, KYC will be rejected"
            );
            Some(on_chain)
        }
        Ok(on_chain) => Some(on_chain),
        Err(e) => {
            warn!(error = %e, "Could not read verifier issuer");
            None
        }
    }
}

/// Execute a full purchase run.
pub async fn run(config: &OrchestratorConfig) -> Result<RunReport> {
    let mut orchestrator = connect(config)?;
    info!(config = ?config, "Configuration loaded");

    let verifier = AlloyKycVerifier::new(
        config.contracts.kyc_verifier,
        connection(config, &config.owner_key)?,
    );
    check_issuer(&verifier, config.issuer_address).await;

    orchestrator.run().await
}

/// Read-only snapshot of the deployment.
pub async fn status(config: &OrchestratorConfig) -> Result<StatusReport> {
    let span = tracing::info_span!(spans::PURCHASE_STATUS, nft = %config.contracts.nft);

    async {
        let orchestrator = connect(config)?;
        let snapshot = orchestrator.status().await?;

        let buyer = connection(config, &config.buyer_key)?;
        let token = AlloyPaymentToken::new(config.contracts.token, buyer);
        let token_decimals = token.decimals().await.ok();
        let transfer_index = token.transfer_index().await.ok();

        let verifier = AlloyKycVerifier::new(
            config.contracts.kyc_verifier,
            connection(config, &config.owner_key)?,
        );
        let verifier_issuer = check_issuer(&verifier, config.issuer_address).await;

        Ok(StatusReport {
            snapshot,
            token_decimals,
            transfer_index,
            verifier_issuer,
            configured_issuer: config.issuer_address,
        })
    }
    .instrument(span)
    .await
}

/// The `eth_signTypedData_v4` payload an attestation issued now would sign.
pub fn typed_data(config: &OrchestratorConfig) -> TypedDataPayload {
    TypedDataPayload::new(config.kyc_domain(), config.contracts.nft, unix_now())
}

//! alloy-backed [`KycVerifier`].

use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use tracing::info;

use super::connection::{
    map_contract_error, read_provider, send_and_confirm, signing_provider, to_tx_receipt,
};
use super::{ChainConnection, IKycVerifier, KycVerifier};
use crate::crypto::KycDomain;
use crate::domain::TxReceipt;
use crate::infra::{ChainError, ChainResult};

/// KYC verifier client; `verifyKYC` is sent from `submitter`.
#[derive(Debug, Clone)]
pub struct AlloyKycVerifier {
    address: Address,
    submitter: ChainConnection,
}

impl AlloyKycVerifier {
    pub fn new(address: Address, submitter: ChainConnection) -> Self {
        Self { address, submitter }
    }
}

#[async_trait]
impl KycVerifier for AlloyKycVerifier {
    fn address(&self) -> Address {
        self.address
    }

    async fn verify_kyc(
        &self,
        subject: Address,
        issued_at: U256,
        signature: Bytes,
    ) -> ChainResult<TxReceipt> {
        let provider = signing_provider!(self.submitter);
        let contract = IKycVerifier::new(self.address, &provider);

        let call = contract.verifyKYC(subject, issued_at, signature);
        let receipt = send_and_confirm!(self.submitter, call, "verifyKYC");

        info!(
            subject = %subject,
            tx_hash = %receipt.transaction_hash,
            block = receipt.block_number.unwrap_or(0),
            "KYC attestation accepted"
        );

        Ok(to_tx_receipt(&receipt))
    }

    async fn is_verified(&self, subject: Address) -> ChainResult<bool> {
        let provider = read_provider!(self.submitter);
        let contract = IKycVerifier::new(self.address, &provider);

        let result = contract
            .isVerified(subject)
            .call()
            .await
            .map_err(map_contract_error)?;

        Ok(result._0)
    }

    async fn issuer(&self) -> ChainResult<Address> {
        let provider = read_provider!(self.submitter);
        let contract = IKycVerifier::new(self.address, &provider);

        let result = contract
            .issuer()
            .call()
            .await
            .map_err(map_contract_error)?;

        Ok(result._0)
    }

    async fn kyc_typehash(&self) -> ChainResult<B256> {
        let provider = read_provider!(self.submitter);
        let contract = IKycVerifier::new(self.address, &provider);

        let result = contract
            .KYC_TYPEHASH()
            .call()
            .await
            .map_err(map_contract_error)?;

        Ok(result._0)
    }

    async fn eip712_domain(&self) -> ChainResult<KycDomain> {
        let provider = read_provider!(self.submitter);
        let contract = IKycVerifier::new(self.address, &provider);

        let domain = contract
            .eip712Domain()
            .call()
            .await
            .map_err(map_contract_error)?;

        let chain_id = u64::try_from(domain.chainId)
            .map_err(|_| ChainError::Call(format!("chain id {} exceeds u64", domain.chainId)))?;

        Ok(KycDomain {
            name: domain.name,
            version: domain.version,
            chain_id,
            verifying_contract: domain.verifyingContract,
        })
    }
}

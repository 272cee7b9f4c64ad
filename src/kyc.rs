//! KYC verifier client.
//!
//! Submits signed attestations and turns verifier reverts into a
//! [`KycRejection`]. Signature validity is decided by the contract only; this
//! client never recovers signers itself.

use alloy::primitives::{Address, U256};
use tracing::{info, warn};

use crate::contracts::{KycVerifier, RejectionKind, RevertReason};
use crate::crypto::TypedDataPayload;
use crate::domain::{Attestation, PurchaseStage, TxReceipt};
use crate::infra::{ChainError, ChainResult, KycRejection, PurchaseError, Result};

/// Map a verifier revert to the rejection kind callers act on.
pub fn classify_rejection(reason: RevertReason) -> KycRejection {
    match reason.kind() {
        RejectionKind::InvalidSignature => KycRejection::InvalidSignature(reason),
        RejectionKind::StaleAttestation => KycRejection::StaleAttestation(reason),
        RejectionKind::WrongSigner => KycRejection::WrongSigner(reason),
        _ => KycRejection::Other(reason),
    }
}

#[derive(Debug, Clone)]
pub struct KycVerifierClient<K> {
    verifier: K,
}

impl<K: KycVerifier> KycVerifierClient<K> {
    pub fn new(verifier: K) -> Self {
        Self { verifier }
    }

    pub fn address(&self) -> Address {
        self.verifier.address()
    }

    pub fn verifier(&self) -> &K {
        &self.verifier
    }

    pub async fn is_verified(&self, subject: Address) -> ChainResult<bool> {
        self.verifier.is_verified(subject).await
    }

    /// Submit an attestation and wait for the verifier to accept it.
    pub async fn submit_attestation(&self, attestation: &Attestation) -> Result<TxReceipt> {
        let result = self
            .verifier
            .verify_kyc(
                attestation.subject(),
                U256::from(attestation.issued_at()),
                attestation.signature().clone(),
            )
            .await;

        match result {
            Ok(receipt) => {
                info!(
                    subject = %attestation.subject(),
                    tx_hash = %receipt.tx_hash,
                    "KYC verified on-chain"
                );
                Ok(receipt)
            }
            Err(ChainError::Reverted(reason)) => {
                let rejection = classify_rejection(reason);
                warn!(
                    subject = %attestation.subject(),
                    error = %rejection,
                    "KYC attestation rejected"
                );
                Err(PurchaseError::KycRejected(rejection))
            }
            Err(other) => Err(PurchaseError::stage(PurchaseStage::KycVerified, other)),
        }
    }

    /// Compare a payload's type hash and domain with what the verifier reports.
    ///
    /// A verifier that does not expose the accessors (the call reverts) is not
    /// an error; the local fixture check already ran. Any other failure aborts.
    pub async fn check_schema(&self, payload: &TypedDataPayload) -> Result<()> {
        match self.verifier.kyc_typehash().await {
            Ok(on_chain) => payload.ensure_type_hash(on_chain)?,
            Err(e) if accessor_missing(&e) => {
                warn!(error = %e, "Verifier type hash unavailable, skipping check")
            }
            Err(e) => return Err(PurchaseError::stage(PurchaseStage::KycPending, e)),
        }

        match self.verifier.eip712_domain().await {
            Ok(on_chain) => payload.domain().ensure_matches(&on_chain)?,
            Err(e) if accessor_missing(&e) => {
                warn!(error = %e, "Verifier domain unavailable, skipping check")
            }
            Err(e) => return Err(PurchaseError::stage(PurchaseStage::KycPending, e)),
        }

        Ok(())
    }
}

fn accessor_missing(err: &ChainError) -> bool {
    matches!(err, ChainError::Reverted(_) | ChainError::Call(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::MockKycVerifier;
    use crate::crypto::{fixture_type_hash, KycDomain, DEFAULT_CHAIN_ID};
    use alloy::primitives::{address, Bytes, B256};

    fn attestation() -> Attestation {
        Attestation::new(
            address!("1111111111111111111111111111111111111111"),
            1_700_000_000,
            Bytes::from(vec![1u8; 65]),
        )
    }

    fn client_rejecting(reason: RevertReason) -> KycVerifierClient<MockKycVerifier> {
        let mut verifier = MockKycVerifier::new();
        verifier
            .expect_verify_kyc()
            .times(1)
            .returning(move |_, _, _| Err(ChainError::Reverted(reason.clone())));
        KycVerifierClient::new(verifier)
    }

    #[test]
    fn test_classify_rejections() {
        assert!(matches!(
            classify_rejection(RevertReason::InvalidSignature),
            KycRejection::InvalidSignature(_)
        ));
        assert!(matches!(
            classify_rejection(RevertReason::message("Invalid signature")),
            KycRejection::InvalidSignature(_)
        ));
        assert!(matches!(
            classify_rejection(RevertReason::message("Attestation expired")),
            KycRejection::StaleAttestation(_)
        ));
        assert!(matches!(
            classify_rejection(RevertReason::message("Not issuer")),
            KycRejection::WrongSigner(_)
        ));
        assert!(matches!(
            classify_rejection(RevertReason::Empty),
            KycRejection::Other(_)
        ));
    }

    #[tokio::test]
    async fn test_submit_passes_attestation_fields() {
        let att = attestation();
        let expected_subject = att.subject();
        let mut verifier = MockKycVerifier::new();
        verifier
            .expect_verify_kyc()
            .withf(move |subject, issued_at, sig| {
                *subject == expected_subject
                    && *issued_at == U256::from(1_700_000_000u64)
                    && sig.len() == 65
            })
            .times(1)
            .returning(|_, _, _| Ok(TxReceipt::new(B256::repeat_byte(7), Some(10), true)));

        let client = KycVerifierClient::new(verifier);
        let receipt = client.submit_attestation(&att).await.unwrap();
        assert_eq!(receipt.block_number, Some(10));
    }

    #[tokio::test]
    async fn test_submit_surfaces_stale_rejection() {
        let client = client_rejecting(RevertReason::message("KYC attestation too old"));

        match client.submit_attestation(&attestation()).await {
            Err(PurchaseError::KycRejected(KycRejection::StaleAttestation(_))) => {}
            other => panic!("expected stale rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transport_failure_is_stage_error() {
        let mut verifier = MockKycVerifier::new();
        verifier
            .expect_verify_kyc()
            .returning(|_, _, _| Err(ChainError::Transport("connection refused".into())));

        let client = KycVerifierClient::new(verifier);
        assert!(matches!(
            client.submit_attestation(&attestation()).await,
            Err(PurchaseError::Stage {
                stage: PurchaseStage::KycVerified,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_schema_check_detects_wrong_typehash() {
        let mut verifier = MockKycVerifier::new();
        verifier
            .expect_kyc_typehash()
            .returning(|| Ok(B256::repeat_byte(1)));
        verifier
            .expect_eip712_domain()
            .returning(|| Err(ChainError::Call("not supported".into())));

        let client = KycVerifierClient::new(verifier);
        let payload = TypedDataPayload::new(
            KycDomain::new(Address::ZERO, DEFAULT_CHAIN_ID),
            Address::ZERO,
            1,
        );

        assert!(matches!(
            client.check_schema(&payload).await,
            Err(PurchaseError::Signature(_))
        ));
    }

    #[tokio::test]
    async fn test_schema_check_passes_with_matching_verifier() {
        let domain = KycDomain::new(Address::ZERO, DEFAULT_CHAIN_ID);
        let reported = domain.clone();

        let mut verifier = MockKycVerifier::new();
        verifier
            .expect_kyc_typehash()
            .returning(|| Ok(fixture_type_hash()));
        verifier
            .expect_eip712_domain()
            .returning(move || Ok(reported.clone()));

        let client = KycVerifierClient::new(verifier);
        let payload = TypedDataPayload::new(domain, Address::ZERO, 1);
        assert!(client.check_schema(&payload).await.is_ok());
    }

    #[tokio::test]
    async fn test_schema_check_skips_reverting_accessors() {
        let mut verifier = MockKycVerifier::new();
        verifier
            .expect_kyc_typehash()
            .returning(|| Err(ChainError::Reverted(RevertReason::Empty)));
        verifier
            .expect_eip712_domain()
            .returning(|| Err(ChainError::Call("not supported".into())));

        let client = KycVerifierClient::new(verifier);
        let payload = TypedDataPayload::new(
            KycDomain::new(Address::ZERO, DEFAULT_CHAIN_ID),
            Address::ZERO,
            1,
        );
        assert!(client.check_schema(&payload).await.is_ok());
    }

    #[tokio::test]
    async fn test_schema_check_fails_on_transport_error() {
        let mut verifier = MockKycVerifier::new();
        verifier
            .expect_kyc_typehash()
            .returning(|| Err(ChainError::Transport("timeout".into())));
        verifier.expect_eip712_domain().never();

        let client = KycVerifierClient::new(verifier);
        let payload = TypedDataPayload::new(
            KycDomain::new(Address::ZERO, DEFAULT_CHAIN_ID),
            Address::ZERO,
            1,
        );

        assert!(matches!(
            client.check_schema(&payload).await,
            Err(PurchaseError::Stage {
                stage: PurchaseStage::KycPending,
                source: ChainError::Transport(_),
            })
        ));
    }

    #[tokio::test]
    async fn test_schema_check_fails_on_domain_transport_error() {
        let mut verifier = MockKycVerifier::new();
        verifier
            .expect_kyc_typehash()
            .returning(|| Ok(fixture_type_hash()));
        verifier
            .expect_eip712_domain()
            .returning(|| Err(ChainError::Transport("connection reset".into())));

        let client = KycVerifierClient::new(verifier);
        let payload = TypedDataPayload::new(
            KycDomain::new(Address::ZERO, DEFAULT_CHAIN_ID),
            Address::ZERO,
            1,
        );

        assert!(client.check_schema(&payload).await.is_err());
    }
}

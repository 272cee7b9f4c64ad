//! Attestation signing.
//!
//! [`SignatureBuilder`] turns `(subject, issuedAt)` into a signed
//! [`Attestation`]. Signing is delegated to an [`AttestationSigner`]: either a
//! local secp256k1 key or a node holding the issuer account
//! (`eth_signTypedData_v4`).

use std::sync::Arc;

use alloy::primitives::{Address, Bytes};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;
use alloy::transports::http::reqwest::Url;
use async_trait::async_trait;
use tracing::{debug, info};

use super::typed_data::{KycDomain, TypedDataPayload};
use crate::domain::{Attestation, SIGNATURE_LENGTH};
use crate::infra::SignatureError;

/// Produces EIP-712 signatures for the issuer account.
#[async_trait]
pub trait AttestationSigner: Send + Sync {
    /// Issuer address the signature should recover to
    fn address(&self) -> Address;

    async fn sign_typed_data(&self, payload: &TypedDataPayload) -> Result<Bytes, SignatureError>;
}

/// Signs the EIP-712 digest with an in-process private key.
#[derive(Debug, Clone)]
pub struct LocalKeySigner {
    signer: PrivateKeySigner,
}

impl LocalKeySigner {
    pub fn new(signer: PrivateKeySigner) -> Self {
        Self { signer }
    }

    pub fn from_hex(private_key: &str) -> Result<Self, SignatureError> {
        let signer: PrivateKeySigner = private_key
            .parse()
            .map_err(|e| SignatureError::SignerUnavailable(format!("Invalid private key: {}", e)))?;
        Ok(Self::new(signer))
    }
}

#[async_trait]
impl AttestationSigner for LocalKeySigner {
    fn address(&self) -> Address {
        self.signer.address()
    }

    async fn sign_typed_data(&self, payload: &TypedDataPayload) -> Result<Bytes, SignatureError> {
        let hash = payload.signing_hash();
        let signature = self
            .signer
            .sign_hash(&hash)
            .await
            .map_err(|e| SignatureError::SigningFailed(e.to_string()))?;

        Ok(Bytes::from(signature.as_bytes().to_vec()))
    }
}

/// Asks the RPC node to sign with an account it manages.
#[derive(Debug, Clone)]
pub struct NodeSigner {
    rpc_url: Url,
    account: Address,
}

impl NodeSigner {
    pub fn new(rpc_url: &str, account: Address) -> Result<Self, SignatureError> {
        let rpc_url = rpc_url
            .parse()
            .map_err(|e| SignatureError::SignerUnavailable(format!("Invalid RPC URL: {}", e)))?;
        Ok(Self { rpc_url, account })
    }
}

#[async_trait]
impl AttestationSigner for NodeSigner {
    fn address(&self) -> Address {
        self.account
    }

    async fn sign_typed_data(&self, payload: &TypedDataPayload) -> Result<Bytes, SignatureError> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.clone());
        let body = payload.to_json().to_string();

        debug!(account = %self.account, "Requesting eth_signTypedData_v4");

        provider
            .raw_request::<_, Bytes>("eth_signTypedData_v4".into(), (self.account, body))
            .await
            .map_err(|e| SignatureError::SignerUnavailable(e.to_string()))
    }
}

/// Builds and signs KYC attestations under a fixed domain.
#[derive(Clone)]
pub struct SignatureBuilder {
    domain: KycDomain,
    signer: Arc<dyn AttestationSigner>,
}

impl SignatureBuilder {
    pub fn new(domain: KycDomain, signer: Arc<dyn AttestationSigner>) -> Self {
        Self { domain, signer }
    }

    pub fn domain(&self) -> &KycDomain {
        &self.domain
    }

    pub fn issuer(&self) -> Address {
        self.signer.address()
    }

    pub fn build(&self, subject: Address, issued_at: u64) -> TypedDataPayload {
        TypedDataPayload::new(self.domain.clone(), subject, issued_at)
    }

    /// Build, schema-check and sign an attestation for `subject`.
    pub async fn attest(
        &self,
        subject: Address,
        issued_at: u64,
    ) -> Result<Attestation, SignatureError> {
        let payload = self.build(subject, issued_at);
        payload.ensure_schema()?;

        let signature = self.signer.sign_typed_data(&payload).await?;
        if signature.len() != SIGNATURE_LENGTH {
            return Err(SignatureError::InvalidLength(signature.len()));
        }

        info!(
            subject = %subject,
            issued_at = issued_at,
            issuer = %self.signer.address(),
            "KYC attestation signed"
        );

        Ok(Attestation::new(subject, issued_at, signature))
    }
}

impl std::fmt::Debug for SignatureBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureBuilder")
            .field("domain", &self.domain)
            .field("issuer", &self.signer.address())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::DEFAULT_CHAIN_ID;
    use alloy::primitives::{address, PrimitiveSignature};

    struct ShortSigner;

    #[async_trait]
    impl AttestationSigner for ShortSigner {
        fn address(&self) -> Address {
            Address::ZERO
        }

        async fn sign_typed_data(
            &self,
            _payload: &TypedDataPayload,
        ) -> Result<Bytes, SignatureError> {
            Ok(Bytes::from(vec![0u8; 64]))
        }
    }

    fn domain() -> KycDomain {
        KycDomain::new(
            address!("16b3574b38ae3653e6768b75344ae2e49d64ed0b"),
            DEFAULT_CHAIN_ID,
        )
    }

    #[tokio::test]
    async fn test_local_signature_recovers_issuer() {
        let key = PrivateKeySigner::random();
        let issuer = key.address();
        let builder = SignatureBuilder::new(domain(), Arc::new(LocalKeySigner::new(key)));
        let subject = address!("1111111111111111111111111111111111111111");

        let attestation = builder.attest(subject, 1_700_000_000).await.unwrap();
        assert_eq!(attestation.subject(), subject);
        assert_eq!(attestation.signature().len(), SIGNATURE_LENGTH);

        let signature = PrimitiveSignature::try_from(attestation.signature().as_ref()).unwrap();
        let hash = builder.build(subject, 1_700_000_000).signing_hash();
        assert_eq!(signature.recover_address_from_prehash(&hash).unwrap(), issuer);
    }

    #[tokio::test]
    async fn test_short_signature_rejected() {
        let builder = SignatureBuilder::new(domain(), Arc::new(ShortSigner));
        let err = builder.attest(Address::ZERO, 1).await.unwrap_err();
        assert_eq!(err, SignatureError::InvalidLength(64));
    }

    #[test]
    fn test_invalid_private_key() {
        assert!(matches!(
            LocalKeySigner::from_hex("0xnotakey"),
            Err(SignatureError::SignerUnavailable(_))
        ));
    }
}

//! EIP-712 typed data for KYC attestations.
//!
//! The verifier recomputes
//! `keccak256("\x19\x01" || domainSeparator || hashStruct(KYC{user, issuedAt}))`
//! on-chain, so the field names, their order and their types below are a
//! protocol constant. A payload with a different schema still signs locally
//! and is only rejected once submitted; [`TypedDataPayload::ensure_schema`]
//! catches that before anything is sent.

use std::collections::BTreeMap;

use alloy::primitives::{keccak256, Address, B256, U256};
use alloy::sol;
use alloy::sol_types::{Eip712Domain, SolStruct};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::infra::SignatureError;

sol! {
    /// KYC attestation message, as hashed by the verifier contract.
    #[derive(Debug, PartialEq, Eq)]
    struct KYC {
        address user;
        uint256 issuedAt;
    }
}

/// Known-good encoded type for the verifier's `KYC_TYPEHASH`.
pub const KYC_TYPE_FIXTURE: &str = "KYC(address user,uint256 issuedAt)";

pub const KYC_PRIMARY_TYPE: &str = "KYC";

/// Declared message schema, in signing order.
pub const KYC_FIELDS: [TypedField; 2] = [
    TypedField {
        name: "user",
        r#type: "address",
    },
    TypedField {
        name: "issuedAt",
        r#type: "uint256",
    },
];

/// Domain schema for a name/version/chainId/verifyingContract domain.
pub const DOMAIN_FIELDS: [TypedField; 4] = [
    TypedField {
        name: "name",
        r#type: "string",
    },
    TypedField {
        name: "version",
        r#type: "string",
    },
    TypedField {
        name: "chainId",
        r#type: "uint256",
    },
    TypedField {
        name: "verifyingContract",
        r#type: "address",
    },
];

pub const DEFAULT_DOMAIN_NAME: &str = "Gbese KYC";
pub const DEFAULT_DOMAIN_VERSION: &str = "1";
/// Base Sepolia
pub const DEFAULT_CHAIN_ID: u64 = 84532;

/// One `{ name, type }` entry of a typed-data schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TypedField {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub r#type: &'static str,
}

/// Encode a struct type the way EIP-712 `encodeType` does for a struct with
/// no nested struct members.
pub fn encode_type(primary_type: &str, fields: &[TypedField]) -> String {
    let members: Vec<String> = fields
        .iter()
        .map(|f| format!("{} {}", f.r#type, f.name))
        .collect();
    format!("{}({})", primary_type, members.join(","))
}

/// The verifier's EIP-712 domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KycDomain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: Address,
}

impl KycDomain {
    pub fn new(verifying_contract: Address, chain_id: u64) -> Self {
        Self {
            name: DEFAULT_DOMAIN_NAME.to_string(),
            version: DEFAULT_DOMAIN_VERSION.to_string(),
            chain_id,
            verifying_contract,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn to_eip712(&self) -> Eip712Domain {
        Eip712Domain::new(
            Some(self.name.clone().into()),
            Some(self.version.clone().into()),
            Some(U256::from(self.chain_id)),
            Some(self.verifying_contract),
            None,
        )
    }

    pub fn separator(&self) -> B256 {
        self.to_eip712().separator()
    }

    /// Compare against the domain reported by the verifier.
    pub fn ensure_matches(&self, on_chain: &KycDomain) -> Result<(), SignatureError> {
        let mismatch = |field: &'static str, on_chain: String, local: String| {
            Err(SignatureError::DomainMismatch {
                field,
                on_chain,
                local,
            })
        };

        if self.name != on_chain.name {
            return mismatch("name", on_chain.name.clone(), self.name.clone());
        }
        if self.version != on_chain.version {
            return mismatch("version", on_chain.version.clone(), self.version.clone());
        }
        if self.chain_id != on_chain.chain_id {
            return mismatch(
                "chainId",
                on_chain.chain_id.to_string(),
                self.chain_id.to_string(),
            );
        }
        if self.verifying_contract != on_chain.verifying_contract {
            return mismatch(
                "verifyingContract",
                on_chain.verifying_contract.to_string(),
                self.verifying_contract.to_string(),
            );
        }
        Ok(())
    }
}

/// Domain plus `KYC` message for one attestation. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedDataPayload {
    domain: KycDomain,
    message: KYC,
}

impl TypedDataPayload {
    pub fn new(domain: KycDomain, subject: Address, issued_at: u64) -> Self {
        Self {
            domain,
            message: KYC {
                user: subject,
                issuedAt: U256::from(issued_at),
            },
        }
    }

    pub fn domain(&self) -> &KycDomain {
        &self.domain
    }

    pub fn subject(&self) -> Address {
        self.message.user
    }

    pub fn issued_at(&self) -> U256 {
        self.message.issuedAt
    }

    pub fn primary_type(&self) -> &'static str {
        KYC_PRIMARY_TYPE
    }

    pub fn types(&self) -> BTreeMap<&'static str, Vec<TypedField>> {
        BTreeMap::from([
            ("EIP712Domain", DOMAIN_FIELDS.to_vec()),
            (KYC_PRIMARY_TYPE, KYC_FIELDS.to_vec()),
        ])
    }

    /// `keccak256(encodeType(KYC))`
    pub fn type_hash(&self) -> B256 {
        self.message.eip712_type_hash()
    }

    /// Digest the issuer signs
    pub fn signing_hash(&self) -> B256 {
        self.message.eip712_signing_hash(&self.domain.to_eip712())
    }

    /// Check that the declared schema, the hashed struct and the fixture agree.
    pub fn ensure_schema(&self) -> Result<(), SignatureError> {
        let declared = encode_type(KYC_PRIMARY_TYPE, &KYC_FIELDS);
        let hashed = KYC::eip712_encode_type();

        if declared != KYC_TYPE_FIXTURE {
            return Err(SignatureError::SchemaMismatch {
                expected: KYC_TYPE_FIXTURE.to_string(),
                actual: declared,
            });
        }
        if hashed != KYC_TYPE_FIXTURE {
            return Err(SignatureError::SchemaMismatch {
                expected: KYC_TYPE_FIXTURE.to_string(),
                actual: hashed.into_owned(),
            });
        }
        Ok(())
    }

    /// Compare the local type hash with the verifier's `KYC_TYPEHASH()`.
    pub fn ensure_type_hash(&self, on_chain: B256) -> Result<(), SignatureError> {
        let local = self.type_hash();
        if local != on_chain {
            return Err(SignatureError::TypeHashMismatch { on_chain, local });
        }
        Ok(())
    }

    /// `eth_signTypedData_v4` request body.
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "types": self.types(),
            "primaryType": self.primary_type(),
            "domain": {
                "name": self.domain.name,
                "version": self.domain.version,
                "chainId": self.domain.chain_id,
                "verifyingContract": self.domain.verifying_contract.to_string(),
            },
            "message": {
                "user": self.message.user.to_string(),
                "issuedAt": self.message.issuedAt.to_string(),
            }
        })
    }
}

/// Type hash of the fixture, for comparison with `KYC_TYPEHASH()`.
pub fn fixture_type_hash() -> B256 {
    keccak256(KYC_TYPE_FIXTURE.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    fn payload() -> TypedDataPayload {
        let domain = KycDomain::new(
            address!("16b3574b38ae3653e6768b75344ae2e49d64ed0b"),
            DEFAULT_CHAIN_ID,
        );
        TypedDataPayload::new(
            domain,
            address!("1111111111111111111111111111111111111111"),
            1_700_000_000,
        )
    }

    #[test]
    fn test_schema_matches_fixture() {
        assert!(payload().ensure_schema().is_ok());
        assert_eq!(
            encode_type(KYC_PRIMARY_TYPE, &KYC_FIELDS),
            "KYC(address user,uint256 issuedAt)"
        );
    }

    #[test]
    fn test_reordered_fields_detected() {
        let reordered = [KYC_FIELDS[1], KYC_FIELDS[0]];
        assert_ne!(encode_type(KYC_PRIMARY_TYPE, &reordered), KYC_TYPE_FIXTURE);
    }

    #[test]
    fn test_type_hash_matches_fixture() {
        let p = payload();
        assert_eq!(p.type_hash(), fixture_type_hash());
        assert!(p.ensure_type_hash(fixture_type_hash()).is_ok());
        assert!(matches!(
            p.ensure_type_hash(B256::ZERO),
            Err(SignatureError::TypeHashMismatch { .. })
        ));
    }

    #[test]
    fn test_signing_hash_binds_domain() {
        let a = payload();
        let other_chain = TypedDataPayload::new(
            KycDomain::new(a.domain().verifying_contract, 1),
            a.subject(),
            1_700_000_000,
        );
        assert_ne!(a.signing_hash(), other_chain.signing_hash());
    }

    #[test]
    fn test_signing_hash_binds_message() {
        let a = payload();
        let later = TypedDataPayload::new(a.domain().clone(), a.subject(), 1_700_000_001);
        assert_ne!(a.signing_hash(), later.signing_hash());
    }

    #[test]
    fn test_json_shape() {
        let value = payload().to_json();

        assert_eq!(value["primaryType"], "KYC");
        assert_eq!(value["domain"]["name"], "Gbese KYC");
        assert_eq!(value["domain"]["version"], "1");
        assert_eq!(value["domain"]["chainId"], 84532);
        assert_eq!(value["types"]["KYC"][0]["name"], "user");
        assert_eq!(value["types"]["KYC"][1]["type"], "uint256");
        assert_eq!(value["types"]["EIP712Domain"].as_array().unwrap().len(), 4);
        assert_eq!(value["message"]["issuedAt"], "1700000000");
    }

    #[test]
    fn test_domain_mismatch() {
        let local = KycDomain::new(Address::ZERO, DEFAULT_CHAIN_ID);
        let on_chain = local.clone().with_version("2");

        match local.ensure_matches(&on_chain) {
            Err(SignatureError::DomainMismatch { field, .. }) => assert_eq!(field, "version"),
            other => panic!("expected version mismatch, got {other:?}"),
        }
        assert!(local.ensure_matches(&local.clone()).is_ok());
    }
}

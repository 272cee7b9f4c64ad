//! Run configuration loaded from the environment.
//!
//! Everything is validated up front: a run with a missing address or an
//! unparsable key fails before the first RPC call.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::http::reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::crypto::{KycDomain, DEFAULT_CHAIN_ID, DEFAULT_DOMAIN_NAME, DEFAULT_DOMAIN_VERSION};
use crate::domain::{ContractAddresses, Participants};
use crate::infra::{PurchaseError, Result, RetryConfig};
use crate::token::AllowanceStrategy;

/// Where attestation signatures come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignerMode {
    /// Sign locally with `ISSUER_PRIVATE_KEY`
    #[default]
    Local,
    /// Ask the RPC node to sign with `eth_signTypedData_v4` for an unlocked account
    Node,
}

impl FromStr for SignerMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(SignerMode::Local),
            "node" | "rpc" => Ok(SignerMode::Node),
            other => Err(format!("unknown signer mode: {other}")),
        }
    }
}

/// What happens when the privileged mint fails or cannot be verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MintFailurePolicy {
    /// Abort the run
    #[default]
    Fatal,
    /// Record the failure and continue to the purchase
    Continue,
}

impl FromStr for MintFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fatal" | "abort" => Ok(MintFailurePolicy::Fatal),
            "continue" | "skip" => Ok(MintFailurePolicy::Continue),
            other => Err(format!("unknown mint failure policy: {other}")),
        }
    }
}

impl fmt::Display for MintFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MintFailurePolicy::Fatal => f.write_str("fatal"),
            MintFailurePolicy::Continue => f.write_str("continue"),
        }
    }
}

/// Orchestrator behavior that does not depend on how contracts are reached.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub participants: Participants,
    pub token_uri: String,
    pub mint_failure_policy: MintFailurePolicy,
    /// Skip minting when the recipient already holds at least one token
    pub reuse_existing_mint: bool,
    /// Compare the payload with the verifier's `KYC_TYPEHASH()` and `eip712Domain()`
    pub validate_schema_on_chain: bool,
    pub read_retry: RetryConfig,
}

/// Full configuration for a purchase run.
#[derive(Clone)]
pub struct OrchestratorConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    pub owner_key: PrivateKeySigner,
    pub buyer_key: PrivateKeySigner,
    /// Issuer key, present in [`SignerMode::Local`]
    pub issuer_key: Option<PrivateKeySigner>,
    pub issuer_address: Address,
    pub signer_mode: SignerMode,
    pub contracts: ContractAddresses,
    pub token_uri: String,
    pub mint_recipient: Address,
    pub domain_name: String,
    pub domain_version: String,
    pub allowance_strategy: AllowanceStrategy,
    pub mint_failure_policy: MintFailurePolicy,
    pub reuse_existing_mint: bool,
    pub validate_schema_on_chain: bool,
    pub read_retries: u32,
    pub confirmations: u64,
    pub confirmation_timeout_secs: u64,
}

impl fmt::Debug for OrchestratorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrchestratorConfig")
            .field("rpc_url", &self.rpc_url)
            .field("chain_id", &self.chain_id)
            .field("owner", &self.owner_key.address())
            .field("buyer", &self.buyer_key.address())
            .field("issuer", &self.issuer_address)
            .field("signer_mode", &self.signer_mode)
            .field("contracts", &self.contracts)
            .field("token_uri", &self.token_uri)
            .field("mint_recipient", &self.mint_recipient)
            .field("allowance_strategy", &self.allowance_strategy)
            .field("mint_failure_policy", &self.mint_failure_policy)
            .field("reuse_existing_mint", &self.reuse_existing_mint)
            .field("read_retries", &self.read_retries)
            .finish_non_exhaustive()
    }
}

impl OrchestratorConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let rpc_url = get("RPC_URL").ok_or_else(|| missing("RPC_URL"))?;
        rpc_url
            .parse::<Url>()
            .map_err(|e| config_error(format!("RPC_URL is not a valid URL: {e}")))?;

        let chain_id = match get("CHAIN_ID") {
            Some(v) => v
                .parse()
                .map_err(|_| config_error(format!("CHAIN_ID is not a number: {v}")))?,
            None => DEFAULT_CHAIN_ID,
        };

        let owner_key = parse_key("OWNER_PRIVATE_KEY", get("OWNER_PRIVATE_KEY"))?;
        let buyer_key = parse_key("BUYER_PRIVATE_KEY", get("BUYER_PRIVATE_KEY"))?;

        let signer_mode = match get("KYC_SIGNER_MODE") {
            Some(v) => v.parse().map_err(config_error)?,
            None => SignerMode::default(),
        };

        let (issuer_key, issuer_address) = match signer_mode {
            SignerMode::Local => {
                let key = match get("ISSUER_PRIVATE_KEY") {
                    Some(v) => parse_key("ISSUER_PRIVATE_KEY", Some(v))?,
                    None => owner_key.clone(),
                };
                let address = key.address();
                (Some(key), address)
            }
            SignerMode::Node => {
                let address = match get("ISSUER_ADDRESS") {
                    Some(v) => parse_address("ISSUER_ADDRESS", &v)?,
                    None => owner_key.address(),
                };
                (None, address)
            }
        };

        let contracts = ContractAddresses {
            nft: require_address(&get, "NFT_ADDRESS")?,
            token: require_address(&get, "TOKEN_ADDRESS")?,
            kyc_verifier: require_address(&get, "KYC_VERIFIER_ADDRESS")?,
        };

        let token_uri = get("TOKEN_URI").ok_or_else(|| missing("TOKEN_URI"))?;

        let mint_recipient = match get("MINT_RECIPIENT") {
            Some(v) => parse_address("MINT_RECIPIENT", &v)?,
            None => buyer_key.address(),
        };

        let allowance_strategy = match get("ALLOWANCE_STRATEGY") {
            Some(v) => v.parse().map_err(config_error)?,
            None => AllowanceStrategy::default(),
        };

        let mint_failure_policy = match get("MINT_FAILURE_POLICY") {
            Some(v) => v.parse().map_err(config_error)?,
            None => MintFailurePolicy::default(),
        };

        let config = Self {
            rpc_url,
            chain_id,
            owner_key,
            buyer_key,
            issuer_key,
            issuer_address,
            signer_mode,
            contracts,
            token_uri,
            mint_recipient,
            domain_name: get("KYC_DOMAIN_NAME").unwrap_or_else(|| DEFAULT_DOMAIN_NAME.to_string()),
            domain_version: get("KYC_DOMAIN_VERSION")
                .unwrap_or_else(|| DEFAULT_DOMAIN_VERSION.to_string()),
            allowance_strategy,
            mint_failure_policy,
            reuse_existing_mint: get("REUSE_EXISTING_MINT")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            validate_schema_on_chain: get("VALIDATE_SCHEMA_ON_CHAIN")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
            read_retries: parse_number(&get, "READ_RETRIES", 3)?,
            confirmations: parse_number(&get, "CONFIRMATIONS", 1)?,
            confirmation_timeout_secs: parse_number(&get, "CONFIRMATION_TIMEOUT_SECS", 120)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Cross-field checks.
    pub fn validate(&self) -> Result<()> {
        let ContractAddresses {
            nft,
            token,
            kyc_verifier,
        } = self.contracts;

        if nft == token || nft == kyc_verifier || token == kyc_verifier {
            return Err(config_error(
                "NFT_ADDRESS, TOKEN_ADDRESS and KYC_VERIFIER_ADDRESS must be distinct",
            ));
        }
        if self.mint_recipient.is_zero() {
            return Err(config_error("MINT_RECIPIENT must not be the zero address"));
        }
        if self.issuer_address.is_zero() {
            return Err(config_error("issuer address must not be the zero address"));
        }
        if self.token_uri.trim().is_empty() {
            return Err(config_error("TOKEN_URI must not be empty"));
        }
        Ok(())
    }

    pub fn participants(&self) -> Participants {
        Participants {
            owner: self.owner_key.address(),
            buyer: self.buyer_key.address(),
            mint_recipient: self.mint_recipient,
        }
    }

    /// EIP-712 domain the verifier is expected to use.
    pub fn kyc_domain(&self) -> KycDomain {
        KycDomain::new(self.contracts.kyc_verifier, self.chain_id)
            .with_name(self.domain_name.clone())
            .with_version(self.domain_version.clone())
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn read_retry(&self) -> RetryConfig {
        RetryConfig::chain_reads().with_max_retries(self.read_retries)
    }

    pub fn run_settings(&self) -> RunSettings {
        RunSettings {
            participants: self.participants(),
            token_uri: self.token_uri.clone(),
            mint_failure_policy: self.mint_failure_policy,
            reuse_existing_mint: self.reuse_existing_mint,
            validate_schema_on_chain: self.validate_schema_on_chain,
            read_retry: self.read_retry(),
        }
    }
}

fn config_error(message: impl Into<String>) -> PurchaseError {
    PurchaseError::Configuration(message.into())
}

fn missing(key: &str) -> PurchaseError {
    config_error(format!("{key} is required"))
}

fn parse_key(key: &str, value: Option<String>) -> Result<PrivateKeySigner> {
    let value = value.ok_or_else(|| missing(key))?;
    value
        .trim()
        .parse::<PrivateKeySigner>()
        .map_err(|_| config_error(format!("{key} is not a valid secp256k1 private key")))
}

fn parse_address(key: &str, value: &str) -> Result<Address> {
    let address: Address = value
        .trim()
        .parse()
        .map_err(|e| config_error(format!("{key} is not a valid address: {e}")))?;
    if address.is_zero() {
        return Err(config_error(format!("{key} must not be the zero address")));
    }
    Ok(address)
}

fn require_address<G>(get: &G, key: &str) -> Result<Address>
where
    G: Fn(&str) -> Option<String>,
{
    let value = get(key).ok_or_else(|| missing(key))?;
    parse_address(key, &value)
}

fn parse_number<G, N>(get: &G, key: &str, default: N) -> Result<N>
where
    G: Fn(&str) -> Option<String>,
    N: FromStr,
{
    match get(key) {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| config_error(format!("{key} is not a valid number: {v}"))),
        None => Ok(default),
    }
}

//! Contract interfaces for the Gbese deployment
//!
//! - [`NftContract`] - the `GbeseArts` NFT (link, mint, price, purchase)
//! - [`PaymentToken`] - the ERC-20 payment token (balance, allowance, approve)
//! - [`KycVerifier`] - the EIP-712 KYC attestation verifier
//!
//! Each trait has an alloy-backed implementation talking JSON-RPC over HTTP.
//! The ABI surface is declared once below with `sol!`; these declarations are
//! the versioned interface descriptors the clients are compiled against.

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::sol;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::crypto::KycDomain;
use crate::domain::{MintReceipt, PurchaseReceipt, TxReceipt};
use crate::infra::ChainResult;

mod connection;
mod kyc_verifier;
mod nft;
mod revert;
mod token;

pub use connection::ChainConnection;
pub use kyc_verifier::AlloyKycVerifier;
pub use nft::AlloyNftContract;
pub use revert::{RejectionKind, RevertReason};
pub use token::AlloyPaymentToken;

/// Version of the interface descriptors below, reported with every run.
pub const INTERFACE_VERSION: &str = "gbese-v1";

sol! {
    #[sol(rpc)]
    interface IGbeseArts {
        event Transfer(address indexed from, address indexed to, uint256 indexed tokenId);

        function setTokenContract(address token) external;
        function gbeseTokenAddress() external view returns (address);
        function mintGbeseArt(address recipient, string uri) external returns (uint256);
        function purchaseNFT(string uri) external;
        function nftPriceInTokens() external view returns (uint256);
        function balanceOf(address owner) external view returns (uint256);
        function tokenURI(uint256 tokenId) external view returns (string);
    }
}

sol! {
    #[sol(rpc)]
    interface IGbeseToken {
        event TransferLogged(
            uint256 indexed index,
            address indexed from,
            address indexed to,
            uint256 amount,
            uint256 blockNumber
        );

        function balanceOf(address account) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 value) external returns (bool);
        function transferIndex() external view returns (uint256);
        function decimals() external view returns (uint8);
    }
}

sol! {
    #[sol(rpc)]
    interface IKycVerifier {
        function verifyKYC(address user, uint256 issuedAt, bytes sig) external;
        function isVerified(address account) external view returns (bool);
        function issuer() external view returns (address);
        function KYC_TYPEHASH() external view returns (bytes32);
        function eip712Domain() external view returns (
            bytes1 fields,
            string name,
            string version,
            uint256 chainId,
            address verifyingContract,
            bytes32 salt,
            uint256[] extensions
        );
    }
}

/// The `GbeseArts` NFT contract.
///
/// Privileged calls (`set_token_contract`, `mint`) are sent from the owner
/// account, `purchase` from the buyer.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NftContract: Send + Sync {
    fn address(&self) -> Address;

    /// Payment token currently linked, zero address if unset
    async fn token_contract(&self) -> ChainResult<Address>;

    async fn set_token_contract(&self, token: Address) -> ChainResult<TxReceipt>;

    async fn mint(&self, recipient: Address, uri: &str) -> ChainResult<MintReceipt>;

    /// Number of NFTs held by `owner`
    async fn balance_of(&self, owner: Address) -> ChainResult<U256>;

    async fn token_uri(&self, token_id: U256) -> ChainResult<String>;

    async fn price_in_tokens(&self) -> ChainResult<U256>;

    /// Purchase with `uri`; the contract re-checks KYC, balance and allowance atomically
    async fn purchase(&self, uri: &str) -> ChainResult<PurchaseReceipt>;
}

/// ERC-20 payment token, bound to the holder that approves.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PaymentToken: Send + Sync {
    fn address(&self) -> Address;

    async fn balance_of(&self, holder: Address) -> ChainResult<U256>;

    async fn allowance(&self, holder: Address, spender: Address) -> ChainResult<U256>;

    /// Resulting allowance equals `amount` only once the receipt is returned
    async fn approve(&self, spender: Address, amount: U256) -> ChainResult<TxReceipt>;
}

/// KYC attestation verifier.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KycVerifier: Send + Sync {
    fn address(&self) -> Address;

    async fn verify_kyc(
        &self,
        subject: Address,
        issued_at: U256,
        signature: Bytes,
    ) -> ChainResult<TxReceipt>;

    async fn is_verified(&self, subject: Address) -> ChainResult<bool>;

    async fn issuer(&self) -> ChainResult<Address>;

    async fn kyc_typehash(&self) -> ChainResult<B256>;

    /// EIP-5267 domain as reported by the verifier
    async fn eip712_domain(&self) -> ChainResult<KycDomain>;
}

//! In-memory chain used by the integration tests.
//!
//! Models the three Gbese contracts closely enough to exercise the whole
//! purchase flow: the verifier recovers the EIP-712 signer, the NFT checks
//! KYC and pulls payment with `transferFrom` semantics, and every revert is
//! ABI-encoded and decoded again the way a node would return it.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use alloy::primitives::{Address, Bytes, PrimitiveSignature, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;

use gbese_purchase::config::{MintFailurePolicy, RunSettings};
use gbese_purchase::contracts::{KycVerifier, NftContract, PaymentToken, RevertReason};
use gbese_purchase::crypto::{
    fixture_type_hash, KycDomain, LocalKeySigner, SignatureBuilder, TypedDataPayload,
    DEFAULT_CHAIN_ID,
};
use gbese_purchase::domain::{
    unix_now, MintReceipt, Participants, PurchaseReceipt, TxReceipt, SIGNATURE_LENGTH,
};
use gbese_purchase::infra::{ChainError, ChainResult, RetryConfig};
use gbese_purchase::kyc::KycVerifierClient;
use gbese_purchase::orchestrator::PurchaseOrchestrator;
use gbese_purchase::token::{AllowanceStrategy, TokenClient};

pub const TOKEN_URI: &str = "ipfs://bafkreihq4j3p34h4j3l5nasom37kwdumclyef54npzpn5b6umcupgmw6qi";

/// Attestations older than this are rejected as expired
pub const MAX_ATTESTATION_AGE: u64 = 3600;

pub type SimOrchestrator = PurchaseOrchestrator<SimNft, SimToken, SimVerifier>;

#[derive(Debug, Default)]
pub struct SimState {
    pub block: u64,
    tx_counter: u64,

    // GbeseArts
    pub nft_address: Address,
    pub nft_owner: Address,
    pub linked_token: Address,
    pub price: U256,
    pub next_token_id: U256,
    pub token_owners: HashMap<U256, Address>,
    pub token_uris: HashMap<U256, String>,
    pub mint_calls: u32,
    pub purchase_calls: u32,
    pub link_calls: u32,

    // GbeseToken
    pub token_address: Address,
    pub balances: HashMap<Address, U256>,
    pub allowances: HashMap<(Address, Address), U256>,
    /// (owner, spender, amount) for every approve call
    pub approvals: Vec<(Address, Address, U256)>,
    pub transfer_index: U256,
    /// Token reads that fail with a transport error before succeeding
    pub transient_read_failures: u32,

    // KYC verifier
    pub verifier_address: Address,
    pub issuer: Address,
    pub domain: Option<KycDomain>,
    pub verified: HashSet<Address>,
    pub verify_calls: u32,
}

impl SimState {
    fn next_receipt(&mut self) -> TxReceipt {
        self.tx_counter += 1;
        self.block += 1;
        TxReceipt::new(B256::from(U256::from(self.tx_counter)), Some(self.block), true)
    }

    pub fn nft_count(&self, holder: Address) -> U256 {
        U256::from(self.token_owners.values().filter(|o| **o == holder).count())
    }

    pub fn allowance(&self, owner: Address, spender: Address) -> U256 {
        self.allowances
            .get(&(owner, spender))
            .copied()
            .unwrap_or_default()
    }

    pub fn balance(&self, holder: Address) -> U256 {
        self.balances.get(&holder).copied().unwrap_or_default()
    }
}

/// Revert the way a node reports it: encoded, then decoded by the client.
fn revert<T>(reason: RevertReason) -> ChainResult<T> {
    Err(ChainError::Reverted(RevertReason::decode(&reason.encode())))
}

#[derive(Clone)]
pub struct ChainSim {
    state: Arc<Mutex<SimState>>,
    pub owner: PrivateKeySigner,
    pub buyer: PrivateKeySigner,
}

impl ChainSim {
    /// Deployment where the owner is also the KYC issuer.
    pub fn new(price: u64, buyer_balance: u64, buyer_allowance: u64) -> Self {
        let owner = PrivateKeySigner::random();
        let buyer = PrivateKeySigner::random();

        let nft_address = Address::repeat_byte(0xa1);
        let token_address = Address::repeat_byte(0xa2);
        let verifier_address = Address::repeat_byte(0xa3);

        let mut state = SimState {
            block: 100,
            nft_address,
            nft_owner: owner.address(),
            price: U256::from(price),
            next_token_id: U256::from(1),
            token_address,
            verifier_address,
            issuer: owner.address(),
            domain: Some(KycDomain::new(verifier_address, DEFAULT_CHAIN_ID)),
            ..Default::default()
        };
        state
            .balances
            .insert(buyer.address(), U256::from(buyer_balance));
        state.allowances.insert(
            (buyer.address(), nft_address),
            U256::from(buyer_allowance),
        );

        Self {
            state: Arc::new(Mutex::new(state)),
            owner,
            buyer,
        }
    }

    pub fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap()
    }

    pub fn nft(&self) -> SimNft {
        SimNft {
            state: self.state.clone(),
            owner: self.owner.address(),
            buyer: self.buyer.address(),
        }
    }

    pub fn token(&self) -> SimToken {
        SimToken {
            state: self.state.clone(),
            holder: self.buyer.address(),
        }
    }

    pub fn verifier(&self) -> SimVerifier {
        SimVerifier {
            state: self.state.clone(),
        }
    }

    pub fn settings(&self) -> RunSettings {
        RunSettings {
            participants: Participants {
                owner: self.owner.address(),
                buyer: self.buyer.address(),
                mint_recipient: self.buyer.address(),
            },
            token_uri: TOKEN_URI.to_string(),
            mint_failure_policy: MintFailurePolicy::Fatal,
            reuse_existing_mint: false,
            validate_schema_on_chain: true,
            read_retry: RetryConfig::none(),
        }
    }

    pub fn signature_builder(&self, issuer: PrivateKeySigner) -> SignatureBuilder {
        let domain = {
            let s = self.state();
            s.domain
                .clone()
                .unwrap_or_else(|| KycDomain::new(s.verifier_address, DEFAULT_CHAIN_ID))
        };
        SignatureBuilder::new(domain, Arc::new(LocalKeySigner::new(issuer)))
    }

    /// Orchestrator signing with the owner key, the authorized issuer.
    pub fn orchestrator(&self) -> SimOrchestrator {
        self.orchestrator_with(self.owner.clone(), self.settings(), AllowanceStrategy::Direct)
    }

    pub fn orchestrator_with(
        &self,
        issuer: PrivateKeySigner,
        settings: RunSettings,
        strategy: AllowanceStrategy,
    ) -> SimOrchestrator {
        PurchaseOrchestrator::new(
            self.nft(),
            TokenClient::new(self.token()).with_strategy(strategy),
            KycVerifierClient::new(self.verifier()),
            self.signature_builder(issuer),
            settings,
        )
    }
}

#[derive(Clone)]
pub struct SimNft {
    state: Arc<Mutex<SimState>>,
    owner: Address,
    buyer: Address,
}

#[async_trait]
impl NftContract for SimNft {
    fn address(&self) -> Address {
        self.state.lock().unwrap().nft_address
    }

    async fn token_contract(&self) -> ChainResult<Address> {
        Ok(self.state.lock().unwrap().linked_token)
    }

    async fn set_token_contract(&self, token: Address) -> ChainResult<TxReceipt> {
        let mut s = self.state.lock().unwrap();
        if self.owner != s.nft_owner {
            return revert(RevertReason::UnauthorizedAccount {
                account: self.owner,
            });
        }
        s.link_calls += 1;
        s.linked_token = token;
        Ok(s.next_receipt())
    }

    async fn mint(&self, recipient: Address, uri: &str) -> ChainResult<MintReceipt> {
        let mut s = self.state.lock().unwrap();
        if self.owner != s.nft_owner {
            return revert(RevertReason::UnauthorizedAccount {
                account: self.owner,
            });
        }
        if recipient.is_zero() {
            return revert(RevertReason::message("ERC721: invalid receiver"));
        }

        s.mint_calls += 1;
        let token_id = s.next_token_id;
        s.next_token_id += U256::from(1);
        s.token_owners.insert(token_id, recipient);
        s.token_uris.insert(token_id, uri.to_string());

        Ok(MintReceipt {
            receipt: s.next_receipt(),
            token_id: Some(token_id),
        })
    }

    async fn balance_of(&self, owner: Address) -> ChainResult<U256> {
        Ok(self.state.lock().unwrap().nft_count(owner))
    }

    async fn token_uri(&self, token_id: U256) -> ChainResult<String> {
        match self.state.lock().unwrap().token_uris.get(&token_id) {
            Some(uri) => Ok(uri.clone()),
            None => revert(RevertReason::message("ERC721: URI query for nonexistent token")),
        }
    }

    async fn price_in_tokens(&self) -> ChainResult<U256> {
        Ok(self.state.lock().unwrap().price)
    }

    async fn purchase(&self, uri: &str) -> ChainResult<PurchaseReceipt> {
        let mut s = self.state.lock().unwrap();
        s.purchase_calls += 1;

        if s.linked_token.is_zero() {
            return revert(RevertReason::message("Token contract not set"));
        }
        let nft = s.nft_address;
        if !s.verified.contains(&nft) {
            return revert(RevertReason::message("NFT contract not KYC verified"));
        }

        let buyer = self.buyer;
        let price = s.price;

        // transferFrom: allowance is spent before the balance is checked
        let allowance = s.allowance(buyer, nft);
        if allowance < price {
            return revert(RevertReason::InsufficientAllowance {
                spender: nft,
                allowance,
                needed: price,
            });
        }
        let balance = s.balance(buyer);
        if balance < price {
            return revert(RevertReason::InsufficientBalance {
                sender: buyer,
                balance,
                needed: price,
            });
        }

        s.allowances.insert((buyer, nft), allowance - price);
        s.balances.insert(buyer, balance - price);
        let seller = s.nft_owner;
        let seller_balance = s.balance(seller);
        s.balances.insert(seller, seller_balance + price);
        let transfer_index = s.transfer_index;
        s.transfer_index += U256::from(1);

        let token_id = s.next_token_id;
        s.next_token_id += U256::from(1);
        s.token_owners.insert(token_id, buyer);
        s.token_uris.insert(token_id, uri.to_string());

        Ok(PurchaseReceipt {
            receipt: s.next_receipt(),
            token_id: Some(token_id),
            transfer_index: Some(transfer_index),
        })
    }
}

#[derive(Clone)]
pub struct SimToken {
    state: Arc<Mutex<SimState>>,
    holder: Address,
}

impl SimToken {
    fn transient_failure(&self) -> ChainResult<()> {
        let mut s = self.state.lock().unwrap();
        if s.transient_read_failures > 0 {
            s.transient_read_failures -= 1;
            return Err(ChainError::Transport("connection reset by peer".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentToken for SimToken {
    fn address(&self) -> Address {
        self.state.lock().unwrap().token_address
    }

    async fn balance_of(&self, holder: Address) -> ChainResult<U256> {
        self.transient_failure()?;
        Ok(self.state.lock().unwrap().balance(holder))
    }

    async fn allowance(&self, holder: Address, spender: Address) -> ChainResult<U256> {
        self.transient_failure()?;
        Ok(self.state.lock().unwrap().allowance(holder, spender))
    }

    async fn approve(&self, spender: Address, amount: U256) -> ChainResult<TxReceipt> {
        if spender.is_zero() {
            return revert(RevertReason::InvalidSpender { spender });
        }
        let mut s = self.state.lock().unwrap();
        s.allowances.insert((self.holder, spender), amount);
        s.approvals.push((self.holder, spender, amount));
        Ok(s.next_receipt())
    }
}

#[derive(Clone)]
pub struct SimVerifier {
    state: Arc<Mutex<SimState>>,
}

#[async_trait]
impl KycVerifier for SimVerifier {
    fn address(&self) -> Address {
        self.state.lock().unwrap().verifier_address
    }

    async fn verify_kyc(
        &self,
        subject: Address,
        issued_at: U256,
        signature: Bytes,
    ) -> ChainResult<TxReceipt> {
        let mut s = self.state.lock().unwrap();
        s.verify_calls += 1;

        let issued_at: u64 = issued_at.try_into().unwrap_or(u64::MAX);
        let now = unix_now();
        if issued_at > now || now - issued_at > MAX_ATTESTATION_AGE {
            return revert(RevertReason::message("KYC attestation expired"));
        }

        if signature.len() != SIGNATURE_LENGTH {
            return revert(RevertReason::InvalidSignatureLength {
                length: U256::from(signature.len()),
            });
        }
        let Ok(parsed) = PrimitiveSignature::try_from(signature.as_ref()) else {
            return revert(RevertReason::InvalidSignature);
        };

        let domain = s
            .domain
            .clone()
            .unwrap_or_else(|| KycDomain::new(s.verifier_address, DEFAULT_CHAIN_ID));
        let digest = TypedDataPayload::new(domain, subject, issued_at).signing_hash();

        match parsed.recover_address_from_prehash(&digest) {
            Ok(signer) if signer == s.issuer => {}
            Ok(_) => return revert(RevertReason::message("Invalid signature")),
            Err(_) => return revert(RevertReason::InvalidSignature),
        }

        s.verified.insert(subject);
        Ok(s.next_receipt())
    }

    async fn is_verified(&self, subject: Address) -> ChainResult<bool> {
        Ok(self.state.lock().unwrap().verified.contains(&subject))
    }

    async fn issuer(&self) -> ChainResult<Address> {
        Ok(self.state.lock().unwrap().issuer)
    }

    async fn kyc_typehash(&self) -> ChainResult<B256> {
        Ok(fixture_type_hash())
    }

    async fn eip712_domain(&self) -> ChainResult<KycDomain> {
        match self.state.lock().unwrap().domain.clone() {
            Some(domain) => Ok(domain),
            None => Err(ChainError::Call("eip712Domain() not implemented".into())),
        }
    }
}

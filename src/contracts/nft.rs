//! alloy-backed [`NftContract`] for `GbeseArts`.

use alloy::eips::BlockId;
use alloy::primitives::{Address, U256};
use alloy::rpc::types::{Log, TransactionReceipt};
use async_trait::async_trait;
use tracing::info;

use super::connection::{
    map_contract_error, read_provider, replayed_failure, send_and_confirm, send_and_wait,
    signing_provider, to_tx_receipt,
};
use super::{ChainConnection, IGbeseArts, IGbeseToken, NftContract};
use crate::domain::{MintReceipt, PurchaseReceipt, TxReceipt};
use crate::infra::ChainResult;

/// `GbeseArts` client. Owner-only calls go through `owner`, purchases through `buyer`.
#[derive(Debug, Clone)]
pub struct AlloyNftContract {
    address: Address,
    payment_token: Address,
    owner: ChainConnection,
    buyer: ChainConnection,
}

impl AlloyNftContract {
    /// `payment_token` is the token whose `TransferLogged` events are read from
    /// purchase receipts.
    pub fn new(
        address: Address,
        payment_token: Address,
        owner: ChainConnection,
        buyer: ChainConnection,
    ) -> Self {
        Self {
            address,
            payment_token,
            owner,
            buyer,
        }
    }

    /// ERC-721 `Transfer` emitted by this contract, if any.
    fn minted_token_id(&self, receipt: &TransactionReceipt) -> Option<U256> {
        receipt
            .inner
            .logs()
            .iter()
            .filter(|log| log.inner.address == self.address)
            .find_map(|log| log.log_decode::<IGbeseArts::Transfer>().ok())
            .map(|decoded| decoded.inner.data.tokenId)
    }

    /// `TransferLogged` index emitted by the payment token during the purchase.
    fn transfer_index(&self, receipt: &TransactionReceipt) -> Option<U256> {
        logged_transfer_index(receipt.inner.logs(), self.payment_token)
    }
}

fn logged_transfer_index(logs: &[Log], token: Address) -> Option<U256> {
    logs.iter()
        .filter(|log| log.inner.address == token)
        .find_map(|log| log.log_decode::<IGbeseToken::TransferLogged>().ok())
        .map(|decoded| decoded.inner.data.index)
}

#[async_trait]
impl NftContract for AlloyNftContract {
    fn address(&self) -> Address {
        self.address
    }

    async fn token_contract(&self) -> ChainResult<Address> {
        let provider = read_provider!(self.owner);
        let contract = IGbeseArts::new(self.address, &provider);

        let result = contract
            .gbeseTokenAddress()
            .call()
            .await
            .map_err(map_contract_error)?;

        Ok(result._0)
    }

    async fn set_token_contract(&self, token: Address) -> ChainResult<TxReceipt> {
        let provider = signing_provider!(self.owner);
        let contract = IGbeseArts::new(self.address, &provider);

        let call = contract.setTokenContract(token);
        let receipt = send_and_confirm!(self.owner, call, "setTokenContract");

        info!(
            nft = %self.address,
            token = %token,
            tx_hash = %receipt.transaction_hash,
            "Payment token linked"
        );

        Ok(to_tx_receipt(&receipt))
    }

    async fn mint(&self, recipient: Address, uri: &str) -> ChainResult<MintReceipt> {
        let provider = signing_provider!(self.owner);
        let contract = IGbeseArts::new(self.address, &provider);

        let call = contract.mintGbeseArt(recipient, uri.to_string());
        let receipt = send_and_confirm!(self.owner, call, "mintGbeseArt");
        let token_id = self.minted_token_id(&receipt);

        info!(
            recipient = %recipient,
            token_id = ?token_id,
            tx_hash = %receipt.transaction_hash,
            block = receipt.block_number.unwrap_or(0),
            "NFT minted"
        );

        Ok(MintReceipt {
            receipt: to_tx_receipt(&receipt),
            token_id,
        })
    }

    async fn balance_of(&self, owner: Address) -> ChainResult<U256> {
        let provider = read_provider!(self.owner);
        let contract = IGbeseArts::new(self.address, &provider);

        let result = contract
            .balanceOf(owner)
            .call()
            .await
            .map_err(map_contract_error)?;

        Ok(result._0)
    }

    async fn token_uri(&self, token_id: U256) -> ChainResult<String> {
        let provider = read_provider!(self.owner);
        let contract = IGbeseArts::new(self.address, &provider);

        let result = contract
            .tokenURI(token_id)
            .call()
            .await
            .map_err(map_contract_error)?;

        Ok(result._0)
    }

    async fn price_in_tokens(&self) -> ChainResult<U256> {
        let provider = read_provider!(self.owner);
        let contract = IGbeseArts::new(self.address, &provider);

        let result = contract
            .nftPriceInTokens()
            .call()
            .await
            .map_err(map_contract_error)?;

        Ok(result._0)
    }

    async fn purchase(&self, uri: &str) -> ChainResult<PurchaseReceipt> {
        let provider = signing_provider!(self.buyer);
        let contract = IGbeseArts::new(self.address, &provider);

        let call = contract.purchaseNFT(uri.to_string());
        let receipt = send_and_wait!(self.buyer, call, "purchaseNFT");

        if !receipt.status() {
            // Estimation passed but execution failed; replay at the same block for the reason
            let block = receipt
                .block_number
                .map(BlockId::number)
                .unwrap_or_else(BlockId::latest);
            let replay = contract
                .purchaseNFT(uri.to_string())
                .from(self.buyer.from())
                .block(block)
                .call()
                .await
                .map(|_| ())
                .map_err(map_contract_error);
            return Err(replayed_failure(receipt.transaction_hash, replay));
        }

        Ok(PurchaseReceipt {
            receipt: to_tx_receipt(&receipt),
            token_id: self.minted_token_id(&receipt),
            transfer_index: self.transfer_index(&receipt),
        })
    }
}

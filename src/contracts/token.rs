//! alloy-backed [`PaymentToken`] for the Gbese ERC-20.

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use tracing::info;

use super::connection::{
    map_contract_error, read_provider, send_and_confirm, signing_provider, to_tx_receipt,
};
use super::{ChainConnection, IGbeseToken, PaymentToken};
use crate::domain::TxReceipt;
use crate::infra::ChainResult;

/// Payment token client; approvals are sent from `holder`.
#[derive(Debug, Clone)]
pub struct AlloyPaymentToken {
    address: Address,
    holder: ChainConnection,
}

impl AlloyPaymentToken {
    pub fn new(address: Address, holder: ChainConnection) -> Self {
        Self { address, holder }
    }

    /// Current value of the `TransferLogged` counter
    pub async fn transfer_index(&self) -> ChainResult<U256> {
        let provider = read_provider!(self.holder);
        let contract = IGbeseToken::new(self.address, &provider);

        let result = contract
            .transferIndex()
            .call()
            .await
            .map_err(map_contract_error)?;

        Ok(result._0)
    }

    pub async fn decimals(&self) -> ChainResult<u8> {
        let provider = read_provider!(self.holder);
        let contract = IGbeseToken::new(self.address, &provider);

        let result = contract
            .decimals()
            .call()
            .await
            .map_err(map_contract_error)?;

        Ok(result._0)
    }
}

#[async_trait]
impl PaymentToken for AlloyPaymentToken {
    fn address(&self) -> Address {
        self.address
    }

    async fn balance_of(&self, holder: Address) -> ChainResult<U256> {
        let provider = read_provider!(self.holder);
        let contract = IGbeseToken::new(self.address, &provider);

        let result = contract
            .balanceOf(holder)
            .call()
            .await
            .map_err(map_contract_error)?;

        Ok(result._0)
    }

    async fn allowance(&self, holder: Address, spender: Address) -> ChainResult<U256> {
        let provider = read_provider!(self.holder);
        let contract = IGbeseToken::new(self.address, &provider);

        let result = contract
            .allowance(holder, spender)
            .call()
            .await
            .map_err(map_contract_error)?;

        Ok(result._0)
    }

    async fn approve(&self, spender: Address, amount: U256) -> ChainResult<TxReceipt> {
        let provider = signing_provider!(self.holder);
        let contract = IGbeseToken::new(self.address, &provider);

        let call = contract.approve(spender, amount);
        let receipt = send_and_confirm!(self.holder, call, "approve");

        info!(
            owner = %self.holder.from(),
            spender = %spender,
            amount = %amount,
            tx_hash = %receipt.transaction_hash,
            "Allowance approved"
        );

        Ok(to_tx_receipt(&receipt))
    }
}

//! Signing wallet: one key bound to one network client
//!
//! Every transfer runs fee snapshot, balance guard, nonce reservation,
//! assembly, signing and broadcast under a per-wallet lock, then waits for
//! the receipt outside it.

use crate::chain::ProviderClient;
use crate::config::TxConfig;
use crate::contracts::{Erc20Call, Erc20Token, TokenInfo};
use crate::error::{WalletError, WalletResult};
use crate::keys::KeyMaterial;
use crate::tx::{
    FeeEstimator, NonceSequencer, NonceState, Receipt, ToAddress, TransactionBuilder,
    TransactionSubmitter,
};

use ethers::types::{Address, Bytes, H256, U256};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// What to send. `gas_limit` falls back to the configured defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub to: Address,
    pub value: U256,
    pub data: Option<Bytes>,
    pub gas_limit: Option<u64>,
}

impl TransferRequest {
    /// Plain value transfer
    pub fn native(to: Address, value: U256) -> Self {
        Self {
            to,
            value,
            data: None,
            gas_limit: None,
        }
    }

    /// Contract call carrying no value
    pub fn call(contract: Address, data: Bytes) -> Self {
        Self {
            to: contract,
            value: U256::zero(),
            data: Some(data),
            gas_limit: None,
        }
    }

    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }
}

pub struct SigningWallet {
    key: KeyMaterial,
    provider: Arc<dyn ProviderClient>,
    sequencer: NonceSequencer,
    fees: FeeEstimator,
    builder: TransactionBuilder,
    submitter: TransactionSubmitter,
    config: TxConfig,
    /// Serializes reserve -> broadcast for this wallet
    pipeline: Mutex<()>,
}

impl SigningWallet {
    pub fn new(
        key: KeyMaterial,
        provider: Arc<dyn ProviderClient>,
        chain_id: u64,
        config: TxConfig,
    ) -> Self {
        info!("Wallet {:?} bound to chain {}", key.address(), chain_id);

        Self {
            sequencer: NonceSequencer::new(provider.clone()),
            fees: FeeEstimator::new(config.fee_mode),
            builder: TransactionBuilder::new(chain_id),
            submitter: TransactionSubmitter::new(
                provider.clone(),
                chain_id,
                config.poll_interval(),
                config.confirmation_timeout(),
            ),
            key,
            provider,
            config,
            pipeline: Mutex::new(()),
        }
    }

    /// Bind to whatever chain the provider reports
    pub async fn connect(
        key: KeyMaterial,
        provider: Arc<dyn ProviderClient>,
        config: TxConfig,
    ) -> WalletResult<Self> {
        let chain_id = provider.get_chain_id().await?;
        Ok(Self::new(key, provider, chain_id, config))
    }

    pub fn address(&self) -> Address {
        self.key.address()
    }

    pub fn key(&self) -> &KeyMaterial {
        &self.key
    }

    pub fn chain_id(&self) -> u64 {
        self.builder.chain_id()
    }

    pub fn provider(&self) -> &Arc<dyn ProviderClient> {
        &self.provider
    }

    /// Live balance in wei, never cached
    pub async fn balance(&self) -> WalletResult<U256> {
        self.provider.get_balance(self.address()).await
    }

    pub async fn nonce_state(&self) -> NonceState {
        self.sequencer.state(self.address()).await
    }

    /// Send `amount` wei to `to` and wait for the receipt
    pub async fn transfer_native<T: ToAddress + ?Sized>(
        &self,
        to: &T,
        amount: U256,
    ) -> WalletResult<Receipt> {
        let to = to.to_address()?;
        self.send(TransferRequest::native(to, amount)).await
    }

    /// Call `transfer(to, amount)` on an ERC-20 contract. `amount` is in base units.
    pub async fn transfer_token<C, T>(
        &self,
        contract: &C,
        to: &T,
        amount: U256,
    ) -> WalletResult<Receipt>
    where
        C: ToAddress + ?Sized,
        T: ToAddress + ?Sized,
    {
        self.transfer_token_with_cancel(contract, to, amount, None, std::future::pending::<()>())
            .await
    }

    /// `transfer_token` with an optional gas limit override and a cancellable receipt wait
    pub async fn transfer_token_with_cancel<C, T, F>(
        &self,
        contract: &C,
        to: &T,
        amount: U256,
        gas_limit: Option<u64>,
        cancel: F,
    ) -> WalletResult<Receipt>
    where
        C: ToAddress + ?Sized,
        T: ToAddress + ?Sized,
        F: Future<Output = ()>,
    {
        let contract = contract.to_address()?;
        let data = Erc20Call::Transfer {
            to: to.to_address()?,
            amount,
        }
        .encode();

        let mut request = TransferRequest::call(contract, data);
        if let Some(limit) = gas_limit {
            request = request.with_gas_limit(limit);
        }
        self.send_with_cancel(request, cancel).await
    }

    /// Decimals, symbol and holder balance of an ERC-20 contract
    pub async fn token_info<C: ToAddress + ?Sized>(
        &self,
        contract: &C,
        owner: Address,
    ) -> WalletResult<TokenInfo> {
        Erc20Token::new(self.provider.as_ref(), contract.to_address()?)
            .info(owner)
            .await
    }

    pub async fn send(&self, request: TransferRequest) -> WalletResult<Receipt> {
        self.send_with_cancel(request, std::future::pending::<()>())
            .await
    }

    /// Like `send`, but stops waiting for the receipt once `cancel` resolves
    pub async fn send_with_cancel<F>(
        &self,
        request: TransferRequest,
        cancel: F,
    ) -> WalletResult<Receipt>
    where
        F: Future<Output = ()>,
    {
        let tx_hash = self.dispatch(request).await?;
        self.submitter
            .wait_for_receipt(tx_hash, self.submitter.confirmation_timeout(), cancel)
            .await
    }

    fn default_gas_limit(&self, request: &TransferRequest) -> u64 {
        match request.gas_limit {
            Some(limit) => limit,
            None if request.data.is_some() => self.config.buffered_contract_gas_limit(),
            None => self.config.native_gas_limit,
        }
    }

    /// Everything up to and including broadcast, under the pipeline lock
    async fn dispatch(&self, request: TransferRequest) -> WalletResult<H256> {
        let _guard = self.pipeline.lock().await;
        let address = self.address();

        // Holding the lock, a reservation can only be left over from a send
        // dropped mid-broadcast. That transaction may have reached the node.
        if let NonceState::Reserved { nonce } = self.sequencer.state(address).await {
            warn!(
                "Nonce {} for {:?} was abandoned mid-send; resyncing from network",
                nonce, address
            );
            self.sequencer.invalidate(address).await;
        }

        let snapshot = self.fees.snapshot(self.provider.as_ref()).await?;
        let fee = self.fees.policy(&snapshot)?;
        let gas_limit = self.default_gas_limit(&request);

        let max_fee = FeeEstimator::max_cost(gas_limit, &fee);
        let required = request.value.saturating_add(max_fee);
        let balance = self.provider.get_balance(address).await?;
        if balance < required {
            crate::metrics::record_tx_failed(self.chain_id(), "insufficient_funds");
            return Err(WalletError::InsufficientFunds(format!(
                "have {} wei, need {} wei ({} value + {} max fee)",
                balance, required, request.value, max_fee
            )));
        }

        let nonce = self.sequencer.next(address).await?;

        let signed = match self
            .builder
            .build(&request.to, request.value, nonce, &fee, gas_limit, request.data)
            .and_then(|unsigned| self.submitter.sign(&unsigned, &self.key))
        {
            Ok(signed) => signed,
            Err(e) => {
                self.sequencer.release(address, nonce).await?;
                return Err(e);
            }
        };

        match self.submitter.broadcast(&signed).await {
            Ok(tx_hash) => {
                self.sequencer.confirm(address, nonce).await?;
                Ok(tx_hash)
            }
            Err(e @ WalletError::NonceExpired(_)) => {
                warn!("Nonce {} for {:?} is stale; resyncing on next send", nonce, address);
                self.sequencer.invalidate(address).await;
                Err(e)
            }
            Err(e) => {
                debug!("Releasing nonce {} after rejected broadcast", nonce);
                self.sequencer.release(address, nonce).await?;
                Err(e)
            }
        }
    }
}

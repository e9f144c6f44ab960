//! ERC-20 calldata and read-only queries
//!
//! Each method is a fixed signature whose selector is computed once; calls
//! are typed values encoded against that schema.

use crate::chain::ProviderClient;
use crate::error::{WalletError, WalletResult};
use crate::utils::codec::selector;
use crate::utils::units::MAX_DECIMALS;

use ethers::abi::{decode, encode, ParamType, Token};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionRequest, U256};
use lazy_static::lazy_static;
use tracing::debug;

/// A contract method known by its canonical signature
#[derive(Debug, Clone)]
pub struct ContractMethod {
    pub signature: &'static str,
    pub selector: [u8; 4],
}

impl ContractMethod {
    fn new(signature: &'static str) -> Self {
        Self {
            signature,
            selector: selector(signature),
        }
    }

    fn encode(&self, args: &[Token]) -> Bytes {
        let mut data = self.selector.to_vec();
        data.extend_from_slice(&encode(args));
        Bytes::from(data)
    }
}

lazy_static! {
    pub static ref TRANSFER: ContractMethod = ContractMethod::new("transfer(address,uint256)");
    pub static ref BALANCE_OF: ContractMethod = ContractMethod::new("balanceOf(address)");
    pub static ref DECIMALS: ContractMethod = ContractMethod::new("decimals()");
    pub static ref SYMBOL: ContractMethod = ContractMethod::new("symbol()");
}

/// State-changing ERC-20 calls. Amounts are in the token's base units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Erc20Call {
    Transfer { to: Address, amount: U256 },
}

impl Erc20Call {
    pub fn method(&self) -> &'static ContractMethod {
        match self {
            Erc20Call::Transfer { .. } => &*TRANSFER,
        }
    }

    pub fn encode(&self) -> Bytes {
        match self {
            Erc20Call::Transfer { to, amount } => self
                .method()
                .encode(&[Token::Address(*to), Token::Uint(*amount)]),
        }
    }
}

/// View calls answered through `eth_call`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Erc20Query {
    BalanceOf { owner: Address },
    Decimals,
    Symbol,
}

impl Erc20Query {
    pub fn method(&self) -> &'static ContractMethod {
        match self {
            Erc20Query::BalanceOf { .. } => &*BALANCE_OF,
            Erc20Query::Decimals => &*DECIMALS,
            Erc20Query::Symbol => &*SYMBOL,
        }
    }

    pub fn encode(&self) -> Bytes {
        match self {
            Erc20Query::BalanceOf { owner } => self.method().encode(&[Token::Address(*owner)]),
            Erc20Query::Decimals | Erc20Query::Symbol => self.method().encode(&[]),
        }
    }
}

/// Decode a single `uint256` return value
pub fn decode_uint(data: &[u8]) -> WalletResult<U256> {
    let tokens = decode(&[ParamType::Uint(256)], data)
        .map_err(|e| WalletError::InvalidData(format!("expected uint256 return: {}", e)))?;
    match tokens.into_iter().next() {
        Some(Token::Uint(value)) => Ok(value),
        other => Err(WalletError::InvalidData(format!(
            "expected uint256 return, got {:?}",
            other
        ))),
    }
}

/// Decode a `decimals()` return. Values beyond what `U256` can scale by are refused.
pub fn decode_decimals(data: &[u8]) -> WalletResult<u32> {
    let value = decode_uint(data)?;
    if value > U256::from(MAX_DECIMALS) {
        return Err(WalletError::InvalidData(format!(
            "token reports {} decimals",
            value
        )));
    }
    Ok(value.as_u32())
}

/// Decode a `symbol()` return, accepting the old `bytes32` form as well as `string`
pub fn decode_symbol(data: &[u8]) -> WalletResult<String> {
    if data.len() == 32 {
        let end = data.iter().position(|b| *b == 0).unwrap_or(data.len());
        return String::from_utf8(data[..end].to_vec())
            .map_err(|e| WalletError::InvalidData(format!("symbol is not UTF-8: {}", e)));
    }

    let tokens = decode(&[ParamType::String], data)
        .map_err(|e| WalletError::InvalidData(format!("expected string return: {}", e)))?;
    match tokens.into_iter().next() {
        Some(Token::String(symbol)) => Ok(symbol),
        other => Err(WalletError::InvalidData(format!(
            "expected string return, got {:?}",
            other
        ))),
    }
}

/// What `token-info` reports for a holder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    pub symbol: String,
    pub decimals: u32,
    pub balance: U256,
}

/// Read-only view of one deployed ERC-20 contract
pub struct Erc20Token<'a> {
    provider: &'a dyn ProviderClient,
    address: Address,
}

impl<'a> Erc20Token<'a> {
    pub fn new(provider: &'a dyn ProviderClient, address: Address) -> Self {
        Self { provider, address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    async fn query(&self, query: Erc20Query) -> WalletResult<Bytes> {
        let tx: TypedTransaction = TransactionRequest::new()
            .to(self.address)
            .data(query.encode())
            .into();
        let data = self.provider.call(tx).await?;
        if data.is_empty() {
            return Err(WalletError::InvalidData(format!(
                "{} returned no data from {:?}; not an ERC-20 contract?",
                query.method().signature,
                self.address
            )));
        }
        Ok(data)
    }

    pub async fn balance_of(&self, owner: Address) -> WalletResult<U256> {
        decode_uint(&self.query(Erc20Query::BalanceOf { owner }).await?)
    }

    pub async fn decimals(&self) -> WalletResult<u32> {
        let decimals = decode_decimals(&self.query(Erc20Query::Decimals).await?)?;
        debug!("Token {:?} uses {} decimals", self.address, decimals);
        Ok(decimals)
    }

    pub async fn symbol(&self) -> WalletResult<String> {
        decode_symbol(&self.query(Erc20Query::Symbol).await?)
    }

    pub async fn info(&self, owner: Address) -> WalletResult<TokenInfo> {
        Ok(TokenInfo {
            symbol: self.symbol().await?,
            decimals: self.decimals().await?,
            balance: self.balance_of(owner).await?,
        })
    }
}

//! Configuration management for the wallet
//!
//! Loads configuration from TOML files with environment variable substitution.

use crate::error::{WalletError, WalletResult};
use crate::tx::FeeMode;

use lazy_static::lazy_static;
use regex::Regex;
use secrecy::SecretString;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable pointing at the configuration file
pub const CONFIG_ENV: &str = "EMBER_WALLET_CONFIG";

/// Default BIP-44 path for the first Ethereum account
pub const DEFAULT_DERIVATION_PATH: &str = "m/44'/60'/0'/0/0";

lazy_static! {
    static ref ENV_VAR_PATTERN: Regex = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub network: NetworkConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub tx: TxConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    pub chain_id: u64,
    #[serde(default = "default_network_name")]
    pub name: String,
    pub rpc_urls: Vec<String>,
    /// Priority fee added on top of twice the base fee
    #[serde(default = "default_priority_fee_gwei")]
    pub priority_fee_gwei: u64,
    /// Cap applied to the EIP-1559 max fee
    #[serde(default = "default_max_gas_price_gwei")]
    pub max_gas_price_gwei: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    pub private_key_env: Option<String>,
    pub mnemonic_env: Option<String>,
    #[serde(default = "default_derivation_path")]
    pub derivation_path: String,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            private_key_env: Some("EMBER_PRIVATE_KEY".to_string()),
            mnemonic_env: Some("EMBER_MNEMONIC".to_string()),
            derivation_path: default_derivation_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TxConfig {
    #[serde(default = "default_native_gas_limit")]
    pub native_gas_limit: u64,
    #[serde(default = "default_contract_gas_limit")]
    pub contract_gas_limit: u64,
    #[serde(default = "default_gas_limit_buffer_percent")]
    pub gas_limit_buffer_percent: u64,
    #[serde(default)]
    pub fee_mode: FeeMode,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,
}

impl Default for TxConfig {
    fn default() -> Self {
        Self {
            native_gas_limit: default_native_gas_limit(),
            contract_gas_limit: default_contract_gas_limit(),
            gas_limit_buffer_percent: default_gas_limit_buffer_percent(),
            fee_mode: FeeMode::default(),
            poll_interval_ms: default_poll_interval_ms(),
            confirmation_timeout_secs: default_confirmation_timeout_secs(),
        }
    }
}

impl TxConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    /// Gas limit for contract calls, with the safety buffer applied
    pub fn buffered_contract_gas_limit(&self) -> u64 {
        let buffer =
            u128::from(self.contract_gas_limit) * u128::from(self.gas_limit_buffer_percent) / 100;
        let buffer = u64::try_from(buffer).unwrap_or(u64::MAX);
        self.contract_gas_limit.saturating_add(buffer)
    }
}

fn default_network_name() -> String {
    "unknown".to_string()
}

fn default_priority_fee_gwei() -> u64 {
    2
}

fn default_max_gas_price_gwei() -> u64 {
    500
}

fn default_derivation_path() -> String {
    DEFAULT_DERIVATION_PATH.to_string()
}

fn default_native_gas_limit() -> u64 {
    21_000
}

fn default_contract_gas_limit() -> u64 {
    100_000
}

fn default_gas_limit_buffer_percent() -> u64 {
    20
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_confirmation_timeout_secs() -> u64 {
    30
}

impl Settings {
    /// Load settings from `path`, or from `EMBER_WALLET_CONFIG`, or the default location
    pub fn load(path: Option<&Path>) -> WalletResult<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => env::var(CONFIG_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("config/default.toml")),
        };

        let config_str = std::fs::read_to_string(&config_path).map_err(|e| {
            WalletError::Config(format!("Failed to read config file {:?}: {}", config_path, e))
        })?;

        Self::from_toml(&config_str)
    }

    /// Parse settings from a TOML document
    pub fn from_toml(raw: &str) -> WalletResult<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(raw);

        let settings: Settings = toml::from_str(&config_str)
            .map_err(|e| WalletError::Config(format!("Failed to parse configuration: {}", e)))?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> WalletResult<()> {
        if self.network.rpc_urls.iter().all(|u| u.trim().is_empty()) {
            return Err(WalletError::Config(format!(
                "Network {} has no RPC URLs configured",
                self.network.name
            )));
        }
        if self.tx.native_gas_limit == 0 || self.tx.contract_gas_limit == 0 {
            return Err(WalletError::Config("Gas limits must be positive".to_string()));
        }
        if self.tx.poll_interval_ms == 0 {
            return Err(WalletError::Config("poll_interval_ms must be positive".to_string()));
        }
        if self.tx.native_gas_limit != 21_000 {
            tracing::warn!(
                "native_gas_limit is {} instead of the standard 21000",
                self.tx.native_gas_limit
            );
        }

        Ok(())
    }
}

impl WalletConfig {
    /// Read the configured private key from the environment, if set
    pub fn private_key(&self) -> Option<SecretString> {
        read_secret(self.private_key_env.as_deref())
    }

    /// Read the configured mnemonic phrase from the environment, if set
    pub fn mnemonic(&self) -> Option<SecretString> {
        read_secret(self.mnemonic_env.as_deref())
    }
}

fn read_secret(var_name: Option<&str>) -> Option<SecretString> {
    let value = env::var(var_name?).ok()?;
    if value.trim().is_empty() {
        return None;
    }
    Some(SecretString::from(value))
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();

    for cap in ENV_VAR_PATTERN.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}

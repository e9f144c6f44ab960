//! Ember Wallet CLI
//!
//! Generates and imports keys, queries the configured network, and sends
//! native or ERC-20 transfers from the key held in the environment.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ember_wallet::chain::{ChainProvider, ProviderClient};
use ember_wallet::config::Settings;
use ember_wallet::contracts::Erc20Token;
use ember_wallet::keys::KeyMaterial;
use ember_wallet::tx::{FeeEstimator, Receipt, ToAddress};
use ember_wallet::utils::codec::hexlify;
use ember_wallet::utils::{format_ether, format_units, parse_ether, parse_units};
use ember_wallet::{metrics, SigningWallet, TransferRequest};
use secrecy::ExposeSecret;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "ember-wallet")]
#[command(about = "EVM wallet key management and transaction submission")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(short, long, global = true, env = "EMBER_WALLET_CONFIG")]
    config: Option<PathBuf>,

    /// Print Prometheus metrics to stderr before exiting
    #[arg(long, global = true)]
    dump_metrics: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new random wallet and print its recovery phrase
    New,

    /// Show the address for a private key
    ImportKey {
        /// Hex private key, with or without 0x
        #[arg(long, env = "EMBER_PRIVATE_KEY", hide_env_values = true)]
        key: String,
    },

    /// Show the address for a recovery phrase
    ImportPhrase {
        #[arg(long, env = "EMBER_MNEMONIC", hide_env_values = true)]
        phrase: String,

        /// Derivation path (defaults to m/44'/60'/0'/0/0)
        #[arg(long)]
        path: Option<String>,
    },

    /// Balance of an address, or of the configured wallet
    Balance {
        address: Option<String>,
    },

    /// Current fee quote and the policy the wallet would apply
    Fees,

    /// Chain id and latest block of the configured network
    Network,

    /// Deployed bytecode at an address
    Code {
        address: String,
    },

    /// Resolve an ENS name
    Resolve {
        name: String,

        /// Look up the avatar record instead of the address
        #[arg(long)]
        avatar: bool,
    },

    /// Receipt of a transaction, if mined
    Receipt {
        tx_hash: String,
    },

    /// Send native currency
    Transfer {
        to: String,

        /// Amount in ether, e.g. 0.01
        amount: String,
    },

    /// Send ERC-20 tokens
    TransferToken {
        /// Token contract address
        contract: String,

        to: String,

        /// Amount in whole tokens, e.g. 100
        amount: String,

        /// Token decimals; read from the contract when omitted
        #[arg(long)]
        decimals: Option<u32>,

        /// Override the configured contract gas limit
        #[arg(long)]
        gas_limit: Option<u64>,
    },

    /// Symbol, decimals and balance of an ERC-20 token
    TokenInfo {
        /// Token contract address
        contract: String,

        /// Holder; defaults to the configured wallet
        address: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let result = run(&cli).await;

    if cli.dump_metrics {
        eprintln!("{}", metrics::render());
    }
    result
}

async fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::New => {
            let key = KeyMaterial::generate_random()?;
            let mnemonic = key
                .mnemonic()
                .context("generated key has no recovery phrase")?;
            warn!("The recovery phrase below controls the wallet; store it offline");
            print_json(json!({
                "address": format!("{:?}", key.address()),
                "public_key": key.public_key_hex(),
                "phrase": mnemonic.phrase(),
                "path": mnemonic.path(),
            }));
        }

        Commands::ImportKey { key } => {
            let key = KeyMaterial::from_private_key(key)?;
            print_json(json!({
                "address": format!("{:?}", key.address()),
                "public_key": key.public_key_hex(),
            }));
        }

        Commands::ImportPhrase { phrase, path } => {
            let key = KeyMaterial::from_phrase(phrase, path.as_deref())?;
            let path = key.mnemonic().map(|m| m.path().to_string());
            print_json(json!({
                "address": format!("{:?}", key.address()),
                "public_key": key.public_key_hex(),
                "path": path,
            }));
        }

        Commands::Balance { address } => {
            let settings = Settings::load(cli.config.as_deref())?;
            let provider = connect(&settings)?;
            let address = match address {
                Some(address) => address.to_address()?,
                None => load_key(&settings)?.address(),
            };
            let balance = provider.get_balance(address).await?;
            print_json(json!({
                "address": format!("{:?}", address),
                "wei": balance.to_string(),
                "ether": format_ether(balance),
            }));
        }

        Commands::Fees => {
            let settings = Settings::load(cli.config.as_deref())?;
            let provider = connect(&settings)?;
            let estimator = FeeEstimator::new(settings.tx.fee_mode);
            let snapshot = estimator.snapshot(&*provider).await?;
            let policy = estimator.policy(&snapshot)?;
            print_json(json!({
                "gas_price": snapshot.gas_price().map(|v| v.to_string()),
                "max_fee_per_gas": snapshot.max_fee_per_gas().map(|v| v.to_string()),
                "max_priority_fee_per_gas": snapshot.max_priority_fee_per_gas().map(|v| v.to_string()),
                "policy": format!("{:?}", policy),
                "native_transfer_max_fee": format_ether(
                    FeeEstimator::max_cost(settings.tx.native_gas_limit, &policy)
                ),
            }));
        }

        Commands::Network => {
            let settings = Settings::load(cli.config.as_deref())?;
            let provider = connect(&settings)?;
            let chain_id = provider.get_chain_id().await?;
            if chain_id != settings.network.chain_id {
                warn!(
                    "Node reports chain {}, configuration says {}",
                    chain_id, settings.network.chain_id
                );
            }
            let block = provider.get_block_number().await?;
            print_json(json!({
                "name": settings.network.name,
                "chain_id": chain_id,
                "block_number": block,
            }));
        }

        Commands::Code { address } => {
            let settings = Settings::load(cli.config.as_deref())?;
            let provider = connect(&settings)?;
            let code = provider.get_code(address.to_address()?).await?;
            print_json(json!({
                "address": address,
                "is_contract": !code.is_empty(),
                "code": hexlify(&code[..]),
            }));
        }

        Commands::Resolve { name, avatar } => {
            let settings = Settings::load(cli.config.as_deref())?;
            let provider = connect(&settings)?;
            if *avatar {
                let url = provider.resolve_avatar(name.clone()).await?;
                print_json(json!({ "name": name, "avatar": url }));
            } else {
                let address = provider.resolve_name(name.clone()).await?;
                print_json(json!({ "name": name, "address": format!("{:?}", address) }));
            }
        }

        Commands::Receipt { tx_hash } => {
            let settings = Settings::load(cli.config.as_deref())?;
            let provider = connect(&settings)?;
            let hash = tx_hash
                .parse::<ethers::types::H256>()
                .with_context(|| format!("invalid transaction hash {}", tx_hash))?;
            match provider.get_transaction_receipt(hash).await? {
                Some(receipt) if receipt.block_number.is_some() => print_json(json!({
                    "transaction_hash": format!("{:?}", receipt.transaction_hash),
                    "block_number": receipt.block_number.map(|b| b.as_u64()),
                    "success": receipt.status.map(|s| s.as_u64() == 1),
                    "gas_used": receipt.gas_used.map(|g| g.to_string()),
                })),
                _ => print_json(json!({ "transaction_hash": tx_hash, "pending": true })),
            }
        }

        Commands::Transfer { to, amount } => {
            let settings = Settings::load(cli.config.as_deref())?;
            let wallet = open_wallet(&settings)?;
            let request = TransferRequest::native(to.to_address()?, parse_ether(amount)?);

            info!("Sending {} ether from {:?} to {}", amount, wallet.address(), to);
            let receipt = wallet.send_with_cancel(request, shutdown_signal()).await;
            report(receipt)?;
        }

        Commands::TransferToken {
            contract,
            to,
            amount,
            decimals,
            gas_limit,
        } => {
            let settings = Settings::load(cli.config.as_deref())?;
            let wallet = open_wallet(&settings)?;
            let contract = contract.to_address()?;
            let decimals = match decimals {
                Some(decimals) => *decimals,
                None => Erc20Token::new(wallet.provider().as_ref(), contract)
                    .decimals()
                    .await
                    .context("could not read token decimals; pass --decimals")?,
            };
            let units = parse_units(amount, decimals)?;

            info!(
                "Sending {} base units ({}) of {:?} to {}",
                units,
                format_units(units, decimals)?,
                contract,
                to
            );
            let receipt = wallet
                .transfer_token_with_cancel(&contract, to, units, *gas_limit, shutdown_signal())
                .await;
            report(receipt)?;
        }

        Commands::TokenInfo { contract, address } => {
            let settings = Settings::load(cli.config.as_deref())?;
            let provider = connect(&settings)?;
            let owner = match address {
                Some(address) => address.to_address()?,
                None => load_key(&settings)?.address(),
            };
            let token = Erc20Token::new(provider.as_ref(), contract.to_address()?);
            let info = token.info(owner).await?;
            print_json(json!({
                "contract": format!("{:?}", token.address()),
                "holder": format!("{:?}", owner),
                "symbol": info.symbol,
                "decimals": info.decimals,
                "balance": info.balance.to_string(),
                "formatted": format_units(info.balance, info.decimals)?,
            }));
        }
    }

    Ok(())
}

fn connect(settings: &Settings) -> Result<Arc<ChainProvider>> {
    Ok(Arc::new(ChainProvider::new(settings.network.clone())?))
}

/// Key from the configured environment variables; a private key wins over a phrase
fn load_key(settings: &Settings) -> Result<KeyMaterial> {
    if let Some(secret) = settings.wallet.private_key() {
        return Ok(KeyMaterial::from_private_key(secret.expose_secret())?);
    }
    if let Some(phrase) = settings.wallet.mnemonic() {
        return Ok(KeyMaterial::from_phrase(
            phrase.expose_secret(),
            Some(&settings.wallet.derivation_path),
        )?);
    }
    bail!(
        "No key configured. Set {} or {}",
        settings.wallet.private_key_env.as_deref().unwrap_or("a private key variable"),
        settings.wallet.mnemonic_env.as_deref().unwrap_or("a mnemonic variable")
    )
}

fn open_wallet(settings: &Settings) -> Result<SigningWallet> {
    let key = load_key(settings)?;
    let provider: Arc<dyn ProviderClient> = connect(settings)?;
    Ok(SigningWallet::new(
        key,
        provider,
        settings.network.chain_id,
        settings.tx.clone(),
    ))
}

fn report(outcome: ember_wallet::WalletResult<Receipt>) -> Result<()> {
    match outcome {
        Ok(receipt) => {
            print_json(json!({
                "transaction_hash": format!("{:?}", receipt.transaction_hash),
                "block_number": receipt.block_number,
                "success": receipt.is_success(),
                "gas_used": receipt.gas_used.to_string(),
                "effective_gas_price": receipt.effective_gas_price.map(|p| p.to_string()),
                "confirmed_at": receipt.confirmed_at.to_rfc3339(),
            }));
            if !receipt.is_success() {
                bail!("transaction reverted");
            }
            Ok(())
        }
        Err(e) if e.is_indeterminate() => {
            if let Some(hash) = e.pending_hash() {
                print_json(json!({
                    "transaction_hash": format!("{:?}", hash),
                    "pending": true,
                }));
            }
            bail!("{}; check the receipt again later", e)
        }
        Err(e) => Err(e.into()),
    }
}

fn print_json(value: serde_json::Value) {
    match serde_json::to_string_pretty(&value) {
        Ok(text) => println!("{}", text),
        Err(e) => warn!("Failed to render output: {}", e),
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,ember_wallet=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .init();
}

/// Resolves on Ctrl+C; used to stop waiting for a receipt
async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        warn!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
}

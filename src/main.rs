//! Doge Vault CLI Application
//!
//! Offline tooling for keys, signed messages, checks and P2SH scripts.

use clap::{Parser, Subcommand};
use doge_vault::cli::{self, AppState};
use doge_vault::config::VaultConfig;
use doge_vault::params::Network;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "vault")]
#[command(author = "Darshan")]
#[command(version = "0.1.0")]
#[command(about = "Self-custody Dogecoin wallet tooling", long_about = None)]
struct Cli {
    /// Data directory for config and records
    #[arg(short, long, default_value = ".doge_vault")]
    data_dir: PathBuf,

    /// Override the configured network (mainnet or testnet)
    #[arg(short, long)]
    network: Option<Network>,

    /// Override the configured fee rate, in smallest units per kB
    #[arg(long)]
    fee_per_kb: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a config file for the data directory
    Init,

    /// Key operations
    Key {
        #[command(subcommand)]
        action: KeyCommands,
    },

    /// Signed message operations
    Message {
        #[command(subcommand)]
        action: MessageCommands,
    },

    /// Check operations
    Check {
        #[command(subcommand)]
        action: CheckCommands,
    },

    /// Multisig operations
    Multisig {
        #[command(subcommand)]
        action: MultisigCommands,
    },

    /// Script construction
    Script {
        #[command(subcommand)]
        action: ScriptCommands,
    },
}

#[derive(Subcommand)]
enum KeyCommands {
    /// Generate a new standalone key
    New,

    /// Derive a receive key from a hex seed and print its WIF
    Export {
        /// Seed bytes as hex
        #[arg(short, long)]
        seed: String,

        /// Address index on the receive chain
        #[arg(short, long, default_value = "0")]
        index: u32,
    },

    /// Show the address controlled by a WIF
    Import {
        /// WIF-encoded private key
        wif: String,
    },
}

#[derive(Subcommand)]
enum MessageCommands {
    /// Sign a message with a WIF key
    Sign {
        #[arg(short, long)]
        wif: String,

        #[arg(short, long)]
        message: String,
    },

    /// Verify a base64 signature against an address
    Verify {
        #[arg(short, long)]
        address: String,

        #[arg(short, long)]
        message: String,

        #[arg(short, long)]
        signature: String,
    },
}

#[derive(Subcommand)]
enum CheckCommands {
    /// Decode a check QR payload
    Payload {
        /// `WIF|ADDRESS|LOCKTIME`, or a legacy shorter form
        payload: String,
    },

    /// List stored checks
    List,
}

#[derive(Subcommand)]
enum MultisigCommands {
    /// Build an M-of-N address and record it
    Create {
        /// Required signatures
        #[arg(short, long)]
        required: usize,

        /// Public keys as hex, repeated or comma separated
        #[arg(short, long, num_args = 1..)]
        pubkeys: Vec<String>,
    },
}

#[derive(Subcommand)]
enum ScriptCommands {
    /// Build a CLTV redeem script and its P2SH address
    Cltv {
        /// Block height or Unix timestamp
        #[arg(short, long)]
        locktime: u32,

        /// Public key as hex
        #[arg(short, long)]
        pubkey: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut config = VaultConfig::load(&cli.data_dir)?;
    if let Some(network) = cli.network {
        config.network = network;
    }
    if let Some(fee_per_kb) = cli.fee_per_kb {
        config.fee_per_kb = fee_per_kb;
    }

    if let Commands::Init = cli.command {
        config.save()?;
        println!(
            "✅ Vault initialized at {} ({})",
            config.data_dir.display(),
            config.network
        );
        return Ok(());
    }

    let state = AppState::from_config(config);

    match cli.command {
        Commands::Init => unreachable!(),

        Commands::Key { action } => match action {
            KeyCommands::New => cli::cmd_key_new(&state)?,
            KeyCommands::Export { seed, index } => cli::cmd_key_export(&state, &seed, index)?,
            KeyCommands::Import { wif } => cli::cmd_key_import(&state, &wif)?,
        },

        Commands::Message { action } => match action {
            MessageCommands::Sign { wif, message } => {
                cli::cmd_message_sign(&state, &wif, &message)?;
            }
            MessageCommands::Verify {
                address,
                message,
                signature,
            } => {
                cli::cmd_message_verify(&state, &address, &message, &signature)?;
            }
        },

        Commands::Check { action } => match action {
            CheckCommands::Payload { payload } => cli::cmd_check_payload(&state, &payload)?,
            CheckCommands::List => cli::cmd_check_list(&state)?,
        },

        Commands::Multisig { action } => match action {
            MultisigCommands::Create { required, pubkeys } => {
                cli::cmd_multisig_create(&state, required, &pubkeys)?;
            }
        },

        Commands::Script { action } => match action {
            ScriptCommands::Cltv { locktime, pubkey } => {
                cli::cmd_script_cltv(&state, locktime, &pubkey)?;
            }
        },
    }

    Ok(())
}

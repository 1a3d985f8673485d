//! CLI definition for pastel-credit.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Buy and inspect Pastel credit packs.
#[derive(Parser, Debug)]
#[command(name = "pastel-credit")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, short, env = "PASTEL_CREDIT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Network: mainnet, testnet or devnet.
    #[arg(long, env = "PASTEL_CREDIT_NETWORK")]
    pub network: Option<String>,

    /// PastelID used to sign requests.
    #[arg(long, env = "PASTEL_CREDIT_PASTELID")]
    pub pastelid: Option<String>,

    /// Passphrase unlocking the PastelID in pasteld.
    #[arg(long, env = "PASTEL_CREDIT_PASSPHRASE", hide_env_values = true)]
    pub passphrase: Option<String>,

    /// Root directory for persisted artifacts.
    #[arg(long, env = "PASTEL_CREDIT_ROOT_DIR")]
    pub root_dir: Option<PathBuf>,

    /// Base URL of the OpenNode API.
    #[arg(long, env = "PASTEL_CREDIT_OPENNODE_URL")]
    pub opennode_url: Option<String>,

    /// Log level.
    #[arg(long, env = "PASTEL_CREDIT_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to run.
    #[command(subcommand)]
    pub command: CreditCommand,
}

/// Credit pack commands.
#[derive(Subcommand, Debug)]
pub enum CreditCommand {
    /// Estimate the PSL cost of a credit pack.
    Estimate {
        /// Number of credits.
        credits: u64,
        /// Safety cushion as a fraction of the estimate.
        #[arg(long, default_value_t = 0.1)]
        cushion: f64,
    },
    /// Buy a credit pack.
    Purchase {
        /// Number of credits.
        credits: u64,
        /// PSL address that will track credit usage.
        #[arg(long)]
        tracking_address: String,
        /// Refuse to pay more than this in total (PSL).
        #[arg(long)]
        max_total: Option<f64>,
        /// Refuse to pay more than this per credit (PSL).
        #[arg(long)]
        max_per_credit: Option<f64>,
    },
    /// Ask the closest supernodes about a purchase request.
    Status {
        /// Request field hash.
        request_hash: String,
    },
    /// Print the supernode closest to an identifier.
    Closest {
        /// Any identifier, usually a PastelID or field hash.
        identifier: String,
    },
    /// List credit packs owned by the local PastelID.
    Tickets,
    /// Show the remaining credits of a pack.
    Balance {
        /// Ticket registration txid.
        txid: String,
    },
}

//! pastel-credit CLI entry point.

mod cli;

use clap::Parser;
use cli::{Cli, CreditCommand};
use color_eyre::eyre::eyre;
use pastel_credit_client::identity::PastelId;
use pastel_credit_client::{ClientConfig, CreditPackClient, PriceCeilings, PurchaseOutcome};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    info!("pastel-credit v{}", env!("CARGO_PKG_VERSION"));

    let config = build_config(&cli)?;
    let client = CreditPackClient::connect(config).await?;

    match cli.command {
        CreditCommand::Estimate { credits, cushion } => {
            let cost = client.estimate_purchase_cost(credits, cushion).await?;
            println!("{cost:.2}");
        }
        CreditCommand::Purchase {
            credits,
            tracking_address,
            max_total,
            max_per_credit,
        } => {
            let ceilings = PriceCeilings {
                max_total_psl: max_total,
                max_per_credit_psl: max_per_credit,
            };
            let report = client
                .purchase_credit_pack(credits, &tracking_address, ceilings)
                .await?;
            for transition in report.trace.transitions() {
                info!("{} at {}", transition.state, transition.at);
            }
            match report.outcome {
                PurchaseOutcome::Completed(receipt) => {
                    println!("{}", serde_json::to_string_pretty(&receipt)?);
                }
                PurchaseOutcome::PriceNotAgreed(evaluation) => {
                    return Err(eyre!(
                        "quote refused: {}",
                        serde_json::to_string(&evaluation)?
                    ));
                }
                PurchaseOutcome::Rejected { reason } => {
                    return Err(eyre!("request rejected: {reason}"));
                }
                PurchaseOutcome::Terminated { reason } => {
                    return Err(eyre!("negotiation terminated: {reason}"));
                }
            }
        }
        CreditCommand::Status { request_hash } => {
            let status = client.get_credit_pack_status(&request_hash).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        CreditCommand::Closest { identifier } => {
            let peer = client.find_closest_supernode(&identifier).await?;
            println!("{} {}", peer.pastelid, peer.url);
        }
        CreditCommand::Tickets => {
            let tickets = client.valid_credit_packs().await?;
            println!("{}", serde_json::to_string_pretty(&tickets)?);
        }
        CreditCommand::Balance { txid } => {
            let balance = client.credit_pack_balance(&txid).await?;
            println!("{} (as of {})", balance.current_balance, balance.as_of);
        }
    }

    Ok(())
}

fn build_config(cli: &Cli) -> color_eyre::Result<ClientConfig> {
    let mut config = match cli.config {
        Some(ref path) => ClientConfig::from_file(path)?,
        None => ClientConfig::default(),
    };

    if let Some(ref network) = cli.network {
        config.network = network.parse()?;
    }
    if let Some(ref pastelid) = cli.pastelid {
        config.pastelid = Some(pastelid.clone());
    }
    if let Some(ref passphrase) = cli.passphrase {
        config.rpc.pastelid_passphrase.clone_from(passphrase);
    }
    if let Some(ref root_dir) = cli.root_dir {
        config.root_dir.clone_from(root_dir);
    }
    if let Some(ref url) = cli.opennode_url {
        config.opennode_api_url.clone_from(url);
    }
    config.log_level.clone_from(&cli.log_level);

    let Some(ref pastelid) = config.pastelid else {
        return Err(eyre!("No PastelID configured. Use --pastelid or set it in the config file."));
    };
    PastelId::parse(pastelid)?;

    Ok(config)
}

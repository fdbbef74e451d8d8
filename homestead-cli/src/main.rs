//! Homestead CLI - drive the property escrow from the command line
//!
//! Everything runs against an in-memory title registry, so each invocation
//! is a self-contained walkthrough of the protocol.

use clap::{Parser, Subcommand};
use homestead_core::{Address, Amount};
use homestead_escrow::EscrowConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "homestead")]
#[command(about = "Multi-party escrow for tokenized property sales", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "HOMESTEAD_CONFIG")]
    config: Option<String>,

    /// Log level
    #[arg(long, env = "HOMESTEAD_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long, env = "HOMESTEAD_LOG_JSON")]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Mint three titles and list them for sale
    Demo {
        /// Designated buyer for every listing
        #[arg(long, default_value_t = Address::from_low_u64(1))]
        buyer: Address,
    },

    /// Run one sale from listing to finalization or cancellation
    Simulate {
        /// Purchase price in ether
        #[arg(long, default_value = "10")]
        price: Amount,

        /// Required earnest deposit in ether
        #[arg(long, default_value = "3")]
        earnest: Amount,

        /// Lender financing in ether
        #[arg(long, default_value = "10")]
        financing: Amount,

        /// Record a failed inspection and cancel instead of finalizing
        #[arg(long)]
        fail_inspection: bool,

        #[arg(long, default_value_t = Address::from_low_u64(1))]
        buyer: Address,
    },

    /// Print the effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| cli.log_level.clone().into());

    if cli.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let config = EscrowConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Demo { buyer } => commands::demo(config, buyer).await,
        Command::Simulate {
            price,
            earnest,
            financing,
            fail_inspection,
            buyer,
        } => {
            let plan = commands::SalePlan {
                price,
                earnest,
                financing,
                fail_inspection,
                buyer,
            };
            commands::simulate(config, plan).await
        }
        Command::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

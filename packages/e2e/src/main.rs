//! NFT Omnibridge E2E CLI
//!
//! - `nft-omnibridge-e2e run`    -> run the scenarios (exit code = failed count)
//! - `nft-omnibridge-e2e list`   -> print scenario names
//! - `nft-omnibridge-e2e status` -> check both chains and the AMBs

use alloy::primitives::Address;
use amb_relay::{
    ChainHandle, ChainSide, EvmChain, EvmChainConfig, Mediator, ThresholdSignatureAggregator,
};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use nft_omnibridge_e2e::scenarios::select;
use nft_omnibridge_e2e::{all_scenarios, run_scenarios, E2eConfig, Scenario, TestEnv, TestSuite};

#[derive(Parser)]
#[command(name = "nft-omnibridge-e2e")]
#[command(about = "E2E scenario suite for the NFT Omnibridge", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run E2E scenarios
    Run {
        /// Run only scenarios whose name contains this text
        #[arg(short, long)]
        scenario: Option<String>,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// List scenario names in run order
    List,

    /// Show chain heights, AMB addresses and the signature threshold
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    // RUST_LOG wins over the verbosity flag
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run { scenario, json } => {
            let config = E2eConfig::from_env()?;
            tracing::debug!(?config, "Loaded configuration");

            let scenarios = select(scenario.as_deref());
            if scenarios.is_empty() {
                tracing::warn!("No scenario matches {:?}", scenario);
            }

            let env = TestEnv::create(&config).await?;
            let mut suite = TestSuite::new("NFT Omnibridge E2E");
            for result in run_scenarios(&env, &scenarios).await {
                suite.add_result(result);
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&suite.report())?);
            } else {
                suite.print_summary();
            }

            let code = suite.exit_code();
            if code != 0 {
                std::process::exit(code);
            }
        }

        Commands::List => {
            for (i, scenario) in all_scenarios().iter().enumerate() {
                println!("{:>2}) {}", i + 1, scenario.name());
            }
        }

        Commands::Status => {
            let config = E2eConfig::from_env()?;
            println!();
            println!("Configuration:");
            println!("  Home RPC:     {}", config.home.rpc_url);
            println!("  Foreign RPC:  {}", config.foreign.rpc_url);
            println!();

            let mut home_amb = None;
            for side in [ChainSide::Home, ChainSide::Foreign] {
                match side_status(&config, side).await {
                    Ok((chain, block, amb)) => {
                        println!(
                            "  \x1b[32m●\x1b[0m {}: block {}, mediator {}, AMB {}",
                            side,
                            block,
                            config.side(side).mediator,
                            amb
                        );
                        if side == ChainSide::Home {
                            home_amb = Some((chain, amb));
                        }
                    }
                    Err(e) => println!("  \x1b[31m●\x1b[0m {}: {:#}", side, e),
                }
            }

            if let Some((chain, amb)) = home_amb {
                match ThresholdSignatureAggregator::new(chain, amb)
                    .required_signatures()
                    .await
                {
                    Ok(n) => println!("\nRequired signatures: {}", n),
                    Err(e) => println!("\nRequired signatures: unavailable ({})", e),
                }
            }
            println!();
        }
    }

    Ok(())
}

/// Read-only view of one side: block height and the mediator's AMB
async fn side_status(
    config: &E2eConfig,
    side: ChainSide,
) -> Result<(Arc<dyn ChainHandle>, u64, Address)> {
    let side_config = config.side(side);
    let chain: Arc<dyn ChainHandle> = Arc::new(EvmChain::new(EvmChainConfig::new(
        side,
        side_config.rpc_url.as_str(),
    ))?);
    let block = chain
        .block_number()
        .await
        .wrap_err_with(|| format!("{} RPC not responding", side))?;
    let amb = Mediator::new(chain.clone(), side_config.mediator)
        .bridge_contract()
        .await
        .wrap_err("Failed to read bridgeContract()")?;
    Ok((chain, block, amb))
}

pub mod bench;
pub mod catalog;
pub mod commands;
pub mod conf;
pub mod cost;
pub mod error;
pub mod lock;
pub mod plot;
pub mod pricing;
pub mod provision;
pub mod results;
pub mod snapshot;

use clap::Parser;
use clap::Subcommand;
use commands::*;
use conf::Conf;
use std::path::PathBuf;
use std::process::exit;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
  /// Config file to use instead of $FISHBENCH_CONF or the per-user fishbench.toml.
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
  /// Replay pricing snapshots to compare the reference deployment with the cheapest benchmarked alternative.
  Simulate {
    /// Plot running totals instead of per-minute costs.
    #[arg(long)]
    cumulative: bool,
  },
  /// Save a pricing snapshot every poll interval, until interrupted.
  GetData,
  /// Print every region's price per machine type and plot how much they vary.
  ShowPriceVariation,
  /// List instances left over from benchmark runs.
  ListRunningWorkers,
  /// Print and plot the cost per million nodes per second of each benchmarked machine type.
  ShowPricePerMnps,
  /// Print the priced machine type catalog.
  GetDefinedMachineTypes {
    /// Every region instead of only the cheapest per machine type.
    #[arg(long)]
    all: bool,
  },
  /// Print preemptible compute SKU prices per region.
  GetSkus,
  /// Benchmark every machine type that has no result yet.
  Bench,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let cli = Cli::parse();
  let conf = match Conf::load(cli.config.as_deref()) {
    Ok(conf) => conf,
    Err(err) => {
      error!(error = %err, "failed to load config");
      exit(1);
    }
  };

  let ctx = Ctx { conf };
  let res = match cli.command {
    Commands::Simulate { cumulative } => cmd_simulate(ctx, cumulative).await,
    Commands::GetData => cmd_get_data(ctx).await,
    Commands::ShowPriceVariation => cmd_show_price_variation(ctx).await,
    Commands::ListRunningWorkers => cmd_list_running_workers(ctx).await,
    Commands::ShowPricePerMnps => cmd_show_price_per_mnps(ctx).await,
    Commands::GetDefinedMachineTypes { all } => cmd_get_defined_machine_types(ctx, all).await,
    Commands::GetSkus => cmd_get_skus(ctx).await,
    Commands::Bench => cmd_bench(ctx).await,
  };
  if let Err(err) = res {
    error!(error = %err, "fatal");
    exit(1);
  };
}

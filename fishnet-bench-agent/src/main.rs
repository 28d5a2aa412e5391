pub mod error;
pub mod fishnet;
pub mod install;

use clap::Parser;
use error::Error;
use error::Result;
use fishbench_types::BenchmarkResult;
use fishbench_types::BENCH_LENGTH_SECS;
use fishnet::extract_nodes;
use fishnet::render_ini;
use fishnet::run_fishnet;
use fishnet::write_results;
use fishnet::IniParams;
use install::install;
use install::run_step;
use install::InstallOutcome;
use install::RetryPolicy;
use std::fs;
use std::path::PathBuf;
use std::process::exit;
use std::time::Duration;
use tracing::error;
use tracing::info;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
  /// Where to write the JSON array of results.
  #[arg(long, default_value = "results.json")]
  output: PathBuf,

  /// Fishnet key to work with.
  #[arg(long, env = "FISHNET_KEY", hide_env_values = true)]
  key: Option<String>,

  /// Directory fishnet.ini is written to and fishnet is run from.
  #[arg(long, default_value = ".")]
  workdir: PathBuf,

  #[arg(long, default_value = "/home/ubuntu")]
  engine_dir: String,

  /// Seconds to let fishnet run for.
  #[arg(long, default_value_t = BENCH_LENGTH_SECS)]
  bench_length: u64,

  /// Assume fishnet is already installed.
  #[arg(long)]
  skip_install: bool,

  #[arg(long, default_value_t = 5)]
  install_attempts: u32,

  #[arg(long, default_value_t = 10)]
  install_backoff_secs: u64,
}

fn run(cli: &Cli) -> Result<()> {
  if !cli.skip_install {
    let policy = RetryPolicy {
      max_attempts: cli.install_attempts,
      backoff: Duration::from_secs(cli.install_backoff_secs),
    };
    match install(&policy, run_step) {
      InstallOutcome::Installed { attempts } => info!(attempts, "installed fishnet"),
      InstallOutcome::GaveUp {
        attempts,
        last_error,
      } => warn!(attempts, %last_error, "giving up on installation, benchmarking anyway"),
    };
  };

  let key = cli.key.as_deref().unwrap_or_default();
  if key.is_empty() {
    warn!("no fishnet key, fishnet will likely refuse to start");
  };
  let n_cores = num_cpus::get() as u32;
  let ini_path = cli.workdir.join("fishnet.ini");

  let mut results = Vec::new();
  for n_thread_per_process in [n_cores] {
    let ini = render_ini(&IniParams {
      engine_dir: &cli.engine_dir,
      n_cores,
      n_thread_per_process,
      key,
    });
    fs::write(&ini_path, ini).map_err(|source| Error::Io {
      path: ini_path.clone(),
      source,
    })?;

    info!(
      n_cores,
      n_thread_per_process,
      bench_length = cli.bench_length,
      "starting benchmark"
    );
    let out = run_fishnet(&cli.workdir, cli.bench_length)?;
    if out.config_rejected() {
      warn!(stderr = %out.stderr.trim(), "fishnet rejected its configuration");
      break;
    };
    let Some(n_nodes) = extract_nodes(&out.stdout) else {
      warn!(stderr = %out.stderr.trim(), "fishnet never reported crunched nodes");
      continue;
    };
    let result = BenchmarkResult {
      n_cores,
      n_thread_per_process,
      bench_length: cli.bench_length,
      n_nodes,
    };
    info!(?result, "benchmark finished");
    results.push(result);
  }

  write_results(&cli.output, &results)?;
  info!(path = %cli.output.display(), count = results.len(), "results written");
  Ok(())
}

fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let cli = Cli::parse();
  if let Err(err) = run(&cli) {
    error!(error = %err, "fatal");
    exit(1);
  };
}

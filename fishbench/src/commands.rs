use crate::bench::CandidateOutcome;
use crate::bench::Orchestrator;
use crate::catalog::cheapest_per_type;
use crate::catalog::enumerate;
use crate::conf::Conf;
use crate::conf::API_KEY_ENV;
use crate::cost::price_per_mnps;
use crate::cost::price_variation;
use crate::cost::short_name;
use crate::cost::simulate;
use crate::cost::throughputs;
use crate::error::Error;
use crate::error::Result;
use crate::plot::price_per_mnps_chart;
use crate::plot::price_variation_chart;
use crate::plot::simulation_chart;
use crate::plot::write_svg;
use crate::pricing::PricingFetcher;
use crate::provision::gcloud::GcloudProvider;
use crate::provision::SpotProvider;
use crate::results::load_results;
use crate::snapshot::load_snapshots;
use crate::snapshot::poll;
use serde::Serialize;
use std::env::var;
use std::time::Duration;
use tracing::info;
use tracing::warn;

pub struct Ctx {
  pub conf: Conf,
}

impl Ctx {
  fn fetcher(&self) -> Result<PricingFetcher> {
    let api_key = var(API_KEY_ENV)
      .ok()
      .filter(|k| !k.is_empty())
      .ok_or(Error::MissingEnv(API_KEY_ENV))?;
    Ok(PricingFetcher::new(&self.conf, api_key))
  }

  fn provider(&self) -> GcloudProvider {
    GcloudProvider::new(self.conf.gcloud.clone())
  }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value).map_err(Error::Output)?);
  Ok(())
}

pub async fn cmd_simulate(ctx: Ctx, cumulative: bool) -> Result<()> {
  let snapshots = load_snapshots(&ctx.conf.pricing_dir)?;
  let results = load_results(&ctx.conf.results_dir)?;
  let sim = simulate(&snapshots, &throughputs(&results), &ctx.conf.reference);
  info!(
    snapshots = snapshots.len(),
    ticks = sim.ticks.len(),
    skipped_ticks = sim.skipped_ticks,
    "simulated"
  );

  let Some(last) = sim.ticks.last() else {
    warn!("no tick had a benchmarked reference entry, nothing to compare");
    return Ok(());
  };
  println!(
    "one reference instance ({}) has {:.2} mnps and costs ${:.4}/h",
    last.reference.name(),
    last.reference.mnps,
    last.reference.price
  );
  println!(
    "the cheapest instance ({}) has {:.2} mnps and costs ${:.4}/h",
    last.alternative.name(),
    last.alternative.mnps,
    last.alternative.price
  );
  println!("reference total: ${:.2}", sim.reference_total);
  println!("cheapest alternative total: ${:.2}", sim.alternative_total);
  println!("saving: {:.1}%", sim.saving_ratio() * 100.0);

  let path = write_svg(&ctx.conf.plot_dir, "simulate.svg", &simulation_chart(&sim, cumulative)?)?;
  info!(path = %path.display(), "wrote plot");
  Ok(())
}

pub async fn cmd_get_data(ctx: Ctx) -> Result<()> {
  let fetcher = ctx.fetcher()?;
  let interval = Duration::from_secs(ctx.conf.poll_interval_secs);
  info!(dir = %ctx.conf.pricing_dir.display(), ?interval, "polling pricing data");
  poll(&fetcher, &ctx.conf.pricing_dir, interval).await;
  Ok(())
}

pub async fn cmd_show_price_variation(ctx: Ctx) -> Result<()> {
  let prices = ctx.fetcher()?.fetch().await?;
  let variations = price_variation(&enumerate(&prices));
  for variation in variations.iter() {
    for (region, price) in variation.regions.iter() {
      println!("{} in {} costs {:.5}$", variation.instance_type, region, price);
    }
  }
  if variations.is_empty() {
    warn!("no machine types priced");
    return Ok(());
  };
  let path = write_svg(&ctx.conf.plot_dir, "price_variation.svg", &price_variation_chart(&variations)?)?;
  info!(path = %path.display(), "wrote plot");
  Ok(())
}

pub async fn cmd_list_running_workers(ctx: Ctx) -> Result<()> {
  let prefix = &ctx.conf.bench.vm_name_prefix;
  let instances = ctx.provider().list(prefix).await?;
  if instances.is_empty() {
    println!("no instances named {}*", prefix);
  };
  for i in instances {
    println!("{}\t{}\t{}\t{}", i.name, i.zone, i.machine_type, i.status);
  }
  Ok(())
}

pub async fn cmd_show_price_per_mnps(ctx: Ctx) -> Result<()> {
  let prices = ctx.fetcher()?.fetch().await?;
  let cheapest = cheapest_per_type(enumerate(&prices));
  let results = load_results(&ctx.conf.results_dir)?;
  let entries = price_per_mnps(&cheapest, &results);
  for e in entries.iter() {
    println!("{} {} {}", e.instance_type, e.region, e.cost_per_mnps);
  }
  if entries.is_empty() {
    warn!(dir = %ctx.conf.results_dir.display(), "no usable benchmark results");
    return Ok(());
  };
  let path = write_svg(&ctx.conf.plot_dir, "price_per_mnps.svg", &price_per_mnps_chart(&entries)?)?;
  info!(
    path = %path.display(),
    cheapest = %short_name(&entries[0].instance_type, &entries[0].region),
    "wrote plot"
  );
  Ok(())
}

pub async fn cmd_get_defined_machine_types(ctx: Ctx, all: bool) -> Result<()> {
  let prices = ctx.fetcher()?.fetch().await?;
  let machine_types = enumerate(&prices);
  let machine_types = if all {
    machine_types
  } else {
    cheapest_per_type(machine_types)
  };
  for machine_type in machine_types.iter() {
    print_json(machine_type)?;
  }
  Ok(())
}

pub async fn cmd_get_skus(ctx: Ctx) -> Result<()> {
  let prices = ctx.fetcher()?.fetch().await?;
  print_json(&prices)
}

pub async fn cmd_bench(ctx: Ctx) -> Result<()> {
  let prices = ctx.fetcher()?.fetch().await?;
  let candidates = cheapest_per_type(enumerate(&prices));
  info!(candidates = candidates.len(), "benchmarking machine types");

  let provider = ctx.provider();
  let orchestrator = Orchestrator::new(&provider, &ctx.conf.bench, &ctx.conf.results_dir);
  let outcomes = orchestrator.run(&candidates).await?;
  let completed = outcomes
    .iter()
    .filter(|(_, o)| *o == CandidateOutcome::Completed)
    .count();
  info!(candidates = outcomes.len(), completed, "benchmark run finished");
  Ok(())
}

use crate::catalog::MIN_VALID_PRICE;
use crate::conf::ReferenceConf;
use crate::snapshot::nearest;
use crate::snapshot::Snapshot;
use fishbench_types::BenchmarkResult;
use fishbench_types::PricedMachineType;
use fishbench_types::BENCH_LENGTH_SECS;
use std::collections::BTreeMap;
use tracing::debug;
use tracing::warn;

pub const TICK_SECS: i64 = 60;

// Lichess runs more instances in its busy evening window (UTC, inclusive at both ends).
pub const PEAK_START_HOUR: i64 = 18;
pub const PEAK_END_HOUR: i64 = 2;
pub const PEAK_REFERENCE_INSTANCES: u32 = 8;
pub const OFF_PEAK_REFERENCE_INSTANCES: u32 = 1;

/// Hourly price divided by throughput in million nodes per second.
pub fn cost_per_mnps(price: f64, mnps: f64) -> f64 {
  price / mnps
}

/// Throughput per benchmarked instance type. Results whose node count can't be parsed are logged and left out.
pub fn throughputs(results: &BTreeMap<String, BenchmarkResult>) -> BTreeMap<String, f64> {
  results
    .iter()
    .filter_map(|(instance_type, result)| match result.mnps() {
      Ok(mnps) => Some((instance_type.clone(), mnps)),
      Err(err) => {
        warn!(%instance_type, error = %err, "skipping result");
        None
      }
    })
    .collect()
}

#[derive(Clone, Debug, PartialEq)]
pub struct CostEntry {
  pub instance_type: String,
  pub region: String,
  pub price: f64,
  pub mnps: f64,
  pub cost_per_mnps: f64,
}

impl CostEntry {
  pub fn name(&self) -> String {
    format!("{}-{}", self.instance_type, self.region)
  }
}

/// Every validly priced entry that has a benchmark, cheapest per MNPS first.
pub fn rank_entries(
  machine_types: &[PricedMachineType],
  throughputs: &BTreeMap<String, f64>,
) -> Vec<CostEntry> {
  let mut entries: Vec<CostEntry> = machine_types
    .iter()
    .filter(|t| t.price > MIN_VALID_PRICE)
    .filter_map(|t| {
      let mnps = *throughputs.get(&t.instance_type)?;
      if mnps <= 0.0 {
        return None;
      };
      Some(CostEntry {
        instance_type: t.instance_type.clone(),
        region: t.region.clone(),
        price: t.price,
        mnps,
        cost_per_mnps: cost_per_mnps(t.price, mnps),
      })
    })
    .collect();
  entries.sort_by(|a, b| a.cost_per_mnps.total_cmp(&b.cost_per_mnps));
  entries
}

pub fn hour_of_day(t: i64) -> i64 {
  t.rem_euclid(24 * 60 * 60) / (60 * 60)
}

pub fn reference_instances(t: i64) -> u32 {
  let hour = hour_of_day(t);
  if hour <= PEAK_END_HOUR || hour >= PEAK_START_HOUR {
    PEAK_REFERENCE_INSTANCES
  } else {
    OFF_PEAK_REFERENCE_INSTANCES
  }
}

/// How many instances of `alternative` match the throughput of `reference_count` reference instances.
pub fn alternative_instances(reference: &CostEntry, alternative: &CostEntry, reference_count: u32) -> u32 {
  (reference.mnps / alternative.mnps * reference_count as f64).round() as u32
}

#[derive(Clone, Debug, PartialEq)]
pub struct Tick {
  pub timestamp: i64,
  pub snapshot_timestamp: i64,
  pub reference: CostEntry,
  pub reference_instances: u32,
  pub alternative: CostEntry,
  pub alternative_instances: u32,
  /// Cost of this minute.
  pub reference_cost: f64,
  pub alternative_cost: f64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Simulation {
  pub ticks: Vec<Tick>,
  pub skipped_ticks: usize,
  pub reference_total: f64,
  pub alternative_total: f64,
}

impl Simulation {
  /// Fraction of the reference cost that running the alternative instead would save.
  pub fn saving_ratio(&self) -> f64 {
    if self.reference_total > 0.0 {
      1.0 - self.alternative_total / self.reference_total
    } else {
      0.0
    }
  }
}

/// Replays the span of `snapshots` (sorted) minute by minute, comparing the reference deployment with the cheapest benchmarked alternative at that time.
pub fn simulate(
  snapshots: &[Snapshot],
  throughputs: &BTreeMap<String, f64>,
  reference: &ReferenceConf,
) -> Simulation {
  let mut sim = Simulation::default();
  let (Some(first), Some(last)) = (snapshots.first(), snapshots.last()) else {
    return sim;
  };

  let mut t = first.timestamp;
  while t <= last.timestamp {
    // Non-empty, so there is always a nearest snapshot.
    if let Some(snapshot) = nearest(snapshots, t) {
      match simulate_tick(t, snapshot, throughputs, reference) {
        Some(tick) => {
          sim.reference_total += tick.reference_cost;
          sim.alternative_total += tick.alternative_cost;
          sim.ticks.push(tick);
        }
        None => {
          warn!(
            t,
            snapshot = snapshot.timestamp,
            instance_type = %reference.instance_type,
            region = %reference.region,
            "snapshot has no benchmarked reference entry, skipping tick",
          );
          sim.skipped_ticks += 1;
        }
      };
    };
    t += TICK_SECS;
  }
  sim
}

fn simulate_tick(
  t: i64,
  snapshot: &Snapshot,
  throughputs: &BTreeMap<String, f64>,
  reference_conf: &ReferenceConf,
) -> Option<Tick> {
  let ranked = rank_entries(&snapshot.machine_types, throughputs);
  let reference = ranked
    .iter()
    .find(|e| e.instance_type == reference_conf.instance_type && e.region == reference_conf.region)?
    .clone();
  // The reference itself is ranked, so this exists whenever the reference does.
  let alternative = ranked.first()?.clone();

  let reference_instances = reference_instances(t);
  let alternative_instances = alternative_instances(&reference, &alternative, reference_instances);
  debug!(
    t,
    hour = hour_of_day(t),
    reference_instances,
    alternative = %alternative.name(),
    alternative_instances,
    "tick",
  );
  Some(Tick {
    timestamp: t,
    snapshot_timestamp: snapshot.timestamp,
    reference_cost: reference.price * reference_instances as f64 / 60.0,
    alternative_cost: alternative.price * alternative_instances as f64 / 60.0,
    reference,
    reference_instances,
    alternative,
    alternative_instances,
  })
}

/// Label for a price-per-MNPS bar.
pub fn short_name(instance_type: &str, region: &str) -> String {
  format!("{}-{}", instance_type.replace("-custom", ""), region)
}

/// Cost per MNPS of each benchmarked type in its cheapest region, cheapest first. Short runs are only trusted for n1 types.
pub fn price_per_mnps(
  cheapest: &[PricedMachineType],
  results: &BTreeMap<String, BenchmarkResult>,
) -> Vec<CostEntry> {
  let mut entries = Vec::new();
  for (instance_type, result) in results {
    if result.bench_length < BENCH_LENGTH_SECS && !instance_type.contains("n1") {
      warn!(%instance_type, bench_length = result.bench_length, "skipping short test");
      continue;
    };
    let Some(priced) = cheapest.iter().find(|t| &t.instance_type == instance_type) else {
      warn!(%instance_type, "not available");
      continue;
    };
    let mnps = match result.mnps() {
      Ok(mnps) => mnps,
      Err(err) => {
        warn!(%instance_type, error = %err, "skipping result");
        continue;
      }
    };
    entries.push(CostEntry {
      instance_type: instance_type.clone(),
      region: priced.region.clone(),
      price: priced.price,
      mnps,
      cost_per_mnps: cost_per_mnps(priced.price, mnps),
    });
  }
  entries.sort_by(|a, b| a.cost_per_mnps.total_cmp(&b.cost_per_mnps));
  entries
}

#[derive(Clone, Debug, PartialEq)]
pub struct PriceVariation {
  pub instance_type: String,
  /// Ascending by price.
  pub regions: Vec<(String, f64)>,
}

impl PriceVariation {
  pub fn label(&self) -> String {
    self
      .instance_type
      .replace("-custom", "")
      .replace("-standard", "")
  }

  /// Cheapest over most expensive region price.
  pub fn ratio(&self) -> f64 {
    match (self.regions.first(), self.regions.last()) {
      (Some((_, min)), Some((_, max))) if *max > 0.0 => min / max,
      _ => 1.0,
    }
  }
}

pub fn price_variation(machine_types: &[PricedMachineType]) -> Vec<PriceVariation> {
  let mut by_type: BTreeMap<&str, Vec<(String, f64)>> = BTreeMap::new();
  for t in machine_types {
    by_type
      .entry(&t.instance_type)
      .or_default()
      .push((t.region.clone(), t.price));
  }
  by_type
    .into_iter()
    .map(|(instance_type, mut regions)| {
      regions.sort_by(|a, b| a.1.total_cmp(&b.1));
      PriceVariation {
        instance_type: instance_type.to_string(),
        regions,
      }
    })
    .collect()
}

use crate::pricing::SkuPrices;
use fishbench_types::PricedMachineType;
use itertools::Itertools;

// Anything at or below this is a pricing glitch rather than a real price.
pub const MIN_VALID_PRICE: f64 = 0.000001;
const INVALID_PRICE_RANK: f64 = 999999.0;

#[derive(Clone, Copy, Debug)]
pub enum Naming {
  /// `{prefix}-custom-{vcpus}-{ram_mb}`.
  Custom(&'static str),
  /// `{prefix}-standard-{vcpus}`.
  Standard(&'static str),
}

impl Naming {
  pub fn instance_type(&self, vcpus: u32, quarter_gib: u32) -> String {
    match self {
      Naming::Custom(prefix) => format!("{}-custom-{}-{}", prefix, vcpus, quarter_gib * 256),
      Naming::Standard(prefix) => format!("{}-standard-{}", prefix, vcpus),
    }
  }
}

#[derive(Clone, Copy, Debug)]
pub struct MachineFamily {
  pub core_sku: &'static str,
  pub ram_sku: &'static str,
  /// RAM is sized in quarter GiB units, this many per vCPU.
  pub quarter_gib_per_vcpu: u32,
  pub vcpus: &'static [u32],
  pub naming: Naming,
}

pub const FAMILIES: &[MachineFamily] = &[
  MachineFamily {
    core_sku: "Preemptible Custom Instance Core",
    ram_sku: "Preemptible Custom Instance Ram",
    quarter_gib_per_vcpu: 4,
    vcpus: &[8, 16],
    naming: Naming::Custom("n1"),
  },
  MachineFamily {
    core_sku: "Preemptible N2 Custom Instance Core",
    ram_sku: "Preemptible N2 Custom Instance Ram",
    quarter_gib_per_vcpu: 2,
    vcpus: &[8, 16],
    naming: Naming::Custom("n2"),
  },
  MachineFamily {
    core_sku: "Preemptible E2 Instance Core",
    ram_sku: "Preemptible E2 Instance Ram",
    quarter_gib_per_vcpu: 2,
    vcpus: &[8, 16],
    naming: Naming::Custom("e2"),
  },
  MachineFamily {
    core_sku: "Preemptible N2D AMD Custom Instance Core",
    ram_sku: "Preemptible N2D AMD Custom Instance Ram",
    quarter_gib_per_vcpu: 2,
    vcpus: &[8, 16],
    naming: Naming::Custom("n2d"),
  },
  MachineFamily {
    core_sku: "Preemptible Compute optimized Core",
    ram_sku: "Preemptible Compute optimized Ram",
    quarter_gib_per_vcpu: 16,
    vcpus: &[8, 16],
    naming: Naming::Standard("c2"),
  },
  MachineFamily {
    core_sku: "Preemptible N1 Predefined Instance Core",
    ram_sku: "Preemptible N1 Predefined Instance Ram",
    quarter_gib_per_vcpu: 4,
    vcpus: &[4, 8, 16],
    naming: Naming::Standard("n1"),
  },
];

/// Every family shape in every region that prices both its cores and its RAM.
pub fn enumerate(prices: &SkuPrices) -> Vec<PricedMachineType> {
  let mut machine_types = Vec::new();
  for family in FAMILIES {
    for (region, region_prices) in prices {
      let (Some(core_price), Some(ram_price)) = (
        region_prices.get(family.core_sku),
        region_prices.get(family.ram_sku),
      ) else {
        continue;
      };
      for &vcpus in family.vcpus {
        let quarter_gib = family.quarter_gib_per_vcpu * vcpus;
        machine_types.push(PricedMachineType {
          instance_type: family.naming.instance_type(vcpus, quarter_gib),
          price: core_price * vcpus as f64 + ram_price * quarter_gib as f64 / 4.0,
          region: region.clone(),
        });
      }
    }
  }
  machine_types
}

fn price_rank(price: f64) -> f64 {
  if price > MIN_VALID_PRICE {
    price
  } else {
    INVALID_PRICE_RANK
  }
}

/// One entry per instance type, from its cheapest region, sorted by instance type.
pub fn cheapest_per_type(mut machine_types: Vec<PricedMachineType>) -> Vec<PricedMachineType> {
  machine_types.sort_by(|a, b| a.instance_type.cmp(&b.instance_type));
  let groups = machine_types
    .into_iter()
    .group_by(|t| t.instance_type.clone());
  let cheapest = groups
    .into_iter()
    .filter_map(|(_, group)| group.min_by(|a, b| price_rank(a.price).total_cmp(&price_rank(b.price))))
    .collect();
  cheapest
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::BTreeMap;

  fn prices(entries: &[(&str, &str, f64)]) -> SkuPrices {
    let mut prices: SkuPrices = BTreeMap::new();
    for (region, key, price) in entries {
      prices
        .entry(region.to_string())
        .or_default()
        .insert(key.to_string(), *price);
    }
    prices
  }

  fn mt(instance_type: &str, price: f64, region: &str) -> PricedMachineType {
    PricedMachineType {
      instance_type: instance_type.to_string(),
      price,
      region: region.to_string(),
    }
  }

  #[test]
  fn test_naming() {
    assert_eq!(Naming::Custom("n1").instance_type(8, 32), "n1-custom-8-8192");
    assert_eq!(Naming::Custom("n2d").instance_type(16, 32), "n2d-custom-16-8192");
    assert_eq!(Naming::Standard("c2").instance_type(16, 256), "c2-standard-16");
  }

  #[test]
  fn test_enumerate_prices_shapes() {
    let prices = prices(&[
      ("us-central1", "Preemptible Custom Instance Core", 0.5),
      ("us-central1", "Preemptible Custom Instance Ram", 0.25),
      ("us-central1", "Preemptible Compute optimized Core", 1.0),
      ("us-central1", "Preemptible Compute optimized Ram", 0.125),
      // No RAM price, so no E2 shapes.
      ("us-central1", "Preemptible E2 Instance Core", 0.1),
    ]);
    let all = enumerate(&prices);
    assert_eq!(all, vec![
      // 8 vCPUs × 0.5 + 8 GiB × 0.25.
      mt("n1-custom-8-8192", 6.0, "us-central1"),
      mt("n1-custom-16-16384", 12.0, "us-central1"),
      // 8 vCPUs × 1.0 + 32 GiB × 0.125.
      mt("c2-standard-8", 12.0, "us-central1"),
      mt("c2-standard-16", 24.0, "us-central1"),
    ]);
  }

  #[test]
  fn test_standard_n1_has_three_sizes() {
    let prices = prices(&[
      ("europe-west1", "Preemptible N1 Predefined Instance Core", 0.25),
      ("europe-west1", "Preemptible N1 Predefined Instance Ram", 0.5),
    ]);
    let names: Vec<_> = enumerate(&prices).into_iter().map(|t| t.instance_type).collect();
    assert_eq!(names, vec!["n1-standard-4", "n1-standard-8", "n1-standard-16"]);
    assert_eq!(enumerate(&prices)[0].price, 0.25 * 4.0 + 0.5 * 4.0);
  }

  #[test]
  fn test_enumerate_is_deterministic() {
    let prices = prices(&[
      ("us-east1", "Preemptible N2 Custom Instance Core", 0.0079),
      ("us-east1", "Preemptible N2 Custom Instance Ram", 0.0011),
      ("europe-west4", "Preemptible N2 Custom Instance Core", 0.0087),
      ("europe-west4", "Preemptible N2 Custom Instance Ram", 0.0012),
      ("asia-east1", "Preemptible N2D AMD Custom Instance Core", 0.0069),
      ("asia-east1", "Preemptible N2D AMD Custom Instance Ram", 0.0009),
    ]);
    let first = enumerate(&prices);
    assert_eq!(first.len(), 6);
    assert_eq!(first, enumerate(&prices.clone()));
  }

  #[test]
  fn test_cheapest_per_type() {
    let reduced = cheapest_per_type(vec![
      mt("n2-custom-8-4096", 0.09, "us-east1"),
      mt("e2-custom-8-4096", 0.05, "us-east1"),
      mt("n2-custom-8-4096", 0.07, "europe-west4"),
      mt("e2-custom-8-4096", 0.06, "europe-west1"),
    ]);
    assert_eq!(reduced, vec![
      mt("e2-custom-8-4096", 0.05, "us-east1"),
      mt("n2-custom-8-4096", 0.07, "europe-west4"),
    ]);
  }

  #[test]
  fn test_cheapest_ignores_near_zero_prices() {
    let reduced = cheapest_per_type(vec![
      mt("c2-standard-8", 0.0, "us-west2"),
      mt("c2-standard-8", 0.0000005, "us-west3"),
      mt("c2-standard-8", 0.12, "us-central1"),
      mt("c2-standard-16", 0.0, "us-west2"),
    ]);
    assert_eq!(reduced, vec![
      // Nothing valid for the 16 vCPU shape, so the glitched entry is all there is.
      mt("c2-standard-16", 0.0, "us-west2"),
      mt("c2-standard-8", 0.12, "us-central1"),
    ]);
  }
}

use crate::conf::Conf;
use crate::error::Error;
use crate::error::Result;
use gcp_billing_client::BillingClient;
use gcp_billing_client::Sku;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use tracing::info;
use tracing::warn;

pub const COMPUTE_ENGINE_SERVICE: &str = "Compute Engine";

/// Price given to SKUs without any tiered rate. High enough to never be the cheapest option.
pub const UNAVAILABLE_PRICE: f64 = 9999.0;

/// Region → SKU description (up to "running") → hourly price.
pub type SkuPrices = BTreeMap<String, BTreeMap<String, f64>>;

/// Only the first tiered rate of the first pricing info is considered.
pub fn sku_price(sku: &Sku) -> Result<f64> {
  let Some(rate) = sku
    .pricing_info
    .first()
    .and_then(|info| info.pricing_expression.tiered_rates.first())
  else {
    return Ok(UNAVAILABLE_PRICE);
  };
  let units: i64 = match rate.unit_price.units.as_deref() {
    None => 0,
    Some(units) => units
      .trim()
      .parse()
      .map_err(|_| Error::InvalidUnitPrice {
        description: sku.description.clone(),
        units: units.to_string(),
      })?,
  };
  Ok(units as f64 + rate.unit_price.nanos as f64 / 1_000_000_000.0)
}

/// "Preemptible N2 Custom Instance Core running in Americas" → "Preemptible N2 Custom Instance Core".
pub fn sku_key(description: &str) -> &str {
  description
    .split("running")
    .next()
    .unwrap_or(description)
    .trim()
}

fn is_preemptible_cpu(sku: &Sku) -> bool {
  sku.category.usage_type == "Preemptible"
    && sku.category.resource_family == "Compute"
    && !sku.description.contains("GPU")
}

pub fn fold_skus(skus: Vec<Sku>, region_blacklist: &BTreeSet<String>) -> Result<SkuPrices> {
  let mut priced = skus
    .into_iter()
    .map(|sku| Ok((sku_price(&sku)?, sku)))
    .collect::<Result<Vec<_>>>()?;
  // Ascending, so that when several SKUs share a key in a region the most expensive one is kept.
  priced.sort_by(|a, b| a.0.total_cmp(&b.0));

  let mut prices = SkuPrices::new();
  for (price, sku) in priced {
    if !is_preemptible_cpu(&sku) {
      continue;
    };
    let expression = sku.pricing_info.first().map(|i| &i.pricing_expression);
    if let Some(expression) = expression.filter(|e| e.tiered_rates.len() > 1) {
      warn!(
        description = %sku.description,
        tiered_rates = ?expression.tiered_rates,
        "sku has multiple tiered rates, only the first is used",
      );
    };
    if sku.pricing_info.len() > 1 {
      warn!(
        description = %sku.description,
        pricing_info = ?sku.pricing_info,
        "sku has multiple pricing infos, only the first is used",
      );
    };

    let key = sku_key(&sku.description);
    for region in sku.geo_taxonomy.regions.iter() {
      if region_blacklist.contains(region) {
        continue;
      };
      prices
        .entry(region.clone())
        .or_default()
        .insert(key.to_string(), price);
    }
  }
  Ok(prices)
}

pub struct PricingFetcher {
  client: BillingClient,
  region_blacklist: BTreeSet<String>,
}

impl PricingFetcher {
  pub fn new(conf: &Conf, api_key: String) -> PricingFetcher {
    PricingFetcher {
      client: BillingClient::new(conf.billing_endpoint.clone(), api_key),
      region_blacklist: conf.region_blacklist.clone(),
    }
  }

  pub async fn fetch(&self) -> Result<SkuPrices> {
    let service_id = self.client.find_service_id(COMPUTE_ENGINE_SERVICE).await?;
    let skus = self.client.list_skus(&service_id).await?;
    info!(%service_id, sku_count = skus.len(), "fetched skus");
    fold_skus(skus, &self.region_blacklist)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use gcp_billing_client::Category;
  use gcp_billing_client::GeoTaxonomy;
  use gcp_billing_client::Money;
  use gcp_billing_client::PricingExpression;
  use gcp_billing_client::PricingInfo;
  use gcp_billing_client::TieredRate;
  use tracing_test::traced_test;

  fn rate(units: &str, nanos: i64) -> TieredRate {
    TieredRate {
      start_usage_amount: 0.0,
      unit_price: Money {
        units: Some(units.to_string()),
        nanos,
      },
    }
  }

  fn sku(description: &str, regions: &[&str], rates: Vec<TieredRate>) -> Sku {
    Sku {
      sku_id: String::new(),
      description: description.to_string(),
      category: Category {
        resource_family: "Compute".to_string(),
        usage_type: "Preemptible".to_string(),
      },
      geo_taxonomy: GeoTaxonomy {
        regions: regions.iter().map(|r| r.to_string()).collect(),
      },
      pricing_info: vec![PricingInfo {
        pricing_expression: PricingExpression {
          usage_unit: "h".to_string(),
          tiered_rates: rates,
        },
      }],
    }
  }

  fn priced_sku(description: &str, regions: &[&str], nanos: i64) -> Sku {
    sku(description, regions, vec![rate("0", nanos)])
  }

  #[test]
  fn test_empty_tiered_rates_get_unavailable_price() {
    let s = sku("Preemptible E2 Instance Core running in Sydney", &["australia-southeast1"], vec![]);
    assert_eq!(sku_price(&s).unwrap(), UNAVAILABLE_PRICE);

    let mut no_info = s.clone();
    no_info.pricing_info.clear();
    assert_eq!(sku_price(&no_info).unwrap(), UNAVAILABLE_PRICE);
  }

  #[test]
  fn test_price_uses_first_tiered_rate_only() {
    let s = sku(
      "Preemptible Custom Instance Core running in Americas",
      &["us-central1"],
      vec![rate("1", 250_000_000), rate("7", 0)],
    );
    assert_eq!(sku_price(&s).unwrap(), 1.25);

    let s = sku("x", &[], vec![rate("0", 6_986_000)]);
    assert_eq!(sku_price(&s).unwrap(), 6_986_000.0 / 1e9);

    let mut missing_units = s.clone();
    missing_units.pricing_info[0].pricing_expression.tiered_rates[0]
      .unit_price
      .units = None;
    assert_eq!(sku_price(&missing_units).unwrap(), 6_986_000.0 / 1e9);
  }

  #[test]
  fn test_non_integer_units_is_an_error() {
    let s = sku("x", &[], vec![rate("0.5", 0)]);
    assert!(matches!(
      sku_price(&s),
      Err(Error::InvalidUnitPrice { .. })
    ));
  }

  #[test]
  fn test_sku_key() {
    assert_eq!(
      sku_key("Preemptible N2 Custom Instance Ram running in Montreal"),
      "Preemptible N2 Custom Instance Ram"
    );
    assert_eq!(sku_key("  No suffix "), "No suffix");
  }

  #[test]
  fn test_fold_filters_and_keeps_most_expensive_duplicate() {
    let mut on_demand = priced_sku("Custom Instance Core running in Americas", &["us-central1"], 33_174_000);
    on_demand.category.usage_type = "OnDemand".to_string();
    let gpu = priced_sku("Preemptible Nvidia Tesla T4 GPU running in Americas", &["us-central1"], 110_000_000);
    let mut ram_family = priced_sku("Preemptible Storage running in Americas", &["us-central1"], 1);
    ram_family.category.resource_family = "Storage".to_string();

    let skus = vec![
      priced_sku("Preemptible Custom Instance Core running in Americas", &["us-central1", "us-east1"], 7_000_000),
      priced_sku("Preemptible Custom Instance Core running in Iowa", &["us-central1"], 6_000_000),
      priced_sku("Preemptible Custom Instance Ram running in Americas", &["us-central1", "asia-east1"], 900_000),
      on_demand,
      gpu,
      ram_family,
    ];
    let blacklist = BTreeSet::from(["asia-east1".to_string()]);
    let prices = fold_skus(skus, &blacklist).unwrap();

    assert_eq!(prices.keys().collect::<Vec<_>>(), vec!["us-central1", "us-east1"]);
    let central = &prices["us-central1"];
    assert_eq!(central.len(), 2);
    assert_eq!(central["Preemptible Custom Instance Core"], 0.007);
    assert_eq!(central["Preemptible Custom Instance Ram"], 0.0009);
    assert_eq!(prices["us-east1"]["Preemptible Custom Instance Core"], 0.007);
  }

  #[traced_test]
  #[test]
  fn test_fold_warns_on_ignored_rates_and_pricing_infos() {
    let tiered = sku(
      "Preemptible N2D AMD Instance Core running in Americas",
      &["us-central1"],
      vec![rate("0", 5_000_000), rate("0", 4_000_000)],
    );
    let mut two_infos = priced_sku("Preemptible N2D AMD Instance Ram running in Americas", &["us-central1"], 700_000);
    let extra = two_infos.pricing_info[0].clone();
    two_infos.pricing_info.push(extra);

    let prices = fold_skus(vec![tiered, two_infos], &BTreeSet::new()).unwrap();
    let central = &prices["us-central1"];
    assert_eq!(central["Preemptible N2D AMD Instance Core"], 0.005);
    assert_eq!(central["Preemptible N2D AMD Instance Ram"], 0.0007);
    assert!(logs_contain("multiple tiered rates"));
    assert!(logs_contain("multiple pricing infos"));
  }

  #[traced_test]
  #[test]
  fn test_fold_single_rate_does_not_warn() {
    fold_skus(
      vec![priced_sku("Preemptible C2 Instance Core running in Americas", &["us-central1"], 9_000_000)],
      &BTreeSet::new(),
    )
    .unwrap();
    assert!(!logs_contain("multiple tiered rates"));
    assert!(!logs_contain("multiple pricing infos"));
  }
}

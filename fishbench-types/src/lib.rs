use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Wall-clock seconds the remote runner lets the worker crunch for.
pub const BENCH_LENGTH_SECS: u64 = 1000;

static NODE_COUNT_RE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"^\s*(\d+(?:\.\d+)?)\s*(million|billion)?\s*$").unwrap());

#[derive(Debug, Error, PartialEq)]
#[error("unrecognised node count {0:?}")]
pub struct NodeCountError(pub String);

// The `instance-type` key is kept as-is so that snapshots written by earlier tooling still load.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct PricedMachineType {
  #[serde(rename = "instance-type")]
  pub instance_type: String,
  /// Price per hour, in the billing account's currency.
  pub price: f64,
  pub region: String,
}

/// One entry of the results file written by the remote runner. The file itself is a JSON array of these.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct BenchmarkResult {
  pub n_cores: u32,
  pub n_thread_per_process: u32,
  pub bench_length: u64,
  /// As printed by the worker, e.g. "123.4 million".
  pub n_nodes: String,
}

/// Parses a worker node count such as "123.4 million" into millions of nodes. A bare number is taken as millions already.
pub fn parse_million_nodes(raw: &str) -> Result<f64, NodeCountError> {
  let err = || NodeCountError(raw.to_string());
  let caps = NODE_COUNT_RE.captures(raw).ok_or_else(err)?;
  let value: f64 = caps[1].parse().map_err(|_| err())?;
  Ok(match caps.get(2).map(|m| m.as_str()) {
    Some("billion") => value * 1000.0,
    _ => value,
  })
}

impl BenchmarkResult {
  pub fn million_nodes(&self) -> Result<f64, NodeCountError> {
    parse_million_nodes(&self.n_nodes)
  }

  /// Throughput in million nodes per second.
  pub fn mnps(&self) -> Result<f64, NodeCountError> {
    Ok(self.million_nodes()? / self.bench_length as f64)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_million_nodes() {
    assert_eq!(parse_million_nodes("200 million"), Ok(200.0));
    assert_eq!(parse_million_nodes("123.4 million"), Ok(123.4));
    assert_eq!(parse_million_nodes(" 12 "), Ok(12.0));
    assert_eq!(parse_million_nodes("1.5 billion"), Ok(1500.0));
    assert!(parse_million_nodes("lots").is_err());
    assert!(parse_million_nodes("").is_err());
  }

  #[test]
  fn test_mnps() {
    let result = BenchmarkResult {
      n_cores: 8,
      n_thread_per_process: 8,
      bench_length: BENCH_LENGTH_SECS,
      n_nodes: "200 million".to_string(),
    };
    assert_eq!(result.mnps(), Ok(0.2));
  }

  #[test]
  fn test_priced_machine_type_uses_legacy_key() {
    let raw = r#"[{"instance-type": "n1-custom-8-8192", "price": 0.0642, "region": "us-central1"}]"#;
    let parsed: Vec<PricedMachineType> = serde_json::from_str(raw).unwrap();
    assert_eq!(parsed[0].instance_type, "n1-custom-8-8192");
    assert_eq!(parsed[0].region, "us-central1");
    let out = serde_json::to_string(&parsed[0]).unwrap();
    assert!(out.contains(r#""instance-type":"n1-custom-8-8192""#));
  }
}

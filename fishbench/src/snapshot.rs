use crate::catalog::enumerate;
use crate::error::Error;
use crate::error::Result;
use crate::pricing::PricingFetcher;
use chrono::Utc;
use fishbench_types::PricedMachineType;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::sleep;
use tracing::info;
use tracing::warn;

static FILENAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)\.json$").unwrap());

/// Every priced shape in every region, as of `timestamp` (Unix seconds).
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
  pub timestamp: i64,
  pub machine_types: Vec<PricedMachineType>,
}

fn parse_filename(filename: &str) -> Option<i64> {
  let caps = FILENAME_RE.captures(filename)?;
  caps.get(1)?.as_str().parse().ok()
}

pub fn write_snapshot(
  dir: &Path,
  timestamp: i64,
  machine_types: &[PricedMachineType],
) -> Result<PathBuf> {
  let io_err = |source| Error::Io {
    path: dir.to_path_buf(),
    source,
  };
  fs::create_dir_all(dir).map_err(io_err)?;
  let path = dir.join(format!("{}.json", timestamp));
  let raw = serde_json::to_vec(machine_types).map_err(|source| Error::Json {
    path: path.clone(),
    source,
  })?;
  fs::write(&path, raw).map_err(|source| Error::Io {
    path: path.clone(),
    source,
  })?;
  Ok(path)
}

/// Sorted by timestamp. Files not named `<unix ts>.json` are ignored.
pub fn load_snapshots(dir: &Path) -> Result<Vec<Snapshot>> {
  let io_err = |source| Error::Io {
    path: dir.to_path_buf(),
    source,
  };
  let mut snapshots = Vec::new();
  for entry in fs::read_dir(dir).map_err(io_err)? {
    let entry = entry.map_err(io_err)?;
    let filename = entry.file_name().to_string_lossy().to_string();
    let Some(timestamp) = parse_filename(&filename) else {
      continue;
    };
    let path = entry.path();
    let raw = fs::read_to_string(&path).map_err(|source| Error::Io {
      path: path.clone(),
      source,
    })?;
    let machine_types = serde_json::from_str(&raw).map_err(|source| Error::Json { path, source })?;
    snapshots.push(Snapshot {
      timestamp,
      machine_types,
    });
  }
  if snapshots.is_empty() {
    return Err(Error::NoSnapshots(dir.to_path_buf()));
  };
  snapshots.sort_by_key(|s| s.timestamp);
  Ok(snapshots)
}

/// The snapshot closest in time to `t`, preferring the earlier one on a tie. `snapshots` must be sorted.
pub fn nearest(snapshots: &[Snapshot], t: i64) -> Option<&Snapshot> {
  let after = snapshots.partition_point(|s| s.timestamp < t);
  let before = after.checked_sub(1).map(|i| &snapshots[i]);
  match (before, snapshots.get(after)) {
    (Some(b), Some(a)) if a.timestamp - t < t - b.timestamp => Some(a),
    (Some(b), _) => Some(b),
    (None, a) => a,
  }
}

/// Fetches pricing and writes a snapshot every `interval`, forever. Failures are logged and don't stop polling.
pub async fn poll(fetcher: &PricingFetcher, dir: &Path, interval: Duration) {
  loop {
    let now = Utc::now();
    let time = now.format("%H:%M").to_string();
    match fetcher.fetch().await {
      Ok(prices) => match write_snapshot(dir, now.timestamp(), &enumerate(&prices)) {
        Ok(path) => info!(%time, path = %path.display(), "saved pricing data"),
        Err(err) => warn!(%time, error = %err, "failed to save pricing data"),
      },
      Err(err) => warn!(%time, error = %err, "failed to fetch pricing data"),
    };
    sleep(interval).await;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn mt(instance_type: &str, price: f64) -> PricedMachineType {
    PricedMachineType {
      instance_type: instance_type.to_string(),
      price,
      region: "us-central1".to_string(),
    }
  }

  fn snapshot(timestamp: i64) -> Snapshot {
    Snapshot {
      timestamp,
      machine_types: vec![],
    }
  }

  #[test]
  fn test_parse_filename() {
    assert_eq!(parse_filename("1620000000.json"), Some(1620000000));
    assert_eq!(parse_filename("1620000000.json.tmp"), None);
    assert_eq!(parse_filename("latest.json"), None);
  }

  #[test]
  fn test_write_then_load_sorted() {
    let dir = tempfile::tempdir().unwrap();
    write_snapshot(dir.path(), 1620000120, &[mt("n1-custom-8-8192", 0.07)]).unwrap();
    write_snapshot(dir.path(), 1620000060, &[mt("n1-custom-8-8192", 0.06)]).unwrap();
    fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let snapshots = load_snapshots(dir.path()).unwrap();
    assert_eq!(
      snapshots.iter().map(|s| s.timestamp).collect::<Vec<_>>(),
      vec![1620000060, 1620000120]
    );
    assert_eq!(snapshots[0].machine_types, vec![mt("n1-custom-8-8192", 0.06)]);
  }

  #[test]
  fn test_empty_dir_has_no_snapshots() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(load_snapshots(dir.path()), Err(Error::NoSnapshots(_))));
  }

  #[test]
  fn test_nearest() {
    let snapshots = vec![snapshot(100), snapshot(200), snapshot(400)];
    assert_eq!(nearest(&snapshots, 0).unwrap().timestamp, 100);
    assert_eq!(nearest(&snapshots, 140).unwrap().timestamp, 100);
    assert_eq!(nearest(&snapshots, 150).unwrap().timestamp, 100);
    assert_eq!(nearest(&snapshots, 151).unwrap().timestamp, 200);
    assert_eq!(nearest(&snapshots, 200).unwrap().timestamp, 200);
    assert_eq!(nearest(&snapshots, 1000).unwrap().timestamp, 400);
    assert!(nearest(&[], 100).is_none());
  }
}

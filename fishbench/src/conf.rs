use crate::error::Error;
use crate::error::Result;
use dirs::config_dir;
use gcp_billing_client::DEFAULT_ENDPOINT;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeSet;
use std::env::var_os;
use std::fs::read_to_string;
use std::path::Path;
use std::path::PathBuf;

pub const API_KEY_ENV: &str = "GCLOUD_API_KEY";
pub const CONF_PATH_ENV: &str = "FISHBENCH_CONF";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GcloudConf {
  /// Path to or name of the gcloud executable.
  pub binary: PathBuf,
  pub image_project: String,
  pub image_family: String,
  pub subnet: String,
  pub ssh_user: String,
}

impl Default for GcloudConf {
  fn default() -> Self {
    Self {
      binary: PathBuf::from("gcloud"),
      image_project: "ubuntu-os-cloud".to_string(),
      image_family: "ubuntu-2004-lts".to_string(),
      subnet: "defaulteuwb1".to_string(),
      ssh_user: "ubuntu".to_string(),
    }
  }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BenchConf {
  /// VM names are this prefix followed by 20 random lowercase letters.
  pub vm_name_prefix: String,
  /// Locally built remote runner binary that gets copied onto each VM.
  pub agent_path: PathBuf,
  pub remote_agent_path: String,
  pub remote_results_path: String,
  /// Passed to the remote runner as FISHNET_KEY.
  pub fishnet_key: Option<String>,
  pub upload_attempts: u32,
  pub upload_retry_delay_secs: u64,
}

impl Default for BenchConf {
  fn default() -> Self {
    Self {
      vm_name_prefix: "fishnetbench-".to_string(),
      agent_path: PathBuf::from("target/release/fishnet-bench-agent"),
      remote_agent_path: "/home/ubuntu/fishnet-bench-agent".to_string(),
      remote_results_path: "/home/ubuntu/results.json".to_string(),
      fishnet_key: None,
      upload_attempts: 21,
      upload_retry_delay_secs: 5,
    }
  }
}

/// The deployment that cheaper spot capacity is compared against.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReferenceConf {
  pub instance_type: String,
  pub region: String,
}

impl Default for ReferenceConf {
  fn default() -> Self {
    Self {
      instance_type: "n1-custom-8-8192".to_string(),
      region: "us-central1".to_string(),
    }
  }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Conf {
  pub billing_endpoint: String,
  // Regions with too many preemptions to be worth benchmarking or pricing.
  pub region_blacklist: BTreeSet<String>,
  /// One `<instance-type>.json` result file (and transient `.lock` file) per machine type.
  pub results_dir: PathBuf,
  /// One `<unix timestamp>.json` pricing snapshot per poll.
  pub pricing_dir: PathBuf,
  pub plot_dir: PathBuf,
  pub poll_interval_secs: u64,
  pub gcloud: GcloudConf,
  pub bench: BenchConf,
  pub reference: ReferenceConf,
}

impl Default for Conf {
  fn default() -> Self {
    Self {
      billing_endpoint: DEFAULT_ENDPOINT.to_string(),
      region_blacklist: BTreeSet::new(),
      results_dir: PathBuf::from("fishnet_benchmarker/data/gcp"),
      pricing_dir: PathBuf::from("pricing_data"),
      plot_dir: PathBuf::from("plots"),
      poll_interval_secs: 60,
      gcloud: GcloudConf::default(),
      bench: BenchConf::default(),
      reference: ReferenceConf::default(),
    }
  }
}

impl Conf {
  pub fn parse(raw: &str, path: &Path) -> Result<Conf> {
    toml::from_str(raw).map_err(|source| Error::ConfigParse {
      path: path.to_path_buf(),
      source,
    })
  }

  fn read(path: &Path) -> Result<Conf> {
    let raw = read_to_string(path).map_err(|source| Error::Io {
      path: path.to_path_buf(),
      source,
    })?;
    Conf::parse(&raw, path)
  }

  /// An explicit path (from the CLI or FISHBENCH_CONF) must exist. The per-user config file is optional; built-in defaults are used without it.
  pub fn load(explicit: Option<&Path>) -> Result<Conf> {
    if let Some(path) = explicit {
      return Conf::read(path);
    };
    if let Some(path) = var_os(CONF_PATH_ENV) {
      return Conf::read(Path::new(&path));
    };
    match config_dir().map(|d| d.join("fishbench.toml")) {
      Some(path) if path.is_file() => Conf::read(&path),
      _ => Ok(Conf::default()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_config_uses_defaults() {
    let conf = Conf::parse("", Path::new("fishbench.toml")).unwrap();
    assert_eq!(conf.poll_interval_secs, 60);
    assert_eq!(conf.bench.upload_attempts, 21);
    assert_eq!(conf.reference.instance_type, "n1-custom-8-8192");
    assert_eq!(conf.gcloud.ssh_user, "ubuntu");
    assert!(conf.region_blacklist.is_empty());
  }

  #[test]
  fn test_partial_config_overrides() {
    let raw = r#"
      region_blacklist = ["asia-east1", "europe-north1"]
      results_dir = "/tmp/results"

      [bench]
      upload_retry_delay_secs = 0
      fishnet_key = "abc"

      [reference]
      region = "europe-west1"
    "#;
    let conf = Conf::parse(raw, Path::new("fishbench.toml")).unwrap();
    assert!(conf.region_blacklist.contains("asia-east1"));
    assert_eq!(conf.results_dir, PathBuf::from("/tmp/results"));
    assert_eq!(conf.bench.upload_retry_delay_secs, 0);
    assert_eq!(conf.bench.upload_attempts, 21);
    assert_eq!(conf.bench.fishnet_key.as_deref(), Some("abc"));
    assert_eq!(conf.reference.instance_type, "n1-custom-8-8192");
    assert_eq!(conf.reference.region, "europe-west1");
  }

  #[test]
  fn test_unknown_field_is_rejected() {
    let err = Conf::parse("upload_attempts = 3", Path::new("fishbench.toml")).unwrap_err();
    assert!(matches!(err, Error::ConfigParse { .. }));
  }

  #[test]
  fn test_explicit_path_must_exist() {
    let dir = tempfile::tempdir().unwrap();
    let err = Conf::load(Some(&dir.path().join("missing.toml"))).unwrap_err();
    assert!(matches!(err, Error::Io { .. }));
  }
}

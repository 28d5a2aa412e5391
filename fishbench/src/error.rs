use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("environment variable {0} is not set")]
  MissingEnv(&'static str),

  #[error("failed to parse config {path}: {source}")]
  ConfigParse {
    path: PathBuf,
    source: toml::de::Error,
  },

  #[error("I/O error on {path}: {source}")]
  Io { path: PathBuf, source: io::Error },

  #[error("malformed JSON in {path}: {source}")]
  Json {
    path: PathBuf,
    source: serde_json::Error,
  },

  #[error("failed to serialize output: {0}")]
  Output(#[source] serde_json::Error),

  #[error(transparent)]
  Billing(#[from] gcp_billing_client::Error),

  #[error("sku {description:?} has a non-integer unit price {units:?}")]
  InvalidUnitPrice { description: String, units: String },

  #[error("failed to run {program}: {source}")]
  Spawn { program: String, source: io::Error },

  #[error("{program} exited unsuccessfully: {output}")]
  CommandFailed { program: String, output: String },

  // The remaining variants abort a benchmark run: carrying on could leave paid instances running unnoticed.
  #[error("creating spot instance {vm_name} in {zone} failed unexpectedly: {output}")]
  CreateFailed {
    vm_name: String,
    zone: String,
    output: String,
  },

  #[error("could not upload to {vm_name} after {attempts} attempts: {output}")]
  UploadAttemptsExhausted {
    vm_name: String,
    attempts: u32,
    output: String,
  },

  #[error("deleting spot instance {vm_name} in {zone} failed: {output}")]
  DestroyFailed {
    vm_name: String,
    zone: String,
    output: String,
  },

  #[error("no pricing snapshots found in {0}")]
  NoSnapshots(PathBuf),

  #[error("failed to render chart: {0}")]
  Chart(String),
}

pub type Result<T> = std::result::Result<T, Error>;

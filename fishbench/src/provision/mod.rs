use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

pub mod gcloud;

/// How a single remote operation went, as judged from the CLI's output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
  Success,
  /// The zone cannot currently provide the machine type; another zone may.
  TransientCapacityError,
  /// The provider reclaimed the spot instance mid-operation.
  Interrupted,
  Fatal(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instance {
  pub name: String,
  pub zone: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunningInstance {
  pub name: String,
  pub zone: String,
  pub machine_type: String,
  pub status: String,
}

/// Errors are reserved for failing to invoke the provider at all; anything the provider itself reports is an `Outcome`.
#[async_trait]
pub trait SpotProvider: Send + Sync {
  async fn create(&self, instance: &Instance, machine_type: &str) -> Result<Outcome>;
  async fn upload(&self, instance: &Instance, local: &Path, remote: &str) -> Result<Outcome>;
  async fn download(&self, instance: &Instance, remote: &str, local: &Path) -> Result<Outcome>;
  async fn execute(&self, instance: &Instance, command: &str) -> Result<Outcome>;
  async fn destroy(&self, instance: &Instance) -> Result<Outcome>;
  async fn list(&self, name_prefix: &str) -> Result<Vec<RunningInstance>>;
}

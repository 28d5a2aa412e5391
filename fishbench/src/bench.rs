use crate::conf::BenchConf;
use crate::error::Error;
use crate::error::Result;
use crate::lock::LockFile;
use crate::provision::Instance;
use crate::provision::Outcome;
use crate::provision::SpotProvider;
use crate::results::read_result_file;
use fishbench_types::PricedMachineType;
use rand::thread_rng;
use rand::Rng;
use std::fs::create_dir_all;
use std::fs::metadata;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;
use tracing::info;
use tracing::warn;

/// Zones are tried in this order within the candidate's region.
pub const ZONE_SUFFIXES: [char; 6] = ['a', 'b', 'c', 'd', 'e', 'f'];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CandidateOutcome {
  AlreadyBenchmarked,
  /// Another run holds the lock, or one leaked it.
  Locked,
  /// No zone in the region could provide the machine type.
  NoCapacity,
  /// The spot instance was reclaimed before the benchmark finished.
  Interrupted,
  /// The benchmark ran to the end and the instance was deleted. The result may still be missing if collecting it failed.
  Completed,
}

pub fn vm_name(prefix: &str) -> String {
  let mut rng = thread_rng();
  let suffix: String = (0..20).map(|_| rng.gen_range(b'a'..=b'z') as char).collect();
  format!("{}{}", prefix, suffix)
}

pub fn result_path(results_dir: &Path, instance_type: &str) -> PathBuf {
  results_dir.join(format!("{}.json", instance_type))
}

pub fn lock_path(results_dir: &Path, instance_type: &str) -> PathBuf {
  results_dir.join(format!("{}.lock", instance_type))
}

pub fn remote_command(conf: &BenchConf) -> String {
  let env = conf
    .fishnet_key
    .as_ref()
    .map(|key| format!("FISHNET_KEY={} ", key))
    .unwrap_or_default();
  format!(
    "chmod +x {agent} && {env}{agent} --output {results}",
    agent = conf.remote_agent_path,
    env = env,
    results = conf.remote_results_path,
  )
}

pub struct Orchestrator<'a> {
  provider: &'a dyn SpotProvider,
  conf: &'a BenchConf,
  results_dir: &'a Path,
}

impl<'a> Orchestrator<'a> {
  pub fn new(provider: &'a dyn SpotProvider, conf: &'a BenchConf, results_dir: &'a Path) -> Self {
    Self {
      provider,
      conf,
      results_dir,
    }
  }

  /// Benchmarks every candidate that hasn't been yet. Returns early with an error on anything that could leave an instance running unattended.
  pub async fn run(
    &self,
    candidates: &[PricedMachineType],
  ) -> Result<Vec<(String, CandidateOutcome)>> {
    metadata(&self.conf.agent_path).map_err(|source| Error::Io {
      path: self.conf.agent_path.clone(),
      source,
    })?;
    create_dir_all(self.results_dir).map_err(|source| Error::Io {
      path: self.results_dir.to_path_buf(),
      source,
    })?;

    let mut outcomes = Vec::new();
    for candidate in candidates {
      let outcome = self.bench_candidate(candidate).await?;
      info!(instance_type = %candidate.instance_type, ?outcome, "candidate done");
      outcomes.push((candidate.instance_type.clone(), outcome));
    }
    Ok(outcomes)
  }

  pub async fn bench_candidate(&self, candidate: &PricedMachineType) -> Result<CandidateOutcome> {
    let instance_type = candidate.instance_type.as_str();
    let result_path = result_path(self.results_dir, instance_type);
    if result_path.exists() {
      info!(instance_type, "already benchmarked, skipping");
      return Ok(CandidateOutcome::AlreadyBenchmarked);
    };
    create_dir_all(self.results_dir).map_err(|source| Error::Io {
      path: self.results_dir.to_path_buf(),
      source,
    })?;
    let lock_path = lock_path(self.results_dir, instance_type);
    let Some(lock) = LockFile::acquire(&lock_path)? else {
      warn!(instance_type, lock = %lock_path.display(), "being benchmarked (or lock leaked), skipping");
      return Ok(CandidateOutcome::Locked);
    };
    self.bench_locked(candidate, lock).await
  }

  /// Runs a candidate whose lock is already held. Another run may have written the result and released the lock since the unlocked check.
  async fn bench_locked(&self, candidate: &PricedMachineType, lock: LockFile) -> Result<CandidateOutcome> {
    let instance_type = candidate.instance_type.as_str();
    let result_path = result_path(self.results_dir, instance_type);
    if result_path.exists() {
      info!(instance_type, "benchmarked by another run while locking, skipping");
      return Ok(CandidateOutcome::AlreadyBenchmarked);
    };
    info!(
      instance_type,
      region = %candidate.region,
      price = candidate.price,
      lock = %lock.path().display(),
      "benchmarking"
    );

    let Some(instance) = self.provision(candidate).await? else {
      warn!(instance_type, region = %candidate.region, "no zone could create the instance, skipping");
      return Ok(CandidateOutcome::NoCapacity);
    };

    let outcome = match self.benchmark_on(&instance, &result_path).await {
      Ok(outcome) => outcome,
      Err(err) => {
        self.destroy_best_effort(&instance).await;
        return Err(err);
      }
    };
    match outcome {
      CandidateOutcome::Interrupted => {
        warn!(instance_type, vm_name = %instance.name, "we have been interrupted");
        // A preempted instance still exists (stopped) until deleted.
        self.destroy_best_effort(&instance).await;
      }
      _ => self.teardown(&instance).await?,
    };
    Ok(outcome)
  }

  async fn provision(&self, candidate: &PricedMachineType) -> Result<Option<Instance>> {
    let name = vm_name(&self.conf.vm_name_prefix);
    info!(vm_name = %name, "making spot instance");
    for suffix in ZONE_SUFFIXES {
      let instance = Instance {
        name: name.clone(),
        zone: format!("{}-{}", candidate.region, suffix),
      };
      match self
        .provider
        .create(&instance, &candidate.instance_type)
        .await?
      {
        Outcome::Success => {
          info!(vm_name = %instance.name, zone = %instance.zone, "created spot instance");
          return Ok(Some(instance));
        }
        Outcome::TransientCapacityError | Outcome::Interrupted => {
          debug!(zone = %instance.zone, "zone cannot provide machine type");
        }
        Outcome::Fatal(output) => {
          return Err(Error::CreateFailed {
            vm_name: instance.name,
            zone: instance.zone,
            output,
          });
        }
      };
    }
    Ok(None)
  }

  /// Returns `Interrupted` or `Completed`.
  async fn benchmark_on(&self, instance: &Instance, result_path: &Path) -> Result<CandidateOutcome> {
    if !self.deliver_agent(instance).await? {
      return Ok(CandidateOutcome::Interrupted);
    };

    info!(vm_name = %instance.name, "running benchmark, should take <20 minutes");
    match self
      .provider
      .execute(instance, &remote_command(self.conf))
      .await?
    {
      Outcome::Success => info!(vm_name = %instance.name, "benchmark finished"),
      Outcome::Interrupted => return Ok(CandidateOutcome::Interrupted),
      Outcome::TransientCapacityError => warn!(vm_name = %instance.name, "benchmark failed"),
      Outcome::Fatal(output) => warn!(vm_name = %instance.name, %output, "benchmark failed"),
    };

    match self
      .provider
      .download(instance, &self.conf.remote_results_path, result_path)
      .await?
    {
      Outcome::Success => log_result(result_path),
      Outcome::Fatal(output) => warn!(%output, "failed to get results"),
      other => warn!(?other, "failed to get results"),
    };
    Ok(CandidateOutcome::Completed)
  }

  /// Returns false if the instance was preempted. Keeps retrying other failures, as freshly created instances often refuse connections for a while.
  async fn deliver_agent(&self, instance: &Instance) -> Result<bool> {
    let attempts = self.conf.upload_attempts;
    let mut last_output = String::new();
    for attempt in 1..=attempts {
      match self
        .provider
        .upload(instance, &self.conf.agent_path, &self.conf.remote_agent_path)
        .await?
      {
        Outcome::Success => return Ok(true),
        Outcome::Interrupted => return Ok(false),
        Outcome::TransientCapacityError => last_output.clear(),
        Outcome::Fatal(output) => last_output = output,
      };
      debug!(attempt, attempts, "upload failed");
      if attempt < attempts && self.conf.upload_retry_delay_secs > 0 {
        sleep(Duration::from_secs(self.conf.upload_retry_delay_secs)).await;
      };
    }
    Err(Error::UploadAttemptsExhausted {
      vm_name: instance.name.clone(),
      attempts,
      output: last_output,
    })
  }

  async fn teardown(&self, instance: &Instance) -> Result<()> {
    info!(vm_name = %instance.name, "deleting spot instance");
    match self.provider.destroy(instance).await? {
      Outcome::Success => Ok(()),
      Outcome::Fatal(output) => Err(Error::DestroyFailed {
        vm_name: instance.name.clone(),
        zone: instance.zone.clone(),
        output,
      }),
      other => Err(Error::DestroyFailed {
        vm_name: instance.name.clone(),
        zone: instance.zone.clone(),
        output: format!("{:?}", other),
      }),
    }
  }

  async fn destroy_best_effort(&self, instance: &Instance) {
    match self.provider.destroy(instance).await {
      Ok(Outcome::Success) => info!(vm_name = %instance.name, "deleted spot instance"),
      Ok(other) => warn!(vm_name = %instance.name, ?other, "could not delete spot instance, check for leftovers"),
      Err(err) => warn!(vm_name = %instance.name, error = %err, "could not delete spot instance, check for leftovers"),
    };
  }
}

fn log_result(path: &Path) {
  match read_result_file(path) {
    Ok(Some(result)) => match result.mnps() {
      Ok(mnps) => info!(n_nodes = %result.n_nodes, mnps, "got result"),
      Err(err) => warn!(error = %err, "result has an unparseable node count"),
    },
    Ok(None) => warn!(path = %path.display(), "result file is empty"),
    Err(err) => warn!(error = %err, "result file is unreadable"),
  };
}

use super::Instance;
use super::Outcome;
use super::RunningInstance;
use super::SpotProvider;
use crate::conf::GcloudConf;
use crate::error::Error;
use crate::error::Result;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

// Markers the gcloud CLI prints. These are the only place the provider's text output is interpreted.
const CREATED: &str = "Created";
const DELETED: &str = "Delete";
const ERROR: &str = "ERROR";
const CAPACITY_ERRORS: &[&str] = &["does not exist in zone", "ZONE_RESOURCE_POOL_EXHAUSTED"];
const PREEMPTION_SIGNS: &[&str] = &["External IP", "unexpectedly closed"];

pub fn classify_create(output: &str) -> Outcome {
  if output.contains(CREATED) {
    Outcome::Success
  } else if CAPACITY_ERRORS.iter().any(|m| output.contains(m)) {
    Outcome::TransientCapacityError
  } else {
    Outcome::Fatal(output.to_string())
  }
}

/// Applies to scp and ssh. An instance that was preempted loses its external IP, and any open connection to it is dropped.
pub fn classify_remote(output: &str) -> Outcome {
  if !output.contains(ERROR) {
    Outcome::Success
  } else if PREEMPTION_SIGNS.iter().any(|m| output.contains(m)) {
    Outcome::Interrupted
  } else {
    Outcome::Fatal(output.to_string())
  }
}

pub fn classify_destroy(output: &str) -> Outcome {
  if output.contains(DELETED) {
    Outcome::Success
  } else {
    Outcome::Fatal(output.to_string())
  }
}

/// Parses `--format=value(name,zone,machineType,status)` output, which is tab separated.
pub fn parse_instance_list(stdout: &str) -> Vec<RunningInstance> {
  stdout
    .lines()
    .filter_map(|line| {
      let mut cols = line.split('\t').map(str::trim);
      let name = cols.next().filter(|n| !n.is_empty())?;
      Some(RunningInstance {
        name: name.to_string(),
        zone: cols.next().unwrap_or_default().to_string(),
        machine_type: cols.next().unwrap_or_default().to_string(),
        status: cols.next().unwrap_or_default().to_string(),
      })
    })
    .collect()
}

struct CommandOutput {
  success: bool,
  stdout: String,
  stderr: String,
}

impl CommandOutput {
  fn combined(&self) -> String {
    format!("{}{}", self.stdout, self.stderr)
  }
}

pub struct GcloudProvider {
  conf: GcloudConf,
}

impl GcloudProvider {
  pub fn new(conf: GcloudConf) -> GcloudProvider {
    GcloudProvider { conf }
  }

  fn remote(&self, instance: &Instance) -> String {
    format!("{}@{}", self.conf.ssh_user, instance.name)
  }

  async fn run(&self, args: Vec<OsString>) -> Result<CommandOutput> {
    debug!(?args, "running gcloud");
    let output = Command::new(&self.conf.binary)
      .args(&args)
      .stdin(Stdio::null())
      .output()
      .await
      .map_err(|source| Error::Spawn {
        program: self.conf.binary.display().to_string(),
        source,
      })?;
    Ok(CommandOutput {
      success: output.status.success(),
      stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
      stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
  }
}

fn args<const N: usize>(parts: [&str; N]) -> Vec<OsString> {
  parts.into_iter().map(OsString::from).collect()
}

#[async_trait]
impl SpotProvider for GcloudProvider {
  async fn create(&self, instance: &Instance, machine_type: &str) -> Result<Outcome> {
    let out = self
      .run(args([
        "compute",
        "instances",
        "create",
        "--machine-type",
        machine_type,
        "--zone",
        &instance.zone,
        &instance.name,
        "--image-project",
        &self.conf.image_project,
        "--image-family",
        &self.conf.image_family,
        "--subnet",
        &self.conf.subnet,
        "--preemptible",
      ]))
      .await?;
    Ok(classify_create(&out.combined()))
  }

  async fn upload(&self, instance: &Instance, local: &Path, remote: &str) -> Result<Outcome> {
    let mut cmd = args(["compute", "scp", "--force-key-file-overwrite"]);
    cmd.push(local.into());
    cmd.extend(args([
      format!("{}:{}", self.remote(instance), remote).as_str(),
      "--zone",
      &instance.zone,
    ]));
    let out = self.run(cmd).await?;
    Ok(classify_remote(&out.combined()))
  }

  async fn download(&self, instance: &Instance, remote: &str, local: &Path) -> Result<Outcome> {
    let mut cmd = args([
      "compute",
      "scp",
      "--force-key-file-overwrite",
      format!("{}:{}", self.remote(instance), remote).as_str(),
    ]);
    cmd.push(local.into());
    cmd.extend(args(["--zone", &instance.zone]));
    let out = self.run(cmd).await?;
    Ok(classify_remote(&out.combined()))
  }

  async fn execute(&self, instance: &Instance, command: &str) -> Result<Outcome> {
    let out = self
      .run(args([
        "compute",
        "ssh",
        "--force-key-file-overwrite",
        &self.remote(instance),
        "--command",
        command,
        "--zone",
        &instance.zone,
      ]))
      .await?;
    Ok(classify_remote(&out.combined()))
  }

  async fn destroy(&self, instance: &Instance) -> Result<Outcome> {
    let out = self
      .run(args([
        "-q",
        "compute",
        "instances",
        "delete",
        &instance.name,
        "--zone",
        &instance.zone,
      ]))
      .await?;
    Ok(classify_destroy(&out.combined()))
  }

  async fn list(&self, name_prefix: &str) -> Result<Vec<RunningInstance>> {
    let out = self
      .run(args([
        "compute",
        "instances",
        "list",
        "--filter",
        &format!("name~^{}", name_prefix),
        "--format",
        "value(name,zone,machineType,status)",
      ]))
      .await?;
    if !out.success {
      return Err(Error::CommandFailed {
        program: self.conf.binary.display().to_string(),
        output: out.combined(),
      });
    };
    Ok(parse_instance_list(&out.stdout))
  }
}

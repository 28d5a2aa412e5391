use std::process::Command;
use std::process::Stdio;
use std::thread::sleep;
use std::time::Duration;
use tracing::info;
use tracing::warn;

pub const INSTALL_STEPS: &[&[&str]] = &[
  &["sudo", "apt", "update", "-y"],
  &["sudo", "apt", "install", "-y", "python3-pip"],
  &["pip3", "install", "--user", "fishnet"],
];

#[derive(Clone, Debug)]
pub struct RetryPolicy {
  pub max_attempts: u32,
  pub backoff: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 5,
      backoff: Duration::from_secs(10),
    }
  }
}

#[derive(Debug, PartialEq, Eq)]
pub enum InstallOutcome {
  Installed { attempts: u32 },
  GaveUp { attempts: u32, last_error: String },
}

/// Runs one command to completion, capturing its output. Failing to start and exiting unsuccessfully both count as failure.
pub fn run_step(argv: &[&str]) -> Result<(), String> {
  let (program, args) = argv
    .split_first()
    .ok_or_else(|| "empty command".to_string())?;
  info!(command = %argv.join(" "), "running");
  let output = Command::new(program)
    .args(args)
    .stdin(Stdio::null())
    .output()
    .map_err(|err| format!("failed to run {}: {}", program, err))?;
  if output.status.success() {
    Ok(())
  } else {
    Err(format!(
      "{} exited with {}: {}",
      argv.join(" "),
      output.status,
      String::from_utf8_lossy(&output.stderr).trim()
    ))
  }
}

/// Runs every install step in order, starting over from the first step on any failure.
pub fn install(
  policy: &RetryPolicy,
  mut step_runner: impl FnMut(&[&str]) -> Result<(), String>,
) -> InstallOutcome {
  let mut last_error = String::new();
  for attempt in 1..=policy.max_attempts {
    match INSTALL_STEPS.iter().try_for_each(|step| step_runner(*step)) {
      Ok(()) => return InstallOutcome::Installed { attempts: attempt },
      Err(err) => {
        warn!(attempt, max_attempts = policy.max_attempts, error = %err, "installation failed");
        last_error = err;
      }
    };
    if attempt < policy.max_attempts && !policy.backoff.is_zero() {
      sleep(policy.backoff);
    };
  }
  InstallOutcome::GaveUp {
    attempts: policy.max_attempts,
    last_error,
  }
}

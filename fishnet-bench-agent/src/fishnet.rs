use crate::error::Error;
use crate::error::Result;
use fishbench_types::BenchmarkResult;
use std::fs;
use std::path::Path;
use std::process::Command;
use std::process::Stdio;

pub const ENDPOINT: &str = "https://lichess.org/fishnet/";
const CONFIG_ERROR: &str = "ConfigError";

pub struct IniParams<'a> {
  pub engine_dir: &'a str,
  pub n_cores: u32,
  pub n_thread_per_process: u32,
  pub key: &'a str,
}

pub fn render_ini(p: &IniParams) -> String {
  format!(
    "[Fishnet]
enginedir = {engine_dir}
cores = {n_cores}
threads-per-process = {n_thread_per_process}
userbacklog = 0s
systembacklog = 0s
endpoint = {endpoint}
key = {key}

[Stockfish]",
    engine_dir = p.engine_dir,
    n_cores = p.n_cores,
    n_thread_per_process = p.n_thread_per_process,
    endpoint = ENDPOINT,
    key = p.key,
  )
}

/// "... crunched 1234 million nodes ..." → "1234 million". Only the last report counts, as fishnet prints a running total.
pub fn extract_nodes(stdout: &str) -> Option<String> {
  let (_, tail) = stdout.rsplit_once("crunched ")?;
  let nodes = tail.split(" nodes").next()?.trim();
  if nodes.is_empty() {
    None
  } else {
    Some(nodes.to_string())
  }
}

pub struct RunOutput {
  pub stdout: String,
  pub stderr: String,
}

impl RunOutput {
  pub fn config_rejected(&self) -> bool {
    self.stdout.contains(CONFIG_ERROR) || self.stderr.contains(CONFIG_ERROR)
  }
}

/// Runs fishnet from `workdir` (where fishnet.ini lives) until `timeout` kills it.
pub fn run_fishnet(workdir: &Path, bench_length: u64) -> Result<RunOutput> {
  let output = Command::new("timeout")
    .arg(bench_length.to_string())
    .args(["python3", "-m", "fishnet"])
    .current_dir(workdir)
    .stdin(Stdio::null())
    .output()
    .map_err(|source| Error::Spawn {
      program: "timeout".to_string(),
      source,
    })?;
  Ok(RunOutput {
    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
  })
}

pub fn write_results(path: &Path, results: &[BenchmarkResult]) -> Result<()> {
  let raw = serde_json::to_string(results).map_err(Error::Serialize)?;
  fs::write(path, raw).map_err(|source| Error::Io {
    path: path.to_path_buf(),
    source,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_render_ini() {
    let ini = render_ini(&IniParams {
      engine_dir: "/home/ubuntu",
      n_cores: 8,
      n_thread_per_process: 8,
      key: "abcdef",
    });
    assert_eq!(
      ini,
      "[Fishnet]\nenginedir = /home/ubuntu\ncores = 8\nthreads-per-process = 8\nuserbacklog = 0s\nsystembacklog = 0s\nendpoint = https://lichess.org/fishnet/\nkey = abcdef\n\n[Stockfish]"
    );
  }

  #[test]
  fn test_extract_nodes() {
    let stdout = "\
INFO Starting fishnet
INFO [fishnet v1.x] Analyzed 10 positions, crunched 41 million nodes
INFO [fishnet v1.x] Analyzed 120 positions, crunched 523.5 million nodes
";
    assert_eq!(extract_nodes(stdout).as_deref(), Some("523.5 million"));
    assert_eq!(extract_nodes("INFO Starting fishnet\n"), None);
    assert_eq!(extract_nodes("crunched  nodes"), None);
  }

  #[test]
  fn test_config_rejected() {
    let out = RunOutput {
      stdout: String::new(),
      stderr: "fishnet.ConfigError: Fishnet key required".to_string(),
    };
    assert!(out.config_rejected());
  }

  #[test]
  fn test_write_results() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("results.json");
    write_results(&path, &[BenchmarkResult {
      n_cores: 16,
      n_thread_per_process: 16,
      bench_length: 1000,
      n_nodes: "987 million".to_string(),
    }])
    .unwrap();
    let parsed: Vec<BenchmarkResult> = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(parsed[0].n_cores, 16);
    assert_eq!(parsed[0].mnps(), Ok(0.987));
  }
}

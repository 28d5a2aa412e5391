use crate::error::Error;
use crate::error::Result;
use fishbench_types::BenchmarkResult;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::warn;

/// The remote runner writes an array; only its first entry is ever used.
pub fn read_result_file(path: &Path) -> Result<Option<BenchmarkResult>> {
  let raw = fs::read_to_string(path).map_err(|source| Error::Io {
    path: path.to_path_buf(),
    source,
  })?;
  let results: Vec<BenchmarkResult> = serde_json::from_str(&raw).map_err(|source| Error::Json {
    path: path.to_path_buf(),
    source,
  })?;
  Ok(results.into_iter().next())
}

/// Instance type → result, for every `<instance-type>.json` in `dir`. Files that can't be used are logged and skipped. A missing directory has no results.
pub fn load_results(dir: &Path) -> Result<BTreeMap<String, BenchmarkResult>> {
  let entries = match fs::read_dir(dir) {
    Ok(entries) => entries,
    Err(err) if err.kind() == ErrorKind::NotFound => {
      warn!(dir = %dir.display(), "results directory does not exist");
      return Ok(BTreeMap::new());
    }
    Err(source) => {
      return Err(Error::Io {
        path: dir.to_path_buf(),
        source,
      })
    }
  };

  let mut results = BTreeMap::new();
  for entry in entries {
    let path = entry
      .map_err(|source| Error::Io {
        path: dir.to_path_buf(),
        source,
      })?
      .path();
    if path.extension().and_then(|e| e.to_str()) != Some("json") {
      continue;
    };
    let Some(instance_type) = path.file_stem().and_then(|s| s.to_str()) else {
      continue;
    };
    match read_result_file(&path) {
      Ok(Some(result)) => {
        results.insert(instance_type.to_string(), result);
      }
      Ok(None) => warn!(path = %path.display(), "result file is empty, skipping"),
      Err(err) => warn!(error = %err, "skipping unusable result file"),
    };
  }
  Ok(results)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_load_results() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
      dir.path().join("n2-custom-8-4096.json"),
      r#"[{"n_cores": 8, "n_thread_per_process": 8, "bench_length": 1000, "n_nodes": "310 million"}, {"n_cores": 8, "n_thread_per_process": 4, "bench_length": 1000, "n_nodes": "1 million"}]"#,
    )
    .unwrap();
    fs::write(dir.path().join("e2-custom-8-4096.json"), "[]").unwrap();
    fs::write(dir.path().join("c2-standard-8.json"), "{not json").unwrap();
    fs::write(dir.path().join("c2-standard-16.lock"), "1234\n").unwrap();

    let results = load_results(dir.path()).unwrap();
    assert_eq!(results.len(), 1);
    let result = &results["n2-custom-8-4096"];
    assert_eq!(result.n_thread_per_process, 8);
    assert_eq!(result.n_nodes, "310 million");
  }

  #[test]
  fn test_missing_dir_has_no_results() {
    let dir = tempfile::tempdir().unwrap();
    assert!(load_results(&dir.path().join("gcp")).unwrap().is_empty());
  }

  #[test]
  fn test_read_result_file_reports_bad_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("x.json");
    fs::write(&path, r#"[{"n_cores": 8}]"#).unwrap();
    assert!(matches!(read_result_file(&path), Err(Error::Json { .. })));
  }
}

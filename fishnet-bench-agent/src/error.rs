use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("failed to run {program}: {source}")]
  Spawn { program: String, source: io::Error },

  #[error("I/O error on {path}: {source}")]
  Io { path: PathBuf, source: io::Error },

  #[error("failed to serialize results: {0}")]
  Serialize(#[source] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

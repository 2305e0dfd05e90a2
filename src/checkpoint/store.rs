use super::state::Checkpoint;
use futures::future::BoxFuture;
use std::path::PathBuf;

/// Failure talking to the checkpoint medium. Every variant is fatal to the
/// pipeline: without durable progress there is no safe way to continue.
#[derive(Debug)]
pub enum StoreError {
    Unavailable {
        path: PathBuf,
        source: anyhow::Error,
    },
    Corrupt {
        path: PathBuf,
        source: anyhow::Error,
    },
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Unavailable { path, source } => {
                write!(
                    f,
                    "checkpoint store at {} unavailable: {source}",
                    path.display()
                )
            }
            StoreError::Corrupt { path, source } => {
                write!(f, "checkpoint at {} is corrupt: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Unavailable { source, .. } | StoreError::Corrupt { source, .. } => {
                Some(source.as_ref())
            }
        }
    }
}

/// Passive persistence for the pipeline checkpoint.
///
/// `load_or_init` is the only place a default checkpoint is materialized; the
/// caller supplies the current chain height so the store stays free of chain
/// knowledge. `save` atomically replaces the previous snapshot.
pub trait CheckpointStore: Send + Sync {
    fn load_or_init(&self, bootstrap_height: u64) -> BoxFuture<'_, Result<Checkpoint, StoreError>>;

    fn save<'a>(&'a self, checkpoint: &'a Checkpoint) -> BoxFuture<'a, Result<(), StoreError>>;
}

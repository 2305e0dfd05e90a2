//! JSON-file checkpoint store. The snapshot is replaced atomically by writing
//! a sibling temp file and renaming it over the target.

use super::state::Checkpoint;
use super::store::{CheckpointStore, StoreError};
use anyhow::Error as AnyError;
use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use tokio::fs;

#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn unavailable(&self, source: AnyError) -> StoreError {
        StoreError::Unavailable {
            path: self.path.clone(),
            source,
        }
    }

    async fn read_existing(&self) -> Result<Option<Checkpoint>, StoreError> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(
                    self.unavailable(AnyError::new(err).context("failed to read checkpoint file"))
                )
            }
        };

        let checkpoint = serde_json::from_slice(&bytes).map_err(|err| StoreError::Corrupt {
            path: self.path.clone(),
            source: AnyError::new(err).context("checkpoint file is not valid JSON"),
        })?;
        Ok(Some(checkpoint))
    }

    async fn write_snapshot(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        let encoded = serde_json::to_vec_pretty(checkpoint)
            .map_err(|err| self.unavailable(AnyError::new(err).context("failed to encode checkpoint")))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(|err| {
                    self.unavailable(
                        AnyError::new(err).context("failed to create checkpoint directory"),
                    )
                })?;
            }
        }

        let temp_path = self.temp_path();
        fs::write(&temp_path, &encoded).await.map_err(|err| {
            self.unavailable(AnyError::new(err).context("failed to write checkpoint temp file"))
        })?;
        fs::rename(&temp_path, &self.path).await.map_err(|err| {
            self.unavailable(AnyError::new(err).context("failed to replace checkpoint file"))
        })?;
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "checkpoint".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load_or_init(&self, bootstrap_height: u64) -> BoxFuture<'_, Result<Checkpoint, StoreError>> {
        Box::pin(async move {
            if let Some(checkpoint) = self.read_existing().await? {
                return Ok(checkpoint);
            }

            let checkpoint = Checkpoint::bootstrap(bootstrap_height);
            self.write_snapshot(&checkpoint).await?;
            tracing::info!(
                starting_block = checkpoint.starting_block,
                path = %self.path.display(),
                "initialized fresh checkpoint"
            );
            Ok(checkpoint)
        })
    }

    fn save<'a>(&'a self, checkpoint: &'a Checkpoint) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(self.write_snapshot(checkpoint))
    }
}

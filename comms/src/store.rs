//! Shared-storage access for the `DesiredState` record.
//!
//! Writers never lock: each publish lands in a private temporary file in the same
//! directory and is renamed over the record, so a reader sees either the old or
//! the new record in full. Concurrent writers race and the last rename wins.

use std::{
    ffi::OsString,
    io,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use log::debug;
use tokio::{fs, io::AsyncWriteExt};

use crate::{StoreErr, specs::DesiredState};

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Handle to the desired state file on shared storage.
#[derive(Debug, Clone)]
pub struct DesiredStateStore {
    path: PathBuf,
}

impl DesiredStateStore {
    /// Creates a new `DesiredStateStore`.
    ///
    /// # Arguments
    /// * `path` - Location of the record, its parent directory must exist.
    ///
    /// # Returns
    /// A new `DesiredStateStore` instance.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the current record.
    ///
    /// # Returns
    /// `Ok(None)` when nothing was published yet, or a `StoreErr` if the file
    /// can't be read or doesn't hold a valid record.
    pub async fn read(&self) -> Result<Option<DesiredState>, StoreErr> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Publishes `model_repo_id` as the new desired state.
    ///
    /// The version is one past the record currently stored. A malformed record
    /// is overwritten and restarts the count.
    ///
    /// # Arguments
    /// * `model_repo_id` - The repository the fleet should converge to.
    ///
    /// # Returns
    /// The record that was written.
    pub async fn publish(&self, model_repo_id: &str) -> Result<DesiredState, StoreErr> {
        let previous = match self.read().await {
            Ok(state) => state.map(|s| s.version).unwrap_or_default(),
            Err(StoreErr::Malformed(_)) => 0,
            Err(e) => return Err(e),
        };

        let state = DesiredState::new(model_repo_id, previous + 1);
        self.replace(&state).await?;

        debug!(
            repo_id = state.model_repo_id.as_str(),
            version = state.version;
            "published desired state"
        );

        Ok(state)
    }

    /// Atomically replaces the record with `state`.
    ///
    /// # Arguments
    /// * `state` - The record to store.
    pub async fn replace(&self, state: &DesiredState) -> Result<(), StoreErr> {
        let tmp = self.tmp_path();
        let bytes = serde_json::to_vec(state)?;

        let written = async {
            let mut file = fs::File::create(&tmp).await?;
            file.write_all(&bytes).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&tmp, &self.path).await
        }
        .await;

        if let Err(e) = written {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        Ok(())
    }

    /// Builds a temporary path unique to this process and call, next to the record.
    fn tmp_path(&self) -> PathBuf {
        let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("desired_state"));
        name.push(format!(".{}.{n}.tmp", std::process::id()));
        self.path.with_file_name(name)
    }
}

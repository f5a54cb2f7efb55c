//! Directory-backed experiment store.
//!
//! Each experiment lives in `<dir>/<id>.json`. Writes go to a temporary
//! file in the same directory and are renamed into place, so readers see
//! either the old document or the new one.
//!
//! The write and the rename run together on the blocking pool. If the
//! caller stops waiting (for example on an engine deadline), the pending
//! write is abandoned before the rename and its temporary file removed.
//! A rename already under way when the caller gives up still lands.
//! Temporary files left by a crash are swept when the store is opened, so
//! a directory must belong to a single store.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::fs;
use tracing::debug;

use super::{sort_and_limit, ExperimentFilter, ExperimentStore, OrderBy};
use crate::experiment::Experiment;
use crate::{Error, Result};

const EXTENSION: &str = "json";
const TMP_EXTENSION: &str = "tmp";

/// Raises the flag when the awaiting side goes away.
struct AbandonOnDrop(Arc<AtomicBool>);

impl Drop for AbandonOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Write `bytes` to `tmp` and rename it over `path`, unless `abandoned`
/// was raised in between.
fn write_then_rename(tmp: &Path, path: &Path, bytes: &[u8], abandoned: &AtomicBool) -> Result<()> {
    std::fs::write(tmp, bytes)?;
    if abandoned.load(Ordering::Acquire) {
        let _ = std::fs::remove_file(tmp);
        return Err(Error::Storage(format!(
            "write of {} abandoned before commit",
            path.display()
        )));
    }
    if let Err(e) = std::fs::rename(tmp, path) {
        let _ = std::fs::remove_file(tmp);
        return Err(e.into());
    }
    Ok(())
}

fn is_stale_tmp(name: &str) -> bool {
    name.starts_with('.')
        && Path::new(name)
            .extension()
            .is_some_and(|ext| ext == TMP_EXTENSION)
}

/// Experiment store persisting one JSON document per experiment.
///
/// # Example
///
/// ```rust,no_run
/// use ab_engine::store::{ExperimentStore, JsonFileStore};
///
/// # async fn example() -> ab_engine::Result<()> {
/// let store = JsonFileStore::open("/var/lib/experiments").await?;
/// let loaded = store.get("exp-1").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
    tmp_seq: AtomicU64,
}

impl JsonFileStore {
    /// Open a store rooted at `dir`, creating the directory if missing and
    /// removing temporary files left by interrupted writes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the directory cannot be created or scanned.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await?;

        let mut entries = fs::read_dir(&dir).await?;
        let mut swept = 0usize;
        while let Some(entry) = entries.next_entry().await? {
            if is_stale_tmp(&entry.file_name().to_string_lossy()) {
                fs::remove_file(entry.path()).await?;
                swept += 1;
            }
        }
        if swept > 0 {
            debug!(dir = %dir.display(), swept, "removed stale temporary files");
        }

        Ok(Self {
            dir,
            tmp_seq: AtomicU64::new(0),
        })
    }

    /// Directory holding the documents.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        let usable = !id.is_empty()
            && !id.starts_with('.')
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !usable {
            return Err(Error::Validation(format!(
                "experiment id '{id}' cannot be used as a file name"
            )));
        }
        Ok(self.dir.join(format!("{id}.{EXTENSION}")))
    }

    async fn read(path: &Path) -> Result<Option<Experiment>> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl ExperimentStore for JsonFileStore {
    async fn get(&self, id: &str) -> Result<Option<Experiment>> {
        let path = self.path_for(id)?;
        Self::read(&path).await
    }

    async fn put(&self, experiment: Experiment) -> Result<()> {
        let path = self.path_for(experiment.id())?;
        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = self
            .dir
            .join(format!(".{}.{seq}.{TMP_EXTENSION}", experiment.id()));
        let bytes = serde_json::to_vec_pretty(&experiment)?;

        let abandoned = Arc::new(AtomicBool::new(false));
        let _abandon = AbandonOnDrop(Arc::clone(&abandoned));
        let target = path.clone();
        tokio::task::spawn_blocking(move || write_then_rename(&tmp, &target, &bytes, &abandoned))
            .await
            .map_err(|e| Error::Storage(format!("write task failed: {e}")))??;

        debug!(experiment_id = experiment.id(), path = %path.display(), "experiment written");
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let path = self.path_for(id)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(
        &self,
        filter: &ExperimentFilter,
        order: OrderBy,
        limit: Option<usize>,
    ) -> Result<Vec<Experiment>> {
        let mut entries = fs::read_dir(&self.dir).await?;
        let mut matching = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_document = path.extension().is_some_and(|ext| ext == EXTENSION)
                && !entry.file_name().to_string_lossy().starts_with('.');
            if !is_document {
                continue;
            }
            if let Some(experiment) = Self::read(&path).await? {
                if filter.matches(&experiment) {
                    matching.push(experiment);
                }
            }
        }
        Ok(sort_and_limit(matching, order, limit))
    }
}

use crate::error::Result;
use crate::schema::SalesRecord;
use crate::store::{SalesStore, WriteMode};
use async_trait::async_trait;
use log::{debug, warn};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

/// Single-slot blob store: the whole record set lives as one JSON array in
/// `<dir>/<key>.json`.
pub struct LocalStore {
    path: PathBuf,
    // Serializes read-modify-write appends
    write_lock: Mutex<()>,
}

impl LocalStore {
    pub fn new(dir: impl AsRef<Path>, key: &str) -> Self {
        Self::at_path(dir.as_ref().join(format!("{}.json", key)))
    }

    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or corrupt blobs read as an empty record set.
    async fn read_blob(&self) -> Result<Vec<SalesRecord>> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No sales blob at {}", self.path.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }

        match serde_json::from_str::<Vec<SalesRecord>>(&contents) {
            Ok(mut records) => {
                records.iter_mut().for_each(SalesRecord::repair_timestamp);
                Ok(records)
            }
            Err(e) => {
                warn!(
                    "Sales blob at {} is corrupt, treating it as empty: {}",
                    self.path.display(),
                    e
                );
                Ok(Vec::new())
            }
        }
    }

    async fn write_blob(&self, records: &[SalesRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_string(records)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, json).await?;
        fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl SalesStore for LocalStore {
    async fn load_all(&self) -> Result<Vec<SalesRecord>> {
        self.read_blob().await
    }

    async fn append(&self, record: &SalesRecord) -> Result<()> {
        self.append_batch(std::slice::from_ref(record)).await
    }

    async fn append_batch(&self, records: &[SalesRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let _guard = self.write_lock.lock().await;
        let mut stored = self.read_blob().await?;
        stored.extend_from_slice(records);
        self.write_blob(&stored).await?;

        debug!(
            "Appended {} records to {} ({} total)",
            records.len(),
            self.path.display(),
            stored.len()
        );
        Ok(())
    }

    fn write_mode(&self) -> WriteMode {
        WriteMode::Immediate
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

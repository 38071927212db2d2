//! Persistence backends behind one capability interface.
//!
//! The backend is chosen once from [`StoreConfig`] by [`open_store`]; callers
//! only ever see `Arc<dyn SalesStore>`.

pub mod local;
#[cfg(feature = "remote")]
pub mod remote;

pub use local::LocalStore;
#[cfg(feature = "remote")]
pub use remote::RemoteStore;

use crate::config::{Backend, StoreConfig};
use crate::error::{Result, SalesDashboardError};
use crate::schema::SalesRecord;
use async_trait::async_trait;
use log::info;
use std::sync::Arc;

/// How a backend's writes become visible to later loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// The next `load_all` sees the write.
    Immediate,
    /// Writes are fire-and-forget; reload to learn what was stored.
    ReloadAfterWrite,
}

#[async_trait]
pub trait SalesStore: Send + Sync {
    /// Every stored record.
    async fn load_all(&self) -> Result<Vec<SalesRecord>>;

    async fn append(&self, record: &SalesRecord) -> Result<()>;

    /// Appends in order and stops at the first failure. Records stored before
    /// the failure stay stored.
    async fn append_batch(&self, records: &[SalesRecord]) -> Result<()> {
        for (idx, record) in records.iter().enumerate() {
            self.append(record).await.map_err(|e| {
                SalesDashboardError::Transport(format!(
                    "stored {} of {} records before failing: {}",
                    idx,
                    records.len(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    fn write_mode(&self) -> WriteMode;

    fn name(&self) -> &'static str;
}

pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn SalesStore>> {
    config.validate()?;

    let store: Arc<dyn SalesStore> = match config.backend() {
        #[cfg(feature = "remote")]
        Backend::Remote { endpoint } => {
            Arc::new(RemoteStore::new(endpoint, config.request_timeout())?)
        }
        #[cfg(not(feature = "remote"))]
        Backend::Remote { endpoint } => {
            return Err(SalesDashboardError::Config(format!(
                "remote endpoint {} configured but the `remote` feature is disabled",
                endpoint
            )))
        }
        Backend::Local { path } => Arc::new(LocalStore::at_path(path)),
    };

    info!("Using {} sales store", store.name());
    Ok(store)
}

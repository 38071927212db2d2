use crate::config::StoreConfig;
use crate::engine::aggregate;
use crate::error::Result;
use crate::ingestion::{normalize_batch, normalize_sheet, read_csv_rows, ImportReport, RawRow};
use crate::schema::{NewSale, SalesRecord, ViewModel, ViewState};
use crate::store::{open_store, SalesStore, WriteMode};
use chrono::NaiveDate;
use log::{info, warn};
use std::cmp::Reverse;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

/// One dashboard session: the current record snapshot, the active filters
/// and the store they are persisted to.
///
/// The record set is copy-on-write. Every change swaps in a new
/// `Arc<Vec<SalesRecord>>`, so snapshots handed out by [`records`] are never
/// mutated.
///
/// [`records`]: SalesDashboard::records
pub struct SalesDashboard {
    store: Arc<dyn SalesStore>,
    records: Arc<Vec<SalesRecord>>,
    filters: ViewState,
    last_error: Option<String>,
}

impl SalesDashboard {
    pub fn new(store: Arc<dyn SalesStore>) -> Self {
        Self {
            store,
            records: Arc::new(Vec::new()),
            filters: ViewState::default(),
            last_error: None,
        }
    }

    pub fn open(config: &StoreConfig) -> Result<Self> {
        Ok(Self::new(open_store(config)?))
    }

    pub fn records(&self) -> Arc<Vec<SalesRecord>> {
        Arc::clone(&self.records)
    }

    pub fn filters(&self) -> &ViewState {
        &self.filters
    }

    pub fn set_filters(&mut self, filters: ViewState) {
        self.filters = filters;
    }

    /// Message for the error banner, if the last load or save failed.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// Replaces the record set with what the store holds. A failed load leaves
    /// an empty record set and sets the error banner; it never propagates.
    pub async fn refresh(&mut self) -> bool {
        match self.store.load_all().await {
            Ok(records) => {
                info!("Loaded {} sales records", records.len());
                self.replace_records(records);
                self.last_error = None;
                true
            }
            Err(e) => {
                warn!("Loading sales records failed: {}", e);
                self.replace_records(Vec::new());
                self.last_error = Some(format!("Failed to load sales data: {}", e));
                false
            }
        }
    }

    /// Validates and stores a single form entry. Validation errors are
    /// returned before anything is written.
    pub async fn submit(&mut self, sale: NewSale) -> Result<SalesRecord> {
        let record = sale.into_record()?;
        self.persist(vec![record.clone()]).await?;
        Ok(record)
    }

    /// Normalizes and stores an import batch. A batch missing required
    /// columns, or without a single valid row, stores nothing.
    pub async fn import_rows(&mut self, rows: &[RawRow]) -> Result<ImportReport> {
        let report = normalize_batch(rows)?;
        self.persist(report.records.clone()).await?;
        Ok(report)
    }

    pub async fn import_csv_file(&mut self, path: impl AsRef<Path>) -> Result<ImportReport> {
        let bytes = tokio::fs::read(path.as_ref()).await?;
        let sheet = read_csv_rows(bytes.as_slice())?;
        let report = normalize_sheet(&sheet)?;
        self.persist(report.records.clone()).await?;
        Ok(report)
    }

    pub fn view(&self) -> ViewModel {
        aggregate(&self.records, &self.filters)
    }

    pub fn products(&self) -> Vec<String> {
        distinct_sorted(self.records.iter().map(|r| r.product_name.as_str()))
    }

    pub fn categories(&self) -> Vec<String> {
        distinct_sorted(self.records.iter().map(|r| r.category.as_str()))
    }

    pub fn date_bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        let min = self.records.iter().map(|r| r.date).min()?;
        let max = self.records.iter().map(|r| r.date).max()?;
        Some((min, max))
    }

    /// Newest records first; among equal dates the latest appended comes first.
    pub fn recent_records(&self, limit: usize) -> Vec<SalesRecord> {
        let mut recent: Vec<&SalesRecord> = self.records.iter().rev().collect();
        recent.sort_by_key(|r| Reverse(r.timestamp));
        recent.into_iter().take(limit).cloned().collect()
    }

    async fn persist(&mut self, new_records: Vec<SalesRecord>) -> Result<()> {
        let result = match new_records.as_slice() {
            [single] => self.store.append(single).await,
            batch => self.store.append_batch(batch).await,
        };

        if let Err(e) = result {
            warn!("Saving {} sales records failed: {}", new_records.len(), e);
            self.last_error = Some(format!("Failed to save sales data: {}", e));
            return Err(e);
        }

        let mut merged = Vec::with_capacity(self.records.len() + new_records.len());
        merged.extend(self.records.iter().cloned());
        merged.extend(new_records);
        self.replace_records(merged);

        if self.store.write_mode() == WriteMode::ReloadAfterWrite {
            self.reload_after_write().await;
        }

        Ok(())
    }

    // Keeps the optimistic snapshot when the follow-up load fails
    async fn reload_after_write(&mut self) {
        match self.store.load_all().await {
            Ok(records) => {
                self.replace_records(records);
                self.last_error = None;
            }
            Err(e) => {
                warn!("Reload after write failed: {}", e);
                self.last_error = Some(format!(
                    "Saved, but refreshing sales data failed: {}",
                    e
                ));
            }
        }
    }

    /// Swaps in a new snapshot. The date range is re-initialized from the data
    /// exactly once per empty to non-empty transition.
    fn replace_records(&mut self, records: Vec<SalesRecord>) {
        let was_empty = self.records.is_empty();
        self.records = Arc::new(records);

        if was_empty && self.filters.cover(&self.records) {
            info!(
                "Date range initialized to {} .. {}",
                self.filters.start, self.filters.end
            );
        }
    }
}

fn distinct_sorted<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    values
        .collect::<BTreeSet<&str>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

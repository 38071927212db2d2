use crate::error::{Result, SalesDashboardError};
use crate::schema::SalesRecord;
use crate::store::{SalesStore, WriteMode};
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

/// Spreadsheet-backed HTTP endpoint. `GET` returns `{status, data}`, `POST`
/// takes one JSON record and its response is not inspected.
#[derive(Clone)]
pub struct RemoteStore {
    client: Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct LoadResponse {
    status: String,
    #[serde(default)]
    data: Vec<serde_json::Value>,
}

impl RemoteStore {
    pub fn new(endpoint: impl Into<String>, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl SalesStore for RemoteStore {
    async fn load_all(&self) -> Result<Vec<SalesRecord>> {
        let res = self.client.get(&self.endpoint).send().await?;
        let status = res.status();

        if !status.is_success() {
            let error_text = res.text().await.unwrap_or_default();
            return Err(SalesDashboardError::Transport(format!(
                "Load failed (status {}): {}",
                status, error_text
            )));
        }

        let body: LoadResponse = res.json().await?;
        if body.status != "success" {
            warn!(
                "Sales endpoint answered with status '{}', treating as no data",
                body.status
            );
            return Ok(Vec::new());
        }

        let total = body.data.len();
        let records: Vec<SalesRecord> = body
            .data
            .into_iter()
            .filter_map(|value| match serde_json::from_value::<SalesRecord>(value) {
                Ok(mut record) => {
                    record.repair_timestamp();
                    Some(record)
                }
                Err(e) => {
                    warn!("Skipping malformed sales record from endpoint: {}", e);
                    None
                }
            })
            .collect();

        debug!("Loaded {} of {} remote records", records.len(), total);
        Ok(records)
    }

    async fn append(&self, record: &SalesRecord) -> Result<()> {
        let res = self.client.post(&self.endpoint).json(record).send().await?;
        debug!(
            "Posted record {} to sales endpoint (status {})",
            record.id,
            res.status()
        );
        Ok(())
    }

    fn write_mode(&self) -> WriteMode {
        WriteMode::ReloadAfterWrite
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}

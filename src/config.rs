use crate::error::{Result, SalesDashboardError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Endpoint baked in at compile time. Its presence selects the remote backend.
pub const BUILD_ENDPOINT: Option<&str> = option_env!("SALES_DASHBOARD_ENDPOINT");

pub const DEFAULT_STORAGE_KEY: &str = "salesData";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    Remote { endpoint: String },
    Local { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// When set and non-empty, records live behind this HTTP endpoint.
    pub remote_endpoint: Option<String>,
    /// Directory holding the local blob.
    pub local_dir: PathBuf,
    /// Slot name of the local blob.
    pub storage_key: String,
    /// Per-request timeout for the remote backend. No timeout when unset.
    pub request_timeout_secs: Option<u64>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            remote_endpoint: None,
            local_dir: PathBuf::from(".sales-dashboard"),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            request_timeout_secs: None,
        }
    }
}

impl StoreConfig {
    pub fn from_build_env() -> Self {
        Self {
            remote_endpoint: BUILD_ENDPOINT.map(str::to_string),
            ..Self::default()
        }
    }

    pub fn local(dir: impl Into<PathBuf>) -> Self {
        Self {
            local_dir: dir.into(),
            ..Self::default()
        }
    }

    pub fn remote(endpoint: impl Into<String>) -> Self {
        Self {
            remote_endpoint: Some(endpoint.into()),
            ..Self::default()
        }
    }

    pub fn backend(&self) -> Backend {
        match self.remote_endpoint.as_deref().map(str::trim) {
            Some(endpoint) if !endpoint.is_empty() => Backend::Remote {
                endpoint: endpoint.to_string(),
            },
            _ => Backend::Local {
                path: self.local_dir.join(format!("{}.json", self.storage_key)),
            },
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if let Backend::Remote { endpoint } = self.backend() {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(SalesDashboardError::Config(format!(
                    "remote endpoint '{}' must be an http(s) URL",
                    endpoint
                )));
            }
        }

        let key = self.storage_key.trim();
        if key.is_empty() || key.contains(['/', '\\']) || key.contains("..") {
            return Err(SalesDashboardError::Config(format!(
                "storage key '{}' must be a plain, non-empty name",
                self.storage_key
            )));
        }

        if self.request_timeout_secs == Some(0) {
            return Err(SalesDashboardError::Config(
                "request timeout must be at least one second".to_string(),
            ));
        }

        Ok(())
    }
}

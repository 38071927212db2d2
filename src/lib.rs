//! # Sales Dashboard
//!
//! Core of a small business sales-entry and analytics dashboard: recording
//! sales, importing them from spreadsheets, persisting them and turning the
//! flat record list into trends, category breakdowns and KPI totals.
//!
//! ## Core Concepts
//!
//! - **Sales Record**: one immutable sale line (date, category, product, quantity, amount)
//! - **Normalization**: raw form input or spreadsheet rows become canonical records;
//!   serial dates and date strings both end up as `YYYY-MM-DD`
//! - **Aggregation**: a pure function from records + filters to a [`ViewModel`]
//! - **Stores**: a remote spreadsheet endpoint or a local JSON blob, chosen once at startup
//!
//! ## Example
//!
//! ```rust,ignore
//! use sales_dashboard::*;
//!
//! let mut dashboard = SalesDashboard::open(&StoreConfig::from_build_env())?;
//! dashboard.refresh().await;
//!
//! dashboard
//!     .submit(NewSale {
//!         date: "2024-01-15".to_string(),
//!         category: "Drinks".to_string(),
//!         product_name: "Latte".to_string(),
//!         quantity: 2,
//!         amount: 9.0,
//!     })
//!     .await?;
//!
//! let mut filters = dashboard.filters().clone();
//! filters.view_mode = ViewMode::Week;
//! dashboard.set_filters(filters);
//!
//! let view = dashboard.view();
//! println!("{} sold, top product {:?}", view.totals.total_sales, view.top_product);
//! ```

pub mod config;
pub mod dashboard;
pub mod engine;
pub mod error;
pub mod ingestion;
pub mod schema;
pub mod store;
pub mod utils;

pub use config::{Backend, StoreConfig};
pub use dashboard::SalesDashboard;
pub use engine::{aggregate, Aggregator};
pub use error::{Result, SalesDashboardError};
pub use ingestion::*;
pub use schema::*;
pub use store::{open_store, LocalStore, SalesStore, WriteMode};
#[cfg(feature = "remote")]
pub use store::RemoteStore;
pub use utils::*;

use crate::error::{Result, SalesDashboardError};
use crate::utils::{epoch_millis, parse_required_date};
use chrono::{Local, NaiveDate};
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Largest quantity accepted on a single sale line.
pub const MAX_QUANTITY: u64 = 1_000_000_000;

/// One recorded sale line. This is also the wire shape exchanged with the
/// remote endpoint and the local blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SalesRecord {
    #[serde(deserialize_with = "string_or_number")]
    #[schemars(with = "String", description = "Opaque unique identifier, never reused")]
    pub id: String,

    #[serde(with = "civil_date")]
    #[schemars(with = "String", description = "Civil date in YYYY-MM-DD format, no timezone")]
    pub date: NaiveDate,

    #[schemars(description = "Free-form label grouping products")]
    pub category: String,

    #[schemars(description = "Free-form label identifying the sold item")]
    pub product_name: String,

    #[schemars(description = "Units sold, never negative")]
    pub quantity: u64,

    #[schemars(description = "Monetary total for the line, never negative")]
    pub amount: f64,

    #[serde(default)]
    #[schemars(description = "Epoch milliseconds of the date at midnight UTC, used for sorting and range checks")]
    pub timestamp: i64,
}

impl SalesRecord {
    /// Creates a record with a fresh id and a timestamp derived from `date`.
    pub fn new(
        date: NaiveDate,
        category: impl Into<String>,
        product_name: impl Into<String>,
        quantity: u64,
        amount: f64,
    ) -> Result<Self> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(SalesDashboardError::validation(
                "amount",
                format!("{} must be a non-negative number", amount),
            ));
        }

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            date,
            category: category.into(),
            product_name: product_name.into(),
            quantity,
            amount,
            timestamp: epoch_millis(date),
        })
    }

    pub fn has_consistent_timestamp(&self) -> bool {
        self.timestamp == epoch_millis(self.date)
    }

    /// Fills in a timestamp that was absent from a persisted payload.
    pub fn repair_timestamp(&mut self) {
        if self.timestamp == 0 && !self.has_consistent_timestamp() {
            self.timestamp = epoch_millis(self.date);
        }
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(SalesRecord)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

mod civil_date {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&crate::utils::format_date(*date))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        crate::utils::parse_date_str(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid date '{}'", raw)))
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(text) => text,
        Id::Number(number) => number.to_string(),
    })
}

/// Raw form input for a single sale, as typed by a user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSale {
    pub date: String,
    pub category: String,
    pub product_name: String,
    pub quantity: i64,
    pub amount: f64,
}

impl NewSale {
    /// Validates the form fields and synthesizes `id` and `timestamp`.
    pub fn into_record(self) -> Result<SalesRecord> {
        let date = parse_required_date(&self.date, "date")?;

        let category = self.category.trim();
        if category.is_empty() {
            return Err(SalesDashboardError::validation("category", "is required"));
        }

        let product_name = self.product_name.trim();
        if product_name.is_empty() {
            return Err(SalesDashboardError::validation("productName", "is required"));
        }

        if self.quantity <= 0 {
            return Err(SalesDashboardError::validation(
                "quantity",
                format!("{} must be greater than zero", self.quantity),
            ));
        }
        if self.quantity as u64 > MAX_QUANTITY {
            return Err(SalesDashboardError::validation(
                "quantity",
                format!("{} exceeds the limit of {}", self.quantity, MAX_QUANTITY),
            ));
        }

        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(SalesDashboardError::validation(
                "amount",
                format!("{} must be greater than zero", self.amount),
            ));
        }

        SalesRecord::new(
            date,
            category,
            product_name,
            self.quantity as u64,
            self.amount,
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    Day,
    Week,
    Month,
}

/// `all`, or an exact product name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProductFilter {
    #[default]
    All,
    Product(String),
}

impl ProductFilter {
    pub fn matches(&self, product_name: &str) -> bool {
        match self {
            ProductFilter::All => true,
            ProductFilter::Product(name) => name == product_name,
        }
    }
}

impl From<String> for ProductFilter {
    fn from(value: String) -> Self {
        if value == "all" {
            ProductFilter::All
        } else {
            ProductFilter::Product(value)
        }
    }
}

impl From<&str> for ProductFilter {
    fn from(value: &str) -> Self {
        ProductFilter::from(value.to_string())
    }
}

impl From<ProductFilter> for String {
    fn from(value: ProductFilter) -> Self {
        match value {
            ProductFilter::All => "all".to_string(),
            ProductFilter::Product(name) => name,
        }
    }
}

/// Filters and view options owned by the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    /// Inclusive first day.
    pub start: NaiveDate,
    /// Inclusive last day; its whole calendar day is in range.
    pub end: NaiveDate,
    pub view_mode: ViewMode,
    pub product: ProductFilter,
    pub category_breakdown: bool,
}

impl Default for ViewState {
    fn default() -> Self {
        let today = Local::now().date_naive();
        Self {
            start: today,
            end: today,
            view_mode: ViewMode::default(),
            product: ProductFilter::All,
            category_breakdown: false,
        }
    }
}

impl ViewState {
    pub fn with_range(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start,
            end,
            ..Self::default()
        }
    }

    /// Stretches the date range over the earliest and latest record dates.
    /// Returns false and leaves the state untouched when `records` is empty.
    pub fn cover(&mut self, records: &[SalesRecord]) -> bool {
        let min = records.iter().map(|r| r.date).min();
        let max = records.iter().map(|r| r.date).max();

        match (min, max) {
            (Some(start), Some(end)) => {
                self.start = start;
                self.end = end;
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesTotals {
    pub total_sales: f64,
    pub total_quantity: u64,
    pub transaction_count: usize,
    pub average_order_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopProduct {
    pub product_name: String,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendBucket {
    /// `YYYY-MM-DD`, `YYYY-Www` or `YYYY-MM` depending on the view mode.
    pub key: String,
    pub amount: f64,
    pub quantity: u64,
    /// Per-category amounts, present only in category-breakdown mode. Holds
    /// every known category, zero when the bucket has none of it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories: Option<BTreeMap<String, f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryTotal {
    pub category: String,
    pub amount: f64,
}

/// Everything the dashboard renders for one set of filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewModel {
    pub totals: SalesTotals,
    /// `None` when no record matched the filters.
    pub top_product: Option<TopProduct>,
    pub trend: Vec<TrendBucket>,
    pub category_breakdown: Vec<CategoryTotal>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sale() -> NewSale {
        NewSale {
            date: "2024-01-15".to_string(),
            category: "Drinks".to_string(),
            product_name: "Latte".to_string(),
            quantity: 2,
            amount: 9.5,
        }
    }

    #[test]
    fn test_schema_generation() {
        let schema_json = SalesRecord::schema_as_json().unwrap();
        assert!(schema_json.contains("productName"));
        assert!(schema_json.contains("timestamp"));
    }

    #[test]
    fn test_serialization() {
        let record = sale().into_record().unwrap();
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"productName\":\"Latte\""));
        assert!(json.contains("\"date\":\"2024-01-15\""));

        let deserialized: SalesRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, record);
    }

    #[test]
    fn test_lenient_wire_fields() {
        let json = r#"{"id": 17, "date": "2024-01-15T00:00:00.000Z", "category": "A",
            "productName": "X", "quantity": 1, "amount": 5}"#;
        let mut record: SalesRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.id, "17");
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(record.timestamp, 0);

        record.repair_timestamp();
        assert!(record.has_consistent_timestamp());
    }

    #[test]
    fn test_new_sale_synthesizes_id_and_timestamp() {
        let a = sale().into_record().unwrap();
        let b = sale().into_record().unwrap();
        assert_ne!(a.id, b.id);
        assert!(a.has_consistent_timestamp());
        assert_eq!(a.quantity, 2);
    }

    #[test]
    fn test_new_sale_validation() {
        let missing_product = NewSale {
            product_name: "  ".to_string(),
            ..sale()
        };
        assert!(matches!(
            missing_product.into_record(),
            Err(SalesDashboardError::Validation { field, .. }) if field == "productName"
        ));

        let zero_amount = NewSale {
            amount: 0.0,
            ..sale()
        };
        assert!(zero_amount.into_record().is_err());

        let negative_quantity = NewSale {
            quantity: -1,
            ..sale()
        };
        assert!(negative_quantity.into_record().is_err());

        let huge_quantity = NewSale {
            quantity: i64::MAX,
            ..sale()
        };
        assert!(matches!(
            huge_quantity.into_record(),
            Err(SalesDashboardError::Validation { field, .. }) if field == "quantity"
        ));

        let bad_date = NewSale {
            date: "someday".to_string(),
            ..sale()
        };
        assert!(bad_date.into_record().is_err());
    }

    #[test]
    fn test_product_filter_wire_form() {
        let all: ProductFilter = serde_json::from_str("\"all\"").unwrap();
        assert_eq!(all, ProductFilter::All);

        let latte: ProductFilter = serde_json::from_str("\"Latte\"").unwrap();
        assert!(latte.matches("Latte"));
        assert!(!latte.matches("Mocha"));
        assert_eq!(serde_json::to_string(&ProductFilter::All).unwrap(), "\"all\"");
    }

    #[test]
    fn test_view_state_cover() {
        let mut state = ViewState::default();
        assert!(!state.cover(&[]));

        let early =
            SalesRecord::new(NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(), "A", "X", 1, 1.0)
                .unwrap();
        let late =
            SalesRecord::new(NaiveDate::from_ymd_opt(2024, 2, 9).unwrap(), "A", "X", 1, 1.0)
                .unwrap();
        assert!(state.cover(&[late.clone(), early.clone()]));
        assert_eq!(state.start, early.date);
        assert_eq!(state.end, late.date);
    }
}

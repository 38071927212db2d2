use crate::error::{Result, SalesDashboardError};
use crate::schema::{SalesRecord, MAX_QUANTITY};
use crate::utils::{epoch_millis, parse_date_str, serial_to_date};
use chrono::NaiveDate;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::Read;
use uuid::Uuid;

// Serial 10000 is 1927-05-18; shorter numeric text is a year or a typo
const MIN_TEXT_SERIAL: f64 = 10_000.0;

/// A single spreadsheet cell as handed over by a sheet reader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Empty,
}

impl CellValue {
    fn as_label(&self) -> String {
        match self {
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                format!("{}", *n as i64)
            }
            CellValue::Number(n) => n.to_string(),
            CellValue::Text(text) => text.trim().to_string(),
            CellValue::Empty => String::new(),
        }
    }

    /// Sparse or malformed numeric cells count as zero.
    fn coerce_number(&self) -> f64 {
        let value = match self {
            CellValue::Number(n) => *n,
            CellValue::Text(text) => {
                let cleaned: String = text
                    .trim()
                    .chars()
                    .filter(|c| !matches!(c, ',' | ' ' | '$'))
                    .collect();
                cleaned.parse::<f64>().unwrap_or(0.0)
            }
            CellValue::Empty => 0.0,
        };
        if value.is_finite() {
            value
        } else {
            0.0
        }
    }

    fn to_date(&self) -> Option<NaiveDate> {
        match self {
            CellValue::Number(serial) => serial_to_date(*serial),
            CellValue::Text(text) => parse_date_str(text).or_else(|| {
                text.trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|serial| *serial >= MIN_TEXT_SERIAL)
                    .and_then(serial_to_date)
            }),
            CellValue::Empty => None,
        }
    }
}

/// Column name to cell value, one per data row.
pub type RawRow = BTreeMap<String, CellValue>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RequiredColumn {
    Date,
    Category,
    ProductName,
    Quantity,
    Amount,
}

impl RequiredColumn {
    pub const ALL: [RequiredColumn; 5] = [
        RequiredColumn::Date,
        RequiredColumn::Category,
        RequiredColumn::ProductName,
        RequiredColumn::Quantity,
        RequiredColumn::Amount,
    ];

    /// Accepted header spellings, compared after [`normalize_header`].
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            RequiredColumn::Date => &["date", "日期", "salesdate"],
            RequiredColumn::Category => &["category", "類別", "分類"],
            RequiredColumn::ProductName => &[
                "productname",
                "product",
                "產品",
                "產品名稱",
                "商品名稱",
            ],
            RequiredColumn::Quantity => &["quantity", "qty", "數量"],
            RequiredColumn::Amount => &["amount", "金額", "銷售額"],
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            RequiredColumn::Date => "日期 (date)",
            RequiredColumn::Category => "類別 (category)",
            RequiredColumn::ProductName => "產品名稱 (productName)",
            RequiredColumn::Quantity => "數量 (quantity)",
            RequiredColumn::Amount => "金額 (amount)",
        }
    }

    fn matches(&self, header: &str) -> bool {
        let normalized = normalize_header(header);
        self.aliases().iter().any(|alias| *alias == normalized)
    }
}

impl fmt::Display for RequiredColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Lowercases and strips spaces, underscores and hyphens.
pub fn normalize_header(header: &str) -> String {
    header
        .trim()
        .trim_start_matches('\u{feff}')
        .chars()
        .filter(|c| !matches!(c, ' ' | '_' | '-'))
        .flat_map(char::to_lowercase)
        .collect()
}

/// The header actually used in the source for each required column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    pub date: String,
    pub category: String,
    pub product_name: String,
    pub quantity: String,
    pub amount: String,
}

/// Finds every required column among `headers`, or reports all that are
/// missing.
pub fn resolve_columns<'a, I>(headers: I) -> std::result::Result<ColumnMap, Vec<RequiredColumn>>
where
    I: IntoIterator<Item = &'a str>,
{
    let headers: Vec<&str> = headers.into_iter().collect();
    let mut found: BTreeMap<RequiredColumn, String> = BTreeMap::new();

    for column in RequiredColumn::ALL {
        if let Some(header) = headers.iter().find(|h| column.matches(h)) {
            found.insert(column, header.to_string());
        }
    }

    let missing: Vec<RequiredColumn> = RequiredColumn::ALL
        .into_iter()
        .filter(|c| !found.contains_key(c))
        .collect();
    if !missing.is_empty() {
        return Err(missing);
    }

    let mut take = |column: RequiredColumn| found.remove(&column).unwrap_or_default();
    Ok(ColumnMap {
        date: take(RequiredColumn::Date),
        category: take(RequiredColumn::Category),
        product_name: take(RequiredColumn::ProductName),
        quantity: take(RequiredColumn::Quantity),
        amount: take(RequiredColumn::Amount),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    InvalidDate(String),
    NegativeQuantity,
    QuantityTooLarge,
    NegativeAmount,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::InvalidDate(raw) => write!(f, "unparseable date '{}'", raw),
            DropReason::NegativeQuantity => f.write_str("negative quantity"),
            DropReason::QuantityTooLarge => {
                write!(f, "quantity above {}", MAX_QUANTITY)
            }
            DropReason::NegativeAmount => f.write_str("negative amount"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedRow {
    /// Zero-based index among the data rows.
    pub row: usize,
    pub reason: DropReason,
}

#[derive(Debug, Clone)]
pub struct ImportReport {
    pub records: Vec<SalesRecord>,
    pub dropped: Vec<DroppedRow>,
}

impl ImportReport {
    pub fn summary(&self) -> String {
        if self.dropped.is_empty() {
            format!("Imported {} rows", self.records.len())
        } else {
            format!(
                "Imported {} rows, skipped {} invalid rows",
                self.records.len(),
                self.dropped.len()
            )
        }
    }
}

/// Converts one row into a canonical record. Numeric fields that do not parse
/// become 0; an unparseable date drops the row.
pub fn normalize_row(
    row: &RawRow,
    columns: &ColumnMap,
) -> std::result::Result<SalesRecord, DropReason> {
    static EMPTY: CellValue = CellValue::Empty;
    let cell = |key: &String| row.get(key).unwrap_or(&EMPTY);

    let date_cell = cell(&columns.date);
    let date = date_cell
        .to_date()
        .ok_or_else(|| DropReason::InvalidDate(date_cell.as_label()))?;

    let quantity = cell(&columns.quantity).coerce_number();
    if quantity < 0.0 {
        return Err(DropReason::NegativeQuantity);
    }
    let quantity = quantity.round();
    if quantity > MAX_QUANTITY as f64 {
        return Err(DropReason::QuantityTooLarge);
    }

    let amount = cell(&columns.amount).coerce_number();
    if amount < 0.0 {
        return Err(DropReason::NegativeAmount);
    }

    Ok(SalesRecord {
        id: Uuid::new_v4().to_string(),
        date,
        category: cell(&columns.category).as_label(),
        product_name: cell(&columns.product_name).as_label(),
        quantity: quantity as u64,
        amount,
        timestamp: epoch_millis(date),
    })
}

/// Normalizes a whole import batch.
///
/// Required columns are resolved against every header seen in the batch; if
/// any is absent the batch is rejected as a whole. Rows that fail to
/// normalize are dropped and counted. The batch is usable when at least one
/// row survives.
pub fn normalize_batch(rows: &[RawRow]) -> Result<ImportReport> {
    if rows.is_empty() {
        return Err(SalesDashboardError::EmptyImport);
    }
    normalize_with_headers(BTreeSet::new(), rows)
}

/// Like [`normalize_batch`], but the sheet's header row is checked first, so
/// a header-only sheet still reports its missing columns.
pub fn normalize_sheet(sheet: &SheetRows) -> Result<ImportReport> {
    let headers = sheet.headers.iter().map(String::as_str).collect();
    normalize_with_headers(headers, &sheet.rows)
}

fn normalize_with_headers<'a>(
    mut headers: BTreeSet<&'a str>,
    rows: &'a [RawRow],
) -> Result<ImportReport> {
    headers.extend(rows.iter().flat_map(|row| row.keys().map(String::as_str)));

    let columns = resolve_columns(headers).map_err(|missing| {
        SalesDashboardError::MissingColumns(
            missing.iter().map(|c| c.display_name().to_string()).collect(),
        )
    })?;

    if rows.is_empty() {
        return Err(SalesDashboardError::EmptyImport);
    }

    let mut records = Vec::with_capacity(rows.len());
    let mut dropped = Vec::new();

    for (idx, row) in rows.iter().enumerate() {
        match normalize_row(row, &columns) {
            Ok(record) => records.push(record),
            Err(reason) => {
                debug!("Dropping import row {}: {}", idx, reason);
                dropped.push(DroppedRow { row: idx, reason });
            }
        }
    }

    if records.is_empty() {
        return Err(SalesDashboardError::NoValidRows {
            dropped: dropped.len(),
        });
    }

    let report = ImportReport { records, dropped };
    info!("{}", report.summary());
    Ok(report)
}

/// A parsed tabular file: its header row and the non-blank data rows.
#[derive(Debug, Clone, Default)]
pub struct SheetRows {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

/// Reads a header row plus data rows. Blank cells become [`CellValue::Empty`],
/// everything else stays text and is coerced during normalization.
pub fn read_csv_rows<R: Read>(reader: R) -> Result<SheetRows> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = csv_reader
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut rows = Vec::new();
    for result in csv_reader.records() {
        let record = result?;
        if record.iter().all(str::is_empty) {
            continue;
        }

        let row: RawRow = headers
            .iter()
            .zip(record.iter())
            .map(|(header, value)| {
                let cell = if value.is_empty() {
                    CellValue::Empty
                } else {
                    CellValue::Text(value.to_string())
                };
                (header.clone(), cell)
            })
            .collect();
        rows.push(row);
    }

    Ok(SheetRows { headers, rows })
}

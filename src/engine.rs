use crate::schema::{
    CategoryTotal, SalesRecord, SalesTotals, TopProduct, TrendBucket, ViewMode, ViewModel,
    ViewState,
};
use crate::utils::{day_key, epoch_millis, iso_week_key, month_key, MILLIS_PER_DAY};
use chrono::NaiveDate;
use log::debug;
use std::collections::{BTreeMap, BTreeSet, HashMap};

pub struct Aggregator<'a> {
    filters: &'a ViewState,
}

// Running sums for one trend bucket
#[derive(Default)]
struct BucketSlot {
    amount: f64,
    quantity: u64,
    categories: BTreeMap<String, f64>,
}

impl<'a> Aggregator<'a> {
    pub fn new(filters: &'a ViewState) -> Self {
        Self { filters }
    }

    /// Half-open millisecond window `[start of start day, start of day after end)`.
    pub fn window(&self) -> (i64, i64) {
        let start = epoch_millis(self.filters.start);
        let end = epoch_millis(self.filters.end) + MILLIS_PER_DAY;
        (start, end)
    }

    pub fn filter<'r>(&self, records: &'r [SalesRecord]) -> Vec<&'r SalesRecord> {
        let (start, end) = self.window();
        records
            .iter()
            .filter(|r| r.timestamp >= start && r.timestamp < end)
            .filter(|r| self.filters.product.matches(&r.product_name))
            .collect()
    }

    pub fn totals(&self, filtered: &[&SalesRecord]) -> SalesTotals {
        let total_sales: f64 = filtered.iter().map(|r| r.amount).sum();
        let total_quantity = filtered
            .iter()
            .fold(0u64, |acc, r| acc.saturating_add(r.quantity));
        let transaction_count = filtered.len();
        let average_order_value = if transaction_count == 0 {
            0.0
        } else {
            total_sales / transaction_count as f64
        };

        SalesTotals {
            total_sales,
            total_quantity,
            transaction_count,
            average_order_value,
        }
    }

    /// Product with the highest summed amount. On a tie the product seen
    /// first in `filtered` wins.
    pub fn top_product(&self, filtered: &[&SalesRecord]) -> Option<TopProduct> {
        let sums = sum_in_first_seen_order(filtered.iter().map(|r| (&r.product_name, r.amount)));

        let mut best: Option<(String, f64)> = None;
        for (product_name, amount) in sums {
            let is_better = best.as_ref().map_or(true, |(_, top)| amount > *top);
            if is_better {
                best = Some((product_name, amount));
            }
        }

        best.map(|(product_name, amount)| TopProduct {
            product_name,
            amount,
        })
    }

    /// Buckets sorted by key. When category breakdown is on every bucket
    /// carries every category in `universe`.
    pub fn trend(
        &self,
        filtered: &[&SalesRecord],
        universe: &BTreeSet<String>,
    ) -> Vec<TrendBucket> {
        let breakdown = self.filters.category_breakdown;
        let mut slots: BTreeMap<String, BucketSlot> = BTreeMap::new();

        for record in filtered {
            let slot = slots
                .entry(bucket_key(record.date, self.filters.view_mode))
                .or_default();
            slot.amount += record.amount;
            slot.quantity = slot.quantity.saturating_add(record.quantity);
            if breakdown {
                *slot
                    .categories
                    .entry(record.category.clone())
                    .or_insert(0.0) += record.amount;
            }
        }

        let mut buckets: Vec<TrendBucket> = slots
            .into_iter()
            .map(|(key, slot)| TrendBucket {
                key,
                amount: slot.amount,
                quantity: slot.quantity,
                categories: breakdown.then_some(slot.categories),
            })
            .collect();

        if breakdown {
            zero_fill_categories(&mut buckets, universe);
        }

        buckets
    }

    /// Category totals in the order categories are first encountered.
    pub fn category_breakdown(&self, filtered: &[&SalesRecord]) -> Vec<CategoryTotal> {
        sum_in_first_seen_order(filtered.iter().map(|r| (&r.category, r.amount)))
            .into_iter()
            .map(|(category, amount)| CategoryTotal { category, amount })
            .collect()
    }

    pub fn run(&self, records: &[SalesRecord]) -> ViewModel {
        let filtered = self.filter(records);
        debug!(
            "Aggregating {} of {} records ({:?} view, {} to {})",
            filtered.len(),
            records.len(),
            self.filters.view_mode,
            self.filters.start,
            self.filters.end
        );

        if filtered.is_empty() {
            return ViewModel::default();
        }

        let universe = category_universe(records);

        ViewModel {
            totals: self.totals(&filtered),
            top_product: self.top_product(&filtered),
            trend: self.trend(&filtered, &universe),
            category_breakdown: self.category_breakdown(&filtered),
        }
    }
}

pub fn bucket_key(date: NaiveDate, mode: ViewMode) -> String {
    match mode {
        ViewMode::Day => day_key(date),
        ViewMode::Week => iso_week_key(date),
        ViewMode::Month => month_key(date),
    }
}

/// Every category present in `records`, regardless of filters.
pub fn category_universe(records: &[SalesRecord]) -> BTreeSet<String> {
    records.iter().map(|r| r.category.clone()).collect()
}

/// Gives each bucket an explicit zero for categories it did not see, so
/// stacked series share one complete key set.
pub fn zero_fill_categories(buckets: &mut [TrendBucket], universe: &BTreeSet<String>) {
    for bucket in buckets {
        let categories = bucket.categories.get_or_insert_with(BTreeMap::new);
        for category in universe {
            categories.entry(category.clone()).or_insert(0.0);
        }
    }
}

fn sum_in_first_seen_order<'r, I>(items: I) -> Vec<(String, f64)>
where
    I: Iterator<Item = (&'r String, f64)>,
{
    let mut index: HashMap<&'r str, usize> = HashMap::new();
    let mut sums: Vec<(String, f64)> = Vec::new();

    for (label, amount) in items {
        match index.get(label.as_str()) {
            Some(&idx) => sums[idx].1 += amount,
            None => {
                index.insert(label.as_str(), sums.len());
                sums.push((label.clone(), amount));
            }
        }
    }

    sums
}

/// Aggregates `records` under `filters`. Pure: identical inputs give identical
/// output.
pub fn aggregate(records: &[SalesRecord], filters: &ViewState) -> ViewModel {
    Aggregator::new(filters).run(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ProductFilter;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record(
        date: NaiveDate,
        category: &str,
        product: &str,
        qty: u64,
        amount: f64,
    ) -> SalesRecord {
        SalesRecord::new(date, category, product, qty, amount).unwrap()
    }

    fn sample() -> Vec<SalesRecord> {
        vec![
            record(ymd(2024, 1, 1), "Drinks", "Latte", 2, 9.0),
            record(ymd(2024, 1, 3), "Food", "Bagel", 1, 4.0),
            record(ymd(2024, 1, 8), "Drinks", "Mocha", 1, 5.0),
            record(ymd(2024, 1, 31), "Drinks", "Latte", 3, 13.5),
            record(ymd(2024, 2, 2), "Food", "Bagel", 4, 16.0),
        ]
    }

    fn full_range() -> ViewState {
        ViewState::with_range(ymd(2024, 1, 1), ymd(2024, 12, 31))
    }

    #[test]
    fn test_full_range_totals_match_record_sums() {
        let records = sample();
        let view = aggregate(&records, &full_range());

        let expected: f64 = records.iter().map(|r| r.amount).sum();
        assert_eq!(view.totals.total_sales, expected);
        assert_eq!(view.totals.total_quantity, 11);
        assert_eq!(view.totals.transaction_count, 5);
        assert_eq!(view.totals.average_order_value, expected / 5.0);
    }

    #[test]
    fn test_end_date_is_inclusive() {
        let records = sample();
        let filters = ViewState::with_range(ymd(2024, 1, 3), ymd(2024, 1, 8));
        let view = aggregate(&records, &filters);

        assert_eq!(view.totals.transaction_count, 2);
        assert_eq!(view.totals.total_sales, 9.0);
    }

    #[test]
    fn test_product_filter() {
        let records = sample();
        let filters = ViewState {
            product: ProductFilter::from("Latte"),
            ..full_range()
        };
        let view = aggregate(&records, &filters);

        assert_eq!(view.totals.total_sales, 22.5);
        assert_eq!(view.category_breakdown.len(), 1);
        assert_eq!(view.category_breakdown[0].category, "Drinks");
    }

    #[test]
    fn test_empty_input_yields_zeroed_view() {
        let view = aggregate(&[], &full_range());
        assert_eq!(view, ViewModel::default());
        assert_eq!(view.totals.total_sales, 0.0);
        assert!(view.top_product.is_none());
        assert!(view.trend.is_empty());
        assert!(view.category_breakdown.is_empty());

        let outside = ViewState::with_range(ymd(2020, 1, 1), ymd(2020, 1, 31));
        assert_eq!(aggregate(&sample(), &outside), ViewModel::default());
    }

    #[test]
    fn test_aggregate_is_idempotent() {
        let records = sample();
        let filters = ViewState {
            view_mode: ViewMode::Week,
            category_breakdown: true,
            ..full_range()
        };

        assert_eq!(aggregate(&records, &filters), aggregate(&records, &filters));
    }

    #[test]
    fn test_top_product_and_tie_break() {
        let view = aggregate(&sample(), &full_range());
        let top = view.top_product.unwrap();
        assert_eq!(top.product_name, "Latte");
        assert_eq!(top.amount, 22.5);

        let tied = vec![
            record(ymd(2024, 1, 1), "A", "Second", 1, 10.0),
            record(ymd(2024, 1, 1), "A", "First", 1, 4.0),
            record(ymd(2024, 1, 2), "A", "First", 1, 6.0),
        ];
        let view = aggregate(&tied, &full_range());
        assert_eq!(view.top_product.unwrap().product_name, "Second");
    }

    #[test]
    fn test_week_buckets() {
        let filters = ViewState {
            view_mode: ViewMode::Week,
            ..full_range()
        };
        let view = aggregate(&sample(), &filters);

        let keys: Vec<&str> = view.trend.iter().map(|b| b.key.as_str()).collect();
        assert_eq!(keys, vec!["2024-W01", "2024-W02", "2024-W05"]);
        assert_eq!(view.trend[0].amount, 13.0);
        assert_eq!(view.trend[0].quantity, 3);
        assert!(view.trend[0].categories.is_none());
    }

    #[test]
    fn test_month_buckets_sorted() {
        let mut records = sample();
        records.reverse();
        let filters = ViewState {
            view_mode: ViewMode::Month,
            ..full_range()
        };
        let view = aggregate(&records, &filters);

        let keys: Vec<&str> = view.trend.iter().map(|b| b.key.as_str()).collect();
        assert_eq!(keys, vec!["2024-01", "2024-02"]);
        assert_eq!(view.trend[0].amount, 31.5);
    }

    #[test]
    fn test_category_breakdown_zero_fills_every_bucket() {
        // Product filter narrows records to Drinks only; Food must still appear
        let filters = ViewState {
            view_mode: ViewMode::Day,
            category_breakdown: true,
            product: ProductFilter::from("Mocha"),
            ..full_range()
        };
        let view = aggregate(&sample(), &filters);

        assert_eq!(view.trend.len(), 1);
        let categories = view.trend[0].categories.as_ref().unwrap();
        assert_eq!(categories.len(), 2);
        assert_eq!(categories["Drinks"], 5.0);
        assert_eq!(categories["Food"], 0.0);
    }

    #[test]
    fn test_category_breakdown_order() {
        let view = aggregate(&sample(), &full_range());
        let names: Vec<&str> = view
            .category_breakdown
            .iter()
            .map(|c| c.category.as_str())
            .collect();
        assert_eq!(names, vec!["Drinks", "Food"]);
        assert_eq!(view.category_breakdown[0].amount, 27.5);
        assert_eq!(view.category_breakdown[1].amount, 20.0);
    }

    #[test]
    fn test_zero_fill_adds_missing_map() {
        let mut buckets = vec![TrendBucket {
            key: "2024-01".to_string(),
            amount: 1.0,
            quantity: 1,
            categories: None,
        }];
        let universe: BTreeSet<String> =
            ["A".to_string(), "B".to_string()].into_iter().collect();
        zero_fill_categories(&mut buckets, &universe);

        let categories = buckets[0].categories.as_ref().unwrap();
        assert_eq!(categories.values().sum::<f64>(), 0.0);
        assert_eq!(categories.len(), 2);
    }

    #[test]
    fn test_oversized_quantities_saturate() {
        let records = vec![
            record(ymd(2024, 1, 15), "A", "X", 10_000_000_000_000_000_000, 1.0),
            record(ymd(2024, 1, 15), "A", "X", 10_000_000_000_000_000_000, 1.0),
        ];
        let view = aggregate(&records, &full_range());

        assert_eq!(view.totals.total_quantity, u64::MAX);
        assert_eq!(view.trend[0].quantity, u64::MAX);
        assert_eq!(view.totals.total_sales, 2.0);
    }
}

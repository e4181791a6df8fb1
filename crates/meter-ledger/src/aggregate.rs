use std::collections::BTreeMap;

use meter_types::{CalendarDate, ConsumptionRecord, MonthKey, RecordId};
use serde::Serialize;

/// One row of a period view, in creation order.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LedgerRow {
    pub id: RecordId,
    pub date: CalendarDate,
    pub reading: f64,
    pub daily_delta: f64,
    pub running_total: f64,
}

impl From<&ConsumptionRecord> for LedgerRow {
    fn from(record: &ConsumptionRecord) -> Self {
        Self {
            id: record.id,
            date: record.date,
            reading: record.reading,
            daily_delta: record.daily_delta,
            running_total: record.monthly_running_total,
        }
    }
}

/// Aggregated view of one period.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PeriodView {
    pub rows: Vec<LedgerRow>,
    /// Running total of the last row, or 0 for an empty period.
    pub total: f64,
}

impl PeriodView {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Consumption of one month.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MonthlyRollup {
    pub month: MonthKey,
    pub readings: usize,
    pub first_reading: f64,
    pub last_reading: f64,
    /// Running total of the month's last-created record.
    pub consumption: f64,
}

/// Consumption of one calendar year.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnnualRollup {
    pub year: u32,
    /// Months with at least one record.
    pub months: usize,
    /// Sum of the months' consumption.
    pub consumption: f64,
}

/// Derives period totals and rollups from stored records.
///
/// Every operation recomputes from the full record set it is given and
/// sorts by creation order itself; callers may pass records in any order.
pub struct PeriodAggregator;

impl PeriodAggregator {
    /// Rows in creation order, with `total` taken from the last row.
    ///
    /// The input is assumed to be filtered to the wanted period already; no
    /// cross-month re-summing happens here.
    pub fn aggregate(records: &[ConsumptionRecord]) -> PeriodView {
        let rows: Vec<LedgerRow> = sorted(records).into_iter().map(LedgerRow::from).collect();
        let total = rows.last().map_or(0.0, |row| row.running_total);
        PeriodView { rows, total }
    }

    /// One entry per month present in `records`, ascending.
    pub fn monthly_rollup(records: &[ConsumptionRecord]) -> Vec<MonthlyRollup> {
        let mut months: BTreeMap<MonthKey, Vec<&ConsumptionRecord>> = BTreeMap::new();
        for record in sorted(records) {
            months.entry(record.month_key()).or_default().push(record);
        }

        months
            .into_iter()
            .filter_map(|(month, in_month)| {
                let first = in_month.first()?;
                let last = in_month.last()?;
                Some(MonthlyRollup {
                    month,
                    readings: in_month.len(),
                    first_reading: first.reading,
                    last_reading: last.reading,
                    consumption: last.monthly_running_total,
                })
            })
            .collect()
    }

    /// One entry per year present in `records`, ascending.
    pub fn annual_rollup(records: &[ConsumptionRecord]) -> Vec<AnnualRollup> {
        let mut years: BTreeMap<u32, AnnualRollup> = BTreeMap::new();
        for month in Self::monthly_rollup(records) {
            let year = years.entry(month.month.year()).or_insert(AnnualRollup {
                year: month.month.year(),
                months: 0,
                consumption: 0.0,
            });
            year.months += 1;
            year.consumption += month.consumption;
        }
        years.into_values().collect()
    }

    /// Total consumption over every month present in `records`.
    pub fn all_time_total(records: &[ConsumptionRecord]) -> f64 {
        Self::monthly_rollup(records)
            .iter()
            .map(|month| month.consumption)
            .sum()
    }
}

fn sorted(records: &[ConsumptionRecord]) -> Vec<&ConsumptionRecord> {
    let mut ordered: Vec<&ConsumptionRecord> = records.iter().collect();
    ordered.sort_by(|a, b| ConsumptionRecord::oldest_first(a, b));
    ordered
}

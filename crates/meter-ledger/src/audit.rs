use std::collections::{BTreeMap, HashMap};

use meter_types::{CalendarDate, ConsumptionRecord, MonthKey, RecordId};
use serde::Serialize;

/// Derived fields are only recomputed when a record is created, so editing or
/// deleting an earlier record of a month leaves later records stale. The
/// auditor recomputes what each record's derived fields would be today and
/// reports the differences. It never modifies anything.
pub struct LedgerAuditor;

/// Result of auditing a set of records.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AuditReport {
    pub records_checked: usize,
    pub months_checked: usize,
    pub findings: Vec<StaleRecord>,
}

impl AuditReport {
    /// Returns `true` if no finding was reported.
    pub fn is_consistent(&self) -> bool {
        self.findings.is_empty()
    }
}

/// A record whose stored state disagrees with a recomputation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StaleRecord {
    pub id: RecordId,
    pub date: CalendarDate,
    pub kind: StaleKind,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StaleKind {
    /// Stored delta differs from `reading - previous reading`.
    DeltaMismatch { expected: f64, actual: f64 },
    /// Stored running total differs from the sum of the month's stored
    /// deltas up to this record.
    RunningTotalMismatch { expected: f64, actual: f64 },
    /// Another record of the same day was created earlier.
    DuplicateDate { first: RecordId },
    /// The reading is below its predecessor's, e.g. after an edit.
    NegativeDelta { delta: f64 },
}

const TOLERANCE: f64 = 1e-9;

impl LedgerAuditor {
    /// Audit `records`, month by month in creation order.
    ///
    /// Pass whole months: a month given only partially is audited as if the
    /// missing records did not exist.
    pub fn audit(records: &[ConsumptionRecord]) -> AuditReport {
        let mut months: BTreeMap<MonthKey, Vec<&ConsumptionRecord>> = BTreeMap::new();
        for record in records {
            months.entry(record.month_key()).or_default().push(record);
        }

        let mut findings = Vec::new();
        for in_month in months.values_mut() {
            in_month.sort_by(|a, b| ConsumptionRecord::oldest_first(a, b));
            audit_month(in_month, &mut findings);
        }

        AuditReport {
            records_checked: records.len(),
            months_checked: months.len(),
            findings,
        }
    }
}

fn audit_month(in_month: &[&ConsumptionRecord], findings: &mut Vec<StaleRecord>) {
    let mut previous: Option<f64> = None;
    let mut running = 0.0;
    let mut first_of_day: HashMap<CalendarDate, RecordId> = HashMap::new();

    for record in in_month {
        let mut flag = |kind| {
            findings.push(StaleRecord {
                id: record.id,
                date: record.date,
                kind,
            })
        };

        if let Some(first) = first_of_day.get(&record.date) {
            flag(StaleKind::DuplicateDate { first: *first });
        } else {
            first_of_day.insert(record.date, record.id);
        }

        let expected_delta = match previous {
            Some(prev) => record.reading - prev,
            None => record.reading,
        };
        if expected_delta < 0.0 {
            flag(StaleKind::NegativeDelta {
                delta: expected_delta,
            });
        } else if !close(expected_delta, record.daily_delta) {
            flag(StaleKind::DeltaMismatch {
                expected: expected_delta,
                actual: record.daily_delta,
            });
        }

        running += record.daily_delta;
        if !close(running, record.monthly_running_total) {
            flag(StaleKind::RunningTotalMismatch {
                expected: running,
                actual: record.monthly_running_total,
            });
        }

        previous = Some(record.reading);
    }
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= TOLERANCE * a.abs().max(b.abs()).max(1.0)
}

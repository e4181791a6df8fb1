use meter_types::{CalendarDate, ConsumptionRecord, Reading, RecordId};

use crate::error::LedgerError;

/// Outcome of validating a candidate reading.
#[derive(Clone, Debug, PartialEq)]
pub enum Verdict {
    /// The reading may be recorded. `reference` is the reading it is
    /// measured against, absent for the first reading of a month.
    Accept { reference: Option<f64> },
    Reject(Rejection),
}

/// Why a candidate reading was refused.
#[derive(Clone, Debug, PartialEq)]
pub enum Rejection {
    /// The day already has a record.
    DuplicateDate { date: CalendarDate, existing: RecordId },
    /// The reading is below the latest reading of the month.
    NonMonotonicReading { candidate: f64, reference: f64 },
}

impl From<Rejection> for LedgerError {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::DuplicateDate { date, .. } => Self::DuplicateDate { date },
            Rejection::NonMonotonicReading {
                candidate,
                reference,
            } => Self::NonMonotonicReading {
                reading: candidate,
                reference,
            },
        }
    }
}

/// Accept/reject decision for a candidate reading.
///
/// Pure: the caller fetches the day's and the month's records and passes
/// them in. Input order does not matter.
pub struct ReadingValidator;

impl ReadingValidator {
    pub fn validate(
        candidate: Reading,
        day_records: &[ConsumptionRecord],
        month_records: &[ConsumptionRecord],
    ) -> Verdict {
        if let Some(existing) = day_records.first() {
            return Verdict::Reject(Rejection::DuplicateDate {
                date: existing.date,
                existing: existing.id,
            });
        }

        let reference = Self::reference_reading(month_records);
        match reference {
            Some(reference) if candidate.value() < reference => {
                Verdict::Reject(Rejection::NonMonotonicReading {
                    candidate: candidate.value(),
                    reference,
                })
            }
            _ => Verdict::Accept { reference },
        }
    }

    /// The reading of the most recently created record, if any.
    ///
    /// Creation order, not calendar order: a back-filled earlier day entered
    /// last is the reference.
    pub fn reference_reading(month_records: &[ConsumptionRecord]) -> Option<f64> {
        month_records
            .iter()
            .max_by(|a, b| ConsumptionRecord::oldest_first(a, b))
            .map(|r| r.reading)
    }
}

#[cfg(test)]
mod tests {
    use meter_types::CreationStamp;

    use super::*;

    fn record(day: u32, ms: u64, reading: f64) -> ConsumptionRecord {
        ConsumptionRecord::new(
            CalendarDate::new(day, 6, 2024).unwrap(),
            CreationStamp::new(ms, 0),
            reading,
            0.0,
            0.0,
        )
    }

    fn reading(v: f64) -> Reading {
        Reading::new(v).unwrap()
    }

    #[test]
    fn first_reading_of_month_is_accepted_without_reference() {
        assert_eq!(
            ReadingValidator::validate(reading(100.0), &[], &[]),
            Verdict::Accept { reference: None }
        );
    }

    #[test]
    fn occupied_day_is_rejected() {
        let existing = record(2, 10, 150.0);
        let verdict = ReadingValidator::validate(
            reading(500.0),
            std::slice::from_ref(&existing),
            std::slice::from_ref(&existing),
        );
        assert_eq!(
            verdict,
            Verdict::Reject(Rejection::DuplicateDate {
                date: existing.date,
                existing: existing.id,
            })
        );
    }

    #[test]
    fn reading_below_reference_is_rejected() {
        let month = vec![record(1, 10, 100.0), record(2, 20, 150.0)];
        assert_eq!(
            ReadingValidator::validate(reading(120.0), &[], &month),
            Verdict::Reject(Rejection::NonMonotonicReading {
                candidate: 120.0,
                reference: 150.0,
            })
        );
    }

    #[test]
    fn equal_reading_is_accepted() {
        let month = vec![record(2, 20, 150.0)];
        assert_eq!(
            ReadingValidator::validate(reading(150.0), &[], &month),
            Verdict::Accept {
                reference: Some(150.0)
            }
        );
    }

    #[test]
    fn duplicate_date_wins_over_monotonicity() {
        let existing = record(2, 20, 150.0);
        let verdict = ReadingValidator::validate(
            reading(10.0),
            std::slice::from_ref(&existing),
            std::slice::from_ref(&existing),
        );
        assert!(matches!(
            verdict,
            Verdict::Reject(Rejection::DuplicateDate { .. })
        ));
    }

    #[test]
    fn reference_follows_creation_order_not_date() {
        // Day 20 entered first, day 5 back-filled afterwards.
        let month = vec![record(20, 10, 300.0), record(5, 20, 120.0)];
        assert_eq!(ReadingValidator::reference_reading(&month), Some(120.0));

        let reversed: Vec<_> = month.into_iter().rev().collect();
        assert_eq!(ReadingValidator::reference_reading(&reversed), Some(120.0));
    }

    #[test]
    fn rejection_converts_to_ledger_error() {
        let err: LedgerError = Rejection::NonMonotonicReading {
            candidate: 1.0,
            reference: 2.0,
        }
        .into();
        assert_eq!(
            err,
            LedgerError::NonMonotonicReading {
                reading: 1.0,
                reference: 2.0
            }
        );
    }
}

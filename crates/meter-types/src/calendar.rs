use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// A calendar date in the meter's local calendar.
///
/// Always a real Gregorian date: construction goes through
/// [`CalendarDate::new`], which rejects triples such as 31/04 or 29/02 on a
/// non-leap year. Ordering is chronological: `year` → `month` → `day`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "DateParts", into = "DateParts")]
pub struct CalendarDate {
    day: u32,
    month: u32,
    year: u32,
}

/// Wire form of a [`CalendarDate`], validated on deserialization.
#[derive(Clone, Copy, Serialize, Deserialize)]
struct DateParts {
    day: u32,
    month: u32,
    year: u32,
}

impl CalendarDate {
    /// Create a date from its (day, month, year) components.
    pub fn new(day: u32, month: u32, year: u32) -> Result<Self, TypeError> {
        let valid = i32::try_from(year)
            .ok()
            .and_then(|y| NaiveDate::from_ymd_opt(y, month, day))
            .is_some();
        if !valid {
            return Err(TypeError::InvalidDate { day, month, year });
        }
        Ok(Self { day, month, year })
    }

    /// Convert from a `chrono` date. Dates before year 0 are rejected.
    pub fn from_naive(date: NaiveDate) -> Result<Self, TypeError> {
        let year = u32::try_from(date.year()).map_err(|_| TypeError::InvalidDate {
            day: date.day(),
            month: date.month(),
            year: 0,
        })?;
        Ok(Self {
            day: date.day(),
            month: date.month(),
            year,
        })
    }

    pub fn day(&self) -> u32 {
        self.day
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn year(&self) -> u32 {
        self.year
    }

    /// The (month, year) period this date belongs to.
    pub fn month_key(&self) -> MonthKey {
        MonthKey {
            month: self.month,
            year: self.year,
        }
    }
}

impl TryFrom<DateParts> for CalendarDate {
    type Error = TypeError;

    fn try_from(parts: DateParts) -> Result<Self, Self::Error> {
        Self::new(parts.day, parts.month, parts.year)
    }
}

impl From<CalendarDate> for DateParts {
    fn from(date: CalendarDate) -> Self {
        Self {
            day: date.day,
            month: date.month,
            year: date.year,
        }
    }
}

impl PartialOrd for CalendarDate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CalendarDate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.year
            .cmp(&other.year)
            .then(self.month.cmp(&other.month))
            .then(self.day.cmp(&other.day))
    }
}

impl fmt::Debug for CalendarDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CalendarDate({self})")
    }
}

impl fmt::Display for CalendarDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}/{:02}/{:04}", self.day, self.month, self.year)
    }
}

impl FromStr for CalendarDate {
    type Err = TypeError;

    /// Accepts `dd/mm/yyyy` or ISO `yyyy-mm-dd`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unparsable = || TypeError::UnparsableDate(s.to_string());
        let s = s.trim();
        let (day, month, year) = if let Some((y, rest)) = s.split_once('-') {
            let (m, d) = rest.split_once('-').ok_or_else(unparsable)?;
            (d, m, y)
        } else {
            let mut parts = s.splitn(3, '/');
            let d = parts.next().ok_or_else(unparsable)?;
            let m = parts.next().ok_or_else(unparsable)?;
            let y = parts.next().ok_or_else(unparsable)?;
            (d, m, y)
        };
        let parse = |v: &str| v.parse::<u32>().map_err(|_| unparsable());
        Self::new(parse(day)?, parse(month)?, parse(year)?)
    }
}

/// Grouping key for running totals: a (month, year) pair.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "MonthParts", into = "MonthParts")]
pub struct MonthKey {
    month: u32,
    year: u32,
}

/// Wire form of a [`MonthKey`], validated on deserialization.
#[derive(Clone, Copy, Serialize, Deserialize)]
struct MonthParts {
    month: u32,
    year: u32,
}

impl MonthKey {
    pub fn new(month: u32, year: u32) -> Result<Self, TypeError> {
        if !(1..=12).contains(&month) {
            return Err(TypeError::InvalidMonth(month));
        }
        Ok(Self { month, year })
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn year(&self) -> u32 {
        self.year
    }

    /// English month name, e.g. "March".
    pub fn month_name(&self) -> &'static str {
        u8::try_from(self.month)
            .ok()
            .and_then(|m| chrono::Month::try_from(m).ok())
            .map(|m| m.name())
            .unwrap_or("Unknown")
    }

    /// Returns `true` if `date` falls within this month.
    pub fn contains(&self, date: &CalendarDate) -> bool {
        date.month == self.month && date.year == self.year
    }
}

impl TryFrom<MonthParts> for MonthKey {
    type Error = TypeError;

    fn try_from(parts: MonthParts) -> Result<Self, Self::Error> {
        Self::new(parts.month, parts.year)
    }
}

impl From<MonthKey> for MonthParts {
    fn from(key: MonthKey) -> Self {
        Self {
            month: key.month,
            year: key.year,
        }
    }
}

impl PartialOrd for MonthKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MonthKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.year
            .cmp(&other.year)
            .then(self.month.cmp(&other.month))
    }
}

impl fmt::Debug for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MonthKey({self})")
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}/{:04}", self.month, self.year)
    }
}

/// Scope of a ledger query or aggregation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeriodSelector {
    /// A single calendar day.
    Day(CalendarDate),
    /// A (month, year) period.
    Month(MonthKey),
    /// A whole calendar year.
    Year(u32),
    /// Every record in the ledger.
    All,
}

impl PeriodSelector {
    /// Returns `true` if a record dated `date` belongs to this period.
    pub fn contains(&self, date: &CalendarDate) -> bool {
        match self {
            Self::Day(day) => day == date,
            Self::Month(month) => month.contains(date),
            Self::Year(year) => date.year == *year,
            Self::All => true,
        }
    }
}

impl fmt::Display for PeriodSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Day(day) => write!(f, "{day}"),
            Self::Month(month) => write!(f, "{} {}", month.month_name(), month.year),
            Self::Year(year) => write!(f, "{year}"),
            Self::All => write!(f, "all time"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32, m: u32, y: u32) -> CalendarDate {
        CalendarDate::new(d, m, y).unwrap()
    }

    #[test]
    fn rejects_impossible_dates() {
        assert!(CalendarDate::new(31, 4, 2024).is_err());
        assert!(CalendarDate::new(0, 1, 2024).is_err());
        assert!(CalendarDate::new(1, 13, 2024).is_err());
        assert_eq!(
            CalendarDate::new(29, 2, 2023),
            Err(TypeError::InvalidDate {
                day: 29,
                month: 2,
                year: 2023
            })
        );
    }

    #[test]
    fn accepts_leap_day() {
        let leap = date(29, 2, 2024);
        assert_eq!(leap.day(), 29);
        assert_eq!(leap.month_key(), MonthKey::new(2, 2024).unwrap());
    }

    #[test]
    fn ordering_is_chronological() {
        assert!(date(31, 12, 2023) < date(1, 1, 2024));
        assert!(date(5, 3, 2024) < date(1, 4, 2024));
        assert!(date(1, 4, 2024) < date(2, 4, 2024));
    }

    #[test]
    fn parses_both_formats() {
        assert_eq!("07/03/2024".parse::<CalendarDate>().unwrap(), date(7, 3, 2024));
        assert_eq!("2024-03-07".parse::<CalendarDate>().unwrap(), date(7, 3, 2024));
        assert!("2024/03".parse::<CalendarDate>().is_err());
        assert!("31/02/2024".parse::<CalendarDate>().is_err());
    }

    #[test]
    fn display_format() {
        assert_eq!(date(7, 3, 2024).to_string(), "07/03/2024");
        assert_eq!(MonthKey::new(3, 2024).unwrap().to_string(), "03/2024");
    }

    #[test]
    fn naive_conversion() {
        let naive = NaiveDate::from_ymd_opt(2025, 8, 15).unwrap();
        assert_eq!(CalendarDate::from_naive(naive).unwrap(), date(15, 8, 2025));
    }

    #[test]
    fn deserialization_validates() {
        let ok: CalendarDate =
            serde_json::from_str(r#"{"day":1,"month":2,"year":2024}"#).unwrap();
        assert_eq!(ok, date(1, 2, 2024));
        let bad = serde_json::from_str::<CalendarDate>(r#"{"day":30,"month":2,"year":2024}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn month_key_deserialization_validates() {
        let ok: MonthKey = serde_json::from_str(r#"{"month":12,"year":2024}"#).unwrap();
        assert_eq!(ok, MonthKey::new(12, 2024).unwrap());
        assert!(serde_json::from_str::<MonthKey>(r#"{"month":13,"year":2024}"#).is_err());
        assert!(serde_json::from_str::<MonthKey>(r#"{"month":0,"year":2024}"#).is_err());

        let selector: PeriodSelector =
            serde_json::from_str(r#"{"Month":{"month":6,"year":2024}}"#).unwrap();
        assert_eq!(selector, PeriodSelector::Month(MonthKey::new(6, 2024).unwrap()));
        let bad = serde_json::from_str::<PeriodSelector>(r#"{"Month":{"month":13,"year":2024}}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn month_key_validation_and_names() {
        assert_eq!(MonthKey::new(0, 2024), Err(TypeError::InvalidMonth(0)));
        assert_eq!(MonthKey::new(3, 2024).unwrap().month_name(), "March");
    }

    #[test]
    fn selector_containment() {
        let d = date(10, 6, 2024);
        assert!(PeriodSelector::Day(d).contains(&d));
        assert!(!PeriodSelector::Day(date(11, 6, 2024)).contains(&d));
        assert!(PeriodSelector::Month(MonthKey::new(6, 2024).unwrap()).contains(&d));
        assert!(!PeriodSelector::Month(MonthKey::new(6, 2023).unwrap()).contains(&d));
        assert!(PeriodSelector::Year(2024).contains(&d));
        assert!(!PeriodSelector::Year(2025).contains(&d));
        assert!(PeriodSelector::All.contains(&d));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn display_then_parse_is_identity(d in 1u32..=28, m in 1u32..=12, y in 1900u32..=2200) {
                let original = date(d, m, y);
                let parsed: CalendarDate = original.to_string().parse().unwrap();
                prop_assert_eq!(parsed, original);
            }

            #[test]
            fn month_key_contains_own_dates(d in 1u32..=28, m in 1u32..=12, y in 0u32..=3000) {
                let original = date(d, m, y);
                prop_assert!(original.month_key().contains(&original));
            }
        }
    }
}

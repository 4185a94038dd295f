use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Calendar month backing one range partition of a readings table.
///
/// Partition bounds are `[first day of month 00:00 UTC, first day of next month 00:00 UTC)`,
/// so a timestamp exactly on a month boundary belongs to the later month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionMonth {
    first_day: NaiveDate,
}

impl PartitionMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|first_day| Self { first_day })
    }

    pub fn from_timestamp(timestamp: DateTime<Utc>) -> Self {
        Self {
            first_day: first_of_month(timestamp.date_naive()),
        }
    }

    pub fn year(&self) -> i32 {
        self.first_day.year()
    }

    pub fn month(&self) -> u32 {
        self.first_day.month()
    }

    /// Inclusive lower bound.
    pub fn start(&self) -> DateTime<Utc> {
        self.first_day.and_time(NaiveTime::default()).and_utc()
    }

    /// Exclusive upper bound.
    pub fn end(&self) -> DateTime<Utc> {
        self.next().start()
    }

    pub fn next(&self) -> Self {
        // 32 days past the 1st always lands inside the following month
        Self {
            first_day: first_of_month(self.first_day + Duration::days(32)),
        }
    }

    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp >= self.start() && timestamp < self.end()
    }

    /// Deterministic partition relation name, e.g. `temperature_readings_p2025_01`.
    pub fn partition_name(&self, table: &str) -> String {
        format!("{}_p{:04}_{:02}", table, self.year(), self.month())
    }

    /// This month followed by the next `months_ahead` months.
    pub fn with_following(&self, months_ahead: u32) -> Vec<PartitionMonth> {
        let mut months = Vec::with_capacity(months_ahead as usize + 1);
        let mut current = *self;
        months.push(current);
        for _ in 0..months_ahead {
            current = current.next();
            months.push(current);
        }
        months
    }
}

impl fmt::Display for PartitionMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year(), self.month())
    }
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.day0()))
}

/// Size of a single partition as reported by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionSize {
    pub table_name: String,
    pub partition_name: String,
    pub size: String,
    pub row_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_mid_month_timestamp_targets_its_month() {
        let ts = Utc.with_ymd_and_hms(2025, 1, 15, 13, 45, 0).unwrap();
        let month = PartitionMonth::from_timestamp(ts);
        assert_eq!(month.to_string(), "2025-01");
        assert_eq!(
            month.partition_name("temperature_readings"),
            "temperature_readings_p2025_01"
        );
    }

    #[test]
    fn test_month_boundary_belongs_to_later_month() {
        let boundary = Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap();
        let month = PartitionMonth::from_timestamp(boundary);
        assert_eq!(month, PartitionMonth::new(2025, 2).unwrap());

        let january = PartitionMonth::new(2025, 1).unwrap();
        assert!(!january.contains(boundary));
        assert!(month.contains(boundary));

        let just_before = boundary - Duration::nanoseconds(1);
        assert_eq!(PartitionMonth::from_timestamp(just_before), january);
    }

    #[test]
    fn test_bounds_and_year_rollover() {
        let december = PartitionMonth::new(2024, 12).unwrap();
        assert_eq!(december.start(), Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap());
        assert_eq!(december.end(), Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(december.next(), PartitionMonth::new(2025, 1).unwrap());

        let january = PartitionMonth::new(2025, 1).unwrap();
        assert_eq!(january.next(), PartitionMonth::new(2025, 2).unwrap());
        assert_eq!(
            PartitionMonth::new(2025, 2).unwrap().next(),
            PartitionMonth::new(2025, 3).unwrap()
        );
    }

    #[test]
    fn test_with_following() {
        let november = PartitionMonth::new(2024, 11).unwrap();
        let months: Vec<String> = november
            .with_following(2)
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(months, vec!["2024-11", "2024-12", "2025-01"]);
    }

    #[test]
    fn test_invalid_month() {
        assert!(PartitionMonth::new(2025, 13).is_none());
        assert!(PartitionMonth::new(2025, 0).is_none());
    }
}

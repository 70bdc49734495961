//! Business-day calendar used to keep outreach off weekends and holidays.

use std::collections::BTreeSet;

use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// Weekend + caller-supplied holiday calendar.
///
/// Immutable once built; schedulers share it by reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BusinessCalendar {
    holidays: BTreeSet<NaiveDate>,
}

impl BusinessCalendar {
    /// Calendar that only skips weekends.
    pub fn weekends_only() -> Self {
        Self::default()
    }

    pub fn with_holidays<I>(holidays: I) -> Self
    where
        I: IntoIterator<Item = NaiveDate>,
    {
        Self {
            holidays: holidays.into_iter().collect(),
        }
    }

    pub fn holidays(&self) -> impl Iterator<Item = &NaiveDate> {
        self.holidays.iter()
    }

    pub fn is_weekend(date: NaiveDate) -> bool {
        matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.contains(&date)
    }

    pub fn is_business_day(&self, date: NaiveDate) -> bool {
        !Self::is_weekend(date) && !self.is_holiday(date)
    }

    /// Returns `date` if it is a business day, otherwise the next one.
    pub fn next_business_day(&self, date: NaiveDate) -> NaiveDate {
        let mut current = date;
        // Terminates: at most 2 weekend days per week, holiday set is finite.
        while !self.is_business_day(current) {
            current += Duration::days(1);
        }
        current
    }

    /// `anchor + offset_days`, shifted forward onto a business day.
    pub fn offset_business_day(&self, anchor: NaiveDate, offset_days: u32) -> NaiveDate {
        self.next_business_day(anchor + Duration::days(i64::from(offset_days)))
    }
}

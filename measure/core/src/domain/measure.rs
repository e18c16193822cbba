// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Measure Aggregate
//!
//! A single utility-meter reading: the submitted photograph, the value
//! extracted from it, and the one-time human confirmation of that value.
//!
//! ## Invariants
//!
//! - At most one `Measure` exists per (`customer_code`, `measure_type`,
//!   calendar month of `measure_datetime`). See [`MonthBounds`].
//! - `measure_datetime` keeps the UTC offset it was reported with; its month
//!   is read in that local calendar.
//! - `has_confirmed` moves `false → true` exactly once and never back.
//! - `measure_value` only changes during that confirmation transition.
//! - `image_base64` and `measure_unit` are write-once.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MeasureId(pub Uuid);

impl MeasureId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(value: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(value).map(Self)
    }
}

impl Default for MeasureId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MeasureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of utility meter a reading was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MeasureType {
    Water,
    Gas,
}

impl MeasureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeasureType::Water => "WATER",
            MeasureType::Gas => "GAS",
        }
    }
}

impl fmt::Display for MeasureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown measure type '{0}' (expected WATER or GAS)")]
pub struct ParseMeasureTypeError(pub String);

impl FromStr for MeasureType {
    type Err = ParseMeasureTypeError;

    /// Case-insensitive, so `water` and `WATER` are the same meter kind.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "WATER" => Ok(MeasureType::Water),
            "GAS" => Ok(MeasureType::Gas),
            _ => Err(ParseMeasureTypeError(s.to_string())),
        }
    }
}

/// Inclusive `[start, end]` range covering the calendar month of a timestamp,
/// in the timestamp's own offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthBounds {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
}

impl MonthBounds {
    pub fn containing(instant: DateTime<FixedOffset>) -> Self {
        let offset = *instant.offset();
        let first = first_day_of_month(instant.year(), instant.month());
        let next = if instant.month() == 12 {
            first_day_of_month(instant.year() + 1, 1)
        } else {
            first_day_of_month(instant.year(), instant.month() + 1)
        };

        Self {
            start: local_midnight(first, offset),
            end: local_midnight(next, offset) - Duration::nanoseconds(1),
        }
    }

    /// Compares instants, so readings reported with other offsets are placed
    /// by the moment they were taken.
    pub fn contains(&self, instant: DateTime<FixedOffset>) -> bool {
        instant >= self.start && instant <= self.end
    }

    /// First calendar day of the month; the bucket key used for uniqueness.
    pub fn month_key(&self) -> NaiveDate {
        self.start.date_naive()
    }
}

fn first_day_of_month(year: i32, month: u32) -> NaiveDate {
    // Day 1 exists for every month chrono can represent.
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MIN)
}

fn local_midnight(date: NaiveDate, offset: FixedOffset) -> DateTime<FixedOffset> {
    let local = date.and_time(NaiveTime::MIN);
    let utc = local - Duration::seconds(i64::from(offset.local_minus_utc()));
    DateTime::from_naive_utc_and_offset(utc, offset)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MeasureError {
    #[error("measure {0} has already been confirmed")]
    AlreadyConfirmed(MeasureId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    pub id: MeasureId,
    pub customer_code: String,
    pub measure_datetime: DateTime<FixedOffset>,
    pub measure_type: MeasureType,
    image_base64: String,
    measure_value: i32,
    measure_unit: String,
    has_confirmed: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields needed to record a new reading.
#[derive(Debug, Clone)]
pub struct NewMeasure {
    pub customer_code: String,
    pub measure_datetime: DateTime<FixedOffset>,
    pub measure_type: MeasureType,
    pub image_base64: String,
    pub measure_value: i32,
    pub measure_unit: String,
}

impl Measure {
    pub fn new(input: NewMeasure) -> Self {
        Self {
            id: MeasureId::new(),
            customer_code: input.customer_code,
            measure_datetime: input.measure_datetime,
            measure_type: input.measure_type,
            image_base64: input.image_base64,
            measure_value: input.measure_value,
            measure_unit: input.measure_unit,
            has_confirmed: false,
            created_at: Utc::now(),
        }
    }

    /// Rebuild an aggregate from persisted state.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: MeasureId,
        customer_code: String,
        measure_datetime: DateTime<FixedOffset>,
        measure_type: MeasureType,
        image_base64: String,
        measure_value: i32,
        measure_unit: String,
        has_confirmed: bool,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            customer_code,
            measure_datetime,
            measure_type,
            image_base64,
            measure_value,
            measure_unit,
            has_confirmed,
            created_at,
        }
    }

    pub fn image_base64(&self) -> &str {
        &self.image_base64
    }

    pub fn measure_value(&self) -> i32 {
        self.measure_value
    }

    pub fn measure_unit(&self) -> &str {
        &self.measure_unit
    }

    pub fn has_confirmed(&self) -> bool {
        self.has_confirmed
    }

    pub fn month(&self) -> MonthBounds {
        MonthBounds::containing(self.measure_datetime)
    }

    /// Apply the human-confirmed value. Only allowed once.
    pub fn confirm(&mut self, confirmed_value: i32) -> Result<(), MeasureError> {
        if self.has_confirmed {
            return Err(MeasureError::AlreadyConfirmed(self.id));
        }
        self.measure_value = confirmed_value;
        self.has_confirmed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    fn sample(datetime: &str) -> Measure {
        Measure::new(NewMeasure {
            customer_code: "C1".to_string(),
            measure_datetime: ts(datetime),
            measure_type: MeasureType::Water,
            image_base64: "aGVsbG8=".to_string(),
            measure_value: 123,
            measure_unit: "m3".to_string(),
        })
    }

    #[test]
    fn test_month_bounds_mid_month() {
        let bounds = MonthBounds::containing(ts("2024-03-15T10:20:30Z"));
        assert_eq!(bounds.start, ts("2024-03-01T00:00:00Z"));
        assert_eq!(bounds.end, ts("2024-03-31T23:59:59.999999999Z"));
        assert_eq!(bounds.month_key(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    }

    #[test]
    fn test_month_bounds_include_both_edges() {
        let bounds = MonthBounds::containing(ts("2024-03-15T00:00:00Z"));
        assert!(bounds.contains(ts("2024-03-01T00:00:00Z")));
        assert!(bounds.contains(ts("2024-03-31T23:59:59.999Z")));
        assert!(!bounds.contains(ts("2024-04-01T00:00:00Z")));
        assert!(!bounds.contains(ts("2024-02-29T23:59:59.999Z")));
    }

    #[test]
    fn test_month_bounds_december_rolls_year() {
        let bounds = MonthBounds::containing(ts("2023-12-31T23:59:59Z"));
        assert_eq!(bounds.start, ts("2023-12-01T00:00:00Z"));
        assert!(bounds.end < ts("2024-01-01T00:00:00Z"));
        assert!(bounds.contains(ts("2023-12-31T23:59:59.999Z")));
    }

    #[test]
    fn test_month_bounds_leap_february() {
        let bounds = MonthBounds::containing(ts("2024-02-10T00:00:00Z"));
        assert!(bounds.contains(ts("2024-02-29T12:00:00Z")));
        assert!(!bounds.contains(ts("2024-03-01T00:00:00Z")));
    }

    #[test]
    fn test_month_bounds_follow_local_offset() {
        // 01:00 UTC on April 1st, still March 31st at -03:00.
        let bounds = MonthBounds::containing(ts("2024-03-31T22:00:00-03:00"));
        assert_eq!(bounds.month_key(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(bounds.start, ts("2024-03-01T00:00:00-03:00"));
        assert_eq!(bounds.start.offset().local_minus_utc(), -3 * 3600);
        assert!(bounds.contains(ts("2024-04-01T02:59:59Z")));
        assert!(!bounds.contains(ts("2024-04-01T03:00:00Z")));
    }

    #[test]
    fn test_month_bounds_positive_offset() {
        // 23:30 UTC on January 31st, already February 1st at +05:30.
        let bounds = MonthBounds::containing(ts("2024-02-01T05:00:00+05:30"));
        assert_eq!(bounds.month_key(), NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert!(bounds.contains(ts("2024-01-31T18:30:00Z")));
        assert!(!bounds.contains(ts("2024-01-31T18:29:59Z")));
    }

    #[test]
    fn test_measure_type_parse_is_case_insensitive() {
        assert_eq!("WATER".parse::<MeasureType>().unwrap(), MeasureType::Water);
        assert_eq!("gas".parse::<MeasureType>().unwrap(), MeasureType::Gas);
        assert!("ELECTRIC".parse::<MeasureType>().is_err());
    }

    #[test]
    fn test_measure_type_serde_uppercase() {
        let json = serde_json::to_string(&MeasureType::Gas).unwrap();
        assert_eq!(json, "\"GAS\"");
    }

    #[test]
    fn test_new_measure_is_unconfirmed() {
        let measure = sample("2024-03-15T00:00:00Z");
        assert!(!measure.has_confirmed());
        assert_eq!(measure.measure_value(), 123);
        assert_eq!(measure.measure_unit(), "m3");
    }

    #[test]
    fn test_confirm_once_then_rejected() {
        let mut measure = sample("2024-03-15T00:00:00Z");
        measure.confirm(130).unwrap();
        assert!(measure.has_confirmed());
        assert_eq!(measure.measure_value(), 130);

        let err = measure.confirm(999).unwrap_err();
        assert_eq!(err, MeasureError::AlreadyConfirmed(measure.id));
        assert_eq!(measure.measure_value(), 130);
    }
}

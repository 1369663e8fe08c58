//! Calendar periods and their `YYYYMMDD` boundary strings.

use serde::Serialize;
use time::{Date, Month};

use crate::models::PeriodType;
use crate::WarehouseError;

/// A calendar-aligned period with inclusive boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Period {
    pub period_type: PeriodType,
    pub start: String,
    pub end: String,
    pub key: String,
}

impl Period {
    /// The period of `period_type` that contains `date`.
    pub fn containing(date: Date, period_type: PeriodType) -> Result<Self, WarehouseError> {
        let year = date.year();
        let (start, end, key) = match period_type {
            PeriodType::Daily => (date, date, format_iso_date(date)),
            PeriodType::Monthly => {
                let month = date.month();
                (
                    first_of(year, month)?,
                    last_of(year, month)?,
                    format!("{year:04}-{:02}", u8::from(month)),
                )
            }
            PeriodType::Quarterly => {
                let quarter = (u8::from(date.month()) - 1) / 3;
                let first_month = month_from(quarter * 3 + 1)?;
                let last_month = month_from(quarter * 3 + 3)?;
                (
                    first_of(year, first_month)?,
                    last_of(year, last_month)?,
                    format!("{year:04}-Q{}", quarter + 1),
                )
            }
            PeriodType::Yearly => (
                first_of(year, Month::January)?,
                last_of(year, Month::December)?,
                format!("{year:04}"),
            ),
        };

        Ok(Self {
            period_type,
            start: format_period_date(start),
            end: format_period_date(end),
            key,
        })
    }
}

/// `YYYYMMDD`, the boundary format stored in `facts.period_start/end`.
pub fn format_period_date(date: Date) -> String {
    format!(
        "{:04}{:02}{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

/// `YYYY-MM-DD`, the key format of daily facts.
pub fn format_iso_date(date: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

/// Parse a stored `YYYYMMDD` boundary.
pub fn parse_period_date(value: &str) -> Result<Date, WarehouseError> {
    let invalid = || WarehouseError::InvalidPeriod(format!("'{value}' is not a YYYYMMDD date"));
    if value.len() != 8 || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let year: i32 = value[0..4].parse().map_err(|_| invalid())?;
    let month: u8 = value[4..6].parse().map_err(|_| invalid())?;
    let day: u8 = value[6..8].parse().map_err(|_| invalid())?;
    calendar_date(year, month, day).ok_or_else(invalid)
}

pub(crate) fn calendar_date(year: i32, month: u8, day: u8) -> Option<Date> {
    let month = Month::try_from(month).ok()?;
    Date::from_calendar_date(year, month, day).ok()
}

fn month_from(number: u8) -> Result<Month, WarehouseError> {
    Month::try_from(number).map_err(|error| WarehouseError::InvalidPeriod(error.to_string()))
}

fn first_of(year: i32, month: Month) -> Result<Date, WarehouseError> {
    Date::from_calendar_date(year, month, 1)
        .map_err(|error| WarehouseError::InvalidPeriod(error.to_string()))
}

fn last_of(year: i32, month: Month) -> Result<Date, WarehouseError> {
    let (next_year, next_month) = match month {
        Month::December => (year + 1, Month::January),
        other => (year, other.next()),
    };
    first_of(next_year, next_month)?
        .previous_day()
        .ok_or_else(|| WarehouseError::InvalidPeriod(format!("no day before {next_year}-{next_month}")))
}

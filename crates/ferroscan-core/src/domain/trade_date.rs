use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::{Date, Duration, Month, Weekday};

use crate::ValidationError;

/// Calendar date of a trading session, serialized as `YYYY-MM-DD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TradeDate(Date);

impl TradeDate {
    pub fn from_ymd(year: i32, month: u8, day: u8) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidDate {
            value: format!("{year:04}-{month:02}-{day:02}"),
        };
        let month = Month::try_from(month).map_err(|_| invalid())?;
        Date::from_calendar_date(year, month, day)
            .map(Self)
            .map_err(|_| invalid())
    }

    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidDate {
            value: input.to_owned(),
        };
        let trimmed = input.trim();
        let mut parts = trimmed.split('-');
        let (Some(year), Some(month), Some(day), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };
        if year.len() != 4 || month.len() != 2 || day.len() != 2 {
            return Err(invalid());
        }

        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let month = month.parse::<u8>().map_err(|_| invalid())?;
        let day = day.parse::<u8>().map_err(|_| invalid())?;
        Self::from_ymd(year, month, day).map_err(|_| invalid())
    }

    pub const fn from_date(date: Date) -> Self {
        Self(date)
    }

    pub const fn into_inner(self) -> Date {
        self.0
    }

    pub fn year(self) -> i32 {
        self.0.year()
    }

    pub fn month(self) -> u8 {
        u8::from(self.0.month())
    }

    pub fn day(self) -> u8 {
        self.0.day()
    }

    pub fn weekday(self) -> Weekday {
        self.0.weekday()
    }

    pub fn is_weekend(self) -> bool {
        matches!(self.weekday(), Weekday::Saturday | Weekday::Sunday)
    }

    /// Shifts by calendar days, saturating at the supported date range.
    pub fn add_days(self, days: i64) -> Self {
        self.0
            .checked_add(Duration::days(days))
            .map(Self)
            .unwrap_or(self)
    }

    pub fn next_day(self) -> Self {
        self.add_days(1)
    }

    pub fn previous_day(self) -> Self {
        self.add_days(-1)
    }

    pub fn format_iso(self) -> String {
        format!(
            "{:04}-{:02}-{:02}",
            self.year(),
            self.month(),
            self.day()
        )
    }
}

impl Display for TradeDate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format_iso())
    }
}

impl FromStr for TradeDate {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl Serialize for TradeDate {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.format_iso())
    }
}

impl<'de> Deserialize<'de> for TradeDate {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value).map_err(D::Error::custom)
    }
}

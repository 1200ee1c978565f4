//! US equity trading calendar and session clock.
//!
//! Enumerating sessions before fetching keeps the bulk fetch plan at exactly
//! one request per trading day: weekends, NYSE full-day holidays and unplanned
//! closures never reach the provider.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use time::{Date, Duration, Month, Weekday};

use crate::{TradeDate, UtcDateTime};

/// Full-day closures outside the regular holiday rules.
const SPECIAL_CLOSURES: [(i32, u8, u8); 10] = [
    (2001, 9, 11),
    (2001, 9, 12),
    (2001, 9, 13),
    (2001, 9, 14),
    (2004, 6, 11),
    (2007, 1, 2),
    (2012, 10, 29),
    (2012, 10, 30),
    (2018, 12, 5),
    (2025, 1, 9),
];

const PRE_MARKET_OPEN_MINUTE: u32 = 4 * 60;
const REGULAR_OPEN_MINUTE: u32 = 9 * 60 + 30;
const REGULAR_CLOSE_MINUTE: u32 = 16 * 60;
const AFTER_HOURS_CLOSE_MINUTE: u32 = 20 * 60;

/// Trading phase of an instant, in US Eastern local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Session {
    PreMarket,
    Regular,
    AfterHours,
    Closed,
}

/// Session calendar for US listed equities.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TradingCalendar {
    extra_closures: BTreeSet<TradeDate>,
}

impl TradingCalendar {
    pub fn us_equities() -> Self {
        Self::default()
    }

    /// Adds caller-known closures (e.g. a newly announced day of mourning).
    pub fn with_closures(mut self, dates: impl IntoIterator<Item = TradeDate>) -> Self {
        self.extra_closures.extend(dates);
        self
    }

    pub fn is_holiday(&self, date: TradeDate) -> bool {
        if self.extra_closures.contains(&date) {
            return true;
        }
        let inner = date.into_inner();
        SPECIAL_CLOSURES
            .iter()
            .any(|&(y, m, d)| inner.year() == y && u8::from(inner.month()) == m && inner.day() == d)
            || nyse_holidays(inner.year()).contains(&inner)
    }

    pub fn is_trading_day(&self, date: TradeDate) -> bool {
        !date.is_weekend() && !self.is_holiday(date)
    }

    /// Trading days in `[from, to]`, ascending. Empty when `from > to`.
    pub fn trading_days(&self, from: TradeDate, to: TradeDate) -> Vec<TradeDate> {
        let mut days = Vec::new();
        let mut cursor = from;
        while cursor <= to {
            if self.is_trading_day(cursor) {
                days.push(cursor);
            }
            let next = cursor.next_day();
            if next == cursor {
                break;
            }
            cursor = next;
        }
        days
    }

    /// First trading day strictly after `date`.
    pub fn next_trading_day(&self, date: TradeDate) -> TradeDate {
        let mut cursor = date.next_day();
        while !self.is_trading_day(cursor) {
            cursor = cursor.next_day();
        }
        cursor
    }

    /// Last trading day strictly before `date`.
    pub fn previous_trading_day(&self, date: TradeDate) -> TradeDate {
        let mut cursor = date.previous_day();
        while !self.is_trading_day(cursor) {
            cursor = cursor.previous_day();
        }
        cursor
    }

    /// Moves `sessions` trading days away from `date`; zero returns `date`.
    pub fn shift(&self, date: TradeDate, sessions: i32) -> TradeDate {
        let mut cursor = date;
        for _ in 0..sessions.unsigned_abs() {
            cursor = if sessions > 0 {
                self.next_trading_day(cursor)
            } else {
                self.previous_trading_day(cursor)
            };
        }
        cursor
    }
}

/// UTC offset of US Eastern time at `ts`, in whole hours (-4 or -5).
pub fn eastern_offset_hours(ts: UtcDateTime) -> i64 {
    let utc = ts.into_inner();
    let year = utc.year();
    // DST runs from 02:00 EST on the second Sunday of March (07:00 UTC)
    // to 02:00 EDT on the first Sunday of November (06:00 UTC).
    let starts = nth_weekday(year, Month::March, Weekday::Sunday, 2)
        .map(|date| date.midnight().assume_utc() + Duration::hours(7));
    let ends = nth_weekday(year, Month::November, Weekday::Sunday, 1)
        .map(|date| date.midnight().assume_utc() + Duration::hours(6));

    match (starts, ends) {
        (Some(starts), Some(ends)) if utc >= starts && utc < ends => -4,
        _ => -5,
    }
}

/// Eastern local session date and trading phase of an instant.
pub fn session_of(ts: UtcDateTime) -> (TradeDate, Session) {
    let local = ts.into_inner() + Duration::hours(eastern_offset_hours(ts));
    let minute = u32::from(local.hour()) * 60 + u32::from(local.minute());
    let session = if (PRE_MARKET_OPEN_MINUTE..REGULAR_OPEN_MINUTE).contains(&minute) {
        Session::PreMarket
    } else if (REGULAR_OPEN_MINUTE..REGULAR_CLOSE_MINUTE).contains(&minute) {
        Session::Regular
    } else if (REGULAR_CLOSE_MINUTE..AFTER_HOURS_CLOSE_MINUTE).contains(&minute) {
        Session::AfterHours
    } else {
        Session::Closed
    };
    (TradeDate::from_date(local.date()), session)
}

fn nyse_holidays(year: i32) -> Vec<Date> {
    let mut holidays = Vec::with_capacity(10);

    // New Year's Day: a Saturday holiday is not moved back into December.
    if let Ok(new_year) = Date::from_calendar_date(year, Month::January, 1) {
        match new_year.weekday() {
            Weekday::Saturday => {}
            Weekday::Sunday => holidays.push(new_year + Duration::days(1)),
            _ => holidays.push(new_year),
        }
    }

    if year >= 1998 {
        holidays.extend(nth_weekday(year, Month::January, Weekday::Monday, 3));
    }
    holidays.extend(nth_weekday(year, Month::February, Weekday::Monday, 3));
    holidays.extend(easter_sunday(year).map(|easter| easter - Duration::days(2)));
    holidays.extend(last_weekday(year, Month::May, Weekday::Monday));
    if year >= 2022 {
        holidays.extend(observed(year, Month::June, 19));
    }
    holidays.extend(observed(year, Month::July, 4));
    holidays.extend(nth_weekday(year, Month::September, Weekday::Monday, 1));
    holidays.extend(nth_weekday(year, Month::November, Weekday::Thursday, 4));
    holidays.extend(observed(year, Month::December, 25));

    holidays
}

fn observed(year: i32, month: Month, day: u8) -> Option<Date> {
    let date = Date::from_calendar_date(year, month, day).ok()?;
    Some(match date.weekday() {
        Weekday::Saturday => date - Duration::days(1),
        Weekday::Sunday => date + Duration::days(1),
        _ => date,
    })
}

fn nth_weekday(year: i32, month: Month, weekday: Weekday, nth: u8) -> Option<Date> {
    let first = Date::from_calendar_date(year, month, 1).ok()?;
    let offset = (7 + weekday.number_days_from_monday() - first.weekday().number_days_from_monday()) % 7;
    let day = 1 + offset + 7 * (nth - 1);
    Date::from_calendar_date(year, month, day).ok()
}

fn last_weekday(year: i32, month: Month, weekday: Weekday) -> Option<Date> {
    let mut cursor = Date::from_calendar_date(year, month.next(), 1)
        .ok()
        .map(|first_of_next| first_of_next - Duration::days(1))?;
    // December rolls into the next year; keep the calendar year fixed.
    if month == Month::December {
        cursor = Date::from_calendar_date(year, Month::December, 31).ok()?;
    }
    while cursor.weekday() != weekday {
        cursor = cursor - Duration::days(1);
    }
    Some(cursor)
}

/// Gregorian Easter Sunday (anonymous Gregorian algorithm).
fn easter_sunday(year: i32) -> Option<Date> {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;

    let month = Month::try_from(u8::try_from(month).ok()?).ok()?;
    Date::from_calendar_date(year, month, u8::try_from(day).ok()?).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(value: &str) -> TradeDate {
        TradeDate::parse(value).expect("valid date")
    }

    #[test]
    fn recognizes_2025_holidays() {
        let calendar = TradingCalendar::us_equities();
        for holiday in [
            "2025-01-01",
            "2025-01-09",
            "2025-01-20",
            "2025-02-17",
            "2025-04-18",
            "2025-05-26",
            "2025-06-19",
            "2025-07-04",
            "2025-09-01",
            "2025-11-27",
            "2025-12-25",
        ] {
            assert!(calendar.is_holiday(date(holiday)), "{holiday} should be closed");
        }
        assert!(calendar.is_trading_day(date("2025-02-18")));
        assert!(calendar.is_trading_day(date("2025-07-16")));
    }

    #[test]
    fn observes_weekend_holidays() {
        let calendar = TradingCalendar::us_equities();
        // Independence Day 2026 is a Saturday.
        assert!(calendar.is_holiday(date("2026-07-03")));
        // Christmas 2022 is a Sunday.
        assert!(calendar.is_holiday(date("2022-12-26")));
        // New Year's Day 2022 is a Saturday and is not observed on Friday.
        assert!(calendar.is_trading_day(date("2021-12-31")));
    }

    #[test]
    fn counts_2025_sessions() {
        let calendar = TradingCalendar::us_equities();
        let days = calendar.trading_days(date("2025-01-01"), date("2025-12-31"));
        assert_eq!(days.len(), 249);
        assert!(days.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn shifts_across_weekends_and_holidays() {
        let calendar = TradingCalendar::us_equities();
        // Tuesday after Presidents' Day.
        let signal = date("2025-02-18");
        assert_eq!(calendar.shift(signal, -1), date("2025-02-14"));
        assert_eq!(calendar.shift(signal, -4), date("2025-02-11"));
        assert_eq!(calendar.shift(signal, 1), date("2025-02-19"));
        assert_eq!(calendar.shift(signal, 0), signal);
    }

    #[test]
    fn extra_closures_are_honoured() {
        let calendar = TradingCalendar::us_equities().with_closures([date("2025-03-03")]);
        assert!(!calendar.is_trading_day(date("2025-03-03")));
    }

    #[test]
    fn classifies_sessions_across_dst() {
        // 2025-02-18 is EST (UTC-5): 13:00 UTC is 08:00 local.
        let winter = UtcDateTime::parse("2025-02-18T13:00:00Z").expect("valid");
        assert_eq!(session_of(winter), (date("2025-02-18"), Session::PreMarket));

        // 2025-07-16 is EDT (UTC-4): 13:30 UTC is 09:30 local.
        let summer = UtcDateTime::parse("2025-07-16T13:30:00Z").expect("valid");
        assert_eq!(session_of(summer), (date("2025-07-16"), Session::Regular));

        // 02:00 UTC belongs to the previous Eastern evening.
        let late = UtcDateTime::parse("2025-07-17T02:00:00Z").expect("valid");
        assert_eq!(session_of(late), (date("2025-07-16"), Session::Closed));
    }
}

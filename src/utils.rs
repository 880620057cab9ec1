// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Context, Result};
use chrono::{Duration, Local, Months, NaiveDate, NaiveDateTime, NaiveTime};
use comfy_table::{Cell, Table, presets::UTF8_FULL};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use rust_decimal::Decimal;

use crate::error::{LedgerError, LedgerResult};

pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", s))
}

/// Accepts `YYYY-MM-DD HH:MM[:SS]` or a bare date (midnight).
pub fn parse_datetime(s: &str) -> Result<NaiveDateTime> {
    let s = s.trim();
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt);
        }
    }
    Ok(parse_date(s)?.and_time(NaiveTime::MIN))
}

/// `YYYY-MM` into (year, month).
pub fn parse_month(s: &str) -> Result<(i32, u32)> {
    let first = NaiveDate::parse_from_str(&format!("{}-01", s.trim()), "%Y-%m-%d")
        .with_context(|| format!("Invalid month '{}', expected YYYY-MM", s))?;
    Ok((chrono::Datelike::year(&first), chrono::Datelike::month(&first)))
}

pub fn parse_decimal(s: &str) -> Result<Decimal> {
    s.trim()
        .parse::<Decimal>()
        .with_context(|| format!("Invalid decimal '{}'", s))
}

pub fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Half-open `[first day, first day of next month)` window.
pub fn month_window(year: i32, month: u32) -> LedgerResult<(NaiveDateTime, NaiveDateTime)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| LedgerError::invalid("month", format!("{}-{:02} is not a month", year, month)))?;
    let end = start
        .checked_add_months(Months::new(1))
        .ok_or_else(|| LedgerError::invalid("month", "out of range"))?;
    Ok((start.and_time(NaiveTime::MIN), end.and_time(NaiveTime::MIN)))
}

pub fn fmt_money(d: &Decimal) -> String {
    format!("{:.2}", d)
}

pub fn pretty_table(headers: &[&str], rows: Vec<Vec<String>>) -> Table {
    let mut t = Table::new();
    t.load_preset(UTF8_FULL);
    t.set_header(headers.iter().map(|h| Cell::new(*h)));
    for r in rows {
        t.add_row(r.into_iter().map(Cell::new));
    }
    t
}

pub fn maybe_print_json<T: serde::Serialize>(
    json_flag: bool,
    jsonl_flag: bool,
    v: &T,
) -> Result<bool> {
    if json_flag {
        println!("{}", serde_json::to_string_pretty(v)?);
        return Ok(true);
    }
    if jsonl_flag {
        // If v is an array, stream each element; else stream single line
        let val = serde_json::to_value(v)?;
        if let Some(arr) = val.as_array() {
            for item in arr {
                println!("{}", serde_json::to_string(item)?);
            }
        } else {
            println!("{}", serde_json::to_string(&val)?);
        }
        return Ok(true);
    }
    Ok(false)
}

/// Money columns are TEXT; parse them back into exact decimals.
pub fn decimal_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let s: String = row.get(idx)?;
    s.parse::<Decimal>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub fn opt_decimal_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    let s: Option<String> = row.get(idx)?;
    s.map(|s| {
        s.parse::<Decimal>()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

// Runtime settings

pub const LARGE_EXPENSE_THRESHOLD: &str = "large_expense_threshold";
pub const DEBT_REMINDER_DAYS: &str = "debt_reminder_days";
pub const SETTLEMENT_CANCEL_DAYS: &str = "settlement_cancel_days";

/// Upper bound for every day-count setting and look-ahead window.
pub const MAX_WINDOW_DAYS: i64 = 3650;

pub const SETTINGS: &[(&str, &str)] = &[
    (LARGE_EXPENSE_THRESHOLD, "50000"),
    (DEBT_REMINDER_DAYS, "3"),
    (SETTLEMENT_CANCEL_DAYS, "7"),
];

pub fn get_setting(conn: &Connection, key: &str) -> LedgerResult<Option<String>> {
    let v: Option<String> = conn
        .query_row("SELECT value FROM settings WHERE key=?1", params![key], |r| {
            r.get(0)
        })
        .optional()?;
    Ok(v)
}

pub fn set_setting(conn: &Connection, key: &str, value: &str) -> LedgerResult<()> {
    let Some((_, default)) = SETTINGS.iter().find(|(k, _)| *k == key) else {
        return Err(LedgerError::invalid("key", format!("unknown setting '{}'", key)));
    };
    // every setting is numeric; reject what the typed readers would choke on
    let readable = if key.ends_with("_days") {
        value
            .trim()
            .parse::<i64>()
            .is_ok_and(|d| (0..=MAX_WINDOW_DAYS).contains(&d))
    } else {
        value.trim().parse::<Decimal>().is_ok()
    };
    if !readable {
        return Err(LedgerError::invalid(
            "value",
            format!("'{}' is not a valid value (default {})", value, default),
        ));
    }
    conn.execute(
        "INSERT INTO settings(key, value) VALUES(?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        params![key, value.trim()],
    )?;
    Ok(())
}

fn setting_or_default(conn: &Connection, key: &str) -> LedgerResult<String> {
    if let Some(v) = get_setting(conn, key)? {
        return Ok(v);
    }
    Ok(SETTINGS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, d)| d.to_string())
        .unwrap_or_default())
}

pub fn large_expense_threshold(conn: &Connection) -> LedgerResult<Decimal> {
    let v = setting_or_default(conn, LARGE_EXPENSE_THRESHOLD)?;
    v.parse::<Decimal>()
        .map_err(|_| LedgerError::Corrupt(format!("setting {}='{}'", LARGE_EXPENSE_THRESHOLD, v)))
}

fn days_setting(conn: &Connection, key: &str) -> LedgerResult<i64> {
    let v = setting_or_default(conn, key)?;
    v.trim()
        .parse::<i64>()
        .ok()
        .filter(|d| (0..=MAX_WINDOW_DAYS).contains(d))
        .ok_or_else(|| LedgerError::Corrupt(format!("setting {}='{}'", key, v)))
}

/// `date` moved forward by `days`, or `None` past the calendar's range.
pub fn days_after(date: NaiveDate, days: i64) -> Option<NaiveDate> {
    Duration::try_days(days).and_then(|d| date.checked_add_signed(d))
}

pub fn debt_reminder_days(conn: &Connection) -> LedgerResult<i64> {
    days_setting(conn, DEBT_REMINDER_DAYS)
}

pub fn settlement_cancel_days(conn: &Connection) -> LedgerResult<i64> {
    days_setting(conn, SETTLEMENT_CANCEL_DAYS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_window_spans_calendar_month() {
        let (from, to) = month_window(2024, 12).unwrap();
        assert_eq!(from.to_string(), "2024-12-01 00:00:00");
        assert_eq!(to.to_string(), "2025-01-01 00:00:00");
        assert!(month_window(2024, 13).is_err());
    }

    #[test]
    fn datetime_accepts_bare_dates() {
        let dt = parse_datetime("2025-03-04").unwrap();
        assert_eq!(dt.to_string(), "2025-03-04 00:00:00");
        let dt = parse_datetime(" 2025-03-04 18:30 ").unwrap();
        assert_eq!(dt.to_string(), "2025-03-04 18:30:00");
    }

    #[test]
    fn settings_fall_back_to_defaults() {
        let conn = crate::db::open_in_memory().unwrap();
        assert_eq!(large_expense_threshold(&conn).unwrap(), Decimal::new(50000, 0));
        set_setting(&conn, DEBT_REMINDER_DAYS, "5").unwrap();
        assert_eq!(debt_reminder_days(&conn).unwrap(), 5);
        assert!(set_setting(&conn, "base_currency", "EUR").is_err());
        assert!(set_setting(&conn, SETTLEMENT_CANCEL_DAYS, "soon").is_err());
    }

    #[test]
    fn day_settings_are_bounded() {
        let conn = crate::db::open_in_memory().unwrap();
        set_setting(&conn, SETTLEMENT_CANCEL_DAYS, "3650").unwrap();
        assert_eq!(settlement_cancel_days(&conn).unwrap(), 3650);
        for bad in ["3651", "-1", "9223372036854775807"] {
            let err = set_setting(&conn, DEBT_REMINDER_DAYS, bad).unwrap_err();
            assert_eq!(err.fields()[0].field, "value");
        }
        assert_eq!(debt_reminder_days(&conn).unwrap(), 3);

        // a value written behind our back reads as corrupt, not as a huge window
        conn.execute(
            "INSERT INTO settings(key, value) VALUES(?1, '9223372036854775807')",
            params![DEBT_REMINDER_DAYS],
        )
        .unwrap();
        assert!(matches!(debt_reminder_days(&conn), Err(LedgerError::Corrupt(_))));
    }

    #[test]
    fn days_after_stops_at_the_calendar_edge() {
        let d = NaiveDate::from_ymd_opt(2025, 1, 31).unwrap();
        assert_eq!(days_after(d, 1), NaiveDate::from_ymd_opt(2025, 2, 1));
        assert_eq!(days_after(d, i64::MAX), None);
        assert_eq!(days_after(NaiveDate::MAX, 1), None);
    }
}

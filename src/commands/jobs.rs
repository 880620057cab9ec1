// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Daily background work, as one function any trigger can call.

use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::Connection;
use serde::Serialize;

use crate::commands::{debts, recurring};
use crate::error::LedgerResult;
use crate::notify::Notifier;
use crate::utils::{fmt_money, maybe_print_json, now, parse_date, today};

#[derive(Debug, Clone, Serialize)]
pub struct DailyReport {
    pub as_of: NaiveDate,
    pub recurring: recurring::ExecutionReport,
    pub debt_reminders: usize,
}

/// Recurring batch first, then debt reminders. A reminder failure does not
/// undo executed schedules.
pub fn run_daily(
    conn: &mut Connection,
    notifier: &dyn Notifier,
    as_of: NaiveDate,
    now: NaiveDateTime,
) -> LedgerResult<DailyReport> {
    let recurring = recurring::run_due_schedules(conn, notifier, as_of, now)?;
    let debt_reminders = match debts::due_soon_reminders(conn, notifier, as_of) {
        Ok(n) => n,
        Err(e) => {
            tracing::warn!(error = %e, "debt reminders skipped");
            0
        }
    };
    Ok(DailyReport {
        as_of,
        recurring,
        debt_reminders,
    })
}

pub fn handle(conn: &mut Connection, notifier: &dyn Notifier, m: &clap::ArgMatches) -> Result<()> {
    if let Some(("run", sub)) = m.subcommand() {
        // a backdated run stamps expenses at midnight of that day
        let (as_of, at) = match sub.get_one::<String>("date") {
            Some(d) => {
                let day = parse_date(d)?;
                (day, day.and_time(NaiveTime::MIN))
            }
            None => (today(), now()),
        };
        let report = run_daily(conn, notifier, as_of, at)?;
        if !maybe_print_json(sub.get_flag("json"), false, &report)? {
            println!(
                "{}: {} recurring executed ({}), {} ended, {} failed; {} debt reminders",
                report.as_of,
                report.recurring.executed,
                fmt_money(&report.recurring.total_amount),
                report.recurring.expired,
                report.recurring.failed,
                report.debt_reminders
            );
        }
    }
    Ok(())
}

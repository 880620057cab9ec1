// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Recurring expense schedules.
//!
//! A schedule is active (next date set), paused (toggled off) or exhausted
//! (inactive with no next date, reached once the next run would fall past
//! its end date; terminal). Each execution records one expense and moves the
//! schedule forward from the execution day, so a backlog of missed periods
//! collapses into a single run.
//!
//! Executions hold an immediate transaction and advance the schedule with a
//! compare-and-swap on `total_executed`, so overlapping batch runs cannot
//! both record the same period.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::cli::{acting_user, required_i64, required_str};
use crate::commands::{categories, expenses, users};
use crate::error::{Checks, LedgerError, LedgerResult};
use crate::models::{Frequency, RecurringSchedule, round_money};
use crate::notify::{Notifier, links, notify_quietly};
use crate::utils::{
    MAX_WINDOW_DAYS, days_after, decimal_at, fmt_money, maybe_print_json, now, parse_date,
    parse_decimal, pretty_table, today,
};

pub const GENERATED_SUFFIX: &str = " (recurring)";

#[derive(Debug, Clone)]
pub struct ScheduleInput {
    pub description: String,
    pub amount: Decimal,
    pub category_id: i64,
    pub frequency: Frequency,
    /// Day of month for month-based frequencies; defaults to the start day.
    pub execution_day: Option<u32>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub shared: bool,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ScheduleUpdate {
    pub description: Option<String>,
    pub amount: Option<Decimal>,
    pub category_id: Option<i64>,
    pub frequency: Option<Frequency>,
    pub execution_day: Option<u32>,
    /// `Some(None)` removes the end date.
    pub end_date: Option<Option<NaiveDate>>,
    pub shared: Option<bool>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Outcome {
    /// Recorded the given expense.
    Executed { expense_id: i64 },
    /// End date already passed; the schedule was retired instead.
    Expired,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct OwnerTally {
    pub count: usize,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionReport {
    pub as_of: Option<NaiveDate>,
    pub executed: usize,
    pub expired: usize,
    pub failed: usize,
    pub total_amount: Decimal,
    pub per_owner: BTreeMap<i64, OwnerTally>,
}

const SCHEDULE_COLUMNS: &str = "id, owner_id, household_id, description, amount, category_id, \
     frequency, execution_day, start_date, end_date, last_executed, next_execution, active, \
     shared, notes, total_executed, created_at";

fn schedule_from_row(r: &Row<'_>) -> rusqlite::Result<RecurringSchedule> {
    Ok(RecurringSchedule {
        id: r.get(0)?,
        owner_id: r.get(1)?,
        household_id: r.get(2)?,
        description: r.get(3)?,
        amount: decimal_at(r, 4)?,
        category_id: r.get(5)?,
        frequency: r.get(6)?,
        execution_day: r.get(7)?,
        start_date: r.get(8)?,
        end_date: r.get(9)?,
        last_executed: r.get(10)?,
        next_execution: r.get(11)?,
        active: r.get(12)?,
        shared: r.get(13)?,
        notes: r.get(14)?,
        total_executed: r.get(15)?,
        created_at: r.get(16)?,
    })
}

fn find_schedule(conn: &Connection, id: i64) -> LedgerResult<RecurringSchedule> {
    conn.query_row(
        &format!("SELECT {} FROM recurring_expenses WHERE id=?1", SCHEDULE_COLUMNS),
        params![id],
        schedule_from_row,
    )
    .optional()?
    .ok_or_else(|| LedgerError::NotFound(format!("recurring expense {}", id)))
}

pub fn get_schedule(conn: &Connection, id: i64, user_id: i64) -> LedgerResult<RecurringSchedule> {
    let s = find_schedule(conn, id)?;
    if s.owner_id != user_id {
        return Err(LedgerError::Forbidden(format!(
            "recurring expense {} belongs to another user",
            id
        )));
    }
    Ok(s)
}

fn check_fields(
    description: &str,
    amount: Decimal,
    execution_day: u32,
    start: NaiveDate,
    end: Option<NaiveDate>,
) -> LedgerResult<()> {
    let mut checks = Checks::new();
    checks
        .require(!description.trim().is_empty(), "description", "required")
        .require(amount > Decimal::ZERO, "amount", "must be positive")
        .money("amount", amount)
        .require((1..=31).contains(&execution_day), "execution_day", "must be 1-31")
        .require(end.is_none_or(|e| e >= start), "end_date", "before the start date");
    checks.finish()
}

pub fn create_schedule(
    conn: &Connection,
    owner_id: i64,
    input: ScheduleInput,
    now: NaiveDateTime,
) -> LedgerResult<RecurringSchedule> {
    let execution_day = input.execution_day.unwrap_or(input.start_date.day());
    check_fields(
        &input.description,
        input.amount,
        execution_day,
        input.start_date,
        input.end_date,
    )?;
    users::require_user(conn, owner_id)?;
    categories::require_category(conn, input.category_id)?;
    let household_id = if input.shared {
        users::household_of(conn, owner_id)?.map(|h| h.id)
    } else {
        None
    };

    let mut draft = RecurringSchedule {
        id: 0,
        owner_id,
        household_id,
        description: input.description.trim().to_string(),
        amount: input.amount,
        category_id: input.category_id,
        frequency: input.frequency,
        execution_day,
        start_date: input.start_date,
        end_date: input.end_date,
        last_executed: None,
        next_execution: None,
        active: true,
        shared: input.shared,
        notes: input.notes,
        total_executed: 0,
        created_at: now,
    };
    draft.next_execution = draft.next_execution_date(draft.start_date);
    draft.active = draft.next_execution.is_some();

    conn.execute(
        "INSERT INTO recurring_expenses(owner_id, household_id, description, amount, category_id,
             frequency, execution_day, start_date, end_date, next_execution, active, shared,
             notes, total_executed, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, 0, ?14)",
        params![
            draft.owner_id,
            draft.household_id,
            draft.description,
            draft.amount.to_string(),
            draft.category_id,
            draft.frequency,
            draft.execution_day,
            draft.start_date,
            draft.end_date,
            draft.next_execution,
            draft.active,
            draft.shared,
            draft.notes,
            now
        ],
    )?;
    let id = conn.last_insert_rowid();
    tracing::info!(schedule_id = id, owner_id, next = ?draft.next_execution, "recurring expense created");
    find_schedule(conn, id)
}

/// Ordered by next execution; schedules without one come last.
pub fn list_schedules(
    conn: &Connection,
    owner_id: i64,
    only_active: bool,
) -> LedgerResult<Vec<RecurringSchedule>> {
    let filter = if only_active { " AND active=1" } else { "" };
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM recurring_expenses WHERE owner_id=?1{}
         ORDER BY next_execution IS NULL, next_execution, id",
        SCHEDULE_COLUMNS, filter
    ))?;
    let rows = stmt.query_map(params![owner_id], schedule_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Active schedules due within the next `days` days (today included).
pub fn upcoming(
    conn: &Connection,
    owner_id: i64,
    today: NaiveDate,
    days: i64,
) -> LedgerResult<Vec<RecurringSchedule>> {
    let horizon = days_after(today, days)
        .filter(|_| (0..=MAX_WINDOW_DAYS).contains(&days))
        .ok_or_else(|| {
            LedgerError::invalid("within", format!("must be 0-{} days", MAX_WINDOW_DAYS))
        })?;
    Ok(list_schedules(conn, owner_id, true)?
        .into_iter()
        .filter(|s| s.next_execution.is_some_and(|n| n >= today && n <= horizon))
        .collect())
}

pub fn count_active(conn: &Connection, owner_id: i64) -> LedgerResult<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM recurring_expenses WHERE owner_id=?1 AND active=1",
        params![owner_id],
        |r| r.get(0),
    )?)
}

pub fn days_until_next(s: &RecurringSchedule, today: NaiveDate) -> Option<i64> {
    s.next_execution.map(|n| (n - today).num_days())
}

/// Applies the patch and re-plans the next run from `today`.
pub fn update_schedule(
    conn: &Connection,
    id: i64,
    user_id: i64,
    patch: ScheduleUpdate,
    today: NaiveDate,
) -> LedgerResult<RecurringSchedule> {
    let mut s = get_schedule(conn, id, user_id)?;
    if let Some(cat) = patch.category_id {
        categories::require_category(conn, cat)?;
        s.category_id = cat;
    }
    if let Some(d) = patch.description {
        s.description = d.trim().to_string();
    }
    s.amount = patch.amount.unwrap_or(s.amount);
    s.frequency = patch.frequency.unwrap_or(s.frequency);
    s.execution_day = patch.execution_day.unwrap_or(s.execution_day);
    if let Some(end) = patch.end_date {
        s.end_date = end;
    }
    s.notes = patch.notes.or(s.notes);
    if let Some(shared) = patch.shared {
        s.shared = shared;
        s.household_id = if shared {
            users::household_of(conn, s.owner_id)?.map(|h| h.id)
        } else {
            None
        };
    }
    check_fields(&s.description, s.amount, s.execution_day, s.start_date, s.end_date)?;

    let was_exhausted = s.is_exhausted();
    s.next_execution = s.next_execution_date(today);
    if s.next_execution.is_none() {
        s.active = false;
    } else if was_exhausted {
        // a later end date brings an exhausted schedule back
        s.active = true;
    }
    conn.execute(
        "UPDATE recurring_expenses SET description=?1, amount=?2, category_id=?3, frequency=?4,
                execution_day=?5, end_date=?6, notes=?7, shared=?8, household_id=?9,
                next_execution=?10, active=?11
         WHERE id=?12",
        params![
            s.description,
            s.amount.to_string(),
            s.category_id,
            s.frequency,
            s.execution_day,
            s.end_date,
            s.notes,
            s.shared,
            s.household_id,
            s.next_execution,
            s.active,
            id
        ],
    )?;
    find_schedule(conn, id)
}

/// Pauses or resumes. An exhausted schedule cannot be resumed.
pub fn toggle_active(conn: &Connection, id: i64, user_id: i64) -> LedgerResult<RecurringSchedule> {
    let s = get_schedule(conn, id, user_id)?;
    if s.is_exhausted() {
        return Err(LedgerError::BusinessRule(format!(
            "recurring expense {} has passed its end date",
            id
        )));
    }
    conn.execute(
        "UPDATE recurring_expenses SET active=?1 WHERE id=?2",
        params![!s.active, id],
    )?;
    find_schedule(conn, id)
}

pub fn delete_schedule(conn: &Connection, id: i64, user_id: i64) -> LedgerResult<()> {
    get_schedule(conn, id, user_id)?;
    conn.execute("DELETE FROM recurring_expenses WHERE id=?1", params![id])?;
    tracing::info!(schedule_id = id, "recurring expense deleted");
    Ok(())
}

/// One execution inside the caller's transaction.
fn execute_in(
    tx: &Connection,
    s: &RecurringSchedule,
    today: NaiveDate,
    now: NaiveDateTime,
) -> LedgerResult<Outcome> {
    if s.end_date.is_some_and(|end| today > end) {
        let changed = tx.execute(
            "UPDATE recurring_expenses SET active=0, next_execution=NULL
             WHERE id=?1 AND total_executed=?2",
            params![s.id, s.total_executed],
        )?;
        if changed == 0 {
            return Err(LedgerError::Conflict(format!(
                "recurring expense {} changed while running",
                s.id
            )));
        }
        tracing::info!(schedule_id = s.id, "recurring expense exhausted");
        return Ok(Outcome::Expired);
    }

    let household_id = if s.shared {
        users::household_of(tx, s.owner_id)?.map(|h| h.id)
    } else {
        None
    };
    let expense_id = expenses::insert_expense_row(
        tx,
        s.owner_id,
        household_id,
        &format!("{}{}", s.description, GENERATED_SUFFIX),
        s.amount,
        s.category_id,
        now,
        s.notes.as_deref(),
        None,
        now,
    )?;

    let next = s.next_execution_date(today);
    let changed = tx.execute(
        "UPDATE recurring_expenses
         SET last_executed=?1, next_execution=?2, total_executed=total_executed+1, active=?3
         WHERE id=?4 AND total_executed=?5",
        params![today, next, next.is_some(), s.id, s.total_executed],
    )?;
    if changed == 0 {
        return Err(LedgerError::Conflict(format!(
            "recurring expense {} was executed concurrently",
            s.id
        )));
    }
    if next.is_none() {
        tracing::info!(schedule_id = s.id, "recurring expense exhausted");
    }
    Ok(Outcome::Executed { expense_id })
}

/// Runs a schedule now, whether or not it is due.
pub fn execute_schedule(
    conn: &mut Connection,
    id: i64,
    user_id: i64,
    today: NaiveDate,
    now: NaiveDateTime,
) -> LedgerResult<Outcome> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let s = get_schedule(&tx, id, user_id)?;
    if !s.active {
        return Err(LedgerError::BusinessRule(format!(
            "recurring expense {} is not active",
            id
        )));
    }
    let outcome = execute_in(&tx, &s, today, now)?;
    tx.commit()?;
    Ok(outcome)
}

/// Executes every schedule due on `as_of`. Schedules are independent: a
/// failure is logged and counted, and the batch carries on. Owners get one
/// summary notification each.
pub fn run_due_schedules(
    conn: &mut Connection,
    notifier: &dyn Notifier,
    as_of: NaiveDate,
    now: NaiveDateTime,
) -> LedgerResult<ExecutionReport> {
    let due_ids: Vec<i64> = {
        let mut stmt = conn.prepare(
            "SELECT id FROM recurring_expenses
             WHERE active=1 AND next_execution IS NOT NULL AND next_execution <= ?1
             ORDER BY next_execution, id",
        )?;
        stmt.query_map(params![as_of], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?
    };

    let mut report = ExecutionReport {
        as_of: Some(as_of),
        ..Default::default()
    };
    for id in due_ids {
        match run_one(conn, id, as_of, now) {
            Ok(Some((s, Outcome::Executed { .. }))) => {
                report.executed += 1;
                report.total_amount += s.amount;
                let tally = report.per_owner.entry(s.owner_id).or_default();
                tally.count += 1;
                tally.amount += s.amount;
            }
            Ok(Some((_, Outcome::Expired))) => report.expired += 1,
            Ok(None) => {}
            Err(e) => {
                report.failed += 1;
                tracing::warn!(schedule_id = id, error = %e, "recurring execution failed");
            }
        }
    }

    for (owner, tally) in &report.per_owner {
        let body = format!(
            "{} recurring expense(s) recorded for {}",
            tally.count,
            fmt_money(&round_money(tally.amount))
        );
        notify_quietly(notifier, *owner, "Recurring expenses recorded", &body, links::RECURRING);
    }
    report.total_amount = round_money(report.total_amount);
    tracing::info!(
        executed = report.executed,
        expired = report.expired,
        failed = report.failed,
        "recurring batch finished"
    );
    Ok(report)
}

/// `None` when another run got there first.
fn run_one(
    conn: &mut Connection,
    id: i64,
    as_of: NaiveDate,
    now: NaiveDateTime,
) -> LedgerResult<Option<(RecurringSchedule, Outcome)>> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let s = find_schedule(&tx, id)?;
    if !s.is_due(as_of) {
        return Ok(None);
    }
    let outcome = execute_in(&tx, &s, as_of, now)?;
    tx.commit()?;
    Ok(Some((s, outcome)))
}

fn print_schedules(items: &[RecurringSchedule], today: NaiveDate) {
    let data = items
        .iter()
        .map(|s| {
            vec![
                s.id.to_string(),
                s.description.clone(),
                fmt_money(&s.amount),
                s.frequency.describe().to_string(),
                s.next_execution.map(|d| d.to_string()).unwrap_or_default(),
                days_until_next(s, today)
                    .map(|d| d.to_string())
                    .unwrap_or_default(),
                s.total_executed.to_string(),
                if s.is_exhausted() {
                    "ended"
                } else if s.active {
                    "active"
                } else {
                    "paused"
                }
                .to_string(),
            ]
        })
        .collect();
    println!(
        "{}",
        pretty_table(
            &["Id", "Description", "Amount", "Frequency", "Next", "In days", "Runs", "State"],
            data
        )
    );
}

pub fn handle(conn: &mut Connection, notifier: &dyn Notifier, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => {
            let input = ScheduleInput {
                description: required_str(sub, "description")?,
                amount: parse_decimal(&required_str(sub, "amount")?)?,
                category_id: required_i64(sub, "category")?,
                frequency: required_str(sub, "frequency")?.parse::<Frequency>()?,
                execution_day: sub.get_one::<u32>("day").copied(),
                start_date: sub
                    .get_one::<String>("start")
                    .map(|d| parse_date(d))
                    .transpose()?
                    .unwrap_or_else(today),
                end_date: sub
                    .get_one::<String>("end")
                    .map(|d| parse_date(d))
                    .transpose()?,
                shared: sub.get_flag("shared"),
                notes: sub.get_one::<String>("notes").cloned(),
            };
            let s = create_schedule(conn, acting_user(sub)?, input, now())?;
            println!(
                "Recurring expense {} created, next run {}",
                s.id,
                s.next_execution.map(|d| d.to_string()).unwrap_or("-".into())
            );
        }
        Some(("edit", sub)) => {
            let patch = ScheduleUpdate {
                description: sub.get_one::<String>("description").cloned(),
                amount: sub
                    .get_one::<String>("amount")
                    .map(|a| parse_decimal(a))
                    .transpose()?,
                category_id: sub.get_one::<i64>("category").copied(),
                frequency: sub
                    .get_one::<String>("frequency")
                    .map(|f| f.parse::<Frequency>())
                    .transpose()?,
                execution_day: sub.get_one::<u32>("day").copied(),
                end_date: if sub.get_flag("no-end") {
                    Some(None)
                } else {
                    sub.get_one::<String>("end")
                        .map(|d| parse_date(d))
                        .transpose()?
                        .map(Some)
                },
                shared: sub.get_one::<bool>("shared").copied(),
                notes: sub.get_one::<String>("notes").cloned(),
            };
            let s = update_schedule(conn, required_i64(sub, "id")?, acting_user(sub)?, patch, today())?;
            println!("Updated recurring expense {}", s.id);
        }
        Some(("list", sub)) => {
            let user = acting_user(sub)?;
            let items = match sub.get_one::<i64>("within") {
                Some(days) => upcoming(conn, user, today(), *days)?,
                None => list_schedules(conn, user, sub.get_flag("active"))?,
            };
            if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &items)? {
                print_schedules(&items, today());
                println!("{} active", count_active(conn, user)?);
            }
        }
        Some(("show", sub)) => {
            let s = get_schedule(conn, required_i64(sub, "id")?, acting_user(sub)?)?;
            if !maybe_print_json(sub.get_flag("json"), false, &s)? {
                print_schedules(std::slice::from_ref(&s), today());
            }
        }
        Some(("toggle", sub)) => {
            let s = toggle_active(conn, required_i64(sub, "id")?, acting_user(sub)?)?;
            println!(
                "Recurring expense {} {}",
                s.id,
                if s.active { "resumed" } else { "paused" }
            );
        }
        Some(("rm", sub)) => {
            let id = required_i64(sub, "id")?;
            delete_schedule(conn, id, acting_user(sub)?)?;
            println!("Deleted recurring expense {}", id);
        }
        Some(("run", sub)) => match sub.get_one::<i64>("id") {
            Some(id) => match execute_schedule(conn, *id, acting_user(sub)?, today(), now())? {
                Outcome::Executed { expense_id } => println!("Recorded expense {}", expense_id),
                Outcome::Expired => println!("Recurring expense {} has ended", id),
            },
            None => {
                let report = run_due_schedules(conn, notifier, today(), now())?;
                if !maybe_print_json(sub.get_flag("json"), false, &report)? {
                    println!(
                        "{} executed, {} ended, {} failed, total {}",
                        report.executed,
                        report.expired,
                        report.failed,
                        fmt_money(&report.total_amount)
                    );
                }
            }
        },
        _ => {}
    }
    Ok(())
}

// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Expense & split ledger.
//!
//! An expense with no split is individual (no household, no splits). A split
//! turns it into a shared expense of the owner's household: one split row per
//! member, the owner's own row tagged `PAID` and every other row `OWES`, and
//! the split amounts summing to the expense amount exactly.
//!
//! Deleting only stamps `deleted_at`. Every read goes through [`live_sql`],
//! which appends [`LIVE_EXPENSE`]; new queries must do the same.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{Connection, Row, ToSql, params};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::cli::{acting_user, parse_split, required_i64, required_str};
use crate::commands::{budgets, categories, users};
use crate::error::{Checks, LedgerError, LedgerResult};
use crate::models::{Expense, ExpenseSplit, Household, SplitKind, is_money, round_money};
use crate::notify::{Notifier, links, notify_quietly};
use crate::utils::{
    decimal_at, fmt_money, large_expense_threshold, maybe_print_json, month_window, now,
    parse_datetime, parse_decimal, pretty_table,
};

/// The "not deleted" predicate, over the `e` alias.
pub const LIVE_EXPENSE: &str = "e.deleted_at IS NULL";

const EXPENSE_COLUMNS: &str = "e.id, e.description, e.amount, e.original_amount, e.notes, \
     e.photo_ref, e.owner_id, e.household_id, e.category_id, e.expense_date, e.created_at, \
     e.updated_at, e.deleted_at";

/// Builds a query over live expenses only.
pub fn live_sql(columns: &str, joins: &str, filter: &str, tail: &str) -> String {
    format!(
        "SELECT {} FROM expenses e {} WHERE {} AND ({}) {}",
        columns, joins, LIVE_EXPENSE, filter, tail
    )
}

#[derive(Debug, Clone, Default)]
pub struct ExpenseInput {
    pub description: String,
    pub amount: Decimal,
    pub category_id: i64,
    /// Defaults to the creation time.
    pub expense_date: Option<NaiveDateTime>,
    pub notes: Option<String>,
    pub photo_ref: Option<String>,
    /// user id -> share. Empty means an individual expense.
    pub split: BTreeMap<i64, Decimal>,
}

/// Partial update. `split: Some(empty)` turns a shared expense back into an
/// individual one.
#[derive(Debug, Clone, Default)]
pub struct ExpenseUpdate {
    pub description: Option<String>,
    pub amount: Option<Decimal>,
    pub category_id: Option<i64>,
    pub expense_date: Option<NaiveDateTime>,
    pub notes: Option<String>,
    pub photo_ref: Option<String>,
    pub split: Option<BTreeMap<i64, Decimal>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExpenseSummary {
    pub total: Decimal,
    pub count: usize,
    pub average: Decimal,
    /// Category name -> total.
    pub by_category: BTreeMap<String, Decimal>,
}

pub fn handle(conn: &mut Connection, notifier: &dyn Notifier, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => {
            let user = acting_user(sub)?;
            let input = ExpenseInput {
                description: required_str(sub, "description")?,
                amount: parse_decimal(&required_str(sub, "amount")?)?,
                category_id: required_i64(sub, "category")?,
                expense_date: sub
                    .get_one::<String>("date")
                    .map(|d| parse_datetime(d))
                    .transpose()?,
                notes: sub.get_one::<String>("notes").cloned(),
                photo_ref: sub.get_one::<String>("photo").cloned(),
                split: sub
                    .get_one::<String>("split")
                    .map(|s| parse_split(s))
                    .transpose()?
                    .unwrap_or_default(),
            };
            let e = create_expense(conn, notifier, user, input, now())?;
            println!("Recorded expense {} ({})", e.id, fmt_money(&e.amount));
        }
        Some(("edit", sub)) => {
            let user = acting_user(sub)?;
            let patch = ExpenseUpdate {
                description: sub.get_one::<String>("description").cloned(),
                amount: sub
                    .get_one::<String>("amount")
                    .map(|a| parse_decimal(a))
                    .transpose()?,
                category_id: sub.get_one::<i64>("category").copied(),
                expense_date: sub
                    .get_one::<String>("date")
                    .map(|d| parse_datetime(d))
                    .transpose()?,
                notes: sub.get_one::<String>("notes").cloned(),
                photo_ref: sub.get_one::<String>("photo").cloned(),
                split: sub
                    .get_one::<String>("split")
                    .map(|s| parse_split(s))
                    .transpose()?,
            };
            let e = update_expense(conn, required_i64(sub, "id")?, user, patch, now())?;
            println!("Updated expense {}", e.id);
        }
        Some(("rm", sub)) => {
            let id = required_i64(sub, "id")?;
            delete_expense(conn, id, acting_user(sub)?, now())?;
            println!("Deleted expense {}", id);
        }
        Some(("show", sub)) => {
            let e = get_expense(conn, required_i64(sub, "id")?, acting_user(sub)?)?;
            if !maybe_print_json(sub.get_flag("json"), false, &e)? {
                print_expenses(conn, std::slice::from_ref(&e))?;
                let data = e
                    .splits
                    .iter()
                    .map(|s| vec![s.user_id.to_string(), s.kind.to_string(), fmt_money(&s.amount)])
                    .collect();
                println!("{}", pretty_table(&["User", "Kind", "Amount"], data));
            }
        }
        Some(("list", sub)) => {
            let user = acting_user(sub)?;
            let limit = sub.get_one::<usize>("limit").copied();
            let items = match (sub.get_one::<String>("month"), limit) {
                (Some(month), _) => {
                    let (y, mo) = crate::utils::parse_month(month)?;
                    let hh = users::household_of(conn, user)?.ok_or_else(|| {
                        LedgerError::NotFound(format!("household for user {}", user))
                    })?;
                    list_for_household_month(conn, hh.id, y, mo)?
                }
                (None, Some(n)) => recent_for_user(conn, user, n)?,
                (None, None) => list_for_user(conn, user)?,
            };
            if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &items)? {
                print_expenses(conn, &items)?;
            }
        }
        Some(("summary", sub)) => {
            let summary = summary_for_user(conn, acting_user(sub)?)?;
            if !maybe_print_json(sub.get_flag("json"), false, &summary)? {
                let mut data: Vec<Vec<String>> = summary
                    .by_category
                    .iter()
                    .map(|(c, t)| vec![c.clone(), fmt_money(t)])
                    .collect();
                data.push(vec!["TOTAL".into(), fmt_money(&summary.total)]);
                println!("{}", pretty_table(&["Category", "Total"], data));
                println!(
                    "{} expenses, average {}",
                    summary.count,
                    fmt_money(&summary.average)
                );
            }
        }
        _ => {}
    }
    Ok(())
}

fn print_expenses(conn: &Connection, items: &[Expense]) -> LedgerResult<()> {
    let names = category_names(conn)?;
    let data = items
        .iter()
        .map(|e| {
            vec![
                e.id.to_string(),
                e.expense_date.format("%Y-%m-%d").to_string(),
                e.description.clone(),
                names.get(&e.category_id).cloned().unwrap_or_default(),
                fmt_money(&e.amount),
                e.owner_id.to_string(),
                if e.is_shared() { "shared" } else { "" }.to_string(),
            ]
        })
        .collect();
    println!(
        "{}",
        pretty_table(
            &["Id", "Date", "Description", "Category", "Amount", "Owner", ""],
            data
        )
    );
    Ok(())
}

fn category_names(conn: &Connection) -> LedgerResult<BTreeMap<i64, String>> {
    let mut stmt = conn.prepare_cached("SELECT id, name FROM categories")?;
    let rows = stmt.query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?)))?;
    Ok(rows.collect::<rusqlite::Result<BTreeMap<_, _>>>()?)
}

fn expense_from_row(r: &Row<'_>) -> rusqlite::Result<Expense> {
    Ok(Expense {
        id: r.get(0)?,
        description: r.get(1)?,
        amount: decimal_at(r, 2)?,
        original_amount: decimal_at(r, 3)?,
        notes: r.get(4)?,
        photo_ref: r.get(5)?,
        owner_id: r.get(6)?,
        household_id: r.get(7)?,
        category_id: r.get(8)?,
        expense_date: r.get(9)?,
        created_at: r.get(10)?,
        updated_at: r.get(11)?,
        deleted_at: r.get(12)?,
        splits: Vec::new(),
    })
}

fn load_splits(conn: &Connection, expense_id: i64) -> LedgerResult<Vec<ExpenseSplit>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, expense_id, user_id, amount, kind FROM expense_splits
         WHERE expense_id=?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![expense_id], |r| {
        Ok(ExpenseSplit {
            id: r.get(0)?,
            expense_id: r.get(1)?,
            user_id: r.get(2)?,
            amount: decimal_at(r, 3)?,
            kind: r.get(4)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn query_live(
    conn: &Connection,
    filter: &str,
    tail: &str,
    args: &[&dyn ToSql],
) -> LedgerResult<Vec<Expense>> {
    let sql = live_sql(EXPENSE_COLUMNS, "", filter, tail);
    let mut stmt = conn.prepare(&sql)?;
    let mut items = stmt
        .query_map(args, expense_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    for e in &mut items {
        e.splits = load_splits(conn, e.id)?;
    }
    Ok(items)
}

/// Exact sum of live expense amounts matching `filter`.
pub fn sum_live(conn: &Connection, filter: &str, args: &[&dyn ToSql]) -> LedgerResult<Decimal> {
    let sql = live_sql("e.amount", "", filter, "");
    let mut stmt = conn.prepare(&sql)?;
    let amounts = stmt
        .query_map(args, |r| decimal_at(r, 0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(amounts.into_iter().sum())
}

/// Splits of the household's live expenses, optionally limited to an
/// `expense_date` window `[from, to)`.
pub fn household_splits(
    conn: &Connection,
    household_id: i64,
    window: Option<(NaiveDateTime, NaiveDateTime)>,
) -> LedgerResult<Vec<ExpenseSplit>> {
    let columns = "s.id, s.expense_id, s.user_id, s.amount, s.kind";
    let joins = "JOIN expense_splits s ON s.expense_id = e.id";
    let map = |r: &Row<'_>| {
        Ok(ExpenseSplit {
            id: r.get(0)?,
            expense_id: r.get(1)?,
            user_id: r.get(2)?,
            amount: decimal_at(r, 3)?,
            kind: r.get(4)?,
        })
    };
    let rows = match window {
        Some((from, to)) => {
            let sql = live_sql(
                columns,
                joins,
                "e.household_id=?1 AND e.expense_date >= ?2 AND e.expense_date < ?3",
                "ORDER BY s.id",
            );
            let mut stmt = conn.prepare(&sql)?;
            stmt.query_map(params![household_id, from, to], map)?
                .collect::<rusqlite::Result<Vec<_>>>()?
        }
        None => {
            let sql = live_sql(columns, joins, "e.household_id=?1", "ORDER BY s.id");
            let mut stmt = conn.prepare(&sql)?;
            stmt.query_map(params![household_id], map)?
                .collect::<rusqlite::Result<Vec<_>>>()?
        }
    };
    Ok(rows)
}

/// Live expense by id, no visibility check.
pub fn find_expense(conn: &Connection, id: i64) -> LedgerResult<Expense> {
    query_live(conn, "e.id=?1", "", &[&id])?
        .pop()
        .ok_or_else(|| LedgerError::NotFound(format!("expense {}", id)))
}

/// Expense visible to `viewer`: their own, or one of their household's.
pub fn get_expense(conn: &Connection, id: i64, viewer: i64) -> LedgerResult<Expense> {
    let e = find_expense(conn, id)?;
    if e.owner_id == viewer {
        return Ok(e);
    }
    let shared_with_viewer = match e.household_id {
        Some(hh) => users::get_household(conn, hh)?.is_member(viewer),
        None => false,
    };
    if !shared_with_viewer {
        return Err(LedgerError::Forbidden(format!(
            "expense {} is not visible to user {}",
            id, viewer
        )));
    }
    Ok(e)
}

/// Individual and household expenses for a user, newest first.
pub fn list_for_user(conn: &Connection, user_id: i64) -> LedgerResult<Vec<Expense>> {
    match users::household_of(conn, user_id)? {
        Some(hh) => query_live(
            conn,
            "e.owner_id=?1 OR e.household_id=?2",
            "ORDER BY e.expense_date DESC, e.id DESC",
            &[&user_id, &hh.id],
        ),
        None => query_live(
            conn,
            "e.owner_id=?1",
            "ORDER BY e.expense_date DESC, e.id DESC",
            &[&user_id],
        ),
    }
}

pub fn recent_for_user(conn: &Connection, user_id: i64, n: usize) -> LedgerResult<Vec<Expense>> {
    let mut items = list_for_user(conn, user_id)?;
    items.truncate(n);
    Ok(items)
}

pub fn list_for_household(conn: &Connection, household_id: i64) -> LedgerResult<Vec<Expense>> {
    query_live(
        conn,
        "e.household_id=?1",
        "ORDER BY e.expense_date DESC, e.id DESC",
        &[&household_id],
    )
}

pub fn list_for_household_month(
    conn: &Connection,
    household_id: i64,
    year: i32,
    month: u32,
) -> LedgerResult<Vec<Expense>> {
    let (from, to) = month_window(year, month)?;
    query_live(
        conn,
        "e.household_id=?1 AND e.expense_date >= ?2 AND e.expense_date < ?3",
        "ORDER BY e.expense_date DESC, e.id DESC",
        &[&household_id, &from, &to],
    )
}

pub fn summary_for_user(conn: &Connection, user_id: i64) -> LedgerResult<ExpenseSummary> {
    let items = list_for_user(conn, user_id)?;
    let names = category_names(conn)?;
    let mut by_category: BTreeMap<String, Decimal> = BTreeMap::new();
    let mut total = Decimal::ZERO;
    for e in &items {
        total += e.amount;
        let name = names
            .get(&e.category_id)
            .cloned()
            .unwrap_or_else(|| e.category_id.to_string());
        *by_category.entry(name).or_default() += e.amount;
    }
    let count = items.len();
    let average = if count == 0 {
        Decimal::ZERO
    } else {
        round_money(total / Decimal::from(count))
    };
    Ok(ExpenseSummary {
        total: round_money(total),
        count,
        average,
        by_category: by_category
            .into_iter()
            .map(|(k, v)| (k, round_money(v)))
            .collect(),
    })
}

/// Checks a split against the owner's household and the expense amount.
fn validate_split(
    conn: &Connection,
    owner_id: i64,
    amount: Decimal,
    split: &BTreeMap<i64, Decimal>,
) -> LedgerResult<Household> {
    let hh = users::household_of(conn, owner_id)?.ok_or_else(|| {
        LedgerError::invalid("split", "a shared expense needs the owner to be in a household")
    })?;
    let mut checks = Checks::new();
    for (user_id, share) in split {
        users::require_user(conn, *user_id)?;
        if !hh.is_member(*user_id) {
            checks.push("split", format!("user {} is not in the owner's household", user_id));
        }
        if share.is_sign_negative() {
            checks.push("split", format!("share for user {} is negative", user_id));
        }
        if !is_money(*share) {
            checks.push(
                "split",
                format!("share for user {} has more than 2 decimal places", user_id),
            );
        }
    }
    let sum: Decimal = split.values().copied().sum();
    if sum != amount {
        checks.push(
            "split",
            format!("shares add up to {} but the amount is {}", sum, amount),
        );
    }
    checks.finish()?;
    Ok(hh)
}

fn insert_splits(
    conn: &Connection,
    expense_id: i64,
    owner_id: i64,
    split: &BTreeMap<i64, Decimal>,
) -> LedgerResult<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO expense_splits(expense_id, user_id, amount, kind) VALUES (?1, ?2, ?3, ?4)",
    )?;
    for (user_id, share) in split {
        let kind = if *user_id == owner_id {
            SplitKind::Paid
        } else {
            SplitKind::Owes
        };
        stmt.execute(params![expense_id, user_id, share.to_string(), kind])?;
    }
    Ok(())
}

/// Inserts the expense row only; callers own the transaction.
#[allow(clippy::too_many_arguments)]
pub(crate) fn insert_expense_row(
    conn: &Connection,
    owner_id: i64,
    household_id: Option<i64>,
    description: &str,
    amount: Decimal,
    category_id: i64,
    expense_date: NaiveDateTime,
    notes: Option<&str>,
    photo_ref: Option<&str>,
    now: NaiveDateTime,
) -> LedgerResult<i64> {
    conn.execute(
        "INSERT INTO expenses(description, amount, original_amount, notes, photo_ref, owner_id,
                              household_id, category_id, expense_date, created_at, updated_at)
         VALUES (?1, ?2, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
        params![
            description,
            amount.to_string(),
            notes,
            photo_ref,
            owner_id,
            household_id,
            category_id,
            expense_date,
            now
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn check_basics(description: &str, amount: Decimal) -> LedgerResult<()> {
    let mut checks = Checks::new();
    checks
        .require(!description.trim().is_empty(), "description", "required")
        .require(amount > Decimal::ZERO, "amount", "must be positive")
        .money("amount", amount);
    checks.finish()
}

pub fn create_expense(
    conn: &mut Connection,
    notifier: &dyn Notifier,
    owner_id: i64,
    input: ExpenseInput,
    now: NaiveDateTime,
) -> LedgerResult<Expense> {
    check_basics(&input.description, input.amount)?;
    users::require_user(conn, owner_id)?;
    categories::require_category(conn, input.category_id)?;
    let household = if input.split.is_empty() {
        None
    } else {
        Some(validate_split(conn, owner_id, input.amount, &input.split)?)
    };

    let tx = conn.transaction()?;
    let id = insert_expense_row(
        &tx,
        owner_id,
        household.as_ref().map(|h| h.id),
        input.description.trim(),
        input.amount,
        input.category_id,
        input.expense_date.unwrap_or(now),
        input.notes.as_deref(),
        input.photo_ref.as_deref(),
        now,
    )?;
    insert_splits(&tx, id, owner_id, &input.split)?;
    tx.commit()?;
    tracing::info!(expense_id = id, owner_id, shared = household.is_some(), "expense recorded");

    let expense = find_expense(conn, id)?;
    after_write(conn, notifier, &expense, household.as_ref(), now.date());
    Ok(expense)
}

/// Post-commit side effects. Nothing here can fail the write.
fn after_write(
    conn: &Connection,
    notifier: &dyn Notifier,
    expense: &Expense,
    household: Option<&Household>,
    today: NaiveDate,
) {
    if let Err(e) =
        budgets::check_after_expense(conn, notifier, expense.owner_id, expense.category_id, today)
    {
        tracing::warn!(error = %e, expense_id = expense.id, "budget check skipped");
    }
    let Some(hh) = household else { return };
    let threshold = match large_expense_threshold(conn) {
        Ok(t) => t,
        Err(e) => {
            tracing::warn!(error = %e, "large-expense threshold unreadable");
            return;
        }
    };
    if expense.amount > threshold {
        if let Some(partner) = hh.partner_of(expense.owner_id) {
            notify_quietly(
                notifier,
                partner,
                "Large shared expense",
                &format!(
                    "{} was recorded for {}",
                    expense.description,
                    fmt_money(&expense.amount)
                ),
                links::EXPENSES,
            );
        }
    }
}

fn owned_expense(conn: &Connection, id: i64, user_id: i64) -> LedgerResult<Expense> {
    let e = find_expense(conn, id)?;
    if e.owner_id != user_id {
        return Err(LedgerError::Forbidden(format!(
            "only the creator can change expense {}",
            id
        )));
    }
    Ok(e)
}

pub fn update_expense(
    conn: &mut Connection,
    id: i64,
    user_id: i64,
    patch: ExpenseUpdate,
    now: NaiveDateTime,
) -> LedgerResult<Expense> {
    let current = owned_expense(conn, id, user_id)?;
    let description = patch.description.unwrap_or(current.description.clone());
    let amount = patch.amount.unwrap_or(current.amount);
    check_basics(&description, amount)?;
    let category_id = patch.category_id.unwrap_or(current.category_id);
    if patch.category_id.is_some() {
        categories::require_category(conn, category_id)?;
    }

    let household_id = match &patch.split {
        Some(split) if split.is_empty() => None,
        Some(split) => Some(validate_split(conn, user_id, amount, split)?.id),
        None => {
            if current.is_shared() && amount != current.amount {
                return Err(LedgerError::invalid(
                    "split",
                    "changing the amount of a shared expense needs a new split",
                ));
            }
            current.household_id
        }
    };

    let tx = conn.transaction()?;
    tx.execute(
        "UPDATE expenses SET description=?1, amount=?2, category_id=?3, expense_date=?4,
                notes=?5, photo_ref=?6, household_id=?7, updated_at=?8
         WHERE id=?9 AND deleted_at IS NULL",
        params![
            description.trim(),
            amount.to_string(),
            category_id,
            patch.expense_date.unwrap_or(current.expense_date),
            patch.notes.or(current.notes),
            patch.photo_ref.or(current.photo_ref),
            household_id,
            now,
            id
        ],
    )?;
    if let Some(split) = &patch.split {
        tx.execute("DELETE FROM expense_splits WHERE expense_id=?1", params![id])?;
        insert_splits(&tx, id, user_id, split)?;
    }
    tx.commit()?;
    tracing::info!(expense_id = id, "expense updated");
    find_expense(conn, id)
}

/// Tombstones the expense; its splits stay for the record but stop counting.
pub fn delete_expense(
    conn: &Connection,
    id: i64,
    user_id: i64,
    now: NaiveDateTime,
) -> LedgerResult<()> {
    owned_expense(conn, id, user_id)?;
    conn.execute(
        "UPDATE expenses SET deleted_at=?1, updated_at=?1 WHERE id=?2 AND deleted_at IS NULL",
        params![now, id],
    )?;
    tracing::info!(expense_id = id, "expense deleted");
    Ok(())
}

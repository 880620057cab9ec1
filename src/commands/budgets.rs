// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use chrono::{Datelike, Duration, Months, NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use serde::Serialize;

use crate::cli::{acting_user, required_i64, required_str};
use crate::commands::balance::percent_of;
use crate::commands::{categories, expenses, users};
use crate::error::{Checks, LedgerError, LedgerResult};
use crate::models::{Budget, BudgetPeriod, BudgetState, round_money};
use crate::notify::{Notifier, links, notify_quietly};
use crate::utils::{decimal_at, fmt_money, maybe_print_json, parse_decimal, pretty_table, today};

/// Alerts fire while the percentage sits inside one of these bands.
const ALERT_BAND: (u32, u32) = (80, 85);
const EXCEEDED_BAND: (u32, u32) = (100, 105);

#[derive(Debug, Clone)]
pub struct BudgetInput {
    /// `None` for a global budget.
    pub category_id: Option<i64>,
    pub limit: Decimal,
    pub period: BudgetPeriod,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BudgetStatus {
    #[serde(flatten)]
    pub budget: Budget,
    pub spent: Decimal,
    pub available: Decimal,
    pub percent: Decimal,
    pub state: BudgetState,
}

pub fn handle(conn: &mut Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("set", sub)) => {
            let input = BudgetInput {
                category_id: sub.get_one::<i64>("category").copied(),
                limit: parse_decimal(&required_str(sub, "amount")?)?,
                period: sub
                    .get_one::<String>("period")
                    .map(|p| p.parse::<BudgetPeriod>())
                    .transpose()?
                    .unwrap_or(BudgetPeriod::Monthly),
                notes: sub.get_one::<String>("notes").cloned(),
            };
            let b = create_budget(conn, acting_user(sub)?, input)?;
            println!("Budget {} set: {} {}", b.id, fmt_money(&b.limit), b.period);
        }
        Some(("edit", sub)) => {
            let limit = sub
                .get_one::<String>("amount")
                .map(|a| parse_decimal(a))
                .transpose()?;
            let notes = sub.get_one::<String>("notes").cloned();
            let b = update_budget(conn, required_i64(sub, "id")?, acting_user(sub)?, limit, notes)?;
            println!("Budget {} now {}", b.id, fmt_money(&b.limit));
        }
        Some(("toggle", sub)) => {
            let b = toggle_budget(conn, required_i64(sub, "id")?, acting_user(sub)?)?;
            println!(
                "Budget {} {}",
                b.id,
                if b.active { "enabled" } else { "disabled" }
            );
        }
        Some(("rm", sub)) => {
            let id = required_i64(sub, "id")?;
            delete_budget(conn, id, acting_user(sub)?)?;
            println!("Deleted budget {}", id);
        }
        Some(("list", sub)) => {
            let items = list_budgets(conn, acting_user(sub)?, today())?;
            if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &items)? {
                let names = categories::list_categories(conn)?;
                let data = items
                    .iter()
                    .map(|s| {
                        let cat = match s.budget.category_id {
                            Some(id) => names
                                .iter()
                                .find(|c| c.id == id)
                                .map(|c| c.name.clone())
                                .unwrap_or_default(),
                            None => "(all)".to_string(),
                        };
                        vec![
                            s.budget.id.to_string(),
                            cat,
                            s.budget.period.to_string(),
                            fmt_money(&s.budget.limit),
                            fmt_money(&s.spent),
                            fmt_money(&s.available),
                            format!("{}%", s.percent),
                            if s.budget.active {
                                s.state.to_string()
                            } else {
                                "off".to_string()
                            },
                        ]
                    })
                    .collect();
                println!(
                    "{}",
                    pretty_table(
                        &["Id", "Category", "Period", "Limit", "Spent", "Available", "Used", "State"],
                        data
                    )
                );
            }
        }
        _ => {}
    }
    Ok(())
}

fn budget_from_row(r: &Row<'_>) -> rusqlite::Result<Budget> {
    Ok(Budget {
        id: r.get(0)?,
        owner_id: r.get(1)?,
        category_id: r.get(2)?,
        limit: decimal_at(r, 3)?,
        period: r.get(4)?,
        active: r.get(5)?,
        notes: r.get(6)?,
    })
}

const BUDGET_COLUMNS: &str = "id, owner_id, category_id, amount, period, active, notes";

fn find_budget(conn: &Connection, id: i64) -> LedgerResult<Budget> {
    conn.query_row(
        &format!("SELECT {} FROM budgets WHERE id=?1", BUDGET_COLUMNS),
        params![id],
        budget_from_row,
    )
    .optional()?
    .ok_or_else(|| LedgerError::NotFound(format!("budget {}", id)))
}

fn owned_budget(conn: &Connection, id: i64, user_id: i64) -> LedgerResult<Budget> {
    let b = find_budget(conn, id)?;
    if b.owner_id != user_id {
        return Err(LedgerError::Forbidden(format!(
            "budget {} belongs to another user",
            id
        )));
    }
    Ok(b)
}

fn check_limit(limit: Decimal) -> LedgerResult<()> {
    let mut checks = Checks::new();
    checks
        .require(limit > Decimal::ZERO, "limit", "must be positive")
        .money("limit", limit);
    checks.finish()
}

pub fn create_budget(conn: &mut Connection, owner_id: i64, input: BudgetInput) -> LedgerResult<Budget> {
    check_limit(input.limit)?;
    users::require_user(conn, owner_id)?;
    if let Some(cat) = input.category_id {
        categories::require_category(conn, cat)?;
    }
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let existing: Option<i64> = tx
        .query_row(
            "SELECT id FROM budgets WHERE owner_id=?1 AND category_id IS ?2 AND period=?3",
            params![owner_id, input.category_id, input.period],
            |r| r.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Err(LedgerError::BusinessRule(format!(
            "a {} budget for this category already exists (id {})",
            input.period, id
        )));
    }
    tx.execute(
        "INSERT INTO budgets(owner_id, category_id, amount, period, active, notes)
         VALUES (?1, ?2, ?3, ?4, 1, ?5)",
        params![
            owner_id,
            input.category_id,
            input.limit.to_string(),
            input.period,
            input.notes
        ],
    )?;
    let id = tx.last_insert_rowid();
    tx.commit()?;
    find_budget(conn, id)
}

pub fn update_budget(
    conn: &Connection,
    id: i64,
    user_id: i64,
    limit: Option<Decimal>,
    notes: Option<String>,
) -> LedgerResult<Budget> {
    let b = owned_budget(conn, id, user_id)?;
    let limit = limit.unwrap_or(b.limit);
    check_limit(limit)?;
    conn.execute(
        "UPDATE budgets SET amount=?1, notes=?2 WHERE id=?3",
        params![limit.to_string(), notes.or(b.notes), id],
    )?;
    find_budget(conn, id)
}

pub fn toggle_budget(conn: &Connection, id: i64, user_id: i64) -> LedgerResult<Budget> {
    let b = owned_budget(conn, id, user_id)?;
    conn.execute(
        "UPDATE budgets SET active=?1 WHERE id=?2",
        params![!b.active, id],
    )?;
    find_budget(conn, id)
}

pub fn delete_budget(conn: &Connection, id: i64, user_id: i64) -> LedgerResult<()> {
    owned_budget(conn, id, user_id)?;
    conn.execute("DELETE FROM budgets WHERE id=?1", params![id])?;
    Ok(())
}

/// Current `[start, end)` window of a period containing `today`.
pub fn period_window(period: BudgetPeriod, today: NaiveDate) -> (NaiveDate, NaiveDate) {
    match period {
        BudgetPeriod::Weekly => {
            let start = today - Duration::days(today.weekday().num_days_from_monday() as i64);
            (start, start + Duration::days(7))
        }
        BudgetPeriod::Monthly => {
            let start = today.with_day(1).unwrap_or(today);
            (start, start + Months::new(1))
        }
        BudgetPeriod::Annual => {
            let start = NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today);
            (start, start + Months::new(12))
        }
    }
}

/// What the owner alone spent inside the budget's current window.
pub fn spent(conn: &Connection, budget: &Budget, today: NaiveDate) -> LedgerResult<Decimal> {
    let (start, end) = period_window(budget.period, today);
    let (from, to) = (start.and_time(NaiveTime::MIN), end.and_time(NaiveTime::MIN));
    let base = "e.owner_id=?1 AND e.expense_date >= ?2 AND e.expense_date < ?3";
    match budget.category_id {
        Some(cat) => expenses::sum_live(
            conn,
            &format!("{} AND e.category_id=?4", base),
            &[&budget.owner_id, &from, &to, &cat],
        ),
        None => expenses::sum_live(conn, base, &[&budget.owner_id, &from, &to]),
    }
}

pub fn state_for(percent: Decimal) -> BudgetState {
    if percent >= Decimal::ONE_HUNDRED {
        BudgetState::Exceeded
    } else if percent >= Decimal::from(80) {
        BudgetState::Alert
    } else {
        BudgetState::Ok
    }
}

pub fn evaluate(conn: &Connection, budget: &Budget, today: NaiveDate) -> LedgerResult<BudgetStatus> {
    let spent = spent(conn, budget, today)?;
    let percent = percent_of(spent, budget.limit);
    Ok(BudgetStatus {
        budget: budget.clone(),
        spent: round_money(spent),
        available: round_money(budget.limit - spent),
        percent,
        state: state_for(percent),
    })
}

fn budgets_for(conn: &Connection, owner_id: i64, only_active: bool) -> LedgerResult<Vec<Budget>> {
    let filter = if only_active { " AND active=1" } else { "" };
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM budgets WHERE owner_id=?1{} ORDER BY period, category_id IS NOT NULL, category_id",
        BUDGET_COLUMNS, filter
    ))?;
    let rows = stmt.query_map(params![owner_id], budget_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn list_budgets(conn: &Connection, owner_id: i64, today: NaiveDate) -> LedgerResult<Vec<BudgetStatus>> {
    budgets_for(conn, owner_id, false)?
        .iter()
        .map(|b| evaluate(conn, b, today))
        .collect()
}

fn in_band(percent: Decimal, band: (u32, u32)) -> bool {
    percent >= Decimal::from(band.0) && percent < Decimal::from(band.1)
}

/// Re-evaluates the owner's active budgets touched by an expense in
/// `category_id` (global ones included) and notifies inside the alert bands.
/// Returns the number of notifications sent.
pub fn check_after_expense(
    conn: &Connection,
    notifier: &dyn Notifier,
    owner_id: i64,
    category_id: i64,
    today: NaiveDate,
) -> LedgerResult<usize> {
    let mut sent = 0;
    for b in budgets_for(conn, owner_id, true)? {
        if b.category_id.is_some_and(|c| c != category_id) {
            continue;
        }
        let status = evaluate(conn, &b, today)?;
        let title = if in_band(status.percent, EXCEEDED_BAND) {
            "Budget exceeded"
        } else if in_band(status.percent, ALERT_BAND) {
            "Budget alert"
        } else {
            continue;
        };
        tracing::debug!(budget_id = b.id, percent = %status.percent, "budget band reached");
        let body = format!(
            "{} of {} used ({}%) this {} period",
            fmt_money(&status.spent),
            fmt_money(&b.limit),
            status.percent,
            b.period.as_str().to_lowercase()
        );
        if notify_quietly(notifier, owner_id, title, &body, links::BUDGETS) {
            sent += 1;
        }
    }
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn weekly_window_starts_on_monday() {
        // 2025-03-13 is a Thursday
        let (s, e) = period_window(BudgetPeriod::Weekly, ymd(2025, 3, 13));
        assert_eq!((s, e), (ymd(2025, 3, 10), ymd(2025, 3, 17)));
        let (s, _) = period_window(BudgetPeriod::Weekly, ymd(2025, 3, 10));
        assert_eq!(s, ymd(2025, 3, 10));
    }

    #[test]
    fn monthly_and_annual_windows() {
        assert_eq!(
            period_window(BudgetPeriod::Monthly, ymd(2024, 12, 31)),
            (ymd(2024, 12, 1), ymd(2025, 1, 1))
        );
        assert_eq!(
            period_window(BudgetPeriod::Annual, ymd(2025, 6, 15)),
            (ymd(2025, 1, 1), ymd(2026, 1, 1))
        );
    }

    #[test]
    fn state_thresholds() {
        assert_eq!(state_for(Decimal::new(799, 1)), BudgetState::Ok);
        assert_eq!(state_for(Decimal::from(80)), BudgetState::Alert);
        assert_eq!(state_for(Decimal::new(9999, 2)), BudgetState::Alert);
        assert_eq!(state_for(Decimal::ONE_HUNDRED), BudgetState::Exceeded);
    }

    #[test]
    fn bands_are_half_open() {
        assert!(in_band(Decimal::from(80), ALERT_BAND));
        assert!(!in_band(Decimal::from(85), ALERT_BAND));
        assert!(in_band(Decimal::new(1049, 1), EXCEEDED_BAND));
        assert!(!in_band(Decimal::from(90), ALERT_BAND));
    }
}

// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Debts owed to third parties and the installments paid against them.
//!
//! The outstanding balance only moves through installment registration and
//! deletion. Both run under an immediate transaction and write with a
//! compare-and-swap on the balance they read, so concurrent writers cannot
//! push it outside `0..=original`.

use anyhow::Result;
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::cli::{acting_user, required_i64, required_str};
use crate::commands::users;
use crate::error::{Checks, LedgerError, LedgerResult};
use crate::models::{
    DebtInstallment, DebtStatus, DebtType, ExternalDebt, PaymentMethod, round_money,
};
use crate::notify::{Notifier, links, notify_quietly};
use crate::utils::{
    days_after, debt_reminder_days, decimal_at, fmt_money, maybe_print_json, month_window, now,
    opt_decimal_at, parse_date, parse_decimal, pretty_table, today,
};

pub const RECENT_INSTALLMENTS: usize = 5;

#[derive(Debug, Clone)]
pub struct DebtInput {
    pub creditor_name: String,
    pub description: Option<String>,
    pub debt_type: DebtType,
    pub original_amount: Decimal,
    /// Defaults to the creation date.
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub billing_day: Option<u32>,
    pub payment_due_day: Option<u32>,
    pub interest_rate: Option<Decimal>,
}

#[derive(Debug, Clone, Default)]
pub struct DebtUpdate {
    pub creditor_name: Option<String>,
    pub description: Option<String>,
    pub debt_type: Option<DebtType>,
    /// Rejected once any installment exists.
    pub original_amount: Option<Decimal>,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub billing_day: Option<u32>,
    pub payment_due_day: Option<u32>,
    pub interest_rate: Option<Decimal>,
}

#[derive(Debug, Clone, Default)]
pub struct InstallmentInput {
    pub amount: Decimal,
    /// Defaults to today.
    pub payment_date: Option<NaiveDate>,
    /// Defaults to transfer.
    pub method: Option<PaymentMethod>,
    pub receipt_ref: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DebtDetail {
    #[serde(flatten)]
    pub debt: ExternalDebt,
    pub progress: u32,
    pub recent_installments: Vec<DebtInstallment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DebtSummary {
    pub total_outstanding: Decimal,
    pub active_count: usize,
    pub paid_this_month: Decimal,
    pub recent_installments: Vec<DebtInstallment>,
}

const DEBT_COLUMNS: &str = "id, owner_id, creditor_name, description, type, original_amount, \
     outstanding_balance, status, start_date, due_date, billing_day, payment_due_day, \
     interest_rate, created_at, updated_at";

const INSTALLMENT_COLUMNS: &str =
    "i.id, i.debt_id, i.amount, i.payment_date, i.method, i.receipt_ref, i.notes, i.created_at";

fn debt_from_row(r: &Row<'_>) -> rusqlite::Result<ExternalDebt> {
    Ok(ExternalDebt {
        id: r.get(0)?,
        owner_id: r.get(1)?,
        creditor_name: r.get(2)?,
        description: r.get(3)?,
        debt_type: r.get(4)?,
        original_amount: decimal_at(r, 5)?,
        outstanding_balance: decimal_at(r, 6)?,
        status: r.get(7)?,
        start_date: r.get(8)?,
        due_date: r.get(9)?,
        billing_day: r.get(10)?,
        payment_due_day: r.get(11)?,
        interest_rate: opt_decimal_at(r, 12)?,
        created_at: r.get(13)?,
        updated_at: r.get(14)?,
    })
}

fn installment_from_row(r: &Row<'_>) -> rusqlite::Result<DebtInstallment> {
    Ok(DebtInstallment {
        id: r.get(0)?,
        debt_id: r.get(1)?,
        amount: decimal_at(r, 2)?,
        payment_date: r.get(3)?,
        method: r.get(4)?,
        receipt_ref: r.get(5)?,
        notes: r.get(6)?,
        created_at: r.get(7)?,
    })
}

fn check_days(checks: &mut Checks, billing: Option<u32>, due: Option<u32>, rate: Option<Decimal>) {
    if let Some(d) = billing {
        checks.require((1..=31).contains(&d), "billing_day", "must be 1-31");
    }
    if let Some(d) = due {
        checks.require((1..=31).contains(&d), "payment_due_day", "must be 1-31");
    }
    if let Some(r) = rate {
        checks.require(!r.is_sign_negative(), "interest_rate", "cannot be negative");
    }
}

pub fn create_debt(
    conn: &Connection,
    owner_id: i64,
    input: DebtInput,
    now: NaiveDateTime,
) -> LedgerResult<ExternalDebt> {
    let mut checks = Checks::new();
    checks
        .require(!input.creditor_name.trim().is_empty(), "creditor_name", "required")
        .require(input.original_amount > Decimal::ZERO, "original_amount", "must be positive")
        .money("original_amount", input.original_amount);
    check_days(&mut checks, input.billing_day, input.payment_due_day, input.interest_rate);
    checks.finish()?;
    users::require_user(conn, owner_id)?;

    conn.execute(
        "INSERT INTO external_debts(owner_id, creditor_name, description, type, original_amount,
             outstanding_balance, status, start_date, due_date, billing_day, payment_due_day,
             interest_rate, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
        params![
            owner_id,
            input.creditor_name.trim(),
            input.description,
            input.debt_type,
            input.original_amount.to_string(),
            DebtStatus::Active,
            input.start_date.unwrap_or(now.date()),
            input.due_date,
            input.billing_day,
            input.payment_due_day,
            input.interest_rate.map(|r| r.to_string()),
            now
        ],
    )?;
    let id = conn.last_insert_rowid();
    tracing::info!(debt_id = id, owner_id, "debt created");
    find_debt(conn, id)
}

fn find_debt(conn: &Connection, id: i64) -> LedgerResult<ExternalDebt> {
    conn.query_row(
        &format!("SELECT {} FROM external_debts WHERE id=?1", DEBT_COLUMNS),
        params![id],
        debt_from_row,
    )
    .optional()?
    .ok_or_else(|| LedgerError::NotFound(format!("debt {}", id)))
}

fn owned_debt(conn: &Connection, id: i64, user_id: i64) -> LedgerResult<ExternalDebt> {
    let debt = find_debt(conn, id)?;
    if debt.owner_id != user_id {
        return Err(LedgerError::Forbidden(format!(
            "debt {} belongs to another user",
            id
        )));
    }
    Ok(debt)
}

fn installments_where(
    conn: &Connection,
    filter: &str,
    arg: i64,
    limit: Option<usize>,
) -> LedgerResult<Vec<DebtInstallment>> {
    let mut sql = format!(
        "SELECT {} FROM debt_installments i JOIN external_debts d ON d.id = i.debt_id
         WHERE {} ORDER BY i.payment_date DESC, i.id DESC",
        INSTALLMENT_COLUMNS, filter
    );
    if let Some(n) = limit {
        sql.push_str(&format!(" LIMIT {}", n));
    }
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![arg], installment_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn get_debt(conn: &Connection, id: i64, user_id: i64) -> LedgerResult<DebtDetail> {
    let debt = owned_debt(conn, id, user_id)?;
    let recent = installments_where(conn, "i.debt_id=?1", id, Some(RECENT_INSTALLMENTS))?;
    Ok(DebtDetail {
        progress: debt.progress(),
        debt,
        recent_installments: recent,
    })
}

/// Newest first.
pub fn list_debts(
    conn: &Connection,
    owner_id: i64,
    only_active: bool,
) -> LedgerResult<Vec<ExternalDebt>> {
    let filter = if only_active {
        "owner_id=?1 AND status='ACTIVE'"
    } else {
        "owner_id=?1"
    };
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM external_debts WHERE {} ORDER BY created_at DESC, id DESC",
        DEBT_COLUMNS, filter
    ))?;
    let rows = stmt.query_map(params![owner_id], debt_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn list_installments(
    conn: &Connection,
    debt_id: i64,
    user_id: i64,
) -> LedgerResult<Vec<DebtInstallment>> {
    owned_debt(conn, debt_id, user_id)?;
    installments_where(conn, "i.debt_id=?1", debt_id, None)
}

pub fn update_debt(
    conn: &mut Connection,
    id: i64,
    user_id: i64,
    patch: DebtUpdate,
    now: NaiveDateTime,
) -> LedgerResult<ExternalDebt> {
    let mut checks = Checks::new();
    if let Some(name) = &patch.creditor_name {
        checks.require(!name.trim().is_empty(), "creditor_name", "required");
    }
    if let Some(amount) = patch.original_amount {
        checks
            .require(amount > Decimal::ZERO, "original_amount", "must be positive")
            .money("original_amount", amount);
    }
    check_days(&mut checks, patch.billing_day, patch.payment_due_day, patch.interest_rate);
    checks.finish()?;

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let debt = owned_debt(&tx, id, user_id)?;
    let (original, outstanding) = match patch.original_amount {
        Some(amount) if amount != debt.original_amount => {
            let paid_count: i64 = tx.query_row(
                "SELECT COUNT(*) FROM debt_installments WHERE debt_id=?1",
                params![id],
                |r| r.get(0),
            )?;
            if paid_count > 0 {
                return Err(LedgerError::BusinessRule(format!(
                    "debt {} already has installments; its original amount is fixed",
                    id
                )));
            }
            (amount, amount)
        }
        _ => (debt.original_amount, debt.outstanding_balance),
    };
    let changed = tx.execute(
        "UPDATE external_debts SET creditor_name=?1, description=?2, type=?3,
                original_amount=?4, outstanding_balance=?5, start_date=?6, due_date=?7,
                billing_day=?8, payment_due_day=?9, interest_rate=?10, updated_at=?11
         WHERE id=?12 AND outstanding_balance=?13",
        params![
            patch
                .creditor_name
                .as_deref()
                .map(str::trim)
                .unwrap_or(&debt.creditor_name),
            patch.description.or(debt.description),
            patch.debt_type.unwrap_or(debt.debt_type),
            original.to_string(),
            outstanding.to_string(),
            patch.start_date.unwrap_or(debt.start_date),
            patch.due_date.or(debt.due_date),
            patch.billing_day.or(debt.billing_day),
            patch.payment_due_day.or(debt.payment_due_day),
            patch.interest_rate.or(debt.interest_rate).map(|r| r.to_string()),
            now,
            id,
            debt.outstanding_balance.to_string()
        ],
    )?;
    if changed == 0 {
        return Err(LedgerError::Conflict(format!("debt {} changed while updating", id)));
    }
    tx.commit()?;
    find_debt(conn, id)
}

/// Deletes the debt together with its installments.
pub fn delete_debt(conn: &mut Connection, id: i64, user_id: i64) -> LedgerResult<()> {
    let tx = conn.transaction()?;
    owned_debt(&tx, id, user_id)?;
    let removed = tx.execute("DELETE FROM debt_installments WHERE debt_id=?1", params![id])?;
    tx.execute("DELETE FROM external_debts WHERE id=?1", params![id])?;
    tx.commit()?;
    tracing::info!(debt_id = id, installments = removed, "debt deleted");
    Ok(())
}

/// Moves the debt to `CANCELLED` whatever its balance. Cancelling twice is a
/// no-op.
pub fn cancel_debt(
    conn: &Connection,
    id: i64,
    user_id: i64,
    now: NaiveDateTime,
) -> LedgerResult<ExternalDebt> {
    let debt = owned_debt(conn, id, user_id)?;
    if debt.status == DebtStatus::Cancelled {
        return Ok(debt);
    }
    conn.execute(
        "UPDATE external_debts SET status=?1, updated_at=?2 WHERE id=?3",
        params![DebtStatus::Cancelled, now, id],
    )?;
    tracing::info!(debt_id = id, "debt cancelled");
    find_debt(conn, id)
}

pub fn register_installment(
    conn: &mut Connection,
    debt_id: i64,
    user_id: i64,
    input: InstallmentInput,
    now: NaiveDateTime,
) -> LedgerResult<(DebtInstallment, ExternalDebt)> {
    let mut checks = Checks::new();
    checks
        .require(input.amount > Decimal::ZERO, "amount", "must be positive")
        .money("amount", input.amount);
    checks.finish()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let debt = owned_debt(&tx, debt_id, user_id)?;
    if debt.status != DebtStatus::Active {
        return Err(LedgerError::BusinessRule(format!(
            "debt {} is {}, not ACTIVE",
            debt_id, debt.status
        )));
    }
    if input.amount > debt.outstanding_balance {
        return Err(LedgerError::BusinessRule(format!(
            "installment {} exceeds the outstanding balance {}",
            input.amount, debt.outstanding_balance
        )));
    }

    let (installment_id, status) = record_installment(&tx, &debt, input, now)?;
    tx.commit()?;
    if status == DebtStatus::Paid {
        tracing::info!(debt_id, "debt paid off");
    }

    let installment = conn.query_row(
        &format!("SELECT {} FROM debt_installments i WHERE i.id=?1", INSTALLMENT_COLUMNS),
        params![installment_id],
        installment_from_row,
    )?;
    Ok((installment, find_debt(conn, debt_id)?))
}

/// Inserts the installment and debits `debt`, which must be the balance the
/// caller read inside `tx`.
fn record_installment(
    tx: &Connection,
    debt: &ExternalDebt,
    input: InstallmentInput,
    now: NaiveDateTime,
) -> LedgerResult<(i64, DebtStatus)> {
    tx.execute(
        "INSERT INTO debt_installments(debt_id, amount, payment_date, method, receipt_ref, notes, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            debt.id,
            input.amount.to_string(),
            input.payment_date.unwrap_or(now.date()),
            input.method.unwrap_or(PaymentMethod::Transfer),
            input.receipt_ref,
            input.notes,
            now
        ],
    )?;
    let installment_id = tx.last_insert_rowid();

    let remaining = (debt.outstanding_balance - input.amount).max(Decimal::ZERO);
    let status = if remaining.is_zero() {
        DebtStatus::Paid
    } else {
        DebtStatus::Active
    };
    let changed = tx.execute(
        "UPDATE external_debts SET outstanding_balance=?1, status=?2, updated_at=?3
         WHERE id=?4 AND outstanding_balance=?5 AND status=?6",
        params![
            remaining.to_string(),
            status,
            now,
            debt.id,
            debt.outstanding_balance.to_string(),
            DebtStatus::Active
        ],
    )?;
    if changed == 0 {
        return Err(LedgerError::Conflict(format!(
            "debt {} balance changed while registering an installment",
            debt.id
        )));
    }
    Ok((installment_id, status))
}

/// Removes an installment and gives its amount back to the debt. A paid-off
/// debt becomes active again; a cancelled one stays cancelled.
pub fn delete_installment(
    conn: &mut Connection,
    installment_id: i64,
    user_id: i64,
    now: NaiveDateTime,
) -> LedgerResult<ExternalDebt> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let installment = tx
        .query_row(
            &format!("SELECT {} FROM debt_installments i WHERE i.id=?1", INSTALLMENT_COLUMNS),
            params![installment_id],
            installment_from_row,
        )
        .optional()?
        .ok_or_else(|| LedgerError::NotFound(format!("installment {}", installment_id)))?;
    let debt = owned_debt(&tx, installment.debt_id, user_id)?;
    restore_installment(&tx, &debt, &installment, now)?;
    tx.commit()?;
    tracing::info!(debt_id = debt.id, installment_id, "installment deleted");
    find_debt(conn, debt.id)
}

/// Deletes the installment and credits its amount back to `debt`, the
/// snapshot read inside `tx`.
fn restore_installment(
    tx: &Connection,
    debt: &ExternalDebt,
    installment: &DebtInstallment,
    now: NaiveDateTime,
) -> LedgerResult<()> {
    let restored = debt.outstanding_balance + installment.amount;
    if restored > debt.original_amount {
        return Err(LedgerError::Corrupt(format!(
            "debt {} would exceed its original amount",
            debt.id
        )));
    }
    let status = match debt.status {
        DebtStatus::Paid => DebtStatus::Active,
        other => other,
    };
    tx.execute(
        "DELETE FROM debt_installments WHERE id=?1",
        params![installment.id],
    )?;
    let changed = tx.execute(
        "UPDATE external_debts SET outstanding_balance=?1, status=?2, updated_at=?3
         WHERE id=?4 AND outstanding_balance=?5",
        params![
            restored.to_string(),
            status,
            now,
            debt.id,
            debt.outstanding_balance.to_string()
        ],
    )?;
    if changed == 0 {
        return Err(LedgerError::Conflict(format!(
            "debt {} balance changed while deleting an installment",
            debt.id
        )));
    }
    Ok(())
}

pub fn debt_summary(conn: &Connection, owner_id: i64, today: NaiveDate) -> LedgerResult<DebtSummary> {
    let active = list_debts(conn, owner_id, true)?;
    let (from, to) = month_window(today.year(), today.month())?;
    let mut stmt = conn.prepare_cached(
        "SELECT i.amount FROM debt_installments i JOIN external_debts d ON d.id = i.debt_id
         WHERE d.owner_id=?1 AND i.payment_date >= ?2 AND i.payment_date < ?3",
    )?;
    let paid: Decimal = stmt
        .query_map(params![owner_id, from.date(), to.date()], |r| decimal_at(r, 0))?
        .collect::<rusqlite::Result<Vec<_>>>()?
        .into_iter()
        .sum();
    Ok(DebtSummary {
        total_outstanding: round_money(active.iter().map(|d| d.outstanding_balance).sum()),
        active_count: active.len(),
        paid_this_month: round_money(paid),
        recent_installments: installments_where(
            conn,
            "d.owner_id=?1",
            owner_id,
            Some(RECENT_INSTALLMENTS),
        )?,
    })
}

/// Notifies owners of active debts falling due exactly `debt_reminder_days`
/// from `today`. Returns how many reminders went out.
pub fn due_soon_reminders(
    conn: &Connection,
    notifier: &dyn Notifier,
    today: NaiveDate,
) -> LedgerResult<usize> {
    let days = debt_reminder_days(conn)?;
    let target = days_after(today, days)
        .ok_or_else(|| LedgerError::Corrupt(format!("reminder horizon of {} days", days)))?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM external_debts WHERE status='ACTIVE' AND due_date=?1 ORDER BY id",
        DEBT_COLUMNS
    ))?;
    let due = stmt
        .query_map(params![target], debt_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    let mut sent = 0;
    for debt in &due {
        let body = format!(
            "{} is due on {} with {} outstanding",
            debt.creditor_name,
            target,
            fmt_money(&debt.outstanding_balance)
        );
        if notify_quietly(notifier, debt.owner_id, "Debt due soon", &body, links::DEBTS) {
            sent += 1;
        }
    }
    tracing::info!(due = due.len(), sent, %target, "debt reminders");
    Ok(sent)
}

fn print_debts(items: &[ExternalDebt]) {
    let data = items
        .iter()
        .map(|d| {
            vec![
                d.id.to_string(),
                d.creditor_name.clone(),
                d.debt_type.to_string(),
                fmt_money(&d.original_amount),
                fmt_money(&d.outstanding_balance),
                format!("{}%", d.progress()),
                d.status.to_string(),
                d.due_date.map(|x| x.to_string()).unwrap_or_default(),
            ]
        })
        .collect();
    println!(
        "{}",
        pretty_table(
            &["Id", "Creditor", "Type", "Original", "Outstanding", "Paid", "Status", "Due"],
            data
        )
    );
}

fn print_installments(items: &[DebtInstallment]) {
    let data = items
        .iter()
        .map(|i| {
            vec![
                i.id.to_string(),
                i.debt_id.to_string(),
                i.payment_date.to_string(),
                fmt_money(&i.amount),
                i.method.to_string(),
                i.notes.clone().unwrap_or_default(),
            ]
        })
        .collect();
    println!(
        "{}",
        pretty_table(&["Id", "Debt", "Date", "Amount", "Method", "Notes"], data)
    );
}

fn opt_date(sub: &clap::ArgMatches, name: &str) -> Result<Option<NaiveDate>> {
    sub.get_one::<String>(name).map(|d| parse_date(d)).transpose()
}

fn opt_decimal(sub: &clap::ArgMatches, name: &str) -> Result<Option<Decimal>> {
    sub.get_one::<String>(name).map(|d| parse_decimal(d)).transpose()
}

pub fn handle(conn: &mut Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => {
            let input = DebtInput {
                creditor_name: required_str(sub, "creditor")?,
                description: sub.get_one::<String>("description").cloned(),
                debt_type: sub
                    .get_one::<String>("type")
                    .map(|t| t.parse::<DebtType>())
                    .transpose()?
                    .unwrap_or(DebtType::Other),
                original_amount: parse_decimal(&required_str(sub, "amount")?)?,
                start_date: opt_date(sub, "start")?,
                due_date: opt_date(sub, "due")?,
                billing_day: sub.get_one::<u32>("billing-day").copied(),
                payment_due_day: sub.get_one::<u32>("payment-day").copied(),
                interest_rate: opt_decimal(sub, "rate")?,
            };
            let d = create_debt(conn, acting_user(sub)?, input, now())?;
            println!("Added debt {} to {}", d.id, d.creditor_name);
        }
        Some(("edit", sub)) => {
            let patch = DebtUpdate {
                creditor_name: sub.get_one::<String>("creditor").cloned(),
                description: sub.get_one::<String>("description").cloned(),
                debt_type: sub
                    .get_one::<String>("type")
                    .map(|t| t.parse::<DebtType>())
                    .transpose()?,
                original_amount: opt_decimal(sub, "amount")?,
                start_date: opt_date(sub, "start")?,
                due_date: opt_date(sub, "due")?,
                billing_day: sub.get_one::<u32>("billing-day").copied(),
                payment_due_day: sub.get_one::<u32>("payment-day").copied(),
                interest_rate: opt_decimal(sub, "rate")?,
            };
            let d = update_debt(conn, required_i64(sub, "id")?, acting_user(sub)?, patch, now())?;
            println!("Updated debt {}", d.id);
        }
        Some(("list", sub)) => {
            let items = list_debts(conn, acting_user(sub)?, sub.get_flag("active"))?;
            if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &items)? {
                print_debts(&items);
            }
        }
        Some(("show", sub)) => {
            let detail = get_debt(conn, required_i64(sub, "id")?, acting_user(sub)?)?;
            if !maybe_print_json(sub.get_flag("json"), false, &detail)? {
                print_debts(std::slice::from_ref(&detail.debt));
                print_installments(&detail.recent_installments);
            }
        }
        Some(("cancel", sub)) => {
            let d = cancel_debt(conn, required_i64(sub, "id")?, acting_user(sub)?, now())?;
            println!("Debt {} is {}", d.id, d.status);
        }
        Some(("rm", sub)) => {
            let id = required_i64(sub, "id")?;
            delete_debt(conn, id, acting_user(sub)?)?;
            println!("Deleted debt {}", id);
        }
        Some(("pay", sub)) => {
            let input = InstallmentInput {
                amount: parse_decimal(&required_str(sub, "amount")?)?,
                payment_date: opt_date(sub, "date")?,
                method: sub
                    .get_one::<String>("method")
                    .map(|t| t.parse::<PaymentMethod>())
                    .transpose()?,
                receipt_ref: sub.get_one::<String>("receipt").cloned(),
                notes: sub.get_one::<String>("notes").cloned(),
            };
            let (i, d) =
                register_installment(conn, required_i64(sub, "id")?, acting_user(sub)?, input, now())?;
            println!(
                "Installment {} recorded; outstanding {} ({})",
                i.id,
                fmt_money(&d.outstanding_balance),
                d.status
            );
        }
        Some(("unpay", sub)) => {
            let d = delete_installment(conn, required_i64(sub, "id")?, acting_user(sub)?, now())?;
            println!(
                "Installment removed; debt {} outstanding {} ({})",
                d.id,
                fmt_money(&d.outstanding_balance),
                d.status
            );
        }
        Some(("installments", sub)) => {
            let items = list_installments(conn, required_i64(sub, "id")?, acting_user(sub)?)?;
            if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &items)? {
                print_installments(&items);
            }
        }
        Some(("summary", sub)) => {
            let s = debt_summary(conn, acting_user(sub)?, today())?;
            if !maybe_print_json(sub.get_flag("json"), false, &s)? {
                println!(
                    "{} active debts, {} outstanding, {} paid this month",
                    s.active_count,
                    fmt_money(&s.total_outstanding),
                    fmt_money(&s.paid_this_month)
                );
                print_installments(&s.recent_installments);
            }
        }
        _ => {}
    }
    Ok(())
}

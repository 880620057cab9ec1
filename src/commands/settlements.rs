// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Direct payments between the two members of a household.

use anyhow::Result;
use chrono::{Duration, NaiveDateTime};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use rust_decimal::Decimal;

use crate::cli::{acting_user, required_i64, required_str};
use crate::commands::users;
use crate::error::{Checks, LedgerError, LedgerResult};
use crate::models::{PaymentMethod, PaymentStatus, SettlementPayment};
use crate::utils::{
    decimal_at, fmt_money, maybe_print_json, now, parse_datetime, parse_decimal, pretty_table,
    settlement_cancel_days,
};

#[derive(Debug, Clone)]
pub struct PaymentInput {
    pub payee_id: i64,
    pub amount: Decimal,
    pub concept: Option<String>,
    /// Defaults to cash.
    pub method: Option<PaymentMethod>,
    /// Defaults to the registration time.
    pub payment_date: Option<NaiveDateTime>,
}

pub fn handle(conn: &mut Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => {
            let payer = acting_user(sub)?;
            let input = PaymentInput {
                payee_id: required_i64(sub, "to")?,
                amount: parse_decimal(&required_str(sub, "amount")?)?,
                concept: sub.get_one::<String>("concept").cloned(),
                method: sub
                    .get_one::<String>("method")
                    .map(|s| s.parse::<PaymentMethod>())
                    .transpose()?,
                payment_date: sub
                    .get_one::<String>("date")
                    .map(|d| parse_datetime(d))
                    .transpose()?,
            };
            let p = register_payment(conn, payer, input, now())?;
            println!(
                "Payment {} recorded: {} -> {} {}",
                p.id,
                p.payer_id,
                p.payee_id,
                fmt_money(&p.amount)
            );
        }
        Some(("list", sub)) => {
            let items = list_for_user_household(conn, acting_user(sub)?)?;
            if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &items)? {
                let data = items
                    .into_iter()
                    .map(|p| {
                        vec![
                            p.id.to_string(),
                            p.payment_date.format("%Y-%m-%d %H:%M").to_string(),
                            p.payer_id.to_string(),
                            p.payee_id.to_string(),
                            fmt_money(&p.amount),
                            p.method.to_string(),
                            p.status.to_string(),
                            p.concept.unwrap_or_default(),
                        ]
                    })
                    .collect();
                println!(
                    "{}",
                    pretty_table(
                        &["Id", "Date", "From", "To", "Amount", "Method", "Status", "Concept"],
                        data
                    )
                );
            }
        }
        Some(("cancel", sub)) => {
            let id = required_i64(sub, "id")?;
            cancel_payment(conn, id, acting_user(sub)?, now())?;
            println!("Payment {} cancelled", id);
        }
        _ => {}
    }
    Ok(())
}

const PAYMENT_COLUMNS: &str = "id, payer_id, payee_id, household_id, amount, concept, method, \
     status, payment_date, created_at, updated_at";

fn payment_from_row(r: &Row<'_>) -> rusqlite::Result<SettlementPayment> {
    Ok(SettlementPayment {
        id: r.get(0)?,
        payer_id: r.get(1)?,
        payee_id: r.get(2)?,
        household_id: r.get(3)?,
        amount: decimal_at(r, 4)?,
        concept: r.get(5)?,
        method: r.get(6)?,
        status: r.get(7)?,
        payment_date: r.get(8)?,
        created_at: r.get(9)?,
        updated_at: r.get(10)?,
    })
}

pub fn register_payment(
    conn: &mut Connection,
    payer_id: i64,
    input: PaymentInput,
    now: NaiveDateTime,
) -> LedgerResult<SettlementPayment> {
    let mut checks = Checks::new();
    checks
        .require(input.amount > Decimal::ZERO, "amount", "must be positive")
        .money("amount", input.amount)
        .require(input.payee_id != payer_id, "payee", "cannot pay yourself");
    checks.finish()?;

    users::require_user(conn, input.payee_id)?;
    let hh = users::household_of(conn, payer_id)?
        .ok_or_else(|| LedgerError::invalid("payer", "not a member of any household"))?;
    if !hh.is_member(input.payee_id) {
        return Err(LedgerError::invalid(
            "payee",
            format!("user {} is not in household {}", input.payee_id, hh.id),
        ));
    }

    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO settlement_payments(payer_id, payee_id, household_id, amount, concept,
                                         method, status, payment_date, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
        params![
            payer_id,
            input.payee_id,
            hh.id,
            input.amount.to_string(),
            input.concept,
            input.method.unwrap_or(PaymentMethod::Cash),
            PaymentStatus::Completed,
            input.payment_date.unwrap_or(now),
            now
        ],
    )?;
    let id = tx.last_insert_rowid();
    tx.commit()?;
    tracing::info!(payment_id = id, payer_id, payee_id = input.payee_id, "settlement recorded");
    find_payment(conn, id)
}

fn find_payment(conn: &Connection, id: i64) -> LedgerResult<SettlementPayment> {
    conn.query_row(
        &format!("SELECT {} FROM settlement_payments WHERE id=?1", PAYMENT_COLUMNS),
        params![id],
        payment_from_row,
    )
    .optional()?
    .ok_or_else(|| LedgerError::NotFound(format!("payment {}", id)))
}

/// Payment by id, only for members of the payment's household.
pub fn get_payment(conn: &Connection, id: i64, viewer: i64) -> LedgerResult<SettlementPayment> {
    let p = find_payment(conn, id)?;
    if !users::get_household(conn, p.household_id)?.is_member(viewer) {
        return Err(LedgerError::Forbidden(format!(
            "payment {} belongs to another household",
            id
        )));
    }
    Ok(p)
}

/// Every payment of a household, any status, newest first.
pub fn payments_for_household(
    conn: &Connection,
    household_id: i64,
) -> LedgerResult<Vec<SettlementPayment>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {} FROM settlement_payments WHERE household_id=?1
         ORDER BY payment_date DESC, id DESC",
        PAYMENT_COLUMNS
    ))?;
    let rows = stmt.query_map(params![household_id], payment_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn list_for_user_household(
    conn: &Connection,
    user_id: i64,
) -> LedgerResult<Vec<SettlementPayment>> {
    match users::household_of(conn, user_id)? {
        Some(hh) => payments_for_household(conn, hh.id),
        None => Ok(Vec::new()),
    }
}

/// Cancels a completed payment. Only the payer or payee may do so, and only
/// within the configured window after the payment date.
pub fn cancel_payment(
    conn: &mut Connection,
    id: i64,
    user_id: i64,
    now: NaiveDateTime,
) -> LedgerResult<SettlementPayment> {
    let days = settlement_cancel_days(conn)?;
    let window = Duration::try_days(days)
        .ok_or_else(|| LedgerError::Corrupt(format!("cancel window of {} days", days)))?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let p = find_payment(&tx, id)?;
    if p.payer_id != user_id && p.payee_id != user_id {
        return Err(LedgerError::Forbidden(format!(
            "only the payer or payee can cancel payment {}",
            id
        )));
    }
    if p.status == PaymentStatus::Cancelled {
        return Err(LedgerError::BusinessRule(format!(
            "payment {} is already cancelled",
            id
        )));
    }
    if now - p.payment_date > window {
        return Err(LedgerError::BusinessRule(format!(
            "payment {} is older than {} days and can no longer be cancelled",
            id,
            window.num_days()
        )));
    }
    mark_cancelled(&tx, id, now)?;
    tx.commit()?;
    tracing::info!(payment_id = id, user_id, "settlement cancelled");
    find_payment(conn, id)
}

/// Completed to cancelled, or a conflict if another writer moved it first.
fn mark_cancelled(tx: &Connection, id: i64, now: NaiveDateTime) -> LedgerResult<()> {
    let changed = tx.execute(
        "UPDATE settlement_payments SET status=?1, updated_at=?2 WHERE id=?3 AND status=?4",
        params![PaymentStatus::Cancelled, now, id, PaymentStatus::Completed],
    )?;
    if changed == 0 {
        return Err(LedgerError::Conflict(format!(
            "payment {} changed while cancelling",
            id
        )));
    }
    Ok(())
}

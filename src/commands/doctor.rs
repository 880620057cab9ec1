// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::BTreeMap;

use crate::commands::expenses::live_sql;
use crate::error::LedgerResult;
use crate::models::DebtStatus;
use crate::utils::{decimal_at, pretty_table};
use anyhow::Result;
use rust_decimal::Decimal;
use rusqlite::Connection;

pub fn handle(conn: &Connection) -> Result<()> {
    let rows = scan(conn)?;
    if rows.is_empty() {
        println!("doctor: no issues found");
    } else {
        let data = rows.into_iter().map(|(k, d)| vec![k.to_string(), d]).collect();
        println!("{}", pretty_table(&["Issue", "Detail"], data));
    }
    Ok(())
}

/// Ledger invariant violations as (kind, detail) pairs.
pub fn scan(conn: &Connection) -> LedgerResult<Vec<(&'static str, String)>> {
    let mut rows = Vec::new();

    // 1) Shared expenses whose splits do not add up
    let sql = live_sql(
        "e.id, e.amount, s.amount",
        "JOIN expense_splits s ON s.expense_id = e.id",
        "1=1",
        "ORDER BY e.id",
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut sums: BTreeMap<i64, (Decimal, Decimal)> = BTreeMap::new();
    let mut cur = stmt.query([])?;
    while let Some(r) = cur.next()? {
        let id: i64 = r.get(0)?;
        let entry = sums.entry(id).or_insert((decimal_at(r, 1)?, Decimal::ZERO));
        entry.1 += decimal_at(r, 2)?;
    }
    for (id, (amount, split)) in sums {
        if amount != split {
            rows.push(("split_sum_mismatch", format!("expense {}: {} vs {}", id, amount, split)));
        }
    }

    // 2) Debt balances out of bounds or inconsistent with status
    let mut stmt = conn.prepare(
        "SELECT id, original_amount, outstanding_balance, status FROM external_debts ORDER BY id",
    )?;
    let mut cur = stmt.query([])?;
    while let Some(r) = cur.next()? {
        let id: i64 = r.get(0)?;
        let original = decimal_at(r, 1)?;
        let outstanding = decimal_at(r, 2)?;
        let status: DebtStatus = r.get(3)?;
        if outstanding.is_sign_negative() || outstanding > original {
            rows.push(("debt_balance_out_of_range", format!("debt {}: {}", id, outstanding)));
        }
        let paid_off = outstanding.is_zero();
        if status != DebtStatus::Cancelled && paid_off != (status == DebtStatus::Paid) {
            rows.push(("debt_status_mismatch", format!("debt {}: {} at {}", id, status, outstanding)));
        }
    }

    // 3) Active schedules with nothing to run
    let mut stmt = conn.prepare(
        "SELECT id FROM recurring_expenses WHERE active=1 AND next_execution IS NULL ORDER BY id",
    )?;
    let mut cur = stmt.query([])?;
    while let Some(r) = cur.next()? {
        let id: i64 = r.get(0)?;
        rows.push(("schedule_without_next_run", format!("recurring expense {}", id)));
    }

    // 4) Households past two members
    let mut stmt = conn.prepare(
        "SELECT household_id, COUNT(*) FROM household_members GROUP BY household_id HAVING COUNT(*) > 2",
    )?;
    let mut cur = stmt.query([])?;
    while let Some(r) = cur.next()? {
        let id: i64 = r.get(0)?;
        let n: i64 = r.get(1)?;
        rows.push(("household_too_large", format!("household {}: {} members", id, n)));
    }

    Ok(rows)
}

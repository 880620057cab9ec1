// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Household balance reconciliation and the monthly report.
//!
//! For each member `i`:
//!
//! ```text
//! balance_i = paid_i - owed_i + settled_to_i - settled_from_i
//! net       = balance[1] - balance[0]
//! ```
//!
//! `net > 0` means member 0 owes member 1. Sums stay exact; only the
//! reported values are rounded.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::NaiveDateTime;
use rust_decimal::{Decimal, RoundingStrategy};
use rusqlite::Connection;
use serde::Serialize;

use crate::cli::{acting_user, required_str};
use crate::commands::{expenses, settlements, users};
use crate::error::{LedgerError, LedgerResult};
use crate::models::{
    ExpenseSplit, Household, PaymentStatus, SettlementPayment, SplitKind, round_money,
};
use crate::utils::{fmt_money, maybe_print_json, month_window, parse_month, pretty_table};

pub const RECENT_PAYMENTS: usize = 5;

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct MemberBalance {
    pub user_id: i64,
    pub paid: Decimal,
    pub owed: Decimal,
    pub settled_to: Decimal,
    pub settled_from: Decimal,
    pub balance: Decimal,
}

impl MemberBalance {
    fn new(user_id: i64) -> Self {
        Self {
            user_id,
            ..Default::default()
        }
    }

    fn rounded(&self) -> Self {
        Self {
            user_id: self.user_id,
            paid: round_money(self.paid),
            owed: round_money(self.owed),
            settled_to: round_money(self.settled_to),
            settled_from: round_money(self.settled_from),
            balance: round_money(self.balance),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Owing {
    pub debtor: i64,
    pub creditor: i64,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Reconciliation {
    pub members: [MemberBalance; 2],
    pub net: Decimal,
    /// `None` when settled.
    pub owing: Option<Owing>,
}

/// Pure reconciliation over a pair. Splits or payments naming anyone else
/// are ignored, as are cancelled payments.
pub fn reconcile(
    members: (i64, i64),
    splits: &[ExpenseSplit],
    payments: &[SettlementPayment],
) -> Reconciliation {
    let mut acc = [MemberBalance::new(members.0), MemberBalance::new(members.1)];
    let slot = |user: i64| {
        if user == members.0 {
            Some(0)
        } else if user == members.1 {
            Some(1)
        } else {
            None
        }
    };
    for s in splits {
        let Some(i) = slot(s.user_id) else { continue };
        match s.kind {
            SplitKind::Paid => acc[i].paid += s.amount,
            SplitKind::Owes => acc[i].owed += s.amount,
        }
    }
    for p in payments.iter().filter(|p| p.status == PaymentStatus::Completed) {
        if let Some(i) = slot(p.payee_id) {
            acc[i].settled_to += p.amount;
        }
        if let Some(i) = slot(p.payer_id) {
            acc[i].settled_from += p.amount;
        }
    }
    for m in &mut acc {
        m.balance = m.paid - m.owed + m.settled_to - m.settled_from;
    }
    let net = acc[1].balance - acc[0].balance;
    let owing = if net > Decimal::ZERO {
        Some(Owing {
            debtor: members.0,
            creditor: members.1,
            amount: round_money(net),
        })
    } else if net < Decimal::ZERO {
        Some(Owing {
            debtor: members.1,
            creditor: members.0,
            amount: round_money(-net),
        })
    } else {
        None
    };
    Reconciliation {
        members: [acc[0].rounded(), acc[1].rounded()],
        net: round_money(net),
        owing,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BalanceSummary {
    pub household_id: i64,
    #[serde(flatten)]
    pub reconciliation: Reconciliation,
    pub recent_payments: Vec<SettlementPayment>,
    pub last_payment_at: Option<NaiveDateTime>,
}

fn pair(hh: &Household) -> LedgerResult<(i64, i64)> {
    match hh.members.as_slice() {
        [a, b, ..] => Ok((*a, *b)),
        _ => Err(LedgerError::BusinessRule(format!(
            "household {} needs two members to reconcile",
            hh.id
        ))),
    }
}

pub fn household_balance(conn: &Connection, household_id: i64) -> LedgerResult<BalanceSummary> {
    let hh = users::get_household(conn, household_id)?;
    let members = pair(&hh)?;
    let splits = expenses::household_splits(conn, hh.id, None)?;
    let payments = settlements::payments_for_household(conn, hh.id)?;
    tracing::debug!(
        household_id,
        splits = splits.len(),
        payments = payments.len(),
        "reconciling household"
    );
    let reconciliation = reconcile(members, &splits, &payments);
    let last_payment_at = payments
        .iter()
        .filter(|p| p.status == PaymentStatus::Completed)
        .map(|p| p.payment_date)
        .max();
    let recent_payments = payments.into_iter().take(RECENT_PAYMENTS).collect();
    Ok(BalanceSummary {
        household_id,
        reconciliation,
        recent_payments,
        last_payment_at,
    })
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CategoryTotal {
    pub category_id: i64,
    pub name: String,
    pub amount: Decimal,
    pub count: usize,
    /// Share of the month total, one decimal.
    pub percent: Decimal,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MemberTotal {
    pub user_id: i64,
    pub total: Decimal,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthlyReport {
    pub household_id: i64,
    pub year: i32,
    pub month: u32,
    pub total: Decimal,
    pub count: usize,
    pub by_category: Vec<CategoryTotal>,
    pub by_member: Vec<MemberTotal>,
    /// Month's splits only; settlements are left out.
    pub balance: Reconciliation,
}

pub fn percent_of(part: Decimal, whole: Decimal) -> Decimal {
    if whole.is_zero() {
        return Decimal::ZERO;
    }
    (part * Decimal::ONE_HUNDRED / whole)
        .round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero)
}

pub fn monthly_report(
    conn: &Connection,
    household_id: i64,
    year: i32,
    month: u32,
) -> LedgerResult<MonthlyReport> {
    let hh = users::get_household(conn, household_id)?;
    let members = pair(&hh)?;
    let items = expenses::list_for_household_month(conn, household_id, year, month)?;
    let names = crate::commands::categories::list_categories(conn)?
        .into_iter()
        .map(|c| (c.id, c.name))
        .collect::<BTreeMap<_, _>>();

    let total: Decimal = items.iter().map(|e| e.amount).sum();
    let mut cats: BTreeMap<i64, (Decimal, usize)> = BTreeMap::new();
    let mut per_member: BTreeMap<i64, (Decimal, usize)> = hh
        .members
        .iter()
        .map(|m| (*m, (Decimal::ZERO, 0)))
        .collect();
    for e in &items {
        let c = cats.entry(e.category_id).or_default();
        c.0 += e.amount;
        c.1 += 1;
        let m = per_member.entry(e.owner_id).or_default();
        m.0 += e.amount;
        m.1 += 1;
    }
    let mut by_category: Vec<CategoryTotal> = cats
        .into_iter()
        .map(|(id, (amount, count))| CategoryTotal {
            category_id: id,
            name: names.get(&id).cloned().unwrap_or_default(),
            amount: round_money(amount),
            count,
            percent: percent_of(amount, total),
        })
        .collect();
    by_category.sort_by(|a, b| b.amount.cmp(&a.amount).then(a.name.cmp(&b.name)));

    let window = month_window(year, month)?;
    let splits = expenses::household_splits(conn, household_id, Some(window))?;
    Ok(MonthlyReport {
        household_id,
        year,
        month,
        total: round_money(total),
        count: items.len(),
        by_category,
        by_member: per_member
            .into_iter()
            .map(|(user_id, (t, count))| MemberTotal {
                user_id,
                total: round_money(t),
                count,
            })
            .collect(),
        balance: reconcile(members, &splits, &[]),
    })
}

fn require_household(conn: &Connection, user: i64) -> LedgerResult<Household> {
    users::household_of(conn, user)?
        .ok_or_else(|| LedgerError::NotFound(format!("household for user {}", user)))
}

fn print_members(r: &Reconciliation) {
    let data = r
        .members
        .iter()
        .map(|m| {
            vec![
                m.user_id.to_string(),
                fmt_money(&m.paid),
                fmt_money(&m.owed),
                fmt_money(&m.settled_to),
                fmt_money(&m.settled_from),
                fmt_money(&m.balance),
            ]
        })
        .collect();
    println!(
        "{}",
        pretty_table(
            &["User", "Paid", "Owed", "Received", "Sent", "Balance"],
            data
        )
    );
    match &r.owing {
        Some(o) => println!(
            "User {} owes user {} {}",
            o.debtor,
            o.creditor,
            fmt_money(&o.amount)
        ),
        None => println!("Settled"),
    }
}

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("show", sub)) => {
            let hh = require_household(conn, acting_user(sub)?)?;
            let summary = household_balance(conn, hh.id)?;
            if !maybe_print_json(sub.get_flag("json"), false, &summary)? {
                print_members(&summary.reconciliation);
                if let Some(at) = summary.last_payment_at {
                    println!("Last payment: {}", at.format("%Y-%m-%d %H:%M"));
                }
            }
        }
        Some(("report", sub)) => {
            let hh = require_household(conn, acting_user(sub)?)?;
            let (year, month) = parse_month(&required_str(sub, "month")?)?;
            let report = monthly_report(conn, hh.id, year, month)?;
            if !maybe_print_json(sub.get_flag("json"), false, &report)? {
                let data = report
                    .by_category
                    .iter()
                    .map(|c| {
                        vec![
                            c.name.clone(),
                            fmt_money(&c.amount),
                            c.count.to_string(),
                            format!("{}%", c.percent),
                        ]
                    })
                    .collect();
                println!(
                    "{}",
                    pretty_table(&["Category", "Amount", "Count", "Share"], data)
                );
                println!(
                    "{}-{:02}: {} expenses, total {}",
                    year,
                    month,
                    report.count,
                    fmt_money(&report.total)
                );
                print_members(&report.balance);
            }
        }
        _ => {}
    }
    Ok(())
}

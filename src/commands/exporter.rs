// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Result, bail};
use rusqlite::Connection;
use serde_json::json;

use crate::cli::{acting_user, required_str};
use crate::commands::{categories, expenses, users};
use crate::error::LedgerError;
use crate::models::Expense;
use crate::utils::parse_month;

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("expenses", sub)) => {
            let user = acting_user(sub)?;
            let fmt = required_str(sub, "format")?.to_lowercase();
            let out = required_str(sub, "out")?;
            let items = match sub.get_one::<String>("month") {
                Some(month) => {
                    let (y, mo) = parse_month(month)?;
                    let hh = users::household_of(conn, user)?.ok_or_else(|| {
                        LedgerError::NotFound(format!("household for user {}", user))
                    })?;
                    expenses::list_for_household_month(conn, hh.id, y, mo)?
                }
                None => expenses::list_for_user(conn, user)?,
            };
            let n = write_expenses(conn, &items, &fmt, Path::new(&out))?;
            println!("Exported {} expenses to {}", n, out);
        }
        _ => {}
    }
    Ok(())
}

/// Writes expenses oldest first as `csv` or `json`. Returns the row count.
pub fn write_expenses(conn: &Connection, items: &[Expense], fmt: &str, out: &Path) -> Result<usize> {
    let names: BTreeMap<i64, String> = categories::list_categories(conn)?
        .into_iter()
        .map(|c| (c.id, c.name))
        .collect();
    let mut rows: Vec<&Expense> = items.iter().collect();
    rows.sort_by_key(|e| (e.expense_date, e.id));

    match fmt {
        "csv" => {
            let mut wtr = csv::Writer::from_path(out)?;
            wtr.write_record([
                "date", "description", "category", "amount", "owner", "shared", "notes",
            ])?;
            for e in &rows {
                wtr.write_record([
                    e.expense_date.format("%Y-%m-%d %H:%M:%S").to_string(),
                    e.description.clone(),
                    names.get(&e.category_id).cloned().unwrap_or_default(),
                    format!("{:.2}", e.amount),
                    e.owner_id.to_string(),
                    e.is_shared().to_string(),
                    e.notes.clone().unwrap_or_default(),
                ])?;
            }
            wtr.flush()?;
        }
        "json" => {
            let items: Vec<_> = rows
                .iter()
                .map(|e| {
                    json!({
                        "date": e.expense_date.format("%Y-%m-%d %H:%M:%S").to_string(),
                        "description": e.description,
                        "category": names.get(&e.category_id),
                        "amount": format!("{:.2}", e.amount),
                        "owner": e.owner_id,
                        "splits": e.splits.iter().map(|s| json!({
                            "user": s.user_id,
                            "amount": format!("{:.2}", s.amount),
                            "kind": s.kind,
                        })).collect::<Vec<_>>(),
                        "notes": e.notes,
                    })
                })
                .collect();
            std::fs::write(out, serde_json::to_string_pretty(&items)?)?;
        }
        other => bail!("Unknown format: {} (use csv|json)", other),
    }
    Ok(rows.len())
}

// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::cli::required_str;
use crate::error::{LedgerError, LedgerResult};
use crate::models::Category;
use crate::utils::{maybe_print_json, pretty_table};
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => {
            let name = required_str(sub, "name")?;
            let icon = sub.get_one::<String>("icon").map(|s| s.trim().to_string());
            let cat = add_category(conn, &name, icon.as_deref())?;
            println!("Added category '{}' (id {})", cat.name, cat.id);
        }
        Some(("list", sub)) => {
            let cats = list_categories(conn)?;
            if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &cats)? {
                let data = cats
                    .into_iter()
                    .map(|c| vec![c.id.to_string(), c.name, c.icon.unwrap_or_default()])
                    .collect();
                println!("{}", pretty_table(&["Id", "Category", "Icon"], data));
            }
        }
        _ => {}
    }
    Ok(())
}

pub fn add_category(conn: &Connection, name: &str, icon: Option<&str>) -> LedgerResult<Category> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LedgerError::invalid("name", "required"));
    }
    let taken: Option<i64> = conn
        .query_row("SELECT id FROM categories WHERE name=?1", params![name], |r| r.get(0))
        .optional()?;
    if taken.is_some() {
        return Err(LedgerError::BusinessRule(format!("category '{}' already exists", name)));
    }
    conn.execute(
        "INSERT INTO categories(name, icon) VALUES (?1, ?2)",
        params![name, icon],
    )?;
    Ok(Category {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
        icon: icon.map(str::to_string),
    })
}

pub fn list_categories(conn: &Connection) -> LedgerResult<Vec<Category>> {
    let mut stmt = conn.prepare("SELECT id, name, icon FROM categories ORDER BY name")?;
    let rows = stmt.query_map([], |r| {
        Ok(Category {
            id: r.get(0)?,
            name: r.get(1)?,
            icon: r.get(2)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn require_category(conn: &Connection, id: i64) -> LedgerResult<Category> {
    conn.query_row(
        "SELECT id, name, icon FROM categories WHERE id=?1",
        params![id],
        |r| {
            Ok(Category {
                id: r.get(0)?,
                name: r.get(1)?,
                icon: r.get(2)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| LedgerError::NotFound(format!("category {}", id)))
}

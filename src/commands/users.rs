// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Users and households. Everything else only asks two questions of this
//! module: does the user exist, and which household (with which ordered
//! members) do they belong to.

use crate::cli::{acting_user, required_i64, required_str};
use crate::error::{LedgerError, LedgerResult};
use crate::models::{Household, User};
use crate::utils::{maybe_print_json, pretty_table};
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};

/// A household never grows past the pair the balance is defined for.
pub const MAX_MEMBERS: usize = 2;

pub fn handle_users(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => {
            let user = create_user(conn, &required_str(sub, "name")?)?;
            println!("Added user '{}' (id {})", user.name, user.id);
        }
        Some(("list", sub)) => {
            let users = list_users(conn)?;
            if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &users)? {
                let mut data = Vec::new();
                for u in &users {
                    let hh = household_of(conn, u.id)?
                        .map(|h| h.name)
                        .unwrap_or_default();
                    data.push(vec![u.id.to_string(), u.name.clone(), hh]);
                }
                println!("{}", pretty_table(&["Id", "Name", "Household"], data));
            }
        }
        _ => {}
    }
    Ok(())
}

pub fn handle_households(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("create", sub)) => {
            let user = acting_user(sub)?;
            let hh = create_household(conn, &required_str(sub, "name")?, user)?;
            println!("Created household '{}' (id {})", hh.name, hh.id);
        }
        Some(("join", sub)) => {
            let user = acting_user(sub)?;
            let hh = join_household(conn, required_i64(sub, "id")?, user)?;
            println!("User {} joined '{}'", user, hh.name);
        }
        Some(("show", sub)) => {
            let user = acting_user(sub)?;
            let hh = household_of(conn, user)?
                .ok_or_else(|| LedgerError::NotFound(format!("household for user {}", user)))?;
            if !maybe_print_json(sub.get_flag("json"), false, &hh)? {
                let mut data = Vec::new();
                for (pos, id) in hh.members.iter().enumerate() {
                    let name = require_user(conn, *id)?.name;
                    data.push(vec![pos.to_string(), id.to_string(), name]);
                }
                println!("{} (id {})", hh.name, hh.id);
                println!("{}", pretty_table(&["#", "User", "Name"], data));
            }
        }
        _ => {}
    }
    Ok(())
}

pub fn create_user(conn: &Connection, name: &str) -> LedgerResult<User> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LedgerError::invalid("name", "required"));
    }
    conn.execute("INSERT INTO users(name) VALUES (?1)", params![name])?;
    Ok(User {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
    })
}

pub fn list_users(conn: &Connection) -> LedgerResult<Vec<User>> {
    let mut stmt = conn.prepare("SELECT id, name FROM users ORDER BY id")?;
    let rows = stmt.query_map([], |r| {
        Ok(User {
            id: r.get(0)?,
            name: r.get(1)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn require_user(conn: &Connection, id: i64) -> LedgerResult<User> {
    conn.query_row(
        "SELECT id, name FROM users WHERE id=?1",
        params![id],
        |r| {
            Ok(User {
                id: r.get(0)?,
                name: r.get(1)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| LedgerError::NotFound(format!("user {}", id)))
}

pub fn get_household(conn: &Connection, id: i64) -> LedgerResult<Household> {
    let name: String = conn
        .query_row(
            "SELECT name FROM households WHERE id=?1",
            params![id],
            |r| r.get(0),
        )
        .optional()?
        .ok_or_else(|| LedgerError::NotFound(format!("household {}", id)))?;
    let mut stmt = conn.prepare_cached(
        "SELECT user_id FROM household_members WHERE household_id=?1 ORDER BY position",
    )?;
    let members = stmt
        .query_map(params![id], |r| r.get::<_, i64>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(Household { id, name, members })
}

pub fn household_of(conn: &Connection, user_id: i64) -> LedgerResult<Option<Household>> {
    let hh_id: Option<i64> = conn
        .query_row(
            "SELECT household_id FROM household_members WHERE user_id=?1",
            params![user_id],
            |r| r.get(0),
        )
        .optional()?;
    hh_id.map(|id| get_household(conn, id)).transpose()
}

pub fn create_household(conn: &Connection, name: &str, founder_id: i64) -> LedgerResult<Household> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LedgerError::invalid("name", "required"));
    }
    require_user(conn, founder_id)?;
    if household_of(conn, founder_id)?.is_some() {
        return Err(LedgerError::BusinessRule(format!(
            "user {} already belongs to a household",
            founder_id
        )));
    }
    let tx = conn.unchecked_transaction()?;
    tx.execute("INSERT INTO households(name) VALUES (?1)", params![name])?;
    let id = tx.last_insert_rowid();
    tx.execute(
        "INSERT INTO household_members(household_id, user_id, position) VALUES (?1, ?2, 0)",
        params![id, founder_id],
    )?;
    tx.commit()?;
    tracing::info!(household_id = id, founder_id, "household created");
    get_household(conn, id)
}

pub fn join_household(conn: &Connection, household_id: i64, user_id: i64) -> LedgerResult<Household> {
    require_user(conn, user_id)?;
    let hh = get_household(conn, household_id)?;
    if hh.is_member(user_id) {
        return Ok(hh);
    }
    if household_of(conn, user_id)?.is_some() {
        return Err(LedgerError::BusinessRule(format!(
            "user {} already belongs to a household",
            user_id
        )));
    }
    if hh.members.len() >= MAX_MEMBERS {
        return Err(LedgerError::BusinessRule(format!(
            "household {} already has {} members",
            household_id, MAX_MEMBERS
        )));
    }
    conn.execute(
        "INSERT INTO household_members(household_id, user_id, position) VALUES (?1, ?2, ?3)",
        params![household_id, user_id, hh.members.len() as i64],
    )?;
    tracing::info!(household_id, user_id, "member joined household");
    get_household(conn, household_id)
}

// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use once_cell::sync::Lazy;
use rusqlite::Connection;
use std::fs;
use std::path::PathBuf;

static APP: Lazy<(&str, &str, &str)> = Lazy::new(|| ("com.alphavelocity", "Tandem", "tandem"));

/// Environment override for the database file.
pub const DB_ENV: &str = "TANDEM_DB";

pub fn db_path() -> Result<PathBuf> {
    if let Some(p) = std::env::var_os(DB_ENV).filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(p));
    }
    let proj = ProjectDirs::from(APP.0, APP.1, APP.2)
        .context("Could not determine platform-specific data dir")?;
    let data_dir = proj.data_dir();
    fs::create_dir_all(data_dir).context("Failed to create data dir")?;
    Ok(data_dir.join("tandem.sqlite"))
}

pub fn open_or_init() -> Result<Connection> {
    let path = db_path()?;
    let conn =
        Connection::open(&path).with_context(|| format!("Open DB at {}", path.display()))?;
    init_schema(&conn)?;
    tracing::debug!(path = %path.display(), "database ready");
    Ok(conn)
}

/// In-memory store with the full schema; used by tests and dry runs.
pub fn open_in_memory() -> rusqlite::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS settings(
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS users(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE IF NOT EXISTS households(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    -- position fixes member order: 0 and 1 define the balance pair
    CREATE TABLE IF NOT EXISTS household_members(
        household_id INTEGER NOT NULL,
        user_id INTEGER NOT NULL UNIQUE,
        position INTEGER NOT NULL,
        PRIMARY KEY(household_id, position),
        FOREIGN KEY(household_id) REFERENCES households(id) ON DELETE CASCADE,
        FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS categories(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        icon TEXT
    );

    CREATE TABLE IF NOT EXISTS expenses(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        description TEXT NOT NULL,
        amount TEXT NOT NULL,
        original_amount TEXT NOT NULL,
        notes TEXT,
        photo_ref TEXT,
        owner_id INTEGER NOT NULL,
        household_id INTEGER,
        category_id INTEGER NOT NULL,
        expense_date TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        deleted_at TEXT,
        FOREIGN KEY(owner_id) REFERENCES users(id) ON DELETE CASCADE,
        FOREIGN KEY(household_id) REFERENCES households(id) ON DELETE CASCADE,
        FOREIGN KEY(category_id) REFERENCES categories(id)
    );
    CREATE INDEX IF NOT EXISTS idx_expenses_owner ON expenses(owner_id, expense_date);
    CREATE INDEX IF NOT EXISTS idx_expenses_household ON expenses(household_id, expense_date);

    CREATE TABLE IF NOT EXISTS expense_splits(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        expense_id INTEGER NOT NULL,
        user_id INTEGER NOT NULL,
        amount TEXT NOT NULL,
        kind TEXT NOT NULL CHECK(kind IN ('OWES','PAID')),
        FOREIGN KEY(expense_id) REFERENCES expenses(id) ON DELETE CASCADE,
        FOREIGN KEY(user_id) REFERENCES users(id)
    );
    CREATE INDEX IF NOT EXISTS idx_splits_expense ON expense_splits(expense_id);

    CREATE TABLE IF NOT EXISTS external_debts(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner_id INTEGER NOT NULL,
        creditor_name TEXT NOT NULL,
        description TEXT,
        type TEXT NOT NULL,
        original_amount TEXT NOT NULL,
        outstanding_balance TEXT NOT NULL,
        status TEXT NOT NULL CHECK(status IN ('ACTIVE','PAID','CANCELLED')),
        start_date TEXT NOT NULL,
        due_date TEXT,
        billing_day INTEGER,
        payment_due_day INTEGER,
        interest_rate TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        FOREIGN KEY(owner_id) REFERENCES users(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS debt_installments(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        debt_id INTEGER NOT NULL,
        amount TEXT NOT NULL,
        payment_date TEXT NOT NULL,
        method TEXT NOT NULL,
        receipt_ref TEXT,
        notes TEXT,
        created_at TEXT NOT NULL,
        FOREIGN KEY(debt_id) REFERENCES external_debts(id) ON DELETE CASCADE
    );
    CREATE INDEX IF NOT EXISTS idx_installments_debt ON debt_installments(debt_id, payment_date);

    CREATE TABLE IF NOT EXISTS settlement_payments(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        payer_id INTEGER NOT NULL,
        payee_id INTEGER NOT NULL,
        household_id INTEGER NOT NULL,
        amount TEXT NOT NULL,
        concept TEXT,
        method TEXT NOT NULL,
        status TEXT NOT NULL CHECK(status IN ('COMPLETED','CANCELLED')),
        payment_date TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        CHECK(payer_id <> payee_id),
        FOREIGN KEY(payer_id) REFERENCES users(id),
        FOREIGN KEY(payee_id) REFERENCES users(id),
        FOREIGN KEY(household_id) REFERENCES households(id) ON DELETE CASCADE
    );
    CREATE INDEX IF NOT EXISTS idx_payments_household ON settlement_payments(household_id, payment_date);

    CREATE TABLE IF NOT EXISTS budgets(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner_id INTEGER NOT NULL,
        category_id INTEGER,
        amount TEXT NOT NULL,
        period TEXT NOT NULL CHECK(period IN ('WEEKLY','MONTHLY','ANNUAL')),
        active INTEGER NOT NULL DEFAULT 1,
        notes TEXT,
        FOREIGN KEY(owner_id) REFERENCES users(id) ON DELETE CASCADE,
        FOREIGN KEY(category_id) REFERENCES categories(id) ON DELETE CASCADE
    );
    -- NULL category (global budget) must collide too, hence IFNULL
    CREATE UNIQUE INDEX IF NOT EXISTS idx_budgets_unique
        ON budgets(owner_id, IFNULL(category_id, 0), period);

    CREATE TABLE IF NOT EXISTS recurring_expenses(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner_id INTEGER NOT NULL,
        household_id INTEGER,
        description TEXT NOT NULL,
        amount TEXT NOT NULL,
        category_id INTEGER NOT NULL,
        frequency TEXT NOT NULL,
        execution_day INTEGER NOT NULL,
        start_date TEXT NOT NULL,
        end_date TEXT,
        last_executed TEXT,
        next_execution TEXT,
        active INTEGER NOT NULL DEFAULT 1,
        shared INTEGER NOT NULL DEFAULT 0,
        notes TEXT,
        total_executed INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        FOREIGN KEY(owner_id) REFERENCES users(id) ON DELETE CASCADE,
        FOREIGN KEY(category_id) REFERENCES categories(id)
    );
    CREATE INDEX IF NOT EXISTS idx_recurring_next ON recurring_expenses(active, next_execution);
    "#,
    )?;
    Ok(())
}

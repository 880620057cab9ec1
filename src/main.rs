// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use clap::ArgMatches;

use tandem::error::LedgerError;
use tandem::notify::LogNotifier;
use tandem::{cli, commands, db};

fn main() -> Result<()> {
    tandem::init_tracing();
    let matches = cli::build_cli().get_matches();
    run(&matches).inspect_err(|e| {
        if let Some(le) = e.downcast_ref::<LedgerError>() {
            if le.is_internal() {
                tracing::error!(error = ?le, "storage failure");
            }
        }
    })
}

fn run(matches: &ArgMatches) -> Result<()> {
    let mut conn = db::open_or_init()?;
    let notifier = LogNotifier;

    match matches.subcommand() {
        Some(("init", _)) => {
            println!("Database initialized at {}", db::db_path()?.display());
        }
        Some(("user", sub)) => commands::users::handle_users(&conn, sub)?,
        Some(("household", sub)) => commands::users::handle_households(&conn, sub)?,
        Some(("category", sub)) => commands::categories::handle(&conn, sub)?,
        Some(("expense", sub)) => commands::expenses::handle(&mut conn, &notifier, sub)?,
        Some(("pay", sub)) => commands::settlements::handle(&mut conn, sub)?,
        Some(("balance", sub)) => commands::balance::handle(&conn, sub)?,
        Some(("debt", sub)) => commands::debts::handle(&mut conn, sub)?,
        Some(("recurring", sub)) => commands::recurring::handle(&mut conn, &notifier, sub)?,
        Some(("budget", sub)) => commands::budgets::handle(&mut conn, sub)?,
        Some(("jobs", sub)) => commands::jobs::handle(&mut conn, &notifier, sub)?,
        Some(("export", sub)) => commands::exporter::handle(&conn, sub)?,
        Some(("config", sub)) => commands::config::handle(&conn, sub)?,
        Some(("doctor", _)) => commands::doctor::handle(&conn)?,
        _ => {
            cli::build_cli().print_help()?;
            println!();
        }
    }
    Ok(())
}

// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::BTreeMap;

use anyhow::{Context, Result, bail};
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use rust_decimal::Decimal;

use crate::utils::parse_decimal;

fn json_flags(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("json")
            .long("json")
            .action(ArgAction::SetTrue)
            .help("Print as pretty JSON"),
    )
    .arg(
        Arg::new("jsonl")
            .long("jsonl")
            .action(ArgAction::SetTrue)
            .conflicts_with("json")
            .help("Print one JSON object per line"),
    )
}

fn json_flag(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("json")
            .long("json")
            .action(ArgAction::SetTrue)
            .help("Print as pretty JSON"),
    )
}

fn text(name: &'static str) -> Arg {
    Arg::new(name).long(name)
}

fn id_arg(help: &'static str) -> Arg {
    Arg::new("id")
        .long("id")
        .required(true)
        .value_parser(value_parser!(i64))
        .help(help)
}

fn category_arg(required: bool) -> Arg {
    Arg::new("category")
        .long("category")
        .required(required)
        .value_parser(value_parser!(i64))
        .help("Category id")
}

pub fn build_cli() -> Command {
    Command::new("tandem")
        .about("Shared expense ledger for two-person households")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("user")
                .long("user")
                .short('u')
                .global(true)
                .value_parser(value_parser!(i64))
                .help("Acting user id"),
        )
        .subcommand(Command::new("init").about("Create the database"))
        .subcommand(
            Command::new("user")
                .about("Users")
                .subcommand(Command::new("add").arg(text("name").required(true)))
                .subcommand(json_flags(Command::new("list"))),
        )
        .subcommand(
            Command::new("household")
                .about("Households (at most two members)")
                .subcommand(Command::new("create").arg(text("name").required(true)))
                .subcommand(Command::new("join").arg(id_arg("Household id")))
                .subcommand(json_flag(Command::new("show"))),
        )
        .subcommand(
            Command::new("category")
                .about("Expense categories")
                .subcommand(
                    Command::new("add")
                        .arg(text("name").required(true))
                        .arg(text("icon")),
                )
                .subcommand(json_flags(Command::new("list"))),
        )
        .subcommand(
            Command::new("expense")
                .about("Individual and shared expenses")
                .subcommand(
                    Command::new("add")
                        .arg(text("description").required(true))
                        .arg(text("amount").required(true))
                        .arg(category_arg(true))
                        .arg(text("date").help("YYYY-MM-DD [HH:MM[:SS]]"))
                        .arg(text("notes"))
                        .arg(text("photo"))
                        .arg(text("split").help("Shares per user, e.g. 1=60,2=40")),
                )
                .subcommand(
                    Command::new("edit")
                        .arg(id_arg("Expense id"))
                        .arg(text("description"))
                        .arg(text("amount"))
                        .arg(category_arg(false))
                        .arg(text("date"))
                        .arg(text("notes"))
                        .arg(text("photo"))
                        .arg(text("split").help("Replacement shares; empty string un-shares")),
                )
                .subcommand(Command::new("rm").arg(id_arg("Expense id")))
                .subcommand(json_flag(Command::new("show").arg(id_arg("Expense id"))))
                .subcommand(json_flags(
                    Command::new("list")
                        .arg(text("month").help("Household expenses of YYYY-MM"))
                        .arg(
                            Arg::new("limit")
                                .long("limit")
                                .value_parser(value_parser!(usize))
                                .help("Only the N most recent"),
                        ),
                ))
                .subcommand(json_flag(Command::new("summary"))),
        )
        .subcommand(
            Command::new("pay")
                .about("Settlement payments between household members")
                .subcommand(
                    Command::new("add")
                        .arg(
                            Arg::new("to")
                                .long("to")
                                .required(true)
                                .value_parser(value_parser!(i64))
                                .help("Payee user id"),
                        )
                        .arg(text("amount").required(true))
                        .arg(text("concept"))
                        .arg(text("method").help("CASH|TRANSFER|CARD|OTHER"))
                        .arg(text("date")),
                )
                .subcommand(json_flags(Command::new("list")))
                .subcommand(Command::new("cancel").arg(id_arg("Payment id"))),
        )
        .subcommand(
            Command::new("balance")
                .about("Household balance")
                .subcommand(json_flag(Command::new("show")))
                .subcommand(json_flag(
                    Command::new("report").arg(text("month").required(true).help("YYYY-MM")),
                )),
        )
        .subcommand(
            Command::new("debt")
                .about("External debts and installments")
                .subcommand(debt_fields(
                    Command::new("add")
                        .arg(text("creditor").required(true))
                        .arg(text("amount").required(true)),
                ))
                .subcommand(debt_fields(
                    Command::new("edit")
                        .arg(id_arg("Debt id"))
                        .arg(text("creditor"))
                        .arg(text("amount")),
                ))
                .subcommand(json_flags(
                    Command::new("list").arg(
                        Arg::new("active")
                            .long("active")
                            .action(ArgAction::SetTrue)
                            .help("Only active debts"),
                    ),
                ))
                .subcommand(json_flag(Command::new("show").arg(id_arg("Debt id"))))
                .subcommand(Command::new("cancel").arg(id_arg("Debt id")))
                .subcommand(Command::new("rm").arg(id_arg("Debt id")))
                .subcommand(
                    Command::new("pay")
                        .arg(id_arg("Debt id"))
                        .arg(text("amount").required(true))
                        .arg(text("date"))
                        .arg(text("method").help("CASH|TRANSFER|CARD|OTHER"))
                        .arg(text("receipt"))
                        .arg(text("notes")),
                )
                .subcommand(Command::new("unpay").arg(id_arg("Installment id")))
                .subcommand(json_flags(
                    Command::new("installments").arg(id_arg("Debt id")),
                ))
                .subcommand(json_flag(Command::new("summary"))),
        )
        .subcommand(
            Command::new("recurring")
                .about("Recurring expenses")
                .subcommand(
                    Command::new("add")
                        .arg(text("description").required(true))
                        .arg(text("amount").required(true))
                        .arg(category_arg(true))
                        .arg(text("frequency").required(true).help(
                            "DAILY|WEEKLY|BIWEEKLY|MONTHLY|BIMONTHLY|QUARTERLY|SEMIANNUAL|ANNUAL",
                        ))
                        .arg(day_arg())
                        .arg(text("start"))
                        .arg(text("end"))
                        .arg(
                            Arg::new("shared")
                                .long("shared")
                                .action(ArgAction::SetTrue)
                                .help("Record into the household"),
                        )
                        .arg(text("notes")),
                )
                .subcommand(
                    Command::new("edit")
                        .arg(id_arg("Recurring expense id"))
                        .arg(text("description"))
                        .arg(text("amount"))
                        .arg(category_arg(false))
                        .arg(text("frequency"))
                        .arg(day_arg())
                        .arg(text("end"))
                        .arg(
                            Arg::new("no-end")
                                .long("no-end")
                                .action(ArgAction::SetTrue)
                                .conflicts_with("end")
                                .help("Run without an end date"),
                        )
                        .arg(
                            Arg::new("shared")
                                .long("shared")
                                .value_parser(value_parser!(bool)),
                        )
                        .arg(text("notes")),
                )
                .subcommand(json_flags(
                    Command::new("list")
                        .arg(
                            Arg::new("active")
                                .long("active")
                                .action(ArgAction::SetTrue),
                        )
                        .arg(
                            Arg::new("within")
                                .long("within")
                                .value_parser(value_parser!(i64))
                                .help("Due in the next N days"),
                        ),
                ))
                .subcommand(json_flag(
                    Command::new("show").arg(id_arg("Recurring expense id")),
                ))
                .subcommand(Command::new("toggle").arg(id_arg("Recurring expense id")))
                .subcommand(Command::new("rm").arg(id_arg("Recurring expense id")))
                .subcommand(json_flag(
                    Command::new("run").arg(
                        Arg::new("id")
                            .long("id")
                            .value_parser(value_parser!(i64))
                            .help("Run one schedule now; all due ones otherwise"),
                    ),
                )),
        )
        .subcommand(
            Command::new("budget")
                .about("Spending limits")
                .subcommand(
                    Command::new("set")
                        .arg(text("amount").required(true))
                        .arg(category_arg(false))
                        .arg(text("period").help("WEEKLY|MONTHLY|ANNUAL"))
                        .arg(text("notes")),
                )
                .subcommand(
                    Command::new("edit")
                        .arg(id_arg("Budget id"))
                        .arg(text("amount"))
                        .arg(text("notes")),
                )
                .subcommand(Command::new("toggle").arg(id_arg("Budget id")))
                .subcommand(Command::new("rm").arg(id_arg("Budget id")))
                .subcommand(json_flags(Command::new("list"))),
        )
        .subcommand(
            Command::new("jobs")
                .about("Daily background work")
                .subcommand(json_flag(
                    Command::new("run").arg(text("date").help("Run as of YYYY-MM-DD")),
                )),
        )
        .subcommand(
            Command::new("export").about("Export data").subcommand(
                Command::new("expenses")
                    .arg(text("format").required(true).help("csv|json"))
                    .arg(text("out").required(true))
                    .arg(text("month").help("Household expenses of YYYY-MM")),
            ),
        )
        .subcommand(
            Command::new("config")
                .about("Runtime settings")
                .subcommand(Command::new("get").arg(text("key").required(true)))
                .subcommand(
                    Command::new("set")
                        .arg(text("key").required(true))
                        .arg(text("value").required(true)),
                )
                .subcommand(Command::new("list")),
        )
        .subcommand(Command::new("doctor").about("Check ledger invariants"))
}

fn day_arg() -> Arg {
    Arg::new("day")
        .long("day")
        .value_parser(value_parser!(u32))
        .help("Day of month for month-based frequencies")
}

fn debt_fields(cmd: Command) -> Command {
    cmd.arg(text("type").help("CREDIT_CARD|PERSONAL_LOAN|MORTGAGE|VEHICLE_LOAN|OTHER"))
        .arg(text("description"))
        .arg(text("start"))
        .arg(text("due"))
        .arg(
            Arg::new("billing-day")
                .long("billing-day")
                .value_parser(value_parser!(u32)),
        )
        .arg(
            Arg::new("payment-day")
                .long("payment-day")
                .value_parser(value_parser!(u32)),
        )
        .arg(text("rate").help("Interest rate"))
}

pub fn acting_user(m: &ArgMatches) -> Result<i64> {
    m.get_one::<i64>("user")
        .copied()
        .context("--user <ID> is required for this command")
}

pub fn required_str(m: &ArgMatches, name: &str) -> Result<String> {
    m.get_one::<String>(name)
        .cloned()
        .with_context(|| format!("--{} is required", name))
}

pub fn required_i64(m: &ArgMatches, name: &str) -> Result<i64> {
    m.get_one::<i64>(name)
        .copied()
        .with_context(|| format!("--{} is required", name))
}

/// `1=60,2=40` into user id -> share. An empty string is an empty split.
pub fn parse_split(s: &str) -> Result<BTreeMap<i64, Decimal>> {
    let mut out = BTreeMap::new();
    for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let Some((user, share)) = part.split_once('=') else {
            bail!("Invalid split entry '{}', expected USER=AMOUNT", part);
        };
        let user: i64 = user
            .trim()
            .parse()
            .with_context(|| format!("Invalid user id '{}'", user))?;
        if out.insert(user, parse_decimal(share)?).is_some() {
            bail!("User {} appears twice in the split", user);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_parses_pairs() {
        let split = parse_split("1=60, 2=40.50").unwrap();
        assert_eq!(split[&1], Decimal::new(60, 0));
        assert_eq!(split[&2], Decimal::new(4050, 2));
        assert!(parse_split("").unwrap().is_empty());
        assert!(parse_split("1=10,1=20").is_err());
        assert!(parse_split("1:10").is_err());
    }

    #[test]
    fn user_flag_is_global() {
        let m = build_cli().get_matches_from(["tandem", "balance", "show", "--user", "7"]);
        let (_, balance) = m.subcommand().unwrap();
        let (_, show) = balance.subcommand().unwrap();
        assert_eq!(acting_user(show).unwrap(), 7);
    }
}

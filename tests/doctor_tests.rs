// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

mod common;

use common::{Fixture, RecordingNotifier, at, dec, fixture, ymd};
use rusqlite::params;
use tandem::commands::debts::{self, DebtInput};
use tandem::commands::doctor;
use tandem::commands::expenses::{self, ExpenseInput};
use tandem::commands::recurring::{self, ScheduleInput};
use tandem::models::{DebtType, Frequency};

struct Seeded {
    expense: i64,
    debt: i64,
    schedule: i64,
}

fn seed(f: &mut Fixture) -> Seeded {
    let n = RecordingNotifier::default();
    let (alice, bob) = (f.alice, f.bob);
    let expense = expenses::create_expense(
        &mut f.conn,
        &n,
        alice,
        ExpenseInput {
            description: "Groceries run".into(),
            amount: dec("40"),
            category_id: f.groceries,
            split: [(alice, dec("20")), (bob, dec("20"))].into_iter().collect(),
            ..Default::default()
        },
        at(2025, 3, 1),
    )
    .unwrap()
    .id;
    let debt = debts::create_debt(
        &f.conn,
        alice,
        DebtInput {
            creditor_name: "Store card".into(),
            description: None,
            debt_type: DebtType::CreditCard,
            original_amount: dec("300"),
            start_date: None,
            due_date: None,
            billing_day: Some(25),
            payment_due_day: Some(5),
            interest_rate: None,
        },
        at(2025, 3, 1),
    )
    .unwrap()
    .id;
    let schedule = recurring::create_schedule(
        &f.conn,
        bob,
        ScheduleInput {
            description: "Gym".into(),
            amount: dec("30"),
            category_id: f.fun,
            frequency: Frequency::Monthly,
            execution_day: None,
            start_date: ymd(2025, 3, 1),
            end_date: None,
            shared: false,
            notes: None,
        },
        at(2025, 3, 1),
    )
    .unwrap()
    .id;
    Seeded {
        expense,
        debt,
        schedule,
    }
}

fn kinds(f: &Fixture) -> Vec<&'static str> {
    doctor::scan(&f.conn)
        .unwrap()
        .into_iter()
        .map(|(k, _)| k)
        .collect()
}

#[test]
fn healthy_ledger_has_no_issues() {
    let mut f = fixture();
    seed(&mut f);
    assert!(kinds(&f).is_empty());
}

#[test]
fn split_mismatch_is_reported_for_live_expenses_only() {
    let mut f = fixture();
    let s = seed(&mut f);
    f.conn
        .execute("UPDATE expenses SET amount='45' WHERE id=?1", params![s.expense])
        .unwrap();
    assert_eq!(kinds(&f), vec!["split_sum_mismatch"]);

    expenses::delete_expense(&f.conn, s.expense, f.alice, at(2025, 3, 2)).unwrap();
    assert!(kinds(&f).is_empty());
}

#[test]
fn debt_inconsistencies_are_reported() {
    let mut f = fixture();
    let s = seed(&mut f);
    f.conn
        .execute(
            "UPDATE external_debts SET outstanding_balance='350' WHERE id=?1",
            params![s.debt],
        )
        .unwrap();
    assert_eq!(kinds(&f), vec!["debt_balance_out_of_range"]);

    f.conn
        .execute(
            "UPDATE external_debts SET outstanding_balance='0' WHERE id=?1",
            params![s.debt],
        )
        .unwrap();
    assert_eq!(kinds(&f), vec!["debt_status_mismatch"]);
}

#[test]
fn stuck_schedules_and_crowded_households_are_reported() {
    let mut f = fixture();
    let s = seed(&mut f);
    f.conn
        .execute(
            "UPDATE recurring_expenses SET next_execution=NULL WHERE id=?1",
            params![s.schedule],
        )
        .unwrap();
    f.conn
        .execute(
            "INSERT INTO household_members(household_id, user_id, position) VALUES (?1, ?2, 2)",
            params![f.household, f.carol],
        )
        .unwrap();
    let found = doctor::scan(&f.conn).unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(found[0].0, "schedule_without_next_run");
    assert_eq!(found[1].0, "household_too_large");
    assert!(found[1].1.contains("3 members"));
}

// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

mod common;

use common::{Fixture, RecordingNotifier, at, dec, fixture};
use tandem::cli;
use tandem::commands::exporter;
use tandem::commands::expenses::{self, ExpenseInput};
use tempfile::tempdir;

fn seed(f: &mut Fixture) {
    let n = RecordingNotifier::default();
    let (alice, bob) = (f.alice, f.bob);
    let later = ExpenseInput {
        description: "Dinner, with wine".into(),
        amount: dec("80"),
        category_id: f.fun,
        expense_date: Some(at(2025, 3, 9)),
        notes: Some("anniversary".into()),
        split: [(alice, dec("50")), (bob, dec("30"))].into_iter().collect(),
        ..Default::default()
    };
    expenses::create_expense(&mut f.conn, &n, alice, later, at(2025, 3, 9)).unwrap();
    let earlier = ExpenseInput {
        description: "Corner shop".into(),
        amount: dec("12.3"),
        category_id: f.groceries,
        expense_date: Some(at(2025, 3, 2)),
        ..Default::default()
    };
    expenses::create_expense(&mut f.conn, &n, alice, earlier, at(2025, 3, 2)).unwrap();
}

fn run_export(f: &Fixture, args: &[&str]) -> anyhow::Result<()> {
    let mut argv = vec!["tandem", "export", "expenses"];
    argv.extend_from_slice(args);
    let matches = cli::build_cli().get_matches_from(argv);
    match matches.subcommand() {
        Some(("export", export_m)) => exporter::handle(&f.conn, export_m),
        _ => panic!("no export subcommand"),
    }
}

#[test]
fn export_expenses_to_csv_oldest_first() {
    let mut f = fixture();
    seed(&mut f);
    let dir = tempdir().unwrap();
    let out_path = dir.path().join("expenses.csv");
    let out_str = out_path.to_string_lossy().to_string();
    let user = f.alice.to_string();

    run_export(&f, &["--format", "csv", "--out", &out_str, "--user", &user]).unwrap();

    let mut rdr = csv::Reader::from_path(&out_path).unwrap();
    let headers = rdr.headers().unwrap().clone();
    assert_eq!(
        headers.iter().collect::<Vec<_>>(),
        vec!["date", "description", "category", "amount", "owner", "shared", "notes"]
    );
    let rows: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 2);
    assert_eq!(&rows[0][0], "2025-03-02 12:00:00");
    assert_eq!(&rows[0][2], "Groceries");
    assert_eq!(&rows[0][3], "12.30");
    assert_eq!(&rows[0][5], "false");
    assert_eq!(&rows[1][1], "Dinner, with wine");
    assert_eq!(&rows[1][5], "true");
    assert_eq!(&rows[1][6], "anniversary");
}

#[test]
fn export_household_month_to_json_with_splits() {
    let mut f = fixture();
    seed(&mut f);
    let dir = tempdir().unwrap();
    let out_path = dir.path().join("march.json");
    let out_str = out_path.to_string_lossy().to_string();
    let user = f.bob.to_string();

    run_export(
        &f,
        &["--format", "JSON", "--out", &out_str, "--month", "2025-03", "-u", &user],
    )
    .unwrap();

    let parsed: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out_path).unwrap()).unwrap();
    let items = parsed.as_array().unwrap();
    // only the shared expense belongs to the household
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["category"], "Fun");
    assert_eq!(items[0]["amount"], "80.00");
    let splits = items[0]["splits"].as_array().unwrap();
    assert_eq!(splits.len(), 2);
    let bobs = splits
        .iter()
        .find(|s| s["user"] == serde_json::json!(f.bob))
        .unwrap();
    assert_eq!(bobs["amount"], "30.00");
    assert_eq!(bobs["kind"], "OWES");
}

#[test]
fn export_rejects_unknown_format() {
    let mut f = fixture();
    seed(&mut f);
    let dir = tempdir().unwrap();
    let out_path = dir.path().join("expenses.xml");
    let out_str = out_path.to_string_lossy().to_string();
    let user = f.alice.to_string();

    assert!(run_export(&f, &["--format", "xml", "--out", &out_str, "--user", &user]).is_err());
    assert!(!out_path.exists());
}

#[test]
fn write_expenses_counts_rows() {
    let mut f = fixture();
    seed(&mut f);
    let dir = tempdir().unwrap();
    let items = expenses::list_for_user(&f.conn, f.bob).unwrap();
    let n = exporter::write_expenses(&f.conn, &items, "csv", &dir.path().join("bob.csv")).unwrap();
    assert_eq!(n, 1);
}

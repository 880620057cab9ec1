// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

mod common;

use chrono::NaiveDate;
use common::{RecordingNotifier, at, dec, fixture, ymd};
use rusqlite::{Connection, params};
use tandem::commands::expenses;
use tandem::commands::recurring::{self, Outcome, ScheduleInput, ScheduleUpdate};
use tandem::error::LedgerError;
use tandem::models::{Frequency, RecurringSchedule};

fn schedule(
    conn: &Connection,
    owner: i64,
    category: i64,
    frequency: Frequency,
    start: NaiveDate,
    end: Option<NaiveDate>,
    shared: bool,
) -> RecurringSchedule {
    recurring::create_schedule(
        conn,
        owner,
        ScheduleInput {
            description: "Internet".into(),
            amount: dec("45.90"),
            category_id: category,
            frequency,
            execution_day: None,
            start_date: start,
            end_date: end,
            shared,
            notes: Some("fiber".into()),
        },
        at(2025, 1, 1),
    )
    .unwrap()
}

#[test]
fn first_run_is_one_period_after_start() {
    let f = fixture();
    let s = schedule(&f.conn, f.alice, f.rent, Frequency::Monthly, ymd(2025, 1, 15), None, false);
    assert_eq!(s.execution_day, 15);
    assert_eq!(s.next_execution, Some(ymd(2025, 2, 15)));
    assert!(s.active);
    assert_eq!(s.total_executed, 0);
}

#[test]
fn schedule_exhausts_past_its_end_date() {
    let mut f = fixture();
    let s = schedule(
        &f.conn,
        f.alice,
        f.rent,
        Frequency::Monthly,
        ymd(2025, 1, 15),
        Some(ymd(2025, 3, 1)),
        false,
    );
    let out = recurring::execute_schedule(&mut f.conn, s.id, f.alice, ymd(2025, 2, 15), at(2025, 2, 15))
        .unwrap();
    assert!(matches!(out, Outcome::Executed { .. }));

    let s = recurring::get_schedule(&f.conn, s.id, f.alice).unwrap();
    assert_eq!(s.last_executed, Some(ymd(2025, 2, 15)));
    assert_eq!(s.next_execution, None);
    assert!(!s.active);
    assert!(s.is_exhausted());
    assert_eq!(s.total_executed, 1);

    let err = recurring::toggle_active(&f.conn, s.id, f.alice).unwrap_err();
    assert!(matches!(err, LedgerError::BusinessRule(_)));
}

#[test]
fn end_date_in_the_past_retires_instead_of_recording() {
    let mut f = fixture();
    let s = schedule(
        &f.conn,
        f.alice,
        f.fun,
        Frequency::Daily,
        ymd(2025, 1, 1),
        Some(ymd(2025, 1, 10)),
        false,
    );
    let n = RecordingNotifier::default();
    let report = recurring::run_due_schedules(&mut f.conn, &n, ymd(2025, 1, 20), at(2025, 1, 20)).unwrap();
    assert_eq!((report.executed, report.expired), (0, 1));
    assert!(expenses::list_for_user(&f.conn, f.alice).unwrap().is_empty());
    assert!(recurring::get_schedule(&f.conn, s.id, f.alice).unwrap().is_exhausted());
    assert!(n.sent().is_empty());
}

#[test]
fn batch_records_due_schedules_once() {
    let mut f = fixture();
    let own = schedule(&f.conn, f.alice, f.rent, Frequency::Monthly, ymd(2025, 1, 15), None, false);
    let shared = schedule(&f.conn, f.alice, f.rent, Frequency::Weekly, ymd(2025, 2, 3), None, true);
    let bobs = schedule(&f.conn, f.bob, f.fun, Frequency::Monthly, ymd(2025, 1, 10), None, false);
    let later = schedule(&f.conn, f.bob, f.fun, Frequency::Monthly, ymd(2025, 2, 20), None, false);

    let n = RecordingNotifier::default();
    let report = recurring::run_due_schedules(&mut f.conn, &n, ymd(2025, 2, 16), at(2025, 2, 16)).unwrap();
    assert_eq!(report.executed, 3);
    assert_eq!(report.failed, 0);
    assert_eq!(report.total_amount, dec("137.70"));
    assert_eq!(report.per_owner[&f.alice].count, 2);
    assert_eq!(report.per_owner[&f.bob].amount, dec("45.90"));

    // one summary per owner
    assert_eq!(n.titles_for(f.alice).len(), 1);
    assert_eq!(n.titles_for(f.bob).len(), 1);

    let recorded = expenses::list_for_user(&f.conn, f.alice).unwrap();
    assert_eq!(recorded.len(), 2);
    assert!(recorded.iter().all(|e| e.description == "Internet (recurring)"));
    assert!(recorded.iter().all(|e| e.splits.is_empty()));
    assert_eq!(
        recorded.iter().filter(|e| e.household_id == Some(f.household)).count(),
        1
    );

    let own = recurring::get_schedule(&f.conn, own.id, f.alice).unwrap();
    assert_eq!(own.next_execution, Some(ymd(2025, 3, 15)));
    let shared = recurring::get_schedule(&f.conn, shared.id, f.alice).unwrap();
    assert_eq!(shared.next_execution, Some(ymd(2025, 2, 23)));
    let bobs = recurring::get_schedule(&f.conn, bobs.id, f.bob).unwrap();
    assert_eq!(bobs.next_execution, Some(ymd(2025, 3, 10)));
    let later = recurring::get_schedule(&f.conn, later.id, f.bob).unwrap();
    assert_eq!(later.total_executed, 0);

    // the same day again finds nothing due
    let again = recurring::run_due_schedules(&mut f.conn, &n, ymd(2025, 2, 16), at(2025, 2, 16)).unwrap();
    assert_eq!(again.executed, 0);
    assert_eq!(n.sent().len(), 2);
}

#[test]
fn missed_periods_collapse_into_one_run() {
    let mut f = fixture();
    let s = schedule(&f.conn, f.alice, f.rent, Frequency::Monthly, ymd(2025, 1, 15), None, false);
    let n = RecordingNotifier::default();
    let report = recurring::run_due_schedules(&mut f.conn, &n, ymd(2025, 5, 20), at(2025, 5, 20)).unwrap();
    assert_eq!(report.executed, 1);
    let s = recurring::get_schedule(&f.conn, s.id, f.alice).unwrap();
    assert_eq!(s.total_executed, 1);
    assert_eq!(s.next_execution, Some(ymd(2025, 6, 15)));
}

#[test]
fn one_failing_schedule_does_not_stop_the_batch() {
    let mut f = fixture();
    let broken = schedule(&f.conn, f.alice, f.fun, Frequency::Monthly, ymd(2025, 1, 5), None, false);
    let fine = schedule(&f.conn, f.alice, f.rent, Frequency::Monthly, ymd(2025, 1, 6), None, false);
    // orphan the first schedule's category so its expense insert is rejected
    f.conn
        .execute_batch("PRAGMA foreign_keys=OFF;")
        .unwrap();
    f.conn
        .execute("DELETE FROM categories WHERE id=?1", params![f.fun])
        .unwrap();
    f.conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();

    let n = RecordingNotifier::default();
    let report = recurring::run_due_schedules(&mut f.conn, &n, ymd(2025, 2, 10), at(2025, 2, 10)).unwrap();
    assert_eq!((report.executed, report.failed), (1, 1));

    let broken = recurring::get_schedule(&f.conn, broken.id, f.alice).unwrap();
    assert_eq!(broken.total_executed, 0);
    assert_eq!(broken.next_execution, Some(ymd(2025, 2, 5)));
    let fine = recurring::get_schedule(&f.conn, fine.id, f.alice).unwrap();
    assert_eq!(fine.total_executed, 1);
}

#[test]
fn paused_schedules_are_skipped_and_not_run_manually() {
    let mut f = fixture();
    let s = schedule(&f.conn, f.alice, f.rent, Frequency::Weekly, ymd(2025, 3, 3), None, false);
    let paused = recurring::toggle_active(&f.conn, s.id, f.alice).unwrap();
    assert!(!paused.active);
    assert!(!paused.is_exhausted());

    let n = RecordingNotifier::default();
    let report = recurring::run_due_schedules(&mut f.conn, &n, ymd(2025, 4, 1), at(2025, 4, 1)).unwrap();
    assert_eq!(report.executed, 0);
    let err = recurring::execute_schedule(&mut f.conn, s.id, f.alice, ymd(2025, 4, 1), at(2025, 4, 1))
        .unwrap_err();
    assert!(matches!(err, LedgerError::BusinessRule(_)));

    assert!(recurring::toggle_active(&f.conn, s.id, f.alice).unwrap().active);
}

#[test]
fn owner_only_access() {
    let mut f = fixture();
    let s = schedule(&f.conn, f.alice, f.rent, Frequency::Weekly, ymd(2025, 3, 3), None, false);
    assert!(matches!(
        recurring::get_schedule(&f.conn, s.id, f.bob),
        Err(LedgerError::Forbidden(_))
    ));
    assert!(matches!(
        recurring::execute_schedule(&mut f.conn, s.id, f.bob, ymd(2025, 3, 3), at(2025, 3, 3)),
        Err(LedgerError::Forbidden(_))
    ));
    assert!(matches!(
        recurring::delete_schedule(&f.conn, s.id, f.bob),
        Err(LedgerError::Forbidden(_))
    ));
    recurring::delete_schedule(&f.conn, s.id, f.alice).unwrap();
    assert!(matches!(
        recurring::get_schedule(&f.conn, s.id, f.alice),
        Err(LedgerError::NotFound(_))
    ));
}

#[test]
fn update_replans_from_today() {
    let f = fixture();
    let s = schedule(&f.conn, f.alice, f.rent, Frequency::Monthly, ymd(2025, 1, 15), None, false);
    let patch = ScheduleUpdate {
        frequency: Some(Frequency::Quarterly),
        execution_day: Some(31),
        amount: Some(dec("50")),
        ..Default::default()
    };
    let s = recurring::update_schedule(&f.conn, s.id, f.alice, patch, ymd(2025, 3, 10)).unwrap();
    assert_eq!(s.amount, dec("50"));
    assert_eq!(s.next_execution, Some(ymd(2025, 6, 30)));

    let bad = ScheduleUpdate {
        execution_day: Some(0),
        ..Default::default()
    };
    assert!(matches!(
        recurring::update_schedule(&f.conn, s.id, f.alice, bad, ymd(2025, 3, 10)),
        Err(LedgerError::Validation(_))
    ));
}

#[test]
fn listing_upcoming_and_counting() {
    let f = fixture();
    let soon = schedule(&f.conn, f.alice, f.rent, Frequency::Weekly, ymd(2025, 3, 3), None, false);
    let far = schedule(&f.conn, f.alice, f.rent, Frequency::Annual, ymd(2025, 3, 3), None, false);
    let paused = schedule(&f.conn, f.alice, f.rent, Frequency::Daily, ymd(2025, 3, 3), None, false);
    recurring::toggle_active(&f.conn, paused.id, f.alice).unwrap();

    let all = recurring::list_schedules(&f.conn, f.alice, false).unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].id, paused.id);
    assert_eq!(recurring::list_schedules(&f.conn, f.alice, true).unwrap().len(), 2);

    let upcoming = recurring::upcoming(&f.conn, f.alice, ymd(2025, 3, 5), 7).unwrap();
    assert_eq!(upcoming.iter().map(|s| s.id).collect::<Vec<_>>(), vec![soon.id]);
    assert_eq!(recurring::count_active(&f.conn, f.alice).unwrap(), 2);
    assert_eq!(recurring::days_until_next(&far, ymd(2025, 3, 3)), Some(365));
}

#[test]
fn schedule_amounts_are_whole_cents() {
    let f = fixture();
    let err = recurring::create_schedule(
        &f.conn,
        f.alice,
        ScheduleInput {
            description: "Streaming".into(),
            amount: dec("9.999"),
            category_id: f.fun,
            frequency: Frequency::Monthly,
            execution_day: None,
            start_date: ymd(2025, 1, 1),
            end_date: None,
            shared: false,
            notes: None,
        },
        at(2025, 1, 1),
    )
    .unwrap_err();
    assert_eq!(err.fields()[0].field, "amount");
    assert_eq!(recurring::count_active(&f.conn, f.alice).unwrap(), 0);

    let s = schedule(&f.conn, f.alice, f.fun, Frequency::Monthly, ymd(2025, 1, 1), None, false);
    let patch = ScheduleUpdate {
        amount: Some(dec("1.001")),
        ..Default::default()
    };
    let err = recurring::update_schedule(&f.conn, s.id, f.alice, patch, ymd(2025, 1, 2)).unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
    assert_eq!(recurring::get_schedule(&f.conn, s.id, f.alice).unwrap().amount, dec("45.90"));
}

#[test]
fn upcoming_window_is_bounded() {
    let f = fixture();
    schedule(&f.conn, f.alice, f.rent, Frequency::Annual, ymd(2025, 3, 3), None, false);
    let today = ymd(2025, 3, 5);
    for days in [i64::MAX, -1, 3651] {
        let err = recurring::upcoming(&f.conn, f.alice, today, days).unwrap_err();
        assert_eq!(err.fields()[0].field, "within");
    }
    assert_eq!(recurring::upcoming(&f.conn, f.alice, today, 3650).unwrap().len(), 1);
}

#[test]
fn clearing_the_end_date_revives_an_exhausted_schedule() {
    let mut f = fixture();
    let s = schedule(
        &f.conn,
        f.alice,
        f.rent,
        Frequency::Monthly,
        ymd(2025, 1, 15),
        Some(ymd(2025, 3, 1)),
        false,
    );
    recurring::execute_schedule(&mut f.conn, s.id, f.alice, ymd(2025, 2, 15), at(2025, 2, 15))
        .unwrap();
    assert!(recurring::get_schedule(&f.conn, s.id, f.alice).unwrap().is_exhausted());

    // leaving the end date out of the patch keeps it
    let keep = ScheduleUpdate {
        notes: Some("still ending".into()),
        ..Default::default()
    };
    let s = recurring::update_schedule(&f.conn, s.id, f.alice, keep, ymd(2025, 3, 10)).unwrap();
    assert_eq!(s.end_date, Some(ymd(2025, 3, 1)));
    assert!(s.is_exhausted());

    let clear = ScheduleUpdate {
        end_date: Some(None),
        ..Default::default()
    };
    let s = recurring::update_schedule(&f.conn, s.id, f.alice, clear, ymd(2025, 3, 10)).unwrap();
    assert_eq!(s.end_date, None);
    assert!(s.active);
    assert_eq!(s.next_execution, Some(ymd(2025, 4, 15)));

    let reset = ScheduleUpdate {
        end_date: Some(Some(ymd(2025, 12, 31))),
        ..Default::default()
    };
    let s = recurring::update_schedule(&f.conn, s.id, f.alice, reset, ymd(2025, 3, 10)).unwrap();
    assert_eq!(s.end_date, Some(ymd(2025, 12, 31)));
}

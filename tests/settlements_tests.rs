// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

mod common;

use chrono::Duration;
use common::{at, dec, fixture};
use rusqlite::params;
use tandem::commands::settlements::{self, PaymentInput};
use tandem::commands::users;
use tandem::error::LedgerError;
use tandem::models::{PaymentMethod, PaymentStatus};
use tandem::utils::{SETTLEMENT_CANCEL_DAYS, set_setting};

fn input(payee_id: i64, amount: &str) -> PaymentInput {
    PaymentInput {
        payee_id,
        amount: dec(amount),
        concept: Some("rent share".into()),
        method: None,
        payment_date: None,
    }
}

#[test]
fn registration_defaults_to_cash_now() {
    let mut f = fixture();
    let p = settlements::register_payment(&mut f.conn, f.bob, input(f.alice, "75"), at(2025, 4, 1))
        .unwrap();
    assert_eq!(p.method, PaymentMethod::Cash);
    assert_eq!(p.status, PaymentStatus::Completed);
    assert_eq!(p.payment_date, at(2025, 4, 1));
    assert_eq!(p.household_id, f.household);

    let listed = settlements::list_for_user_household(&f.conn, f.alice).unwrap();
    assert_eq!(listed.len(), 1);
    assert!(settlements::list_for_user_household(&f.conn, f.carol).unwrap().is_empty());
}

#[test]
fn payer_and_payee_must_be_distinct_household_members() {
    let mut f = fixture();
    let err = settlements::register_payment(&mut f.conn, f.bob, input(f.bob, "10"), at(2025, 4, 1))
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));

    let err = settlements::register_payment(&mut f.conn, f.bob, input(f.carol, "10"), at(2025, 4, 1))
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));

    let err = settlements::register_payment(&mut f.conn, f.bob, input(f.alice, "0"), at(2025, 4, 1))
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
}

#[test]
fn cancellation_rules() {
    let mut f = fixture();
    let p = settlements::register_payment(&mut f.conn, f.bob, input(f.alice, "20"), at(2025, 4, 1))
        .unwrap();

    let err = settlements::cancel_payment(&mut f.conn, p.id, f.carol, at(2025, 4, 2)).unwrap_err();
    assert!(matches!(err, LedgerError::Forbidden(_)));

    let cancelled = settlements::cancel_payment(&mut f.conn, p.id, f.alice, at(2025, 4, 2)).unwrap();
    assert_eq!(cancelled.status, PaymentStatus::Cancelled);

    let err = settlements::cancel_payment(&mut f.conn, p.id, f.bob, at(2025, 4, 2)).unwrap_err();
    assert!(matches!(err, LedgerError::BusinessRule(_)));

    assert!(matches!(
        settlements::cancel_payment(&mut f.conn, 999, f.bob, at(2025, 4, 2)),
        Err(LedgerError::NotFound(_))
    ));
}

#[test]
fn cancellation_window_is_seven_days() {
    let mut f = fixture();
    let paid_at = at(2025, 4, 1);
    let p1 = settlements::register_payment(&mut f.conn, f.bob, input(f.alice, "5"), paid_at).unwrap();
    let p2 = settlements::register_payment(&mut f.conn, f.bob, input(f.alice, "5"), paid_at).unwrap();

    let late = paid_at + Duration::days(7) + Duration::minutes(1);
    let err = settlements::cancel_payment(&mut f.conn, p1.id, f.bob, late).unwrap_err();
    assert!(matches!(err, LedgerError::BusinessRule(_)));

    let edge = paid_at + Duration::days(7);
    assert!(settlements::cancel_payment(&mut f.conn, p2.id, f.bob, edge).is_ok());

    set_setting(&f.conn, SETTLEMENT_CANCEL_DAYS, "30").unwrap();
    assert!(settlements::cancel_payment(&mut f.conn, p1.id, f.bob, late).is_ok());
}

#[test]
fn fetching_another_households_payment_is_forbidden() {
    let mut f = fixture();
    let p = settlements::register_payment(&mut f.conn, f.alice, input(f.bob, "8"), at(2025, 4, 1))
        .unwrap();
    assert_eq!(settlements::get_payment(&f.conn, p.id, f.bob).unwrap().id, p.id);

    let dave = users::create_user(&f.conn, "Dave").unwrap().id;
    users::create_household(&f.conn, "Other", f.carol).unwrap();
    let err = settlements::get_payment(&f.conn, p.id, dave).unwrap_err();
    assert!(matches!(err, LedgerError::Forbidden(_)));
    let err = settlements::get_payment(&f.conn, p.id, f.carol).unwrap_err();
    assert!(matches!(err, LedgerError::Forbidden(_)));
}

#[test]
fn payment_amount_is_whole_cents() {
    let mut f = fixture();
    let err = settlements::register_payment(&mut f.conn, f.bob, input(f.alice, "12.345"), at(2025, 4, 1))
        .unwrap_err();
    assert_eq!(err.fields()[0].field, "amount");
    assert!(settlements::list_for_user_household(&f.conn, f.bob).unwrap().is_empty());

    let p = settlements::register_payment(&mut f.conn, f.bob, input(f.alice, "12.30"), at(2025, 4, 1))
        .unwrap();
    assert_eq!(p.amount, dec("12.3"));
}

#[test]
fn cancellation_window_setting_is_bounded() {
    let mut f = fixture();
    let err = set_setting(&f.conn, SETTLEMENT_CANCEL_DAYS, "9223372036854775807").unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));

    let p = settlements::register_payment(&mut f.conn, f.bob, input(f.alice, "5"), at(2025, 4, 1))
        .unwrap();
    f.conn
        .execute(
            "INSERT INTO settings(key, value) VALUES(?1, '9223372036854775807')",
            params![SETTLEMENT_CANCEL_DAYS],
        )
        .unwrap();
    let err = settlements::cancel_payment(&mut f.conn, p.id, f.bob, at(2025, 4, 2)).unwrap_err();
    assert!(err.is_internal());
    let p = settlements::get_payment(&f.conn, p.id, f.bob).unwrap();
    assert_eq!(p.status, PaymentStatus::Completed);
}

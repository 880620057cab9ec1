// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

#![allow(dead_code)]

use std::sync::Mutex;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use rust_decimal::Decimal;
use tandem::commands::{categories, users};
use tandem::db;
use tandem::notify::{Notifier, NotifyError};

pub struct Fixture {
    pub conn: Connection,
    pub alice: i64,
    pub bob: i64,
    /// Has no household.
    pub carol: i64,
    pub household: i64,
    pub groceries: i64,
    pub rent: i64,
    pub fun: i64,
}

/// Alice founds the household and Bob joins it; Carol stays alone.
pub fn fixture() -> Fixture {
    let conn = db::open_in_memory().unwrap();
    let alice = users::create_user(&conn, "Alice").unwrap().id;
    let bob = users::create_user(&conn, "Bob").unwrap().id;
    let carol = users::create_user(&conn, "Carol").unwrap().id;
    let household = users::create_household(&conn, "Home", alice).unwrap().id;
    users::join_household(&conn, household, bob).unwrap();
    let groceries = categories::add_category(&conn, "Groceries", Some("cart")).unwrap().id;
    let rent = categories::add_category(&conn, "Rent", None).unwrap().id;
    let fun = categories::add_category(&conn, "Fun", None).unwrap().id;
    Fixture {
        conn,
        alice,
        bob,
        carol,
        household,
        groceries,
        rent,
        fun,
    }
}

pub fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

pub fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Noon on the given day.
pub fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
    ymd(y, m, d).and_hms_opt(12, 0, 0).unwrap()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sent {
    pub user_id: i64,
    pub title: String,
    pub body: String,
    pub link: String,
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Sent>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn titles_for(&self, user_id: i64) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|s| s.user_id == user_id)
            .map(|s| s.title)
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, user_id: i64, title: &str, body: &str, link: &str) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(Sent {
            user_id,
            title: title.to_string(),
            body: body.to_string(),
            link: link.to_string(),
        });
        Ok(())
    }
}

/// Rejects everything.
pub struct FailingNotifier;

impl Notifier for FailingNotifier {
    fn notify(&self, user_id: i64, _: &str, _: &str, _: &str) -> Result<(), NotifyError> {
        Err(NotifyError {
            user_id,
            reason: "sink offline".into(),
        })
    }
}

// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Outbound notifications (budget alerts, large shared expenses, recurring
//! run summaries, debt reminders).
//!
//! Delivery is best-effort: callers go through [`notify_quietly`], which logs
//! and drops failures so a broken sink never undoes a committed write.

use thiserror::Error;

#[derive(Debug, Error)]
#[error("notification to user {user_id} failed: {reason}")]
pub struct NotifyError {
    pub user_id: i64,
    pub reason: String,
}

pub trait Notifier {
    fn notify(&self, user_id: i64, title: &str, body: &str, link: &str) -> Result<(), NotifyError>;
}

/// Sink used by the binary: every notification becomes a log event.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, user_id: i64, title: &str, body: &str, link: &str) -> Result<(), NotifyError> {
        tracing::info!(user_id, title, body, link, "notification");
        Ok(())
    }
}

/// Send and forget. Returns whether the sink accepted it.
pub fn notify_quietly(
    notifier: &dyn Notifier,
    user_id: i64,
    title: &str,
    body: &str,
    link: &str,
) -> bool {
    match notifier.notify(user_id, title, body, link) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, user_id, title, "notification dropped");
            false
        }
    }
}

pub mod links {
    pub const BUDGETS: &str = "/budgets";
    pub const EXPENSES: &str = "/expenses";
    pub const RECURRING: &str = "/recurring-expenses";
    pub const DEBTS: &str = "/external-debts";
}

// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Error type shared by every ledger operation.
//!
//! Callers can tell the kinds apart: bad input ([`Validation`]), unknown or
//! foreign ids ([`NotFound`]), acting on someone else's records
//! ([`Forbidden`]), rejected state transitions ([`BusinessRule`]) and lost
//! races ([`Conflict`]). Storage failures render as a generic message; the
//! underlying detail only goes to the log.
//!
//! [`Validation`]: LedgerError::Validation
//! [`NotFound`]: LedgerError::NotFound
//! [`Forbidden`]: LedgerError::Forbidden
//! [`BusinessRule`]: LedgerError::BusinessRule
//! [`Conflict`]: LedgerError::Conflict

use std::fmt;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::is_money;

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// One rejected input field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid input: {}", join_fields(.0))]
    Validation(Vec<FieldError>),
    #[error("{0} not found")]
    NotFound(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("{0}")]
    BusinessRule(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("internal storage error")]
    Database(#[from] rusqlite::Error),
    #[error("internal storage error")]
    Corrupt(String),
}

impl LedgerError {
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        LedgerError::Validation(vec![FieldError::new(field, message)])
    }

    /// True for failures whose detail must not reach the caller.
    pub fn is_internal(&self) -> bool {
        matches!(self, LedgerError::Database(_) | LedgerError::Corrupt(_))
    }

    /// Field errors carried by a validation failure, empty otherwise.
    pub fn fields(&self) -> &[FieldError] {
        match self {
            LedgerError::Validation(fields) => fields,
            _ => &[],
        }
    }
}

fn join_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Accumulates field errors so one call reports every bad field at once.
#[derive(Debug, Default)]
pub struct Checks(Vec<FieldError>);

impl Checks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(&mut self, ok: bool, field: &'static str, message: &str) -> &mut Self {
        if !ok {
            self.0.push(FieldError::new(field, message));
        }
        self
    }

    /// Money fields carry at most two decimal places.
    pub fn money(&mut self, field: &'static str, amount: Decimal) -> &mut Self {
        self.require(is_money(amount), field, "at most 2 decimal places")
    }

    pub fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.push(FieldError::new(field, message));
    }

    pub fn finish(self) -> LedgerResult<()> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(LedgerError::Validation(self.0))
        }
    }
}

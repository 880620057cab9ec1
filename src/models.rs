// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    kind: &'static str,
    value: String,
}

/// Enums stored as upper-case TEXT columns.
macro_rules! text_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_uppercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

text_enum!(SplitKind, "split kind", {
    Owes => "OWES",
    Paid => "PAID",
});

text_enum!(DebtStatus, "debt status", {
    Active => "ACTIVE",
    Paid => "PAID",
    Cancelled => "CANCELLED",
});

text_enum!(DebtType, "debt type", {
    CreditCard => "CREDIT_CARD",
    PersonalLoan => "PERSONAL_LOAN",
    Mortgage => "MORTGAGE",
    VehicleLoan => "VEHICLE_LOAN",
    Other => "OTHER",
});

text_enum!(PaymentMethod, "payment method", {
    Cash => "CASH",
    Transfer => "TRANSFER",
    Card => "CARD",
    Other => "OTHER",
});

text_enum!(PaymentStatus, "payment status", {
    Completed => "COMPLETED",
    Cancelled => "CANCELLED",
});

text_enum!(BudgetPeriod, "budget period", {
    Weekly => "WEEKLY",
    Monthly => "MONTHLY",
    Annual => "ANNUAL",
});

text_enum!(BudgetState, "budget state", {
    Ok => "OK",
    Alert => "ALERTA",
    Exceeded => "EXCEDIDO",
});

text_enum!(Frequency, "frequency", {
    Daily => "DAILY",
    Weekly => "WEEKLY",
    Biweekly => "BIWEEKLY",
    Monthly => "MONTHLY",
    Bimonthly => "BIMONTHLY",
    Quarterly => "QUARTERLY",
    Semiannual => "SEMIANNUAL",
    Annual => "ANNUAL",
});

impl Frequency {
    pub fn describe(&self) -> &'static str {
        match self {
            Frequency::Daily => "every day",
            Frequency::Weekly => "every week",
            Frequency::Biweekly => "every two weeks",
            Frequency::Monthly => "every month",
            Frequency::Bimonthly => "every two months",
            Frequency::Quarterly => "every three months",
            Frequency::Semiannual => "every six months",
            Frequency::Annual => "every year",
        }
    }

    /// Calendar-month step for month-based frequencies.
    fn months(&self) -> Option<u32> {
        match self {
            Frequency::Daily | Frequency::Weekly | Frequency::Biweekly => None,
            Frequency::Monthly => Some(1),
            Frequency::Bimonthly => Some(2),
            Frequency::Quarterly => Some(3),
            Frequency::Semiannual => Some(6),
            Frequency::Annual => Some(12),
        }
    }
}

pub const MONEY_SCALE: u32 = 2;

/// True when the value fits in cents. Trailing zeros do not count.
pub fn is_money(d: Decimal) -> bool {
    d.normalize().scale() <= MONEY_SCALE
}

/// Round a money value for output: 2 dp, halves away from zero.
pub fn round_money(d: Decimal) -> Decimal {
    d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Household {
    pub id: i64,
    pub name: String,
    /// Member ids in join order; `members[0]` and `members[1]` define the pair.
    pub members: Vec<i64>,
}

impl Household {
    pub fn is_member(&self, user_id: i64) -> bool {
        self.members.contains(&user_id)
    }

    /// The other member of a two-person household.
    pub fn partner_of(&self, user_id: i64) -> Option<i64> {
        self.members.iter().copied().find(|m| *m != user_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpenseSplit {
    pub id: i64,
    pub expense_id: i64,
    pub user_id: i64,
    pub amount: Decimal,
    pub kind: SplitKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expense {
    pub id: i64,
    pub description: String,
    pub amount: Decimal,
    pub original_amount: Decimal,
    pub notes: Option<String>,
    pub photo_ref: Option<String>,
    pub owner_id: i64,
    pub household_id: Option<i64>,
    pub category_id: i64,
    pub expense_date: NaiveDateTime,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub deleted_at: Option<NaiveDateTime>,
    pub splits: Vec<ExpenseSplit>,
}

impl Expense {
    pub fn is_shared(&self) -> bool {
        !self.splits.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalDebt {
    pub id: i64,
    pub owner_id: i64,
    pub creditor_name: String,
    pub description: Option<String>,
    pub debt_type: DebtType,
    pub original_amount: Decimal,
    pub outstanding_balance: Decimal,
    pub status: DebtStatus,
    pub start_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub billing_day: Option<u32>,
    pub payment_due_day: Option<u32>,
    pub interest_rate: Option<Decimal>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl ExternalDebt {
    /// Percent repaid, rounded half-up; a zero-amount debt counts as fully repaid.
    pub fn progress(&self) -> u32 {
        if self.original_amount.is_zero() {
            return 100;
        }
        let paid = self.original_amount - self.outstanding_balance;
        let pct = (paid * Decimal::ONE_HUNDRED / self.original_amount)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        pct.to_u32().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebtInstallment {
    pub id: i64,
    pub debt_id: i64,
    pub amount: Decimal,
    pub payment_date: NaiveDate,
    pub method: PaymentMethod,
    pub receipt_ref: Option<String>,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementPayment {
    pub id: i64,
    pub payer_id: i64,
    pub payee_id: i64,
    pub household_id: i64,
    pub amount: Decimal,
    pub concept: Option<String>,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub payment_date: NaiveDateTime,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Budget {
    pub id: i64,
    pub owner_id: i64,
    /// `None` is a global budget over every category.
    pub category_id: Option<i64>,
    pub limit: Decimal,
    pub period: BudgetPeriod,
    pub active: bool,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringSchedule {
    pub id: i64,
    pub owner_id: i64,
    pub household_id: Option<i64>,
    pub description: String,
    pub amount: Decimal,
    pub category_id: i64,
    pub frequency: Frequency,
    pub execution_day: u32,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub last_executed: Option<NaiveDate>,
    pub next_execution: Option<NaiveDate>,
    pub active: bool,
    pub shared: bool,
    pub notes: Option<String>,
    pub total_executed: u32,
    pub created_at: NaiveDateTime,
}

impl RecurringSchedule {
    /// Next run after `from`, or `None` once that would fall past `end_date`.
    ///
    /// Month-based frequencies land on `execution_day`, clamped to the last
    /// day of the resulting month.
    pub fn next_execution_date(&self, from: NaiveDate) -> Option<NaiveDate> {
        let next = match self.frequency {
            Frequency::Daily => from + Duration::days(1),
            Frequency::Weekly => from + Duration::weeks(1),
            Frequency::Biweekly => from + Duration::weeks(2),
            other => {
                let months = other.months().unwrap_or(1);
                let shifted = from.checked_add_months(Months::new(months))?;
                let last = days_in_month(shifted.year(), shifted.month());
                shifted.with_day(self.execution_day.clamp(1, last))?
            }
        };
        match self.end_date {
            Some(end) if next > end => None,
            _ => Some(next),
        }
    }

    pub fn is_due(&self, today: NaiveDate) -> bool {
        self.active && self.next_execution.is_some_and(|next| today >= next)
    }

    /// Exhausted: ran past its end date and can never fire again.
    pub fn is_exhausted(&self) -> bool {
        !self.active && self.next_execution.is_none()
    }
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    let first = NaiveDate::from_ymd_opt(year, month, 1);
    let next = first.and_then(|d| d.checked_add_months(Months::new(1)));
    match (first, next) {
        (Some(a), Some(b)) => (b - a).num_days() as u32,
        _ => 31,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule(frequency: Frequency, day: u32, end: Option<NaiveDate>) -> RecurringSchedule {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        RecurringSchedule {
            id: 1,
            owner_id: 1,
            household_id: None,
            description: "Rent".into(),
            amount: Decimal::new(1000, 0),
            category_id: 1,
            frequency,
            execution_day: day,
            start_date: start,
            end_date: end,
            last_executed: None,
            next_execution: Some(start),
            active: true,
            shared: false,
            notes: None,
            total_executed: 0,
            created_at: start.and_hms_opt(0, 0, 0).unwrap(),
        }
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn monthly_day_31_clamps_to_end_of_february() {
        let s = schedule(Frequency::Monthly, 31, None);
        assert_eq!(s.next_execution_date(ymd(2025, 1, 31)), Some(ymd(2025, 2, 28)));
        assert_eq!(s.next_execution_date(ymd(2024, 1, 31)), Some(ymd(2024, 2, 29)));
        // day-of-month recovers once the month is long enough again
        assert_eq!(s.next_execution_date(ymd(2025, 2, 28)), Some(ymd(2025, 3, 31)));
    }

    #[test]
    fn day_based_frequencies_step_in_days() {
        let from = ymd(2025, 3, 10);
        assert_eq!(schedule(Frequency::Daily, 1, None).next_execution_date(from), Some(ymd(2025, 3, 11)));
        assert_eq!(schedule(Frequency::Weekly, 1, None).next_execution_date(from), Some(ymd(2025, 3, 17)));
        assert_eq!(schedule(Frequency::Biweekly, 1, None).next_execution_date(from), Some(ymd(2025, 3, 24)));
    }

    #[test]
    fn long_frequencies_use_execution_day() {
        let from = ymd(2025, 1, 5);
        assert_eq!(schedule(Frequency::Bimonthly, 20, None).next_execution_date(from), Some(ymd(2025, 3, 20)));
        assert_eq!(schedule(Frequency::Quarterly, 20, None).next_execution_date(from), Some(ymd(2025, 4, 20)));
        assert_eq!(schedule(Frequency::Semiannual, 31, None).next_execution_date(from), Some(ymd(2025, 7, 31)));
        assert_eq!(schedule(Frequency::Annual, 29, None).next_execution_date(ymd(2024, 2, 29)), Some(ymd(2025, 2, 28)));
    }

    #[test]
    fn next_past_end_date_is_none() {
        let s = schedule(Frequency::Monthly, 15, Some(ymd(2025, 3, 1)));
        assert_eq!(s.next_execution_date(ymd(2025, 2, 15)), None);
        assert_eq!(s.next_execution_date(ymd(2025, 1, 15)), Some(ymd(2025, 2, 15)));
    }

    #[test]
    fn due_requires_active_and_next_date() {
        let mut s = schedule(Frequency::Monthly, 1, None);
        s.next_execution = Some(ymd(2025, 2, 1));
        assert!(!s.is_due(ymd(2025, 1, 31)));
        assert!(s.is_due(ymd(2025, 2, 1)));
        assert!(s.is_due(ymd(2025, 5, 1)));
        s.active = false;
        assert!(!s.is_due(ymd(2025, 5, 1)));
        s.active = true;
        s.next_execution = None;
        assert!(!s.is_due(ymd(2025, 5, 1)));
    }

    #[test]
    fn debt_progress_rounds_half_up() {
        let now = ymd(2025, 1, 1).and_hms_opt(0, 0, 0).unwrap();
        let mut debt = ExternalDebt {
            id: 1,
            owner_id: 1,
            creditor_name: "Bank".into(),
            description: None,
            debt_type: DebtType::PersonalLoan,
            original_amount: Decimal::new(200, 0),
            outstanding_balance: Decimal::new(199, 0),
            status: DebtStatus::Active,
            start_date: now.date(),
            due_date: None,
            billing_day: None,
            payment_due_day: None,
            interest_rate: None,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(debt.progress(), 1); // 0.5% rounds up
        debt.outstanding_balance = Decimal::ZERO;
        assert_eq!(debt.progress(), 100);
        debt.original_amount = Decimal::ZERO;
        assert_eq!(debt.progress(), 100);
    }

    #[test]
    fn enums_parse_case_insensitively() {
        assert_eq!("paid".parse::<SplitKind>().unwrap(), SplitKind::Paid);
        assert_eq!(" vehicle_loan ".parse::<DebtType>().unwrap(), DebtType::VehicleLoan);
        assert_eq!(BudgetState::Alert.as_str(), "ALERTA");
        assert!("fortnightly".parse::<Frequency>().is_err());
    }
}

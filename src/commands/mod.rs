// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

pub mod users;
pub mod categories;
pub mod expenses;
pub mod settlements;
pub mod balance;
pub mod debts;
pub mod recurring;
pub mod budgets;
pub mod jobs;
pub mod exporter;
pub mod config;
pub mod doctor;

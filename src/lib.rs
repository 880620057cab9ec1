// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

pub mod cli;
pub mod db;
pub mod error;
pub mod models;
pub mod notify;
pub mod utils;
pub mod commands;

use std::sync::Once;

use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Installs the fmt subscriber once; `RUST_LOG` overrides the `warn` default.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    });
}

// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::cli::required_str;
use crate::utils::{SETTINGS, get_setting, pretty_table, set_setting};
use anyhow::{Result, bail};
use rusqlite::Connection;

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("get", sub)) => {
            let key = required_str(sub, "key")?;
            let Some((_, default)) = SETTINGS.iter().find(|(k, _)| *k == key) else {
                bail!("Unknown setting '{}'", key);
            };
            println!("{}", get_setting(conn, &key)?.unwrap_or(default.to_string()));
        }
        Some(("set", sub)) => {
            let key = required_str(sub, "key")?;
            let value = required_str(sub, "value")?;
            set_setting(conn, &key, &value)?;
            println!("{} = {}", key, value.trim());
        }
        Some(("list", _)) => {
            let mut data = Vec::new();
            for (key, default) in SETTINGS {
                let value = get_setting(conn, key)?;
                let source = if value.is_some() { "set" } else { "default" };
                data.push(vec![
                    key.to_string(),
                    value.unwrap_or(default.to_string()),
                    source.to_string(),
                ]);
            }
            println!("{}", pretty_table(&["Key", "Value", "Source"], data));
        }
        _ => {}
    }
    Ok(())
}

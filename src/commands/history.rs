// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

use crate::{
    commands::{Handle, HandledResult},
    config::Config,
    history::{History, HISTORY_FILE},
};

pub fn history(config: &Config) -> HandledResult<()> {
    let store = config.store();

    let entries = store.archive_entries().handle_err(|e| eprintln!("{e}"))?;
    println!("Archived masters:");
    if entries.is_empty() {
        println!("  (none)");
    }
    for entry in &entries {
        println!("  {}", entry.name);
    }

    let path = store.archive_dir().join(HISTORY_FILE);
    if !path.exists() {
        return Ok(());
    }
    let records = History::open(&path)
        .and_then(|history| history.records())
        .handle_err(|e| eprintln!("{e}"))?;

    println!("History:");
    for record in records {
        println!(
            "  {} {:<16} {} {}",
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            record.event.to_string(),
            record.obj_id,
            record.comment.unwrap_or_default()
        );
    }
    Ok(())
}

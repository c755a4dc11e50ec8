// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

use clap::Args;

use crate::{
    commands::{Handle, HandledResult},
    config::Config,
    session::unified_diff,
};

#[derive(Args, Debug, Clone)]
pub struct DiffArgs {
    /// File holding the prepared template
    file: String,
}

pub fn diff(config: &Config, args: &DiffArgs) -> HandledResult<()> {
    let store = config.store();
    let master = store.load_master().handle_err(|e| eprintln!("{e}"))?;
    let candidate = std::fs::read_to_string(&args.file)
        .handle_err(|e| eprintln!("Could not read '{}': {e}", args.file))?;

    if master == candidate {
        println!("No changes.");
    } else {
        print!(
            "{}",
            unified_diff(&master, &candidate, store.master_basename())
        );
    }
    Ok(())
}

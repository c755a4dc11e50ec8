// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

use clap::Args;

use crate::{
    commands::{Handle, HandledResult},
    config::Config,
};

#[derive(Args, Debug, Clone)]
pub struct ShowArgs {
    /// Show the configuration derived for NODE instead of the master
    #[arg(short, long)]
    node: Option<String>,
}

pub fn show(config: &Config, args: &ShowArgs) -> HandledResult<()> {
    let text = config
        .store()
        .active_config(args.node.as_deref())
        .handle_err(|e| eprintln!("{e}"))?;

    print!("{text}");
    Ok(())
}

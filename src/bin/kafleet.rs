// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

use clap::Parser;

use kafleet_lib::commands::{self, Cli};

/// The kafleet binary edits the master keepalived template and rolls it out to the cluster.
fn main() {
    let args = Cli::parse();

    let default_level = if args.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("KAFLEET_LOG", default_level))
        .init();

    match commands::main(&args) {
        Ok(code) => std::process::exit(code),
        Err(_) => std::process::exit(1),
    }
}

// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

use crate::{
    commands::{Handle, HandledResult},
    config::{Capabilities, Config},
};

pub fn check(config: &Config, capabilities: &Capabilities) -> HandledResult<()> {
    let nodes = config.nodeset().handle_err(|e| eprintln!("{e}"))?;

    let flag = |on: bool| if on { "yes" } else { "no" };

    println!("Master:            {}", config.store().master_path().display());
    println!("Nodes:             {}", nodes.join(","));
    println!("VRRP:              {}", flag(capabilities.vrrp));
    println!("LVS:               {}", flag(capabilities.lvs));
    println!("Config writable:   {}", flag(capabilities.config_dir_writable));
    println!("Live writable:     {}", flag(capabilities.live_config_writable));
    println!("Validator:         {}", flag(capabilities.validator));
    println!("Fleet transport:   {}", flag(capabilities.fleet));
    println!("Can commit:        {}", flag(capabilities.can_commit()));

    Ok(())
}

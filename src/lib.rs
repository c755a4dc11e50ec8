// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

pub mod commands;
pub mod config;
pub mod fleet;
pub mod history;
pub mod pipeline;
pub mod session;
pub mod store;
pub mod template;
pub mod test_env;
pub mod validator;

pub fn default_config_path() -> String {
    match std::env::var("KAFLEET_CONFIG") {
        Ok(conf) => conf,
        Err(_) => "/etc/kafleet/kafleet.conf".to_string(),
    }
}

/// The editor used for interactive edit sessions.
pub fn default_editor() -> String {
    match std::env::var("VISUAL").or_else(|_| std::env::var("EDITOR")) {
        Ok(editor) => editor,
        Err(_) => "vi".to_string(),
    }
}

/// Name of the local host, used as the origin that the other nodes pull the shared config
/// directory from.
pub fn local_hostname() -> String {
    match nix::unistd::gethostname() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(_) => "localhost".to_string(),
    }
}

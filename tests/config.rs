// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use kafleet_lib::config::*;

    #[test]
    fn defaults() {
        let config = Config::from_toml("nodes = [\"lb1\"]").unwrap();
        assert_eq!(config.master_basename, "keepalived.conf");
        assert_eq!(config.modes, vec![Mode::Vrrp]);
        assert_eq!(config.fleet.transport, Transport::Ssh);
        assert_eq!(config.fleet.stage_timeout(), Duration::from_secs(120));
        assert!(!config.auto_commit);
        assert!(config.validator.is_none());
    }

    #[test]
    fn full_file() {
        let config = Config::from_toml(
            r#"
config_dir = "/srv/lb/master"
master_basename = "lb.conf"
modes = ["vrrp", "lvs"]
nodes = ["lb[01-03]", "lb02", "edge1"]
validator = "/usr/local/bin/check-keepalived"
auto_commit = true

[fleet]
transport = "clush"
stage_timeout_secs = 30
reload_command = "service keepalived reload"
"#,
        )
        .unwrap();

        assert!(config.has_mode(Mode::Lvs));
        assert_eq!(config.fleet.transport, Transport::Clush);
        assert_eq!(config.fleet.stage_timeout(), Duration::from_secs(30));
        assert_eq!(config.fleet.reload_command, "service keepalived reload");
        assert_eq!(config.fleet.activate_command, "cp {node_config} {live_config}");
        assert_eq!(
            config.store().master_path().to_str(),
            Some("/srv/lb/master/lb.conf")
        );

        let mut nodes = config.nodeset().unwrap();
        nodes.sort();
        assert_eq!(nodes, vec!["edge1", "lb01", "lb02", "lb03"]);
    }

    #[test]
    fn empty_nodeset_is_an_error() {
        let config = Config::from_toml("").unwrap();
        assert!(matches!(config.nodeset(), Err(ConfigError::NoNodes)));
    }

    #[test]
    fn unknown_transport_is_rejected() {
        assert!(Config::from_toml("[fleet]\ntransport = \"telnet\"").is_err());
    }
}

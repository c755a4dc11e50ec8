// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

#[cfg(test)]
mod tests {
    use std::{fs, os::unix::fs::PermissionsExt};

    use chrono::{TimeZone, Utc};

    use kafleet_lib::{store::StoreError, test_env::*};

    #[test]
    fn ensure_layout_is_idempotent() {
        let env = TestEnvironment::new("store_layout");
        let store = env.store();
        store.ensure_layout().unwrap();
        store.ensure_layout().unwrap();
        assert!(store.archive_dir().is_dir());
    }

    #[test]
    fn ensure_layout_fails_on_file_in_the_way() {
        let env = TestEnvironment::new("store_layout_blocked");
        let store = env.store();
        fs::write(store.archive_dir(), "not a directory").unwrap();
        assert!(matches!(
            store.ensure_layout(),
            Err(StoreError::Layout { .. })
        ));
    }

    #[test]
    fn missing_master_reads_empty() {
        let env = TestEnvironment::new("store_missing_master");
        assert_eq!(env.store().load_master().unwrap(), "");
    }

    #[test]
    fn install_archives_previous_master() {
        let env = TestEnvironment::new("store_install");
        let store = env.store();
        store.ensure_layout().unwrap();

        // Nothing to archive on first install.
        assert_eq!(store.install_master("first\n").unwrap(), None);
        assert_eq!(env.read_master(), "first\n");

        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 12, 30, 5).unwrap();
        let entry = store.install_master_at("second\n", ts).unwrap().unwrap();
        assert_eq!(entry.name, "keepalived.conf_2024-03-09_12:30:05");
        assert_eq!(fs::read_to_string(&entry.path).unwrap(), "first\n");
        assert_eq!(env.read_master(), "second\n");
    }

    #[test]
    fn archive_collision_gets_counter() {
        let env = TestEnvironment::new("store_collision");
        let store = env.store();
        store.ensure_layout().unwrap();
        env.write_master("v1\n");

        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 12, 30, 5).unwrap();
        store.install_master_at("v2\n", ts).unwrap();
        store.install_master_at("v3\n", ts).unwrap();
        let third = store.install_master_at("v4\n", ts).unwrap().unwrap();
        assert_eq!(third.name, "keepalived.conf_2024-03-09_12:30:05.2");

        let entries = store.archive_entries().unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "keepalived.conf_2024-03-09_12:30:05",
                "keepalived.conf_2024-03-09_12:30:05.1",
                "keepalived.conf_2024-03-09_12:30:05.2",
            ]
        );
        let contents: Vec<String> = entries
            .iter()
            .map(|e| fs::read_to_string(&e.path).unwrap())
            .collect();
        assert_eq!(contents, vec!["v1\n", "v2\n", "v3\n"]);
        assert_eq!(env.read_master(), "v4\n");
    }

    #[test]
    fn node_configs_use_deterministic_names() {
        let env = TestEnvironment::new("store_node_configs");
        let store = env.store();
        store.ensure_layout().unwrap();

        let path = store.save_node_config("lb01", "text\n").unwrap();
        assert_eq!(path, env.config_dir().join("keepalived.conf_lb01"));
        assert_eq!(store.load_node_config("lb01").unwrap(), "text\n");
        assert_eq!(env.node_files(), vec!["keepalived.conf_lb01"]);
        assert!(matches!(
            store.load_node_config("lb02"),
            Err(StoreError::NotReadable { .. })
        ));
    }

    fn mode(path: &std::path::Path) -> u32 {
        fs::metadata(path).unwrap().permissions().mode() & 0o777
    }

    #[test]
    fn install_keeps_file_mode() {
        let env = TestEnvironment::new("store_mode");
        let store = env.store();
        store.ensure_layout().unwrap();
        env.write_master("a\n");
        fs::set_permissions(store.master_path(), fs::Permissions::from_mode(0o640)).unwrap();

        store.install_master("b\n").unwrap();
        assert_eq!(env.read_master(), "b\n");
        assert_eq!(mode(&store.master_path()), 0o640);

        // Files written for the first time are readable by everyone.
        let path = store.save_node_config("lb01", "text\n").unwrap();
        assert_eq!(mode(&path), 0o644);
        fs::set_permissions(&path, fs::Permissions::from_mode(0o664)).unwrap();
        store.save_node_config("lb01", "other\n").unwrap();
        assert_eq!(mode(&path), 0o664);
    }

    #[test]
    fn active_config_reads_master_or_node() {
        let env = TestEnvironment::new("store_active_config");
        let store = env.store();
        store.ensure_layout().unwrap();
        env.write_master("master\n");
        store.save_node_config("lb02", "derived\n").unwrap();

        assert_eq!(store.active_config(None).unwrap(), "master\n");
        assert_eq!(store.active_config(Some("lb02")).unwrap(), "derived\n");
        assert!(store.active_config(Some("lb03")).is_err());
    }
}

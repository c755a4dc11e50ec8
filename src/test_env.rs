// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

use std::{
    collections::HashMap,
    fs, io,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    sync::Mutex,
    time::Duration,
};

use crate::{
    fleet::{
        symmetric_buffers, CommandKind, Fleet, FleetCommand, NodeOutput, RemoteShell,
        SymmetricBuffer,
    },
    pipeline::{CommitPipeline, PipelineSettings},
    store::{ConfigStore, IgnoreEexist},
    validator::Validator,
};

pub const TEST_MASTER: &str = "keepalived.conf";

/// Given a relative `path` in the test directory, prepend the
/// full path to the test directory.
pub fn test_path(path: &str) -> String {
    std::env::var("CARGO_MANIFEST_DIR").unwrap() + "/tests/" + path
}

/// A TestEnvironment holds all the information needed to access a test's runtime state: a
/// "private" working directory which holds the config store used by the test.
///
/// All access to the test's state on the filesystem should be done via methods on TestEnvironment
/// rather than coded in the tests themselves.
pub struct TestEnvironment {
    /// The path to this test's private working directory.
    private_dir_path: PathBuf,
}

impl TestEnvironment {
    /// Set up an environment for a test named `test_id`.
    pub fn new(test_id: &str) -> Self {
        // Each test gets a "private" directory named after its test_id.
        let private_dir_path = PathBuf::from(test_path(&format!("test_output/{test_id}")));
        // Start by emptying out the test's private directory, so that files from a previous test
        // run don't impact this run:
        match fs::remove_dir_all(&private_dir_path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => panic!("Could not clean up test directory: {e}"),
        };

        fs::create_dir(test_path("test_output"))
            .ignore_eexist()
            .unwrap();
        fs::create_dir_all(private_dir_path.join("config")).unwrap();

        Self { private_dir_path }
    }

    pub fn private_dir(&self) -> &Path {
        &self.private_dir_path
    }

    pub fn config_dir(&self) -> PathBuf {
        self.private_dir_path.join("config")
    }

    pub fn store(&self) -> ConfigStore {
        ConfigStore::new(self.config_dir(), TEST_MASTER)
    }

    pub fn write_master(&self, text: &str) {
        fs::write(self.store().master_path(), text).unwrap();
    }

    pub fn read_master(&self) -> String {
        fs::read_to_string(self.store().master_path()).unwrap()
    }

    /// Names of the derived node files in the config directory, sorted.
    pub fn node_files(&self) -> Vec<String> {
        let prefix = format!("{TEST_MASTER}_");
        let mut names: Vec<String> = fs::read_dir(self.config_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(&prefix))
            .collect();
        names.sort();
        names
    }

    /// One of the validator scripts under `tests/validators/`.
    pub fn validator(&self, name: &str) -> Validator {
        let path = test_path(&format!("validators/{name}"));
        let mut perms = fs::metadata(&path)
            .unwrap_or_else(|e| panic!("missing validator '{path}': {e}"))
            .permissions();
        if perms.mode() & 0o111 != 0o111 {
            perms.set_mode(0o755);
            fs::set_permissions(&path, perms).unwrap();
        }
        Validator::new(path)
    }

    pub fn settings(&self, nodes: &[&str]) -> PipelineSettings {
        PipelineSettings {
            nodes: nodes.iter().map(|n| n.to_string()).collect(),
            stage_timeout: Duration::from_secs(5),
            push_command: "rsync -a {origin}:{config_dir}/ {config_dir}/".to_string(),
            activate_command: "cp {node_config} {live_config}".to_string(),
            reload_command: "systemctl reload keepalived".to_string(),
            live_config: "/etc/keepalived/keepalived.conf".to_string(),
            origin: "origin".to_string(),
        }
    }

    /// Build a pipeline over this environment's store, using the validator script `validator`.
    pub fn pipeline<F: Fleet>(
        &self,
        fleet: F,
        nodes: &[&str],
        validator: &str,
    ) -> CommitPipeline<F> {
        self.store().ensure_layout().unwrap();
        CommitPipeline::new(
            self.store(),
            self.validator(validator),
            fleet,
            self.settings(nodes),
        )
    }
}

/// A call made to a fake fleet or shell.
#[derive(Debug, Clone, PartialEq)]
pub struct FleetCall {
    pub kind: CommandKind,
    pub nodes: Vec<String>,
    /// The command as rendered for each node.
    pub commands: Vec<String>,
}

/// An in-memory `Fleet` whose behaviour is scripted by the test.
#[derive(Debug, Default)]
pub struct FakeFleet {
    unreachable: Vec<String>,
    failures: Vec<(CommandKind, String)>,
    hang: Option<CommandKind>,
    calls: Mutex<Vec<FleetCall>>,
}

impl FakeFleet {
    pub fn new() -> Self {
        Self::default()
    }

    /// `node` does not answer the reachability probe.
    pub fn unreachable(mut self, node: &str) -> Self {
        self.unreachable.push(node.to_string());
        self
    }

    /// Commands of `kind` exit with status 1 on `node`.
    pub fn fail(mut self, kind: CommandKind, node: &str) -> Self {
        self.failures.push((kind, node.to_string()));
        self
    }

    /// Commands of `kind` never complete.
    pub fn hang(mut self, kind: CommandKind) -> Self {
        self.hang = Some(kind);
        self
    }

    /// All calls to `run_on_cluster()`, in order. Reachability probes are not included.
    pub fn calls(&self) -> Vec<FleetCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn kinds_run(&self) -> Vec<CommandKind> {
        self.calls().iter().map(|call| call.kind).collect()
    }
}

impl Fleet for FakeFleet {
    async fn reachable_nodes(&self, nodes: &[String]) -> Vec<String> {
        nodes
            .iter()
            .filter(|n| !self.unreachable.contains(n))
            .cloned()
            .collect()
    }

    async fn run_on_cluster(&self, command: &FleetCommand, nodes: &[String]) -> Vec<NodeOutput> {
        let commands: Vec<String> = nodes.iter().map(|n| command.render(n)).collect();
        self.calls.lock().unwrap().push(FleetCall {
            kind: command.kind,
            nodes: nodes.to_vec(),
            commands: commands.clone(),
        });

        if self.hang == Some(command.kind) {
            futures::future::pending::<()>().await;
        }

        nodes
            .iter()
            .zip(commands)
            .map(|(node, rendered)| {
                let failed = self
                    .failures
                    .iter()
                    .any(|(kind, n)| *kind == command.kind && n == node);
                NodeOutput {
                    node: node.clone(),
                    exit_code: Some(if failed { 1 } else { 0 }),
                    lines: vec![rendered],
                }
            })
            .collect()
    }
}

/// A scripted `RemoteShell`: every node echoes the command it was given, followed by the
/// sentinel line the command would have printed.
#[derive(Debug, Default)]
pub struct FakeShell {
    /// Exit codes reported by the sentinel, per node. Missing nodes report 0.
    exit_codes: HashMap<String, i32>,
    /// `(node, pattern)`: the node's output is cut off before the sentinel line for commands
    /// containing `pattern`.
    truncated: Vec<(String, String)>,
    /// Nodes that never answer.
    silent: Vec<String>,
    calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl FakeShell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exit_code(mut self, node: &str, code: i32) -> Self {
        self.exit_codes.insert(node.to_string(), code);
        self
    }

    pub fn truncate(mut self, node: &str, pattern: &str) -> Self {
        self.truncated.push((node.to_string(), pattern.to_string()));
        self
    }

    pub fn silent(mut self, node: &str) -> Self {
        self.silent.push(node.to_string());
        self
    }

    /// `(command, nodes)` of every call, in order.
    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

impl RemoteShell for FakeShell {
    async fn run(&self, command: &str, nodes: &[String]) -> io::Result<Vec<SymmetricBuffer>> {
        self.calls
            .lock()
            .unwrap()
            .push((command.to_string(), nodes.to_vec()));

        // Strip the appended marker to recover what the caller asked for.
        let shown = command
            .split_once("; echo \"Return Code=")
            .map(|(c, _)| c)
            .unwrap_or(command);

        let outputs: Vec<NodeOutput> = nodes
            .iter()
            .filter(|node| !self.silent.contains(node))
            .map(|node| {
                let mut lines = vec![shown.to_string()];
                let truncated = self
                    .truncated
                    .iter()
                    .any(|(n, pattern)| n == node && shown.contains(pattern.as_str()));
                if !truncated {
                    let code = self.exit_codes.get(node).copied().unwrap_or(0);
                    lines.push(format!("Return Code={code}"));
                }
                NodeOutput {
                    node: node.clone(),
                    exit_code: None,
                    lines,
                }
            })
            .collect();

        Ok(symmetric_buffers(&outputs))
    }
}

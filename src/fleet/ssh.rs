// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

use {futures::future, log::debug, tokio::process::Command};

use crate::fleet::{Fleet, FleetCommand, NodeOutput};

/// Options passed to every ssh invocation when none are configured: never prompt, and give up
/// on unreachable nodes quickly.
pub const DEFAULT_SSH_OPTIONS: [&str; 4] = ["-o", "BatchMode=yes", "-o", "ConnectTimeout=10"];

/// Runs fleet commands over plain ssh, one connection per node, all nodes concurrently.
#[derive(Debug, Clone)]
pub struct SshFleet {
    program: String,
    options: Vec<String>,
}

impl SshFleet {
    pub fn new(options: Vec<String>) -> Self {
        SshFleet {
            program: "ssh".to_string(),
            options,
        }
    }

    async fn run_one(&self, node: &str, command: String) -> NodeOutput {
        debug!("running on {node}: {command}");
        let output = Command::new(&self.program)
            .args(&self.options)
            .arg(node)
            .arg(&command)
            .output()
            .await;

        match output {
            Ok(output) => {
                let mut lines: Vec<String> = String::from_utf8_lossy(&output.stdout)
                    .lines()
                    .map(str::to_string)
                    .collect();
                lines.extend(
                    String::from_utf8_lossy(&output.stderr)
                        .lines()
                        .map(str::to_string),
                );
                NodeOutput {
                    node: node.to_string(),
                    exit_code: output.status.code(),
                    lines,
                }
            }
            Err(e) => NodeOutput::failed(node, format!("Could not run {}: {e}", self.program)),
        }
    }
}

impl Fleet for SshFleet {
    async fn reachable_nodes(&self, nodes: &[String]) -> Vec<String> {
        self.run_on_cluster(&FleetCommand::probe(), nodes)
            .await
            .into_iter()
            .filter(|output| output.success())
            .map(|output| output.node)
            .collect()
    }

    async fn run_on_cluster(&self, command: &FleetCommand, nodes: &[String]) -> Vec<NodeOutput> {
        let futures: Vec<_> = nodes
            .iter()
            .map(|node| self.run_one(node, command.render(node)))
            .collect();

        future::join_all(futures).await
    }
}

// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

//! sentinel.rs
//!
//! Adapter for remote shells that only hand back captured output. The exit status of the
//! command is echoed as a final `Return Code=<n>` line on every node and read back from there.

use std::{collections::HashMap, future::Future, io};

use {
    futures::future,
    log::{debug, warn},
    tokio::process::Command,
};

use crate::fleet::{Fleet, FleetCommand, NodeOutput, SymmetricBuffer};

pub const SENTINEL_PREFIX: &str = "Return Code=";

/// A remote shell which runs one command string on a list of nodes and returns the captured
/// output, grouped by identical output, with no exit status.
pub trait RemoteShell {
    fn run(
        &self,
        command: &str,
        nodes: &[String],
    ) -> impl Future<Output = io::Result<Vec<SymmetricBuffer>>>;
}

/// Append the exit status marker to `command`.
pub fn with_sentinel(command: &str) -> String {
    format!("{command}; echo \"{SENTINEL_PREFIX}$?\"")
}

/// Split the marker off the end of a node's output.
///
/// Returns the exit code recorded in the last line, if that line is a well-formed marker, and the
/// remaining output lines.
pub fn parse_sentinel(lines: &[String]) -> (Option<i32>, Vec<String>) {
    let Some((last, rest)) = lines.split_last() else {
        return (None, Vec::new());
    };

    match last
        .trim_end()
        .strip_prefix(SENTINEL_PREFIX)
        .and_then(|code| code.parse::<i32>().ok())
    {
        Some(code) => (Some(code), rest.to_vec()),
        None => (None, lines.to_vec()),
    }
}

/// A `Fleet` built on top of a `RemoteShell` that does not report exit codes.
#[derive(Debug, Clone)]
pub struct SentinelFleet<S> {
    shell: S,
}

impl<S: RemoteShell> SentinelFleet<S> {
    pub fn new(shell: S) -> Self {
        SentinelFleet { shell }
    }

    pub fn shell(&self) -> &S {
        &self.shell
    }

    async fn run_shared(&self, command: &str, nodes: &[String]) -> Vec<NodeOutput> {
        let wrapped = with_sentinel(command);
        debug!("running on {}: {wrapped}", nodes.join(","));
        let buffers = match self.shell.run(&wrapped, nodes).await {
            Ok(buffers) => buffers,
            Err(e) => {
                warn!("remote shell failed: {e}");
                return nodes
                    .iter()
                    .map(|node| NodeOutput::failed(node, format!("remote shell failed: {e}")))
                    .collect();
            }
        };

        let mut by_node: HashMap<&str, &Vec<String>> = HashMap::new();
        for (lines, buffer_nodes) in &buffers {
            for node in buffer_nodes {
                by_node.insert(node.as_str(), lines);
            }
        }

        nodes
            .iter()
            .map(|node| match by_node.get(node.as_str()) {
                Some(lines) => {
                    let (exit_code, lines) = parse_sentinel(lines);
                    NodeOutput {
                        node: node.clone(),
                        exit_code,
                        lines,
                    }
                }
                None => NodeOutput::failed(node, "no output from node"),
            })
            .collect()
    }
}

impl<S: RemoteShell> Fleet for SentinelFleet<S> {
    async fn reachable_nodes(&self, nodes: &[String]) -> Vec<String> {
        self.run_on_cluster(&FleetCommand::probe(), nodes)
            .await
            .into_iter()
            .filter(|output| output.success())
            .map(|output| output.node)
            .collect()
    }

    async fn run_on_cluster(&self, command: &FleetCommand, nodes: &[String]) -> Vec<NodeOutput> {
        if !command.is_node_specific() {
            return self.run_shared(command.template(), nodes).await;
        }

        let futures: Vec<_> = nodes
            .iter()
            .map(|node| async move {
                self.run_shared(&command.render(node), std::slice::from_ref(node))
                    .await
            })
            .collect();

        future::join_all(futures).await.into_iter().flatten().collect()
    }
}

/// ClusterShell's `clush`, run in line mode so that every output line is prefixed by the node
/// that printed it.
#[derive(Debug, Clone)]
pub struct ClushShell {
    program: String,
}

impl Default for ClushShell {
    fn default() -> Self {
        ClushShell {
            program: "clush".to_string(),
        }
    }
}

impl RemoteShell for ClushShell {
    async fn run(&self, command: &str, nodes: &[String]) -> io::Result<Vec<SymmetricBuffer>> {
        let output = Command::new(&self.program)
            .args(["-L", "-w", &nodes.join(","), command])
            .output()
            .await?;

        Ok(parse_line_mode(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Parse `node: text` lines into symmetric buffers, keeping nodes in order of first appearance.
pub fn parse_line_mode(stdout: &str) -> Vec<SymmetricBuffer> {
    let mut order: Vec<String> = Vec::new();
    let mut lines: HashMap<String, Vec<String>> = HashMap::new();
    for line in stdout.lines() {
        let Some((node, text)) = line.split_once(": ") else {
            continue;
        };
        if !lines.contains_key(node) {
            order.push(node.to_string());
        }
        lines
            .entry(node.to_string())
            .or_default()
            .push(text.to_string());
    }

    let mut buffers: Vec<SymmetricBuffer> = Vec::new();
    for node in order {
        let node_lines = lines.remove(&node).unwrap_or_default();
        match buffers.iter_mut().find(|(l, _)| *l == node_lines) {
            Some((_, nodes)) => nodes.push(node),
            None => buffers.push((node_lines, vec![node])),
        }
    }
    buffers
}

// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

//! Access to the other nodes of the cluster.
//!
//! A `Fleet` runs one command across a list of nodes and reports, for every node, the captured
//! output together with the command's exit code. Transports that cannot report exit codes are
//! wrapped in a `SentinelFleet`, which recovers them from a marker line appended to the output.

use std::{fmt, future::Future};

pub mod sentinel;
pub mod ssh;

pub use sentinel::{ClushShell, RemoteShell, SentinelFleet};
pub use ssh::SshFleet;

/// Output lines shared by a group of nodes, and the nodes that produced them.
pub type SymmetricBuffer = (Vec<String>, Vec<String>);

/// The stage of a rollout a fleet command belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Reachability check.
    Probe,
    /// Synchronize the shared config directory.
    Push,
    /// Make each node's own derived file its live configuration.
    Activate,
    /// Have the daemon reload its configuration.
    Reload,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                CommandKind::Probe => "probe",
                CommandKind::Push => "push",
                CommandKind::Activate => "activate",
                CommandKind::Reload => "reload",
            }
        )
    }
}

/// A shell command to run on every node of a fleet.
///
/// The template may contain a `{node}` placeholder, which is replaced with the identity of the
/// node the command runs on.
#[derive(Debug, Clone, PartialEq)]
pub struct FleetCommand {
    pub kind: CommandKind,
    template: String,
}

impl FleetCommand {
    pub fn new(kind: CommandKind, template: impl Into<String>) -> Self {
        FleetCommand {
            kind,
            template: template.into(),
        }
    }

    /// A command that succeeds on every node that can be reached.
    pub fn probe() -> Self {
        Self::new(CommandKind::Probe, "true")
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Whether the command differs from one node to the next.
    pub fn is_node_specific(&self) -> bool {
        self.template.contains("{node}")
    }

    pub fn render(&self, node: &str) -> String {
        self.template.replace("{node}", node)
    }
}

/// The result of running a command on one node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeOutput {
    pub node: String,
    /// Exit code of the command, or `None` when it could not be determined (the node could not
    /// be reached, the command was killed, the stage timed out...).
    pub exit_code: Option<i32>,
    pub lines: Vec<String>,
}

impl NodeOutput {
    /// A failed result carrying a single explanatory line.
    pub fn failed(node: &str, reason: impl Into<String>) -> Self {
        NodeOutput {
            node: node.to_string(),
            exit_code: None,
            lines: vec![reason.into()],
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Remote execution across the nodes of a cluster.
pub trait Fleet {
    /// The subset of `nodes` that can currently be reached, in the same order.
    fn reachable_nodes(&self, nodes: &[String]) -> impl Future<Output = Vec<String>>;

    /// Run `command` on each of `nodes`, returning one `NodeOutput` per node in the order of
    /// `nodes`.
    fn run_on_cluster(
        &self,
        command: &FleetCommand,
        nodes: &[String],
    ) -> impl Future<Output = Vec<NodeOutput>>;
}

/// Group outputs so that nodes which printed exactly the same lines are shown together.
pub fn symmetric_buffers(outputs: &[NodeOutput]) -> Vec<SymmetricBuffer> {
    let mut buffers: Vec<SymmetricBuffer> = Vec::new();
    for output in outputs {
        match buffers.iter_mut().find(|(lines, _)| *lines == output.lines) {
            Some((_, nodes)) => nodes.push(output.node.clone()),
            None => buffers.push((output.lines.clone(), vec![output.node.clone()])),
        }
    }
    buffers
}

/// Render symmetric buffers the way `clubak` does: a header naming the nodes, then their output.
pub fn format_symmetric_buffers(buffers: &[SymmetricBuffer]) -> String {
    let mut out = String::new();
    for (lines, nodes) in buffers {
        let header = nodes.join(",");
        let rule = "-".repeat(header.len().max(15));
        out.push_str(&format!("{rule}\n{header}\n{rule}\n"));
        for line in lines {
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

pub fn display_symmetric_buffers(buffers: &[SymmetricBuffer]) {
    print!("{}", format_symmetric_buffers(buffers));
}

// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

//! template.rs
//!
//! Expansion of the master template into node-specific configuration text.
//!
//! The master template is ordinary keepalived configuration with two kinds of directives
//! embedded in it, both introduced by the `$` sigil:
//!
//! - `$slb_hostname` is replaced, wherever it appears, by the identity of the node the text is
//!   being expanded for.
//! - `$master_backup <primary> <secondary>` is replaced by a VRRP priority line: 150 on the
//!   primary, 100 on the secondary and 50 on every other node.
//!
//! Any line still starting with the sigil after expansion is dropped, so that malformed or
//! unknown directives never reach the validator or the fleet.

use log::warn;

/// Prefix character shared by all directives.
pub const SIGIL: char = '$';

/// Replaced by the node's own identity.
pub const HOSTNAME_DIRECTIVE: &str = "$slb_hostname";

/// Resolved into a `priority` declaration for the node.
pub const MASTER_BACKUP_DIRECTIVE: &str = "$master_backup";

pub const PRIMARY_PRIORITY: u8 = 150;
pub const SECONDARY_PRIORITY: u8 = 100;
pub const OTHER_PRIORITY: u8 = 50;

/// One line of a parsed template, without its line terminator.
#[derive(Debug, Clone, PartialEq)]
enum Line {
    /// Plain configuration text, possibly containing the hostname directive.
    Text(String),
    /// A well-formed master/backup directive.
    MasterBackup {
        indent: String,
        primary: String,
        secondary: String,
    },
    /// A line that can never appear in expanded output: a malformed master/backup directive or
    /// anything else beginning with the sigil.
    Unresolved,
}

/// A master template split into lines, ready to be expanded for any number of nodes.
///
/// Parsing happens once; `expand()` borrows the template immutably so the same `Template` can be
/// expanded for several nodes in parallel.
#[derive(Debug, Clone)]
pub struct Template {
    lines: Vec<(Line, String)>,
}

impl Template {
    pub fn parse(text: &str) -> Self {
        let lines = text
            .split_inclusive('\n')
            .map(|raw| {
                let (body, terminator) = split_terminator(raw);
                (classify(body), terminator.to_string())
            })
            .collect();

        Template { lines }
    }

    /// Produce the configuration text for `node`.
    ///
    /// Line terminators are carried over untouched, so a template without directives expands to
    /// a byte-identical copy of itself.
    pub fn expand(&self, node: &str) -> String {
        let mut out = String::new();
        for (line, terminator) in &self.lines {
            match line {
                Line::Text(body) => {
                    let body = body.replace(HOSTNAME_DIRECTIVE, node);
                    if body.trim_start().starts_with(SIGIL) {
                        continue;
                    }
                    out.push_str(&body);
                }
                Line::MasterBackup {
                    indent,
                    primary,
                    secondary,
                } => {
                    let priority = priority_for(node, primary, secondary);
                    out.push_str(&format!("{indent}priority {priority}"));
                }
                Line::Unresolved => continue,
            }
            out.push_str(terminator);
        }
        out
    }

    /// All node names referenced by master/backup directives, in order of appearance.
    pub fn referenced_nodes(&self) -> Vec<&str> {
        let mut nodes = Vec::new();
        for (line, _) in &self.lines {
            if let Line::MasterBackup {
                primary, secondary, ..
            } = line
            {
                nodes.push(primary.as_str());
                nodes.push(secondary.as_str());
            }
        }
        nodes
    }

    /// Nodes named by master/backup directives that are not in `nodeset`. Such a node can never
    /// take the primary or secondary role; each one is logged as a warning.
    pub fn unknown_nodes(&self, nodeset: &[String]) -> Vec<&str> {
        let unknown: Vec<&str> = self
            .referenced_nodes()
            .into_iter()
            .filter(|name| !nodeset.iter().any(|n| n == name))
            .collect();
        for name in &unknown {
            warn!("master/backup directive names '{name}', which is not in the nodeset");
        }
        unknown
    }

    /// Number of lines that will be dropped from every expansion.
    pub fn unresolved_lines(&self) -> usize {
        self.lines
            .iter()
            .filter(|(line, _)| *line == Line::Unresolved)
            .count()
    }
}

/// Expand `master` for `node`.
///
/// `nodeset` is the set of nodes the template is being rolled out to. It does not change the
/// output, but master/backup directives naming a node outside of it are reported.
pub fn expand(master: &str, node: &str, nodeset: &[String]) -> String {
    let template = Template::parse(master);
    template.unknown_nodes(nodeset);
    template.expand(node)
}

/// Resolve the VRRP priority of `node` for a master/backup pair.
pub fn priority_for(node: &str, primary: &str, secondary: &str) -> u8 {
    if node == primary {
        PRIMARY_PRIORITY
    } else if node == secondary {
        SECONDARY_PRIORITY
    } else {
        OTHER_PRIORITY
    }
}

fn split_terminator(raw: &str) -> (&str, &str) {
    if let Some(body) = raw.strip_suffix("\r\n") {
        (body, "\r\n")
    } else if let Some(body) = raw.strip_suffix('\n') {
        (body, "\n")
    } else {
        (raw, "")
    }
}

fn classify(body: &str) -> Line {
    if let Some(pos) = body.find(MASTER_BACKUP_DIRECTIVE) {
        let rest = &body[pos + MASTER_BACKUP_DIRECTIVE.len()..];
        if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
            return Line::Unresolved;
        }
        let args: Vec<&str> = rest.split_whitespace().collect();
        return match args.as_slice() {
            [primary, secondary] => Line::MasterBackup {
                indent: leading_whitespace(body).to_string(),
                primary: primary.to_string(),
                secondary: secondary.to_string(),
            },
            _ => Line::Unresolved,
        };
    }

    classify_plain(body)
}

fn classify_plain(body: &str) -> Line {
    let trimmed = body.trim_start();
    if trimmed.starts_with(SIGIL) && !trimmed.starts_with(HOSTNAME_DIRECTIVE) {
        Line::Unresolved
    } else {
        Line::Text(body.to_string())
    }
}

fn leading_whitespace(body: &str) -> &str {
    let trimmed = body.trim_start();
    &body[..body.len() - trimmed.len()]
}

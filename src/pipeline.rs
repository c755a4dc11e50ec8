// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

//! pipeline.rs
//!
//! The commit pipeline takes the candidate of an edit session and rolls it out to the fleet:
//!
//! 1. expand the candidate into one configuration per node,
//! 2. validate every node configuration, aborting at the first failure,
//! 3. archive the old master, install the new one and write the node files locally,
//! 4. push the shared config directory to every reachable node,
//! 5. have every node activate its own file,
//! 6. reload the daemon everywhere.
//!
//! Nothing is written before every node configuration has passed validation. Once the local
//! install has happened there is no rollback: a failure in a later stage is reported through the
//! outcome and the history file, and the local node stays ahead of the rest of the fleet until
//! the next successful commit.

use std::{fmt, io, path::PathBuf, time::Duration};

use {
    futures::future,
    log::{debug, error, info, warn},
    thiserror::Error,
};

use crate::{
    config::{Config, ConfigError},
    fleet::{CommandKind, Fleet, FleetCommand, NodeOutput},
    history::{Event, History, Record, HISTORY_FILE},
    session::{Decision, Session, SessionError},
    store::{ArchiveEntry, ConfigStore, StoreError},
    template::Template,
    validator::Validator,
};

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Local filesystem failure reading or installing the master. The commit is aborted before
    /// any fleet action.
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("could not stage node configurations for validation: {0}")]
    Staging(io::Error),
}

/// The states a commit attempt goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Staged,
    Expanded,
    Validating,
    Validated,
    ValidationFailed,
    Installing,
    Pushing,
    PushFailed,
    Pushed,
    Activating,
    Reloading,
    Succeeded,
    PartialFailure,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Stage::Idle => "idle",
                Stage::Staged => "staged",
                Stage::Expanded => "expanded",
                Stage::Validating => "validating",
                Stage::Validated => "validated",
                Stage::ValidationFailed => "validation failed",
                Stage::Installing => "installing",
                Stage::Pushing => "pushing",
                Stage::PushFailed => "push failed",
                Stage::Pushed => "pushed",
                Stage::Activating => "activating",
                Stage::Reloading => "reloading",
                Stage::Succeeded => "succeeded",
                Stage::PartialFailure => "partial failure",
            }
        )
    }
}

/// The distinct result classes of a commit, for callers that script around them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    Success,
    ParseFailed,
    PushFailed,
    ReloadFailed,
}

impl ResultCode {
    /// Process exit status for this result. 1 is left for errors that are not commit outcomes.
    pub fn exit_code(self) -> i32 {
        match self {
            ResultCode::Success => 0,
            ResultCode::ParseFailed => 2,
            ResultCode::PushFailed => 3,
            ResultCode::ReloadFailed => 4,
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                ResultCode::Success => "success",
                ResultCode::ParseFailed => "parse failed",
                ResultCode::PushFailed => "push failed",
                ResultCode::ReloadFailed => "reload failed",
            }
        )
    }
}

/// How a commit attempt ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The candidate matches the installed master.
    NothingToDo,
    Succeeded,
    ValidationFailed { node: String, diagnostics: String },
    PushFailed { failed: Vec<NodeOutput> },
    ActivateFailed { failed: Vec<NodeOutput> },
    ReloadFailed { failed: Vec<NodeOutput> },
}

impl Outcome {
    pub fn code(&self) -> ResultCode {
        match self {
            Outcome::NothingToDo | Outcome::Succeeded => ResultCode::Success,
            Outcome::ValidationFailed { .. } => ResultCode::ParseFailed,
            // The node files never went live, which is the same situation as a failed push.
            Outcome::PushFailed { .. } | Outcome::ActivateFailed { .. } => ResultCode::PushFailed,
            Outcome::ReloadFailed { .. } => ResultCode::ReloadFailed,
        }
    }

    /// The nodes that made a fleet stage fail.
    pub fn failed_nodes(&self) -> Vec<&str> {
        match self {
            Outcome::PushFailed { failed }
            | Outcome::ActivateFailed { failed }
            | Outcome::ReloadFailed { failed } => failed.iter().map(|o| o.node.as_str()).collect(),
            Outcome::ValidationFailed { node, .. } => vec![node.as_str()],
            Outcome::NothingToDo | Outcome::Succeeded => Vec::new(),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::NothingToDo => write!(f, "nothing to do"),
            Outcome::Succeeded => write!(f, "commit succeeded"),
            Outcome::ValidationFailed { node, .. } => {
                write!(f, "validation failed for node {node}")
            }
            Outcome::PushFailed { .. } => {
                write!(f, "push failed on {}", self.failed_nodes().join(","))
            }
            Outcome::ActivateFailed { .. } => {
                write!(f, "activation failed on {}", self.failed_nodes().join(","))
            }
            Outcome::ReloadFailed { .. } => {
                write!(f, "reload failed on {}", self.failed_nodes().join(","))
            }
        }
    }
}

/// The derived configuration of one node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeConfig {
    pub node: String,
    pub text: String,
}

/// A single run of the pipeline, from the candidate snapshot to the outcome.
#[derive(Debug, Clone)]
pub struct CommitAttempt {
    pub candidate: String,
    pub node_configs: Vec<NodeConfig>,
    /// Every state the attempt went through, in order.
    pub transitions: Vec<Stage>,
    /// Output of each fleet stage that ran.
    pub fleet_outputs: Vec<(CommandKind, Vec<NodeOutput>)>,
    /// Nodes skipped by the fleet stages because they could not be reached.
    pub unreachable: Vec<String>,
    /// The archive entry created for the superseded master.
    pub archived: Option<ArchiveEntry>,
    outcome: Option<Outcome>,
}

impl CommitAttempt {
    fn new(candidate: &str) -> Self {
        CommitAttempt {
            candidate: candidate.to_string(),
            node_configs: Vec::new(),
            transitions: vec![Stage::Staged],
            fleet_outputs: Vec::new(),
            unreachable: Vec::new(),
            archived: None,
            outcome: None,
        }
    }

    fn advance(&mut self, stage: Stage) {
        debug!("commit: {} -> {stage}", self.stage());
        self.transitions.push(stage);
    }

    fn finish(mut self, outcome: Outcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    /// The state the attempt is in, or ended in.
    pub fn stage(&self) -> Stage {
        *self.transitions.last().unwrap_or(&Stage::Idle)
    }

    pub fn outcome(&self) -> &Outcome {
        self.outcome
            .as_ref()
            .expect("commit attempt is returned only once it has an outcome")
    }

    pub fn code(&self) -> ResultCode {
        self.outcome().code()
    }

    /// Whether the attempt went through `stage` at some point.
    pub fn visited(&self, stage: Stage) -> bool {
        self.transitions.contains(&stage)
    }
}

/// Everything the pipeline needs to know about the cluster it rolls out to.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub nodes: Vec<String>,
    pub stage_timeout: Duration,
    pub push_command: String,
    pub activate_command: String,
    pub reload_command: String,
    pub live_config: String,
    /// The node the others pull the shared config directory from.
    pub origin: String,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(PipelineSettings {
            nodes: config.nodeset()?,
            stage_timeout: config.fleet.stage_timeout(),
            push_command: config.fleet.push_command.clone(),
            activate_command: config.fleet.activate_command.clone(),
            reload_command: config.fleet.reload_command.clone(),
            live_config: config.live_config_file.clone(),
            origin: crate::local_hostname(),
        })
    }
}

pub struct CommitPipeline<F> {
    store: ConfigStore,
    validator: Validator,
    fleet: F,
    settings: PipelineSettings,
}

impl<F: Fleet> CommitPipeline<F> {
    pub fn new(
        store: ConfigStore,
        validator: Validator,
        fleet: F,
        settings: PipelineSettings,
    ) -> Self {
        CommitPipeline {
            store,
            validator,
            fleet,
            settings,
        }
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn fleet(&self) -> &F {
        &self.fleet
    }

    pub fn history_path(&self) -> PathBuf {
        self.store.archive_dir().join(HISTORY_FILE)
    }

    /// Begin an edit session on the master.
    pub fn begin_session(&self) -> Result<Session, SessionError> {
        Session::begin(&self.store)
    }

    /// End `session` according to `decision`. A discarded session leaves no trace.
    pub async fn conclude(
        &self,
        mut session: Session,
        decision: Decision,
    ) -> Result<Option<CommitAttempt>, PipelineError> {
        session.finish_editing();
        match decision {
            Decision::Discard => {
                info!("edit session discarded");
                Ok(None)
            }
            Decision::Commit => self.commit(&session).await.map(Some),
        }
    }

    /// Run the whole pipeline on the candidate of `session`.
    ///
    /// Stage failures are reported through the outcome of the returned attempt. An `Err` is
    /// returned only when the commit could not be carried out at all, such as a local
    /// filesystem failure during the install.
    pub async fn commit(&self, session: &Session) -> Result<CommitAttempt, PipelineError> {
        let candidate = session.candidate();
        let mut attempt = CommitAttempt::new(candidate);

        if candidate == self.store.load_master()? {
            info!("candidate is identical to the installed master, nothing to do");
            attempt.advance(Stage::Succeeded);
            return Ok(attempt.finish(Outcome::NothingToDo));
        }

        let nodes = &self.settings.nodes;
        self.record(
            Event::Commit,
            self.store.master_basename(),
            Some(format!("rolling out to {}", nodes.join(","))),
        );

        // Expansion
        let template = Template::parse(candidate);
        template.unknown_nodes(nodes);
        if template.unresolved_lines() > 0 {
            warn!(
                "{} unresolved directive line(s) will be dropped",
                template.unresolved_lines()
            );
        }
        attempt.node_configs = nodes
            .iter()
            .map(|node| NodeConfig {
                node: node.clone(),
                text: template.expand(node),
            })
            .collect();
        attempt.advance(Stage::Expanded);

        // Validation
        attempt.advance(Stage::Validating);
        if let Some((node, diagnostics)) = self.validate_all(&attempt.node_configs).await? {
            error!("configuration for {node} failed validation");
            attempt.advance(Stage::ValidationFailed);
            self.record(Event::ParseFailed, &node, Some(diagnostics.clone()));
            return Ok(attempt.finish(Outcome::ValidationFailed { node, diagnostics }));
        }
        attempt.advance(Stage::Validated);

        // Local install
        attempt.advance(Stage::Installing);
        attempt.archived = self.store.install_master(candidate)?;
        for nc in &attempt.node_configs {
            self.store.save_node_config(&nc.node, &nc.text)?;
        }
        self.record(
            Event::Installed,
            self.store.master_basename(),
            attempt.archived.as_ref().map(|e| format!("archived as {}", e.name)),
        );

        // Push
        attempt.advance(Stage::Pushing);
        let reachable = match self.reachable_nodes().await {
            Ok(reachable) => reachable,
            Err(failed) => {
                attempt.advance(Stage::PushFailed);
                return Ok(self.fail(attempt, Event::PushFailed, Outcome::PushFailed { failed }));
            }
        };
        attempt.unreachable = nodes
            .iter()
            .filter(|n| !reachable.contains(n))
            .cloned()
            .collect();
        if reachable.is_empty() {
            error!("no node could be reached, nothing was pushed");
            let failed = nodes
                .iter()
                .map(|node| NodeOutput::failed(node, "node could not be reached"))
                .collect();
            attempt.advance(Stage::PushFailed);
            return Ok(self.fail(attempt, Event::PushFailed, Outcome::PushFailed { failed }));
        }
        if !attempt.unreachable.is_empty() {
            warn!(
                "skipping unreachable node(s): {}",
                attempt.unreachable.join(",")
            );
        }

        if let Some(failed) = self
            .run_stage(&mut attempt, CommandKind::Push, &reachable)
            .await
        {
            attempt.advance(Stage::PushFailed);
            return Ok(self.fail(attempt, Event::PushFailed, Outcome::PushFailed { failed }));
        }
        attempt.advance(Stage::Pushed);

        // Activation
        attempt.advance(Stage::Activating);
        if let Some(failed) = self
            .run_stage(&mut attempt, CommandKind::Activate, &reachable)
            .await
        {
            attempt.advance(Stage::PartialFailure);
            return Ok(self.fail(
                attempt,
                Event::ActivateFailed,
                Outcome::ActivateFailed { failed },
            ));
        }

        // Reload
        attempt.advance(Stage::Reloading);
        if let Some(failed) = self
            .run_stage(&mut attempt, CommandKind::Reload, &reachable)
            .await
        {
            attempt.advance(Stage::PartialFailure);
            return Ok(self.fail(
                attempt,
                Event::ReloadFailed,
                Outcome::ReloadFailed { failed },
            ));
        }

        attempt.advance(Stage::Succeeded);
        info!("commit succeeded on {}", reachable.join(","));
        self.record(Event::Succeeded, self.store.master_basename(), None);
        Ok(attempt.finish(Outcome::Succeeded))
    }

    /// The fleet command for `kind`, with every placeholder except `{node}` filled in.
    pub fn fleet_command(&self, kind: CommandKind) -> FleetCommand {
        let template = match kind {
            CommandKind::Probe => return FleetCommand::probe(),
            CommandKind::Push => &self.settings.push_command,
            CommandKind::Activate => &self.settings.activate_command,
            CommandKind::Reload => &self.settings.reload_command,
        };
        let node_config = self.store.node_config_path("{node}");
        FleetCommand::new(
            kind,
            template
                .replace("{config_dir}", &self.store.config_dir().display().to_string())
                .replace("{node_config}", &node_config.display().to_string())
                .replace("{live_config}", &self.settings.live_config)
                .replace("{origin}", &self.settings.origin),
        )
    }

    /// Write every node configuration to a private staging directory and validate them all.
    ///
    /// The validator runs for all nodes concurrently; the first failure in nodeset order is
    /// returned as `(node, diagnostics)`.
    async fn validate_all(
        &self,
        node_configs: &[NodeConfig],
    ) -> Result<Option<(String, String)>, PipelineError> {
        let staging = tempfile::Builder::new()
            .prefix("kafleet-")
            .tempdir()
            .map_err(PipelineError::Staging)?;

        let mut paths = Vec::new();
        for nc in node_configs {
            let path = staging.path().join(self.store.node_config_name(&nc.node));
            std::fs::write(&path, &nc.text).map_err(PipelineError::Staging)?;
            paths.push(path);
        }

        let verdicts =
            future::join_all(paths.iter().map(|path| self.validator.validate(path))).await;

        Ok(node_configs
            .iter()
            .zip(verdicts)
            .find(|(_, verdict)| !verdict.ok)
            .map(|(nc, verdict)| (nc.node.clone(), verdict.diagnostics)))
    }

    /// Probe which nodes can be reached. When the probe itself times out, every node is
    /// reported as failed.
    async fn reachable_nodes(&self) -> Result<Vec<String>, Vec<NodeOutput>> {
        let nodes = &self.settings.nodes;
        match tokio::time::timeout(
            self.settings.stage_timeout,
            self.fleet.reachable_nodes(nodes),
        )
        .await
        {
            Ok(reachable) => Ok(reachable),
            Err(_) => {
                error!(
                    "reachability probe timed out after {:?}",
                    self.settings.stage_timeout
                );
                Err(nodes
                    .iter()
                    .map(|node| NodeOutput::failed(node, "reachability probe timed out"))
                    .collect())
            }
        }
    }

    /// Run the command for `kind` on `nodes`. Returns the failed nodes, if there were any.
    async fn run_stage(
        &self,
        attempt: &mut CommitAttempt,
        kind: CommandKind,
        nodes: &[String],
    ) -> Option<Vec<NodeOutput>> {
        let command = self.fleet_command(kind);
        let timeout = self.settings.stage_timeout;
        info!("{kind}: {}", command.template());

        let outputs =
            match tokio::time::timeout(timeout, self.fleet.run_on_cluster(&command, nodes)).await {
                Ok(outputs) => outputs,
                Err(_) => {
                    error!("{kind} stage timed out after {timeout:?}");
                    nodes
                        .iter()
                        .map(|node| {
                            NodeOutput::failed(
                                node,
                                format!("{kind} stage timed out after {timeout:?}"),
                            )
                        })
                        .collect()
                }
            };

        let failed: Vec<NodeOutput> = outputs
            .iter()
            .filter(|output| !output.success())
            .cloned()
            .collect();
        attempt.fleet_outputs.push((kind, outputs));

        if failed.is_empty() {
            None
        } else {
            for output in &failed {
                error!("{kind} failed on {}", output.node);
            }
            Some(failed)
        }
    }

    fn fail(&self, attempt: CommitAttempt, event: Event, outcome: Outcome) -> CommitAttempt {
        self.record(event, &outcome.failed_nodes().join(","), None);
        attempt.finish(outcome)
    }

    /// Append a record to the history file. History is an audit aid: failing to write it is
    /// logged but does not change the outcome of the commit.
    fn record(&self, event: Event, obj_id: &str, comment: Option<String>) {
        let result = History::open(&self.history_path())
            .and_then(|history| history.write_record(Record::new(event, obj_id, comment)));
        if let Err(e) = result {
            warn!("{e}");
        }
    }
}

// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

pub mod check;
pub mod commit;
pub mod diff;
pub mod edit;
pub mod history;
pub mod show;

use {commit::CommitArgs, diff::DiffArgs, edit::EditArgs, show::ShowArgs};

use clap::{Parser, Subcommand};

use crate::{
    config::{Capabilities, Config, Transport},
    fleet::{ClushShell, Fleet, SentinelFleet, SshFleet},
    pipeline::{CommitPipeline, PipelineSettings},
};

/// A `HandledError` represents an error that has already been handled. When you call a function
/// that returns a `HandledError` or `HandledResult`, you don't need to do anything with that error,
/// other than just be aware that it happened, and return it on to your caller.
///
/// `main()` has a special responsibility: since its "caller" is, in a certain sense, the operating
/// system, `main()` must return a nonzero exit status when it gets a `HandledError`.
///
/// The primary way to construct a `HandledError` is with the `handle_err()` function, which turns a
/// generic error into a `HandledError`, and also runs some caller-provided code to handle the
/// error. That provided code would normally do something like report the error to stderr.
///
/// A `HandledError` inentionally has no data about what the specific error was; the process of
/// handling the error "consumes" that information, and it is no longer needed as the error was
/// already appropriately handled.
#[derive(Debug, PartialEq)]
pub struct HandledError {}

pub type HandledResult<T> = std::result::Result<T, HandledError>;

pub fn handled_error<T>() -> HandledResult<T> {
    HandledResult::Err(HandledError {})
}

pub trait Handle<T, F> {
    fn handle_err(self, handler: F) -> HandledResult<T>;
}

impl<T, E, F: FnOnce(E)> Handle<T, F> for std::result::Result<T, E> {
    /// Handle an error by running the provided `handler` code, giving it the error.
    ///
    /// Then, return a `HandledResult`, so that transitive callers of this function know that they
    /// do not need to do anything further to handle the error.
    fn handle_err(self, handler: F) -> HandledResult<T> {
        self.map_err(|e| {
            handler(e);
            HandledError {}
        })
    }
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Edit the master template and roll it out.
    Edit(EditArgs),
    /// Show how a prepared template differs from the active master.
    Diff(DiffArgs),
    /// Roll out a prepared template without prompting.
    Commit(CommitArgs),
    /// Show the active master, or the configuration derived for one node.
    Show(ShowArgs),
    /// List archived masters and the commit history.
    History,
    /// Check the configuration file and report what this node can do.
    Check,
}

/// Run the command given on the command line. On success, returns the exit status for the
/// process, which distinguishes the outcomes of a commit.
pub fn main(cli: &Cli) -> HandledResult<i32> {
    let path = cli.config.clone().unwrap_or_else(crate::default_config_path);
    let config = Config::load(&path).handle_err(|e| eprintln!("{e}"))?;
    let capabilities = Capabilities::probe(&config);

    match &cli.command {
        Commands::Check => return check::check(&config, &capabilities).map(|_| 0),
        Commands::Show(args) => return show::show(&config, args).map(|_| 0),
        Commands::Diff(args) => return diff::diff(&config, args).map(|_| 0),
        Commands::History => return history::history(&config).map(|_| 0),
        _ => {}
    }

    if !capabilities.can_commit() {
        eprintln!("This node cannot commit; run 'kafleet check' for details.");
        return handled_error();
    }

    let rt = tokio::runtime::Runtime::new()
        .handle_err(|e| eprintln!("Error launching tokio runtime: {e}"))?;

    rt.block_on(async {
        match config.fleet.transport {
            Transport::Ssh => {
                let fleet = SshFleet::new(config.fleet.ssh_options.clone());
                run_session(cli, &config, fleet).await
            }
            Transport::Clush => {
                let fleet = SentinelFleet::new(ClushShell::default());
                run_session(cli, &config, fleet).await
            }
        }
    })
}

async fn run_session<F: Fleet>(cli: &Cli, config: &Config, fleet: F) -> HandledResult<i32> {
    let pipeline = build_pipeline(config, fleet)?;
    match &cli.command {
        Commands::Edit(args) => edit::edit(&pipeline, config, args).await,
        Commands::Commit(args) => commit::commit(&pipeline, args).await,
        _ => unreachable!(),
    }
}

fn build_pipeline<F: Fleet>(config: &Config, fleet: F) -> HandledResult<CommitPipeline<F>> {
    let settings = PipelineSettings::from_config(config).handle_err(|e| eprintln!("{e}"))?;

    let Some(validator) = config.validator() else {
        eprintln!("No validator configured.");
        return handled_error();
    };

    let store = config.store();
    store
        .ensure_layout()
        .handle_err(|e| eprintln!("Could not prepare config store: {e}"))?;

    Ok(CommitPipeline::new(store, validator, fleet, settings))
}

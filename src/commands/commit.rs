// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

use clap::Args;

use crate::{
    commands::{Handle, HandledResult},
    fleet::{self, Fleet},
    pipeline::{CommitAttempt, CommitPipeline, Outcome},
    session::Decision,
};

#[derive(Args, Debug, Clone)]
pub struct CommitArgs {
    /// File holding the new master template
    file: String,
}

pub async fn commit<F: Fleet>(pipeline: &CommitPipeline<F>, args: &CommitArgs) -> HandledResult<i32> {
    let candidate = std::fs::read_to_string(&args.file)
        .handle_err(|e| eprintln!("Could not read '{}': {e}", args.file))?;

    let mut session = pipeline
        .begin_session()
        .handle_err(|e| eprintln!("{e}"))?;
    session.set_candidate(candidate);

    let attempt = pipeline
        .conclude(session, Decision::Commit)
        .await
        .handle_err(|e| eprintln!("Commit aborted: {e}"))?;

    Ok(attempt.map(|a| report(&a)).unwrap_or(0))
}

/// Print what happened during a commit attempt and return the matching exit status.
pub fn report(attempt: &CommitAttempt) -> i32 {
    let outcome = attempt.outcome();

    if let Some(entry) = &attempt.archived {
        println!("Previous master archived as {}", entry.name);
    }
    if !attempt.unreachable.is_empty() {
        eprintln!(
            "Warning: skipped unreachable node(s) {}",
            attempt.unreachable.join(",")
        );
    }

    match outcome {
        Outcome::NothingToDo => println!("No changes to commit."),
        Outcome::Succeeded => println!("Commit succeeded."),
        Outcome::ValidationFailed { node, diagnostics } => {
            eprintln!("Configuration for {node} failed validation; nothing was changed.");
            eprint!("{diagnostics}");
            if !diagnostics.ends_with('\n') {
                eprintln!();
            }
        }
        Outcome::PushFailed { failed }
        | Outcome::ActivateFailed { failed }
        | Outcome::ReloadFailed { failed } => {
            eprintln!(
                "Commit failed at stage '{}': {outcome}. The local node keeps the new configuration.",
                attempt.stage()
            );
            fleet::display_symmetric_buffers(&fleet::symmetric_buffers(failed));
        }
    }

    attempt.code().exit_code()
}

// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

use std::{
    fs,
    io::{self, BufRead, Write},
    process::Command,
};

use clap::Args;

use crate::{
    commands::{commit::report, handled_error, Handle, HandledResult},
    config::Config,
    fleet::Fleet,
    pipeline::CommitPipeline,
    session::Decision,
    store::ConfigStore,
};

#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    /// Take the new template from FILE instead of opening an editor
    #[arg(long)]
    from: Option<String>,

    /// Commit the changes without asking
    #[arg(long, conflicts_with = "discard")]
    commit: bool,

    /// Discard the changes after showing them
    #[arg(long)]
    discard: bool,
}

pub async fn edit<F: Fleet>(
    pipeline: &CommitPipeline<F>,
    config: &Config,
    args: &EditArgs,
) -> HandledResult<i32> {
    let mut session = pipeline
        .begin_session()
        .handle_err(|e| eprintln!("{e}"))?;

    let candidate = match &args.from {
        Some(path) => fs::read_to_string(path)
            .handle_err(|e| eprintln!("Could not read '{path}': {e}"))?,
        None => {
            let store = pipeline.store().clone();
            let text = session.candidate().to_string();
            tokio::task::spawn_blocking(move || run_editor(&store, &text))
                .await
                .handle_err(|e| eprintln!("Editor task failed: {e}"))??
        }
    };
    session.set_candidate(candidate);
    session.finish_editing();

    let Some(diff) = session.pending_diff() else {
        println!("No changes.");
        return Ok(0);
    };
    print!("{diff}");

    let decision = if args.discard {
        Decision::Discard
    } else if args.commit || config.auto_commit {
        Decision::Commit
    } else {
        tokio::task::spawn_blocking(ask_commit)
            .await
            .handle_err(|e| eprintln!("Prompt task failed: {e}"))??
    };

    match pipeline
        .conclude(session, decision)
        .await
        .handle_err(|e| eprintln!("Commit aborted: {e}"))?
    {
        Some(attempt) => Ok(report(&attempt)),
        None => {
            println!("Changes discarded.");
            Ok(0)
        }
    }
}

/// Open the editor on a working copy of `text` and return what the user saved.
fn run_editor(store: &ConfigStore, text: &str) -> HandledResult<String> {
    let path = store
        .config_dir()
        .join(format!(".{}.candidate", store.master_basename()));
    fs::write(&path, text)
        .handle_err(|e| eprintln!("Could not write '{}': {e}", path.display()))?;

    let editor = crate::default_editor();
    // The editor setting may carry its own arguments, so let the shell split it.
    let status = Command::new("sh")
        .arg("-c")
        .arg(format!("{editor} \"$1\""))
        .arg("sh")
        .arg(&path)
        .status();

    let edited = fs::read_to_string(&path);
    let _ = fs::remove_file(&path);

    match status {
        Ok(status) if status.success() => {}
        Ok(status) => {
            eprintln!("Editor '{editor}' exited with {status}; changes discarded.");
            return handled_error();
        }
        Err(e) => {
            eprintln!("Could not run editor '{editor}': {e}");
            return handled_error();
        }
    }

    edited.handle_err(|e| eprintln!("Could not read back '{}': {e}", path.display()))
}

fn ask_commit() -> HandledResult<Decision> {
    print!("Commit these changes? [y/N] ");
    io::stdout()
        .flush()
        .handle_err(|e| eprintln!("Could not write prompt: {e}"))?;

    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .handle_err(|e| eprintln!("Could not read answer: {e}"))?;

    Ok(match answer.trim().to_lowercase().as_str() {
        "y" | "yes" => Decision::Commit,
        _ => Decision::Discard,
    })
}

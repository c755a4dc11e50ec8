// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

//! session.rs
//!
//! An edit session owns the candidate master template. Only one session may exist per master at
//! a time; the exclusion is an advisory lock on a file next to the master, so it holds across
//! processes on the same node.

use std::{fs::OpenOptions, io};

use {
    log::debug,
    nix::{
        errno::Errno,
        fcntl::{Flock, FlockArg},
    },
    similar::TextDiff,
    thiserror::Error,
};

use crate::store::{ConfigStore, StoreError};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("another edit session is in progress on '{0}'")]
    ConcurrentEdit(String),

    #[error("could not lock '{path}': {source}")]
    Lock { path: String, source: io::Error },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Where a session stands with respect to committing its candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SessionState {
    /// The candidate is being edited.
    Staged,
    /// Editing is over and the caller has to decide whether to commit.
    AwaitingDecision,
}

/// The caller's decision at the end of a session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    Commit,
    Discard,
}

pub struct Session {
    /// Held for the lifetime of the session; dropping it releases the lock.
    _lock: Flock<std::fs::File>,
    master_name: String,
    snapshot: String,
    candidate: String,
    state: SessionState,
}

impl Session {
    /// Start a session: lock the master and take a snapshot of it as the initial candidate.
    pub fn begin(store: &ConfigStore) -> Result<Self, SessionError> {
        store.ensure_layout()?;

        let lock_path = store.lock_path();
        let lock_err = |source: io::Error| SessionError::Lock {
            path: lock_path.display().to_string(),
            source,
        };
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(lock_err)?;

        let lock = match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(lock) => lock,
            Err((_, errno)) if errno == Errno::EWOULDBLOCK => {
                return Err(SessionError::ConcurrentEdit(
                    store.master_path().display().to_string(),
                ))
            }
            Err((_, errno)) => return Err(lock_err(io::Error::from(errno))),
        };

        let snapshot = store.load_master()?;
        debug!("began edit session on '{}'", store.master_path().display());

        Ok(Session {
            _lock: lock,
            master_name: store.master_basename().to_string(),
            snapshot: snapshot.clone(),
            candidate: snapshot,
            state: SessionState::Staged,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The master as it was when the session began.
    pub fn snapshot(&self) -> &str {
        &self.snapshot
    }

    pub fn candidate(&self) -> &str {
        &self.candidate
    }

    /// Replace the candidate. Only possible while the session is staged.
    pub fn set_candidate(&mut self, text: String) {
        debug_assert_eq!(self.state, SessionState::Staged);
        self.candidate = text;
    }

    /// Modify the candidate in place.
    pub fn edit(&mut self, f: impl FnOnce(&str) -> String) {
        let edited = f(&self.candidate);
        self.set_candidate(edited);
    }

    pub fn is_modified(&self) -> bool {
        self.candidate != self.snapshot
    }

    /// Finish editing; the session now waits for a commit decision.
    pub fn finish_editing(&mut self) {
        self.state = SessionState::AwaitingDecision;
    }

    /// A unified diff from the snapshot to the candidate, or `None` when nothing changed.
    pub fn pending_diff(&self) -> Option<String> {
        if !self.is_modified() {
            return None;
        }
        Some(unified_diff(
            &self.snapshot,
            &self.candidate,
            &self.master_name,
        ))
    }
}

/// Render the differences between `old` and `new` as a unified diff.
pub fn unified_diff(old: &str, new: &str, name: &str) -> String {
    let (a, b) = (format!("a/{name}"), format!("b/{name}"));
    let diff = TextDiff::from_lines(old, new);
    diff.unified_diff()
        .context_radius(3)
        .header(&a, &b)
        .to_string()
}

// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

use std::{
    fmt,
    fs::{File, OpenOptions},
    io::{self, BufRead, BufReader, Seek, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};

use {chrono::NaiveDateTime, log::warn, thiserror::Error};

pub const HISTORY_FILE: &str = "history";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("could not open history file '{}': {source}", path.display())]
    Open { path: PathBuf, source: io::Error },

    #[error("failed to write to history file '{}': {source}", path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to read history file '{}': {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("malformed history record '{0}'")]
    Malformed(String),
}

/// The audit log of commit attempts. Records are only ever appended.
#[derive(Debug)]
pub struct History {
    path: PathBuf,
    file: Mutex<File>,
}

impl History {
    pub fn open(path: &Path) -> Result<Self, HistoryError> {
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)
            .map_err(|source| HistoryError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    /// Writes a single record to the history file.
    pub fn write_record(&self, record: Record) -> Result<(), HistoryError> {
        let mut file = self.file.lock().unwrap();
        file.write_all(&[record.as_string().as_bytes(), b"\n"].concat())
            .and_then(|_| file.flush())
            .map_err(|source| HistoryError::Write {
                path: self.path.clone(),
                source,
            })
    }

    /// All records in the history file, sorted by timestamp in ascending order.
    pub fn records(&self) -> Result<Vec<Record>, HistoryError> {
        let mut file = self.file.lock().unwrap();
        file.rewind().map_err(|source| HistoryError::Read {
            path: self.path.clone(),
            source,
        })?;
        Record::get_all_from_reader(&mut *file).map_err(|e| match e {
            HistoryError::Read { source, .. } => HistoryError::Read {
                path: self.path.clone(),
                source,
            },
            other => other,
        })
    }
}

/// A single event in the life of a commit attempt.
#[derive(Debug, PartialEq, Clone)]
pub struct Record {
    pub timestamp: NaiveDateTime,
    pub event: Event,
    pub obj_id: String,
    pub comment: Option<String>,
}

impl Record {
    pub fn new(event: Event, obj_id: &str, comment: Option<String>) -> Self {
        Record {
            timestamp: chrono::Utc::now().naive_utc(),
            event,
            obj_id: obj_id.to_string(),
            comment,
        }
    }

    /// Read all Records from `reader`, sorted by timestamp in ascending order.
    pub fn get_all_from_reader(reader: impl io::Read) -> Result<Vec<Record>, HistoryError> {
        let mut records = Vec::new();
        for line in BufReader::new(reader).lines() {
            let line = line.map_err(|source| HistoryError::Read {
                path: PathBuf::new(),
                source,
            })?;
            if line.is_empty() {
                continue;
            }
            records.push(Record::from_string(&line)?);
        }
        records.sort_by_key(|record| record.timestamp);

        Ok(records)
    }

    /// Create a String from a Record.
    ///
    /// Tabs and newlines in the comment are replaced with spaces so that the record stays on
    /// one line.
    pub fn as_string(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.event,
            self.obj_id,
            match self.comment {
                Some(ref comment) => comment.replace(['\t', '\n'], " "),
                None => String::new(),
            },
        )
    }

    /// Create a Record from a &str.
    pub fn from_string(record: &str) -> Result<Self, HistoryError> {
        let malformed = || HistoryError::Malformed(record.to_string());

        let mut fields = record.splitn(4, '\t');
        let timestamp = fields.next().ok_or_else(malformed)?;
        let event = fields.next().ok_or_else(malformed)?;
        let obj_id = fields.next().ok_or_else(malformed)?;
        let comment = fields.next().filter(|c| !c.is_empty());

        let timestamp = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT).map_err(|e| {
            warn!("failed to parse timestamp: '{e}'");
            malformed()
        })?;

        Ok(Self {
            timestamp,
            event: Event::try_from(event).map_err(|_| malformed())?,
            obj_id: obj_id.to_string(),
            comment: comment.map(str::to_string),
        })
    }
}

/// All possible events that can be recorded in the history file.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Event {
    /// A commit of a changed candidate started.
    Commit,
    /// A node's derived configuration failed validation.
    ParseFailed,
    /// A new master was installed locally.
    Installed,
    /// The shared config directory could not be pushed to some nodes.
    PushFailed,
    /// Some nodes could not activate their derived configuration.
    ActivateFailed,
    /// Some nodes failed to reload the daemon.
    ReloadFailed,
    /// The commit went live on every reachable node.
    Succeeded,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        write!(
            f,
            "{}",
            match self {
                Self::Commit => "commit",
                Self::ParseFailed => "parse-failed",
                Self::Installed => "installed",
                Self::PushFailed => "push-failed",
                Self::ActivateFailed => "activate-failed",
                Self::ReloadFailed => "reload-failed",
                Self::Succeeded => "succeeded",
            }
        )
    }
}

impl TryFrom<&str> for Event {
    type Error = String;
    fn try_from(val: &str) -> Result<Self, Self::Error> {
        Ok(match val {
            "commit" => Self::Commit,
            "parse-failed" => Self::ParseFailed,
            "installed" => Self::Installed,
            "push-failed" => Self::PushFailed,
            "activate-failed" => Self::ActivateFailed,
            "reload-failed" => Self::ReloadFailed,
            "succeeded" => Self::Succeeded,
            _ => return Err(format!("failed to parse '{val}' as Event")),
        })
    }
}

// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

//! store.rs
//!
//! On-disk layout of the master template, the node-derived configuration files and the archive
//! of superseded masters:
//!
//! ```text
//! {config_dir}/{master}                             live master template
//! {config_dir}/{master}_{node}                      derived per-node configuration
//! {config_dir}/archive/{master}_{YYYY-MM-DD_HH:MM:SS} superseded masters (UTC)
//! ```

use std::{
    fs, io,
    io::Write,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

use {
    chrono::{DateTime, Utc},
    log::{debug, info},
    thiserror::Error,
};

pub const ARCHIVE_DIR: &str = "archive";

/// Format of the timestamp suffix on archive entries.
pub const ARCHIVE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H:%M:%S";

/// Mode given to the master and node files when they are first written.
pub const DEFAULT_FILE_MODE: u32 = 0o644;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cannot read '{}': {source}", path.display())]
    NotReadable { path: PathBuf, source: io::Error },

    #[error("cannot write '{}': {source}", path.display())]
    NotWritable { path: PathBuf, source: io::Error },

    #[error("cannot create directory '{}': {source}", path.display())]
    Layout { path: PathBuf, source: io::Error },

    #[error("cannot archive master to '{}': {source}", path.display())]
    Archive { path: PathBuf, source: io::Error },
}

pub type Result<T> = std::result::Result<T, StoreError>;

pub(crate) trait IgnoreEexist {
    fn ignore_eexist(self) -> Self;
}

impl IgnoreEexist for io::Result<()> {
    fn ignore_eexist(self) -> Self {
        match self {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// A superseded master template kept in the archive directory.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveEntry {
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ConfigStore {
    config_dir: PathBuf,
    master_basename: String,
}

impl ConfigStore {
    pub fn new(config_dir: impl Into<PathBuf>, master_basename: &str) -> Self {
        ConfigStore {
            config_dir: config_dir.into(),
            master_basename: master_basename.to_string(),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn master_basename(&self) -> &str {
        &self.master_basename
    }

    pub fn master_path(&self) -> PathBuf {
        self.config_dir.join(&self.master_basename)
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.config_dir.join(ARCHIVE_DIR)
    }

    /// The file name a node's derived configuration is stored under.
    pub fn node_config_name(&self, node: &str) -> String {
        format!("{}_{node}", self.master_basename)
    }

    pub fn node_config_path(&self, node: &str) -> PathBuf {
        self.config_dir.join(self.node_config_name(node))
    }

    /// Lock file guarding the master against concurrent edit sessions.
    pub fn lock_path(&self) -> PathBuf {
        self.config_dir.join(format!(".{}.lock", self.master_basename))
    }

    /// Create the config and archive directories if they are missing.
    pub fn ensure_layout(&self) -> Result<()> {
        for dir in [&self.config_dir, &self.archive_dir()] {
            let layout_err = |source: io::Error| StoreError::Layout {
                path: dir.to_path_buf(),
                source,
            };
            fs::create_dir_all(dir).ignore_eexist().map_err(layout_err)?;
            if !dir.is_dir() {
                return Err(layout_err(io::Error::other("exists and is not a directory")));
            }
        }
        Ok(())
    }

    /// Read the live master template.
    ///
    /// A master that does not exist yet reads as an empty template, so that the first commit on a
    /// fresh cluster can bootstrap it.
    pub fn load_master(&self) -> Result<String> {
        let path = self.master_path();
        match fs::read_to_string(&path) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("master '{}' does not exist yet", path.display());
                Ok(String::new())
            }
            Err(source) => Err(StoreError::NotReadable { path, source }),
        }
    }

    /// Archive the current master and replace it with `text`.
    ///
    /// Returns the archive entry that was created, if there was a master to archive.
    pub fn install_master(&self, text: &str) -> Result<Option<ArchiveEntry>> {
        self.install_master_at(text, Utc::now())
    }

    /// Same as `install_master()`, with the archive timestamp supplied by the caller.
    pub fn install_master_at(
        &self,
        text: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Option<ArchiveEntry>> {
        let entry = self.archive_master(timestamp)?;
        write_atomic(&self.config_dir, &self.master_path(), text)?;
        info!("installed new master '{}'", self.master_path().display());
        Ok(entry)
    }

    /// Write the derived configuration of `node` into the shared config directory.
    pub fn save_node_config(&self, node: &str, text: &str) -> Result<PathBuf> {
        let path = self.node_config_path(node);
        write_atomic(&self.config_dir, &path, text)?;
        debug!("saved node config '{}'", path.display());
        Ok(path)
    }

    /// Read back the derived configuration of `node`.
    pub fn load_node_config(&self, node: &str) -> Result<String> {
        let path = self.node_config_path(node);
        fs::read_to_string(&path).map_err(|source| StoreError::NotReadable { path, source })
    }

    /// The active master, or the derived configuration of `node`.
    pub fn active_config(&self, node: Option<&str>) -> Result<String> {
        match node {
            Some(node) => self.load_node_config(node),
            None => self.load_master(),
        }
    }

    /// All archive entries, oldest first.
    pub fn archive_entries(&self) -> Result<Vec<ArchiveEntry>> {
        let dir = self.archive_dir();
        let prefix = format!("{}_", self.master_basename);
        let read_dir = match fs::read_dir(&dir) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(StoreError::NotReadable { path: dir, source }),
        };

        let mut entries = Vec::new();
        for dirent in read_dir {
            let dirent = dirent.map_err(|source| StoreError::NotReadable {
                path: dir.clone(),
                source,
            })?;
            let name = dirent.file_name().to_string_lossy().into_owned();
            if name.starts_with(&prefix) {
                entries.push(ArchiveEntry {
                    name,
                    path: dirent.path(),
                });
            }
        }
        // Timestamps sort lexically; a collision counter sorts after the plain name.
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Copy the current master into the archive. Existing entries are never overwritten: when an
    /// entry for the same second already exists, a `.N` counter is appended.
    fn archive_master(&self, timestamp: DateTime<Utc>) -> Result<Option<ArchiveEntry>> {
        let master_path = self.master_path();
        let current = match fs::read(&master_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::NotReadable {
                    path: master_path,
                    source,
                })
            }
        };

        let base = format!(
            "{}_{}",
            self.master_basename,
            timestamp.format(ARCHIVE_TIMESTAMP_FORMAT)
        );

        let mut counter = 0;
        loop {
            let name = match counter {
                0 => base.clone(),
                n => format!("{base}.{n}"),
            };
            let path = self.archive_dir().join(&name);
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(mut file) => {
                    file.write_all(&current)
                        .and_then(|_| file.sync_all())
                        .map_err(|source| StoreError::Archive {
                            path: path.clone(),
                            source,
                        })?;
                    info!("archived previous master to '{}'", path.display());
                    return Ok(Some(ArchiveEntry { name, path }));
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => counter += 1,
                Err(source) => return Err(StoreError::Archive { path, source }),
            }
        }
    }
}

/// Replace `path` with `text` without ever exposing a partially written file: the content is
/// written to a temporary file in `dir` and renamed over `path`.
///
/// The replacement keeps the permissions of the file it replaces, or gets `DEFAULT_FILE_MODE`.
fn write_atomic(dir: &Path, path: &Path, text: &str) -> Result<()> {
    let not_writable = |source: io::Error| StoreError::NotWritable {
        path: path.to_path_buf(),
        source,
    };

    let permissions = match fs::metadata(path) {
        Ok(metadata) => metadata.permissions(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::Permissions::from_mode(DEFAULT_FILE_MODE)
        }
        Err(source) => return Err(not_writable(source)),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(not_writable)?;
    tmp.as_file()
        .set_permissions(permissions)
        .map_err(not_writable)?;
    tmp.write_all(text.as_bytes()).map_err(not_writable)?;
    tmp.as_file().sync_all().map_err(not_writable)?;
    tmp.persist(path).map_err(|e| not_writable(e.error))?;
    Ok(())
}

//! Rotating on-disk cache of emitted frames.

use super::{ArtifactKind, SinkError};
use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{trace, warn};

/// Suffix shared by every cached artifact file name.
pub const FILENAME_SUFFIX: &str = "canvascamera";

/// Ring of the most recent `depth` frames on disk.
///
/// Frame ids start at 1 for each session. Advancing to frame `N` removes
/// every written frame at or below `N - depth` and any stale file already
/// at `N`, so at most `depth` frames per artifact kind exist at once even
/// when workers finish out of order.
#[derive(Debug)]
pub struct FileRing {
    dir: PathBuf,
    depth: u64,
    current: u64,
    written: BTreeSet<u64>,
}

impl FileRing {
    /// Opens a ring in `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>, depth: u32) -> Result<Self, SinkError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| SinkError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self {
            dir,
            depth: u64::from(depth.max(1)),
            current: 0,
            written: BTreeSet::new(),
        })
    }

    /// Path of one artifact, e.g. `f12-canvascamera.jpg`.
    pub fn path(&self, kind: ArtifactKind, id: u64) -> PathBuf {
        self.dir
            .join(format!("{}{}-{}.jpg", kind.prefix(), id, FILENAME_SUFFIX))
    }

    /// Reserves the next frame id and evicts what it replaces.
    pub fn advance(&mut self) -> u64 {
        self.current += 1;
        let id = self.current;

        let mut evicted = Vec::new();
        if id > self.depth {
            let horizon = id - self.depth;
            let kept = self.written.split_off(&(horizon + 1));
            evicted.extend(std::mem::replace(&mut self.written, kept));
            if evicted.last() != Some(&horizon) {
                evicted.push(horizon);
            }
        }
        self.written.remove(&id);
        evicted.push(id);

        for old in evicted {
            for kind in [ArtifactKind::Fullsize, ArtifactKind::Thumbnail] {
                remove_quietly(&self.path(kind, old));
            }
        }

        id
    }

    /// Writes one artifact of frame `id` and returns its path.
    ///
    /// A frame that already fell out of the ring is written and removed on
    /// the next [`advance`](Self::advance).
    pub fn write(&mut self, kind: ArtifactKind, id: u64, bytes: &[u8]) -> Result<PathBuf, SinkError> {
        let path = self.path(kind, id);
        fs::write(&path, bytes).map_err(|source| SinkError::Io {
            path: path.clone(),
            source,
        })?;
        self.written.insert(id);
        trace!(path = %path.display(), bytes = bytes.len(), "Cached artifact written");
        Ok(path)
    }

    /// Deletes every cached artifact in `dir`. Returns how many were removed.
    ///
    /// A missing directory counts as already clean.
    pub fn cleanup_all(dir: &Path) -> Result<usize, SinkError> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(source) => {
                return Err(SinkError::Io {
                    path: dir.to_path_buf(),
                    source,
                })
            }
        };

        let suffix = format!("-{}.jpg", FILENAME_SUFFIX);
        let mut removed = 0;

        for entry in entries.flatten() {
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            let matches = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.ends_with(&suffix));

            if is_file && matches {
                match fs::remove_file(entry.path()) {
                    Ok(()) => removed += 1,
                    Err(e) => warn!(path = %entry.path().display(), error = %e, "Could not delete cached file"),
                }
            }
        }

        trace!(dir = %dir.display(), removed, "Cache cleaned");
        Ok(removed)
    }
}

fn remove_quietly(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => trace!(path = %path.display(), "Evicted cached file"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Could not delete cached file"),
    }
}

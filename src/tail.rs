//! Incremental reader for a growing log file.
//!
//! `LogTail` opens its source once and starts at the current end, so
//! historical content is never replayed. Every `poll` returns the complete
//! lines appended since the previous call. A trailing fragment without a
//! newline stays buffered until a later poll completes it.
//!
//! Truncation and rotation are not handled: a file that shrinks below the
//! committed position simply yields nothing until it grows past it again.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::mem;
use std::path::{Path, PathBuf};

use crate::error::SourceError;

/// Upper bound on bytes consumed by a single poll; the rest is read next cycle.
pub const MAX_READ_BYTES: u64 = 8 * 1024 * 1024;

/// Tails a byte source line by line.
#[derive(Debug)]
pub struct LogTail<S = File> {
    path: PathBuf,
    source: S,
    position: u64,
    pending: Vec<u8>,
}

impl LogTail<File> {
    /// Opens `path` and positions the reader at its current end.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(SourceError::NotFound { path });
        }

        let file = File::open(&path).map_err(|source| SourceError::Open {
            path: path.clone(),
            source,
        })?;

        Self::at_end(path, file)
    }
}

impl<S: Read + Seek> LogTail<S> {
    /// Wraps an already-open source, positioned at its current end.
    ///
    /// `path` is only used to label errors.
    pub fn at_end(path: impl Into<PathBuf>, mut source: S) -> Result<Self, SourceError> {
        let path = path.into();
        let position = source.seek(SeekFrom::End(0)).map_err(|source| SourceError::Open {
            path: path.clone(),
            source,
        })?;

        Ok(Self {
            path,
            source,
            position,
            pending: Vec::new(),
        })
    }

    /// Returns the complete, non-blank lines appended since the last poll.
    ///
    /// On error nothing is consumed: the committed position and the buffered
    /// fragment are unchanged, so the next poll retries the same bytes.
    pub fn poll(&mut self) -> Result<Vec<String>, SourceError> {
        let chunk = self.read_chunk().map_err(|source| SourceError::Read {
            path: self.path.clone(),
            source,
        })?;

        if chunk.is_empty() {
            return Ok(Vec::new());
        }

        self.position += chunk.len() as u64;
        self.pending.extend_from_slice(&chunk);

        let Some(last_newline) = self.pending.iter().rposition(|&b| b == b'\n') else {
            return Ok(Vec::new());
        };

        let rest = self.pending.split_off(last_newline + 1);
        let complete = mem::replace(&mut self.pending, rest);

        Ok(complete
            .split(|&b| b == b'\n')
            .filter_map(|raw| {
                let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
                let line = String::from_utf8_lossy(raw);
                if line.trim().is_empty() {
                    None
                } else {
                    Some(line.into_owned())
                }
            })
            .collect())
    }

    fn read_chunk(&mut self) -> std::io::Result<Vec<u8>> {
        self.source.seek(SeekFrom::Start(self.position))?;
        let mut buf = Vec::new();
        (&mut self.source).take(MAX_READ_BYTES).read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Byte offset consumed so far (including any buffered fragment).
    #[must_use]
    pub const fn position(&self) -> u64 {
        self.position
    }

    /// Length of the buffered, unterminated fragment.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Path this reader was opened on.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The underlying source.
    #[must_use]
    pub fn get_ref(&self) -> &S {
        &self.source
    }

    /// Mutable access to the underlying source.
    ///
    /// Reads must go through `poll`; seeking the source directly is harmless
    /// because every poll seeks to the committed position first.
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.source
    }
}

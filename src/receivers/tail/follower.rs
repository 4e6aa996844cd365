// SPDX-License-Identifier: Apache-2.0

//! Single-file follower: owns the file handle and the cursor into it.
//!
//! Every check first reconciles the cursor with what the path currently
//! refers to, then reads whatever was appended since the last check. The
//! identity of the file (device + inode) decides rotation, its length
//! decides truncation.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::config::{StartAt, TailConfig};
use super::error::Result;
use super::file_id::FileId;
use super::reader::LineReader;
use crate::topology::payload::LogLine;

const READ_CHUNK_SIZE: usize = 64 * 1024;

/// How much of which file has been consumed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileCursor {
    /// `None` while no file is attached
    pub file_id: Option<FileId>,
    /// Bytes consumed from the attached file, including a buffered partial line
    pub offset: u64,
}

pub struct Follower {
    path: PathBuf,
    reopen: bool,
    cursor: FileCursor,
    file: Option<File>,
    lines: LineReader,
    buf: Vec<u8>,
}

impl Follower {
    pub fn new(path: PathBuf, config: &TailConfig) -> Self {
        Self {
            path,
            reopen: config.reopen,
            cursor: FileCursor::default(),
            file: None,
            lines: LineReader::new(config.max_line_size),
            buf: vec![0u8; READ_CHUNK_SIZE],
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn cursor(&self) -> FileCursor {
        self.cursor
    }

    /// Attach to the file present at startup, honouring `start_at`.
    /// A missing file is not an error; it is picked up by a later check.
    pub fn open_initial(&mut self, start_at: StartAt) -> Result<()> {
        let Some(file) = open_if_exists(&self.path)? else {
            info!(path = ?self.path, "File does not exist yet, waiting for it to appear");
            return Ok(());
        };

        let file_id = FileId::from_file(&file)?;
        let (offset, mid_line) = match start_at {
            StartAt::Beginning => (0, false),
            StartAt::End => {
                let len = file.metadata()?.len();
                (len, !ends_with_newline(&file, len)?)
            }
        };

        debug!(path = ?self.path, file_id = %file_id, offset, mid_line, "Attached to file");
        self.attach(file_id, file, offset);
        if mid_line {
            // The writer is part way through a line; its tail is not a line.
            self.lines.skip_to_next_line();
        }
        Ok(())
    }

    /// Reconcile with the path, then pass every newly completed line to
    /// `emit`. Returns false when `emit` asked to stop.
    pub fn check<F>(&mut self, emit: &mut F) -> Result<bool>
    where
        F: FnMut(LogLine) -> bool,
    {
        self.reconcile()?;
        self.read_available(emit)
    }

    /// Unterminated remainder of the current file.
    pub fn finish(&mut self) -> Option<LogLine> {
        self.lines.finish()
    }

    fn reconcile(&mut self) -> Result<()> {
        let current = match open_if_exists(&self.path)? {
            Some(file) => Some((FileId::from_file(&file)?, file)),
            None => None,
        };

        match (self.cursor.file_id, current) {
            (None, Some((file_id, file))) => {
                info!(path = ?self.path, file_id = %file_id, "File appeared, reading from the beginning");
                self.attach(file_id, file, 0);
            }
            (Some(old), Some((file_id, file))) if old != file_id && self.reopen => {
                info!(
                    path = ?self.path,
                    old_file_id = %old,
                    new_file_id = %file_id,
                    abandoned_partial_bytes = self.lines.pending(),
                    "File rotated, reopening from the beginning"
                );
                self.attach(file_id, file, 0);
            }
            (Some(old), None) if self.reopen => {
                info!(
                    path = ?self.path,
                    file_id = %old,
                    "File removed, waiting for it to be recreated"
                );
                self.detach();
            }
            // Either unchanged, still waiting, or following the original
            // handle because reopen is off.
            _ => {}
        }

        self.check_truncation()
    }

    fn check_truncation(&mut self) -> Result<()> {
        let Some(file) = self.file.as_ref() else {
            return Ok(());
        };

        let len = file.metadata()?.len();
        if len < self.cursor.offset {
            warn!(
                path = ?self.path,
                offset = self.cursor.offset,
                len,
                "File truncated, reading from the beginning"
            );
            self.cursor.offset = 0;
            self.lines.reset();
        }
        Ok(())
    }

    fn read_available<F>(&mut self, emit: &mut F) -> Result<bool>
    where
        F: FnMut(LogLine) -> bool,
    {
        let Some(file) = self.file.as_mut() else {
            return Ok(true);
        };

        file.seek(SeekFrom::Start(self.cursor.offset))?;

        loop {
            let n = match file.read(&mut self.buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };

            self.cursor.offset += n as u64;
            if !self.lines.push(&self.buf[..n], emit) {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn attach(&mut self, file_id: FileId, file: File, offset: u64) {
        self.file = Some(file);
        self.cursor = FileCursor {
            file_id: Some(file_id),
            offset,
        };
        self.lines.reset();
    }

    fn detach(&mut self) {
        self.file = None;
        self.cursor = FileCursor::default();
        self.lines.reset();
    }
}

fn ends_with_newline(mut file: &File, len: u64) -> io::Result<bool> {
    if len == 0 {
        return Ok(true);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

fn open_if_exists(path: &Path) -> io::Result<Option<File>> {
    match File::open(path) {
        Ok(file) => Ok(Some(file)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

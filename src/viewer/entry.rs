// SPDX-License-Identifier: Apache-2.0

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::Result;

/// One record of the change log, as written by the file monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub file: String,
    pub change: String,
}

/// Read the whole file once, newest entry first.
///
/// A missing file is an empty log. Lines that are not a valid entry are
/// skipped.
pub fn load_entries(path: &Path) -> Result<Vec<LogEntry>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut entries = Vec::new();
    let mut skipped = 0usize;
    for line in BufReader::new(file).split(b'\n') {
        let line = line?;
        match serde_json::from_slice::<LogEntry>(&line) {
            Ok(entry) => entries.push(entry),
            Err(_) => skipped += 1,
        }
    }

    if skipped > 0 {
        debug!(path = ?path, skipped, "Skipped unparseable log lines");
    }

    entries.reverse();
    Ok(entries)
}

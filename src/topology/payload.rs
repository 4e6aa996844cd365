// SPDX-License-Identifier: Apache-2.0

use bytes::Bytes;
use std::fmt;
use std::sync::Arc;

/// One complete line of the followed file, without its line terminator.
///
/// The bytes are never interpreted on the forwarding path.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct LogLine(Bytes);

impl LogLine {
    pub fn new(bytes: Bytes) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Bytes> for LogLine {
    fn from(b: Bytes) -> Self {
        Self(b)
    }
}

impl From<Vec<u8>> for LogLine {
    fn from(v: Vec<u8>) -> Self {
        Self(Bytes::from(v))
    }
}

impl From<&'static str> for LogLine {
    fn from(s: &'static str) -> Self {
        Self(Bytes::from_static(s.as_bytes()))
    }
}

impl fmt::Debug for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LogLine({:?})", String::from_utf8_lossy(&self.0))
    }
}

/// Destination pub/sub channel, fixed for the life of the process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelName(Arc<str>);

impl ChannelName {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

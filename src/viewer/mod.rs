// SPDX-License-Identifier: Apache-2.0

//! One-shot read path over the change log for a human operator.
//!
//! Unlike the tail reader this reads the file as a finite batch, decodes the
//! JSON records and never talks to the broker.

mod entry;
mod error;
mod state;

pub use entry::{LogEntry, load_entries};
pub use error::{Error, Result};
pub use state::{DEFAULT_LIMIT, Flow, Key, ViewerState};

// SPDX-License-Identifier: Apache-2.0

//! Follows an append-only change log and forwards every complete line to a
//! Redis pub/sub channel.
//!
//! The pipeline has three parts:
//! - [`receivers::tail`] follows the file across rotation and truncation and
//!   yields complete lines, in order.
//! - [`exporters::redis`] owns the broker connection and publishes one line at
//!   a time.
//! - [`topology::forwarder`] moves lines from the first to the second and
//!   decides what happens when a publish fails.
//!
//! [`viewer`] is a separate, one-shot read path over the same file.

pub mod bounded_channel;
pub mod exporters;
pub mod init;
pub mod receivers;
pub mod topology;
pub mod viewer;

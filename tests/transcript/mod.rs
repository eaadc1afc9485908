//! Server transcripts for integration testing
//!
//! Tests describe what each session received from the server with a
//! [`Transcript`] and either feed it straight into the state handlers
//! through a [`Harness`], or write it to disk for the replay code and
//! the CLI.
//!
//! ## Module layout
//!
//! - `builder` -- transcript lines (FETCH, FLAGS, literals, local commands)
//! - `harness` -- one shared mailbox plus a view per session

#![allow(dead_code)]

mod builder;
mod harness;

pub use builder::{Transcript, envelope};
pub use harness::Harness;

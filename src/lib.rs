//! Core of a tape backup archiver: block-aligned device I/O, an
//! authenticated-encryption chunk codec, a self-describing archive stream,
//! on-medium labels and tables of contents, a multi-threaded write pipeline,
//! multi-tape spanning, a pool/catalog state machine and a restore planner.
//!
//! Re-exports the pieces an orchestrator needs to drive a full backup or
//! restore run; each module's own doc comment covers its corner of the
//! design in more depth.

pub mod archive;
pub mod blocked;
pub mod catalog;
pub mod codec;
pub mod config;
pub mod device;
pub mod encryption;
pub mod error;
pub mod label;
pub mod pipeline;
pub mod restore;
pub mod run;
pub mod spanning;

pub use error::{ErrorKind, TapeError, TapeResult, TapeUnavailable};

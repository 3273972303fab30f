//! Document-processing workflows.
//!
//! `local` handles a single file on disk (CLI mode); `remote` drains the
//! watched Dropbox folder's change stream (server mode).

pub mod local;
pub mod remote;

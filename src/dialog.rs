//! File chooser contract.
//!
//! The chooser UI belongs to the host. This module only defines what an
//! identity asks of it and what it hands back; see `Location::read_dialog`
//! and friends for the binding side.

use std::path::PathBuf;

use crate::identity::FileKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogRequest {
    /// What the chosen file will be used for.
    pub purpose: FileKind,
    pub prompt: Option<String>,
    pub default_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogOutcome {
    Chosen(PathBuf),
    Cancelled,
}

/// Host-provided file chooser.
pub trait FileChooser {
    fn choose_for_read(&mut self, request: &DialogRequest) -> DialogOutcome;

    fn choose_for_write(&mut self, request: &DialogRequest) -> DialogOutcome;

    /// Hands the request to the host UI without blocking the caller (the host
    /// keeps audio running while it is up) and reports through `done`.
    /// The default completes synchronously.
    fn choose_for_write_async(&mut self, request: DialogRequest, done: Box<dyn FnOnce(DialogOutcome)>) {
        let outcome = self.choose_for_write(&request);
        done(outcome);
    }
}

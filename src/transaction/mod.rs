// src/transaction/mod.rs

//! Deferred operation sequencer
//!
//! Adapter changes are planned while the installer has the install database
//! but maybe not the rights to act, and executed later in a deferred phase
//! that has the rights but none of the planning context. Everything that
//! crosses that boundary travels in sequence files.
//!
//! # Lifecycle of one logical action
//!
//! ```text
//! PLANNED -> PENDING (sequence file) -> EXECUTED -> COMMIT_PENDING | ROLLBACK_PENDING -> CLEANED
//!                                                    (both companion files written)
//! ```
//!
//! The primary run writes two companion files, `<stem>-cm<ext>` and
//! `<stem>-rb<ext>`. Each ends with an operation deleting the other one, so
//! whichever the host runs first retires its sibling and a later run of the
//! sibling finds nothing and succeeds. This is a tombstone, not a lock: it
//! relies on the host running at most one of Commit/Rollback per transaction
//! and on Rollback being scheduled to run after the primary action on every
//! path, failures included.

mod executor;
pub mod journal;
mod planner;

pub use executor::{process_deferred_action, ExecutionReport};
pub use planner::{evaluate_adapters, rollback_disabled, PlannedAction, PlannedActions};

use crate::adapter::AdapterDriver;
use crate::host::Host;
use crate::operation::Sequence;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

/// Terminal cleanup branches a primary run prepares for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupAction {
    Commit,
    Rollback,
}

impl CleanupAction {
    pub const ALL: [CleanupAction; 2] = [CleanupAction::Commit, CleanupAction::Rollback];

    /// Two-character marker inserted into companion file names
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Commit => "cm",
            Self::Rollback => "rb",
        }
    }

    /// Appended to the deferred action name to form the cleanup action name
    pub fn name(self) -> &'static str {
        match self {
            Self::Commit => "Commit",
            Self::Rollback => "Rollback",
        }
    }

    /// The other branch
    pub fn sibling(self) -> Self {
        match self {
            Self::Commit => Self::Rollback,
            Self::Rollback => Self::Commit,
        }
    }

    /// Host property holding this branch's companion path for `action`
    pub fn property_name(self, action: &str) -> String {
        format!("{}{}", action, self.name())
    }

    /// Companion file of `primary` for this branch
    ///
    /// `/tmp/Ins1F.tmp` becomes `/tmp/Ins1F-cm.tmp`; a path without an
    /// extension just gets `-cm` appended.
    pub fn companion_path(self, primary: &Path) -> PathBuf {
        let mut name: OsString = primary
            .file_stem()
            .map(OsStr::to_os_string)
            .unwrap_or_default();
        name.push("-");
        name.push(self.suffix());
        if let Some(ext) = primary.extension() {
            name.push(".");
            name.push(ext);
        }
        primary.with_file_name(name)
    }
}

/// State of one executor invocation
///
/// Holds the host and driver handles, the failure policy and the two cleanup
/// sequences built up while a primary run executes. Nothing in it outlives the
/// invocation; anything a later phase needs is written to a file.
pub(crate) struct Session<'a> {
    host: &'a mut dyn Host,
    driver: &'a mut dyn AdapterDriver,
    /// Keep going after a failed operation (cleanup runs)
    continue_on_error: bool,
    /// Record inverses of adapter creations
    rollback_enabled: bool,
    commit_seq: Sequence,
    rollback_seq: Sequence,
}

impl<'a> Session<'a> {
    pub(crate) fn new(
        host: &'a mut dyn Host,
        driver: &'a mut dyn AdapterDriver,
        continue_on_error: bool,
    ) -> Self {
        Self {
            host,
            driver,
            continue_on_error,
            rollback_enabled: true,
            commit_seq: Sequence::new(),
            rollback_seq: Sequence::new(),
        }
    }

    pub(crate) fn continue_on_error(&self) -> bool {
        self.continue_on_error
    }

    pub(crate) fn rollback_enabled(&self) -> bool {
        self.rollback_enabled
    }

    pub(crate) fn set_rollback_enabled(&mut self, enabled: bool) {
        self.rollback_enabled = enabled;
    }

    pub(crate) fn host(&mut self) -> &mut (dyn Host + 'a) {
        &mut *self.host
    }

    pub(crate) fn driver(&mut self) -> &mut (dyn AdapterDriver + 'a) {
        &mut *self.driver
    }

    /// Cleanup sequence accumulated for `action`
    pub(crate) fn cleanup_seq(&self, action: CleanupAction) -> &Sequence {
        match action {
            CleanupAction::Commit => &self.commit_seq,
            CleanupAction::Rollback => &self.rollback_seq,
        }
    }

    pub(crate) fn cleanup_seq_mut(&mut self, action: CleanupAction) -> &mut Sequence {
        match action {
            CleanupAction::Commit => &mut self.commit_seq,
            CleanupAction::Rollback => &mut self.rollback_seq,
        }
    }

    /// Hand the handles back along with the rollback sequence, dropping the
    /// commit sequence
    pub(crate) fn into_rollback(
        self,
    ) -> (&'a mut dyn Host, &'a mut dyn AdapterDriver, Sequence) {
        (self.host, self.driver, self.rollback_seq)
    }
}

// src/transaction/executor.rs

//! Deferred execution of a sequence file
//!
//! A primary run (deferred mode) stops at the first failed operation and then
//! writes the commit and rollback companion files, whatever the outcome. A
//! cleanup run (commit or rollback mode) drains its sequence, logging
//! failures, and always reports success so one stuck adapter cannot block the
//! host's own bookkeeping. Cleanup runs write no further cleanup files.

use crate::adapter::{AdapterDriver, CreateOutcome};
use crate::host::{Host, ProgressReply};
use crate::operation::{Operation, OperationKind, Sequence};
use crate::{Error, Result};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use super::journal::{load, save_to_path};
use super::{CleanupAction, Session};

/// What one executor invocation did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    /// Commit or rollback run
    pub cleanup_mode: bool,
    /// Nothing to do: no invocation data, or the cleanup file was already gone
    pub skipped: bool,
    /// Operations that completed
    pub succeeded: usize,
    /// Operations that failed (only ever more than one in cleanup runs)
    pub failed: usize,
    /// Both companion files were written
    pub cleanup_persisted: bool,
    /// Companion files could not be written and rollback ran immediately
    pub fallback_rollback: bool,
}

impl ExecutionReport {
    fn new(cleanup_mode: bool) -> Self {
        Self {
            cleanup_mode,
            ..Default::default()
        }
    }

    fn skipped(cleanup_mode: bool) -> Self {
        Self {
            cleanup_mode,
            skipped: true,
            ..Default::default()
        }
    }
}

/// Run the sequence file this deferred invocation was handed
///
/// The invocation data holds the sequence path. The consumed file is deleted
/// afterwards so it can never be replayed.
pub fn process_deferred_action(
    host: &mut dyn Host,
    driver: &mut dyn AdapterDriver,
) -> Result<ExecutionReport> {
    let cleanup_mode = host.run_mode().is_cleanup();

    let data = host.invocation_data()?;
    let data = data.trim();
    if data.is_empty() {
        info!("No sequence file for this action, nothing to do");
        return Ok(ExecutionReport::skipped(cleanup_mode));
    }
    let seq_path = PathBuf::from(data);

    let seq = match open_sequence(&seq_path, cleanup_mode)? {
        Some(seq) => seq,
        None => return Ok(ExecutionReport::skipped(cleanup_mode)),
    };
    info!(
        "Processing {} operation(s) from {}{}",
        seq.len(),
        seq_path.display(),
        if cleanup_mode { " (cleanup)" } else { "" }
    );

    let mut report = ExecutionReport::new(cleanup_mode);
    let mut session = Session::new(host, driver, cleanup_mode);
    let result = execute_sequence(&mut session, seq, &mut report);

    let result = if cleanup_mode {
        if let Err(e) = result {
            warn!("Cleanup finished with errors: {}", e);
        }
        Ok(())
    } else {
        persist_cleanup(session, &seq_path, &mut report);
        result
    };

    remove_consumed(&seq_path);

    match &result {
        Ok(()) => info!(
            "Finished {}: {} succeeded, {} failed",
            seq_path.display(),
            report.succeeded,
            report.failed
        ),
        Err(e) => error!("Aborted {}: {}", seq_path.display(), e),
    }
    result.map(|()| report)
}

/// Load the input sequence; `None` when a cleanup run finds it already gone
fn open_sequence(path: &Path, cleanup_mode: bool) -> Result<Option<Sequence>> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound && cleanup_mode => {
            // Either the sibling cleanup already ran and retired this file, or
            // the primary run could not write it and cleaned up on the spot.
            info!(
                "Cleanup sequence {} not found, nothing to do",
                path.display()
            );
            return Ok(None);
        }
        Err(e) => {
            return Err(Error::IoError(format!(
                "Failed to open sequence file {}: {}",
                path.display(),
                e
            )));
        }
    };

    let seq = load(&mut file).map_err(|e| match e {
        Error::IoError(msg) => Error::IoError(format!("{}: {}", path.display(), msg)),
        other => other,
    })?;
    Ok(Some(seq))
}

/// Consume `seq` front to back under the session's failure policy
fn execute_sequence(
    session: &mut Session<'_>,
    mut seq: Sequence,
    report: &mut ExecutionReport,
) -> Result<()> {
    let mut first_error = None;

    while let Some(op) = seq.pop_front() {
        match execute_operation(session, &op) {
            Ok(()) => report.succeeded += 1,
            Err(Error::Cancelled(msg)) => {
                info!("Cancelled before {} ({} left unprocessed)", op, seq.len());
                return Err(Error::Cancelled(msg));
            }
            Err(e) if session.continue_on_error() => {
                report.failed += 1;
                warn!("{} failed, continuing cleanup: {}", op, e);
                first_error.get_or_insert(e);
            }
            Err(e) => {
                report.failed += 1;
                error!("{} failed: {}", op, e);
                return Err(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn execute_operation(session: &mut Session<'_>, op: &Operation) -> Result<()> {
    match &op.kind {
        OperationKind::RollbackEnable(enabled) => {
            session.set_rollback_enabled(*enabled);
            debug!("Rollback recording {}", if *enabled { "on" } else { "off" });
            Ok(())
        }
        OperationKind::AdapterCreate(name) => {
            report_progress(session, op)?;
            match session.driver().create(name)? {
                CreateOutcome::Created => {
                    info!("Created adapter \"{}\"", name);
                    if session.rollback_enabled() {
                        session
                            .cleanup_seq_mut(CleanupAction::Rollback)
                            .append(Operation::adapter_delete_by_name(name).with_ticks(0));
                    }
                }
                CreateOutcome::AlreadyPresent => {
                    info!("Adapter \"{}\" already exists, leaving it in place", name);
                }
            }
            Ok(())
        }
        OperationKind::AdapterDeleteByName(name) => {
            report_progress(session, op)?;
            session.driver().delete_by_name(name)?;
            info!("Removed adapter \"{}\"", name);
            Ok(())
        }
        OperationKind::FileDelete(path) => delete_file(path),
    }
}

/// Advance the host progress bar by the ticks reserved for `op`
fn report_progress(session: &mut Session<'_>, op: &Operation) -> Result<()> {
    match session.host().advance_ticks(op.ticks)? {
        ProgressReply::Continue => Ok(()),
        // Cleanup has to run to the end
        ProgressReply::Cancel if session.continue_on_error() => {
            warn!("Ignoring cancel request during cleanup");
            Ok(())
        }
        ProgressReply::Cancel => Err(Error::Cancelled(op.to_string())),
    }
}

fn delete_file(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!("Deleted {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("{} already gone", path.display());
            Ok(())
        }
        Err(e) => Err(Error::IoError(format!(
            "Failed to delete {}: {}",
            path.display(),
            e
        ))),
    }
}

/// Write both companion files, or roll back right now if that fails
///
/// Each companion ends by deleting the other, so whichever the host runs
/// turns the other into a no-op.
fn persist_cleanup(mut session: Session<'_>, seq_path: &Path, report: &mut ExecutionReport) {
    for action in CleanupAction::ALL {
        let sibling = action.sibling().companion_path(seq_path);
        session
            .cleanup_seq_mut(action)
            .append(Operation::file_delete(&sibling));
    }

    let saved = CleanupAction::ALL.iter().try_for_each(|&action| {
        save_to_path(session.cleanup_seq(action), &action.companion_path(seq_path))
    });

    match saved {
        Ok(()) => {
            for action in CleanupAction::ALL {
                debug!(
                    "Saved {} sequence {} ({} ops)",
                    action.name(),
                    action.companion_path(seq_path).display(),
                    session.cleanup_seq(action).len()
                );
            }
            report.cleanup_persisted = true;
        }
        Err(e) => {
            error!("Failed to save cleanup sequences, rolling back now: {}", e);
            report.fallback_rollback = true;

            // Errors here are logged only; there is nothing left to fall back to.
            let (host, driver, rollback_seq) = session.into_rollback();
            let mut cleanup = Session::new(host, driver, true);
            let mut scratch = ExecutionReport::new(true);
            if let Err(e) = execute_sequence(&mut cleanup, rollback_seq, &mut scratch) {
                warn!("Immediate rollback finished with errors: {}", e);
            }

            for action in CleanupAction::ALL {
                let path = action.companion_path(seq_path);
                if let Err(e) = fs::remove_file(&path)
                    && e.kind() != io::ErrorKind::NotFound
                {
                    warn!("Failed to remove {}: {}", path.display(), e);
                }
            }
        }
    }
}

fn remove_consumed(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!("Removed consumed sequence file {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(
            "Failed to remove consumed sequence file {}: {}",
            path.display(),
            e
        ),
    }
}

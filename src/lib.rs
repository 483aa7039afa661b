// src/lib.rs

//! tapseq: deferred adapter install/uninstall sequencing
//!
//! Installer-side logic that plans virtual network adapter changes during the
//! immediate phase and carries them out in the elevated deferred phase, with
//! commit and rollback cleanup handed to the host as files.
//!
//! # Architecture
//!
//! - Planning: [`evaluate_adapters`] reads the adapter table and writes one
//!   sequence file for each of the install and uninstall actions, even when
//!   it holds nothing but the rollback switch
//! - Execution: [`process_deferred_action`] runs a sequence file and leaves
//!   commit/rollback companion files behind
//! - Persistence: sequence files are versioned and checksummed, written
//!   atomically (see [`transaction::journal`])
//! - Seams: the installer host and the adapter driver are traits, with
//!   in-memory implementations for tests and simulation

pub mod adapter;
pub mod config;
mod error;
pub mod host;
pub mod operation;
pub mod transaction;

pub use adapter::{AdapterDriver, CreateOutcome, DriverCall, MemoryDriver};
pub use config::{SequencerConfig, DEFAULT_ADAPTER_TICKS};
pub use error::{Error, Result, Status};
pub use host::{
    AdapterRow, ComponentAction, ConditionOutcome, Host, MemoryHost, ProgressReply, RunMode,
};
pub use operation::{Operation, OperationKind, Sequence};
pub use transaction::{
    evaluate_adapters, process_deferred_action, rollback_disabled, CleanupAction,
    ExecutionReport, PlannedAction, PlannedActions,
};

// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

use std::fs;
use std::path::{Path, PathBuf};
use tapseq::{
    process_deferred_action, AdapterRow, CleanupAction, ComponentAction, ExecutionReport,
    MemoryDriver, MemoryHost, PlannedActions, Result, RunMode, SequencerConfig,
};
use tempfile::TempDir;

/// Config writing sequence files into `dir`
pub fn config_in(dir: &TempDir) -> SequencerConfig {
    SequencerConfig {
        temp_dir: Some(dir.path().to_path_buf()),
        ..Default::default()
    }
}

/// Host with two adapters to install and one to remove.
///
/// TAP1 installs unconditionally, TAP2 has a false condition, OLD1 is removed.
pub fn setup_adapter_host() -> MemoryHost {
    MemoryHost::new(RunMode::Deferred)
        .with_table(
            "TAPInterface",
            vec![
                AdapterRow::new("I1", "TAP1", "", "compA"),
                AdapterRow::new("I2", "TAP2", "0", "compB"),
                AdapterRow::new("I3", "TAP3", "1", "compA"),
                AdapterRow::new("I4", "OLD1", "", "compOld"),
            ],
        )
        .with_component("compA", ComponentAction::Install)
        .with_component("compB", ComponentAction::Install)
        .with_component("compOld", ComponentAction::Remove)
}

/// Run the planner, panicking on failure
pub fn plan(host: &mut MemoryHost, config: &SequencerConfig) -> PlannedActions {
    tapseq::evaluate_adapters(host, config).unwrap()
}

/// Run one deferred phase with `path` as invocation data
pub fn run_phase(
    host: &mut MemoryHost,
    driver: &mut MemoryDriver,
    mode: RunMode,
    path: &Path,
) -> Result<ExecutionReport> {
    host.set_mode(mode);
    host.set_invocation_data(path.to_str().unwrap());
    process_deferred_action(host, driver)
}

/// Companion path the planner published for `action`
pub fn published_companion(host: &MemoryHost, action: &str, cleanup: CleanupAction) -> PathBuf {
    PathBuf::from(host.get(&cleanup.property_name(action)).unwrap())
}

/// Number of entries left in `dir`
pub fn count_entries(dir: &Path) -> usize {
    fs::read_dir(dir).unwrap().count()
}

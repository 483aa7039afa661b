// src/transaction/planner.rs

//! Adapter planning pass
//!
//! Reads the declarative adapter table, decides per row whether the adapter
//! is to be created or removed, and writes one sequence file per deferred
//! action. The deferred actions later find their file through a host property
//! named after the action.

use crate::config::SequencerConfig;
use crate::host::{AdapterRow, ComponentAction, ConditionOutcome, Host, ProgressReply};
use crate::operation::{Operation, Sequence};
use crate::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::journal::create_sequence_file;
use super::CleanupAction;

/// One sequence file written by the planner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedAction {
    /// Deferred action the file is meant for
    pub action: String,
    pub path: PathBuf,
    /// Operations in the file, including the leading rollback switch
    pub operations: usize,
    /// Ticks reserved for the file's adapter operations
    pub ticks: u64,
}

/// Everything a planning pass published
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlannedActions {
    pub actions: Vec<PlannedAction>,
}

impl PlannedActions {
    pub fn get(&self, action: &str) -> Option<&PlannedAction> {
        self.actions.iter().find(|a| a.action == action)
    }

    /// True when the adapter table was absent and nothing was written
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Whether a rollback switch value turns rollback off
///
/// Any value whose leading integer is non-zero, or that starts with `y`/`Y`,
/// disables rollback.
pub fn rollback_disabled(value: &str) -> bool {
    let starts_with_yes = value
        .chars()
        .next()
        .is_some_and(|c| c.eq_ignore_ascii_case(&'y'));
    starts_with_yes || leading_integer_nonzero(value)
}

fn leading_integer_nonzero(value: &str) -> bool {
    let trimmed = value.trim_start();
    let unsigned = trimmed
        .strip_prefix('-')
        .or_else(|| trimmed.strip_prefix('+'))
        .unwrap_or(trimmed);
    unsigned
        .chars()
        .take_while(char::is_ascii_digit)
        .any(|c| c != '0')
}

/// Plan adapter creation and removal for this transaction
///
/// Both sequences start with the rollback switch. Every file written by a
/// failed pass is deleted again before the error is returned.
pub fn evaluate_adapters(host: &mut dyn Host, config: &SequencerConfig) -> Result<PlannedActions> {
    config.validate()?;

    let rollback_enabled = match host.property(&config.rollback_disabled_property) {
        Ok(Some(value)) => !rollback_disabled(&value),
        Ok(None) => true,
        Err(e) => {
            warn!(
                "Could not read {}, leaving rollback enabled: {}",
                config.rollback_disabled_property, e
            );
            true
        }
    };
    if !rollback_enabled {
        info!("Adapter rollback disabled by {}", config.rollback_disabled_property);
    }

    let mut install = Sequence::new();
    let mut uninstall = Sequence::new();
    install.append(Operation::rollback_enable(rollback_enabled));
    uninstall.append(Operation::rollback_enable(rollback_enabled));

    let rows = match host.adapter_rows(&config.adapter_table)? {
        Some(rows) => rows,
        None => {
            info!("No {} table, nothing to plan", config.adapter_table);
            return Ok(PlannedActions::default());
        }
    };

    for row in &rows {
        plan_row(host, config, row, &mut install, &mut uninstall)?;
    }

    info!(
        "Planned {} adapter creation(s) and {} removal(s)",
        install.len() - 1,
        uninstall.len() - 1
    );

    let plans = [
        (config.install_action.as_str(), &install),
        (config.uninstall_action.as_str(), &uninstall),
    ];
    let dir = config.sequence_dir();
    let mut written = Vec::new();
    match write_sequences(host, &dir, &plans, &mut written) {
        Ok(actions) => Ok(PlannedActions { actions }),
        Err(e) => {
            for path in written.iter().rev() {
                if let Err(remove_err) = fs::remove_file(path) {
                    warn!(
                        "Failed to remove sequence file {}: {}",
                        path.display(),
                        remove_err
                    );
                }
            }
            Err(e)
        }
    }
}

fn plan_row(
    host: &mut dyn Host,
    config: &SequencerConfig,
    row: &AdapterRow,
    install: &mut Sequence,
    uninstall: &mut Sequence,
) -> Result<()> {
    let action = host.component_action(&row.component)?;
    let (target, op) = match action {
        ComponentAction::None | ComponentAction::Unchanged => {
            debug!(
                "Skipping adapter {}: component {} has nothing to do",
                row.interface_id, row.component
            );
            return Ok(());
        }
        ComponentAction::Install => {
            if !condition_holds(host, row)? {
                debug!(
                    "Skipping adapter {}: condition \"{}\" is false",
                    row.interface_id, row.condition
                );
                return Ok(());
            }
            (install, Operation::adapter_create(display_name(row)?))
        }
        // Removal follows the component, the condition is not consulted
        ComponentAction::Remove => (uninstall, Operation::adapter_delete_by_name(display_name(row)?)),
    };

    debug!("Scheduling {} for adapter {}", op, row.interface_id);
    target.append(op.with_ticks(config.adapter_ticks));

    match host.reserve_ticks(config.adapter_ticks)? {
        ProgressReply::Continue => Ok(()),
        ProgressReply::Cancel => Err(Error::Cancelled("adapter planning".to_string())),
    }
}

/// Name of an adapter that is about to be scheduled
fn display_name(row: &AdapterRow) -> Result<&str> {
    if row.display_name.trim().is_empty() {
        return Err(Error::ConfigError(format!(
            "Adapter {} has an empty display name",
            row.interface_id
        )));
    }
    Ok(&row.display_name)
}

fn condition_holds(host: &dyn Host, row: &AdapterRow) -> Result<bool> {
    if row.condition.trim().is_empty() {
        return Ok(true);
    }
    match host.evaluate_condition(&row.condition) {
        ConditionOutcome::True => Ok(true),
        ConditionOutcome::False => Ok(false),
        ConditionOutcome::Error => Err(Error::ConfigError(format!(
            "Failed to evaluate condition \"{}\" of adapter {}",
            row.condition, row.interface_id
        ))),
    }
}

fn write_sequences(
    host: &mut dyn Host,
    dir: &Path,
    plans: &[(&str, &Sequence)],
    written: &mut Vec<PathBuf>,
) -> Result<Vec<PlannedAction>> {
    let mut actions = Vec::with_capacity(plans.len());

    for &(action, seq) in plans {
        let path = create_sequence_file(seq, dir, action)?;
        written.push(path.clone());
        publish_paths(host, action, &path)?;
        debug!("Wrote {} operation(s) for {} to {}", seq.len(), action, path.display());

        actions.push(PlannedAction {
            action: action.to_string(),
            path,
            operations: seq.len(),
            ticks: seq.adapter_ticks(),
        });
    }

    Ok(actions)
}

/// Publish the primary path and pre-register both companion paths
fn publish_paths(host: &mut dyn Host, action: &str, primary: &Path) -> Result<()> {
    host.set_property(action, &path_value(primary)?)?;
    for cleanup in CleanupAction::ALL {
        let companion = cleanup.companion_path(primary);
        host.set_property(&cleanup.property_name(action), &path_value(&companion)?)?;
    }
    Ok(())
}

fn path_value(path: &Path) -> Result<String> {
    path.to_str()
        .map(str::to_string)
        .ok_or_else(|| Error::IoError(format!("Path is not valid UTF-8: {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{MemoryHost, RunMode};
    use crate::operation::OperationKind;
    use crate::transaction::journal::load_from_path;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> SequencerConfig {
        SequencerConfig {
            temp_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        }
    }

    fn kinds(seq: &Sequence) -> Vec<OperationKind> {
        seq.iter().map(|op| op.kind.clone()).collect()
    }

    #[test]
    fn test_rollback_disabled_values() {
        assert!(!rollback_disabled(""));
        assert!(!rollback_disabled("0"));
        assert!(!rollback_disabled("no"));
        assert!(!rollback_disabled("abc"));
        assert!(rollback_disabled("1"));
        assert!(rollback_disabled("  42"));
        assert!(rollback_disabled("-3"));
        assert!(rollback_disabled("007"));
        assert!(rollback_disabled("yes"));
        assert!(rollback_disabled("Y"));
    }

    #[test]
    fn test_scenario_install_with_false_condition() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_in(&temp_dir);
        let mut host = MemoryHost::new(RunMode::Deferred)
            .with_table(
                "TAPInterface",
                vec![
                    AdapterRow::new("I1", "TAP1", "", "compA"),
                    AdapterRow::new("I2", "TAP2", "0", "compB"),
                ],
            )
            .with_component("compA", ComponentAction::Install)
            .with_component("compB", ComponentAction::Install);

        let planned = evaluate_adapters(&mut host, &config).unwrap();

        let install = planned.get("InstallTAPInterfaces").unwrap();
        let seq = load_from_path(&install.path).unwrap();
        assert_eq!(
            kinds(&seq),
            vec![
                OperationKind::RollbackEnable(true),
                OperationKind::AdapterCreate("TAP1".to_string()),
            ]
        );
        assert_eq!(host.reservations(), &[config.adapter_ticks]);
        assert_eq!(install.ticks, u64::from(config.adapter_ticks));

        let uninstall = planned.get("UninstallTAPInterfaces").unwrap();
        let seq = load_from_path(&uninstall.path).unwrap();
        assert_eq!(kinds(&seq), vec![OperationKind::RollbackEnable(true)]);
    }

    #[test]
    fn test_removal_ignores_condition() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_in(&temp_dir);
        let mut host = MemoryHost::new(RunMode::Deferred)
            .with_table(
                "TAPInterface",
                vec![AdapterRow::new("I1", "TAP1", "0", "compA")],
            )
            .with_component("compA", ComponentAction::Remove);

        let planned = evaluate_adapters(&mut host, &config).unwrap();
        let seq = load_from_path(&planned.get("UninstallTAPInterfaces").unwrap().path).unwrap();
        assert_eq!(
            kinds(&seq),
            vec![
                OperationKind::RollbackEnable(true),
                OperationKind::AdapterDeleteByName("TAP1".to_string()),
            ]
        );
    }

    #[test]
    fn test_unchanged_components_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_in(&temp_dir);
        let mut host = MemoryHost::new(RunMode::Deferred)
            .with_table(
                "TAPInterface",
                vec![
                    AdapterRow::new("I1", "TAP1", "", "same"),
                    AdapterRow::new("I2", "TAP2", "", "none"),
                ],
            )
            .with_component("same", ComponentAction::Unchanged)
            .with_component("none", ComponentAction::None);

        let planned = evaluate_adapters(&mut host, &config).unwrap();
        assert_eq!(planned.get("InstallTAPInterfaces").unwrap().operations, 1);
        assert_eq!(planned.get("UninstallTAPInterfaces").unwrap().operations, 1);
        assert!(host.reservations().is_empty());
    }

    #[test]
    fn test_rollback_switch_seeds_both_sequences() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_in(&temp_dir);
        let mut host = MemoryHost::new(RunMode::Deferred)
            .with_property("RollbackDisabled", "yes")
            .with_table("TAPInterface", vec![]);

        let planned = evaluate_adapters(&mut host, &config).unwrap();
        for action in &planned.actions {
            let seq = load_from_path(&action.path).unwrap();
            assert_eq!(kinds(&seq), vec![OperationKind::RollbackEnable(false)]);
        }
    }

    #[test]
    fn test_publishes_paths() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_in(&temp_dir);
        let mut host = MemoryHost::new(RunMode::Deferred).with_table("TAPInterface", vec![]);

        let planned = evaluate_adapters(&mut host, &config).unwrap();
        let install = planned.get("InstallTAPInterfaces").unwrap();

        assert_eq!(
            host.get("InstallTAPInterfaces"),
            Some(install.path.to_str().unwrap())
        );
        let commit = CleanupAction::Commit.companion_path(&install.path);
        let rollback = CleanupAction::Rollback.companion_path(&install.path);
        assert_eq!(
            host.get("InstallTAPInterfacesCommit"),
            Some(commit.to_str().unwrap())
        );
        assert_eq!(
            host.get("InstallTAPInterfacesRollback"),
            Some(rollback.to_str().unwrap())
        );
        assert!(!commit.exists());
        assert!(!rollback.exists());
        assert!(host.get("UninstallTAPInterfaces").is_some());
    }

    #[test]
    fn test_missing_table_writes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_in(&temp_dir);
        let mut host = MemoryHost::new(RunMode::Deferred);

        let planned = evaluate_adapters(&mut host, &config).unwrap();
        assert!(planned.is_empty());
        assert!(host.properties().is_empty());
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_condition_error_aborts() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_in(&temp_dir);
        let mut host = MemoryHost::new(RunMode::Deferred)
            .with_table(
                "TAPInterface",
                vec![AdapterRow::new("I1", "TAP1", "(((", "compA")],
            )
            .with_component("compA", ComponentAction::Install);

        let result = evaluate_adapters(&mut host, &config);
        assert!(matches!(result, Err(Error::ConfigError(_))));
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_empty_display_name_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_in(&temp_dir);
        let mut host = MemoryHost::new(RunMode::Deferred)
            .with_table("TAPInterface", vec![AdapterRow::new("I1", "  ", "", "compA")])
            .with_component("compA", ComponentAction::Install);

        assert!(matches!(
            evaluate_adapters(&mut host, &config),
            Err(Error::ConfigError(_))
        ));
    }

    #[test]
    fn test_empty_display_name_on_idle_component_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_in(&temp_dir);
        let mut host = MemoryHost::new(RunMode::Deferred)
            .with_table(
                "TAPInterface",
                vec![
                    AdapterRow::new("I1", "TAP1", "", "compA"),
                    AdapterRow::new("I2", "", "", "compIdle"),
                    AdapterRow::new("I3", "", "", "compNone"),
                ],
            )
            .with_component("compA", ComponentAction::Install)
            .with_component("compIdle", ComponentAction::Unchanged)
            .with_component("compNone", ComponentAction::None);

        let planned = evaluate_adapters(&mut host, &config).unwrap();
        let seq = load_from_path(&planned.get("InstallTAPInterfaces").unwrap().path).unwrap();
        assert_eq!(
            kinds(&seq),
            vec![
                OperationKind::RollbackEnable(true),
                OperationKind::AdapterCreate("TAP1".to_string()),
            ]
        );
        assert_eq!(host.reservations().len(), 1);
    }

    #[test]
    fn test_unknown_component_is_host_error() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_in(&temp_dir);
        let mut host = MemoryHost::new(RunMode::Deferred)
            .with_table("TAPInterface", vec![AdapterRow::new("I1", "TAP1", "", "ghost")]);

        assert!(matches!(
            evaluate_adapters(&mut host, &config),
            Err(Error::HostError(_))
        ));
    }

    #[test]
    fn test_cancel_during_reservation() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_in(&temp_dir);
        let mut host = MemoryHost::new(RunMode::Deferred)
            .with_table("TAPInterface", vec![AdapterRow::new("I1", "TAP1", "", "compA")])
            .with_component("compA", ComponentAction::Install)
            .cancel_reservations();

        let result = evaluate_adapters(&mut host, &config);
        assert!(matches!(result, Err(Error::Cancelled(_))));
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_publish_failure_removes_written_files() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_in(&temp_dir);
        let mut host = MemoryHost::new(RunMode::Deferred)
            .with_table("TAPInterface", vec![])
            .read_only_properties();

        let result = evaluate_adapters(&mut host, &config);
        assert!(matches!(result, Err(Error::HostError(_))));
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_unwritable_dir_fails_cleanly() {
        let temp_dir = TempDir::new().unwrap();
        let config = SequencerConfig {
            temp_dir: Some(temp_dir.path().join("does-not-exist")),
            ..Default::default()
        };
        let mut host = MemoryHost::new(RunMode::Deferred).with_table("TAPInterface", vec![]);

        assert!(matches!(
            evaluate_adapters(&mut host, &config),
            Err(Error::IoError(_))
        ));
        assert!(host.properties().is_empty());
    }
}

// src/host.rs

//! Installer host interface
//!
//! The host is the transactional installer engine that drives planning,
//! deferred execution and the terminal commit/rollback phase. This crate never
//! looks the host up from ambient state: every entry point takes it as an
//! explicit `&mut dyn Host`.
//!
//! [`MemoryHost`] is a scripted implementation that keeps everything in
//! memory. It records properties and progress traffic, which makes it useful
//! for dry runs and tests.

use crate::{Error, Result};
use std::collections::{BTreeMap, HashMap};

/// Which phase of the host transaction is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Primary deferred execution
    Deferred,
    /// Terminal commit phase
    Commit,
    /// Terminal rollback phase
    Rollback,
}

impl RunMode {
    /// Commit and rollback runs are cleanup runs
    pub fn is_cleanup(self) -> bool {
        matches!(self, Self::Commit | Self::Rollback)
    }
}

/// What the host will do with a component in this transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentAction {
    /// No action resolved for the component
    None,
    /// Component stays as it is
    Unchanged,
    /// Component will be installed
    Install,
    /// Component will be removed or degraded to advertised
    Remove,
}

/// Result of evaluating a host condition expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionOutcome {
    True,
    False,
    Error,
}

/// Host reply to a progress message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressReply {
    Continue,
    Cancel,
}

/// One row of the declarative adapter table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterRow {
    pub interface_id: String,
    /// Adapter display name, already formatted by the host
    pub display_name: String,
    /// Host condition expression; empty means always
    pub condition: String,
    /// Component whose install state drives this row
    pub component: String,
}

impl AdapterRow {
    pub fn new(interface_id: &str, display_name: &str, condition: &str, component: &str) -> Self {
        Self {
            interface_id: interface_id.to_string(),
            display_name: display_name.to_string(),
            condition: condition.to_string(),
            component: component.to_string(),
        }
    }
}

/// Capabilities the sequencer consumes from the installer host
pub trait Host {
    /// Phase this invocation runs in
    fn run_mode(&self) -> RunMode;

    /// Data the host handed to this deferred invocation (the sequence path)
    fn invocation_data(&self) -> Result<String>;

    /// Read a property; `None` when unset
    fn property(&self, name: &str) -> Result<Option<String>>;

    /// Publish a property for later phases
    fn set_property(&mut self, name: &str, value: &str) -> Result<()>;

    /// Rows of a declarative table; `None` when the table does not exist
    fn adapter_rows(&self, table: &str) -> Result<Option<Vec<AdapterRow>>>;

    /// Resolve the action the transaction takes on a component
    fn component_action(&self, component: &str) -> Result<ComponentAction>;

    /// Evaluate a condition expression
    fn evaluate_condition(&self, condition: &str) -> ConditionOutcome;

    /// Add ticks to the expected progress total (planning)
    fn reserve_ticks(&mut self, ticks: u32) -> Result<ProgressReply>;

    /// Move the progress bar forward (execution)
    fn advance_ticks(&mut self, ticks: u32) -> Result<ProgressReply>;
}

/// In-memory scripted host
#[derive(Debug, Clone)]
pub struct MemoryHost {
    mode: RunMode,
    invocation_data: String,
    properties: BTreeMap<String, String>,
    tables: HashMap<String, Vec<AdapterRow>>,
    components: HashMap<String, ComponentAction>,
    conditions: HashMap<String, ConditionOutcome>,
    reserved: Vec<u32>,
    advanced: Vec<u32>,
    /// Reply Cancel once this many advances have been reported
    cancel_after: Option<usize>,
    cancel_reservations: bool,
    read_only_properties: bool,
}

impl MemoryHost {
    pub fn new(mode: RunMode) -> Self {
        Self {
            mode,
            invocation_data: String::new(),
            properties: BTreeMap::new(),
            tables: HashMap::new(),
            components: HashMap::new(),
            conditions: HashMap::new(),
            reserved: Vec::new(),
            advanced: Vec::new(),
            cancel_after: None,
            cancel_reservations: false,
            read_only_properties: false,
        }
    }

    pub fn with_invocation_data(mut self, data: &str) -> Self {
        self.invocation_data = data.to_string();
        self
    }

    pub fn with_property(mut self, name: &str, value: &str) -> Self {
        self.properties.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_table(mut self, table: &str, rows: Vec<AdapterRow>) -> Self {
        self.tables.insert(table.to_string(), rows);
        self
    }

    pub fn with_component(mut self, component: &str, action: ComponentAction) -> Self {
        self.components.insert(component.to_string(), action);
        self
    }

    pub fn with_condition(mut self, condition: &str, outcome: ConditionOutcome) -> Self {
        self.conditions.insert(condition.to_string(), outcome);
        self
    }

    /// Reply Cancel to every advance after the first `count`
    pub fn cancel_after_advances(mut self, count: usize) -> Self {
        self.cancel_after = Some(count);
        self
    }

    /// Reply Cancel to every tick reservation
    pub fn cancel_reservations(mut self) -> Self {
        self.cancel_reservations = true;
        self
    }

    /// Fail every `set_property` call
    pub fn read_only_properties(mut self) -> Self {
        self.read_only_properties = true;
        self
    }

    pub fn set_mode(&mut self, mode: RunMode) {
        self.mode = mode;
    }

    pub fn set_invocation_data(&mut self, data: &str) {
        self.invocation_data = data.to_string();
    }

    /// Property value, if set
    pub fn get(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    /// Each reservation, in order
    pub fn reservations(&self) -> &[u32] {
        &self.reserved
    }

    /// Each advance, in order
    pub fn advances(&self) -> &[u32] {
        &self.advanced
    }

    pub fn reserved_total(&self) -> u64 {
        self.reserved.iter().map(|&t| u64::from(t)).sum()
    }

    pub fn advanced_total(&self) -> u64 {
        self.advanced.iter().map(|&t| u64::from(t)).sum()
    }
}

impl Host for MemoryHost {
    fn run_mode(&self) -> RunMode {
        self.mode
    }

    fn invocation_data(&self) -> Result<String> {
        Ok(self.invocation_data.clone())
    }

    fn property(&self, name: &str) -> Result<Option<String>> {
        Ok(self.properties.get(name).cloned())
    }

    fn set_property(&mut self, name: &str, value: &str) -> Result<()> {
        if self.read_only_properties {
            return Err(Error::HostError(format!(
                "Property '{}' is read-only",
                name
            )));
        }
        self.properties.insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn adapter_rows(&self, table: &str) -> Result<Option<Vec<AdapterRow>>> {
        Ok(self.tables.get(table).cloned())
    }

    fn component_action(&self, component: &str) -> Result<ComponentAction> {
        self.components
            .get(component)
            .copied()
            .ok_or_else(|| Error::HostError(format!("Unknown component '{}'", component)))
    }

    fn evaluate_condition(&self, condition: &str) -> ConditionOutcome {
        if let Some(outcome) = self.conditions.get(condition) {
            return *outcome;
        }
        match condition.trim() {
            "" | "1" => ConditionOutcome::True,
            "0" => ConditionOutcome::False,
            _ => ConditionOutcome::Error,
        }
    }

    fn reserve_ticks(&mut self, ticks: u32) -> Result<ProgressReply> {
        self.reserved.push(ticks);
        if self.cancel_reservations {
            return Ok(ProgressReply::Cancel);
        }
        Ok(ProgressReply::Continue)
    }

    fn advance_ticks(&mut self, ticks: u32) -> Result<ProgressReply> {
        self.advanced.push(ticks);
        match self.cancel_after {
            Some(limit) if self.advanced.len() > limit => Ok(ProgressReply::Cancel),
            _ => Ok(ProgressReply::Continue),
        }
    }
}

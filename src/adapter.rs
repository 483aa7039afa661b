// src/adapter.rs

//! Adapter driver interface
//!
//! Creating and removing the virtual adapter is the driver layer's business;
//! the sequencer only calls through this trait. [`MemoryDriver`] tracks
//! adapters by display name and can be told to fail specific calls.

use crate::{Error, Result};
use std::collections::HashSet;

/// What `create` actually did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    /// A new adapter was created
    Created,
    /// An adapter with this name already existed and was left alone
    AlreadyPresent,
}

/// Low-level adapter create/delete capability
pub trait AdapterDriver {
    /// Create an adapter with the given display name
    fn create(&mut self, name: &str) -> Result<CreateOutcome>;

    /// Remove every adapter with the given display name. Finding none is
    /// success.
    fn delete_by_name(&mut self, name: &str) -> Result<()>;
}

/// One recorded driver call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    Create(String),
    Delete(String),
}

/// In-memory adapter driver
#[derive(Debug, Default, Clone)]
pub struct MemoryDriver {
    adapters: Vec<String>,
    calls: Vec<DriverCall>,
    failing_creates: HashSet<String>,
    failing_deletes: HashSet<String>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an adapter already present
    pub fn with_adapter(mut self, name: &str) -> Self {
        self.adapters.push(name.to_string());
        self
    }

    /// Make `create(name)` fail
    pub fn fail_create(mut self, name: &str) -> Self {
        self.failing_creates.insert(name.to_string());
        self
    }

    /// Make `delete_by_name(name)` fail
    pub fn fail_delete(mut self, name: &str) -> Self {
        self.failing_deletes.insert(name.to_string());
        self
    }

    pub fn adapters(&self) -> &[String] {
        &self.adapters
    }

    pub fn contains(&self, name: &str) -> bool {
        self.adapters.iter().any(|a| a == name)
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> &[DriverCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }
}

impl AdapterDriver for MemoryDriver {
    fn create(&mut self, name: &str) -> Result<CreateOutcome> {
        self.calls.push(DriverCall::Create(name.to_string()));
        if self.failing_creates.contains(name) {
            return Err(Error::ResourceError(format!(
                "Failed to create adapter \"{}\"",
                name
            )));
        }
        if self.contains(name) {
            return Ok(CreateOutcome::AlreadyPresent);
        }
        self.adapters.push(name.to_string());
        Ok(CreateOutcome::Created)
    }

    fn delete_by_name(&mut self, name: &str) -> Result<()> {
        self.calls.push(DriverCall::Delete(name.to_string()));
        if self.failing_deletes.contains(name) {
            return Err(Error::ResourceError(format!(
                "Failed to delete adapter \"{}\"",
                name
            )));
        }
        self.adapters.retain(|a| a != name);
        Ok(())
    }
}

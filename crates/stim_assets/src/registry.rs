//! The resource registry.
//!
//! An insertion-ordered mapping from resource name to entry, with an
//! expected total frozen at manifest-registration time. Once frozen, the key
//! set never grows; the loaded count only increases, and the completion
//! latch releases exactly once when it reaches the total.

use std::collections::HashMap;

use crate::fetch::Payload;

/// Lifecycle of a registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    /// Registered, not yet dispatched to a loader.
    NotFound,
    /// Dispatched, transfer in flight.
    Loading,
    /// Payload present. Terminal.
    Loaded,
}

/// One named resource and its loading state.
#[derive(Debug, Clone)]
pub struct ResourceEntry {
    pub name: String,
    pub path: String,
    pub state: ResourceState,
    pub data: Option<Payload>,
}

/// Errors raised on registry misuse. These are programmer-contract faults,
/// not transport failures.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown resource")]
    Unknown,
    #[error("resources already registered for this session")]
    AlreadyFrozen,
}

/// Insertion-ordered name → entry mapping with a frozen expected total.
#[derive(Debug, Default)]
pub struct Registry {
    entries: Vec<ResourceEntry>,
    index: HashMap<String, usize>,
    expected_total: Option<usize>,
    loaded: usize,
    complete_fired: bool,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource. Re-registering a name before the freeze
    /// overwrites the previous path; after the freeze it is an error.
    ///
    /// # Errors
    ///
    /// [`RegistryError::AlreadyFrozen`] once the total has been frozen.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        path: impl Into<String>,
    ) -> Result<(), RegistryError> {
        if self.expected_total.is_some() {
            return Err(RegistryError::AlreadyFrozen);
        }
        let name = name.into();
        let path = path.into();
        match self.index.get(&name) {
            Some(&slot) => {
                self.entries[slot] = ResourceEntry {
                    name,
                    path,
                    state: ResourceState::NotFound,
                    data: None,
                };
            }
            None => {
                self.index.insert(name.clone(), self.entries.len());
                self.entries.push(ResourceEntry {
                    name,
                    path,
                    state: ResourceState::NotFound,
                    data: None,
                });
            }
        }
        Ok(())
    }

    /// Freeze the expected total at the current registry size.
    pub fn freeze(&mut self) -> usize {
        let total = self.entries.len();
        self.expected_total = Some(total);
        total
    }

    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.expected_total.is_some()
    }

    /// The frozen expected total, if frozen.
    #[must_use]
    pub fn expected_total(&self) -> Option<usize> {
        self.expected_total
    }

    /// Number of loaded entries.
    #[must_use]
    pub fn loaded(&self) -> usize {
        self.loaded
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ResourceEntry> {
        self.index.get(name).map(|&slot| &self.entries[slot])
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &ResourceEntry> {
        self.entries.iter()
    }

    /// Mark an entry as dispatched to a loader.
    ///
    /// # Errors
    ///
    /// [`RegistryError::Unknown`] for an unregistered name.
    pub fn mark_loading(&mut self, name: &str) -> Result<(), RegistryError> {
        let &slot = self.index.get(name).ok_or(RegistryError::Unknown)?;
        self.entries[slot].state = ResourceState::Loading;
        Ok(())
    }

    /// Store a loaded payload and bump the loaded counter.
    ///
    /// # Errors
    ///
    /// [`RegistryError::Unknown`] for an unregistered name.
    pub fn store(&mut self, name: &str, payload: Payload) -> Result<(), RegistryError> {
        let &slot = self.index.get(name).ok_or(RegistryError::Unknown)?;
        let entry = &mut self.entries[slot];
        entry.data = Some(payload);
        entry.state = ResourceState::Loaded;
        self.loaded += 1;
        Ok(())
    }

    /// Whether the total is frozen and every registered resource is loaded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self.expected_total, Some(total) if self.loaded == total)
    }

    /// Release the completion latch if every registered resource is loaded.
    ///
    /// Returns `true` exactly once per registry lifetime. Callers must hold
    /// the registry lock across the preceding counter update and this check
    /// so two loaders finishing back to back cannot both miss (or both take)
    /// the threshold.
    pub fn check_complete(&mut self) -> bool {
        match self.expected_total {
            Some(total) if !self.complete_fired && self.loaded == total => {
                self.complete_fired = true;
                true
            }
            _ => false,
        }
    }
}

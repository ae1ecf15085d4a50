use super::propagator::Propagator;
use crate::error::{OpiError, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

/// Lifecycle state of a plugin.
///
/// `Unloaded -> Loaded -> Enabled <-> Disabled -> Unloaded`. Registry entries are
/// never `Unloaded`; that state only describes names with no entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PluginState {
    Unloaded,
    Loaded,
    Enabled,
    Disabled,
}

impl std::fmt::Display for PluginState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Unloaded => "unloaded",
            Self::Loaded => "loaded",
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
        };
        f.write_str(name)
    }
}

/// A registered propagator and its lifecycle state.
pub struct PluginEntry {
    propagator: Propagator,
    state: PluginState,
}

impl PluginEntry {
    #[must_use]
    pub fn propagator(&self) -> &Propagator {
        &self.propagator
    }

    #[must_use]
    pub fn state(&self) -> PluginState {
        self.state
    }

    /// `Loaded/Disabled -> Enabled`; a no-op when already enabled.
    pub(crate) fn enable(&mut self) -> Result<()> {
        match self.state {
            PluginState::Enabled => Ok(()),
            PluginState::Loaded | PluginState::Disabled => {
                self.propagator.enable()?;
                self.state = PluginState::Enabled;
                info!(plugin = %self.propagator.name(), "propagator enabled");
                Ok(())
            }
            PluginState::Unloaded => {
                Err(OpiError::PluginNotLoaded(self.propagator.name().to_string()))
            }
        }
    }

    /// `Enabled -> Disabled`. The plugin resets its private state in the hook.
    pub(crate) fn disable(&mut self) -> Result<()> {
        match self.state {
            PluginState::Enabled => {
                self.propagator.disable()?;
                self.state = PluginState::Disabled;
                info!(plugin = %self.propagator.name(), "propagator disabled");
                Ok(())
            }
            state => Err(self.invalid_transition(state, PluginState::Disabled)),
        }
    }

    fn invalid_transition(&self, from: PluginState, to: PluginState) -> OpiError {
        OpiError::InvalidTransition {
            plugin: self.propagator.name().to_string(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

/// Plugin registry keyed by descriptor name.
pub struct PluginRegistry {
    plugins: BTreeMap<String, PluginEntry>,
}

impl PluginRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            plugins: BTreeMap::new(),
        }
    }

    /// Register a validated propagator in the `Loaded` state.
    pub(crate) fn insert(&mut self, propagator: Propagator) -> Result<&PluginEntry> {
        let name = propagator.name().to_string();
        if self.plugins.contains_key(&name) {
            return Err(OpiError::DuplicatePlugin(name));
        }
        Ok(self.plugins.entry(name).or_insert(PluginEntry {
            propagator,
            state: PluginState::Loaded,
        }))
    }

    /// Take a `Loaded` or `Disabled` plugin out of the registry.
    pub(crate) fn remove(&mut self, name: &str) -> Result<Propagator> {
        let entry = self.get(name)?;
        if entry.state == PluginState::Enabled {
            return Err(entry.invalid_transition(PluginState::Enabled, PluginState::Unloaded));
        }
        self.plugins
            .remove(name)
            .map(|entry| entry.propagator)
            .ok_or_else(|| OpiError::PluginNotLoaded(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Result<&PluginEntry> {
        self.plugins
            .get(name)
            .ok_or_else(|| OpiError::PluginNotLoaded(name.to_string()))
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Result<&mut PluginEntry> {
        self.plugins
            .get_mut(name)
            .ok_or_else(|| OpiError::PluginNotLoaded(name.to_string()))
    }

    /// State of `name`, `Unloaded` when it is not registered.
    #[must_use]
    pub fn state(&self, name: &str) -> PluginState {
        self.plugins
            .get(name)
            .map_or(PluginState::Unloaded, PluginEntry::state)
    }

    /// Registered names in sorted order.
    #[must_use]
    pub fn list_plugins(&self) -> Vec<&str> {
        self.plugins.keys().map(String::as_str).collect()
    }

    #[must_use]
    pub fn is_loaded(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PluginEntry> {
        self.plugins.values()
    }

    /// Names of every plugin currently `Enabled`.
    pub(crate) fn enabled(&self) -> Vec<String> {
        self.plugins
            .iter()
            .filter(|(_, entry)| entry.state == PluginState::Enabled)
            .map(|(name, _)| name.clone())
            .collect()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::api::{PopulationAccess, RawPluginInfo, OPI_ABI_VERSION};
    use crate::plugins::descriptor::Version;
    use crate::plugins::propagator::EntryPoints;

    static INFO: RawPluginInfo = RawPluginInfo {
        abi_version: OPI_ABI_VERSION,
        name: b"registry-test\0".as_ptr().cast(),
        author: std::ptr::null(),
        description: std::ptr::null(),
        version: Version::new(1, 2, 3),
        min_host_version: Version::new(1, 0, 0),
    };

    unsafe extern "C" fn info() -> *const RawPluginInfo {
        &INFO
    }

    unsafe extern "C" fn propagate(_: *mut PopulationAccess, _: f64, _: f64) -> i32 {
        0
    }

    fn propagator() -> Propagator {
        unsafe { Propagator::from_entry_points(EntryPoints::new(info, propagate), None) }.unwrap()
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut registry = PluginRegistry::new();
        assert!(registry.is_empty());
        let entry = registry.insert(propagator()).unwrap();
        assert_eq!(entry.state(), PluginState::Loaded);
        assert_eq!(entry.propagator().descriptor().version, Version::new(1, 2, 3));
        assert_eq!(entry.propagator().descriptor().author, "");

        assert!(registry.is_loaded("registry-test"));
        assert_eq!(registry.list_plugins(), vec!["registry-test"]);
        assert_eq!(registry.state("other"), PluginState::Unloaded);
        assert!(matches!(
            registry.insert(propagator()),
            Err(OpiError::DuplicatePlugin(_))
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_enabled_plugins_cannot_be_removed() {
        let mut registry = PluginRegistry::new();
        registry.insert(propagator()).unwrap();
        registry.get_mut("registry-test").unwrap().enable().unwrap();
        assert_eq!(registry.enabled(), vec!["registry-test".to_string()]);
        assert!(matches!(
            registry.remove("registry-test"),
            Err(OpiError::InvalidTransition { .. })
        ));

        registry.get_mut("registry-test").unwrap().disable().unwrap();
        assert_eq!(registry.state("registry-test"), PluginState::Disabled);
        assert!(registry.remove("registry-test").is_ok());
        assert!(registry.is_empty());
    }
}

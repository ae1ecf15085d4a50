//! The host: plugin registry, capability negotiation, dispatch and error reporting.
//!
//! A [`Host`] is an ordinary value. Several hosts can coexist in one process, each
//! with its own registry, active propagator and error callback. A host holds no
//! internal locks; callers serialize access to it.

mod dispatch;
mod reporter;

pub use dispatch::PropagationMode;
pub(crate) use reporter::ErrorReporter;

use crate::backend::{AcceleratorFlags, Backend};
use crate::config::{Config, DispatchConfig};
use crate::error::{ErrorCode, OpiError, Result};
use crate::plugins::loader::{is_shared_library, DynamicLibrary, LoaderError};
use crate::plugins::{
    EntryPoints, PluginDescriptor, PluginRegistry, PluginState, Propagator, Version,
};
use crate::population::{IndexList, Population};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Version of this host, compared against each plugin's minimum host version.
pub const HOST_VERSION: Version = Version::new(1, 0, 0);

/// Identity of a host instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostId(Uuid);

impl HostId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for HostId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Callback invoked synchronously whenever a host operation fails.
///
/// User data is whatever the closure captures.
pub type ErrorCallback = Box<dyn FnMut(HostId, ErrorCode) + Send>;

/// Outcome of loading one file during a directory scan.
pub type ScanResult = (PathBuf, Result<PluginDescriptor>);

/// The orchestrator owning loaded propagators.
pub struct Host {
    reporter: ErrorReporter,
    version: Version,
    accelerators: AcceleratorFlags,
    dispatch: DispatchConfig,
    registry: PluginRegistry,
    active: Option<String>,
}

impl Host {
    /// A host without accelerators: only the host backend is available.
    #[must_use]
    pub fn new() -> Self {
        Self::with_accelerators(AcceleratorFlags::empty())
    }

    /// A host offering the given accelerator backends.
    #[must_use]
    pub fn with_accelerators(accelerators: AcceleratorFlags) -> Self {
        let reporter = ErrorReporter::new();
        debug!(
            host = %reporter.host_id(),
            accelerators = %accelerators.describe(),
            "creating host"
        );
        Self {
            reporter,
            version: HOST_VERSION,
            accelerators,
            dispatch: DispatchConfig::default(),
            registry: PluginRegistry::new(),
            active: None,
        }
    }

    /// Build a host from configuration.
    ///
    /// Plugins listed or discovered through the config are loaded and the default
    /// propagator is enabled and selected. Individual failures are logged and
    /// skipped so one broken plugin does not prevent startup.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let mut host = Self::with_accelerators(config.accelerators.flags());
        host.dispatch = config.dispatch.clone();

        if config.plugins.autoload {
            if let Some(dir) = &config.plugins.directory {
                if let Err(e) = host.load_plugins_from_dir(dir) {
                    warn!(dir = %dir.display(), "plugin directory scan failed: {e}");
                }
            }
        }
        for path in &config.plugins.paths {
            if let Err(e) = host.load_plugin(path) {
                warn!(path = %path.display(), "skipping plugin: {e}");
            }
        }
        if let Some(name) = &config.plugins.default_propagator {
            if let Err(e) = host.enable(name).and_then(|()| host.select_propagator(name)) {
                warn!(plugin = %name, "default propagator unavailable: {e}");
            }
        }
        host
    }

    #[must_use]
    pub fn id(&self) -> HostId {
        self.reporter.host_id()
    }

    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    #[must_use]
    pub fn accelerators(&self) -> AcceleratorFlags {
        self.accelerators
    }

    /// Backends offered to populations and index lists created by this host.
    #[must_use]
    pub fn backends(&self) -> Vec<Backend> {
        self.accelerators.backends()
    }

    pub fn set_dispatch_config(&mut self, dispatch: DispatchConfig) {
        self.dispatch = dispatch;
    }

    /// Register the error callback, replacing any previous one.
    ///
    /// The callback also receives failures of populations and index lists created
    /// by this host, including ones created before the callback was set. It must
    /// not call back into objects of this host.
    pub fn set_error_callback<F>(&mut self, callback: F)
    where
        F: FnMut(HostId, ErrorCode) + Send + 'static,
    {
        self.reporter.set_callback(Some(Box::new(callback)));
    }

    pub fn clear_error_callback(&mut self) {
        self.reporter.set_callback(None);
    }

    fn report<T>(&self, result: Result<T>) -> Result<T> {
        self.reporter.report(result)
    }

    /// Load a propagator plugin from a shared library.
    ///
    /// On any failure nothing is registered and the library is closed again.
    /// Loading runs code from the library; only load trusted plugins.
    pub fn load_plugin<P: AsRef<Path>>(&mut self, path: P) -> Result<PluginDescriptor> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading plugin");
        let result = Self::open_plugin(path).and_then(|propagator| self.admit(propagator));
        self.report(result)
    }

    fn open_plugin(path: &Path) -> Result<Propagator> {
        // SAFETY: loading plugins executes code from the library; the host API
        // documents that only trusted plugins may be loaded.
        unsafe {
            let library = DynamicLibrary::open(path)
                .map_err(|e| OpiError::PluginLoadFailed(e.to_string()))?;
            let entry = EntryPoints::resolve(&library).map_err(|e| match e {
                LoaderError::SymbolNotFound { symbol, .. } => OpiError::MissingEntryPoint(symbol),
                e @ LoaderError::Load { .. } => OpiError::PluginLoadFailed(e.to_string()),
            })?;
            Propagator::from_entry_points(entry, Some(library))
        }
    }

    /// Register a propagator linked into the application.
    ///
    /// Goes through the same validation as [`load_plugin`](Self::load_plugin).
    ///
    /// # Safety
    ///
    /// The entry points must implement the contract in [`crate::plugins::api`].
    pub unsafe fn register_propagator(&mut self, entry: EntryPoints) -> Result<PluginDescriptor> {
        // SAFETY: caller guarantees the entry points honor the plugin contract.
        let result = unsafe { Propagator::from_entry_points(entry, None) }
            .and_then(|propagator| self.admit(propagator));
        self.report(result)
    }

    /// Capability negotiation, then registration in the `Loaded` state.
    fn admit(&mut self, propagator: Propagator) -> Result<PluginDescriptor> {
        let descriptor = propagator.descriptor().clone();

        if !self.version.satisfies(&descriptor.min_host_version) {
            return Err(OpiError::VersionIncompatible {
                plugin: descriptor.name,
                required: descriptor.min_host_version.to_string(),
                actual: self.version.to_string(),
            });
        }
        if !self.accelerators.contains(descriptor.accelerators) {
            return Err(OpiError::CapabilityUnavailable {
                plugin: descriptor.name,
                required: descriptor.accelerators.describe(),
                available: self.accelerators.describe(),
            });
        }

        self.registry.insert(propagator)?;
        info!(
            plugin = %descriptor.name,
            version = %descriptor.version,
            author = %descriptor.author,
            "plugin loaded"
        );
        Ok(descriptor)
    }

    /// Load every shared library in `dir`, in file name order.
    ///
    /// Failures are reported per file and do not stop the scan.
    pub fn load_plugins_from_dir<P: AsRef<Path>>(&mut self, dir: P) -> Result<Vec<ScanResult>> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(OpiError::from);
        let mut paths: Vec<PathBuf> = self
            .report(entries)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && is_shared_library(path))
            .collect();
        paths.sort();

        Ok(paths
            .into_iter()
            .map(|path| {
                let result = self.load_plugin(&path);
                (path, result)
            })
            .collect())
    }

    /// Close a `Loaded` or `Disabled` plugin. Enabled plugins must be disabled first.
    pub fn unload_plugin(&mut self, name: &str) -> Result<()> {
        let result = self.registry.remove(name).and_then(Propagator::close);
        if result.is_ok() {
            if self.active.as_deref() == Some(name) {
                self.active = None;
            }
            info!(plugin = %name, "plugin unloaded");
        }
        self.report(result)
    }

    /// Invoke the plugin's enable hook. Enabling twice is a no-op.
    pub fn enable(&mut self, name: &str) -> Result<()> {
        let result = self.registry.get_mut(name).and_then(|entry| entry.enable());
        self.report(result)
    }

    /// Invoke the plugin's disable hook, which resets its private state.
    pub fn disable(&mut self, name: &str) -> Result<()> {
        let result = self.registry.get_mut(name).and_then(|entry| entry.disable());
        self.report(result)
    }

    /// Make `name` the propagator used by [`propagate`](Self::propagate).
    pub fn select_propagator(&mut self, name: &str) -> Result<()> {
        let result = match self.registry.state(name) {
            PluginState::Enabled => {
                self.active = Some(name.to_string());
                debug!(plugin = %name, "propagator selected");
                Ok(())
            }
            PluginState::Unloaded => Err(OpiError::PluginNotLoaded(name.to_string())),
            PluginState::Loaded | PluginState::Disabled => {
                Err(OpiError::PropagatorNotActive(name.to_string()))
            }
        };
        self.report(result)
    }

    /// Name of the selected propagator, if any.
    #[must_use]
    pub fn active_propagator(&self) -> Option<&str> {
        self.active.as_deref()
    }

    #[must_use]
    pub fn propagator(&self, name: &str) -> Option<&Propagator> {
        self.registry.get(name).ok().map(|entry| entry.propagator())
    }

    #[must_use]
    pub fn descriptor(&self, name: &str) -> Option<&PluginDescriptor> {
        self.propagator(name).map(Propagator::descriptor)
    }

    #[must_use]
    pub fn plugin_state(&self, name: &str) -> PluginState {
        self.registry.state(name)
    }

    #[must_use]
    pub fn plugins(&self) -> &PluginRegistry {
        &self.registry
    }

    #[must_use]
    pub fn plugin_count(&self) -> usize {
        self.registry.len()
    }

    /// A zeroed population of `size` objects owned by this host.
    #[must_use]
    pub fn create_population(&self, size: usize) -> Population {
        Population::new(self.reporter.clone(), size, &self.backends())
    }

    #[must_use]
    pub fn create_index_list(&self) -> IndexList {
        IndexList::new(self.reporter.clone(), &self.backends())
    }

    /// Read a population file written by [`Population::write_to_file`].
    pub fn read_population<P: AsRef<Path>>(&mut self, path: P) -> Result<Population> {
        let result =
            Population::read_from_file(self.reporter.clone(), &self.backends(), path.as_ref());
        self.report(result)
    }
}

impl Default for Host {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Host {
    fn drop(&mut self) {
        // plugins must release their resources before their libraries are closed
        for name in self.registry.enabled() {
            if let Ok(entry) = self.registry.get_mut(&name) {
                if let Err(e) = entry.disable() {
                    warn!(plugin = %name, "disable during shutdown failed: {e}");
                }
            }
        }
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("id", &self.id())
            .field("version", &self.version)
            .field("accelerators", &self.accelerators)
            .field("plugins", &self.registry.list_plugins())
            .field("active", &self.active)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_creation() {
        let host = Host::new();
        assert_eq!(host.plugin_count(), 0);
        assert_eq!(host.backends(), vec![Backend::Host]);
        assert!(host.active_propagator().is_none());
    }

    #[test]
    fn test_host_version_matches_package() {
        assert_eq!(
            HOST_VERSION,
            env!("CARGO_PKG_VERSION").parse::<Version>().unwrap()
        );
    }

    #[test]
    fn test_hosts_are_independent() {
        let a = Host::new();
        let b = Host::new();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.create_population(3).host_id(), a.id());
        assert_ne!(b.create_index_list().host_id(), a.id());
    }

    #[test]
    fn test_missing_plugin_reports_through_callback() {
        use std::sync::{Arc, Mutex};

        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut host = Host::new();
        let sink = Arc::clone(&seen);
        host.set_error_callback(move |id, code| sink.lock().unwrap().push((id, code)));

        let result = host.load_plugin("/nonexistent/libnothing.so");
        assert!(matches!(result, Err(OpiError::PluginLoadFailed(_))));
        assert!(matches!(host.enable("nothing"), Err(OpiError::PluginNotLoaded(_))));

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                (host.id(), ErrorCode::PluginLoadFailed),
                (host.id(), ErrorCode::PluginNotLoaded)
            ]
        );
    }

    #[test]
    fn test_scan_missing_directory() {
        let mut host = Host::new();
        assert!(matches!(
            host.load_plugins_from_dir("/nonexistent/opi/plugins"),
            Err(OpiError::Io(_))
        ));
    }

    #[test]
    fn test_scan_skips_non_libraries() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a plugin").unwrap();
        let broken = dir
            .path()
            .join(format!("libbroken.{}", std::env::consts::DLL_EXTENSION));
        std::fs::write(&broken, b"garbage").unwrap();

        let mut host = Host::new();
        let results = host.load_plugins_from_dir(dir.path()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, broken);
        assert!(matches!(results[0].1, Err(OpiError::PluginLoadFailed(_))));
        assert_eq!(host.plugin_count(), 0);
    }
}

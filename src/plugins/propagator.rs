//! The propagator adapter: resolved entry points behind one uniform contract.
//!
//! Optional call shapes are modelled as explicit capability flags. The host
//! dispatcher branches on those flags instead of relying on a fallback chain inside
//! the adapter.

use super::api::{
    self, AcceleratorFn, FlagFn, FrameFn, IndexListAccess, InfoFn, InitFn, LifecycleFn,
    PopulationAccess, PropagateFn, PropagateIndexedFn, PropagateMultiTimeFn, OPI_ABI_VERSION,
};
use super::descriptor::{PluginDescriptor, ReferenceFrame};
use super::loader::{DynamicLibrary, LoaderError};
use crate::backend::AcceleratorFlags;
use crate::error::{ErrorCode, OpiError, Result};
use crate::population::{IndexList, Population};
use serde::Serialize;
use std::ffi::{c_char, CStr};
use tracing::debug;

/// Function pointers of one propagator, mandatory and optional.
///
/// Built either by resolving symbols from a shared library or directly from
/// `extern "C"` functions linked into the application.
#[derive(Clone, Copy)]
pub struct EntryPoints {
    pub info: InfoFn,
    pub propagate: PropagateFn,
    pub init: Option<InitFn>,
    pub propagate_indexed: Option<PropagateIndexedFn>,
    pub propagate_multi_time: Option<PropagateMultiTimeFn>,
    pub enable: Option<LifecycleFn>,
    pub disable: Option<LifecycleFn>,
    pub cartesian_output: Option<FlagFn>,
    pub reference_frame: Option<FrameFn>,
    pub backward_propagation: Option<FlagFn>,
    pub required_accelerators: Option<AcceleratorFn>,
}

impl EntryPoints {
    /// Entry points with only the mandatory functions set.
    #[must_use]
    pub fn new(info: InfoFn, propagate: PropagateFn) -> Self {
        Self {
            info,
            propagate,
            init: None,
            propagate_indexed: None,
            propagate_multi_time: None,
            enable: None,
            disable: None,
            cartesian_output: None,
            reference_frame: None,
            backward_propagation: None,
            required_accelerators: None,
        }
    }

    /// Resolve every known symbol; absent optional symbols stay `None`.
    ///
    /// # Safety
    ///
    /// The library must export the symbols with the signatures declared in
    /// [`api`](super::api).
    pub unsafe fn resolve(library: &DynamicLibrary) -> std::result::Result<Self, LoaderError> {
        // SAFETY: caller guarantees the exported signatures match.
        unsafe {
            Ok(Self {
                info: library.resolve(api::SYM_INFO)?,
                propagate: library.resolve(api::SYM_PROPAGATE)?,
                init: library.resolve(api::SYM_INIT).ok(),
                propagate_indexed: library.resolve(api::SYM_PROPAGATE_INDEXED).ok(),
                propagate_multi_time: library.resolve(api::SYM_PROPAGATE_MULTI_TIME).ok(),
                enable: library.resolve(api::SYM_ENABLE).ok(),
                disable: library.resolve(api::SYM_DISABLE).ok(),
                cartesian_output: library.resolve(api::SYM_CARTESIAN_OUTPUT).ok(),
                reference_frame: library.resolve(api::SYM_REFERENCE_FRAME).ok(),
                backward_propagation: library.resolve(api::SYM_BACKWARD_PROPAGATION).ok(),
                required_accelerators: library.resolve(api::SYM_REQUIRED_ACCELERATORS).ok(),
            })
        }
    }

    #[must_use]
    pub fn with_init(mut self, init: InitFn) -> Self {
        self.init = Some(init);
        self
    }

    #[must_use]
    pub fn with_indexed(mut self, propagate_indexed: PropagateIndexedFn) -> Self {
        self.propagate_indexed = Some(propagate_indexed);
        self
    }

    #[must_use]
    pub fn with_multi_time(mut self, propagate_multi_time: PropagateMultiTimeFn) -> Self {
        self.propagate_multi_time = Some(propagate_multi_time);
        self
    }

    #[must_use]
    pub fn with_lifecycle(mut self, enable: LifecycleFn, disable: LifecycleFn) -> Self {
        self.enable = Some(enable);
        self.disable = Some(disable);
        self
    }

    #[must_use]
    pub fn with_cartesian_output(mut self, cartesian_output: FlagFn) -> Self {
        self.cartesian_output = Some(cartesian_output);
        self
    }

    #[must_use]
    pub fn with_reference_frame(mut self, reference_frame: FrameFn) -> Self {
        self.reference_frame = Some(reference_frame);
        self
    }

    #[must_use]
    pub fn with_backward_propagation(mut self, backward_propagation: FlagFn) -> Self {
        self.backward_propagation = Some(backward_propagation);
        self
    }

    #[must_use]
    pub fn with_required_accelerators(mut self, required_accelerators: AcceleratorFn) -> Self {
        self.required_accelerators = Some(required_accelerators);
        self
    }
}

/// What a propagator can do, queried once when it is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub indexed: bool,
    pub multi_time: bool,
    pub cartesian_output: bool,
    pub reference_frame: ReferenceFrame,
    pub backward_propagation: bool,
    pub accelerators: AcceleratorFlags,
}

/// Result of an optional entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionalCall {
    Completed,
    /// Not exported, or the plugin returned `NotImplemented`.
    Declined,
}

/// A loaded propagator.
///
/// Owns the library its entry points came from, if any. Fields drop in
/// declaration order, so the library is closed last.
pub struct Propagator {
    descriptor: PluginDescriptor,
    capabilities: Capabilities,
    entry: EntryPoints,
    library: Option<DynamicLibrary>,
}

impl Propagator {
    /// Build the adapter: run the optional init hook once, read the metadata and
    /// query the capabilities.
    ///
    /// # Safety
    ///
    /// The entry points must follow the contract in [`api`](super::api) and stay
    /// valid for as long as `library` (or the process, when `None`) is loaded.
    pub unsafe fn from_entry_points(
        entry: EntryPoints,
        library: Option<DynamicLibrary>,
    ) -> Result<Self> {
        let origin = library
            .as_ref()
            .map_or_else(|| "<static>".to_string(), |l| l.path().display().to_string());

        if let Some(init) = entry.init {
            // SAFETY: caller guarantees the entry point is valid.
            let code = ErrorCode::from_raw(unsafe { init() });
            if code != ErrorCode::Success {
                return Err(OpiError::PluginLoadFailed(format!(
                    "{origin}: initialization returned {code}"
                )));
            }
        }

        // SAFETY: caller guarantees the entry point is valid.
        let info = unsafe { (entry.info)().as_ref() }
            .ok_or_else(|| OpiError::PluginLoadFailed(format!("{origin}: plugin info is null")))?;
        if info.abi_version != OPI_ABI_VERSION {
            return Err(OpiError::PluginLoadFailed(format!(
                "{origin}: ABI version {} (host speaks {OPI_ABI_VERSION})",
                info.abi_version
            )));
        }

        // SAFETY: the info strings are static data of the still-loaded plugin.
        let name = unsafe { c_string(info.name) };
        if name.is_empty() {
            return Err(OpiError::PluginLoadFailed(format!(
                "{origin}: plugin name is empty"
            )));
        }

        // SAFETY: caller guarantees the entry points are valid.
        let capabilities = unsafe {
            let cartesian_output = entry.cartesian_output.map_or(false, |f| f());
            let default_frame = if cartesian_output {
                ReferenceFrame::Unspecified
            } else {
                ReferenceFrame::None
            };
            Capabilities {
                indexed: entry.propagate_indexed.is_some(),
                multi_time: entry.propagate_multi_time.is_some(),
                cartesian_output,
                reference_frame: entry
                    .reference_frame
                    .map_or(default_frame, |f| ReferenceFrame::from_raw(f())),
                backward_propagation: entry.backward_propagation.map_or(false, |f| f()),
                accelerators: entry
                    .required_accelerators
                    .map_or(AcceleratorFlags::empty(), |f| {
                        AcceleratorFlags::from_bits_truncate(f())
                    }),
            }
        };

        let descriptor = PluginDescriptor {
            name,
            // SAFETY: as above.
            author: unsafe { c_string(info.author) },
            description: unsafe { c_string(info.description) },
            version: info.version,
            min_host_version: info.min_host_version,
            accelerators: capabilities.accelerators,
        };

        debug!(
            plugin = %descriptor.name,
            version = %descriptor.version,
            indexed = capabilities.indexed,
            multi_time = capabilities.multi_time,
            "resolved propagator"
        );

        Ok(Self {
            descriptor,
            capabilities,
            entry,
            library,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    #[must_use]
    pub fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    #[must_use]
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Whether the propagator came from a shared library rather than static registration.
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        self.library.is_some()
    }

    pub(crate) fn enable(&self) -> Result<()> {
        match self.entry.enable {
            // SAFETY: entry points stay valid while self holds the library.
            Some(enable) => self.check("enable", unsafe { enable() }),
            None => Ok(()),
        }
    }

    pub(crate) fn disable(&self) -> Result<()> {
        match self.entry.disable {
            // SAFETY: entry points stay valid while self holds the library.
            Some(disable) => self.check("disable", unsafe { disable() }),
            None => Ok(()),
        }
    }

    /// Mandatory propagation over the whole population.
    pub(crate) fn run(&self, population: &mut Population, julian_day: f64, dt: f64) -> Result<()> {
        let mut access = PopulationAccess::new(population);
        // SAFETY: entry points stay valid while self holds the library; access
        // points at a population borrowed for the whole call.
        let code = unsafe { (self.entry.propagate)(&mut access, julian_day, dt) };
        self.check("propagate", code)
    }

    pub(crate) fn run_indexed(
        &self,
        population: &mut Population,
        indices: &mut IndexList,
        julian_day: f64,
        dt: f64,
    ) -> Result<OptionalCall> {
        let Some(propagate_indexed) = self.entry.propagate_indexed else {
            return Ok(OptionalCall::Declined);
        };
        let mut pop_access = PopulationAccess::new(population);
        let mut index_access = IndexListAccess::new(indices);
        // SAFETY: as in run.
        let code = unsafe { propagate_indexed(&mut pop_access, &mut index_access, julian_day, dt) };
        self.check_optional("propagate_indexed", code)
    }

    pub(crate) fn run_multi_time(
        &self,
        population: &mut Population,
        julian_days: &[f64],
        dt: f64,
    ) -> Result<OptionalCall> {
        let Some(propagate_multi_time) = self.entry.propagate_multi_time else {
            return Ok(OptionalCall::Declined);
        };
        let mut access = PopulationAccess::new(population);
        // SAFETY: as in run; julian_days outlives the call.
        let code = unsafe {
            propagate_multi_time(&mut access, julian_days.as_ptr(), julian_days.len(), dt)
        };
        self.check_optional("propagate_multi_time", code)
    }

    fn check(&self, entry_point: &str, raw: i32) -> Result<()> {
        match ErrorCode::from_raw(raw) {
            ErrorCode::Success => Ok(()),
            code => Err(OpiError::from_plugin_code(self.name(), entry_point, code)),
        }
    }

    fn check_optional(&self, entry_point: &str, raw: i32) -> Result<OptionalCall> {
        match ErrorCode::from_raw(raw) {
            ErrorCode::Success => Ok(OptionalCall::Completed),
            ErrorCode::NotImplemented => Ok(OptionalCall::Declined),
            code => Err(OpiError::from_plugin_code(self.name(), entry_point, code)),
        }
    }

    /// Close the backing library. Entry points are unusable afterwards.
    pub(crate) fn close(mut self) -> Result<()> {
        match self.library.take() {
            Some(mut library) => library
                .close()
                .map_err(|e| OpiError::PluginLoadFailed(e.to_string())),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Propagator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Propagator")
            .field("name", &self.descriptor.name)
            .field("version", &self.descriptor.version)
            .field("capabilities", &self.capabilities)
            .field("library", &self.library)
            .finish()
    }
}

/// # Safety
///
/// `ptr` must be null or point to a null-terminated string.
unsafe fn c_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    // SAFETY: caller guarantees null termination.
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

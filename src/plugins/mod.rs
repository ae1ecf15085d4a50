// Propagator plugin system:
// - Dynamic loading with libloading
// - C ABI entry points with explicit capability flags
// - Four-state lifecycle per registry entry

pub mod api;
pub mod descriptor;
pub mod loader;
pub mod propagator;
pub mod registry;

pub use descriptor::{PluginDescriptor, ReferenceFrame, Version};
pub use loader::{DynamicLibrary, LoaderError};
pub use propagator::{Capabilities, EntryPoints, OptionalCall, Propagator};
pub use registry::{PluginEntry, PluginRegistry, PluginState};

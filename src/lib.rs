//! OPI - Orbital Propagation Interface host runtime
//!
//! This library loads orbital propagator plugins from shared libraries, negotiates
//! their capabilities and dispatches propagation requests over populations of
//! objects whose data can live on several compute backends.
//!
//! # Modules
//!
//! - [`host`]: The orchestrator: plugin lifecycle, dispatch and error callback
//! - [`plugins`]: Dynamic loading, the C ABI and the propagator adapter
//! - [`population`]: Multi-backend population buffers and index lists
//! - [`backend`]: Compute backends and accelerator flags
//! - [`orbit`]: Per-object record types and Keplerian helpers
//! - [`config`]: Configuration management and serialization
//! - [`interface`]: Machine-readable description of the plugin ABI
//! - [`error`]: Error codes shared with plugins

pub mod backend;
pub mod config;
pub mod error;
pub mod host;
pub mod interface;
pub mod orbit;
pub mod plugins;
pub mod population;

pub use backend::{AcceleratorFlags, Backend};
pub use error::{ErrorCode, OpiError, Result};
pub use host::{Host, HostId, PropagationMode, HOST_VERSION};
pub use orbit::{ObjectProperties, Orbit, Vector3};
pub use plugins::{PluginDescriptor, PluginState, ReferenceFrame, Version};
pub use population::{DataCategory, IndexList, Population};

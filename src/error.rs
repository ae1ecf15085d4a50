//! Error types for the OPI host runtime.
//!
//! Every [`OpiError`] maps onto a stable numeric [`ErrorCode`]. The codes are what
//! crosses the plugin C ABI and what the host's error callback receives.

use serde::Serialize;
use thiserror::Error;

/// Result type alias using [`OpiError`].
pub type Result<T> = std::result::Result<T, OpiError>;

/// Numeric error codes shared by the host, the error callback and plugins.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorCode {
    Success = 0,
    UnknownError = 1,
    PluginLoadFailed = 2,
    MissingEntryPoint = 3,
    VersionIncompatible = 4,
    CapabilityUnavailable = 5,
    PluginNotLoaded = 6,
    PropagatorNotActive = 7,
    InvalidTransition = 8,
    UnsupportedDirection = 9,
    NotImplemented = 10,
    InvalidTime = 11,
    IndexOutOfRange = 12,
    BackendUnavailable = 13,
    InvalidArgument = 14,
    DuplicatePlugin = 15,
    ForeignObject = 16,
    UnsupportedFrame = 17,
    Io = 18,
}

impl ErrorCode {
    /// All codes in numeric order.
    pub const ALL: [ErrorCode; 19] = [
        Self::Success,
        Self::UnknownError,
        Self::PluginLoadFailed,
        Self::MissingEntryPoint,
        Self::VersionIncompatible,
        Self::CapabilityUnavailable,
        Self::PluginNotLoaded,
        Self::PropagatorNotActive,
        Self::InvalidTransition,
        Self::UnsupportedDirection,
        Self::NotImplemented,
        Self::InvalidTime,
        Self::IndexOutOfRange,
        Self::BackendUnavailable,
        Self::InvalidArgument,
        Self::DuplicatePlugin,
        Self::ForeignObject,
        Self::UnsupportedFrame,
        Self::Io,
    ];

    /// Convert a raw code returned by a plugin.
    ///
    /// Codes this host does not know about are reported as `UnknownError`.
    #[must_use]
    pub fn from_raw(raw: i32) -> Self {
        Self::ALL
            .iter()
            .copied()
            .find(|code| *code as i32 == raw)
            .unwrap_or(Self::UnknownError)
    }

    #[must_use]
    pub fn as_raw(self) -> i32 {
        self as i32
    }

    /// Short, stable identifier used in logs and the interface description.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::UnknownError => "UNKNOWN_ERROR",
            Self::PluginLoadFailed => "PLUGIN_LOAD_FAILED",
            Self::MissingEntryPoint => "MISSING_ENTRY_POINT",
            Self::VersionIncompatible => "VERSION_INCOMPATIBLE",
            Self::CapabilityUnavailable => "CAPABILITY_UNAVAILABLE",
            Self::PluginNotLoaded => "PLUGIN_NOT_LOADED",
            Self::PropagatorNotActive => "PROPAGATOR_NOT_ACTIVE",
            Self::InvalidTransition => "INVALID_TRANSITION",
            Self::UnsupportedDirection => "UNSUPPORTED_DIRECTION",
            Self::NotImplemented => "NOT_IMPLEMENTED",
            Self::InvalidTime => "INVALID_TIME",
            Self::IndexOutOfRange => "INDEX_OUT_OF_RANGE",
            Self::BackendUnavailable => "BACKEND_UNAVAILABLE",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::DuplicatePlugin => "DUPLICATE_PLUGIN",
            Self::ForeignObject => "FOREIGN_OBJECT",
            Self::UnsupportedFrame => "UNSUPPORTED_FRAME",
            Self::Io => "IO_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Main error type for host operations.
#[derive(Error, Debug)]
pub enum OpiError {
    /// The shared library could not be opened.
    #[error("failed to load plugin library: {0}")]
    PluginLoadFailed(String),

    /// A mandatory entry point is absent from the library.
    #[error("plugin is missing mandatory entry point '{0}'")]
    MissingEntryPoint(String),

    /// The plugin needs a newer host.
    #[error("plugin '{plugin}' requires host {required}, running {actual}")]
    VersionIncompatible {
        plugin: String,
        required: String,
        actual: String,
    },

    /// The plugin needs an accelerator the host does not offer.
    #[error("plugin '{plugin}' requires accelerator(s) {required}, host offers {available}")]
    CapabilityUnavailable {
        plugin: String,
        required: String,
        available: String,
    },

    #[error("plugin '{0}' is not loaded")]
    PluginNotLoaded(String),

    #[error("propagator '{0}' is not active")]
    PropagatorNotActive(String),

    /// A lifecycle transition that would skip a state.
    #[error("plugin '{plugin}' cannot go from {from} to {to}")]
    InvalidTransition {
        plugin: String,
        from: String,
        to: String,
    },

    #[error("propagator '{0}' does not support backward propagation")]
    UnsupportedDirection(String),

    #[error("operation not implemented: {0}")]
    NotImplemented(String),

    #[error("invalid time: {0}")]
    InvalidTime(String),

    #[error("index {index} out of range for population of {size}")]
    IndexOutOfRange { index: i64, size: usize },

    #[error("backend {0} is not available")]
    BackendUnavailable(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("a plugin named '{0}' is already registered")]
    DuplicatePlugin(String),

    /// The object was created by another host instance.
    #[error("{0} belongs to a different host")]
    ForeignObject(&'static str),

    #[error("propagator '{plugin}' produces {actual} coordinates, {required} required")]
    UnsupportedFrame {
        plugin: String,
        required: String,
        actual: String,
    },

    /// A plugin entry point returned a failure code.
    #[error("plugin '{plugin}' failed with {code}")]
    PluginFailed { plugin: String, code: ErrorCode },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl OpiError {
    /// The numeric code reported to the error callback.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::PluginLoadFailed(_) => ErrorCode::PluginLoadFailed,
            Self::MissingEntryPoint(_) => ErrorCode::MissingEntryPoint,
            Self::VersionIncompatible { .. } => ErrorCode::VersionIncompatible,
            Self::CapabilityUnavailable { .. } => ErrorCode::CapabilityUnavailable,
            Self::PluginNotLoaded(_) => ErrorCode::PluginNotLoaded,
            Self::PropagatorNotActive(_) => ErrorCode::PropagatorNotActive,
            Self::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            Self::UnsupportedDirection(_) => ErrorCode::UnsupportedDirection,
            Self::NotImplemented(_) => ErrorCode::NotImplemented,
            Self::InvalidTime(_) => ErrorCode::InvalidTime,
            Self::IndexOutOfRange { .. } => ErrorCode::IndexOutOfRange,
            Self::BackendUnavailable(_) => ErrorCode::BackendUnavailable,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::DuplicatePlugin(_) => ErrorCode::DuplicatePlugin,
            Self::ForeignObject(_) => ErrorCode::ForeignObject,
            Self::UnsupportedFrame { .. } => ErrorCode::UnsupportedFrame,
            Self::PluginFailed { code, .. } => *code,
            Self::Io(_) => ErrorCode::Io,
        }
    }

    /// Build the error for a non-success code returned by a plugin entry point.
    pub(crate) fn from_plugin_code(plugin: &str, entry_point: &str, code: ErrorCode) -> Self {
        match code {
            ErrorCode::NotImplemented => Self::NotImplemented(format!("{plugin}: {entry_point}")),
            code => Self::PluginFailed {
                plugin: plugin.to_string(),
                code,
            },
        }
    }
}

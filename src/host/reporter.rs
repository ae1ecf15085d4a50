//! Error reporting shared by a host and the populations and index lists it creates.

use super::{ErrorCallback, HostId};
use crate::error::Result;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;

/// Handle to a host's identity and error callback.
///
/// Clones share the callback slot, so replacing the callback on the host also
/// affects objects created earlier.
#[derive(Clone)]
pub(crate) struct ErrorReporter {
    host: HostId,
    callback: Arc<Mutex<Option<ErrorCallback>>>,
}

impl ErrorReporter {
    /// A reporter for a fresh host identity, with no callback registered.
    pub fn new() -> Self {
        Self {
            host: HostId::new(),
            callback: Arc::new(Mutex::new(None)),
        }
    }

    pub fn host_id(&self) -> HostId {
        self.host
    }

    pub fn set_callback(&self, callback: Option<ErrorCallback>) {
        *self.slot() = callback;
    }

    /// Log a failure and pass its code to the callback, then hand the result back.
    pub fn report<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            let code = e.code();
            warn!(host = %self.host, %code, "{e}");
            if let Some(callback) = self.slot().as_mut() {
                callback(self.host, code);
            }
        }
        result
    }

    fn slot(&self) -> MutexGuard<'_, Option<ErrorCallback>> {
        // a panicking callback leaves the slot itself intact
        match self.callback.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl std::fmt::Debug for ErrorReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorReporter")
            .field("host", &self.host)
            .finish()
    }
}

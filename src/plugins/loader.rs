use libloading::Library;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Errors raised by the OS-level library loader.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// Missing file, format mismatch, or an unresolved dependency.
    #[error("failed to load library '{path}': {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("symbol '{symbol}' not found in '{path}'")]
    SymbolNotFound { path: PathBuf, symbol: String },
}

/// An opened shared library.
///
/// Dropping the value closes the library; [`close`](Self::close) does so early and
/// may be called any number of times.
pub struct DynamicLibrary {
    path: PathBuf,
    library: Option<Library>,
}

impl DynamicLibrary {
    /// Open the shared library at `path`.
    ///
    /// # Safety
    ///
    /// Opening a library runs its initialization routines. The library must be
    /// trusted.
    pub unsafe fn open<P: AsRef<Path>>(path: P) -> Result<Self, LoaderError> {
        let path = path.as_ref().to_path_buf();
        // SAFETY: caller guarantees the library is trusted.
        let library = unsafe { Library::new(&path) }.map_err(|e| LoaderError::Load {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        debug!(path = %path.display(), "opened library");
        Ok(Self {
            path,
            library: Some(library),
        })
    }

    /// Resolve a named entry point and copy out its function pointer.
    ///
    /// # Safety
    ///
    /// `T` must match the actual type of the exported symbol, and the returned
    /// value must not be used after the library is closed.
    pub unsafe fn resolve<T: Copy>(&self, symbol: &[u8]) -> Result<T, LoaderError> {
        let name = || {
            String::from_utf8_lossy(symbol.strip_suffix(b"\0").unwrap_or(symbol)).into_owned()
        };
        let library = self.library.as_ref().ok_or_else(|| LoaderError::SymbolNotFound {
            path: self.path.clone(),
            symbol: name(),
        })?;
        // SAFETY: caller guarantees T matches the symbol's type.
        let entry = unsafe { library.get::<T>(symbol) }.map_err(|_| LoaderError::SymbolNotFound {
            path: self.path.clone(),
            symbol: name(),
        })?;
        Ok(*entry)
    }

    /// Release the OS handle. Idempotent.
    pub fn close(&mut self) -> Result<(), LoaderError> {
        match self.library.take() {
            Some(library) => {
                debug!(path = %self.path.display(), "closing library");
                library.close().map_err(|e| LoaderError::Load {
                    path: self.path.clone(),
                    reason: e.to_string(),
                })
            }
            None => Ok(()),
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.library.is_some()
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for DynamicLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicLibrary")
            .field("path", &self.path)
            .field("open", &self.is_open())
            .finish()
    }
}

/// Whether `path` carries the platform's shared library extension.
#[must_use]
pub fn is_shared_library(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(std::env::consts::DLL_EXTENSION))
}

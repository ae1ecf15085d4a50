//! Ordered object indices, synchronized across backends like population data.

use super::sync::SyncedArray;
use crate::backend::Backend;
use crate::error::{OpiError, Result};
use crate::host::{ErrorReporter, HostId};

/// An ordered sequence of indices into a [`Population`](super::Population).
///
/// Duplicates are allowed. Indices are stored as `i32` because that is what
/// plugins see on every backend; range checking happens when the list is used.
pub struct IndexList {
    reporter: ErrorReporter,
    data: SyncedArray<i32>,
}

impl IndexList {
    pub(crate) fn new(reporter: ErrorReporter, backends: &[Backend]) -> Self {
        Self {
            reporter,
            data: SyncedArray::new(0, backends),
        }
    }

    /// Identity of the host that created this list.
    #[must_use]
    pub fn host_id(&self) -> HostId {
        self.reporter.host_id()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.len() == 0
    }

    /// Append an index on the host backend.
    pub fn add(&mut self, index: usize) -> Result<()> {
        self.extend([index])
    }

    /// Append several indices on the host backend.
    ///
    /// Nothing is appended if any index does not fit.
    pub fn extend<I: IntoIterator<Item = usize>>(&mut self, indices: I) -> Result<()> {
        let raw = indices.into_iter().map(to_raw).collect::<Result<Vec<_>>>();
        let result = raw.and_then(|raw| self.data.extend_on(Backend::Host, &raw));
        self.reporter.report(result)
    }

    pub fn clear(&mut self) -> Result<()> {
        let result = self.data.replace(Backend::Host, Vec::new());
        self.reporter.report(result)
    }

    /// Sort ascending on the host backend.
    pub fn sort(&mut self) -> Result<()> {
        let result = self
            .data
            .get(Backend::Host)
            .map(|indices| indices.sort_unstable())
            .and_then(|()| self.data.update(Backend::Host));
        self.reporter.report(result)
    }

    /// Remove consecutive duplicates on the host backend.
    pub fn dedup(&mut self) -> Result<()> {
        let result = self
            .data
            .get(Backend::Host)
            .map(|indices| {
                let mut indices = indices.to_vec();
                indices.dedup();
                indices
            })
            .and_then(|indices| self.data.replace(Backend::Host, indices));
        self.reporter.report(result)
    }

    /// Backend-local index storage, synchronized first if stale.
    pub fn get(&mut self, backend: Backend) -> Result<&mut [i32]> {
        self.reporter.report(self.data.get(backend))
    }

    /// Mark `backend` as holding the latest indices.
    pub fn update(&mut self, backend: Backend) -> Result<()> {
        let result = self.data.update(backend);
        self.reporter.report(result)
    }

    #[must_use]
    pub fn is_valid(&self, backend: Backend) -> bool {
        self.data.is_valid(backend)
    }

    /// Host copy of the indices, checked against a population of `size` objects.
    ///
    /// Fails on the first index outside `0..size`.
    pub fn checked_indices(&mut self, size: usize) -> Result<Vec<usize>> {
        let result = self.resolve(size);
        self.reporter.report(result)
    }

    pub(crate) fn resolve(&mut self, size: usize) -> Result<Vec<usize>> {
        self.data
            .get(Backend::Host)?
            .iter()
            .map(|&raw| match usize::try_from(raw) {
                Ok(index) if index < size => Ok(index),
                _ => Err(OpiError::IndexOutOfRange {
                    index: i64::from(raw),
                    size,
                }),
            })
            .collect()
    }
}

fn to_raw(index: usize) -> Result<i32> {
    i32::try_from(index).map_err(|_| {
        OpiError::InvalidArgument(format!("index {index} does not fit the index list"))
    })
}

impl std::fmt::Debug for IndexList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexList")
            .field("len", &self.len())
            .field("authoritative", &self.data.authoritative())
            .finish()
    }
}

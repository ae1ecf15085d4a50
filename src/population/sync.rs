//! Multi-backend array with an explicit validity table.
//!
//! Each backend slot owns its own allocation. A slot is *valid* when its contents
//! equal the latest written data. Reading a stale slot copies from a valid one;
//! writing is reported through [`SyncedArray::update`], which invalidates every
//! other slot. At least one slot is valid at all times.

use crate::backend::Backend;
use crate::error::{OpiError, Result};
use bytemuck::Pod;
use tracing::trace;

pub(crate) struct SyncedArray<T: Pod> {
    len: usize,
    copies: [Option<Vec<T>>; Backend::COUNT],
    valid: [bool; Backend::COUNT],
    available: [bool; Backend::COUNT],
}

impl<T: Pod> SyncedArray<T> {
    /// Create a zeroed array of `len` elements, valid on the host backend.
    pub fn new(len: usize, backends: &[Backend]) -> Self {
        let mut available = [false; Backend::COUNT];
        available[Backend::Host.slot()] = true;
        for backend in backends {
            available[backend.slot()] = true;
        }

        let mut copies: [Option<Vec<T>>; Backend::COUNT] = Default::default();
        copies[Backend::Host.slot()] = Some(vec![T::zeroed(); len]);
        let mut valid = [false; Backend::COUNT];
        valid[Backend::Host.slot()] = true;

        Self {
            len,
            copies,
            valid,
            available,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_valid(&self, backend: Backend) -> bool {
        self.valid[backend.slot()]
    }

    /// The backend currently holding authoritative data.
    ///
    /// When several slots are valid they are identical; the lowest slot is reported.
    pub fn authoritative(&self) -> Backend {
        Backend::ALL
            .iter()
            .copied()
            .find(|b| self.valid[b.slot()])
            .unwrap_or(Backend::Host)
    }

    pub fn valid_backends(&self) -> Vec<Backend> {
        Backend::ALL
            .iter()
            .copied()
            .filter(|b| self.valid[b.slot()])
            .collect()
    }

    fn check(&self, backend: Backend) -> Result<()> {
        if self.available[backend.slot()] {
            Ok(())
        } else {
            Err(OpiError::BackendUnavailable(backend.to_string()))
        }
    }

    /// Bring `backend` up to date without touching any other slot's validity.
    fn sync(&mut self, backend: Backend) -> Result<()> {
        self.check(backend)?;
        let slot = backend.slot();
        if self.valid[slot] {
            return Ok(());
        }

        let source = self.authoritative();
        trace!(from = %source, to = %backend, len = self.len, "syncing stale backend copy");

        let mut target = self.copies[slot].take().unwrap_or_default();
        target.clear();
        if let Some(src) = self.copies[source.slot()].as_ref() {
            target.extend_from_slice(src);
        }
        target.resize(self.len, T::zeroed());
        self.copies[slot] = Some(target);
        self.valid[slot] = true;
        Ok(())
    }

    /// Backend-local storage, copied from the authoritative backend first if stale.
    pub fn get(&mut self, backend: Backend) -> Result<&mut [T]> {
        self.sync(backend)?;
        Ok(self.copies[backend.slot()]
            .as_deref_mut()
            .unwrap_or_default())
    }

    /// Mark `backend` authoritative and invalidate every other copy.
    pub fn update(&mut self, backend: Backend) -> Result<()> {
        // a slot that was never materialized has to exist before it can be authoritative
        self.sync(backend)?;
        for (slot, valid) in self.valid.iter_mut().enumerate() {
            *valid = slot == backend.slot();
        }
        Ok(())
    }

    /// Change the element count on `backend`; other backends become stale.
    pub fn resize(&mut self, len: usize, backend: Backend) -> Result<()> {
        self.sync(backend)?;
        if let Some(data) = self.copies[backend.slot()].as_mut() {
            data.resize(len, T::zeroed());
        }
        self.len = len;
        self.update(backend)
    }

    /// Append elements on `backend`; other backends become stale.
    pub fn extend_on(&mut self, backend: Backend, items: &[T]) -> Result<()> {
        self.sync(backend)?;
        if let Some(data) = self.copies[backend.slot()].as_mut() {
            data.extend_from_slice(items);
            self.len = data.len();
        }
        self.update(backend)
    }

    /// Replace the whole contents with `data` living on `backend`.
    pub fn replace(&mut self, backend: Backend, data: Vec<T>) -> Result<()> {
        self.check(backend)?;
        self.len = data.len();
        self.copies[backend.slot()] = Some(data);
        self.valid[backend.slot()] = true;
        self.update(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Backend; 3] = Backend::ALL;

    #[test]
    fn test_new_array_is_host_valid() {
        let array: SyncedArray<f64> = SyncedArray::new(4, &ALL);
        assert!(array.is_valid(Backend::Host));
        assert!(!array.is_valid(Backend::Cuda));
        assert_eq!(array.authoritative(), Backend::Host);
        assert_eq!(array.valid_backends(), vec![Backend::Host]);
    }

    #[test]
    fn test_copy_on_read() {
        let mut array: SyncedArray<f64> = SyncedArray::new(3, &ALL);
        array.get(Backend::Cuda).unwrap().copy_from_slice(&[1.0, 2.0, 3.0]);
        array.update(Backend::Cuda).unwrap();

        assert!(!array.is_valid(Backend::Host));
        assert_eq!(array.authoritative(), Backend::Cuda);
        assert_eq!(array.get(Backend::Host).unwrap(), &[1.0, 2.0, 3.0]);

        // both copies now equal, neither was invalidated by the read
        assert!(array.is_valid(Backend::Host));
        assert!(array.is_valid(Backend::Cuda));
    }

    #[test]
    fn test_read_without_write_keeps_authority() {
        let mut array: SyncedArray<i32> = SyncedArray::new(2, &ALL);
        array.get(Backend::Host).unwrap()[0] = 5;
        array.update(Backend::Host).unwrap();
        let _ = array.get(Backend::OpenCl).unwrap();
        let _ = array.get(Backend::Cuda).unwrap();
        assert_eq!(array.valid_backends(), ALL.to_vec());
        assert_eq!(array.get(Backend::Cuda).unwrap(), &[5, 0]);
    }

    #[test]
    fn test_unavailable_backend() {
        let mut array: SyncedArray<i32> = SyncedArray::new(2, &[Backend::Host]);
        assert!(matches!(
            array.get(Backend::Cuda),
            Err(OpiError::BackendUnavailable(_))
        ));
        assert!(array.update(Backend::OpenCl).is_err());
        // failed calls never leave the array without a valid copy
        assert!(array.is_valid(Backend::Host));
    }

    #[test]
    fn test_resize_invalidates_other_backends() {
        let mut array: SyncedArray<i32> = SyncedArray::new(2, &ALL);
        array.get(Backend::Host).unwrap().copy_from_slice(&[7, 8]);
        array.update(Backend::Host).unwrap();
        let _ = array.get(Backend::Cuda).unwrap();

        array.resize(4, Backend::Cuda).unwrap();
        assert_eq!(array.len(), 4);
        assert_eq!(array.valid_backends(), vec![Backend::Cuda]);
        assert_eq!(array.get(Backend::Host).unwrap(), &[7, 8, 0, 0]);
    }

    #[test]
    fn test_extend_and_replace() {
        let mut array: SyncedArray<i32> = SyncedArray::new(0, &ALL);
        array.extend_on(Backend::Host, &[1, 2]).unwrap();
        assert_eq!(array.len(), 2);
        array.replace(Backend::OpenCl, vec![9]).unwrap();
        assert_eq!(array.len(), 1);
        assert_eq!(array.valid_backends(), vec![Backend::OpenCl]);
        assert_eq!(array.get(Backend::Host).unwrap(), &[9]);
    }
}

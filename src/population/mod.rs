//! Population data model.
//!
//! A [`Population`] stores per-object orbital elements, Cartesian position and
//! velocity, and auxiliary properties. Every category is kept in a synchronized
//! multi-backend array: callers obtain backend-local storage with `get` (which
//! copies from the authoritative backend when needed) and must call `update`
//! after writing so the other backends are invalidated.
//!
//! Failures are returned to the caller and also passed to the error callback of
//! the host that created the object.

mod index_list;
mod io;
mod sync;

pub use index_list::IndexList;

use crate::backend::Backend;
use crate::error::{OpiError, Result};
use crate::host::{ErrorReporter, HostId};
use crate::orbit::{ObjectProperties, Orbit, Vector3};
use bytemuck::Pod;
use serde::{Deserialize, Serialize};
use sync::SyncedArray;

/// Independently synchronized data categories of a population.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataCategory {
    Orbit = 0,
    Position = 1,
    Velocity = 2,
    Properties = 3,
}

impl DataCategory {
    pub const ALL: [DataCategory; 4] = [
        DataCategory::Orbit,
        DataCategory::Position,
        DataCategory::Velocity,
        DataCategory::Properties,
    ];

    #[must_use]
    pub fn from_raw(raw: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| *c as i32 == raw)
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Orbit => "orbit",
            Self::Position => "position",
            Self::Velocity => "velocity",
            Self::Properties => "properties",
        }
    }
}

impl std::fmt::Display for DataCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A set of simulated objects and their state.
pub struct Population {
    reporter: ErrorReporter,
    backends: Vec<Backend>,
    name: String,
    description: String,
    last_epoch: Option<f64>,
    orbits: SyncedArray<Orbit>,
    positions: SyncedArray<Vector3>,
    velocities: SyncedArray<Vector3>,
    properties: SyncedArray<ObjectProperties>,
}

impl Population {
    pub(crate) fn new(reporter: ErrorReporter, size: usize, backends: &[Backend]) -> Self {
        Self {
            reporter,
            backends: backends.to_vec(),
            name: String::new(),
            description: String::new(),
            last_epoch: None,
            orbits: SyncedArray::new(size, backends),
            positions: SyncedArray::new(size, backends),
            velocities: SyncedArray::new(size, backends),
            properties: SyncedArray::new(size, backends),
        }
    }

    /// Identity of the host that created this population.
    #[must_use]
    pub fn host_id(&self) -> HostId {
        self.reporter.host_id()
    }

    /// Backends this population can hold copies on.
    #[must_use]
    pub fn backends(&self) -> &[Backend] {
        &self.backends
    }

    /// Number of objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.orbits.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    /// Julian day the population was last propagated to, if ever.
    #[must_use]
    pub fn last_propagation_epoch(&self) -> Option<f64> {
        self.last_epoch
    }

    pub(crate) fn set_last_propagation_epoch(&mut self, julian_day: f64) {
        self.last_epoch = Some(julian_day);
    }

    /// Orbital elements on `backend`. Call [`update`](Self::update) after writing.
    pub fn orbits(&mut self, backend: Backend) -> Result<&mut [Orbit]> {
        self.reporter.report(self.orbits.get(backend))
    }

    pub fn positions(&mut self, backend: Backend) -> Result<&mut [Vector3]> {
        self.reporter.report(self.positions.get(backend))
    }

    pub fn velocities(&mut self, backend: Backend) -> Result<&mut [Vector3]> {
        self.reporter.report(self.velocities.get(backend))
    }

    pub fn properties(&mut self, backend: Backend) -> Result<&mut [ObjectProperties]> {
        self.reporter.report(self.properties.get(backend))
    }

    /// Untyped backend-local storage for `category`, synchronized first if stale.
    pub fn get(&mut self, category: DataCategory, backend: Backend) -> Result<&mut [u8]> {
        let bytes = match category {
            DataCategory::Orbit => self.orbits.get(backend).map(as_bytes),
            DataCategory::Position => self.positions.get(backend).map(as_bytes),
            DataCategory::Velocity => self.velocities.get(backend).map(as_bytes),
            DataCategory::Properties => self.properties.get(backend).map(as_bytes),
        };
        self.reporter.report(bytes)
    }

    /// Mark `backend` authoritative for `category` and invalidate all other copies.
    pub fn update(&mut self, category: DataCategory, backend: Backend) -> Result<()> {
        let result = match category {
            DataCategory::Orbit => self.orbits.update(backend),
            DataCategory::Position => self.positions.update(backend),
            DataCategory::Velocity => self.velocities.update(backend),
            DataCategory::Properties => self.properties.update(backend),
        };
        self.reporter.report(result)
    }

    /// Whether `backend` currently holds up-to-date data for `category`.
    #[must_use]
    pub fn is_valid(&self, category: DataCategory, backend: Backend) -> bool {
        match category {
            DataCategory::Orbit => self.orbits.is_valid(backend),
            DataCategory::Position => self.positions.is_valid(backend),
            DataCategory::Velocity => self.velocities.is_valid(backend),
            DataCategory::Properties => self.properties.is_valid(backend),
        }
    }

    /// The backend holding authoritative data for `category`.
    #[must_use]
    pub fn authoritative(&self, category: DataCategory) -> Backend {
        match category {
            DataCategory::Orbit => self.orbits.authoritative(),
            DataCategory::Position => self.positions.authoritative(),
            DataCategory::Velocity => self.velocities.authoritative(),
            DataCategory::Properties => self.properties.authoritative(),
        }
    }

    /// All backends holding a valid copy of `category`.
    #[must_use]
    pub fn valid_backends(&self, category: DataCategory) -> Vec<Backend> {
        match category {
            DataCategory::Orbit => self.orbits.valid_backends(),
            DataCategory::Position => self.positions.valid_backends(),
            DataCategory::Velocity => self.velocities.valid_backends(),
            DataCategory::Properties => self.properties.valid_backends(),
        }
    }

    /// Grow or shrink to `size` objects on `backend`.
    ///
    /// New objects are zeroed. Every other backend becomes stale.
    pub fn resize(&mut self, size: usize, backend: Backend) -> Result<()> {
        let result = self.resize_all(size, backend);
        self.reporter.report(result)
    }

    fn resize_all(&mut self, size: usize, backend: Backend) -> Result<()> {
        self.orbits.resize(size, backend)?;
        self.positions.resize(size, backend)?;
        self.velocities.resize(size, backend)?;
        self.properties.resize(size, backend)
    }

    /// Append copies of all objects of `other`.
    pub fn append(&mut self, other: &mut Population) -> Result<()> {
        let result = self.append_all(other);
        self.reporter.report(result)
    }

    fn append_all(&mut self, other: &mut Population) -> Result<()> {
        self.orbits
            .extend_on(Backend::Host, other.orbits.get(Backend::Host)?)?;
        self.positions
            .extend_on(Backend::Host, other.positions.get(Backend::Host)?)?;
        self.velocities
            .extend_on(Backend::Host, other.velocities.get(Backend::Host)?)?;
        self.properties
            .extend_on(Backend::Host, other.properties.get(Backend::Host)?)
    }

    /// Remove every object listed in `indices`.
    ///
    /// All indices are checked before anything is removed.
    pub fn remove(&mut self, indices: &mut IndexList) -> Result<()> {
        let result = self.remove_all(indices);
        self.reporter.report(result)
    }

    fn remove_all(&mut self, indices: &mut IndexList) -> Result<()> {
        self.check_owner(indices.host_id(), "index list")?;
        let size = self.len();
        let mut keep = vec![true; size];
        for index in indices.resolve(size)? {
            keep[index] = false;
        }
        let kept: Vec<usize> = (0..size).filter(|&i| keep[i]).collect();

        let orbits = gather(&mut self.orbits, &kept)?;
        let positions = gather(&mut self.positions, &kept)?;
        let velocities = gather(&mut self.velocities, &kept)?;
        let properties = gather(&mut self.properties, &kept)?;
        self.orbits.replace(Backend::Host, orbits)?;
        self.positions.replace(Backend::Host, positions)?;
        self.velocities.replace(Backend::Host, velocities)?;
        self.properties.replace(Backend::Host, properties)
    }

    /// A new population holding copies of the objects at `indices`, in that order.
    ///
    /// Fails with `IndexOutOfRange` before copying anything if an index is invalid.
    pub fn subset(&mut self, indices: &[usize]) -> Result<Population> {
        let result = self.extract(indices);
        self.reporter.report(result)
    }

    /// [`subset`](Self::subset) without reporting, for callers that report themselves.
    pub(crate) fn extract(&mut self, indices: &[usize]) -> Result<Population> {
        self.check_indices(indices)?;
        let mut subset = Population::new(self.reporter.clone(), indices.len(), &self.backends);
        subset.last_epoch = self.last_epoch;
        subset
            .orbits
            .replace(Backend::Host, gather(&mut self.orbits, indices)?)?;
        subset
            .positions
            .replace(Backend::Host, gather(&mut self.positions, indices)?)?;
        subset
            .velocities
            .replace(Backend::Host, gather(&mut self.velocities, indices)?)?;
        subset
            .properties
            .replace(Backend::Host, gather(&mut self.properties, indices)?)?;
        Ok(subset)
    }

    /// Write the objects of `subset` back to `indices`, the inverse of [`subset`](Self::subset).
    ///
    /// Later entries win when `indices` holds duplicates. All categories end up
    /// authoritative on the host.
    pub fn scatter(&mut self, subset: &mut Population, indices: &[usize]) -> Result<()> {
        let result = self.merge(subset, indices);
        self.reporter.report(result)
    }

    pub(crate) fn merge(&mut self, subset: &mut Population, indices: &[usize]) -> Result<()> {
        if subset.len() != indices.len() {
            return Err(OpiError::InvalidArgument(format!(
                "subset of {} objects cannot scatter to {} indices",
                subset.len(),
                indices.len()
            )));
        }
        self.check_indices(indices)?;
        scatter(&mut self.orbits, &mut subset.orbits, indices)?;
        scatter(&mut self.positions, &mut subset.positions, indices)?;
        scatter(&mut self.velocities, &mut subset.velocities, indices)?;
        scatter(&mut self.properties, &mut subset.properties, indices)
    }

    /// Indices of objects whose elements are not a bound, finite orbit.
    pub fn validate(&mut self) -> Result<Vec<usize>> {
        let invalid = self.orbits.get(Backend::Host).map(|orbits| {
            orbits
                .iter()
                .enumerate()
                .filter(|(_, orbit)| !orbit.is_valid())
                .map(|(i, _)| i)
                .collect::<Vec<_>>()
        });
        self.reporter.report(invalid)
    }

    pub(crate) fn check_owner(&self, owner: HostId, what: &'static str) -> Result<()> {
        if owner == self.host_id() {
            Ok(())
        } else {
            Err(OpiError::ForeignObject(what))
        }
    }

    fn check_indices(&self, indices: &[usize]) -> Result<()> {
        let size = self.len();
        match indices.iter().find(|&&i| i >= size) {
            Some(&index) => Err(OpiError::IndexOutOfRange {
                index: index as i64,
                size,
            }),
            None => Ok(()),
        }
    }
}

fn as_bytes<T: Pod>(data: &mut [T]) -> &mut [u8] {
    bytemuck::cast_slice_mut(data)
}

fn gather<T: Pod>(array: &mut SyncedArray<T>, indices: &[usize]) -> Result<Vec<T>> {
    let data = array.get(Backend::Host)?;
    Ok(indices.iter().map(|&i| data[i]).collect())
}

fn scatter<T: Pod>(
    dst: &mut SyncedArray<T>,
    src: &mut SyncedArray<T>,
    indices: &[usize],
) -> Result<()> {
    let values = src.get(Backend::Host)?;
    let target = dst.get(Backend::Host)?;
    for (value, &index) in values.iter().zip(indices) {
        target[index] = *value;
    }
    dst.update(Backend::Host)
}

impl std::fmt::Debug for Population {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Population")
            .field("name", &self.name)
            .field("len", &self.len())
            .field("backends", &self.backends)
            .field("last_epoch", &self.last_epoch)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn population(size: usize) -> Population {
        let mut population = Population::new(ErrorReporter::new(), size, &Backend::ALL);
        for (i, orbit) in population.orbits(Backend::Host).unwrap().iter_mut().enumerate() {
            orbit.semi_major_axis = 7000.0 + i as f64;
            orbit.eccentricity = 0.001;
        }
        population.update(DataCategory::Orbit, Backend::Host).unwrap();
        population
    }

    #[test]
    fn test_categories_are_independent() {
        let mut pop = population(3);
        pop.positions(Backend::Cuda).unwrap()[0].x = 1.0;
        pop.update(DataCategory::Position, Backend::Cuda).unwrap();

        assert_eq!(pop.authoritative(DataCategory::Position), Backend::Cuda);
        assert_eq!(pop.authoritative(DataCategory::Orbit), Backend::Host);
        assert!(pop.is_valid(DataCategory::Velocity, Backend::Host));
        assert_eq!(pop.positions(Backend::Host).unwrap()[0].x, 1.0);
    }

    #[test]
    fn test_untyped_get_matches_typed() {
        let mut pop = population(2);
        let bytes = pop.get(DataCategory::Orbit, Backend::OpenCl).unwrap();
        assert_eq!(bytes.len(), 2 * std::mem::size_of::<Orbit>());
        let orbits: &[Orbit] = bytemuck::cast_slice(&*bytes);
        assert_eq!(orbits[1].semi_major_axis, 7001.0);
    }

    #[test]
    fn test_subset_and_scatter() {
        let mut pop = population(5);
        let indices = [4, 1];
        let mut subset = pop.subset(&indices).unwrap();
        assert_eq!(subset.len(), 2);
        assert_eq!(subset.orbits(Backend::Host).unwrap()[0].semi_major_axis, 7004.0);

        for orbit in subset.orbits(Backend::Cuda).unwrap() {
            orbit.mean_anomaly = 1.5;
        }
        subset.update(DataCategory::Orbit, Backend::Cuda).unwrap();
        pop.scatter(&mut subset, &indices).unwrap();

        let orbits = pop.orbits(Backend::Host).unwrap();
        assert_eq!(orbits[4].mean_anomaly, 1.5);
        assert_eq!(orbits[1].mean_anomaly, 1.5);
        assert_eq!(orbits[0].mean_anomaly, 0.0);
    }

    #[test]
    fn test_append_resize_remove() {
        let mut pop = population(3);
        let mut other = population(2);
        pop.append(&mut other).unwrap();
        assert_eq!(pop.len(), 5);
        assert_eq!(pop.orbits(Backend::Host).unwrap()[3].semi_major_axis, 7000.0);

        pop.resize(6, Backend::Cuda).unwrap();
        assert_eq!(pop.len(), 6);
        assert_eq!(pop.valid_backends(DataCategory::Orbit), vec![Backend::Cuda]);

        let mut indices = IndexList::new(pop.reporter.clone(), &Backend::ALL);
        indices.extend([0, 5, 0]).unwrap();
        pop.remove(&mut indices).unwrap();
        assert_eq!(pop.len(), 4);
        assert_eq!(pop.orbits(Backend::Host).unwrap()[0].semi_major_axis, 7001.0);
    }

    #[test]
    fn test_remove_out_of_range_changes_nothing() {
        let mut pop = population(3);
        let mut indices = IndexList::new(pop.reporter.clone(), &Backend::ALL);
        indices.extend([1, 3]).unwrap();
        assert!(matches!(
            pop.remove(&mut indices),
            Err(OpiError::IndexOutOfRange { index: 3, size: 3 })
        ));
        assert_eq!(pop.len(), 3);
    }

    #[test]
    fn test_foreign_index_list_rejected() {
        let mut pop = population(3);
        let mut indices = IndexList::new(ErrorReporter::new(), &Backend::ALL);
        assert!(matches!(
            pop.remove(&mut indices),
            Err(OpiError::ForeignObject(_))
        ));
    }

    #[test]
    fn test_validate_flags_degenerate_orbits() {
        let mut pop = population(3);
        pop.orbits(Backend::Host).unwrap()[2].eccentricity = 1.5;
        pop.update(DataCategory::Orbit, Backend::Host).unwrap();
        assert_eq!(pop.validate().unwrap(), vec![2]);
    }
}

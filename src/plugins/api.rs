//! Plugin API definitions
//!
//! The binary contract between the host and propagator plugins. A plugin is a
//! shared library exporting `extern "C"` functions under the symbol names below.
//! Only `opi_plugin_info` and `opi_plugin_propagate` are mandatory.
//!
//! Population and index data reach the plugin through [`PopulationAccess`] and
//! [`IndexListAccess`]: small tables of host callbacks implementing the same
//! `get`/`update` synchronization contract the host itself uses. Plugins written in
//! Rust wrap them with [`PopulationRef`] and [`IndexListRef`].

use crate::backend::Backend;
use crate::error::ErrorCode;
use crate::orbit::{ObjectProperties, Orbit, Vector3};
use crate::plugins::descriptor::Version;
use crate::population::{DataCategory, IndexList, Population};
use std::ffi::{c_char, c_void};
use std::ptr;

/// Bumped whenever a struct or signature in this module changes.
pub const OPI_ABI_VERSION: u32 = 1;

pub const SYM_INFO: &[u8] = b"opi_plugin_info\0";
pub const SYM_INIT: &[u8] = b"opi_plugin_init\0";
pub const SYM_PROPAGATE: &[u8] = b"opi_plugin_propagate\0";
pub const SYM_PROPAGATE_INDEXED: &[u8] = b"opi_plugin_propagate_indexed\0";
pub const SYM_PROPAGATE_MULTI_TIME: &[u8] = b"opi_plugin_propagate_multi_time\0";
pub const SYM_ENABLE: &[u8] = b"opi_plugin_enable\0";
pub const SYM_DISABLE: &[u8] = b"opi_plugin_disable\0";
pub const SYM_CARTESIAN_OUTPUT: &[u8] = b"opi_plugin_cartesian_output\0";
pub const SYM_REFERENCE_FRAME: &[u8] = b"opi_plugin_reference_frame\0";
pub const SYM_BACKWARD_PROPAGATION: &[u8] = b"opi_plugin_backward_propagation\0";
pub const SYM_REQUIRED_ACCELERATORS: &[u8] = b"opi_plugin_required_accelerators\0";

/// Static metadata returned by `opi_plugin_info`.
///
/// All strings must be null-terminated and live as long as the library is loaded.
#[repr(C)]
pub struct RawPluginInfo {
    pub abi_version: u32,
    pub name: *const c_char,
    pub author: *const c_char,
    pub description: *const c_char,
    pub version: Version,
    pub min_host_version: Version,
}

// SAFETY: RawPluginInfo only points at static, immutable strings.
unsafe impl Send for RawPluginInfo {}
unsafe impl Sync for RawPluginInfo {}

pub type InfoFn = unsafe extern "C" fn() -> *const RawPluginInfo;
pub type InitFn = unsafe extern "C" fn() -> i32;
pub type PropagateFn =
    unsafe extern "C" fn(population: *mut PopulationAccess, julian_day: f64, dt: f64) -> i32;
pub type PropagateIndexedFn = unsafe extern "C" fn(
    population: *mut PopulationAccess,
    indices: *mut IndexListAccess,
    julian_day: f64,
    dt: f64,
) -> i32;
pub type PropagateMultiTimeFn = unsafe extern "C" fn(
    population: *mut PopulationAccess,
    julian_days: *const f64,
    len: usize,
    dt: f64,
) -> i32;
pub type LifecycleFn = unsafe extern "C" fn() -> i32;
pub type FlagFn = unsafe extern "C" fn() -> bool;
pub type FrameFn = unsafe extern "C" fn() -> i32;
pub type AcceleratorFn = unsafe extern "C" fn() -> u32;

/// Host callbacks giving a plugin synchronized access to a population.
#[repr(C)]
pub struct PopulationAccess {
    pub ctx: *mut c_void,
    pub size: unsafe extern "C" fn(ctx: *mut c_void) -> usize,
    /// Backend-local storage for a category, or null if the backend is unavailable.
    pub data: unsafe extern "C" fn(ctx: *mut c_void, category: i32, backend: i32) -> *mut c_void,
    pub update: unsafe extern "C" fn(ctx: *mut c_void, category: i32, backend: i32) -> i32,
}

/// Host callbacks giving a plugin synchronized access to an index list.
#[repr(C)]
pub struct IndexListAccess {
    pub ctx: *mut c_void,
    pub size: unsafe extern "C" fn(ctx: *mut c_void) -> usize,
    pub data: unsafe extern "C" fn(ctx: *mut c_void, backend: i32) -> *mut i32,
    pub update: unsafe extern "C" fn(ctx: *mut c_void, backend: i32) -> i32,
}

impl PopulationAccess {
    /// Callback table over `population`. Valid only while the borrow lasts.
    pub(crate) fn new(population: &mut Population) -> Self {
        Self {
            ctx: (population as *mut Population).cast(),
            size: population_size,
            data: population_data,
            update: population_update,
        }
    }
}

impl IndexListAccess {
    pub(crate) fn new(indices: &mut IndexList) -> Self {
        Self {
            ctx: (indices as *mut IndexList).cast(),
            size: index_list_size,
            data: index_list_data,
            update: index_list_update,
        }
    }
}

unsafe extern "C" fn population_size(ctx: *mut c_void) -> usize {
    // SAFETY: ctx was created from a live &mut Population by PopulationAccess::new.
    unsafe { (*ctx.cast::<Population>()).len() }
}

unsafe extern "C" fn population_data(ctx: *mut c_void, category: i32, backend: i32) -> *mut c_void {
    // SAFETY: see population_size.
    let population = unsafe { &mut *ctx.cast::<Population>() };
    let (Some(category), Some(backend)) =
        (DataCategory::from_raw(category), Backend::from_raw(backend))
    else {
        return ptr::null_mut();
    };
    match population.get(category, backend) {
        Ok(data) => data.as_mut_ptr().cast(),
        Err(_) => ptr::null_mut(),
    }
}

unsafe extern "C" fn population_update(ctx: *mut c_void, category: i32, backend: i32) -> i32 {
    // SAFETY: see population_size.
    let population = unsafe { &mut *ctx.cast::<Population>() };
    let (Some(category), Some(backend)) =
        (DataCategory::from_raw(category), Backend::from_raw(backend))
    else {
        return ErrorCode::InvalidArgument.as_raw();
    };
    match population.update(category, backend) {
        Ok(()) => ErrorCode::Success.as_raw(),
        Err(e) => e.code().as_raw(),
    }
}

unsafe extern "C" fn index_list_size(ctx: *mut c_void) -> usize {
    // SAFETY: ctx was created from a live &mut IndexList by IndexListAccess::new.
    unsafe { (*ctx.cast::<IndexList>()).len() }
}

unsafe extern "C" fn index_list_data(ctx: *mut c_void, backend: i32) -> *mut i32 {
    // SAFETY: see index_list_size.
    let indices = unsafe { &mut *ctx.cast::<IndexList>() };
    match Backend::from_raw(backend).map(|b| indices.get(b)) {
        Some(Ok(data)) => data.as_mut_ptr(),
        _ => ptr::null_mut(),
    }
}

unsafe extern "C" fn index_list_update(ctx: *mut c_void, backend: i32) -> i32 {
    // SAFETY: see index_list_size.
    let indices = unsafe { &mut *ctx.cast::<IndexList>() };
    match Backend::from_raw(backend).map(|b| indices.update(b)) {
        Some(Ok(())) => ErrorCode::Success.as_raw(),
        Some(Err(e)) => e.code().as_raw(),
        None => ErrorCode::InvalidArgument.as_raw(),
    }
}

/// Mutable views of every category of a population on one backend.
pub struct PopulationSlices<'a> {
    pub orbits: &'a mut [Orbit],
    pub positions: &'a mut [Vector3],
    pub velocities: &'a mut [Vector3],
    pub properties: &'a mut [ObjectProperties],
}

/// Plugin-side wrapper around a [`PopulationAccess`] received from the host.
pub struct PopulationRef<'a> {
    access: &'a mut PopulationAccess,
}

impl<'a> PopulationRef<'a> {
    /// # Safety
    ///
    /// `access` must be the pointer passed to a propagate entry point, used only
    /// for the duration of that call.
    pub unsafe fn from_raw(access: *mut PopulationAccess) -> Option<Self> {
        // SAFETY: caller guarantees the pointer came from the host.
        unsafe { access.as_mut() }.map(|access| Self { access })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        // SAFETY: the host keeps ctx alive for the duration of the call.
        unsafe { (self.access.size)(self.access.ctx) }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Synchronize every category to `backend` and borrow them together.
    ///
    /// Returns `None` if the backend is unavailable. Call [`update`](Self::update)
    /// for each written category once the slices are dropped.
    pub fn state(&mut self, backend: Backend) -> Option<PopulationSlices<'_>> {
        let len = self.len();
        if len == 0 {
            return Some(PopulationSlices {
                orbits: &mut [],
                positions: &mut [],
                velocities: &mut [],
                properties: &mut [],
            });
        }
        let orbits = self.raw(DataCategory::Orbit, backend)?;
        let positions = self.raw(DataCategory::Position, backend)?;
        let velocities = self.raw(DataCategory::Velocity, backend)?;
        let properties = self.raw(DataCategory::Properties, backend)?;
        // SAFETY: each category lives in its own allocation owned by the host, sized
        // `len`, and fetching one category never reallocates another. The slices are
        // tied to the exclusive borrow of self, so no second fetch can alias them.
        unsafe {
            Some(PopulationSlices {
                orbits: std::slice::from_raw_parts_mut(orbits.cast(), len),
                positions: std::slice::from_raw_parts_mut(positions.cast(), len),
                velocities: std::slice::from_raw_parts_mut(velocities.cast(), len),
                properties: std::slice::from_raw_parts_mut(properties.cast(), len),
            })
        }
    }

    fn raw(&mut self, category: DataCategory, backend: Backend) -> Option<*mut c_void> {
        // SAFETY: the host keeps ctx alive for the duration of the call.
        let data = unsafe { (self.access.data)(self.access.ctx, category as i32, backend as i32) };
        (!data.is_null()).then_some(data)
    }

    /// Report that `category` was written on `backend`.
    pub fn update(&mut self, category: DataCategory, backend: Backend) -> ErrorCode {
        // SAFETY: the host keeps ctx alive for the duration of the call.
        ErrorCode::from_raw(unsafe {
            (self.access.update)(self.access.ctx, category as i32, backend as i32)
        })
    }
}

/// Plugin-side wrapper around an [`IndexListAccess`] received from the host.
pub struct IndexListRef<'a> {
    access: &'a mut IndexListAccess,
}

impl<'a> IndexListRef<'a> {
    /// # Safety
    ///
    /// Same requirements as [`PopulationRef::from_raw`].
    pub unsafe fn from_raw(access: *mut IndexListAccess) -> Option<Self> {
        // SAFETY: caller guarantees the pointer came from the host.
        unsafe { access.as_mut() }.map(|access| Self { access })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        // SAFETY: the host keeps ctx alive for the duration of the call.
        unsafe { (self.access.size)(self.access.ctx) }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Indices synchronized to `backend`.
    pub fn indices(&mut self, backend: Backend) -> Option<&mut [i32]> {
        let len = self.len();
        // SAFETY: the host keeps ctx alive for the duration of the call.
        let data = unsafe { (self.access.data)(self.access.ctx, backend as i32) };
        if data.is_null() {
            return if len == 0 { Some(&mut []) } else { None };
        }
        // SAFETY: the host returned storage for exactly `len` indices.
        Some(unsafe { std::slice::from_raw_parts_mut(data, len) })
    }

    pub fn update(&mut self, backend: Backend) -> ErrorCode {
        // SAFETY: the host keeps ctx alive for the duration of the call.
        ErrorCode::from_raw(unsafe { (self.access.update)(self.access.ctx, backend as i32) })
    }
}

//! Basic two-body propagator plugin for OPI.
//!
//! Treats each object's orbital elements as valid at the first epoch it is asked
//! to propagate from, and writes Cartesian position and velocity for the requested
//! time. The elements themselves are never modified.

use opi::orbit::Orbit;
use opi::plugins::api::{
    IndexListAccess, IndexListRef, PopulationAccess, PopulationRef, RawPluginInfo,
    OPI_ABI_VERSION,
};
use opi::{Backend, DataCategory, ErrorCode, ReferenceFrame, Vector3, Version};
use std::sync::Mutex;

static INFO: RawPluginInfo = RawPluginInfo {
    abi_version: OPI_ABI_VERSION,
    name: b"basic\0".as_ptr().cast(),
    author: b"OPI contributors\0".as_ptr().cast(),
    description: b"Unperturbed two-body propagation of orbital elements\0".as_ptr().cast(),
    version: Version::new(0, 1, 0),
    min_host_version: Version::new(1, 0, 0),
};

/// Epoch of the elements, fixed by the first propagation after enable.
static REFERENCE_EPOCH: Mutex<Option<f64>> = Mutex::new(None);

const SECONDS_PER_DAY: f64 = 86_400.0;

fn seconds_since_reference(julian_day: f64, dt: f64) -> f64 {
    let mut reference = match REFERENCE_EPOCH.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    let base = *reference.get_or_insert(julian_day);
    (julian_day - base) * SECONDS_PER_DAY + dt
}

fn state_at(orbit: &Orbit, seconds: f64) -> (Vector3, Vector3) {
    orbit.advanced(seconds).to_cartesian()
}

fn finish(population: &mut PopulationRef<'_>) -> i32 {
    for category in [DataCategory::Position, DataCategory::Velocity] {
        let code = population.update(category, Backend::Host);
        if code != ErrorCode::Success {
            return code.as_raw();
        }
    }
    ErrorCode::Success.as_raw()
}

#[no_mangle]
pub extern "C" fn opi_plugin_info() -> *const RawPluginInfo {
    &INFO
}

#[no_mangle]
pub extern "C" fn opi_plugin_enable() -> i32 {
    ErrorCode::Success.as_raw()
}

/// Forget the reference epoch so the next enable starts over.
#[no_mangle]
pub extern "C" fn opi_plugin_disable() -> i32 {
    match REFERENCE_EPOCH.lock() {
        Ok(mut guard) => *guard = None,
        Err(poisoned) => *poisoned.into_inner() = None,
    }
    ErrorCode::Success.as_raw()
}

/// # Safety
///
/// `population` must be the access table passed by the host.
#[no_mangle]
pub unsafe extern "C" fn opi_plugin_propagate(
    population: *mut PopulationAccess,
    julian_day: f64,
    dt: f64,
) -> i32 {
    let Some(mut population) = (unsafe { PopulationRef::from_raw(population) }) else {
        return ErrorCode::InvalidArgument.as_raw();
    };
    let seconds = seconds_since_reference(julian_day, dt);
    {
        let Some(state) = population.state(Backend::Host) else {
            return ErrorCode::BackendUnavailable.as_raw();
        };
        for ((orbit, position), velocity) in state
            .orbits
            .iter()
            .zip(state.positions.iter_mut())
            .zip(state.velocities.iter_mut())
        {
            (*position, *velocity) = state_at(orbit, seconds);
        }
    }
    finish(&mut population)
}

/// # Safety
///
/// Both pointers must be the access tables passed by the host.
#[no_mangle]
pub unsafe extern "C" fn opi_plugin_propagate_indexed(
    population: *mut PopulationAccess,
    indices: *mut IndexListAccess,
    julian_day: f64,
    dt: f64,
) -> i32 {
    let (Some(mut population), Some(mut indices)) = (unsafe {
        (PopulationRef::from_raw(population), IndexListRef::from_raw(indices))
    }) else {
        return ErrorCode::InvalidArgument.as_raw();
    };
    let seconds = seconds_since_reference(julian_day, dt);
    let Some(indices) = indices.indices(Backend::Host) else {
        return ErrorCode::BackendUnavailable.as_raw();
    };
    {
        let Some(state) = population.state(Backend::Host) else {
            return ErrorCode::BackendUnavailable.as_raw();
        };
        for &index in indices.iter() {
            let Some(i) = usize::try_from(index).ok().filter(|&i| i < state.orbits.len()) else {
                return ErrorCode::IndexOutOfRange.as_raw();
            };
            (state.positions[i], state.velocities[i]) = state_at(&state.orbits[i], seconds);
        }
    }
    finish(&mut population)
}

#[no_mangle]
pub extern "C" fn opi_plugin_cartesian_output() -> bool {
    true
}

#[no_mangle]
pub extern "C" fn opi_plugin_reference_frame() -> i32 {
    ReferenceFrame::Eci as i32
}

#[no_mangle]
pub extern "C" fn opi_plugin_backward_propagation() -> bool {
    true
}

//! Shared helpers for in-process test propagators.
#![allow(dead_code, unused_macros)]

use opi::plugins::api::{PopulationAccess, PopulationRef};
use opi::plugins::EntryPoints;
use opi::{Backend, DataCategory, ErrorCode, Host, Orbit, Population};
use std::f64::consts::TAU;

/// Define an `opi_plugin_info`-style function returning static metadata.
macro_rules! plugin_info {
    ($fn_name:ident, $name:literal) => {
        plugin_info!($fn_name, $name, opi::Version::new(1, 0, 0));
    };
    ($fn_name:ident, $name:literal, $min_host:expr) => {
        unsafe extern "C" fn $fn_name() -> *const opi::plugins::api::RawPluginInfo {
            static INFO: opi::plugins::api::RawPluginInfo = opi::plugins::api::RawPluginInfo {
                abi_version: opi::plugins::api::OPI_ABI_VERSION,
                name: concat!($name, "\0").as_ptr().cast(),
                author: b"OPI test suite\0".as_ptr().cast(),
                description: b"in-process test propagator\0".as_ptr().cast(),
                version: opi::Version::new(0, 1, 0),
                min_host_version: $min_host,
            };
            &INFO
        }
    };
}

/// Advance every object by `dt` seconds of two-body motion on the host backend.
///
/// # Safety
///
/// `access` must be the pointer handed to a propagate entry point.
pub unsafe fn kepler_step(access: *mut PopulationAccess, dt: f64) -> i32 {
    let Some(mut population) = (unsafe { PopulationRef::from_raw(access) }) else {
        return ErrorCode::InvalidArgument.as_raw();
    };
    {
        let Some(state) = population.state(Backend::Host) else {
            return ErrorCode::BackendUnavailable.as_raw();
        };
        for i in 0..state.orbits.len() {
            let next = state.orbits[i].advanced(dt);
            let (position, velocity) = next.to_cartesian();
            state.orbits[i] = next;
            state.positions[i] = position;
            state.velocities[i] = velocity;
        }
    }
    for category in [DataCategory::Orbit, DataCategory::Position, DataCategory::Velocity] {
        let code = population.update(category, Backend::Host);
        if code != ErrorCode::Success {
            return code.as_raw();
        }
    }
    ErrorCode::Success.as_raw()
}

/// A low Earth orbit shell with distinct elements per object.
pub fn seeded_population(host: &Host, size: usize) -> Population {
    let mut population = host.create_population(size);
    for (i, orbit) in population
        .orbits(Backend::Host)
        .unwrap()
        .iter_mut()
        .enumerate()
    {
        *orbit = seed_orbit(i, size);
    }
    population
        .update(DataCategory::Orbit, Backend::Host)
        .unwrap();
    population
}

pub fn seed_orbit(i: usize, size: usize) -> Orbit {
    let fraction = i as f64 / size as f64;
    Orbit {
        semi_major_axis: 6800.0 + 500.0 * fraction,
        eccentricity: 0.001 + 0.02 * fraction,
        inclination: 0.5 + fraction,
        raan: TAU * fraction,
        arg_of_perigee: 0.3,
        mean_anomaly: TAU * fraction,
    }
}

/// Host snapshot of every category, for before/after comparisons.
pub fn snapshot(population: &mut Population) -> (Vec<Orbit>, Vec<opi::Vector3>, Vec<opi::Vector3>) {
    (
        population.orbits(Backend::Host).unwrap().to_vec(),
        population.positions(Backend::Host).unwrap().to_vec(),
        population.velocities(Backend::Host).unwrap().to_vec(),
    )
}

/// Register, enable and select a static propagator.
pub fn install(host: &mut Host, entry: EntryPoints) -> String {
    // SAFETY: test propagators follow the plugin contract.
    let descriptor = unsafe { host.register_propagator(entry) }.unwrap();
    host.enable(&descriptor.name).unwrap();
    host.select_propagator(&descriptor.name).unwrap();
    descriptor.name
}

//! Population buffer behavior as seen through the public API.

mod common;

use common::{seed_orbit, seeded_population, snapshot};
use opi::{AcceleratorFlags, Backend, DataCategory, ErrorCode, Host, OpiError};
use proptest::prelude::*;
use std::sync::{Arc, Mutex};

fn all_backends() -> Host {
    Host::with_accelerators(AcceleratorFlags::CUDA | AcceleratorFlags::OPENCL)
}

#[test]
fn test_fresh_population_is_host_valid() {
    let host = all_backends();
    let population = host.create_population(4);
    for category in DataCategory::ALL {
        assert_eq!(population.valid_backends(category), vec![Backend::Host]);
        assert_eq!(population.authoritative(category), Backend::Host);
    }
}

#[test]
fn test_device_write_then_host_read() {
    let host = all_backends();
    let mut population = seeded_population(&host, 3);

    population.velocities(Backend::OpenCl).unwrap()[2].y = 7.5;
    population
        .update(DataCategory::Velocity, Backend::OpenCl)
        .unwrap();
    assert!(!population.is_valid(DataCategory::Velocity, Backend::Host));

    assert_eq!(population.velocities(Backend::Host).unwrap()[2].y, 7.5);
    assert!(population.is_valid(DataCategory::Velocity, Backend::Host));
    assert_eq!(
        population.authoritative(DataCategory::Orbit),
        Backend::Host
    );
}

#[test]
fn test_unavailable_backend() {
    let host = Host::new();
    let mut population = host.create_population(2);
    assert!(matches!(
        population.orbits(Backend::Cuda),
        Err(OpiError::BackendUnavailable(_))
    ));
    assert!(matches!(
        population.update(DataCategory::Orbit, Backend::OpenCl),
        Err(OpiError::BackendUnavailable(_))
    ));
}

#[test]
fn test_data_model_failures_reach_error_callback() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut host = Host::new();
    let mut population = host.create_population(2);
    let mut indices = host.create_index_list();
    let sink = Arc::clone(&seen);
    host.set_error_callback(move |id, code| sink.lock().unwrap().push((id, code)));

    assert!(matches!(
        population.orbits(Backend::Cuda),
        Err(OpiError::BackendUnavailable(_))
    ));
    assert!(population
        .update(DataCategory::Orbit, Backend::Cuda)
        .is_err());
    indices.add(5).unwrap();
    assert!(matches!(
        population.remove(&mut indices),
        Err(OpiError::IndexOutOfRange { index: 5, size: 2 })
    ));
    assert!(population.subset(&[2]).is_err());
    assert!(indices.get(Backend::OpenCl).is_err());
    assert!(population.orbits(Backend::Host).is_ok());
    assert_eq!(population.len(), 2);

    let id = host.id();
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            (id, ErrorCode::BackendUnavailable),
            (id, ErrorCode::BackendUnavailable),
            (id, ErrorCode::IndexOutOfRange),
            (id, ErrorCode::IndexOutOfRange),
            (id, ErrorCode::BackendUnavailable),
        ]
    );
}

#[test]
fn test_corrupt_object_count_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("corrupt.opi");
    let mut bytes = b"OPIPOP01".to_vec();
    bytes.extend_from_slice(&(u64::MAX / 16).to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&f64::NAN.to_le_bytes());
    std::fs::write(&path, bytes).unwrap();

    let mut host = Host::new();
    assert!(matches!(
        host.read_population(&path),
        Err(OpiError::InvalidArgument(_))
    ));
}

#[test]
fn test_population_file_roundtrip_through_host() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shell.opi");

    let mut host = all_backends();
    let mut population = seeded_population(&host, 5);
    population.set_name("leo shell");
    population.set_description("five objects");
    population.properties(Backend::Cuda).unwrap()[1].mass = 420.0;
    population
        .update(DataCategory::Properties, Backend::Cuda)
        .unwrap();
    population.write_to_file(&path).unwrap();

    let mut loaded = host.read_population(&path).unwrap();
    assert_eq!(loaded.host_id(), host.id());
    assert_eq!(loaded.name(), "leo shell");
    assert_eq!(loaded.description(), "five objects");
    assert_eq!(snapshot(&mut loaded), snapshot(&mut population));
    assert_eq!(loaded.properties(Backend::Host).unwrap()[1].mass, 420.0);
}

#[test]
fn test_reading_garbage_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("garbage.opi");
    std::fs::write(&path, b"definitely not a population").unwrap();

    let mut host = Host::new();
    assert!(host.read_population(&path).is_err());
    assert!(matches!(
        host.read_population(dir.path().join("absent.opi")),
        Err(OpiError::Io(_))
    ));
}

proptest! {
    #[test]
    fn test_last_update_wins(
        writes in prop::collection::vec((0usize..3, 0usize..8, -1.0e4f64..1.0e4), 1..24)
    ) {
        let host = all_backends();
        let mut population = host.create_population(8);
        let mut expected = vec![0.0f64; 8];

        for (slot, index, value) in writes {
            let backend = Backend::ALL[slot];
            population.positions(backend).unwrap()[index].x = value;
            population.update(DataCategory::Position, backend).unwrap();
            expected[index] = value;

            prop_assert_eq!(population.valid_backends(DataCategory::Position), vec![backend]);
        }

        for backend in Backend::ALL {
            let xs: Vec<f64> = population
                .positions(backend)
                .unwrap()
                .iter()
                .map(|p| p.x)
                .collect();
            prop_assert_eq!(&xs, &expected);
        }
        prop_assert_eq!(population.valid_backends(DataCategory::Position).len(), 3);
    }

    #[test]
    fn test_subset_preserves_objects(indices in prop::collection::vec(0usize..16, 1..16)) {
        let host = Host::new();
        let mut population = seeded_population(&host, 16);
        let mut subset = population.subset(&indices).unwrap();
        let orbits = subset.orbits(Backend::Host).unwrap();
        for (k, &i) in indices.iter().enumerate() {
            prop_assert_eq!(orbits[k], seed_orbit(i, 16));
        }
    }
}

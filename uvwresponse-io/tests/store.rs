use std::sync::atomic::AtomicBool;

use uvwresponse_algorithms::KernelGenerator;
use uvwresponse_core::{
    Direction, RegularGeometry, RegularGeometryConfig, ResponseConfig, ResponseKernels,
};
use uvwresponse_io::{write_container, ContainerFormat, Error, KernelStore};

fn geometry() -> RegularGeometry {
    RegularGeometry::new(RegularGeometryConfig::default().with_radius(20.0)).unwrap()
}

fn config() -> ResponseConfig {
    ResponseConfig::new()
        .with_window(2, 3, 2)
        .with_sigmas(0.5, 0.4)
        .with_xy_sampling(200, 6)
        .with_z_sampling(10, 6)
}

fn generate(config: &ResponseConfig) -> ResponseKernels {
    let cancel = AtomicBool::new(false);
    KernelGenerator::new(config.clone())
        .unwrap()
        .generate(&geometry(), &cancel)
        .unwrap()
}

fn assert_bit_identical(a: &ResponseKernels, b: &ResponseKernels) {
    for (dir, delta) in [(Direction::U, 0), (Direction::V, -1), (Direction::W, 2)] {
        let left = a.merged(dir, delta).unwrap().values();
        let right = b.merged(dir, delta).unwrap().values();
        assert!(left
            .iter()
            .zip(right)
            .all(|(l, r)| l.to_bits() == r.to_bits()));
        let left = a.section_start(dir, delta, -1).unwrap().values();
        let right = b.section_start(dir, delta, -1).unwrap().values();
        assert!(left
            .iter()
            .zip(right)
            .all(|(l, r)| l.to_bits() == r.to_bits()));
    }
    for delta in [-3, 0, 1] {
        let left = a.time(delta).unwrap().values();
        let right = b.time(delta).unwrap().values();
        assert!(left
            .iter()
            .zip(right)
            .all(|(l, r)| l.to_bits() == r.to_bits()));
    }
    assert_eq!(a, b);
}

#[test]
fn test_save_then_load_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let store = KernelStore::new(dir.path());
    let kernels = generate(&config());
    let path = store.save(&kernels).unwrap();
    assert!(path
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("StripResponseModel_2x3x2_S25MHz_V0.65cmus_T0.5mm_L0.4mm"));
    assert!(store.contains(kernels.identity()));

    let loaded = store.load(&config(), &geometry()).unwrap();
    assert_bit_identical(&kernels, &loaded);
}

#[test]
fn test_second_save_fails_without_touching_first() {
    let dir = tempfile::tempdir().unwrap();
    let store = KernelStore::new(dir.path());
    let kernels = generate(&config());
    let path = store.save(&kernels).unwrap();
    let before = std::fs::read(&path).unwrap();

    let other = generate(&config().with_seed(99));
    assert!(matches!(store.save(&other), Err(Error::ContainerExists(p)) if p == path));
    assert_eq!(std::fs::read(&path).unwrap(), before);
    // No temporary files are left behind.
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[test]
fn test_other_identity_is_regenerated() {
    let dir = tempfile::tempdir().unwrap();
    let store = KernelStore::new(dir.path());
    store.save(&generate(&config())).unwrap();

    let changed = config().with_sigmas(0.7, 0.4);
    assert!(store.load(&changed, &geometry()).is_err());
    let cancel = AtomicBool::new(false);
    let kernels = store
        .load_or_generate(&geometry(), &changed, &cancel, true)
        .unwrap();
    assert_eq!(kernels.identity(), &changed.identity(&geometry()));
    assert!(store.contains(kernels.identity()));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
}

#[test]
fn test_load_or_generate_reuses_container() {
    let dir = tempfile::tempdir().unwrap();
    let store = KernelStore::new(dir.path());
    let kernels = generate(&config());
    store.save(&kernels).unwrap();
    // A raised cancel flag proves that nothing is generated.
    let cancel = AtomicBool::new(true);
    let loaded = store
        .load_or_generate(&geometry(), &config(), &cancel, false)
        .unwrap();
    assert_eq!(loaded, kernels);
}

#[test]
fn test_renamed_container_is_an_identity_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let store = KernelStore::new(dir.path());
    let saved = store.save(&generate(&config())).unwrap();

    let wanted = config().with_sigmas(0.5, 0.9);
    let wanted_path = store.path_for(&wanted.identity(&geometry()));
    std::fs::rename(&saved, &wanted_path).unwrap();

    let err = store.load(&wanted, &geometry()).unwrap_err();
    assert!(matches!(err, Error::IdentityMismatch { .. }));
    assert!(err.is_kernel_mismatch());

    let cancel = AtomicBool::new(false);
    let kernels = store
        .load_or_generate(&geometry(), &wanted, &cancel, true)
        .unwrap();
    assert_eq!(kernels.identity().sigma_z_mm, 0.9);
}

#[test]
fn test_partial_family_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = KernelStore::new(dir.path());
    let narrow = generate(&config().with_window(2, 3, 1));
    let mut bytes = Vec::new();
    write_container(&mut bytes, &narrow).unwrap();
    // Claim a pad window of 2 while only tables up to 1 are present.
    bytes[16..20].copy_from_slice(&2u32.to_le_bytes());

    let wide = config();
    std::fs::write(store.path_for(&wide.identity(&geometry())), &bytes).unwrap();
    let err = store.load(&wide, &geometry()).unwrap_err();
    assert!(matches!(err, Error::MissingTable(ref name) if name.contains("_pad")));
    assert!(err.is_kernel_mismatch());
}

#[test]
fn test_recycled_time_part_keeps_xy_tables() {
    let kernels = generate(&config());
    let retimed_config = config().with_sigmas(0.5, 1.1).with_peaking_time(120.0);
    let geo = geometry();
    let time = KernelGenerator::new(retimed_config.clone())
        .unwrap()
        .generate_time_response(&geo)
        .unwrap();
    let retimed = kernels
        .clone()
        .with_time_response(retimed_config.identity(&geo), time)
        .unwrap();
    for dir in Direction::ALL {
        for delta in -2..=2 {
            assert_eq!(retimed.merged(dir, delta), kernels.merged(dir, delta));
            for pad in -2..=2 {
                assert_eq!(
                    retimed.section_start(dir, delta, pad),
                    kernels.section_start(dir, delta, pad)
                );
            }
        }
    }
    assert_ne!(retimed.time(0), kernels.time(0));

    let dir = tempfile::tempdir().unwrap();
    let store = KernelStore::new(dir.path()).with_format(ContainerFormat::Binary);
    store.save(&retimed).unwrap();
    let loaded = store.load(&retimed_config, &geo).unwrap();
    assert_bit_identical(&retimed, &loaded);
}

#[cfg(feature = "hdf5")]
#[test]
fn test_hdf5_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let store = KernelStore::new(dir.path()).with_format(ContainerFormat::Hdf5);
    let kernels = generate(&config());
    let path = store.save(&kernels).unwrap();
    assert_eq!(path.extension().unwrap(), "h5");
    let loaded = store.load(&config(), &geometry()).unwrap();
    assert_bit_identical(&kernels, &loaded);
    assert!(matches!(
        store.save(&kernels),
        Err(Error::ContainerExists(_))
    ));
}

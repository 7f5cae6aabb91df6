#![allow(clippy::float_cmp)]
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, OnceLock};

use approx::assert_abs_diff_eq;
use uvwresponse_algorithms::{ChargeProjector, KernelGenerator, SectionSplitter};
use uvwresponse_core::{
    Axis, ChargeMap, Direction, DriftProfile, Error, OutputSink, PhysicalProjections,
    RegularGeometry, RegularGeometryConfig, ResponseConfig, ResponseKernels, StripGeometry,
    StripId, StripTimeProjections, Vec2,
};

const BINS: usize = 12;

fn config() -> ResponseConfig {
    ResponseConfig::new()
        .with_window(4, 10, 4)
        .with_sigmas(0.5, 0.5)
        .with_xy_sampling(2000, BINS)
        .with_seed(7)
}

fn geometry_config() -> RegularGeometryConfig {
    RegularGeometryConfig::default()
        .with_radius(20.0)
        .with_section_split(Direction::U, 0.0)
}

fn geometry() -> Arc<RegularGeometry> {
    Arc::new(RegularGeometry::new(geometry_config()).unwrap())
}

fn kernels() -> Arc<ResponseKernels> {
    static KERNELS: OnceLock<Arc<ResponseKernels>> = OnceLock::new();
    KERNELS
        .get_or_init(|| {
            let cancel = AtomicBool::new(false);
            let kernels = KernelGenerator::new(config())
                .unwrap()
                .generate(geometry().as_ref(), &cancel)
                .unwrap();
            Arc::new(kernels)
        })
        .clone()
}

fn projector() -> ChargeProjector {
    ChargeProjector::new(geometry(), kernels()).unwrap()
}

fn all_sinks() -> Vec<OutputSink> {
    let z_axis = Axis::new(200, -10.0, 10.0).unwrap();
    let position_axis = Axis::new(160, -40.0, 40.0).unwrap();
    vec![
        OutputSink::RawProjection(StripTimeProjections::new(64, 512)),
        OutputSink::PhysicalProjection(PhysicalProjections::new(z_axis, position_axis)),
        OutputSink::DriftProfile(DriftProfile::new(z_axis)),
        OutputSink::ChargeMap(ChargeMap::new()),
    ]
}

fn in_disk(kernels: &ResponseKernels, ix: usize, iy: usize) -> bool {
    let merged = kernels.merged(Direction::U, 0).unwrap();
    let x = merged.x_axis().bin_center(ix);
    let y = merged.y_axis().bin_center(iy);
    x.hypot(y) <= 1.05 * merged.x_axis().max()
}

#[test]
fn test_merged_kernels_close_to_unity() {
    let kernels = kernels();
    for ix in 0..BINS {
        for iy in 0..BINS {
            let closure = kernels.merged_closure(ix, iy);
            if in_disk(&kernels, ix, iy) {
                assert_abs_diff_eq!(closure, 1.0, epsilon = 1e-9);
            } else {
                assert_eq!(closure, 0.0);
            }
        }
    }
}

#[test]
fn test_every_family_collects_charge() {
    let kernels = kernels();
    let centre = BINS / 2;
    for dir in Direction::ALL {
        let share = kernels.direction_share(dir, centre, centre);
        assert!(share > 0.1, "{dir} share {share}");
    }
}

#[test]
fn test_section_start_is_cumulative() {
    let kernels = kernels();
    let window = kernels.window();
    for dir in Direction::ALL {
        for delta in window.strip_offsets() {
            let merged = kernels.merged(dir, delta).unwrap();
            for ix in 0..BINS {
                for iy in 0..BINS {
                    let mut previous = 0.0;
                    for p in window.pad_offsets() {
                        let value = kernels.section_start(dir, delta, p).unwrap().bin(ix, iy);
                        assert!(value + 1e-12 >= previous);
                        assert!(value <= merged.bin(ix, iy) + 1e-12);
                        previous = value;
                    }
                    // The last boundary lies beyond every sample.
                    assert_abs_diff_eq!(previous, merged.bin(ix, iy), epsilon = 1e-12);
                }
            }
        }
    }
}

#[test]
fn test_generation_is_reproducible_across_thread_counts() {
    let geo = geometry();
    let config = config().with_xy_sampling(200, 6).with_window(2, 3, 2);
    let generator = KernelGenerator::new(config).unwrap();
    let cancel = AtomicBool::new(false);
    let parallel = generator.generate(geo.as_ref(), &cancel).unwrap();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(1)
        .build()
        .unwrap();
    let serial = pool
        .install(|| generator.generate(geo.as_ref(), &cancel))
        .unwrap();
    assert_eq!(parallel, serial);

    let reseeded = KernelGenerator::new(generator.config().clone().with_seed(8))
        .unwrap()
        .generate(geo.as_ref(), &cancel)
        .unwrap();
    assert_ne!(parallel, reseeded);
}

#[test]
fn test_generation_can_be_cancelled() {
    let geo = geometry();
    let cancel = AtomicBool::new(true);
    let result = KernelGenerator::new(config())
        .unwrap()
        .generate(geo.as_ref(), &cancel);
    assert!(matches!(result, Err(Error::Cancelled)));
}

#[test]
fn test_deposit_at_node_is_fully_collected() {
    let mut projector = projector();
    projector.set_output_sinks(all_sinks());
    // Slightly off the exact node so that the deposit sits inside one XY bin.
    projector.add_charge([1e-6, 1e-6, 1e-6], 1000.0, None);
    for sink in projector.sinks() {
        let total = sink.total();
        assert!(
            total > 990.0 && total < 1000.0 + 1e-6,
            "{} total {total}",
            sink.kind()
        );
    }
}

#[test]
fn test_sinks_receive_consistent_charge() {
    let mut projector = projector();
    projector.set_output_sinks(all_sinks());
    let mut persistent = ChargeMap::new();
    projector.add_charge([3.1, -2.4, 0.7], 250.0, Some(&mut persistent));
    projector.add_charge([-5.0, 1.3, -1.1], 125.0, Some(&mut persistent));

    let sinks = projector.take_sinks();
    assert!(projector.sinks().is_empty());
    let reference = persistent.total();
    assert!(reference > 370.0);
    for sink in &sinks {
        assert_abs_diff_eq!(sink.total(), reference, epsilon = 1e-9);
    }
    let OutputSink::RawProjection(raw) = &sinks[0] else {
        panic!("expected raw projection first");
    };
    for dir in Direction::ALL {
        assert_abs_diff_eq!(raw.total(dir), persistent.total_for(dir), epsilon = 1e-9);
    }
}

#[test]
fn test_zero_charge_is_a_no_op() {
    let mut projector = projector();
    projector.set_output_sinks(all_sinks());
    let before = projector.sinks().to_vec();
    let mut persistent = ChargeMap::new();
    projector.add_charge([0.3, 0.2, 0.0], 0.0, Some(&mut persistent));
    assert_eq!(projector.sinks(), before.as_slice());
    assert!(persistent.is_empty());
}

#[test]
fn test_deposit_outside_active_area_is_dropped() {
    let mut projector = projector();
    projector.set_output_sinks(all_sinks());
    let before = projector.sinks().to_vec();
    projector.add_charge([50.0, 0.0, 0.0], 100.0, None);
    projector.add_charge([0.0, 0.0, 1.0e4], 100.0, None);
    assert_eq!(projector.sinks(), before.as_slice());
}

#[test]
fn test_section_ratio_matches_section_start_kernel() {
    let geo = geometry();
    let kernels = kernels();
    let mut projector = projector();
    let u_strip = geo.strip_number(0);
    let mut shares = Vec::new();
    for x in [-0.3, 0.3] {
        let mut map = ChargeMap::new();
        projector.add_charge([x, 0.1, 0.05], 100.0, Some(&mut map));
        let collected = |section: u8| -> f64 {
            map.iter()
                .filter(|(key, _)| {
                    key.dir == Direction::U && key.strip == u_strip && key.section == section
                })
                .map(|(_, charge)| charge)
                .sum()
        };
        let (before, after) = (collected(0), collected(1));
        let merged = kernels.merged(Direction::U, 0).unwrap().value_at(x, 0.1);
        let start = kernels
            .section_start(Direction::U, 0, 0)
            .unwrap()
            .value_at(x, 0.1);
        assert!(merged > 0.0);
        assert_abs_diff_eq!(before / (before + after), start / merged, epsilon = 1e-12);
        shares.push(before / (before + after));
    }
    // The deposit before the boundary leaves more charge in the first section.
    assert!(shares[0] > shares[1]);
}

#[test]
fn test_track_segment_spreads_charge() {
    let mut projector = projector();
    projector.set_output_sinks(vec![OutputSink::ChargeMap(ChargeMap::new())]);
    projector.add_track_segment([-3.0, -1.0, -0.5], [3.0, 2.0, 0.5], 600.0, 30);
    let total = projector.sinks()[0].total();
    assert!(total > 590.0 && total < 600.0 + 1e-6, "total {total}");

    projector.set_output_sinks(all_sinks());
    projector.add_track_segment([0.0; 3], [1.0; 3], 10.0, 0);
    assert_eq!(projector.sinks()[0].total(), 0.0);
}

#[test]
fn test_strip_response_snapshot() {
    let projector = projector();
    let snapshot = projector.strip_response(Direction::W, -1).unwrap();
    assert_eq!(
        &snapshot,
        projector.kernels().merged(Direction::W, -1).unwrap()
    );
    assert!(projector.strip_response(Direction::W, 5).is_none());
}

#[test]
fn test_charge_near_the_active_area_edge_is_lost() {
    // Barely larger than the kernel disk: samples leave the active area.
    let small = RegularGeometry::new(RegularGeometryConfig::default().with_radius(2.0)).unwrap();
    let large = geometry();
    let config = config().with_window(2, 3, 2).with_xy_sampling(500, 8);
    let cancel = AtomicBool::new(false);
    let generator = KernelGenerator::new(config).unwrap();
    let edge = generator.generate(&small, &cancel).unwrap();
    let full = generator.generate(large.as_ref(), &cancel).unwrap();

    let mut min_closure = f64::INFINITY;
    for ix in 0..8 {
        for iy in 0..8 {
            let closure = edge.merged_closure(ix, iy);
            assert!(closure <= 1.0 + 1e-9, "closure {closure} at ({ix}, {iy})");
            // Same samples, some of them dropped.
            assert!(closure <= full.merged_closure(ix, iy) + 1e-12);
            if in_disk(&edge, ix, iy) {
                min_closure = min_closure.min(closure);
            }
        }
    }
    assert!(min_closure < 0.9, "minimum closure {min_closure}");
}

#[test]
fn test_deposits_on_timecell_edges_are_kept() {
    let geo = geometry();
    let mut projector = projector();
    let width = geo.timecell_width();
    for cell in (200..312).step_by(3) {
        let edge = geo.timecell_lower_edge(cell).unwrap();
        let candidates = [
            edge,
            f64::from_bits(edge.to_bits() + 1),
            f64::from_bits(edge.to_bits() - 1),
            geo.timecell_lower_edge(0).unwrap() + f64::from(cell) * width,
            edge + 1e-13,
            edge - 1e-13,
        ];
        for z in candidates {
            let mut map = ChargeMap::new();
            projector.add_charge([0.3, 0.2, z], 1000.0, Some(&mut map));
            let total = map.total();
            assert!(
                total > 990.0 && total <= 1000.0 + 1e-9,
                "z={z} total {total}"
            );
        }
    }
}

#[test]
fn test_generated_boundary_sweep_on_odd_strips() {
    let kernels = kernels();
    let window = kernels.window();
    let mut non_trivial = 0;
    for delta in [-1, 1] {
        for p in window.pad_offsets() {
            let pad = geometry().pad_pitch();
            let geo = RegularGeometry::new(
                RegularGeometryConfig::default()
                    .with_radius(20.0)
                    .with_section_split(Direction::U, (f64::from(p) + 0.5) * pad),
            )
            .unwrap();
            let splitter = SectionSplitter::new(&geo, &kernels);
            let strip = StripId::new(Direction::U, geo.strip_number(delta));
            for offset in [
                Vec2::new(0.3, 0.6),
                Vec2::new(-0.4, -0.6),
                Vec2::new(0.1, 0.0),
            ] {
                let fraction = kernels
                    .merged(Direction::U, delta)
                    .unwrap()
                    .value_at(offset.x, offset.y);
                let sections = splitter.split(strip, delta, Vec2::default(), offset, fraction);
                assert_eq!(sections.len(), 2);
                let total: f64 = sections.iter().map(|s| s.fraction).sum();
                assert_abs_diff_eq!(total, fraction, epsilon = 1e-12);
                let start = kernels
                    .section_start(Direction::U, delta, p)
                    .unwrap()
                    .value_at(offset.x, offset.y);
                assert_abs_diff_eq!(sections[0].fraction, start, epsilon = 1e-12);
                if fraction > 0.0 {
                    non_trivial += 1;
                }
            }
        }
    }
    assert!(non_trivial > 0);
}

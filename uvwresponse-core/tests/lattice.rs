use approx::assert_abs_diff_eq;
use uvwresponse_core::{
    boundaries_are_contiguous, Direction, RegularGeometry, RegularGeometryConfig, StripGeometry,
    StripId, Vec2,
};

fn geometry() -> RegularGeometry {
    RegularGeometry::new(RegularGeometryConfig::default().with_radius(30.0)).unwrap()
}

#[test]
fn test_nodes_are_spaced_one_pad_apart_on_every_family() {
    let geo = geometry();
    let pad = geo.pad_pitch();
    for dir in Direction::ALL {
        for k in [-4, -1, 0, 3] {
            let strip = StripId::new(dir, geo.strip_number(k));
            let start = geo.strip_start(strip).unwrap();
            for m in 1..5 {
                let next = start + geo.unit_vector(dir) * (f64::from(m) * pad);
                let node = geo.nearest_node(next);
                assert_abs_diff_eq!((next - node).norm(), 0.0, epsilon = 1e-9);
            }
        }
    }
}

#[test]
fn test_midpoints_between_nodes_belong_to_the_strip() {
    let geo = geometry();
    let pad = geo.pad_pitch();
    for dir in Direction::ALL {
        let strip = StripId::new(dir, geo.strip_number(2));
        let start = geo.strip_start(strip).unwrap();
        let mid = start + geo.unit_vector(dir) * (2.5 * pad);
        assert_eq!(geo.strip_at(mid), Some(strip));
    }
}

#[test]
fn test_boundaries_are_ordered_along_the_strip() {
    let geo = RegularGeometry::new(
        RegularGeometryConfig::default()
            .with_radius(30.0)
            .with_section_split(Direction::W, 4.0),
    )
    .unwrap();
    for k in -5..=5 {
        let strip = StripId::new(Direction::W, geo.strip_number(k));
        let boundaries = geo.section_boundaries(strip);
        assert!(boundaries_are_contiguous(&boundaries));
        let along: Vec<f64> = boundaries
            .iter()
            .map(|b| geo.project_onto_strip_axis(b.position, Direction::W))
            .collect();
        assert!(along.windows(2).all(|pair| pair[0] < pair[1]));
    }
}

#[test]
fn test_strip_position_matches_pitch_axis() {
    let geo = geometry();
    let point = Vec2::new(0.3, 3.0 * geo.strip_pitch() + 0.1);
    let strip = geo.strip_at(point).unwrap();
    assert_eq!(strip.dir, Direction::U);
    assert_abs_diff_eq!(
        geo.strip_position(strip).unwrap(),
        3.0 * geo.strip_pitch(),
        epsilon = 1e-12
    );
}

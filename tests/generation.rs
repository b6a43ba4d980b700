use bevy::math::Vec2;
use planar_navigation::{NavMeshGenerator, NavMeshSettings, Polygon};

fn build_mesh(settings: NavMeshSettings, obstacles: &[Vec<Vec2>], padding: u16) -> Vec<Polygon> {
    let mut generator = NavMeshGenerator::new(settings).expect("settings should be valid");
    generator.build(obstacles.iter().map(|obstacle| obstacle.iter().copied()), padding)
}

fn rectangle(left: f32, top: f32, right: f32, bottom: f32) -> Vec<Vec2> {
    vec![
        Vec2::new(left, top),
        Vec2::new(right, top),
        Vec2::new(right, bottom),
        Vec2::new(left, bottom),
    ]
}

/// Twice the signed area; the generator's clockwise winding makes this
/// negative.
fn doubled_area(polygon: &[Vec2]) -> f32 {
    let mut area = 0.0;
    for i in 0..polygon.len() {
        let current = polygon[i];
        let next = polygon[(i + 1) % polygon.len()];
        area += current.x * next.y - next.x * current.y;
    }
    area
}

fn total_area(polygons: &[Polygon]) -> f32 {
    polygons.iter().map(|polygon| -doubled_area(polygon) / 2.0).sum()
}

fn contains_point(polygon: &[Vec2], point: Vec2) -> bool {
    polygon.iter().enumerate().all(|(i, &a)| {
        let b = polygon[(i + 1) % polygon.len()];
        let edge = b - a;
        let to_point = point - a;
        edge.x * to_point.y - to_point.x * edge.y <= 1e-3
    })
}

fn covered(polygons: &[Polygon], point: Vec2) -> bool {
    polygons.iter().any(|polygon| contains_point(polygon, point))
}

fn assert_mesh_invariants(polygons: &[Polygon], max_vertices: usize) {
    for polygon in polygons {
        assert!(
            polygon.len() >= 3 && polygon.len() <= max_vertices,
            "polygon has {} vertices",
            polygon.len()
        );
        assert!(doubled_area(polygon) < 0.0, "polygon must be clockwise");

        for i in 0..polygon.len() {
            let previous = polygon[(i + polygon.len() - 1) % polygon.len()];
            let next = polygon[(i + 1) % polygon.len()];
            let to_vertex = polygon[i] - previous;
            let onwards = next - polygon[i];
            assert!(
                to_vertex.x * onwards.y - onwards.x * to_vertex.y <= 1e-3,
                "polygon must be convex"
            );
        }
    }
}

#[test]
fn empty_area_is_one_rectangle() {
    let polygons = build_mesh(
        NavMeshSettings::from_area_bounds(0.0, 0.0, 100.0, 100.0, 10.0),
        &[],
        0,
    );

    assert_eq!(polygons.len(), 1);
    assert_mesh_invariants(&polygons, 16);

    let mut corners: Vec<(i32, i32)> = polygons[0]
        .iter()
        .map(|vertex| (vertex.x as i32, vertex.y as i32))
        .collect();
    corners.sort_unstable();
    assert_eq!(corners, vec![(0, 0), (0, 100), (100, 0), (100, 100)]);
}

#[test]
fn obstacle_outside_the_area_is_ignored() {
    let polygons = build_mesh(
        NavMeshSettings::from_area_bounds(0.0, 0.0, 100.0, 100.0, 10.0),
        &[rectangle(500.0, 500.0, 600.0, 600.0)],
        0,
    );

    assert_eq!(polygons.len(), 1);
    assert!((total_area(&polygons) - 10_000.0).abs() < 0.5);
}

#[test]
fn obstacle_covering_the_area_empties_the_mesh() {
    let polygons = build_mesh(
        NavMeshSettings::from_area_bounds(0.0, 0.0, 100.0, 100.0, 10.0),
        &[rectangle(-50.0, -50.0, 150.0, 150.0)],
        0,
    );

    assert!(polygons.is_empty());
}

#[test]
fn central_square_is_meshed_around() {
    let polygons = build_mesh(
        NavMeshSettings::from_area_bounds(0.0, 0.0, 800.0, 600.0, 10.0),
        &[rectangle(300.0, 200.0, 500.0, 400.0)],
        0,
    );

    assert!(polygons.len() >= 4);
    assert_mesh_invariants(&polygons, 16);

    // The union covers exactly the area minus the square.
    assert!((total_area(&polygons) - 440_000.0).abs() < 0.5);

    for walkable in [
        Vec2::new(150.0, 300.0),
        Vec2::new(650.0, 300.0),
        Vec2::new(400.0, 100.0),
        Vec2::new(400.0, 500.0),
        Vec2::new(5.0, 5.0),
        Vec2::new(795.0, 595.0),
    ] {
        assert!(covered(&polygons, walkable), "{walkable} should be covered");
    }

    for blocked in [Vec2::new(400.0, 300.0), Vec2::new(310.0, 210.0)] {
        assert!(!covered(&polygons, blocked), "{blocked} should be blocked");
    }
}

#[test]
fn enclosed_centre_square_is_cut_out() {
    // The walkable ring around the square is a single watershed region;
    // meshing it requires the region generator to split the ring.
    let polygons = build_mesh(
        NavMeshSettings::from_area_bounds(0.0, 0.0, 200.0, 200.0, 10.0),
        &[
            rectangle(50.0, 50.0, 150.0, 150.0),
            rectangle(90.0, 90.0, 110.0, 110.0),
        ],
        0,
    );

    assert_mesh_invariants(&polygons, 16);
    assert!((total_area(&polygons) - 30_000.0).abs() < 0.5);

    assert!(!covered(&polygons, Vec2::new(100.0, 100.0)));
    assert!(covered(&polygons, Vec2::new(25.0, 25.0)));
    assert!(covered(&polygons, Vec2::new(175.0, 175.0)));
}

#[test]
fn walled_pocket_cell_is_discarded() {
    // Four walls meeting the area borders enclose a single cell at the
    // centre. That cell becomes an island region and is dropped, while the
    // four rooms are meshed normally.
    let polygons = build_mesh(
        NavMeshSettings::from_area_bounds(0.0, 0.0, 70.0, 70.0, 10.0),
        &[
            rectangle(30.0, 0.0, 40.0, 30.0),
            rectangle(30.0, 40.0, 40.0, 70.0),
            rectangle(0.0, 30.0, 30.0, 40.0),
            rectangle(40.0, 30.0, 70.0, 40.0),
        ],
        0,
    );

    assert_mesh_invariants(&polygons, 16);
    assert!((total_area(&polygons) - 3_600.0).abs() < 0.5);

    assert!(!covered(&polygons, Vec2::new(35.0, 35.0)));
    for room in [
        Vec2::new(15.0, 15.0),
        Vec2::new(55.0, 15.0),
        Vec2::new(15.0, 55.0),
        Vec2::new(55.0, 55.0),
    ] {
        assert!(covered(&polygons, room), "room at {room} should be covered");
    }
}

#[test]
fn thin_wall_splits_the_area() {
    // Thinner than a cell, but the conservative fill still blocks the
    // column of cells it straddles.
    let polygons = build_mesh(
        NavMeshSettings::from_area_bounds(0.0, 0.0, 100.0, 100.0, 10.0),
        &[vec![
            Vec2::new(50.0, 20.0),
            Vec2::new(50.2, 20.0),
            Vec2::new(50.2, 80.0),
            Vec2::new(50.0, 80.0),
        ]],
        0,
    );

    assert_mesh_invariants(&polygons, 16);

    assert!(!covered(&polygons, Vec2::new(55.0, 45.0)));
    assert!(covered(&polygons, Vec2::new(45.0, 45.0)));
    assert!(covered(&polygons, Vec2::new(65.0, 45.0)));

    // Exactly one column of six cells is blocked.
    assert!((total_area(&polygons) - 9_400.0).abs() < 0.5);
}

#[test]
fn four_pillars_mesh_is_exact() {
    let polygons = build_mesh(
        NavMeshSettings::from_area_bounds(0.0, 0.0, 110.0, 110.0, 10.0),
        &[
            rectangle(10.0, 20.0, 40.0, 50.0),
            rectangle(70.0, 20.0, 100.0, 50.0),
            rectangle(10.0, 70.0, 40.0, 100.0),
            rectangle(70.0, 70.0, 100.0, 100.0),
        ],
        0,
    );

    assert_mesh_invariants(&polygons, 16);
    assert!((total_area(&polygons) - 8_500.0).abs() < 0.5);

    assert!(covered(&polygons, Vec2::new(55.0, 55.0)));
    assert!(covered(&polygons, Vec2::new(5.0, 5.0)));
    assert!(covered(&polygons, Vec2::new(105.0, 105.0)));
    for pillar in [
        Vec2::new(25.0, 35.0),
        Vec2::new(85.0, 35.0),
        Vec2::new(25.0, 85.0),
        Vec2::new(85.0, 85.0),
    ] {
        assert!(!covered(&polygons, pillar), "pillar at {pillar} should be blocked");
    }
}

#[test]
fn isometric_ratio_stretches_the_output() {
    let polygons = build_mesh(
        NavMeshSettings::from_area_bounds(0.0, 0.0, 800.0, 600.0, 10.0).with_isometric_ratio(2.0),
        &[rectangle(300.0, 200.0, 500.0, 400.0)],
        0,
    );

    assert_mesh_invariants(&polygons, 16);

    // The grid squashes cells vertically and the output is stretched back:
    // in output space the area spans (0, 0) to (800, 1200).
    for polygon in &polygons {
        for vertex in polygon {
            assert!((0.0..=800.0).contains(&vertex.x));
            assert!((0.0..=1200.0).contains(&vertex.y));
        }
    }

    assert!((total_area(&polygons) - 880_000.0).abs() < 0.5);

    // The obstacle occupies (300, 400) to (500, 800) in output space.
    assert!(!covered(&polygons, Vec2::new(400.0, 600.0)));
    assert!(covered(&polygons, Vec2::new(150.0, 600.0)));
    assert!(covered(&polygons, Vec2::new(400.0, 200.0)));
}

#[test]
fn padding_pulls_the_mesh_away_from_obstacles() {
    let polygons = build_mesh(
        NavMeshSettings::from_area_bounds(0.0, 0.0, 800.0, 600.0, 10.0),
        &[rectangle(300.0, 200.0, 500.0, 400.0)],
        2,
    );

    assert_mesh_invariants(&polygons, 16);

    // Two cells of clearance around the square and the outer border.
    assert!(covered(&polygons, Vec2::new(275.0, 300.0)));
    assert!(!covered(&polygons, Vec2::new(285.0, 300.0)));
    assert!(!covered(&polygons, Vec2::new(400.0, 185.0)));
    assert!(covered(&polygons, Vec2::new(400.0, 165.0)));

    assert!(!covered(&polygons, Vec2::new(5.0, 300.0)));
    assert!(covered(&polygons, Vec2::new(25.0, 300.0)));
}

#[test]
fn identical_input_gives_identical_output() {
    let obstacles = vec![
        rectangle(300.0, 200.0, 500.0, 400.0),
        rectangle(100.0, 450.0, 200.0, 550.0),
    ];
    let settings = NavMeshSettings::from_area_bounds(0.0, 0.0, 800.0, 600.0, 10.0);

    let first = build_mesh(settings.clone(), &obstacles, 1);
    let second = build_mesh(settings, &obstacles, 1);

    assert_eq!(first, second);
}

#[test]
fn generator_reuse_matches_a_fresh_generator() {
    let obstacles = vec![rectangle(300.0, 200.0, 500.0, 400.0)];
    let other_obstacles = vec![rectangle(100.0, 100.0, 700.0, 500.0)];
    let settings = NavMeshSettings::from_area_bounds(0.0, 0.0, 800.0, 600.0, 10.0);

    let mut generator = NavMeshGenerator::new(settings.clone()).expect("settings should be valid");
    let first = generator.build(obstacles.iter().map(|obstacle| obstacle.iter().copied()), 0);

    // Building something else in between must not leak into the rebuild.
    generator.build(
        other_obstacles.iter().map(|obstacle| obstacle.iter().copied()),
        3,
    );
    let rebuilt = generator.build(obstacles.iter().map(|obstacle| obstacle.iter().copied()), 0);

    assert_eq!(first, rebuilt);
    assert_eq!(first, build_mesh(settings, &obstacles, 0));
}

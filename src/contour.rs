use bevy::log::{debug, warn};
use bevy::math::IVec2;
use smallvec::SmallVec;

use crate::grid::{get_neighbour_index, NavGrid, NULL_REGION};
use crate::math::point_distance_from_segment;

/// Maximum deviation (in cells) a raw border vertex may have from the
/// simplified contour before it is reinserted. Kept just under one cell:
/// sub-cell aliasing along diagonal borders is smoothed away, while the far
/// wall of a single-cell obstacle (deviation exactly one cell) is always
/// kept.
const MAX_SIMPLIFICATION_ERROR: f32 = 0.9;

/// Step cap for a single border walk, guards against pathological input.
const MAX_WALK_STEPS: usize = 65_535;

/// Total cap on collapsed shared vertices. The filter normally stops at a
/// fixed point well before this.
const MAX_FILTER_STEPS: u32 = 65_535;

/// Safety bound on the contour cycle around one vertex; only four cells meet
/// at a corner so anything past this is corrupt.
const MAX_VERTEX_CYCLE: usize = 8;

/// Vertex of a region border at cell-corner granularity.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ContourPoint {
    pub x: i32,
    pub y: i32,
    /// Region on the outward side of the border edge leaving this vertex,
    /// [NULL_REGION] when that edge borders obstacle.
    pub region: u16,
}

#[derive(Default, Clone, Debug)]
pub struct Contour {
    pub vertices: Vec<ContourPoint>,
    pub region: u16,
}

#[derive(Default)]
pub struct ContourSet {
    pub contours: Vec<Contour>,
    pub discarded_contours: usize,
}

/// Working vertex during simplification; carries the index of the raw
/// vertex it came from so refinement can walk the raw border between two
/// simplified neighbours.
#[derive(Clone, Copy)]
struct SimplifiedVertex {
    x: i32,
    y: i32,
    raw_index: usize,
}

/// Extracts one simplified, clockwise contour per region.
pub(crate) fn build_contours(grid: &mut NavGrid) -> ContourSet {
    let dim_x = grid.dim_x;

    // Mark borders: one bit per direction with a differing region.
    for y in 1..grid.dim_y - 1 {
        for x in 1..dim_x - 1 {
            let index = x + y * dim_x;
            let region = grid.regions[index];
            if region == NULL_REGION {
                continue;
            }

            let mut flags = 0u8;
            for dir in 0..4 {
                if grid.regions[get_neighbour_index(dim_x, index, dir)] != region {
                    flags |= 1 << dir;
                }
            }
            grid.contour_flags[index] = flags;
        }
    }

    let mut contour_set = ContourSet {
        contours: Vec::with_capacity(grid.region_count as usize),
        discarded_contours: 0,
    };
    let mut contour_by_region: Vec<Option<usize>> = vec![None; grid.region_count as usize + 1];

    let mut raw_vertices: Vec<ContourPoint> = Vec::with_capacity(256);
    let mut simplified_vertices: Vec<SimplifiedVertex> = Vec::with_capacity(64);

    for y in 1..grid.dim_y - 1 {
        for x in 1..dim_x - 1 {
            let index = x + y * dim_x;
            let flags = grid.contour_flags[index];
            if flags == 0 {
                continue;
            }
            if flags == 0b1111 {
                // A different region on every side: single-cell island.
                grid.contour_flags[index] = 0;
                contour_set.discarded_contours += 1;
                debug!("Discarding island cell at ({}, {}).", x, y);
                continue;
            }

            let region = grid.regions[index];
            let start_dir = flags.trailing_zeros() as u8;

            raw_vertices.clear();
            if !walk_contour(grid, index, start_dir, &mut raw_vertices) {
                warn!(
                    "Border walk of region {} did not close within {} steps, dropping the contour.",
                    region, MAX_WALK_STEPS
                );
                continue;
            }

            if contour_by_region[region as usize].is_some() {
                warn!(
                    "Region {} has more than one contour, it wraps around another region. Dropping the extra contour.",
                    region
                );
                continue;
            }

            simplify_contour(&raw_vertices, &mut simplified_vertices);

            // The border region of the edge leaving a vertex is the one
            // recorded on the next raw vertex.
            let vertices = simplified_vertices
                .iter()
                .map(|vertex| {
                    let next_raw = (vertex.raw_index + 1) % raw_vertices.len();
                    ContourPoint {
                        x: vertex.x,
                        y: vertex.y,
                        region: raw_vertices[next_raw].region,
                    }
                })
                .collect();

            contour_by_region[region as usize] = Some(contour_set.contours.len());
            contour_set.contours.push(Contour { vertices, region });
        }
    }

    filter_shared_vertices(&mut contour_set.contours, &contour_by_region);

    for contour in contour_set.contours.iter_mut() {
        remove_duplicate_points(&mut contour.vertices);
    }

    let expected = grid.region_count as usize;
    let built = contour_set.contours.len() + contour_set.discarded_contours;
    if built != expected {
        warn!(
            "Built {} contours for {} regions, the mesh may have gaps.",
            built, expected
        );
    }

    contour_set
}

/// Walks the border of a region, clearing border bits as they are consumed.
///
/// Emits the corner vertex on the left of the faced border together with the
/// region on the other side, rotates clockwise on borders and steps forward
/// otherwise. Ends back at the starting cell & direction.
fn walk_contour(
    grid: &mut NavGrid,
    start_cell: usize,
    start_dir: u8,
    contour: &mut Vec<ContourPoint>,
) -> bool {
    let dim_x = grid.dim_x;
    let mut cell = start_cell;
    let mut dir = start_dir;

    for _ in 0..MAX_WALK_STEPS {
        if grid.contour_flags[cell] & (1 << dir) != 0 {
            let column = (cell % dim_x) as i32;
            let row = (cell / dim_x) as i32;

            let x = match dir {
                1 | 2 => column + 1,
                _ => column,
            };
            let y = match dir {
                0 | 1 => row + 1,
                _ => row,
            };
            let neighbour = get_neighbour_index(dim_x, cell, dir as usize);
            contour.push(ContourPoint {
                x,
                y,
                region: grid.regions[neighbour],
            });

            grid.contour_flags[cell] &= !(1 << dir);
            dir = (dir + 1) & 0x3; // Rotate clock-wise.
        } else {
            cell = get_neighbour_index(dim_x, cell, dir as usize);
            dir = (dir + 3) & 0x3; // Rotate COUNTER clock-wise.
        }

        if cell == start_cell && dir == start_dir {
            return true;
        }
    }

    false
}

/// Seeds the simplified contour with its portal vertices, or with the
/// lexicographic extremes when the region is entirely surrounded by
/// obstacle, then reinserts raw vertices on obstacle edges that deviate more
/// than [MAX_SIMPLIFICATION_ERROR] from the simplification.
fn simplify_contour(raw: &[ContourPoint], simplified: &mut Vec<SimplifiedVertex>) {
    simplified.clear();

    let point_count = raw.len();
    let has_portals = raw.iter().any(|point| point.region != NULL_REGION);

    if has_portals {
        for i in 0..point_count {
            let next = (i + 1) % point_count;
            if raw[i].region != raw[next].region {
                simplified.push(SimplifiedVertex {
                    x: raw[i].x,
                    y: raw[i].y,
                    raw_index: i,
                });
            }
        }
    } else {
        let mut lower_left = 0;
        let mut upper_right = 0;
        for (i, point) in raw.iter().enumerate() {
            let lowest = &raw[lower_left];
            if point.x < lowest.x || (point.x == lowest.x && point.y < lowest.y) {
                lower_left = i;
            }
            let highest = &raw[upper_right];
            if point.x > highest.x || (point.x == highest.x && point.y > highest.y) {
                upper_right = i;
            }
        }

        simplified.push(SimplifiedVertex {
            x: raw[lower_left].x,
            y: raw[lower_left].y,
            raw_index: lower_left,
        });
        simplified.push(SimplifiedVertex {
            x: raw[upper_right].x,
            y: raw[upper_right].y,
            raw_index: upper_right,
        });
    }

    let mut i = 0;
    while i < simplified.len() {
        let next = (i + 1) % simplified.len();

        let mut a = simplified[i];
        let mut b = simplified[next];

        // Walk the raw border between the pair in a fixed lexicographic
        // direction so the reinserted vertex does not depend on edge
        // orientation.
        let (mut c_index, c_increment, end_index) = if b.x > a.x || (b.x == a.x && b.y > a.y) {
            ((a.raw_index + 1) % point_count, 1, b.raw_index)
        } else {
            std::mem::swap(&mut a.x, &mut b.x);
            std::mem::swap(&mut a.y, &mut b.y);
            (
                (b.raw_index + point_count - 1) % point_count,
                point_count - 1,
                a.raw_index,
            )
        };

        let mut max_deviation = 0.0f32;
        let mut max_index = None;

        // Only tessellate edges bordering the obstacle region, portal edges
        // must stay in sync with the neighbouring contour.
        if raw[c_index].region == NULL_REGION {
            while c_index != end_index {
                let deviation = point_distance_from_segment(
                    IVec2::new(raw[c_index].x, raw[c_index].y),
                    IVec2::new(a.x, a.y),
                    IVec2::new(b.x, b.y),
                );
                if deviation > max_deviation {
                    max_deviation = deviation;
                    max_index = Some(c_index);
                }
                c_index = (c_index + c_increment) % point_count;
            }
        }

        match (
            max_index,
            max_deviation > MAX_SIMPLIFICATION_ERROR * MAX_SIMPLIFICATION_ERROR,
        ) {
            (Some(max_index), true) => {
                simplified.insert(
                    i + 1,
                    SimplifiedVertex {
                        x: raw[max_index].x,
                        y: raw[max_index].y,
                        raw_index: max_index,
                    },
                );
            }
            _ => {
                i += 1;
            }
        }
    }
}

/// Collapses vertices shared by three or more contours onto the nearest
/// obstacle-adjacent neighbour vertex.
///
/// A vertex whose both incident edges border walkable regions sits at a
/// junction of at least three regions. Each collapse snaps every contour
/// meeting there onto the far end of the shortest obstacle-adjacent edge and
/// removes the vertex from the two contours that shared that edge. Sweeps
/// repeat until nothing changes.
fn filter_shared_vertices(contours: &mut [Contour], contour_by_region: &[Option<usize>]) {
    let mut total_fixes = 0u32;

    'sweep: loop {
        for contour_index in 0..contours.len() {
            for vertex_index in 0..contours[contour_index].vertices.len() {
                let vertices = &contours[contour_index].vertices;
                let vertex = vertices[vertex_index];
                let previous = vertices[(vertex_index + vertices.len() - 1) % vertices.len()];

                if vertex.region == NULL_REGION || previous.region == NULL_REGION {
                    continue;
                }

                if collapse_shared_vertex(contours, contour_by_region, contour_index, vertex_index)
                {
                    total_fixes += 1;
                    if total_fixes >= MAX_FILTER_STEPS {
                        warn!(
                            "Shared vertex filter did not reach a fixed point after {} collapses, keeping the rest.",
                            MAX_FILTER_STEPS
                        );
                        return;
                    }
                    continue 'sweep;
                }
            }
        }

        break;
    }
}

/// Tries to collapse one shared vertex, returns whether the contours were
/// modified.
fn collapse_shared_vertex(
    contours: &mut [Contour],
    contour_by_region: &[Option<usize>],
    contour_index: usize,
    vertex_index: usize,
) -> bool {
    let vertex = contours[contour_index].vertices[vertex_index];

    // Walk the cycle of contours around the vertex: the region leaving the
    // vertex names the next contour, which holds the same point.
    let mut cycle: SmallVec<[(usize, usize); MAX_VERTEX_CYCLE]> = SmallVec::new();
    cycle.push((contour_index, vertex_index));

    let mut current = (contour_index, vertex_index);
    loop {
        let point = contours[current.0].vertices[current.1];
        let Some(next_contour) = contour_by_region
            .get(point.region as usize)
            .copied()
            .flatten()
        else {
            warn!(
                "No contour for region {} around the shared vertex at ({}, {}), skipping it.",
                point.region, vertex.x, vertex.y
            );
            return false;
        };

        if next_contour == contour_index {
            break;
        }

        let Some(next_vertex) = contours[next_contour]
            .vertices
            .iter()
            .position(|point| point.x == vertex.x && point.y == vertex.y)
        else {
            warn!(
                "Contour of region {} does not pass through the shared vertex at ({}, {}), skipping it.",
                contours[next_contour].region, vertex.x, vertex.y
            );
            return false;
        };

        if cycle.len() >= MAX_VERTEX_CYCLE
            || cycle.iter().any(|&(contour, _)| contour == next_contour)
        {
            warn!(
                "Contour cycle around ({}, {}) does not close, skipping the vertex.",
                vertex.x, vertex.y
            );
            return false;
        }

        cycle.push((next_contour, next_vertex));
        current = (next_contour, next_vertex);
    }

    if cycle.len() < 3 {
        return false;
    }

    // The collapse target is the nearest previous vertex that lies on the
    // obstacle border, so the junction is pulled out of the open interior.
    let mut best: Option<(usize, i64)> = None;
    for (cycle_position, &(contour, cycle_vertex)) in cycle.iter().enumerate() {
        let vertices = &contours[contour].vertices;
        if vertices.len() < 2 {
            continue;
        }
        let previous = vertices[(cycle_vertex + vertices.len() - 1) % vertices.len()];
        let pre_previous = vertices[(cycle_vertex + vertices.len() - 2) % vertices.len()];
        if previous.region != NULL_REGION && pre_previous.region != NULL_REGION {
            continue;
        }

        let delta_x = (previous.x - vertex.x) as i64;
        let delta_y = (previous.y - vertex.y) as i64;
        let length = delta_x * delta_x + delta_y * delta_y;
        if best.is_none_or(|(_, best_length)| length < best_length) {
            best = Some((cycle_position, length));
        }
    }

    // Nothing obstacle-adjacent this pass: collapses elsewhere will
    // eventually provide one, leave the vertex for a later sweep.
    let Some((best_position, _)) = best else {
        return false;
    };

    let (absorbing_contour, absorbing_vertex) = cycle[best_position];
    let absorbing_len = contours[absorbing_contour].vertices.len();
    let endpoint =
        contours[absorbing_contour].vertices[(absorbing_vertex + absorbing_len - 1) % absorbing_len];

    // The twin contour carries the collapsed edge in the opposite direction.
    let twin = cycle.iter().copied().find(|&(contour, cycle_vertex)| {
        if contour == absorbing_contour {
            return false;
        }
        let vertices = &contours[contour].vertices;
        let next = vertices[(cycle_vertex + 1) % vertices.len()];
        next.x == endpoint.x && next.y == endpoint.y
    });
    if twin.is_none() {
        warn!(
            "No opposing contour for the edge collapsed at ({}, {}).",
            vertex.x, vertex.y
        );
    }

    for &(contour, cycle_vertex) in cycle.iter() {
        if contour == absorbing_contour || Some((contour, cycle_vertex)) == twin {
            contours[contour].vertices.remove(cycle_vertex);
        } else {
            let point = &mut contours[contour].vertices[cycle_vertex];
            point.x = endpoint.x;
            point.y = endpoint.y;
            point.region = NULL_REGION;
        }
    }

    true
}

/// Removes consecutive duplicate points, including across the wrap-around.
/// Collapsed two-vertex contours leave them behind.
fn remove_duplicate_points(vertices: &mut Vec<ContourPoint>) {
    let mut i = 0;
    while vertices.len() > 1 && i < vertices.len() {
        let next = (i + 1) % vertices.len();
        if vertices[i].x == vertices[next].x && vertices[i].y == vertices[next].y {
            vertices.remove(next);
        } else {
            i += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regions::{build_regions, calculate_distance_field};
    use crate::NavMeshSettings;

    #[test]
    fn open_area_gives_one_rectangular_contour() {
        let mut grid = NavGrid::new(&NavMeshSettings::from_area_bounds(
            0.0, 0.0, 100.0, 100.0, 10.0,
        ));
        let max_distance = calculate_distance_field(&mut grid);
        build_regions(&mut grid, max_distance, 0);

        let contour_set = build_contours(&mut grid);

        assert_eq!(contour_set.contours.len(), 1);
        assert_eq!(contour_set.discarded_contours, 0);

        let contour = &contour_set.contours[0];
        let mut corners: Vec<(i32, i32)> = contour
            .vertices
            .iter()
            .map(|point| (point.x, point.y))
            .collect();
        corners.sort_unstable();
        assert_eq!(corners, vec![(1, 1), (1, 11), (11, 1), (11, 11)]);
    }

    #[test]
    fn shared_junction_vertex_is_collapsed_onto_the_border() {
        // Three regions split a 10x10 square: the left half, the top-right
        // and the bottom-right quarter. They meet at (5, 5), away from any
        // obstacle.
        let point = |x: i32, y: i32, region: u16| ContourPoint { x, y, region };

        let mut contours = vec![
            Contour {
                vertices: vec![
                    point(0, 0, 0),
                    point(0, 10, 0),
                    point(5, 10, 3),
                    point(5, 5, 2),
                    point(5, 0, 0),
                ],
                region: 1,
            },
            Contour {
                vertices: vec![
                    point(5, 0, 1),
                    point(5, 5, 3),
                    point(10, 5, 0),
                    point(10, 0, 0),
                ],
                region: 2,
            },
            Contour {
                vertices: vec![
                    point(10, 5, 2),
                    point(5, 5, 1),
                    point(5, 10, 0),
                    point(10, 10, 0),
                ],
                region: 3,
            },
        ];
        let contour_by_region = vec![None, Some(0), Some(1), Some(2)];

        filter_shared_vertices(&mut contours, &contour_by_region);

        // The junction snapped to (5, 10): removed from the two contours
        // that shared the collapsed edge, moved in the third.
        for contour in &contours {
            assert!(
                !contour
                    .vertices
                    .iter()
                    .any(|vertex| vertex.x == 5 && vertex.y == 5),
                "the junction vertex must be gone from region {}",
                contour.region
            );
        }
        assert_eq!(contours[0].vertices.len(), 4);
        assert!(contours[1]
            .vertices
            .iter()
            .any(|vertex| vertex.x == 5 && vertex.y == 10));
    }

    #[test]
    fn single_cell_pocket_is_discarded_as_island() {
        let mut grid = NavGrid::new(&NavMeshSettings::from_area_bounds(
            0.0, 0.0, 70.0, 70.0, 10.0,
        ));

        // Wall off everything except the centre cell (4, 4).
        for y in 1..grid.dim_y - 1 {
            for x in 1..grid.dim_x - 1 {
                if (x, y) != (4, 4) {
                    grid.mark_obstacle(grid.cell_index(x, y));
                }
            }
        }

        let max_distance = calculate_distance_field(&mut grid);
        build_regions(&mut grid, max_distance, 0);
        assert_eq!(grid.region_count, 1);

        let contour_set = build_contours(&mut grid);

        assert!(contour_set.contours.is_empty());
        assert_eq!(contour_set.discarded_contours, 1);
    }
}

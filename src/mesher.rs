use bevy::log::{debug, warn};
use bevy::math::IVec2;

use crate::contour::ContourSet;
use crate::math::{intersect, left, left_on};

const FLAG_EAR: u32 = 0x8000_0000;
const MASK_INDEX: u32 = 0x0fff_ffff;

/// Decomposes every contour into convex polygons with at most
/// ``max_vertices_per_polygon`` vertices, still in grid space.
///
/// Each contour is ear-clipped into triangles which are then greedily merged
/// along their longest shared edges while the result stays convex. Contours
/// that collapsed below three vertices are dropped; a contour that fails to
/// triangulate is logged and skipped.
pub(crate) fn build_poly_mesh(
    contour_set: &ContourSet,
    max_vertices_per_polygon: usize,
) -> Vec<Vec<IVec2>> {
    let mut max_vertices_per_contour = 0;
    for contour in &contour_set.contours {
        max_vertices_per_contour = max_vertices_per_contour.max(contour.vertices.len());
    }

    let mut mesh_polygons: Vec<Vec<IVec2>> = Vec::with_capacity(contour_set.contours.len() * 2);

    let mut vertices: Vec<IVec2> = Vec::with_capacity(max_vertices_per_contour);
    let mut indices: Vec<u32> = Vec::with_capacity(max_vertices_per_contour);
    let mut triangles: Vec<u32> = Vec::with_capacity(max_vertices_per_contour * 3);
    let mut polygons: Vec<Vec<u32>> = Vec::new();

    for contour in &contour_set.contours {
        if contour.vertices.len() < 3 {
            debug!(
                "Skipping contour of region {} with only {} vertices.",
                contour.region,
                contour.vertices.len()
            );
            continue;
        }

        vertices.clear();
        vertices.extend(
            contour
                .vertices
                .iter()
                .map(|point| IVec2::new(point.x, point.y)),
        );

        indices.clear();
        indices.extend(0..vertices.len() as u32);
        triangles.clear();

        if !triangulate(&vertices, &mut indices, &mut triangles) {
            warn!(
                "Triangulation failed for the contour of region {}, skipping it.",
                contour.region
            );
            continue;
        }

        polygons.clear();
        for triangle in triangles.chunks_exact(3) {
            if triangle[0] != triangle[1] && triangle[0] != triangle[2] && triangle[1] != triangle[2]
            {
                polygons.push(vec![triangle[0], triangle[1], triangle[2]]);
            }
        }

        merge_polygons(&mut polygons, &vertices, max_vertices_per_polygon);

        mesh_polygons.extend(polygons.drain(..).map(|polygon| {
            polygon
                .into_iter()
                .map(|index| vertices[index as usize])
                .collect()
        }));
    }

    mesh_polygons
}

/// Ear-clipping triangulation of a clockwise polygon.
///
/// Ear candidates are flagged on the index buffer's high bit; the flagged
/// ear with the shortest diagonal is clipped first. Returns false when no
/// ear is left on a polygon bigger than a triangle.
fn triangulate(vertices: &[IVec2], indices: &mut Vec<u32>, triangles: &mut Vec<u32>) -> bool {
    for i in 0..vertices.len() {
        let next = (i + 1) % vertices.len();
        let next_next = (next + 1) % vertices.len();

        if diagonal(i, next_next, vertices, indices) {
            indices[next] |= FLAG_EAR;
        }
    }

    while indices.len() > 3 {
        let mut min_length = i64::MAX;
        let mut min_index = None;

        for i in 0..indices.len() {
            let next = (i + 1) % indices.len();
            if indices[next] & FLAG_EAR != 0 {
                let point = vertices[(indices[i] & MASK_INDEX) as usize];
                let point_next_next =
                    vertices[(indices[(next + 1) % indices.len()] & MASK_INDEX) as usize];

                let delta = (point_next_next - point).as_i64vec2();
                let square_length = delta.x * delta.x + delta.y * delta.y;

                if square_length < min_length {
                    min_length = square_length;
                    min_index = Some(i);
                }
            }
        }

        let Some(min_index) = min_index else {
            return false;
        };

        let next = {
            let i = min_index;
            let next = (i + 1) % indices.len();
            let next_next = (next + 1) % indices.len();

            triangles.push(indices[i] & MASK_INDEX);
            triangles.push(indices[next] & MASK_INDEX);
            triangles.push(indices[next_next] & MASK_INDEX);

            indices.remove(next);

            if next >= indices.len() {
                0
            } else {
                next
            }
        };

        // Re-evaluate the ear flags around the removed vertex.
        let i = (indices.len() + next - 1) % indices.len();
        let previous = (indices.len() + i - 1) % indices.len();
        let next_next = (next + 1) % indices.len();

        if diagonal(previous, next, vertices, indices) {
            indices[i] |= FLAG_EAR;
        } else {
            indices[i] &= MASK_INDEX;
        }

        if diagonal(i, next_next, vertices, indices) {
            indices[next] |= FLAG_EAR;
        } else {
            indices[next] &= MASK_INDEX;
        }
    }

    triangles.push(indices[0] & MASK_INDEX);
    triangles.push(indices[1] & MASK_INDEX);
    triangles.push(indices[2] & MASK_INDEX);
    indices.clear();

    true
}

/// Whether the diagonal from ``i`` to ``j`` stays inside the polygon's
/// internal angle at ``i``.
fn in_cone(i: usize, j: usize, vertices: &[IVec2], indices: &[u32]) -> bool {
    let point_i = vertices[(indices[i] & MASK_INDEX) as usize];
    let point_j = vertices[(indices[j] & MASK_INDEX) as usize];
    let point_i_next = vertices[(indices[(i + 1) % indices.len()] & MASK_INDEX) as usize];
    let point_i_previous =
        vertices[(indices[(indices.len() + i - 1) % indices.len()] & MASK_INDEX) as usize];

    if left_on(point_i_previous, point_i, point_i_next) {
        return left(point_i, point_j, point_i_previous)
            && left(point_j, point_i, point_i_next);
    }

    // Reflex angle at i: the cone is everything but the inverse wedge.
    !(left_on(point_i, point_j, point_i_next) && left_on(point_j, point_i, point_i_previous))
}

/// Whether the diagonal from ``i`` to ``j`` crosses no polygon edge.
fn diagonalie(i: usize, j: usize, vertices: &[IVec2], indices: &[u32]) -> bool {
    let diagonal_start = vertices[(indices[i] & MASK_INDEX) as usize];
    let diagonal_end = vertices[(indices[j] & MASK_INDEX) as usize];

    for edge in 0..indices.len() {
        let next_edge = (edge + 1) % indices.len();

        if !(edge == i || next_edge == i || edge == j || next_edge == j) {
            let point_one = vertices[(indices[edge] & MASK_INDEX) as usize];
            let point_two = vertices[(indices[next_edge] & MASK_INDEX) as usize];

            if diagonal_start == point_one
                || diagonal_end == point_one
                || diagonal_start == point_two
                || diagonal_end == point_two
            {
                continue;
            }

            if intersect(diagonal_start, diagonal_end, point_one, point_two) {
                return false;
            }
        }
    }

    true
}

fn diagonal(i: usize, j: usize, vertices: &[IVec2], indices: &[u32]) -> bool {
    in_cone(i, j, vertices, indices) && diagonalie(i, j, vertices, indices)
}

/// Greedily merges polygon pairs along their longest shared edge while the
/// merge stays convex and under the vertex cap.
fn merge_polygons(
    polygons: &mut Vec<Vec<u32>>,
    vertices: &[IVec2],
    max_vertices_per_polygon: usize,
) {
    loop {
        let mut best: Option<(usize, usize, usize, usize, i64)> = None;

        for a in 0..polygons.len() {
            for b in (a + 1)..polygons.len() {
                if polygons[a].len() + polygons[b].len() - 2 > max_vertices_per_polygon {
                    continue;
                }

                if let Some((edge_a, edge_b, length)) =
                    get_merge_value(&polygons[a], &polygons[b], vertices)
                {
                    if best.is_none_or(|(.., best_length)| length > best_length) {
                        best = Some((a, b, edge_a, edge_b, length));
                    }
                }
            }
        }

        let Some((a, b, edge_a, edge_b, _)) = best else {
            break;
        };

        let merged = merge_pair(&polygons[a], &polygons[b], edge_a, edge_b);
        polygons[a] = merged;
        polygons.remove(b);
    }
}

/// Finds the shared edge of two polygons and scores the merge, or None when
/// they do not share exactly one edge or the merge would not be convex.
fn get_merge_value(
    polygon_a: &[u32],
    polygon_b: &[u32],
    vertices: &[IVec2],
) -> Option<(usize, usize, i64)> {
    let len_a = polygon_a.len();
    let len_b = polygon_b.len();

    let mut shared = None;
    for edge_a in 0..len_a {
        let a_start = polygon_a[edge_a];
        let a_end = polygon_a[(edge_a + 1) % len_a];

        for edge_b in 0..len_b {
            let b_start = polygon_b[edge_b];
            let b_end = polygon_b[(edge_b + 1) % len_b];

            // Shared edges run in opposite directions.
            if a_start == b_end && a_end == b_start {
                shared = Some((edge_a, edge_b));
            }
        }
    }
    let (edge_a, edge_b) = shared?;

    // Sharing more than the edge's two vertices would pinch the merge.
    let shared_vertices = polygon_a
        .iter()
        .filter(|index| polygon_b.contains(index))
        .count();
    if shared_vertices != 2 {
        return None;
    }

    let start = vertices[polygon_a[edge_a] as usize];
    let end = vertices[polygon_a[(edge_a + 1) % len_a] as usize];

    // The vertices flanking both shared endpoints must stay left turns.
    let before_start = vertices[polygon_a[(edge_a + len_a - 1) % len_a] as usize];
    let after_start = vertices[polygon_b[(edge_b + 2) % len_b] as usize];
    if !left(before_start, start, after_start) {
        return None;
    }

    let before_end = vertices[polygon_b[(edge_b + len_b - 1) % len_b] as usize];
    let after_end = vertices[polygon_a[(edge_a + 2) % len_a] as usize];
    if !left(before_end, end, after_end) {
        return None;
    }

    let delta = (end - start).as_i64vec2();
    Some((edge_a, edge_b, delta.x * delta.x + delta.y * delta.y))
}

/// Walks polygon A from the vertex after the shared edge, then polygon B
/// likewise, leaving each shared vertex in exactly once.
fn merge_pair(polygon_a: &[u32], polygon_b: &[u32], edge_a: usize, edge_b: usize) -> Vec<u32> {
    let len_a = polygon_a.len();
    let len_b = polygon_b.len();

    let mut merged = Vec::with_capacity(len_a + len_b - 2);
    for offset in 0..len_a - 1 {
        merged.push(polygon_a[(edge_a + 1 + offset) % len_a]);
    }
    for offset in 0..len_b - 1 {
        merged.push(polygon_b[(edge_b + 1 + offset) % len_b]);
    }

    merged
}

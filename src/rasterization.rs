use bevy::math::Vec2;
use smallvec::SmallVec;

use crate::grid::NavGrid;

/// Crossing points of one scan line with the obstacle outline.
type CrossingNodes = SmallVec<[i32; 16]>;

/// Marks every cell covered by an obstacle as obstacle.
///
/// Obstacles are consumed lazily: each one is transformed into grid basis
/// through ``vertex_scratch`` which is reused between obstacles. Winding does
/// not matter, the fill is even-odd.
pub(crate) fn rasterize_obstacles<ObstacleIter, PointIter>(
    grid: &mut NavGrid,
    obstacles: ObstacleIter,
    vertex_scratch: &mut Vec<Vec2>,
) where
    ObstacleIter: IntoIterator<Item = PointIter>,
    PointIter: IntoIterator<Item = Vec2>,
{
    let mut nodes = CrossingNodes::new();

    for obstacle in obstacles {
        vertex_scratch.clear();
        vertex_scratch.extend(
            obstacle
                .into_iter()
                .map(|point| grid.convert_to_grid_basis(point)),
        );

        rasterize_polygon(grid, vertex_scratch, &mut nodes);
    }
}

/// Fills one polygon, conservatively.
///
/// The horizontal scan-line pass catches any polygon covering at least one
/// cell center. When it writes nothing the polygon is thinner than a cell:
/// it is re-run filling degenerate spans, followed by the vertical
/// transpose, so a thin polygon whose span straddles a cell center in either
/// axis still marks a cell.
fn rasterize_polygon(grid: &mut NavGrid, vertices: &[Vec2], nodes: &mut CrossingNodes) {
    if vertices.len() < 3 {
        return;
    }

    let mut min = vertices[0];
    let mut max = vertices[0];
    for vertex in &vertices[1..] {
        min = min.min(*vertex);
        max = max.max(*vertex);
    }

    if max.x < 0.0 || max.y < 0.0 || min.x >= grid.dim_x as f32 || min.y >= grid.dim_y as f32 {
        return;
    }

    let min_x = (min.x.floor() as i32).max(0);
    let max_x = (max.x.floor() as i32).min(grid.dim_x as i32 - 1);
    let min_y = (min.y.floor() as i32).max(0);
    let max_y = (max.y.floor() as i32).min(grid.dim_y as i32 - 1);

    if min_x > max_x || min_y > max_y {
        return;
    }

    let filled_any = fill_rows(grid, vertices, min_x, max_x, min_y, max_y, false, nodes);
    if !filled_any {
        fill_rows(grid, vertices, min_x, max_x, min_y, max_y, true, nodes);
        fill_columns(grid, vertices, min_x, max_x, min_y, max_y, nodes);
    }
}

/// Horizontal scan-line pass over ``min_y..=max_y``.
///
/// Crossings are evaluated at the row center with a half-open rule so an
/// edge ending exactly on the scan line counts once. ``fill_thin`` fills the
/// single cell of a degenerate span instead of dropping it.
#[allow(clippy::too_many_arguments)]
fn fill_rows(
    grid: &mut NavGrid,
    vertices: &[Vec2],
    min_x: i32,
    max_x: i32,
    min_y: i32,
    max_y: i32,
    fill_thin: bool,
    nodes: &mut CrossingNodes,
) -> bool {
    let mut filled_any = false;

    for y in min_y..=max_y {
        let center = y as f32 + 0.5;

        nodes.clear();
        let mut previous = vertices[vertices.len() - 1];
        for &vertex in vertices {
            if (vertex.y <= center && center < previous.y)
                || (previous.y < center && center <= vertex.y)
            {
                let t = (center - vertex.y) / (previous.y - vertex.y);
                nodes.push((vertex.x + t * (previous.x - vertex.x)).round() as i32);
            }
            previous = vertex;
        }
        nodes.sort_unstable();

        for span in nodes.chunks_exact(2) {
            if fill_thin && span[0] == span[1] {
                if (min_x..=max_x).contains(&span[0]) {
                    grid.mark_obstacle(grid.cell_index(span[0] as usize, y as usize));
                    filled_any = true;
                }
                continue;
            }

            let start = span[0].max(min_x);
            let end = span[1].min(max_x + 1);
            for x in start..end {
                grid.mark_obstacle(grid.cell_index(x as usize, y as usize));
                filled_any = true;
            }
        }
    }

    filled_any
}

/// Vertical transpose of [fill_rows], only run for thin polygons. Degenerate
/// spans always fill their single cell here.
fn fill_columns(
    grid: &mut NavGrid,
    vertices: &[Vec2],
    min_x: i32,
    max_x: i32,
    min_y: i32,
    max_y: i32,
    nodes: &mut CrossingNodes,
) {
    for x in min_x..=max_x {
        let center = x as f32 + 0.5;

        nodes.clear();
        let mut previous = vertices[vertices.len() - 1];
        for &vertex in vertices {
            if (vertex.x <= center && center < previous.x)
                || (previous.x < center && center <= vertex.x)
            {
                let t = (center - vertex.x) / (previous.x - vertex.x);
                nodes.push((vertex.y + t * (previous.y - vertex.y)).round() as i32);
            }
            previous = vertex;
        }
        nodes.sort_unstable();

        for span in nodes.chunks_exact(2) {
            if span[0] == span[1] {
                if (min_y..=max_y).contains(&span[0]) {
                    grid.mark_obstacle(grid.cell_index(x as usize, span[0] as usize));
                }
                continue;
            }

            let start = span[0].max(min_y);
            let end = span[1].min(max_y + 1);
            for y in start..end {
                grid.mark_obstacle(grid.cell_index(x as usize, y as usize));
            }
        }
    }
}

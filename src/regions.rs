use std::collections::VecDeque;

use bevy::log::warn;
use smallvec::SmallVec;

use crate::grid::{get_neighbour_index, NavGrid, N8, NULL_REGION};

/// Two-pass chamfer transform approximating twice the Chebyshev distance to
/// the nearest obstacle cell. An orthogonal step costs 2, a diagonal step 3,
/// keeping comparisons in integers.
///
/// Obstacle cells stay at 0. Returns the maximum distance found.
pub(crate) fn calculate_distance_field(grid: &mut NavGrid) -> u16 {
    let dim_x = grid.dim_x;

    // Forward pass, top-left to bottom-right.
    for y in 1..grid.dim_y - 1 {
        for x in 1..dim_x - 1 {
            let index = x + y * dim_x;
            if grid.is_obstacle(index) {
                continue;
            }

            let mut distance = grid.distances[index];

            // (-1, 0)
            let other_distance = grid.distances[index - 1].saturating_add(2);
            if other_distance < distance {
                distance = other_distance;
            }
            // (-1, -1)
            let other_distance = grid.distances[index - dim_x - 1].saturating_add(3);
            if other_distance < distance {
                distance = other_distance;
            }
            // (0, -1)
            let other_distance = grid.distances[index - dim_x].saturating_add(2);
            if other_distance < distance {
                distance = other_distance;
            }
            // (1, -1)
            let other_distance = grid.distances[index - dim_x + 1].saturating_add(3);
            if other_distance < distance {
                distance = other_distance;
            }

            grid.distances[index] = distance;
        }
    }

    // Backward pass, bottom-right to top-left.
    let mut max_distance = 0;
    for y in (1..grid.dim_y - 1).rev() {
        for x in (1..dim_x - 1).rev() {
            let index = x + y * dim_x;
            if grid.is_obstacle(index) {
                continue;
            }

            let mut distance = grid.distances[index];

            // (1, 0)
            let other_distance = grid.distances[index + 1].saturating_add(2);
            if other_distance < distance {
                distance = other_distance;
            }
            // (1, 1)
            let other_distance = grid.distances[index + dim_x + 1].saturating_add(3);
            if other_distance < distance {
                distance = other_distance;
            }
            // (0, 1)
            let other_distance = grid.distances[index + dim_x].saturating_add(2);
            if other_distance < distance {
                distance = other_distance;
            }
            // (-1, 1)
            let other_distance = grid.distances[index + dim_x - 1].saturating_add(3);
            if other_distance < distance {
                distance = other_distance;
            }

            grid.distances[index] = distance;
            max_distance = max_distance.max(distance);
        }
    }

    max_distance
}

struct DirtyEntry {
    index: usize,
    region: u16,
    distance: u16,
}

/// Watershed flooding from distance maxima.
///
/// Cells within ``obstacle_cell_padding`` cells of an obstacle are left in
/// the null region. The threshold sweeps down from the distance maximum two
/// units at a time; each sweep first expands existing regions over newly
/// eligible cells, then seeds the eligible connected components nothing
/// reached.
pub(crate) fn build_regions(grid: &mut NavGrid, max_distance: u16, obstacle_cell_padding: u16) {
    let unreachable_limit = obstacle_cell_padding.saturating_mul(2);

    let mut frontier: Vec<isize> = Vec::with_capacity(256);
    let mut dirty_entries: Vec<DirtyEntry> = Vec::with_capacity(256);
    let mut flood_queue: VecDeque<usize> = VecDeque::with_capacity(256);

    let mut level = max_distance.saturating_add(1) & !1u16; // Rounded.
    while level > unreachable_limit {
        level = level.saturating_sub(2);

        expand_regions(grid, level, unreachable_limit, &mut frontier, &mut dirty_entries);
        seed_new_regions(grid, level, unreachable_limit, &mut flood_queue);
    }

    // Pick up whatever the sweeps left below the last level but above the
    // padding limit.
    expand_regions(grid, 0, unreachable_limit, &mut frontier, &mut dirty_entries);

    split_encircled_null_regions(grid);
}

/// Grows every assigned region over the eligible unassigned cells, one ring
/// at a time until nothing moves.
///
/// A cell joins the neighbouring region closest to its core; equal distances
/// go to the lowest region id. Writes are double-buffered through
/// ``dirty_entries`` so a sweep sees a consistent snapshot.
fn expand_regions(
    grid: &mut NavGrid,
    threshold: u16,
    unreachable_limit: u16,
    frontier: &mut Vec<isize>,
    dirty_entries: &mut Vec<DirtyEntry>,
) {
    frontier.clear();
    for index in 0..grid.regions.len() {
        if grid.regions[index] == NULL_REGION
            && grid.distances[index] >= threshold
            && grid.distances[index] > unreachable_limit
        {
            frontier.push(index as isize);
        }
    }

    let dim_x = grid.dim_x;
    loop {
        let mut failed = 0;
        dirty_entries.clear();

        for entry in frontier.iter_mut() {
            if *entry < 0 {
                failed += 1;
                continue;
            }
            let index = *entry as usize;

            let mut new_region = NULL_REGION;
            let mut new_distance = u16::MAX;

            for dir in 0..4 {
                let other_index = get_neighbour_index(dim_x, index, dir);
                let other_region = grid.regions[other_index];
                if other_region == NULL_REGION {
                    continue;
                }

                let other_distance = grid.core_distances[other_index].saturating_add(2);
                if other_distance < new_distance
                    || (other_distance == new_distance && other_region < new_region)
                {
                    new_region = other_region;
                    new_distance = other_distance;
                }
            }

            if new_region != NULL_REGION {
                *entry = -1;
                dirty_entries.push(DirtyEntry {
                    index,
                    region: new_region,
                    distance: new_distance,
                });
            } else {
                failed += 1;
            }
        }

        for entry in dirty_entries.iter() {
            grid.regions[entry.index] = entry.region;
            grid.core_distances[entry.index] = entry.distance;
        }

        if failed == frontier.len() {
            break;
        }
    }
}

/// Seeds a fresh region for every connected component of eligible cells left
/// unassigned after expansion.
///
/// The partial flood is fenced by the threshold and claims a whole component
/// before the scan moves on, so a component is never picked up twice within
/// a sweep.
fn seed_new_regions(
    grid: &mut NavGrid,
    threshold: u16,
    unreachable_limit: u16,
    flood_queue: &mut VecDeque<usize>,
) {
    let dim_x = grid.dim_x;

    for index in 0..grid.regions.len() {
        if grid.regions[index] != NULL_REGION
            || grid.distances[index] < threshold
            || grid.distances[index] <= unreachable_limit
        {
            continue;
        }

        let Some(region_id) = grid.region_count.checked_add(1) else {
            warn!("Ran out of region ids, leaving the remaining cells unassigned.");
            return;
        };
        grid.region_count = region_id;

        flood_queue.clear();
        flood_queue.push_back(index);
        grid.regions[index] = region_id;
        grid.core_distances[index] = 0;

        while let Some(cell) = flood_queue.pop_front() {
            for dir in 0..4 {
                let other_index = get_neighbour_index(dim_x, cell, dir);

                if grid.regions[other_index] == NULL_REGION
                    && grid.distances[other_index] >= threshold
                    && grid.distances[other_index] > unreachable_limit
                {
                    grid.regions[other_index] = region_id;
                    grid.core_distances[other_index] = 0;
                    flood_queue.push_back(other_index);
                }
            }
        }
    }
}

/// Splits regions that fully encircle an interior patch of null cells.
///
/// Such a region would produce two contours (its outline and the hole),
/// which the contour builder cannot represent. Reassigning the column of
/// cells above the patch to a fresh region turns the ring into a C shape.
/// A patch bordered by several regions needs no split; regions nested inside
/// other regions are not handled here, the contour stage warns about them.
fn split_encircled_null_regions(grid: &mut NavGrid) {
    let dim_x = grid.dim_x;
    let dim_y = grid.dim_y;

    let mut visited = vec![false; grid.regions.len()];
    let mut flood_stack: Vec<usize> = Vec::with_capacity(256);

    // The border ring and everything null connected to it is one patch that
    // no region can encircle. Null cells connect diagonally: a region cannot
    // pass between two diagonally touching null cells.
    visited[0] = true;
    flood_stack.push(0);
    while let Some(cell) = flood_stack.pop() {
        let x = cell % dim_x;
        let y = cell / dim_x;

        for offset in N8 {
            let other_x = x as i32 + offset.x;
            let other_y = y as i32 + offset.y;
            if other_x < 0 || other_y < 0 || other_x >= dim_x as i32 || other_y >= dim_y as i32 {
                continue;
            }

            let other_index = other_x as usize + other_y as usize * dim_x;
            if !visited[other_index] && grid.regions[other_index] == NULL_REGION {
                visited[other_index] = true;
                flood_stack.push(other_index);
            }
        }
    }

    for index in 0..grid.regions.len() {
        if grid.regions[index] != NULL_REGION || visited[index] {
            continue;
        }

        // Interior null patch. ``index`` is its top-most, left-most cell.
        let mut bordering_regions: SmallVec<[u16; 4]> = SmallVec::new();

        visited[index] = true;
        flood_stack.clear();
        flood_stack.push(index);
        while let Some(cell) = flood_stack.pop() {
            for dir in 0..4 {
                let region = grid.regions[get_neighbour_index(dim_x, cell, dir)];
                if region != NULL_REGION && !bordering_regions.contains(&region) {
                    bordering_regions.push(region);
                }
            }

            for dir in 0..8 {
                let other_index = get_neighbour_index(dim_x, cell, dir);
                if !visited[other_index] && grid.regions[other_index] == NULL_REGION {
                    visited[other_index] = true;
                    flood_stack.push(other_index);
                }
            }
        }

        if bordering_regions.len() != 1 {
            continue;
        }
        let encircling_region = bordering_regions[0];

        let Some(new_region) = grid.region_count.checked_add(1) else {
            warn!("Ran out of region ids while splitting an encircled region.");
            return;
        };
        grid.region_count = new_region;

        let mut cut = index - dim_x;
        while grid.regions[cut] == encircling_region {
            grid.regions[cut] = new_region;
            cut -= dim_x;
        }
    }
}

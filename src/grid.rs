use bevy::math::{IVec2, Vec2};

use crate::NavMeshSettings;

/// Distance-field value of a cell covered by an obstacle.
pub(crate) const OBSTACLE_DISTANCE: u16 = 0;
/// Region id of obstacle & unreachable cells.
pub(crate) const NULL_REGION: u16 = 0;

/*
*   Neighbours:
*   0: (-1, 0),
*   1: (0, 1),
*   2: (1, 0),
*   3: (0, -1),
*   4: (1, 1),
*   5: (-1, 1),
*   6: (-1, -1),
*   7: (1, -1)
*/
/// The four direct neighbours followed by the diagonals, matching the
/// directions of [get_neighbour_index].
pub(crate) const N8: [IVec2; 8] = [
    IVec2::new(-1, 0),
    IVec2::new(0, 1),
    IVec2::new(1, 0),
    IVec2::new(0, -1),
    IVec2::new(1, 1),
    IVec2::new(-1, 1),
    IVec2::new(-1, -1),
    IVec2::new(1, -1),
];

#[inline]
pub(crate) fn get_neighbour_index(dim_x: usize, index: usize, dir: usize) -> usize {
    match dir {
        0 => index - 1,
        1 => index + dim_x,
        2 => index + 1,
        3 => index - dim_x,
        4 => index + dim_x + 1,
        5 => index + dim_x - 1,
        6 => index - dim_x - 1,
        7 => index - dim_x + 1,
        _ => panic!("Not a valid direction"),
    }
}

/// Rasterization grid covering the build area plus a one-cell border on
/// every side.
///
/// The border ring is permanently obstacle so neighbour lookups on walkable
/// cells never need a bounds check. Cell state is kept in parallel row-major
/// arrays indexed by ``x + y * dim_x``.
pub(crate) struct NavGrid {
    pub dim_x: usize,
    pub dim_y: usize,
    origin: Vec2,
    cell_width: f32,
    cell_height: f32,

    /// Approximate distance to the nearest obstacle cell, scaled by 2
    /// (orthogonal step = 2, diagonal step = 3). 0 marks an obstacle.
    pub distances: Box<[u16]>,
    /// Region id per cell. 0 is the null region.
    pub regions: Box<[u16]>,
    /// Distance to the watershed core that claimed the cell. Expansion
    /// scratch, meaningless outside region generation.
    pub core_distances: Box<[u16]>,
    /// One bit per N4 direction, set when the neighbour belongs to a
    /// different region.
    pub contour_flags: Box<[u8]>,

    pub region_count: u16,
}

impl NavGrid {
    pub fn new(settings: &NavMeshSettings) -> Self {
        let cell_width = settings.cell_size;
        let cell_height = settings.cell_size / settings.isometric_ratio;

        let dim_x = 2 + ((settings.area_right_bound - settings.area_left_bound) / cell_width)
            .ceil() as usize;
        let dim_y = 2 + ((settings.area_bottom_bound - settings.area_top_bound) / cell_height)
            .ceil() as usize;

        let origin = Vec2::new(
            settings.area_left_bound - cell_width,
            settings.area_top_bound - cell_height,
        );

        let cell_count = dim_x * dim_y;

        let mut grid = Self {
            dim_x,
            dim_y,
            origin,
            cell_width,
            cell_height,
            distances: vec![u16::MAX; cell_count].into_boxed_slice(),
            regions: vec![NULL_REGION; cell_count].into_boxed_slice(),
            core_distances: vec![0; cell_count].into_boxed_slice(),
            contour_flags: vec![0; cell_count].into_boxed_slice(),
            region_count: 0,
        };
        grid.seal_border();

        grid
    }

    /// Resets all mutable cell state so the grid can be reused for another
    /// build without reallocating.
    pub fn clear(&mut self) {
        self.distances.fill(u16::MAX);
        self.regions.fill(NULL_REGION);
        self.core_distances.fill(0);
        self.contour_flags.fill(0);
        self.region_count = 0;

        self.seal_border();
    }

    fn seal_border(&mut self) {
        for x in 0..self.dim_x {
            self.distances[x] = OBSTACLE_DISTANCE;
            self.distances[x + (self.dim_y - 1) * self.dim_x] = OBSTACLE_DISTANCE;
        }
        for y in 0..self.dim_y {
            self.distances[y * self.dim_x] = OBSTACLE_DISTANCE;
            self.distances[y * self.dim_x + self.dim_x - 1] = OBSTACLE_DISTANCE;
        }
    }

    #[inline]
    pub fn cell_index(&self, x: usize, y: usize) -> usize {
        x + y * self.dim_x
    }

    #[inline]
    pub fn is_obstacle(&self, index: usize) -> bool {
        self.distances[index] == OBSTACLE_DISTANCE
    }

    #[inline]
    pub fn mark_obstacle(&mut self, index: usize) {
        self.distances[index] = OBSTACLE_DISTANCE;
    }

    /// World position to grid basis. Cell (x, y) covers
    /// ``[x, x + 1) × [y, y + 1)`` in the returned space.
    #[inline]
    pub fn convert_to_grid_basis(&self, point: Vec2) -> Vec2 {
        Vec2::new(
            (point.x - self.origin.x) / self.cell_width,
            (point.y - self.origin.y) / self.cell_height,
        )
    }

    /// Inverse of [Self::convert_to_grid_basis].
    #[inline]
    pub fn convert_from_grid_basis(&self, point: Vec2) -> Vec2 {
        Vec2::new(
            point.x * self.cell_width + self.origin.x,
            point.y * self.cell_height + self.origin.y,
        )
    }
}

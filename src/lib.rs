//! 2D **Nav-Mesh** generation from polygonal obstacles.
//!
//! Takes a rectangular area and a set of obstacle polygons and produces a
//! set of convex, clockwise polygons covering the walkable space, tiling
//! with shared edges. Feed the polygons to the path-finder of your choice.
//!
//! ## Quick-start:
//! 1. Create [NavMeshSettings] with [NavMeshSettings::from_area_bounds],
//!    using a cell size of around half of your characters' radius.
//! 2. Create a [NavMeshGenerator] from the settings.
//! 3. Call [NavMeshGenerator::build] with your obstacle outlines (any
//!    winding) and the obstacle padding in cells.
//!
//! Generation runs through five stages: obstacles are rasterized onto a
//! cell grid, a distance field is computed over the open cells, regions are
//! flooded from the distance maxima, every region border is walked &
//! simplified into a contour, and each contour is decomposed into convex
//! polygons.
//!
//! The generator keeps its grid between builds, so reusing one generator
//! for repeated builds of the same area does not reallocate. For isometric
//! 2D, set [NavMeshSettings::isometric_ratio] and the grid compensates so
//! cells are square on screen.
//!
//! Failures on individual obstacles or contours are logged through
//! ``bevy_log`` and never abort a build: the generator always returns the
//! best mesh it could make.

use std::fmt;

use bevy::math::Vec2;

#[cfg(feature = "trace")]
use bevy::log::info_span;

use contour::build_contours;
use grid::NavGrid;
use mesher::build_poly_mesh;
use rasterization::rasterize_obstacles;
use regions::{build_regions, calculate_distance_field};

mod contour;
mod grid;
mod math;
mod mesher;
mod rasterization;
mod regions;

/// A convex, clockwise polygon of the generated mesh, in world space.
pub type Polygon = Vec<Vec2>;

/// Settings for nav-mesh generation.
#[derive(Clone, Debug)]
pub struct NavMeshSettings {
    /// Left edge of the area covered by the nav-mesh in world units.
    pub area_left_bound: f32,
    /// Top edge of the area covered by the nav-mesh in world units.
    pub area_top_bound: f32,
    /// Right edge of the area covered by the nav-mesh in world units.
    pub area_right_bound: f32,
    /// Bottom edge of the area covered by the nav-mesh in world units.
    pub area_bottom_bound: f32,

    /// Size of a rasterization cell in world units.
    ///
    /// **Suggested value**: 1/2 of the radius of the characters that will
    /// navigate the mesh. Smaller values raise generation time with
    /// diminishing returns in mesh detail.
    pub cell_size: f32,

    /// Width over height of a cell as it appears on screen, for isometric
    /// 2D. Leave at 1 for top-down views.
    ///
    /// The grid's vertical cell size becomes ``cell_size / isometric_ratio``
    /// so cells are square on screen; output y coordinates are stretched
    /// back by the same ratio.
    pub isometric_ratio: f32,

    /// Maximum number of vertices a produced polygon may have.
    pub max_vertices_per_polygon: usize,
}

impl NavMeshSettings {
    /// Settings with defaults for everything but the area & cell size.
    #[inline]
    pub fn from_area_bounds(left: f32, top: f32, right: f32, bottom: f32, cell_size: f32) -> Self {
        Self {
            area_left_bound: left,
            area_top_bound: top,
            area_right_bound: right,
            area_bottom_bound: bottom,
            cell_size,
            isometric_ratio: 1.0,
            max_vertices_per_polygon: 16,
        }
    }

    /// Setter for [`NavMeshSettings::isometric_ratio`]
    pub fn with_isometric_ratio(mut self, isometric_ratio: f32) -> Self {
        self.isometric_ratio = isometric_ratio;

        self
    }

    /// Setter for [`NavMeshSettings::max_vertices_per_polygon`]
    pub fn with_max_vertices_per_polygon(mut self, max_vertices_per_polygon: usize) -> Self {
        self.max_vertices_per_polygon = max_vertices_per_polygon;

        self
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if !(self.area_left_bound < self.area_right_bound)
            || !(self.area_top_bound < self.area_bottom_bound)
            || !self.area_left_bound.is_finite()
            || !self.area_top_bound.is_finite()
            || !self.area_right_bound.is_finite()
            || !self.area_bottom_bound.is_finite()
        {
            return Err(SettingsError::InvalidAreaBounds);
        }
        if !(self.cell_size > 0.0) || !self.cell_size.is_finite() {
            return Err(SettingsError::InvalidCellSize);
        }
        if !(self.isometric_ratio > 0.0) || !self.isometric_ratio.is_finite() {
            return Err(SettingsError::InvalidIsometricRatio);
        }
        if self.max_vertices_per_polygon < 3 {
            return Err(SettingsError::InvalidPolygonVertexCap);
        }

        Ok(())
    }
}

/// Rejected [NavMeshSettings].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SettingsError {
    /// Left/right or top/bottom bounds are inverted, equal or not finite.
    InvalidAreaBounds,
    /// The cell size is zero, negative or not finite.
    InvalidCellSize,
    /// The isometric ratio is zero, negative or not finite.
    InvalidIsometricRatio,
    /// Fewer than three vertices per polygon.
    InvalidPolygonVertexCap,
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidAreaBounds => {
                write!(f, "area bounds must be finite, with left < right and top < bottom")
            }
            Self::InvalidCellSize => write!(f, "cell size must be a finite positive number"),
            Self::InvalidIsometricRatio => {
                write!(f, "isometric ratio must be a finite positive number")
            }
            Self::InvalidPolygonVertexCap => {
                write!(f, "polygons need at least three vertices")
            }
        }
    }
}

impl std::error::Error for SettingsError {}

/// Reusable nav-mesh generator for a fixed area.
///
/// [build](Self::build) is a single synchronous call. The generator owns its
/// rasterization grid for its whole lifetime and clears it at the start of
/// every build, so repeated builds do not reallocate. Builds on different
/// generators are independent; one generator must not be shared by
/// concurrent builds as every stage mutates the grid in place.
pub struct NavMeshGenerator {
    settings: NavMeshSettings,
    grid: NavGrid,
    vertex_scratch: Vec<Vec2>,
}

impl NavMeshGenerator {
    /// Validates the settings and allocates the grid.
    pub fn new(settings: NavMeshSettings) -> Result<Self, SettingsError> {
        settings.validate()?;
        let grid = NavGrid::new(&settings);

        Ok(Self {
            settings,
            grid,
            vertex_scratch: Vec::new(),
        })
    }

    pub fn settings(&self) -> &NavMeshSettings {
        &self.settings
    }

    /// Generates the nav-mesh for the given obstacles.
    ///
    /// Obstacles are sequences of world-space outline points, consumed
    /// lazily; winding does not matter. ``obstacle_cell_padding`` dilates
    /// every obstacle by that many cells, pulling the mesh away from walls
    /// by the radius of your characters.
    ///
    /// The returned polygons are convex, clockwise and have between 3 and
    /// [NavMeshSettings::max_vertices_per_polygon] vertices. Degenerate
    /// obstacles & contours are logged and skipped, never fatal.
    pub fn build<ObstacleIter, PointIter>(
        &mut self,
        obstacles: ObstacleIter,
        obstacle_cell_padding: u16,
    ) -> Vec<Polygon>
    where
        ObstacleIter: IntoIterator<Item = PointIter>,
        PointIter: IntoIterator<Item = Vec2>,
    {
        self.grid.clear();

        {
            #[cfg(feature = "trace")]
            let _span = info_span!("Rasterize obstacles").entered();
            rasterize_obstacles(&mut self.grid, obstacles, &mut self.vertex_scratch);
        }

        let max_distance = {
            #[cfg(feature = "trace")]
            let _span = info_span!("Calculate distance field").entered();
            calculate_distance_field(&mut self.grid)
        };

        {
            #[cfg(feature = "trace")]
            let _span = info_span!("Build regions").entered();
            build_regions(&mut self.grid, max_distance, obstacle_cell_padding);
        }

        let contour_set = {
            #[cfg(feature = "trace")]
            let _span = info_span!("Build contours").entered();
            build_contours(&mut self.grid)
        };

        let grid_polygons = {
            #[cfg(feature = "trace")]
            let _span = info_span!("Build poly mesh").entered();
            build_poly_mesh(&contour_set, self.settings.max_vertices_per_polygon)
        };

        {
            #[cfg(feature = "trace")]
            let _span = info_span!("Convert to world space").entered();

            grid_polygons
                .into_iter()
                .map(|polygon| {
                    polygon
                        .into_iter()
                        .map(|vertex| {
                            let world = self.grid.convert_from_grid_basis(vertex.as_vec2());
                            Vec2::new(world.x, world.y * self.settings.isometric_ratio)
                        })
                        .collect()
                })
                .collect()
        }
    }
}

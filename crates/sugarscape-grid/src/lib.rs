//! Grid geometry for the SugarScape world: cells, rounded-Euclidean
//! distances, and bounded neighborhood enumeration in a fixed row-major
//! order shared by movement and visibility queries.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors emitted when constructing grid geometry.
#[derive(Debug, Error)]
pub enum GridError {
    /// Indicates dimension values that cannot be used.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// A discrete grid coordinate, 0-based. Valid cells of a [`Grid`] satisfy
/// `x < width` and `y < height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cell {
    pub x: u32,
    pub y: u32,
}

impl Cell {
    /// Create a cell at `(x, y)`.
    #[must_use]
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`, rounded to the nearest integer.
    #[must_use]
    pub fn distance_to(self, other: Self) -> u32 {
        let dx = f64::from(self.x) - f64::from(other.x);
        let dy = f64::from(self.y) - f64::from(other.y);
        (dx * dx + dy * dy).sqrt().round() as u32
    }
}

/// Bounded rectangular grid. Pure geometry, no mutable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid {
    width: u32,
    height: u32,
}

impl Grid {
    /// Create a grid with the given dimensions.
    pub fn new(width: u32, height: u32) -> Result<Self, GridError> {
        if width == 0 || height == 0 {
            return Err(GridError::InvalidConfig(
                "grid dimensions must be non-zero",
            ));
        }
        Ok(Self { width, height })
    }

    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Total number of cells.
    #[must_use]
    pub const fn cell_count(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    /// Returns true when `cell` lies within the grid bounds.
    #[must_use]
    pub const fn contains(&self, cell: Cell) -> bool {
        cell.x < self.width && cell.y < self.height
    }

    /// Row-major flat index for an in-bounds cell.
    #[must_use]
    pub const fn index_of(&self, cell: Cell) -> usize {
        (cell.y as usize) * (self.width as usize) + (cell.x as usize)
    }

    /// Inverse of [`Grid::index_of`].
    #[must_use]
    pub const fn cell_at(&self, index: usize) -> Cell {
        Cell::new(
            (index % (self.width as usize)) as u32,
            (index / (self.width as usize)) as u32,
        )
    }

    /// Minimum rounded-Euclidean distance from `cell` to any of `peaks`.
    ///
    /// Callers guarantee a non-empty peak list; an empty list yields 0.
    #[must_use]
    pub fn distance_to_nearest(&self, cell: Cell, peaks: &[Cell]) -> u32 {
        peaks
            .iter()
            .map(|peak| cell.distance_to(*peak))
            .min()
            .unwrap_or(0)
    }

    /// Visit every in-bounds cell whose rounded Euclidean distance from
    /// `center` is at most `radius`, including `center` itself.
    ///
    /// Cells are visited in row-major order (ascending `y`, then ascending
    /// `x`) over the clipped bounding square. Callers that keep the first
    /// maximum of some per-cell score therefore tie-break deterministically.
    pub fn for_each_in_range(&self, center: Cell, radius: u32, visitor: &mut dyn FnMut(Cell)) {
        let min_x = center.x.saturating_sub(radius);
        let min_y = center.y.saturating_sub(radius);
        let max_x = center.x.saturating_add(radius).min(self.width - 1);
        let max_y = center.y.saturating_add(radius).min(self.height - 1);
        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let cell = Cell::new(x, y);
                if center.distance_to(cell) <= radius {
                    visitor(cell);
                }
            }
        }
    }

    /// Collect the neighborhood of `center` in visit order.
    #[must_use]
    pub fn neighborhood(&self, center: Cell, radius: u32) -> Vec<Cell> {
        let mut cells = Vec::new();
        self.for_each_in_range(center, radius, &mut |cell| cells.push(cell));
        cells
    }
}

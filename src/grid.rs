//! Grid geometry and translation-invariant offset tables.
//!
//! The search domain is a fixed W×H lattice. Every spatially varying quantity
//! (hit likelihoods, distance fields) is precomputed once over *relative
//! offsets* on a (2W+1)×(2H+1) table whose origin sits at index (W, H); the
//! [`Grid::window`] operation then serves any agent position by slicing the
//! grid-sized sub-table aligned so offset 0 maps to the agent cell.

use ndarray::{Array2, ArrayView2, s};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Integer cell coordinate, always within grid bounds.
pub type Position = [usize; 2];

/// Norm used for distances between cells and relative offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Norm {
    #[default]
    Euclidean,
    Manhattan,
    Chebyshev,
}

impl Norm {
    /// Distance of an integer offset from the origin under this norm.
    pub fn length(&self, offset: [i64; 2]) -> f64 {
        let dx = offset[0].abs() as f64;
        let dy = offset[1].abs() as f64;
        match self {
            Norm::Euclidean => (dx * dx + dy * dy).sqrt(),
            Norm::Manhattan => dx + dy,
            Norm::Chebyshev => dx.max(dy),
        }
    }
}

/// Immutable W×H lattice.
///
/// Two axes are implemented; offset tables, windowing, and the action
/// encoding generalize to up to four, and [`Grid::from_shape`] rejects other
/// dimensionalities with [`Error::InvalidDimension`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid {
    width: usize,
    height: usize,
}

impl Grid {
    pub fn new(width: usize, height: usize) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::config(format!(
                "grid must be non-empty, got {width}x{height}"
            )));
        }
        Ok(Self { width, height })
    }

    /// Build a grid from an axis-length slice, checking dimensionality.
    pub fn from_shape(shape: &[usize]) -> Result<Self> {
        if shape.len() != 2 {
            return Err(Error::InvalidDimension { dims: shape.len() });
        }
        Self::new(shape[0], shape[1])
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn shape(&self) -> [usize; 2] {
        [self.width, self.height]
    }

    /// Number of space dimensions.
    pub fn ndim(&self) -> usize {
        2
    }

    pub fn num_cells(&self) -> usize {
        self.width * self.height
    }

    pub fn contains(&self, position: Position) -> bool {
        position[0] < self.width && position[1] < self.height
    }

    /// Manhattan distance between two cells.
    pub fn manhattan(&self, a: Position, b: Position) -> f64 {
        let dx = a[0].abs_diff(b[0]);
        let dy = a[1].abs_diff(b[1]);
        (dx + dy) as f64
    }

    /// Spatial shape of the full offset tables: 2n+1 per axis.
    pub fn offset_shape(&self) -> [usize; 2] {
        [2 * self.width + 1, 2 * self.height + 1]
    }

    /// Index of the zero offset inside the full offset tables.
    pub fn offset_origin(&self) -> [usize; 2] {
        [self.width, self.height]
    }

    /// Distance from the zero offset for every relative offset.
    ///
    /// The returned table has spatial shape 2n+1 per axis with the origin at
    /// (W, H), so `table[origin + offset]` is the length of `offset`.
    pub fn offset_table(&self, norm: Norm) -> Array2<f64> {
        let [ox, oy] = self.offset_origin();
        let [sx, sy] = self.offset_shape();
        Array2::from_shape_fn((sx, sy), |(i, j)| {
            norm.length([i as i64 - ox as i64, j as i64 - oy as i64])
        })
    }

    /// Extract the grid-sized window of an offset table aligned at `origin`.
    ///
    /// Grid cell `c` maps to the table entry for offset `c - origin`. Tables
    /// of spatial extent 2n+1 (origin at n) and 2n−1 (origin at n−1) per axis
    /// are both accepted; any other extent is [`Error::InvalidKernelShape`].
    pub fn window<'a>(
        &self,
        table: &'a Array2<f64>,
        origin: Position,
    ) -> Result<ArrayView2<'a, f64>> {
        debug_assert!(self.contains(origin));
        let dims = [self.width, self.height];
        let mut start = [0usize; 2];
        for axis in 0..2 {
            let len = table.shape()[axis];
            let n = dims[axis];
            if len == 2 * n + 1 {
                start[axis] = n - origin[axis];
            } else if len == 2 * n - 1 {
                start[axis] = (n - 1) - origin[axis];
            } else {
                return Err(Error::InvalidKernelShape { axis, len, dim: n });
            }
        }
        Ok(table.slice(s![
            start[0]..start[0] + self.width,
            start[1]..start[1] + self.height
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_shape_rejects_non_2d() {
        assert!(matches!(
            Grid::from_shape(&[5]),
            Err(Error::InvalidDimension { dims: 1 })
        ));
        assert!(matches!(
            Grid::from_shape(&[5, 5, 5]),
            Err(Error::InvalidDimension { dims: 3 })
        ));
        assert!(Grid::from_shape(&[5, 3]).is_ok());
    }

    #[test]
    fn norms_agree_on_axis_aligned_offsets() {
        for norm in [Norm::Euclidean, Norm::Manhattan, Norm::Chebyshev] {
            assert_eq!(norm.length([3, 0]), 3.0);
            assert_eq!(norm.length([0, -4]), 4.0);
        }
        assert_eq!(Norm::Euclidean.length([3, 4]), 5.0);
        assert_eq!(Norm::Manhattan.length([3, 4]), 7.0);
        assert_eq!(Norm::Chebyshev.length([3, 4]), 4.0);
    }

    #[test]
    fn offset_table_origin_is_zero() {
        let grid = Grid::new(5, 3).unwrap();
        let table = grid.offset_table(Norm::Manhattan);
        let [ox, oy] = grid.offset_origin();
        assert_eq!(table[[ox, oy]], 0.0);
        assert_eq!(table[[ox + 2, oy - 1]], 3.0);
    }

    #[test]
    fn window_matches_direct_offset_lookup() {
        let grid = Grid::new(5, 3).unwrap();
        let table = grid.offset_table(Norm::Manhattan);
        let [ox, oy] = grid.offset_origin();
        for ax in 0..5 {
            for ay in 0..3 {
                let window = grid.window(&table, [ax, ay]).unwrap();
                for cx in 0..5 {
                    for cy in 0..3 {
                        let oi = (ox as i64 + cx as i64 - ax as i64) as usize;
                        let oj = (oy as i64 + cy as i64 - ay as i64) as usize;
                        assert_eq!(window[[cx, cy]], table[[oi, oj]]);
                    }
                }
            }
        }
    }

    #[test]
    fn window_accepts_reduced_extent_tables() {
        let grid = Grid::new(4, 4).unwrap();
        // 2n-1 extent with origin at n-1.
        let reduced = Array2::from_shape_fn((7, 7), |(i, j)| {
            Norm::Manhattan.length([i as i64 - 3, j as i64 - 3])
        });
        let window = grid.window(&reduced, [1, 2]).unwrap();
        assert_eq!(window[[1, 2]], 0.0);
        assert_eq!(window[[3, 2]], 2.0);
    }

    #[test]
    fn window_rejects_other_extents() {
        let grid = Grid::new(4, 4).unwrap();
        let bad = Array2::zeros((8, 9));
        assert!(matches!(
            grid.window(&bad, [0, 0]),
            Err(Error::InvalidKernelShape { axis: 0, len: 8, dim: 4 })
        ));
    }
}

//! Split of the global index space into per-rank partitions.

use crate::comm::Rank;
use crate::error::{Error, Result};
use crate::field::Shape;
use crate::grid::Staggering;

/// Contiguous range `start..end` of global indices along one axis.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Limit {
    pub start: usize,
    pub end: usize,
    pub n: usize,
}

impl Limit {
    pub fn new(start: usize, end: usize) -> Self {
        Limit {
            start,
            end,
            n: end - start,
        }
    }
}

/// Split an axis of `n_global` cells into `parts` chunks and return chunk `coord`.
///
/// Chunks differ by at most one cell; the last `n_global % parts` chunks are the
/// larger ones.
pub fn split_axis(n_global: usize, parts: usize, coord: usize) -> Limit {
    let base = n_global / parts;
    let small = parts - n_global % parts;
    let start = coord * base + coord.saturating_sub(small);
    let n = if coord >= small { base + 1 } else { base };
    Limit::new(start, start + n)
}

/// Global cell ranges owned by one rank, for the cell-centred grid.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PartitionLimits {
    pub x: Limit,
    pub y: Limit,
}

impl PartitionLimits {
    /// Ranges owned for a variable with the given staggering.
    ///
    /// The face that closes the domain on the high side (`i = nx` for x faces,
    /// `j = ny` for y faces) is owned by the partition at that edge.
    pub fn owned(&self, staggering: Staggering, extent: Shape) -> [Limit; 2] {
        let mut x = self.x;
        let mut y = self.y;
        match staggering {
            Staggering::Center => {}
            Staggering::FaceX if x.end == extent.nx() => x = Limit::new(x.start, x.end + 1),
            Staggering::FaceY if y.end == extent.ny() => y = Limit::new(y.start, y.end + 1),
            Staggering::FaceX | Staggering::FaceY => {}
        }
        [x, y]
    }

    /// Owned shape for a variable with the given staggering.
    pub fn owned_shape(&self, staggering: Staggering, extent: Shape) -> Shape {
        let [x, y] = self.owned(staggering, extent);
        Shape::new(x.n, y.n)
    }
}

/// Partition limits of all ranks of a process grid.
#[derive(Clone, Debug)]
pub struct Decomposition {
    extent: Shape,
    dims: [usize; 2],
    limits: Vec<PartitionLimits>,
}

impl Decomposition {
    /// Tile a global grid of shape `extent` over a `[rows, cols]` process grid.
    ///
    /// Fails if an axis split over more than one rank would leave a partition with
    /// fewer than two cells along it.
    pub fn new(extent: Shape, dims: [usize; 2]) -> Result<Self> {
        let [rows, cols] = dims;
        for (n, parts, name) in [(extent.nx(), cols, "x"), (extent.ny(), rows, "y")] {
            if n == 0 {
                return Err(Error::partition(format!("empty global extent along {}", name)));
            }
            if parts > 1 && n < 2 * parts {
                return Err(Error::partition(format!(
                    "{} cells along {} cannot be split over {} ranks (at least 2 cells per rank)",
                    n, name, parts
                )));
            }
        }
        let limits = (0..rows * cols)
            .map(|rank| PartitionLimits {
                x: split_axis(extent.nx(), cols, rank % cols),
                y: split_axis(extent.ny(), rows, rank / cols),
            })
            .collect();
        Ok(Decomposition {
            extent,
            dims,
            limits,
        })
    }

    pub fn extent(&self) -> Shape {
        self.extent
    }

    pub fn dims(&self) -> [usize; 2] {
        self.dims
    }

    pub fn limits(&self, rank: Rank) -> &PartitionLimits {
        &self.limits[rank]
    }

    pub fn iter(&self) -> impl Iterator<Item = &PartitionLimits> {
        self.limits.iter()
    }
}

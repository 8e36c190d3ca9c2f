//! Cartesian process grid.
//!
//! Ranks are laid out row-major on a `rows × cols` grid. The column index grows
//! with the global `i` index (to the right), the row index grows with `j` (up).
//! There is no wraparound: ranks on the rim of the process grid have no neighbour
//! in the outward direction.

use fixed_map::{Key, Map};

use crate::comm::Rank;
use crate::error::{Error, Result};
use crate::field::Shape;

/// Axis of the global grid.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

/// Direction toward a neighbouring partition.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Key)]
pub enum Direction {
    Left,
    Right,
    Down,
    Up,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Left,
        Direction::Right,
        Direction::Down,
        Direction::Up,
    ];

    pub fn opposite(self) -> Self {
        match self {
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
            Direction::Down => Direction::Up,
            Direction::Up => Direction::Down,
        }
    }

    pub fn axis(self) -> Axis {
        match self {
            Direction::Left | Direction::Right => Axis::X,
            Direction::Down | Direction::Up => Axis::Y,
        }
    }
}

/// Position of this rank in the process grid and its neighbours.
#[derive(Clone, Debug)]
pub struct Topology {
    size: usize,
    rank: Rank,
    /// `[rows, cols]`
    dims: [usize; 2],
    /// `[row, col]`
    coords: [usize; 2],
    neighbors: Map<Direction, Rank>,
}

impl Topology {
    /// Build the topology of `rank` on a process grid of shape `dims = [rows, cols]`.
    pub fn new(size: usize, rank: Rank, dims: [usize; 2]) -> Result<Self> {
        if size == 0 {
            return Err(Error::config("at least one rank is required"));
        }
        if dims[0] * dims[1] != size {
            return Err(Error::config(format!(
                "process grid {}x{} does not match {} ranks",
                dims[0], dims[1], size
            )));
        }
        if rank >= size {
            return Err(Error::config(format!(
                "rank {} outside of communicator of size {}",
                rank, size
            )));
        }
        let [rows, cols] = dims;
        let coords = [rank / cols, rank % cols];
        let [row, col] = coords;

        let mut neighbors = Map::new();
        if col > 0 {
            neighbors.insert(Direction::Left, row * cols + col - 1);
        }
        if col + 1 < cols {
            neighbors.insert(Direction::Right, row * cols + col + 1);
        }
        if row > 0 {
            neighbors.insert(Direction::Down, (row - 1) * cols + col);
        }
        if row + 1 < rows {
            neighbors.insert(Direction::Up, (row + 1) * cols + col);
        }

        Ok(Topology {
            size,
            rank,
            dims,
            coords,
            neighbors,
        })
    }

    /// Build the topology for a global grid of shape `extent`.
    ///
    /// If `requested` is given it is used as `[rows, cols]`, otherwise the
    /// factorisation is chosen by [`choose_dims`].
    pub fn for_extent(
        size: usize,
        rank: Rank,
        extent: Shape,
        requested: Option<[usize; 2]>,
    ) -> Result<Self> {
        let dims = match requested {
            Some(dims) => dims,
            None => choose_dims(size, extent),
        };
        Self::new(size, rank, dims)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub fn dims(&self) -> [usize; 2] {
        self.dims
    }

    pub fn coords(&self) -> [usize; 2] {
        self.coords
    }

    /// Neighbouring rank in direction `dir`, if any.
    pub fn neighbor(&self, dir: Direction) -> Option<Rank> {
        self.neighbors.get(dir).copied()
    }
}

/// Choose `[rows, cols]` with `rows * cols == size` for a grid of shape `extent`.
///
/// The factorisation minimises the number of cells on internal partition edges,
/// ties are broken toward the squarer process grid.
pub fn choose_dims(size: usize, extent: Shape) -> [usize; 2] {
    (1..=size.max(1))
        .filter(|rows| size % rows == 0)
        .map(|rows| [rows, size / rows])
        .min_by_key(|&[rows, cols]| {
            (
                (cols - 1) * extent.ny() + (rows - 1) * extent.nx(),
                rows.abs_diff(cols),
            )
        })
        .unwrap_or([1, 1])
}

//! Grid meta-data of the staggered (Arakawa C) grid.
//!
//! The global grid is defined by the number of cell centres `nx × ny` and the
//! spacing `dx, dy`. Elevation lives on cell centres, `u` on the faces
//! orthogonal to x and `v` on the faces orthogonal to y. Face `i` of the x faces
//! is the left face of cell `i`, hence there are `nx + 1` of them.

use fixed_map::Key;

use crate::field::Shape;
use crate::partition::PartitionLimits;
use crate::topology::Direction;

/// Location of a variable within a grid box.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Key)]
pub enum Staggering {
    /// Cell centre, e.g. elevation and depth.
    Center,
    /// Face orthogonal to x, e.g. zonal velocity.
    FaceX,
    /// Face orthogonal to y, e.g. meridional velocity.
    FaceY,
}

/// Extent and spacing of the global computational grid.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GlobalGrid {
    extent: Shape,
    delta: [f64; 2],
}

impl GlobalGrid {
    pub fn new(extent: Shape, dx: f64, dy: f64) -> Self {
        GlobalGrid {
            extent,
            delta: [dx, dy],
        }
    }

    /// Grid covering the physical area of a depth field of shape `depth_extent`
    /// and spacing `depth_delta`, sampled with spacing `dx, dy`.
    ///
    /// At least one cell is kept along each axis.
    pub fn covering(depth_extent: Shape, depth_delta: [f64; 2], dx: f64, dy: f64) -> Self {
        let lx = depth_extent.nx() as f64 * depth_delta[0];
        let ly = depth_extent.ny() as f64 * depth_delta[1];
        let nx = ((lx / dx).floor() as usize).max(1);
        let ny = ((ly / dy).floor() as usize).max(1);
        Self::new(Shape::new(nx, ny), dx, dy)
    }

    /// Number of cell centres.
    pub fn extent(&self) -> Shape {
        self.extent
    }

    pub fn dx(&self) -> f64 {
        self.delta[0]
    }

    pub fn dy(&self) -> f64 {
        self.delta[1]
    }

    /// Global shape of a variable with the given staggering.
    pub fn shape(&self, staggering: Staggering) -> Shape {
        let (nx, ny) = (self.extent.nx(), self.extent.ny());
        match staggering {
            Staggering::Center => Shape::new(nx, ny),
            Staggering::FaceX => Shape::new(nx + 1, ny),
            Staggering::FaceY => Shape::new(nx, ny + 1),
        }
    }

    /// Physical coordinate of global index `[i, j]`.
    pub fn coord(&self, staggering: Staggering, i: usize, j: usize) -> [f64; 2] {
        let (x, y) = (i as f64 * self.delta[0], j as f64 * self.delta[1]);
        match staggering {
            Staggering::Center => [x, y],
            Staggering::FaceX => [x - 0.5 * self.delta[0], y],
            Staggering::FaceY => [x, y - 0.5 * self.delta[1]],
        }
    }
}

/// Local piece of the global grid on which a variable is defined.
#[derive(Clone, Debug, PartialEq)]
pub struct Grid {
    staggering: Staggering,
    global: GlobalGrid,
    /// Global index of local `[0, 0]`
    offset: [usize; 2],
    /// Owned shape
    shape: Shape,
}

impl Grid {
    /// Part of `global` owned by a rank with the given partition limits.
    pub fn local(global: GlobalGrid, staggering: Staggering, limits: &PartitionLimits) -> Self {
        let [x, y] = limits.owned(staggering, global.extent());
        Grid {
            staggering,
            global,
            offset: [x.start, y.start],
            shape: Shape::new(x.n, y.n),
        }
    }

    /// The complete global grid, as held by the rank assembling output.
    pub fn whole(global: GlobalGrid, staggering: Staggering) -> Self {
        Grid {
            staggering,
            global,
            offset: [0, 0],
            shape: global.shape(staggering),
        }
    }

    pub fn staggering(&self) -> Staggering {
        self.staggering
    }

    pub fn global(&self) -> &GlobalGrid {
        &self.global
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn offset(&self) -> [usize; 2] {
        self.offset
    }

    /// Global index of local index `[i, j]`.
    pub fn to_global(&self, i: usize, j: usize) -> [usize; 2] {
        [self.offset[0] + i, self.offset[1] + j]
    }

    /// Local index of global index `[i, j]` if it is owned.
    pub fn to_local(&self, i: usize, j: usize) -> Option<[usize; 2]> {
        let li = i.checked_sub(self.offset[0])?;
        let lj = j.checked_sub(self.offset[1])?;
        (li < self.shape.nx() && lj < self.shape.ny()).then_some([li, lj])
    }

    /// Whether the owned block touches the global domain boundary in direction `dir`.
    pub fn touches_boundary(&self, dir: Direction) -> bool {
        let global = self.global.shape(self.staggering);
        match dir {
            Direction::Left => self.offset[0] == 0,
            Direction::Down => self.offset[1] == 0,
            Direction::Right => self.offset[0] + self.shape.nx() == global.nx(),
            Direction::Up => self.offset[1] + self.shape.ny() == global.ny(),
        }
    }
}

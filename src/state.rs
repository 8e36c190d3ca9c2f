//! Model state of one rank: the prognostic variables and the interpolated depth.
use std::ops::{Index, IndexMut};
use std::rc::Rc;

use fixed_map::Key;

use crate::grid::{GlobalGrid, Grid, Staggering};
use crate::partition::PartitionLimits;
use crate::variable::Var;

/// Variables of the shallow water model.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Key)]
pub enum SWMVars {
    /// interface displacement
    ETA,
    /// velocity along x-direction
    U,
    /// velocity along y-direction
    V,
    /// depth interpolated to cell centres
    H,
}

impl SWMVars {
    pub fn staggering(self) -> Staggering {
        match self {
            SWMVars::ETA | SWMVars::H => Staggering::Center,
            SWMVars::U => Staggering::FaceX,
            SWMVars::V => Staggering::FaceY,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SWMVars::ETA => "water elevation",
            SWMVars::U => "x velocity",
            SWMVars::V => "y velocity",
            SWMVars::H => "depth",
        }
    }
}

/// All variables of one partition.
///
/// Variables are reachable by key through indexing, or as disjoint fields when
/// a kernel needs to write one variable while reading others.
#[derive(Debug)]
pub struct State {
    pub eta: Var,
    pub u: Var,
    pub v: Var,
    pub h: Var,
}

impl State {
    /// Zero state on the partition described by `limits`.
    pub fn new(global: GlobalGrid, limits: &PartitionLimits) -> Self {
        let center = Rc::new(Grid::local(global, Staggering::Center, limits));
        let face_x = Rc::new(Grid::local(global, Staggering::FaceX, limits));
        let face_y = Rc::new(Grid::local(global, Staggering::FaceY, limits));
        State {
            eta: Var::zeros(&center),
            u: Var::zeros(&face_x),
            v: Var::zeros(&face_y),
            h: Var::zeros(&center),
        }
    }

    pub fn get_grid(&self, var: SWMVars) -> &Rc<Grid> {
        self[var].get_grid()
    }
}

impl Index<SWMVars> for State {
    type Output = Var;

    fn index(&self, index: SWMVars) -> &Self::Output {
        match index {
            SWMVars::ETA => &self.eta,
            SWMVars::U => &self.u,
            SWMVars::V => &self.v,
            SWMVars::H => &self.h,
        }
    }
}

impl IndexMut<SWMVars> for State {
    fn index_mut(&mut self, index: SWMVars) -> &mut Self::Output {
        match index {
            SWMVars::ETA => &mut self.eta,
            SWMVars::U => &mut self.u,
            SWMVars::V => &mut self.v,
            SWMVars::H => &mut self.h,
        }
    }
}

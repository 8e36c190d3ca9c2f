//! Provides variables, i.e. [`Fields`](`Field`) holding the actual data together with a [`Grid`] containing meta-data.
use std::rc::Rc;

use crate::field::{Arr2D, Field};
use crate::grid::Grid;

/// A variable consists of a data field with a ghost border and the local grid it is defined on.
#[derive(Debug, Clone)]
pub struct Var {
    data: Arr2D<f64>,
    grid: Rc<Grid>,
}

impl Var {
    /// Construct a variable defined on `grid` with zeroed out data.
    pub fn zeros(grid: &Rc<Grid>) -> Self {
        Self {
            data: Arr2D::with_ghosts(0f64, grid.shape()),
            grid: Rc::clone(grid),
        }
    }

    /// Borrow the data field
    pub fn get_data(&self) -> &Arr2D<f64> {
        &self.data
    }

    /// Mutably borrow reference to the data field
    pub fn get_data_mut(&mut self) -> &mut Arr2D<f64> {
        &mut self.data
    }

    /// Return a reference to the grid on which the variable is defined
    pub fn get_grid(&self) -> &Rc<Grid> {
        &self.grid
    }

    /// Set every owned point from a function of its global index.
    #[cfg(test)]
    pub fn fill_with<F>(&mut self, f: F)
    where
        F: Fn([usize; 2]) -> f64,
    {
        for idx in self.data.shape() {
            self.data[idx] = f(self.grid.to_global(idx[0], idx[1]));
        }
    }
}

//! Sampling of the raw depth field onto the elevation grid.
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::field::Field;
use crate::io::GridData;
use crate::variable::Var;

/// Interpolation policy for the depth field.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    /// Value of the cell containing the point.
    Nearest,
    /// Weighted mean of the four surrounding cells.
    #[default]
    Bilinear,
}

impl Interpolation {
    /// Depth at physical position `(x, y)`.
    pub fn eval(self, depth: &GridData, x: f64, y: f64) -> f64 {
        match self {
            Interpolation::Nearest => nearest(depth, x, y),
            Interpolation::Bilinear => bilinear(depth, x, y),
        }
    }
}

/// Index of the cell containing `pos` along an axis of `n` cells, clamped to the field.
fn cell_index(pos: f64, delta: f64, n: usize) -> usize {
    let idx = (pos / delta).floor();
    if idx <= 0.0 {
        0
    } else {
        (idx as usize).min(n - 1)
    }
}

fn nearest(depth: &GridData, x: f64, y: f64) -> f64 {
    let shape = depth.values.shape();
    let i = cell_index(x, depth.dx, shape.nx());
    let j = cell_index(y, depth.dy, shape.ny());
    depth.values[[i, j]]
}

fn bilinear(depth: &GridData, x: f64, y: f64) -> f64 {
    let shape = depth.values.shape();
    let (fi, fj) = ((x / depth.dx).floor(), (y / depth.dy).floor());
    // no upper neighbour to weigh against
    if fi < 0.0 || fj < 0.0 || fi >= (shape.nx() - 1) as f64 || fj >= (shape.ny() - 1) as f64 {
        return nearest(depth, x, y);
    }
    let (i, j) = (fi as usize, fj as usize);

    let (x1, x2) = (i as f64 * depth.dx, (i + 1) as f64 * depth.dx);
    let (y1, y2) = (j as f64 * depth.dy, (j + 1) as f64 * depth.dy);
    let wx = (x2 - x) / (x2 - x1);
    let wy = (y2 - y) / (y2 - y1);

    let h = &depth.values;
    wx * wy * h[[i, j]]
        + (1.0 - wx) * wy * h[[i + 1, j]]
        + wx * (1.0 - wy) * h[[i, j + 1]]
        + (1.0 - wx) * (1.0 - wy) * h[[i + 1, j + 1]]
}

/// Fill the owned part of `h` with the depth sampled at the cell centres.
pub fn interpolate_depth(depth: &GridData, method: Interpolation, h: &mut Var) {
    let grid = h.get_grid();
    let global = *grid.global();
    let staggering = grid.staggering();
    let [ox, oy] = grid.offset();

    h.get_data_mut().par_rows_mut().for_each(|(j, row)| {
        for (i, val) in row.iter_mut().enumerate() {
            let [x, y] = global.coord(staggering, ox + i, oy + j);
            *val = method.eval(depth, x, y);
        }
    });
}

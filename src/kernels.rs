//! Explicit update of elevation and velocities over the owned cells.
//!
//! Both kernels read ghost cells filled by the halo exchange and write owned
//! cells only. Rows are distributed over the rayon thread pool.
use rayon::prelude::*;

use crate::config::Parameters;
use crate::state::State;
use crate::topology::Direction;

/// Advance the elevation by one step from the divergence of the transport.
///
/// Needs up to date ghosts of `u` on the right and of `v` on the top.
pub fn update_eta(params: &Parameters, state: &mut State) {
    let (dt, dx, dy) = (params.dt, params.dx, params.dy);
    let State { eta, u, v, h } = state;
    let (u, v, h) = (u.get_data(), v.get_data(), h.get_data());

    eta.get_data_mut().par_rows_mut().for_each(|(j, row)| {
        let j = j as isize;
        for (i, eta) in row.iter_mut().enumerate() {
            let i = i as isize;
            let c1 = dt * h.at(i, j);
            *eta = *eta
                - c1 / dx * (u.at(i + 1, j) - u.at(i, j))
                - c1 / dy * (v.at(i, j + 1) - v.at(i, j));
        }
    });
}

/// Advance both velocity components by one step from the elevation gradient and friction.
///
/// Needs up to date ghosts of `eta` on the left and on the bottom. Faces on the
/// left and bottom rim of the domain take the one-sided difference, which
/// reuses the boundary cell. The closing faces `i = nx` and `j = ny` are not
/// updated.
pub fn update_velocities(params: &Parameters, state: &mut State) {
    let c1 = params.dt * params.g;
    let c2 = params.dt * params.gamma;
    let (dx, dy) = (params.dx, params.dy);

    let eta_grid = state.eta.get_grid().clone();
    let (nx, ny) = (eta_grid.shape().nx(), eta_grid.shape().ny());
    let at_left = eta_grid.touches_boundary(Direction::Left);
    let at_bottom = eta_grid.touches_boundary(Direction::Down);

    let State { eta, u, v, .. } = state;
    let eta = eta.get_data();

    u.get_data_mut().par_rows_mut().for_each(|(j, row)| {
        let j = j as isize;
        for (i, u) in row.iter_mut().take(nx).enumerate() {
            let i = i as isize;
            let eta_im = if i == 0 && at_left {
                eta.at(0, j)
            } else {
                eta.at(i - 1, j)
            };
            *u = (1.0 - c2) * *u - c1 / dx * (eta.at(i, j) - eta_im);
        }
    });

    v.get_data_mut()
        .par_rows_mut()
        .take(ny)
        .for_each(|(j, row)| {
            let j = j as isize;
            for (i, v) in row.iter_mut().enumerate() {
                let i = i as isize;
                let eta_jm = if j == 0 && at_bottom {
                    eta.at(i, 0)
                } else {
                    eta.at(i, j - 1)
                };
                *v = (1.0 - c2) * *v - c1 / dy * (eta.at(i, j) - eta_jm);
            }
        });
}

//! Forcing and boundary conditions.
//!
//! Every condition acts on global edges or on a global cell. A partition applies
//! only the part it owns, so the combined effect does not depend on the number
//! of ranks.
use std::f64::consts::PI;

use crate::config::Parameters;
use crate::error::{Error, Result};
use crate::field::{Arr2D, Field};
use crate::state::State;
use crate::topology::Direction;

/// Amplitude of the sinusoidal forcing.
pub const FORCING_AMPLITUDE: f64 = 5.0;
/// Frequency of the sinusoidal forcing.
pub const FORCING_FREQUENCY: f64 = 1.0 / 20.0;

/// Forcing signal at time `t`.
pub fn forcing(t: f64) -> f64 {
    FORCING_AMPLITUDE * (2.0 * PI * FORCING_FREQUENCY * t).sin()
}

/// Wave source of a run, `source_type` in the parameters.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SourceType {
    /// 1: oscillating `v` on the top face of the domain.
    TopVelocity,
    /// 2: oscillating elevation in the centre cell of the domain.
    PointSource,
}

impl SourceType {
    /// Boundary condition used with this source unless configured otherwise.
    pub fn default_boundary(self) -> BoundaryType {
        match self {
            SourceType::TopVelocity => BoundaryType::Reflective,
            SourceType::PointSource => BoundaryType::Radiating,
        }
    }
}

impl TryFrom<i64> for SourceType {
    type Error = Error;

    fn try_from(code: i64) -> Result<Self> {
        match code {
            1 => Ok(SourceType::TopVelocity),
            2 => Ok(SourceType::PointSource),
            _ => Err(Error::config(format!("unknown source type {}", code))),
        }
    }
}

/// Condition on the rim of the domain, `boundary_type` in the parameters.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BoundaryType {
    /// 1: no normal flow through the left, right and bottom edges.
    Reflective,
    /// 2: outgoing waves leave through all four edges.
    Radiating,
}

impl TryFrom<i64> for BoundaryType {
    type Error = Error;

    fn try_from(code: i64) -> Result<Self> {
        match code {
            1 => Ok(BoundaryType::Reflective),
            2 => Ok(BoundaryType::Radiating),
            _ => Err(Error::config(format!("unknown boundary type {}", code))),
        }
    }
}

/// Apply source and boundary condition for time step `step`.
///
/// A point source is injected before the boundary pass, the top face forcing after it.
pub fn apply(
    step: usize,
    params: &Parameters,
    source: SourceType,
    boundary: BoundaryType,
    state: &mut State,
) {
    let t = step as f64 * params.dt;
    if source == SourceType::PointSource {
        point_source(t, state);
    }
    match boundary {
        BoundaryType::Reflective => reflective(state),
        BoundaryType::Radiating => radiating(params, state),
    }
    if source == SourceType::TopVelocity {
        top_velocity(t, state);
    }
}

fn point_source(t: f64, state: &mut State) {
    let extent = state.eta.get_grid().global().extent();
    let (ci, cj) = (extent.nx() / 2, extent.ny() / 2);
    if let Some(idx) = state.eta.get_grid().to_local(ci, cj) {
        state.eta.get_data_mut()[idx] = forcing(t);
    }
}

fn top_velocity(t: f64, state: &mut State) {
    if !state.v.get_grid().touches_boundary(Direction::Up) {
        return;
    }
    let v = state.v.get_data_mut();
    let shape = v.shape();
    let top = vec![forcing(t); shape.nx()];
    v.set_row(shape.ny() as isize - 1, &top);
}

fn reflective(state: &mut State) {
    let u_grid = state.u.get_grid().clone();
    let u = state.u.get_data_mut();
    let ny = u.shape().ny();
    if u_grid.touches_boundary(Direction::Left) {
        u.set_column(0, &vec![0.0; ny]);
    }
    if u_grid.touches_boundary(Direction::Right) {
        u.set_column(u.shape().nx() as isize - 1, &vec![0.0; ny]);
    }

    if state.v.get_grid().touches_boundary(Direction::Down) {
        let v = state.v.get_data_mut();
        v.set_row(0, &vec![0.0; v.shape().nx()]);
    }
}

/// Relax `q` on the boundary line toward its inner neighbour.
///
/// `boundary` and `inner` are local `[i, j]` of the two points, `courant` is
/// `c·dt/d`. On the low side the difference is taken inward, on the high side
/// outward.
#[inline]
fn relax(q: &mut Arr2D<f64>, boundary: [usize; 2], inner: [usize; 2], courant: f64, high: bool) {
    let (qb, qi) = (q[boundary], q[inner]);
    q[boundary] = if high {
        qi - courant * (qb - qi)
    } else {
        qi - courant * (qi - qb)
    };
}

fn radiating(params: &Parameters, state: &mut State) {
    let grid = state.eta.get_grid().clone();
    let extent = grid.global().extent();
    let shape = grid.shape();
    let (nx, ny) = (shape.nx(), shape.ny());
    let State { eta, u, v, h } = state;
    let h = h.get_data();
    let (eta, u, v) = (eta.get_data_mut(), u.get_data_mut(), v.get_data_mut());
    let wave_speed = |depth: f64| (params.g * depth).sqrt();

    if extent.ny() >= 2 {
        let (bottom, top) = (
            grid.touches_boundary(Direction::Down),
            grid.touches_boundary(Direction::Up),
        );
        for i in 0..nx {
            if bottom {
                let k = wave_speed(h[[i, 0]]) * params.dt / params.dy;
                for q in [&mut *eta, &mut *u, &mut *v] {
                    relax(q, [i, 0], [i, 1], k, false);
                }
            }
            if top {
                let k = wave_speed(h[[i, ny - 1]]) * params.dt / params.dy;
                for q in [&mut *eta, &mut *u, &mut *v] {
                    relax(q, [i, ny - 1], [i, ny - 2], k, true);
                }
            }
        }
    }

    if extent.nx() >= 2 {
        let (left, right) = (
            grid.touches_boundary(Direction::Left),
            grid.touches_boundary(Direction::Right),
        );
        for j in 0..ny {
            if left {
                let k = wave_speed(h[[0, j]]) * params.dt / params.dx;
                for q in [&mut *eta, &mut *u, &mut *v] {
                    relax(q, [0, j], [1, j], k, false);
                }
            }
            if right {
                let k = wave_speed(h[[nx - 1, j]]) * params.dt / params.dx;
                for q in [&mut *eta, &mut *u, &mut *v] {
                    relax(q, [nx - 1, j], [nx - 2, j], k, true);
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use approx::assert_relative_eq;

    use super::*;
    use crate::field::Shape;
    use crate::grid::GlobalGrid;
    use crate::partition::Decomposition;

    fn params(source_type: i64) -> Parameters {
        Parameters {
            dx: 1.0,
            dy: 1.0,
            dt: 0.1,
            max_t: 1.0,
            g: 10.0,
            gamma: 0.0,
            source_type,
            boundary_type: None,
            sampling_rate: 0,
            input_h_filename: "h.bin".into(),
            output_eta_filename: "eta.bin".into(),
            output_u_filename: None,
            output_v_filename: None,
            interpolation: Default::default(),
            process_grid: None,
            initial_eta_filename: None,
        }
    }

    fn state(rank: usize, dims: [usize; 2]) -> State {
        let global = GlobalGrid::new(Shape::new(6, 6), 1.0, 1.0);
        let decomp = Decomposition::new(global.extent(), dims).unwrap();
        let mut state = State::new(global, decomp.limits(rank));
        state.h.fill_with(|_| 10.0);
        state
    }

    #[test]
    fn forcing_starts_at_zero() {
        assert_eq!(forcing(0.0), 0.0);
        assert_relative_eq!(forcing(5.0), FORCING_AMPLITUDE, epsilon = 1e-12);
    }

    #[test]
    fn codes_map_to_conditions() {
        assert_eq!(SourceType::try_from(1).unwrap(), SourceType::TopVelocity);
        assert!(matches!(SourceType::try_from(0), Err(Error::Config(_))));
        assert!(matches!(BoundaryType::try_from(7), Err(Error::Config(_))));
        assert_eq!(
            SourceType::PointSource.default_boundary(),
            BoundaryType::Radiating
        );
    }

    #[test]
    fn point_source_sets_the_centre_cell() {
        let p = params(2);
        // 2x2 process grid, the centre cell (3, 3) lies on rank 3
        let mut owner = state(3, [2, 2]);
        let mut other = state(0, [2, 2]);
        apply(50, &p, SourceType::PointSource, BoundaryType::Reflective, &mut owner);
        apply(50, &p, SourceType::PointSource, BoundaryType::Reflective, &mut other);

        assert_relative_eq!(owner.eta.get_data()[[0, 0]], forcing(5.0));
        assert!(other.eta.get_data().as_slice().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn top_velocity_forces_the_closing_face_only() {
        let p = params(1);
        let mut top = state(1, [2, 1]);
        let mut bottom = state(0, [2, 1]);
        apply(50, &p, SourceType::TopVelocity, BoundaryType::Reflective, &mut top);
        apply(50, &p, SourceType::TopVelocity, BoundaryType::Reflective, &mut bottom);

        let v = top.v.get_data();
        assert_eq!(v.shape(), Shape::new(6, 4));
        assert!(v.row(3).iter().all(|&x| x == forcing(5.0)));
        assert!(v.row(2).iter().all(|&x| x == 0.0));
        assert!(bottom.v.get_data().owned_to_vec().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn reflective_clears_normal_velocity() {
        let p = params(1);
        let mut s = state(0, [1, 1]);
        s.u.fill_with(|_| 1.0);
        s.v.fill_with(|_| 1.0);
        apply(0, &p, SourceType::TopVelocity, BoundaryType::Reflective, &mut s);

        let (u, v) = (s.u.get_data(), s.v.get_data());
        assert!(u.column(0).iter().all(|&x| x == 0.0));
        assert!(u.column(6).iter().all(|&x| x == 0.0));
        assert!(u.column(3).iter().all(|&x| x == 1.0));
        assert!(v.row(0).iter().all(|&x| x == 0.0));
        // forcing at t = 0
        assert!(v.row(6).iter().all(|&x| x == 0.0));
        assert!(v.row(3).iter().all(|&x| x == 1.0));
    }

    #[test]
    fn radiating_relaxes_toward_the_interior() {
        let p = params(2);
        let mut s = state(0, [1, 1]);
        s.eta.fill_with(|[i, j]| if j == 1 && i == 2 { 1.0 } else { 0.0 });
        radiating(&p, &mut s);

        // c = 10, k = c dt / dy = 1
        let eta = s.eta.get_data();
        assert_relative_eq!(eta[[2, 0]], 1.0 - 1.0 * (1.0 - 0.0));
        let mut s = state(0, [1, 1]);
        s.eta.fill_with(|[i, j]| if j == 4 && i == 2 { 1.0 } else { 0.0 });
        radiating(&p, &mut s);
        assert_relative_eq!(s.eta.get_data()[[2, 5]], 1.0 - 1.0 * (0.0 - 1.0));
    }

    #[test]
    fn radiating_on_interior_partitions_is_a_no_op() {
        let p = params(2);
        let global = GlobalGrid::new(Shape::new(9, 9), 1.0, 1.0);
        let decomp = Decomposition::new(global.extent(), [3, 3]).unwrap();
        let mut s = State::new(global, decomp.limits(4));
        s.h.fill_with(|_| 10.0);
        s.eta.fill_with(|[i, j]| (i + j) as f64);
        let before = s.eta.get_data().clone();
        radiating(&p, &mut s);
        assert_eq!(s.eta.get_data(), &before);
    }
}

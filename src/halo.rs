//! Exchange of the ghost border between neighbouring partitions.
//!
//! A field is exchanged in four shifts, always in the same order on every rank:
//! toward right, toward left, toward up, toward down. In the shift toward
//! direction `d` each rank sends its outermost owned line on side `d` to the
//! neighbour in `d` and receives the ghost line on the opposite side from the
//! neighbour there. Ghost lines on the global rim are never written.

use crate::comm::{Communicator, Tag};
use crate::error::Result;
use crate::field::{Arr2D, Field};
use crate::topology::{Axis, Direction, Topology};
use crate::variable::Var;

const SHIFT_ORDER: [Direction; 4] = [
    Direction::Right,
    Direction::Left,
    Direction::Up,
    Direction::Down,
];

/// Refresh the ghost border of `var` from the neighbouring partitions.
pub fn exchange<C: Communicator>(comm: &C, topology: &Topology, var: &mut Var) -> Result<()> {
    let data = var.get_data_mut();
    for dir in SHIFT_ORDER {
        shift(comm, topology, data, dir)?;
    }
    Ok(())
}

/// Index of the owned line on side `dir` and of the ghost line beyond it.
fn edge_lines(data: &Arr2D<f64>, dir: Direction) -> (isize, isize) {
    let shape = data.shape();
    match dir {
        Direction::Left => (0, -1),
        Direction::Down => (0, -1),
        Direction::Right => {
            let n = shape.nx() as isize;
            (n - 1, n)
        }
        Direction::Up => {
            let n = shape.ny() as isize;
            (n - 1, n)
        }
    }
}

fn read_line(data: &Arr2D<f64>, dir: Direction, idx: isize) -> Vec<f64> {
    match dir.axis() {
        Axis::X => data.column(idx),
        Axis::Y => data.row(idx),
    }
}

fn write_line(data: &mut Arr2D<f64>, dir: Direction, idx: isize, values: &[f64]) {
    match dir.axis() {
        Axis::X => data.set_column(idx, values),
        Axis::Y => data.set_row(idx, values),
    }
}

fn shift<C: Communicator>(
    comm: &C,
    topology: &Topology,
    data: &mut Arr2D<f64>,
    dir: Direction,
) -> Result<()> {
    let dest = topology.neighbor(dir);
    let source = topology.neighbor(dir.opposite());
    if dest.is_none() && source.is_none() {
        return Ok(());
    }

    let send = match dest {
        Some(_) => read_line(data, dir, edge_lines(data, dir).0),
        None => Vec::new(),
    };
    let len = match dir.axis() {
        Axis::X => data.shape().ny(),
        Axis::Y => data.shape().nx(),
    };
    let mut recv = match source {
        Some(_) => vec![0f64; len],
        None => Vec::new(),
    };

    comm.shift(Tag::Halo(dir), dest, &send, source, &mut recv)?;

    if source.is_some() {
        let ghost = edge_lines(data, dir.opposite()).1;
        write_line(data, dir, ghost, &recv);
    }
    Ok(())
}

//! Assembly of global fields on the root rank and distribution of global fields
//! to all ranks.
//!
//! Each rank contributes its owned block in i-fastest order. The blocks are
//! concatenated in rank order, then copied to their place in the global field.
use fixed_map::Map;

use crate::comm::{Communicator, Rank};
use crate::error::{Error, Result};
use crate::field::{Arr2D, Field, Shape};
use crate::grid::Staggering;
use crate::partition::{Decomposition, Limit};
use crate::variable::Var;

/// Counts and displacements of the blocks of all ranks for one staggering.
#[derive(Clone, Debug, PartialEq)]
pub struct GatherPlan {
    global: Shape,
    blocks: Vec<[Limit; 2]>,
    counts: Vec<usize>,
    displs: Vec<usize>,
}

impl GatherPlan {
    pub fn new(decomp: &Decomposition, staggering: Staggering) -> Self {
        let extent = decomp.extent();
        let global = match staggering {
            Staggering::Center => extent,
            Staggering::FaceX => Shape::new(extent.nx() + 1, extent.ny()),
            Staggering::FaceY => Shape::new(extent.nx(), extent.ny() + 1),
        };
        let blocks: Vec<[Limit; 2]> = decomp
            .iter()
            .map(|limits| limits.owned(staggering, extent))
            .collect();
        let counts: Vec<usize> = blocks.iter().map(|[x, y]| x.n * y.n).collect();
        let displs = counts
            .iter()
            .scan(0, |offset, &n| {
                let displ = *offset;
                *offset += n;
                Some(displ)
            })
            .collect();
        GatherPlan {
            global,
            blocks,
            counts,
            displs,
        }
    }

    /// Shape of the assembled field.
    pub fn global_shape(&self) -> Shape {
        self.global
    }

    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    pub fn displs(&self) -> &[usize] {
        &self.displs
    }

    /// Total number of values, equal to the size of the global field.
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    /// Build the global field from the blocks of all ranks, concatenated in rank order.
    pub fn assemble(&self, blocked: &[f64]) -> Arr2D<f64> {
        let mut global = Arr2D::full(0f64, self.global);
        for (rank, [x, y]) in self.blocks.iter().enumerate() {
            let block = &blocked[self.displs[rank]..self.displs[rank] + self.counts[rank]];
            for (k, &val) in block.iter().enumerate() {
                global[[x.start + k % x.n, y.start + k / x.n]] = val;
            }
        }
        global
    }

    /// Inverse of [`GatherPlan::assemble`].
    pub fn disassemble(&self, global: &Arr2D<f64>) -> Vec<f64> {
        let mut blocked = Vec::with_capacity(self.total());
        for [x, y] in self.blocks.iter() {
            for j in y.start..y.end {
                for i in x.start..x.end {
                    blocked.push(global[[i, j]]);
                }
            }
        }
        blocked
    }

    /// Collect `var` from all ranks. Returns the global field on `root`, `None` elsewhere.
    pub fn gather<C: Communicator>(
        &self,
        comm: &C,
        root: Rank,
        var: &Var,
    ) -> Result<Option<Arr2D<f64>>> {
        let send = var.get_data().owned_to_vec();
        if comm.rank() != root {
            comm.gather_varcount(root, &send, &mut [], &self.counts, &self.displs)?;
            return Ok(None);
        }
        let mut blocked = vec![0f64; self.total()];
        comm.gather_varcount(root, &send, &mut blocked, &self.counts, &self.displs)?;
        Ok(Some(self.assemble(&blocked)))
    }

    /// Distribute a global field held by `root` into the owned part of `var` on every rank.
    ///
    /// `global` is only read on `root`, where it must be present.
    pub fn scatter<C: Communicator>(
        &self,
        comm: &C,
        root: Rank,
        global: Option<&Arr2D<f64>>,
        var: &mut Var,
    ) -> Result<()> {
        let send = if comm.rank() == root {
            let global = global
                .ok_or_else(|| Error::partition("no global field to scatter on the root rank"))?;
            if global.shape() != self.global {
                return Err(Error::partition(format!(
                    "cannot scatter a {}x{} field onto a {}x{} grid",
                    global.shape().nx(),
                    global.shape().ny(),
                    self.global.nx(),
                    self.global.ny()
                )));
            }
            self.disassemble(global)
        } else {
            Vec::new()
        };
        let mut recv = vec![0f64; var.get_data().shape().size()];
        comm.scatter_varcount(root, &send, &self.counts, &self.displs, &mut recv)?;
        var.get_data_mut().fill_owned(&recv);
        Ok(())
    }
}

/// Gather plans for all staggerings.
pub fn plans(decomp: &Decomposition) -> Map<Staggering, GatherPlan> {
    let mut plans = Map::new();
    for staggering in [Staggering::Center, Staggering::FaceX, Staggering::FaceY] {
        plans.insert(staggering, GatherPlan::new(decomp, staggering));
    }
    plans
}

#[cfg(test)]
mod test {
    use std::rc::Rc;

    use proptest::prelude::*;

    use super::{plans, GatherPlan};
    use crate::comm::{launch, Communicator, ROOT};
    use crate::error::Error;
    use crate::field::{Arr2D, Field, Shape};
    use crate::grid::{GlobalGrid, Grid, Staggering};
    use crate::partition::Decomposition;
    use crate::variable::Var;

    fn numbered(shape: Shape) -> Arr2D<f64> {
        let values = shape.iter().map(|[i, j]| (100 * j + i) as f64).collect();
        Arr2D::from_vec(shape, values).unwrap()
    }

    #[test]
    fn displacements_are_prefix_sums() {
        let decomp = Decomposition::new(Shape::new(5, 4), [2, 2]).unwrap();
        let plan = GatherPlan::new(&decomp, Staggering::FaceX);
        // x split 2 | 3 (+1 closing face on the right), y split 2 | 2
        assert_eq!(plan.counts(), &[4, 8, 4, 8]);
        assert_eq!(plan.displs(), &[0, 4, 12, 16]);
        assert_eq!(plan.total(), 6 * 4);
        assert_eq!(plan.global_shape(), Shape::new(6, 4));
    }

    #[test]
    fn scatter_then_gather_reproduces_the_field() {
        let global = GlobalGrid::new(Shape::new(7, 6), 1.0, 1.0);
        let dims = [2, 3];
        let results = launch(6, |comm| {
            let decomp = Decomposition::new(global.extent(), dims).unwrap();
            let plans = plans(&decomp);
            let mut out = Vec::new();
            for staggering in [Staggering::Center, Staggering::FaceX, Staggering::FaceY] {
                let plan = plans.get(staggering).unwrap();
                let grid = Rc::new(Grid::local(global, staggering, decomp.limits(comm.rank())));
                let mut var = Var::zeros(&grid);
                let field = numbered(plan.global_shape());
                let source = comm.is_root().then_some(&field);
                plan.scatter(&comm, ROOT, source, &mut var).unwrap();

                // every rank received exactly its block
                let mut expected = Var::zeros(&grid);
                expected.fill_with(|[i, j]| (100 * j + i) as f64);
                assert_eq!(var.get_data(), expected.get_data());

                let gathered = plan.gather(&comm, ROOT, &var).unwrap();
                out.push((gathered, field));
            }
            out
        });
        for (rank, out) in results.into_iter().enumerate() {
            for (gathered, field) in out {
                if rank == ROOT {
                    assert_eq!(gathered, Some(field));
                } else {
                    assert_eq!(gathered, None);
                }
            }
        }
    }

    #[test]
    fn scatter_checks_the_global_shape() {
        let global = GlobalGrid::new(Shape::new(4, 4), 1.0, 1.0);
        let decomp = Decomposition::new(global.extent(), [1, 1]).unwrap();
        let plan = GatherPlan::new(&decomp, Staggering::Center);
        let grid = Rc::new(Grid::local(global, Staggering::Center, decomp.limits(0)));
        let mut var = Var::zeros(&grid);
        let comm = crate::comm::LocalComm::world(1).remove(0);

        let wrong = Arr2D::full(0f64, [3, 4]);
        let err = plan.scatter(&comm, ROOT, Some(&wrong), &mut var).unwrap_err();
        assert!(matches!(err, Error::Partition(_)));
        let err = plan.scatter(&comm, ROOT, None, &mut var).unwrap_err();
        assert!(matches!(err, Error::Partition(_)));
    }

    proptest! {
        #[test]
        fn assemble_inverts_disassemble(
            nx in 2usize..30,
            ny in 2usize..30,
            rows in 1usize..4,
            cols in 1usize..4,
        ) {
            prop_assume!(rows == 1 || ny >= 2 * rows);
            prop_assume!(cols == 1 || nx >= 2 * cols);
            let decomp = Decomposition::new(Shape::new(nx, ny), [rows, cols]).unwrap();
            for (_, plan) in plans(&decomp).iter() {
                prop_assert_eq!(plan.total(), plan.global_shape().size());
                let field = numbered(plan.global_shape());
                prop_assert_eq!(plan.assemble(&plan.disassemble(&field)), field);
            }
        }
    }
}

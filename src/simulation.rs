//! The simulation context of one rank and the time stepping loop.
//!
//! Every rank builds a [`Simulation`] from the same parameters and advances it in
//! lock step with all other ranks. One step consists of
//!
//! 1. gathering and writing the snapshot, if the step is sampled,
//! 2. applying source and boundary condition,
//! 3. exchanging the halos of `u` and `v`,
//! 4. updating the elevation,
//! 5. exchanging the halo of `eta`,
//! 6. updating the velocities.
//!
//! The result does not depend on the number of ranks.
use std::time::{Duration, Instant};

use fixed_map::Map;

use crate::boundary::{self, BoundaryType, SourceType};
use crate::comm::{Communicator, ROOT};
use crate::config::Parameters;
use crate::error::{CommError, Error, Result};
use crate::field::Arr2D;
use crate::gather::{self, GatherPlan};
use crate::grid::{GlobalGrid, Staggering};
use crate::halo;
use crate::interp;
use crate::io::{self, GridData, RunInfo, SnapshotSink};
use crate::kernels;
use crate::partition::Decomposition;
use crate::state::{SWMVars, State};
use crate::topology::Topology;

/// Throughput figures of a completed run.
#[derive(Copy, Clone, Debug)]
pub struct RunSummary {
    pub steps: usize,
    pub elapsed: Duration,
    /// million cell updates per second over the global grid
    pub mupdates_per_second: f64,
}

/// Everything one rank needs to advance the model.
pub struct Simulation<'c, C: Communicator> {
    comm: &'c C,
    params: Parameters,
    source: SourceType,
    boundary: BoundaryType,
    topology: Topology,
    global: GlobalGrid,
    state: State,
    plans: Map<Staggering, GatherPlan>,
    outputs: Vec<SWMVars>,
    nt: usize,
}

/// Run `load` on the root rank and hand the result to every rank.
///
/// If loading fails on the root, the root returns its error and all other ranks
/// report that the root aborted.
fn load_on_root<C: Communicator>(
    comm: &C,
    load: impl FnOnce() -> Result<GridData>,
) -> Result<GridData> {
    if comm.is_root() {
        let loaded = load();
        let mut msg = match &loaded {
            Ok(field) => field.to_message(),
            Err(_) => Vec::new(),
        };
        comm.broadcast(ROOT, &mut msg)?;
        return loaded;
    }
    let mut msg = Vec::new();
    comm.broadcast(ROOT, &mut msg)?;
    GridData::from_message(msg).ok_or(Error::Comm(CommError::Aborted { peer: ROOT }))
}

impl<'c, C: Communicator> Simulation<'c, C> {
    /// Set up a run: the root reads the depth (and initial elevation) files.
    pub fn new(params: Parameters, comm: &'c C) -> Result<Self> {
        params.validate()?;
        let depth = load_on_root(comm, || io::read_field(&params.input_h_filename))?;
        let initial_eta = params.initial_eta_filename.clone();

        let mut sim = Self::with_depth(params, comm, depth)?;
        if let Some(path) = initial_eta {
            let plan = sim.plan(Staggering::Center)?.clone();
            let load = || -> Result<Arr2D<f64>> {
                let field = io::read_field(&path)?;
                if field.shape() != plan.global_shape() {
                    return Err(Error::format(
                        &path,
                        format!(
                            "initial elevation is {}x{}, the grid is {}x{}",
                            field.shape().nx(),
                            field.shape().ny(),
                            plan.global_shape().nx(),
                            plan.global_shape().ny()
                        ),
                    ));
                }
                Ok(field.values)
            };
            let loaded = if comm.is_root() { Some(load()) } else { None };
            let failed = matches!(loaded, Some(Err(_)));
            if comm.all_reduce_sum(if failed { 1.0 } else { 0.0 })? > 0.0 {
                return Err(match loaded {
                    Some(Err(err)) => err,
                    _ => Error::Comm(CommError::Aborted { peer: ROOT }),
                });
            }
            let global = loaded.transpose()?;
            sim.set_initial_eta(global.as_ref())?;
        }
        Ok(sim)
    }

    /// Set up a run from a depth field that is already present on every rank.
    pub fn with_depth(params: Parameters, comm: &'c C, depth: GridData) -> Result<Self> {
        params.validate()?;
        let source = params.source()?;
        let boundary = params.boundary()?;

        let global = GlobalGrid::covering(depth.shape(), [depth.dx, depth.dy], params.dx, params.dy);
        let topology =
            Topology::for_extent(comm.size(), comm.rank(), global.extent(), params.process_grid)?;
        let decomposition = Decomposition::new(global.extent(), topology.dims())?;

        let mut state = State::new(global, decomposition.limits(comm.rank()));
        interp::interpolate_depth(&depth, params.interpolation, &mut state.h);

        let plans = gather::plans(&decomposition);
        let outputs = params.outputs().keys().collect();
        let nt = params.nt();

        let limits = decomposition.limits(comm.rank());
        log::debug!(
            "rank {} at {:?} owns x {}..{}, y {}..{}",
            comm.rank(),
            topology.coords(),
            limits.x.start,
            limits.x.end,
            limits.y.start,
            limits.y.end
        );

        Ok(Simulation {
            comm,
            params,
            source,
            boundary,
            topology,
            global,
            state,
            plans,
            outputs,
            nt,
        })
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// Number of time steps of the run.
    pub fn nt(&self) -> usize {
        self.nt
    }

    fn plan(&self, staggering: Staggering) -> Result<&GatherPlan> {
        self.plans
            .get(staggering)
            .ok_or_else(|| Error::partition(format!("no gather plan for {:?}", staggering)))
    }

    /// Scatter a global elevation from the root rank, `global` is ignored elsewhere.
    pub fn set_initial_eta(&mut self, global: Option<&Arr2D<f64>>) -> Result<()> {
        let plan = self.plan(Staggering::Center)?.clone();
        plan.scatter(self.comm, ROOT, global, &mut self.state.eta)
    }

    /// Assemble a variable on the root rank. Returns `None` on all other ranks.
    pub fn gather(&self, var: SWMVars) -> Result<Option<Arr2D<f64>>> {
        self.plan(var.staggering())?
            .gather(self.comm, ROOT, &self.state[var])
    }

    /// Water volume `Σ eta·dx·dy` over the whole domain, known on every rank.
    pub fn total_volume(&self) -> Result<f64> {
        let local: f64 = self.state.eta.get_data().owned_to_vec().iter().sum();
        let total = self.comm.all_reduce_sum(local)?;
        Ok(total * self.global.dx() * self.global.dy())
    }

    fn output(&self, step: usize, sink: &mut dyn SnapshotSink) -> Result<()> {
        let time = step as f64 * self.params.dt;
        for &var in self.outputs.iter() {
            if let Some(values) = self.gather(var)? {
                let field = GridData::new(values, self.global.dx(), self.global.dy());
                sink.write(var, step, time, &field)?;
            }
        }
        let volume = self.total_volume()?;
        if self.comm.is_root() {
            log::info!("step {} (t = {}): snapshot written, volume {:.6e}", step, time, volume);
        }
        Ok(())
    }

    /// Advance the model by step `n`.
    pub fn step(&mut self, n: usize, sink: &mut dyn SnapshotSink) -> Result<()> {
        let rate = self.params.sampling_rate;
        if rate > 0 && n % rate == 0 {
            self.output(n, sink)?;
        }

        boundary::apply(n, &self.params, self.source, self.boundary, &mut self.state);

        halo::exchange(self.comm, &self.topology, &mut self.state.u)?;
        halo::exchange(self.comm, &self.topology, &mut self.state.v)?;
        kernels::update_eta(&self.params, &mut self.state);

        halo::exchange(self.comm, &self.topology, &mut self.state.eta)?;
        kernels::update_velocities(&self.params, &mut self.state);
        Ok(())
    }

    /// Run all time steps. Snapshots and the manifest are handed to `sink` on the root rank.
    pub fn run(&mut self, sink: &mut dyn SnapshotSink) -> Result<RunSummary> {
        let is_root = self.comm.is_root();
        let extent = self.global.extent();
        if is_root {
            log::info!(
                "grid {}x{} (dx = {}, dy = {}) on {}x{} ranks, {} steps of dt = {}",
                extent.nx(),
                extent.ny(),
                self.global.dx(),
                self.global.dy(),
                self.topology.dims()[0],
                self.topology.dims()[1],
                self.nt,
                self.params.dt
            );
            log::info!(
                "source {:?}, boundary {:?}, snapshot every {} steps",
                self.source,
                self.boundary,
                self.params.sampling_rate
            );
        }

        let report_every = (self.nt / 10).max(1);
        let start = Instant::now();
        for n in 0..self.nt {
            if is_root && n > 0 && n % report_every == 0 {
                let elapsed = start.elapsed().as_secs_f64();
                let eta = elapsed / n as f64 * (self.nt - n) as f64;
                log::info!(
                    "step {} of {} ({}%), {:.1} s elapsed, {:.1} s remaining",
                    n,
                    self.nt,
                    100 * n / self.nt,
                    elapsed,
                    eta
                );
            }
            self.step(n, sink)?;
        }
        self.comm.barrier()?;
        let elapsed = start.elapsed();

        let updates = (extent.size() * self.nt) as f64;
        let mupdates_per_second = updates / elapsed.as_secs_f64().max(f64::MIN_POSITIVE) / 1e6;
        if is_root {
            sink.finish(&RunInfo {
                dt: self.params.dt,
                nt: self.nt,
                sampling_rate: self.params.sampling_rate,
            })?;
            log::info!(
                "done in {:.3} s, {:.2} MUpdates/s",
                elapsed.as_secs_f64(),
                mupdates_per_second
            );
        } else {
            log::debug!("rank {} done", self.comm.rank());
        }

        Ok(RunSummary {
            steps: self.nt,
            elapsed,
            mupdates_per_second,
        })
    }
}

/// Set up and run a simulation on this rank.
pub fn run<C: Communicator>(
    params: Parameters,
    comm: &C,
    sink: &mut dyn SnapshotSink,
) -> Result<RunSummary> {
    Simulation::new(params, comm)?.run(sink)
}

#[cfg(test)]
mod test {
    use approx::assert_relative_eq;

    use super::Simulation;
    use crate::boundary::forcing;
    use crate::comm::{launch, Communicator};
    use crate::config::Parameters;
    use crate::error::{CommError, Error, Result};
    use crate::field::{Arr2D, Field, Shape};
    use crate::io::{GridData, SnapshotSink};
    use crate::state::SWMVars;

    /// Keeps snapshots in memory.
    #[derive(Default)]
    struct MemorySink {
        snapshots: Vec<(SWMVars, usize, GridData)>,
    }

    impl SnapshotSink for MemorySink {
        fn write(&mut self, var: SWMVars, step: usize, _time: f64, field: &GridData) -> Result<()> {
            self.snapshots.push((var, step, field.clone()));
            Ok(())
        }
    }

    fn params(source_type: i64) -> Parameters {
        Parameters {
            dx: 2000.0,
            dy: 2000.0,
            dt: 5.0,
            max_t: 200.0,
            g: 9.81,
            gamma: 1e-4,
            source_type,
            boundary_type: None,
            sampling_rate: 0,
            input_h_filename: "unused.bin".into(),
            output_eta_filename: "eta.bin".into(),
            output_u_filename: None,
            output_v_filename: None,
            interpolation: Default::default(),
            process_grid: None,
            initial_eta_filename: None,
        }
    }

    /// Sloping bottom on a 1 km grid, twice as fine as the model grid.
    fn depth() -> GridData {
        let shape = Shape::new(24, 20);
        let values = shape
            .iter()
            .map(|[i, j]| 50.0 + 4.0 * i as f64 + 2.5 * j as f64)
            .collect();
        GridData::new(Arr2D::from_vec(shape, values).unwrap(), 1000.0, 1000.0)
    }

    fn final_fields(params: &Parameters, ranks: usize) -> Vec<Arr2D<f64>> {
        let depth = depth();
        let results = launch(ranks, |comm| {
            let mut sim = Simulation::with_depth(params.clone(), &comm, depth.clone()).unwrap();
            let mut sink = MemorySink::default();
            sim.run(&mut sink).unwrap();
            // every rank takes part in all three gathers
            let fields: Vec<Option<Arr2D<f64>>> = [SWMVars::ETA, SWMVars::U, SWMVars::V]
                .into_iter()
                .map(|var| sim.gather(var).unwrap())
                .collect();
            fields
        });
        let root = results.into_iter().next().unwrap();
        root.into_iter().map(Option::unwrap).collect()
    }

    #[test]
    fn rank_count_does_not_change_the_result() {
        for source_type in [1, 2] {
            let p = params(source_type);
            let reference = final_fields(&p, 1);
            assert_eq!(reference[0].shape(), Shape::new(12, 10));
            assert!(reference[0].as_slice().iter().any(|&v| v != 0.0));
            for ranks in [2, 3, 4, 6] {
                assert_eq!(
                    final_fields(&p, ranks),
                    reference,
                    "source {} on {} ranks",
                    source_type,
                    ranks
                );
            }
        }
    }

    #[test]
    fn swapped_boundary_does_not_depend_on_the_rank_count() {
        for (source_type, boundary_type) in [(1, 2), (2, 1)] {
            let mut p = params(source_type);
            p.boundary_type = Some(boundary_type);
            let reference = final_fields(&p, 1);
            for ranks in [2, 5, 9] {
                assert_eq!(
                    final_fields(&p, ranks),
                    reference,
                    "source {} boundary {} on {} ranks",
                    source_type,
                    boundary_type,
                    ranks
                );
            }
        }
    }

    #[test]
    fn explicit_process_grid_gives_the_same_result() {
        let mut p = params(2);
        let reference = final_fields(&p, 1);
        p.process_grid = Some([1, 4]);
        assert_eq!(final_fields(&p, 4), reference);
    }

    #[test]
    fn first_step_starts_from_rest() {
        for source_type in [1, 2] {
            let comm = crate::comm::LocalComm::world(1).remove(0);
            let mut sim = Simulation::with_depth(params(source_type), &comm, depth()).unwrap();
            sim.step(0, &mut MemorySink::default()).unwrap();
            for var in [SWMVars::ETA, SWMVars::U, SWMVars::V] {
                assert!(sim.state()[var]
                    .get_data()
                    .as_slice()
                    .iter()
                    .all(|&v| v == 0.0));
            }
        }
    }

    #[test]
    fn volume_budget_closes_with_reflective_walls() {
        // flat bottom, no friction: volume only changes through the forced top face
        let mut p = params(1);
        p.gamma = 0.0;
        p.g = 1.0;
        p.dt = 0.5;
        p.max_t = 40.0;
        p.dx = 2.0;
        p.dy = 2.0;
        let flat = GridData::new(Arr2D::full(1.0, [8, 8]), 2.0, 2.0);

        let volumes = launch(4, |comm| {
            let mut sim = Simulation::with_depth(p.clone(), &comm, flat.clone()).unwrap();
            let mut sink = MemorySink::default();
            let mut volumes = Vec::new();
            for n in 0..sim.nt() {
                sim.step(n, &mut sink).unwrap();
                volumes.push(sim.total_volume().unwrap());
            }
            volumes
        });

        // dV = -dt h dx nx F(t)
        let width = 8.0 * 2.0;
        let scale = p.dt * width * crate::boundary::FORCING_AMPLITUDE;
        let mut expected = 0.0;
        for (n, &volume) in volumes[0].iter().enumerate() {
            expected -= p.dt * 1.0 * width * forcing(n as f64 * p.dt);
            assert_relative_eq!(volume, expected, epsilon = 1e-9 * scale);
            assert!(volume.abs() <= 20.0 * scale);
        }
        // two full periods of the forcing
        assert_relative_eq!(*volumes[0].last().unwrap(), 0.0, epsilon = 1e-9 * scale);
        assert_eq!(volumes[0], volumes[3]);
    }

    #[test]
    fn invalid_source_type_fails_before_stepping() {
        for ranks in [1, 4] {
            let results = launch(ranks, |comm| {
                Simulation::with_depth(params(3), &comm, depth()).map(|_| ())
            });
            for res in results {
                assert!(matches!(res, Err(Error::Config(_))));
            }
        }
    }

    #[test]
    fn mismatching_process_grid_is_rejected() {
        let mut p = params(1);
        p.process_grid = Some([3, 1]);
        let results = launch(4, |comm| {
            Simulation::with_depth(p.clone(), &comm, depth()).map(|_| ())
        });
        assert!(results
            .into_iter()
            .all(|res| matches!(res, Err(Error::Config(_)))));
    }

    #[test]
    fn initial_elevation_is_scattered() {
        let results = launch(4, |comm| {
            let mut sim = Simulation::with_depth(params(1), &comm, depth()).unwrap();
            let initial = Arr2D::from_vec(
                [12, 10],
                Shape::new(12, 10).iter().map(|[i, j]| (i * j) as f64).collect(),
            )
            .unwrap();
            sim.set_initial_eta(comm.is_root().then_some(&initial)).unwrap();
            let local = sim.state().eta.get_data()[[1, 1]];
            (sim.gather(SWMVars::ETA).unwrap(), initial, local)
        });
        let (gathered, initial, _) = &results[0];
        assert_eq!(gathered.as_ref(), Some(initial));
        // rank 3 starts at (6, 5)
        assert_eq!(results[3].2, 7.0 * 6.0);
    }

    #[test]
    fn snapshots_are_taken_on_the_root_only() {
        let mut p = params(2);
        p.max_t = 25.0;
        p.sampling_rate = 2;
        p.output_u_filename = Some("u.bin".into());
        let results = launch(3, |comm| {
            let mut sim = Simulation::with_depth(p.clone(), &comm, depth()).unwrap();
            let mut sink = MemorySink::default();
            let summary = sim.run(&mut sink).unwrap();
            (summary.steps, sink.snapshots)
        });

        let (steps, snapshots) = &results[0];
        assert_eq!(*steps, 5);
        let taken: Vec<(SWMVars, usize)> = snapshots.iter().map(|(v, s, _)| (*v, *s)).collect();
        assert_eq!(
            taken,
            vec![
                (SWMVars::ETA, 0),
                (SWMVars::U, 0),
                (SWMVars::ETA, 2),
                (SWMVars::U, 2),
                (SWMVars::ETA, 4),
                (SWMVars::U, 4),
            ]
        );
        assert_eq!(snapshots[1].2.shape(), Shape::new(13, 10));
        assert!(results[1].1.is_empty() && results[2].1.is_empty());
    }

    #[test]
    fn missing_depth_file_is_reported_on_every_rank() {
        let mut p = params(1);
        p.input_h_filename = "/nonexistent/depth.bin".into();
        let results = launch(3, |comm| Simulation::new(p.clone(), &comm).map(|_| ()));
        assert!(matches!(results[0], Err(Error::Io { .. })));
        for res in &results[1..] {
            assert!(matches!(
                res,
                Err(Error::Comm(CommError::Aborted { peer: 0 }))
            ));
        }
    }

    #[test]
    fn root_rank_is_the_only_one_with_a_gathered_field() {
        let results = launch(2, |comm| {
            let sim = Simulation::with_depth(params(1), &comm, depth()).unwrap();
            (comm.rank(), sim.gather(SWMVars::V).unwrap().map(|f| f.shape()))
        });
        assert_eq!(results[0], (0, Some(Shape::new(12, 11))));
        assert_eq!(results[1], (1, None));
    }
}

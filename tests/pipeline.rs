use std::path::Path;

use seady_swm::comm::launch;
use seady_swm::config::Parameters;
use seady_swm::error::{CommError, Error};
use seady_swm::field::{Arr2D, Field, Shape};
use seady_swm::io::{self, FileSink, GridData};

fn write_depth(path: &Path) {
    let shape = Shape::new(30, 20);
    let values = shape
        .iter()
        .map(|[i, j]| 80.0 - 2.0 * (i as f64 - 15.0).abs() + 0.5 * j as f64)
        .collect();
    let depth = GridData::new(Arr2D::from_vec(shape, values).unwrap(), 500.0, 500.0);
    io::write_field(path, &depth).unwrap();
}

fn write_params(dir: &Path, name: &str, extra: &str) -> Parameters {
    let text = format!(
        "# test basin
dx 1000
dy 1000
dt 4
max_t 120
g 9.81
gamma 0.0001
source_type 2
sampling_rate 10
input_h_filename {dir}/depth.bin
output_eta_filename {dir}/{name}/eta.bin
output_v_filename {dir}/{name}/v.bin
{extra}
",
        dir = dir.display(),
        name = name,
        extra = extra
    );
    std::fs::create_dir_all(dir.join(name)).unwrap();
    let path = dir.join(format!("{}.txt", name));
    std::fs::write(&path, text).unwrap();
    Parameters::from_file(&path).unwrap()
}

fn run(params: &Parameters, ranks: usize) -> Vec<seady_swm::Result<seady_swm::RunSummary>> {
    launch(ranks, |comm| {
        let mut sink = FileSink::new(&params.outputs());
        seady_swm::run(params.clone(), &comm, &mut sink)
    })
}

#[test]
fn snapshots_do_not_depend_on_the_rank_count() {
    let dir = tempfile::tempdir().unwrap();
    write_depth(&dir.path().join("depth.bin"));

    let serial = write_params(dir.path(), "serial", "");
    let parallel = write_params(dir.path(), "parallel", "");
    assert!(run(&serial, 1).iter().all(|res| res.is_ok()));
    assert!(run(&parallel, 4).iter().all(|res| res.is_ok()));

    for field in ["eta", "v"] {
        let manifest =
            io::read_manifest(dir.path().join(format!("serial/{}_manifest.json", field))).unwrap();
        assert_eq!(manifest.nt, 30);
        assert_eq!(manifest.sampling_rate, 10);
        let steps: Vec<usize> = manifest.snapshots.iter().map(|s| s.step).collect();
        assert_eq!(steps, vec![0, 10, 20]);

        for snapshot in manifest.snapshots.iter() {
            let a = io::read_field(dir.path().join("serial").join(&snapshot.file)).unwrap();
            let b = io::read_field(dir.path().join("parallel").join(&snapshot.file)).unwrap();
            assert_eq!(a, b, "{:?}", snapshot.file);
        }
    }

    let eta = io::read_field(dir.path().join("serial/eta_20.bin")).unwrap();
    assert_eq!(eta.shape(), Shape::new(15, 10));
    assert_eq!((eta.dx, eta.dy), (1000.0, 1000.0));
    assert!(eta.values.as_slice().iter().any(|&v| v != 0.0));
    let v = io::read_field(dir.path().join("serial/v_20.bin")).unwrap();
    assert_eq!(v.shape(), Shape::new(15, 11));
    assert!(!dir.path().join("serial/u_20.bin").exists());
}

#[test]
fn initial_elevation_is_read_from_file() {
    let dir = tempfile::tempdir().unwrap();
    write_depth(&dir.path().join("depth.bin"));
    let initial = GridData::new(Arr2D::full(0.25, [15, 10]), 1000.0, 1000.0);
    io::write_field(dir.path().join("eta0.bin"), &initial).unwrap();

    let extra = format!("initial_eta_filename {}/eta0.bin", dir.path().display());
    let mut params = write_params(dir.path(), "init", &extra);
    params.max_t = 4.0;
    assert!(run(&params, 2).iter().all(|res| res.is_ok()));

    let eta = io::read_field(dir.path().join("init/eta_0.bin")).unwrap();
    assert_eq!(eta, initial);
}

#[test]
fn wrong_initial_elevation_shape_fails_on_all_ranks() {
    let dir = tempfile::tempdir().unwrap();
    write_depth(&dir.path().join("depth.bin"));
    let initial = GridData::new(Arr2D::full(0.0, [7, 7]), 1000.0, 1000.0);
    io::write_field(dir.path().join("eta0.bin"), &initial).unwrap();

    let extra = format!("initial_eta_filename {}/eta0.bin", dir.path().display());
    let params = write_params(dir.path(), "bad", &extra);
    let results = run(&params, 3);
    assert!(matches!(results[0], Err(Error::Format { .. })));
    for res in &results[1..] {
        assert!(matches!(
            res,
            Err(Error::Comm(CommError::Aborted { peer: 0 }))
        ));
    }
}

#[test]
fn too_many_ranks_for_the_grid_is_a_partition_error() {
    let dir = tempfile::tempdir().unwrap();
    write_depth(&dir.path().join("depth.bin"));
    let params = write_params(dir.path(), "tiny", "process_grid [1, 8]");
    let results = run(&params, 8);
    assert!(results
        .iter()
        .all(|res| matches!(res, Err(Error::Partition(_)))));
}

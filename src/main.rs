//! Command line front end of the shallow water model.
use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use log::LevelFilter;

use seady_swm::config::Parameters;
use seady_swm::error::CommError;
use seady_swm::io::FileSink;
use seady_swm::Error;

/// Distributed shallow water model on a staggered grid
#[derive(Parser)]
#[command(name = "seady-swm")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about, long_about = None)]
struct Cli {
    /// Parameter file, JSON or `key value` lines
    parameter_file: PathBuf,

    /// Number of ranks, each running on its own thread
    #[cfg(not(feature = "mpi"))]
    #[arg(short = 'n', long, default_value_t = 1)]
    ranks: usize,

    /// Log level (trace, debug, info, warn, error); overrides RUST_LOG
    #[arg(short, long)]
    log_level: Option<String>,
}

fn init_logging(level: Option<&str>) {
    let level = level
        .and_then(|l| l.parse::<LevelFilter>().ok())
        .or_else(|| {
            std::env::var("RUST_LOG")
                .ok()
                .and_then(|v| v.parse::<LevelFilter>().ok())
        })
        .unwrap_or(LevelFilter::Info);

    env_logger::Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {:5} {}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

/// Failures caused by another rank giving up carry no information of their own.
fn is_secondary(err: &Error) -> bool {
    matches!(
        err,
        Error::Comm(CommError::Disconnected { .. }) | Error::Comm(CommError::Aborted { .. })
    )
}

#[cfg(not(feature = "mpi"))]
fn execute(cli: &Cli, params: Parameters) -> anyhow::Result<()> {
    use seady_swm::comm::launch;

    anyhow::ensure!(cli.ranks > 0, "at least one rank is required");
    let results = launch(cli.ranks, |comm| {
        let mut sink = FileSink::new(&params.outputs());
        seady_swm::run(params.clone(), &comm, &mut sink)
    });

    let mut errors: Vec<(usize, Error)> = results
        .into_iter()
        .enumerate()
        .filter_map(|(rank, res)| res.err().map(|err| (rank, err)))
        .collect();
    if errors.is_empty() {
        return Ok(());
    }
    for (rank, err) in errors.iter().filter(|(_, e)| is_secondary(e)) {
        log::debug!("rank {}: {}", rank, err);
    }
    let first = errors
        .iter()
        .position(|(_, e)| !is_secondary(e))
        .unwrap_or(0);
    let (rank, err) = errors.swap_remove(first);
    Err(err).with_context(|| format!("rank {} failed", rank))
}

#[cfg(feature = "mpi")]
fn execute(_cli: &Cli, params: Parameters) -> anyhow::Result<()> {
    use seady_swm::comm::Communicator;
    use seady_swm::comm_mpi::MpiComm;

    let comm = MpiComm::init().context("MPI is already initialised")?;
    let mut sink = FileSink::new(&params.outputs());
    if let Err(err) = seady_swm::run(params, &comm, &mut sink) {
        if !is_secondary(&err) {
            log::error!("rank {} failed: {}", comm.rank(), err);
        }
        comm.abort(1);
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    let params = Parameters::from_file(&cli.parameter_file).with_context(|| {
        format!(
            "cannot load parameters from {}",
            cli.parameter_file.display()
        )
    })?;
    log::debug!("{:?}", params);

    execute(&cli, params)
}

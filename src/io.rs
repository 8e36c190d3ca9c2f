//! Field files, snapshots and the run manifest.
//!
//! A field file holds one 2D field in little-endian byte order:
//!
//! | bytes | content            |
//! |-------|--------------------|
//! | 4     | `nx` as `i32`      |
//! | 4     | `ny` as `i32`      |
//! | 8     | `dx` as `f64`      |
//! | 8     | `dy` as `f64`      |
//! | 8·nx·ny | values as `f64`, `i` varying fastest |
//!
//! The same format is used for the depth input, the optional initial elevation
//! and every snapshot written during a run.
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use fixed_map::Map;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::field::{Arr2D, Field, Shape};
use crate::state::SWMVars;

/// A global field together with its grid spacing.
#[derive(Clone, Debug, PartialEq)]
pub struct GridData {
    pub values: Arr2D<f64>,
    pub dx: f64,
    pub dy: f64,
}

impl GridData {
    pub fn new(values: Arr2D<f64>, dx: f64, dy: f64) -> Self {
        GridData { values, dx, dy }
    }

    pub fn shape(&self) -> Shape {
        self.values.shape()
    }

    /// Flatten into `[nx, ny, dx, dy, values...]` for transfer between ranks.
    pub fn to_message(&self) -> Vec<f64> {
        let shape = self.shape();
        let mut msg = Vec::with_capacity(4 + shape.size());
        msg.extend([shape.nx() as f64, shape.ny() as f64, self.dx, self.dy]);
        msg.extend(self.values.owned_to_vec());
        msg
    }

    /// Inverse of [`GridData::to_message`].
    pub fn from_message(msg: Vec<f64>) -> Option<Self> {
        if msg.len() < 4 {
            return None;
        }
        let (nx, ny, dx, dy) = (msg[0] as usize, msg[1] as usize, msg[2], msg[3]);
        let values = Arr2D::from_vec([nx, ny], msg[4..].to_vec())?;
        Some(GridData::new(values, dx, dy))
    }
}

fn read_i32<R: Read>(reader: &mut R) -> std::io::Result<i32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_f64<R: Read>(reader: &mut R) -> std::io::Result<f64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(f64::from_le_bytes(buf))
}

fn io_or_format(path: &Path, err: std::io::Error) -> Error {
    if err.kind() == ErrorKind::UnexpectedEof {
        Error::format(path, "file is truncated")
    } else {
        Error::io(path, err)
    }
}

/// Read a field file.
pub fn read_field(path: impl AsRef<Path>) -> Result<GridData> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let mut reader = BufReader::new(file);

    let nx = read_i32(&mut reader).map_err(|e| io_or_format(path, e))?;
    let ny = read_i32(&mut reader).map_err(|e| io_or_format(path, e))?;
    if nx <= 0 || ny <= 0 {
        return Err(Error::format(
            path,
            format!("invalid field shape {}x{}", nx, ny),
        ));
    }
    let dx = read_f64(&mut reader).map_err(|e| io_or_format(path, e))?;
    let dy = read_f64(&mut reader).map_err(|e| io_or_format(path, e))?;
    if !(dx > 0.0 && dy > 0.0 && dx.is_finite() && dy.is_finite()) {
        return Err(Error::format(
            path,
            format!("invalid grid spacing dx = {}, dy = {}", dx, dy),
        ));
    }

    let shape = Shape::new(nx as usize, ny as usize);
    let mut values = Vec::with_capacity(shape.size());
    for _ in 0..shape.size() {
        values.push(read_f64(&mut reader).map_err(|e| io_or_format(path, e))?);
    }
    let values = Arr2D::from_vec(shape, values)
        .ok_or_else(|| Error::format(path, "value count does not match shape"))?;
    log::debug!("read {}x{} field from {}", shape.nx(), shape.ny(), path.display());
    Ok(GridData::new(values, dx, dy))
}

/// Write a field file, replacing an existing one.
pub fn write_field(path: impl AsRef<Path>, field: &GridData) -> Result<()> {
    let path = path.as_ref();
    let shape = field.shape();
    let to_i32 = |n: usize| {
        i32::try_from(n).map_err(|_| Error::format(path, format!("extent {} exceeds i32", n)))
    };
    let (nx, ny) = (to_i32(shape.nx())?, to_i32(shape.ny())?);

    let file = File::create(path).map_err(|e| Error::io(path, e))?;
    let mut writer = BufWriter::new(file);
    let write = |writer: &mut BufWriter<File>| -> std::io::Result<()> {
        writer.write_all(&nx.to_le_bytes())?;
        writer.write_all(&ny.to_le_bytes())?;
        writer.write_all(&field.dx.to_le_bytes())?;
        writer.write_all(&field.dy.to_le_bytes())?;
        for val in field.values.owned_to_vec() {
            writer.write_all(&val.to_le_bytes())?;
        }
        writer.flush()
    };
    write(&mut writer).map_err(|e| Error::io(path, e))
}

/// Insert `suffix` between the file stem and the extension of `base`.
fn with_suffix(base: &Path, suffix: &str, ext: Option<&str>) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = ext
        .map(str::to_owned)
        .or_else(|| base.extension().map(|e| e.to_string_lossy().into_owned()));
    let name = match ext {
        Some(ext) => format!("{}_{}.{}", stem, suffix, ext),
        None => format!("{}_{}", stem, suffix),
    };
    base.with_file_name(name)
}

/// Path of the snapshot taken at `step` for output file `base`, `<stem>_<step>.<ext>`.
pub fn snapshot_path(base: &Path, step: usize) -> PathBuf {
    with_suffix(base, &step.to_string(), None)
}

/// Path of the manifest for output file `base`, `<stem>_manifest.json`.
pub fn manifest_path(base: &Path) -> PathBuf {
    with_suffix(base, "manifest", Some("json"))
}

/// One snapshot listed in a manifest.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub step: usize,
    pub time: f64,
    pub file: PathBuf,
}

/// Description of all snapshots of one output field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub field: String,
    pub dt: f64,
    pub nt: usize,
    pub sampling_rate: usize,
    pub nx: usize,
    pub ny: usize,
    pub dx: f64,
    pub dy: f64,
    pub snapshots: Vec<SnapshotRecord>,
}

pub fn read_manifest(path: impl AsRef<Path>) -> Result<Manifest> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| Error::format(path, e.to_string()))
}

fn write_manifest(path: &Path, manifest: &Manifest) -> Result<()> {
    let file = File::create(path).map_err(|e| Error::io(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, manifest)
        .map_err(|e| Error::format(path, e.to_string()))?;
    writer.flush().map_err(|e| Error::io(path, e))
}

/// Time stepping metadata recorded in every manifest.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RunInfo {
    pub dt: f64,
    pub nt: usize,
    pub sampling_rate: usize,
}

/// Receiver of the global fields assembled on the root rank.
pub trait SnapshotSink {
    /// Store the snapshot of `var` taken at `step`.
    fn write(&mut self, var: SWMVars, step: usize, time: f64, field: &GridData) -> Result<()>;

    /// Called once after the last step.
    fn finish(&mut self, _run: &RunInfo) -> Result<()> {
        Ok(())
    }
}

struct Output {
    base: PathBuf,
    grid: Option<(Shape, f64, f64)>,
    records: Vec<SnapshotRecord>,
}

/// Writes every snapshot to its own field file and a manifest per field at the end.
pub struct FileSink {
    outputs: Map<SWMVars, Output>,
}

impl FileSink {
    /// Sink writing each variable of `outputs` next to its base path.
    pub fn new(outputs: &Map<SWMVars, PathBuf>) -> Self {
        let mut map = Map::new();
        for (var, base) in outputs.iter() {
            map.insert(
                var,
                Output {
                    base: base.clone(),
                    grid: None,
                    records: Vec::new(),
                },
            );
        }
        FileSink { outputs: map }
    }
}

impl SnapshotSink for FileSink {
    fn write(&mut self, var: SWMVars, step: usize, time: f64, field: &GridData) -> Result<()> {
        let Some(output) = self.outputs.get_mut(var) else {
            log::debug!("no output file configured for {}", var.name());
            return Ok(());
        };
        let path = snapshot_path(&output.base, step);
        write_field(&path, field)?;
        #[cfg(feature = "plotting")]
        if var == SWMVars::ETA {
            plot::render_png(&with_suffix(&output.base, &step.to_string(), Some("png")), field, var)?;
        }
        log::debug!("wrote {} at step {} to {}", var.name(), step, path.display());

        output.grid = Some((field.shape(), field.dx, field.dy));
        output.records.push(SnapshotRecord {
            step,
            time,
            file: path
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_else(|| path.clone()),
        });
        Ok(())
    }

    fn finish(&mut self, run: &RunInfo) -> Result<()> {
        for (var, output) in self.outputs.iter_mut() {
            let (shape, dx, dy) = output.grid.unwrap_or((Shape::new(0, 0), 0.0, 0.0));
            let manifest = Manifest {
                field: var.name().to_string(),
                dt: run.dt,
                nt: run.nt,
                sampling_rate: run.sampling_rate,
                nx: shape.nx(),
                ny: shape.ny(),
                dx,
                dy,
                snapshots: std::mem::take(&mut output.records),
            };
            let path = manifest_path(&output.base);
            write_manifest(&path, &manifest)?;
            log::info!(
                "{} snapshots of {} listed in {}",
                manifest.snapshots.len(),
                var.name(),
                path.display()
            );
        }
        Ok(())
    }
}

#[cfg(feature = "plotting")]
mod plot {
    use std::path::Path;

    use plotters::prelude::*;

    use super::GridData;
    use crate::error::{Error, Result};
    use crate::field::Field;
    use crate::state::SWMVars;

    /// Render a field as a colour map, symmetric around zero.
    pub fn render_png(path: &Path, field: &GridData, var: SWMVars) -> Result<()> {
        draw(path, field, var).map_err(|e| {
            Error::io(
                path,
                std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
            )
        })
    }

    fn draw(
        path: &Path,
        field: &GridData,
        var: SWMVars,
    ) -> std::result::Result<(), Box<dyn std::error::Error>> {
        let root = BitMapBackend::new(path, (640, 640)).into_drawing_area();
        root.fill(&WHITE)?;
        let root = root.margin(5, 5, 5, 5);
        let root = root.titled(
            var.name(),
            ("sans-serif", 22).into_font().color(&BLACK.mix(0.8)),
        )?;

        let values = &field.values;
        let shape = values.shape();
        let (dx, dy) = (field.dx, field.dy);
        let scale = values
            .as_slice()
            .iter()
            .fold(0f64, |acc, v| acc.max(v.abs()))
            .max(f64::EPSILON * 10.0);

        let mut chart = ChartBuilder::on(&root)
            .margin(20)
            .x_label_area_size(10)
            .y_label_area_size(10)
            .build_cartesian_2d(0f64..shape.nx() as f64 * dx, 0f64..shape.ny() as f64 * dy)?;

        chart
            .configure_mesh()
            .disable_x_mesh()
            .disable_y_mesh()
            .draw()?;

        chart.draw_series(shape.iter().map(|idx| {
            let (x, y) = (idx[0] as f64 * dx, idx[1] as f64 * dy);
            let col = colorous::RED_BLUE.eval_continuous(1.0 - (values[idx] + scale) / (2.0 * scale));
            Rectangle::new([(x, y + dy), (x + dx, y)], RGBColor(col.r, col.g, col.b).filled())
        }))?;

        root.present()?;
        Ok(())
    }
}

//! Run parameters.
//!
//! Parameters are read from a JSON object, or from the legacy plain text format
//! with one `key value` pair per line:
//!
//! ```text
//! # grid spacing and time step
//! dx 1000
//! dy 1000
//! dt 10
//! max_t 3600
//! g 9.81
//! gamma 0.0
//! source_type 1
//! sampling_rate 60
//! input_h_filename depth.bin
//! output_eta_filename eta.bin
//! ```
use std::path::{Path, PathBuf};

use fixed_map::Map;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::boundary::{BoundaryType, SourceType};
use crate::error::{Error, Result};
use crate::interp::Interpolation;
use crate::state::SWMVars;

/// All parameters of a run. Every rank holds the same copy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Parameters {
    /// grid spacing along x
    pub dx: f64,
    /// grid spacing along y
    pub dy: f64,
    pub dt: f64,
    /// simulated time
    pub max_t: f64,
    /// gravitational acceleration
    pub g: f64,
    /// linear friction coefficient
    pub gamma: f64,
    pub source_type: i64,
    /// Defaults to the boundary condition matching the source.
    #[serde(default)]
    pub boundary_type: Option<i64>,
    /// Snapshot every this many steps, never if zero.
    #[serde(default)]
    pub sampling_rate: usize,
    pub input_h_filename: PathBuf,
    pub output_eta_filename: PathBuf,
    #[serde(default)]
    pub output_u_filename: Option<PathBuf>,
    #[serde(default)]
    pub output_v_filename: Option<PathBuf>,
    #[serde(default)]
    pub interpolation: Interpolation,
    /// `[rows, cols]` of the process grid, chosen automatically if absent.
    #[serde(default)]
    pub process_grid: Option<[usize; 2]>,
    /// Global initial elevation, zero if absent.
    #[serde(default)]
    pub initial_eta_filename: Option<PathBuf>,
}

impl Parameters {
    /// Load parameters from a file in JSON or `key value` format.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::parse(&text)
    }

    /// Parse parameters from a string in JSON or `key value` format.
    pub fn parse(text: &str) -> Result<Self> {
        let value = if text.trim_start().starts_with('{') {
            serde_json::from_str(text).map_err(|e| Error::config(e.to_string()))?
        } else {
            parse_key_value(text)?
        };
        let params: Parameters =
            serde_json::from_value(value).map_err(|e| Error::config(e.to_string()))?;
        params.validate()?;
        Ok(params)
    }

    /// Check ranges and enumerations.
    pub fn validate(&self) -> Result<()> {
        for (name, val) in [("dx", self.dx), ("dy", self.dy), ("dt", self.dt), ("g", self.g)] {
            if !(val > 0.0 && val.is_finite()) {
                return Err(Error::config(format!("{} must be positive, got {}", name, val)));
            }
        }
        for (name, val) in [("max_t", self.max_t), ("gamma", self.gamma)] {
            if !(val >= 0.0 && val.is_finite()) {
                return Err(Error::config(format!(
                    "{} must not be negative, got {}",
                    name, val
                )));
            }
        }
        if let Some([rows, cols]) = self.process_grid {
            if rows == 0 || cols == 0 {
                return Err(Error::config(format!(
                    "process grid {}x{} is empty",
                    rows, cols
                )));
            }
        }
        self.source()?;
        self.boundary()?;
        Ok(())
    }

    pub fn source(&self) -> Result<SourceType> {
        SourceType::try_from(self.source_type)
    }

    pub fn boundary(&self) -> Result<BoundaryType> {
        match self.boundary_type {
            Some(code) => BoundaryType::try_from(code),
            None => Ok(self.source()?.default_boundary()),
        }
    }

    /// Number of time steps.
    pub fn nt(&self) -> usize {
        (self.max_t / self.dt).floor() as usize
    }

    /// Base path of every field that is written as snapshots.
    pub fn outputs(&self) -> Map<SWMVars, PathBuf> {
        let mut outputs = Map::new();
        outputs.insert(SWMVars::ETA, self.output_eta_filename.clone());
        if let Some(path) = &self.output_u_filename {
            outputs.insert(SWMVars::U, path.clone());
        }
        if let Some(path) = &self.output_v_filename {
            outputs.insert(SWMVars::V, path.clone());
        }
        outputs
    }
}

/// Turn `key value` lines into a JSON object.
///
/// File names are always strings. Other values that parse as JSON (numbers,
/// arrays) are taken as such, everything else is kept as a string.
fn parse_key_value(text: &str) -> Result<Value> {
    let mut map = serde_json::Map::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = strip_comment(line).trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(char::is_whitespace) else {
            return Err(Error::config(format!(
                "line {}: expected `key value`, got `{}`",
                lineno + 1,
                line
            )));
        };
        let value = value.trim();
        let value = if key.ends_with("_filename") {
            Value::String(value.to_owned())
        } else {
            serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_owned()))
        };
        if map.insert(key.to_owned(), value).is_some() {
            return Err(Error::config(format!(
                "line {}: duplicate key `{}`",
                lineno + 1,
                key
            )));
        }
    }
    Ok(Value::Object(map))
}

/// Cut a trailing comment. A `#` only starts a comment at the beginning of the
/// line or after whitespace, so it may appear inside a path.
fn strip_comment(line: &str) -> &str {
    let mut prev = None;
    for (pos, c) in line.char_indices() {
        if c == '#' && prev.map_or(true, char::is_whitespace) {
            return &line[..pos];
        }
        prev = Some(c);
    }
    line
}

//! Worker stdio wire formats.
//!
//! A worker receives exactly one job on stdin and writes exactly one result
//! to stdout, signalling completion by closing the stream; there is no
//! length prefix, so the dispatching side buffers until EOF. A worker reads
//! its whole job before emitting any output, which lets the dispatcher
//! write the request fully before draining stdout. Two encodings exist:
//! newline-terminated text (native workers) and a single JSON document
//! (scripted workers). Exit code 0 means the buffered stdout is the
//! result; non-zero means it must be discarded.

use crate::error::ToolError;
use pointserve_core::GlobalBounds;
use serde::{Deserialize, Serialize};

/// A downsample or debug-centers job: both take the same inputs.
///
/// Text form: `"<pointCount> <voxelSize> <minX> <minY> <minZ> <maxX> <maxY>
/// <maxZ>"` on the first line, then the points as space-separated floats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridJob {
    pub points: Vec<f32>,
    pub voxel_size: f32,
    pub global_bounds: GlobalBounds,
}

/// A smoothing job.
///
/// Text form: `"<pointCount> <smoothingRadius> <iterations>"` then floats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmoothJob {
    pub points: Vec<f32>,
    pub smoothing_radius: f32,
    pub iterations: u32,
}

/// A worker's result: transformed points plus the cell count (for grid
/// operations; equals the point count there, and for smoothing as well
/// since smoothing preserves the population).
///
/// Text form: `"<count>"` on the first line, then floats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOutput {
    pub count: usize,
    pub points: Vec<f32>,
}

fn parse_number<T: std::str::FromStr>(token: Option<&str>, what: &'static str) -> Result<T, ToolError> {
    let token = token.ok_or(ToolError::Truncated(what))?;
    token
        .parse()
        .map_err(|_| ToolError::BadNumber(format!("{what}: {token:?}")))
}

fn parse_floats(tokens: std::str::SplitWhitespace<'_>, expected: usize) -> Result<Vec<f32>, ToolError> {
    let mut floats = Vec::with_capacity(expected);
    for token in tokens {
        let value: f32 = token
            .parse()
            .map_err(|_| ToolError::BadNumber(format!("point data: {token:?}")))?;
        floats.push(value);
    }
    if floats.len() != expected {
        return Err(ToolError::CountMismatch {
            expected: expected / 3,
            actual: floats.len() / 3,
        });
    }
    Ok(floats)
}

fn push_floats(out: &mut String, floats: &[f32]) {
    for (i, f) in floats.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&f.to_string());
    }
    out.push('\n');
}

impl GridJob {
    pub fn encode_text(&self) -> String {
        let b = &self.global_bounds;
        let mut out = format!(
            "{} {} {} {} {} {} {} {}\n",
            self.points.len() / 3,
            self.voxel_size,
            b.min_x,
            b.min_y,
            b.min_z,
            b.max_x,
            b.max_y,
            b.max_z,
        );
        push_floats(&mut out, &self.points);
        out
    }

    pub fn parse_text(input: &str) -> Result<Self, ToolError> {
        let mut tokens = input.split_whitespace();
        let point_count: usize = parse_number(tokens.next(), "point count")?;
        let voxel_size: f32 = parse_number(tokens.next(), "voxel size")?;
        let min_x: f32 = parse_number(tokens.next(), "min x")?;
        let min_y: f32 = parse_number(tokens.next(), "min y")?;
        let min_z: f32 = parse_number(tokens.next(), "min z")?;
        let max_x: f32 = parse_number(tokens.next(), "max x")?;
        let max_y: f32 = parse_number(tokens.next(), "max y")?;
        let max_z: f32 = parse_number(tokens.next(), "max z")?;
        let points = parse_floats(tokens, point_count * 3)?;
        Ok(Self {
            points,
            voxel_size,
            global_bounds: GlobalBounds::new([min_x, min_y, min_z], [max_x, max_y, max_z]),
        })
    }

    pub fn encode_json(&self) -> Result<String, ToolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn parse_json(input: &str) -> Result<Self, ToolError> {
        Ok(serde_json::from_str(input)?)
    }
}

impl SmoothJob {
    pub fn encode_text(&self) -> String {
        let mut out = format!(
            "{} {} {}\n",
            self.points.len() / 3,
            self.smoothing_radius,
            self.iterations,
        );
        push_floats(&mut out, &self.points);
        out
    }

    pub fn parse_text(input: &str) -> Result<Self, ToolError> {
        let mut tokens = input.split_whitespace();
        let point_count: usize = parse_number(tokens.next(), "point count")?;
        let smoothing_radius: f32 = parse_number(tokens.next(), "smoothing radius")?;
        let iterations: u32 = parse_number(tokens.next(), "iterations")?;
        let points = parse_floats(tokens, point_count * 3)?;
        Ok(Self {
            points,
            smoothing_radius,
            iterations,
        })
    }

    pub fn encode_json(&self) -> Result<String, ToolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn parse_json(input: &str) -> Result<Self, ToolError> {
        Ok(serde_json::from_str(input)?)
    }
}

impl JobOutput {
    pub fn encode_text(&self) -> String {
        let mut out = format!("{}\n", self.count);
        push_floats(&mut out, &self.points);
        out
    }

    pub fn parse_text(input: &str) -> Result<Self, ToolError> {
        let mut tokens = input.split_whitespace();
        let count: usize = parse_number(tokens.next(), "output count")?;
        let mut points = Vec::new();
        for token in tokens {
            let value: f32 = token
                .parse()
                .map_err(|_| ToolError::BadNumber(format!("output data: {token:?}")))?;
            points.push(value);
        }
        // The count line is authoritative; the float payload must agree.
        if points.len() != count * 3 {
            return Err(ToolError::CountMismatch {
                expected: count,
                actual: points.len() / 3,
            });
        }
        Ok(Self { count, points })
    }

    pub fn encode_json(&self) -> Result<String, ToolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn parse_json(input: &str) -> Result<Self, ToolError> {
        Ok(serde_json::from_str(input)?)
    }
}

//! Voxel debug worker: emits occupied-cell centers for grid visualization.
//! One job on stdin, one result on stdout, EOF marks completion. Pass
//! `--json` for the JSON document wire form.

use std::io::{self, Read, Write};
use tools::ToolError;
use tools::wire::{GridJob, JobOutput};

fn main() {
    if let Err(err) = run() {
        eprintln!("voxel-debug-worker: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), ToolError> {
    let json = std::env::args().any(|a| a == "--json");

    let mut input = String::new();
    io::stdin().read_to_string(&mut input)?;
    let job = if json {
        GridJob::parse_json(&input)?
    } else {
        GridJob::parse_text(&input)?
    };

    let (points, count) = tools::voxel_debug_centers(&job.points, job.voxel_size, &job.global_bounds);
    let output = JobOutput { count, points };

    let mut stdout = io::stdout().lock();
    if json {
        stdout.write_all(output.encode_json()?.as_bytes())?;
    } else {
        stdout.write_all(output.encode_text().as_bytes())?;
    }
    stdout.flush()?;
    Ok(())
}

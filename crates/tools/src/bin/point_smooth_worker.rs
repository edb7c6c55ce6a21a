//! Point smoothing worker: one job on stdin, one result on stdout, EOF
//! marks completion. Pass `--json` for the JSON document wire form.

use std::io::{self, Read, Write};
use tools::ToolError;
use tools::wire::{JobOutput, SmoothJob};

fn main() {
    if let Err(err) = run() {
        eprintln!("point-smooth-worker: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), ToolError> {
    let json = std::env::args().any(|a| a == "--json");

    let mut input = String::new();
    io::stdin().read_to_string(&mut input)?;
    let job = if json {
        SmoothJob::parse_json(&input)?
    } else {
        SmoothJob::parse_text(&input)?
    };

    let points = tools::smooth(&job.points, job.smoothing_radius, job.iterations);
    let output = JobOutput {
        count: points.len() / 3,
        points,
    };

    let mut stdout = io::stdout().lock();
    if json {
        stdout.write_all(output.encode_json()?.as_bytes())?;
    } else {
        stdout.write_all(output.encode_text().as_bytes())?;
    }
    stdout.flush()?;
    Ok(())
}

//! Matrix multiplication demo pipeline.
//!
//! Reads pairs of 10x10 matrices from a text file, multiplies each pair
//! on the consumer thread while the producer thread keeps reading, and
//! writes the products to an output file.
//!
//! # Usage
//!
//! ```sh
//! matmul [--capacity N] [INPUT [OUTPUT]]
//! ```
//!
//! Defaults: `matrices.txt` -> `matrices-result.txt`, capacity 8.

use std::fs::File;
use std::io::BufReader;
use std::process;

use conveyor::matrices::{DEMO_DIM, PairReader, ProductWriter};
use conveyor::pipeline::{self, DEFAULT_CAPACITY, PipelineConfig};

/// Default input path.
const DEFAULT_INPUT: &str = "matrices.txt";

/// Default output path.
const DEFAULT_OUTPUT: &str = "matrices-result.txt";

const USAGE: &str = "usage: matmul [--capacity N] [INPUT [OUTPUT]]";

struct Args {
    input: String,
    output: String,
    capacity: usize,
}

fn main() {
    conveyor::init_tracing();
    if let Err(e) = run() {
        eprintln!("matmul: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = parse_args(&std::env::args().collect::<Vec<_>>())?;

    let input = BufReader::new(File::open(&args.input)?);
    // ProductWriter writes one buffer per matrix, so the file needs no
    // extra buffering or final flush.
    let output = File::create(&args.output)?;

    let config = PipelineConfig {
        capacity: args.capacity,
        ..PipelineConfig::default()
    };
    let report = pipeline::run(
        config,
        PairReader::<_, DEMO_DIM>::new(input),
        ProductWriter::<_, DEMO_DIM>::new(output),
    )?;

    if let Some(err) = &report.producer_error {
        eprintln!("matmul: input ended early: {err}");
    }
    if let Some(err) = &report.last_sink_error {
        eprintln!("matmul: {} write(s) failed, last: {err}", report.sink_failures);
    }
    eprintln!(
        "matmul: {} pair(s) in, {} product(s) out in {:?}",
        report.produced, report.consumed, report.elapsed
    );
    Ok(())
}

fn parse_args(args: &[String]) -> Result<Args, String> {
    let mut parsed = Args {
        input: DEFAULT_INPUT.into(),
        output: DEFAULT_OUTPUT.into(),
        capacity: DEFAULT_CAPACITY,
    };

    let mut positional = Vec::new();
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--help" | "-h" => {
                println!("{USAGE}");
                process::exit(0);
            }
            "--capacity" => {
                let value = iter.next().ok_or("--capacity requires a value")?;
                parsed.capacity = value
                    .parse()
                    .map_err(|_| format!("invalid capacity: {value}"))?;
                if parsed.capacity == 0 {
                    return Err("capacity must be positive".into());
                }
            }
            _ if arg.starts_with('-') => return Err(format!("unknown flag: {arg}\n{USAGE}")),
            _ => positional.push(arg.clone()),
        }
    }

    if positional.len() > 2 {
        return Err(format!("too many arguments\n{USAGE}"));
    }
    let mut positional = positional.into_iter();
    if let Some(input) = positional.next() {
        parsed.input = input;
    }
    if let Some(output) = positional.next() {
        parsed.output = output;
    }
    Ok(parsed)
}

//! combine-test-logs CLI

use std::env;
use std::fs;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use test_log_combiner::{combine, default_input_dir, SortOrder, DEFAULT_OUTPUT_FILE};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "combine-test-logs")]
#[command(about = "Combine test account logs from multiple pipeline jobs")]
struct Cli {
    /// Directory holding the job logs (default: $PIPELINE_WORKSPACE/TestAccountLogs)
    #[arg(long)]
    input_dir: Option<PathBuf>,

    /// Name of the combined log file
    #[arg(long, default_value = DEFAULT_OUTPUT_FILE)]
    output_file: PathBuf,

    /// Directory to write the combined log to (default: current directory)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Interleave entries by timestamp instead of grouping by job
    #[arg(long)]
    sort_by_time: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    process::exit(run(Cli::parse()));
}

fn run(cli: Cli) -> i32 {
    let input_dir = cli
        .input_dir
        .unwrap_or_else(|| default_input_dir(env::var_os("PIPELINE_WORKSPACE"), env::var_os("TEST_LOG_DIR")));
    let output_dir = match cli.output_dir {
        Some(dir) => dir,
        None => match env::current_dir() {
            Ok(dir) => dir,
            Err(e) => {
                eprintln!("ERROR: cannot determine current directory: {}", e);
                return 1;
            }
        },
    };
    let output_file = output_dir.join(&cli.output_file);
    let order = if cli.sort_by_time {
        SortOrder::ByTime
    } else {
        SortOrder::ByJob
    };

    println!("Input directory: {}", input_dir.display());
    println!("Output file: {}", output_file.display());
    println!("Sort by time: {}\n", cli.sort_by_time);

    if !input_dir.exists() {
        println!("ERROR: Input directory does not exist: {}", input_dir.display());
        return 1;
    }
    if let Err(e) = fs::create_dir_all(&output_dir) {
        println!("ERROR: cannot create {}: {}", output_dir.display(), e);
        return 1;
    }

    let report = match combine(&input_dir, &output_file, order) {
        Ok(report) => report,
        Err(e) => {
            println!("ERROR: {}", e);
            return 1;
        }
    };

    if report.files.is_empty() {
        println!("No test account log files found in {}", input_dir.display());
    } else {
        println!("Found {} log file(s) to combine", report.files.len());
        for skipped in &report.skipped {
            println!("  WARNING: skipped {} ({})", skipped.path.display(), skipped.reason);
        }
    }

    match report.output {
        Some(ref path) if report.succeeded() => {
            println!("\nSuccessfully wrote combined log to: {}", path.display());
            if let Ok(meta) = fs::metadata(path) {
                println!("File size: {} bytes", meta.len());
            }
            println!("\nCombined {} log entries", report.entries);
            0
        }
        _ => {
            println!("\nNo logs were combined");
            1
        }
    }
}

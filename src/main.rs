//! msal-build CLI
//!
//! Entry point for the `msal-build` command-line tool.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;
use msal_build::config::DEFAULT_CONFIG_PATH;
use msal_build::orchestrator::default_derived_data_root;
use msal_build::{
    logging, EffectiveConfig, Orchestrator, OrchestratorOptions, Reporter, RunSummary, SystemRunner,
};
use serde_json::{Map, Value};

#[derive(Parser)]
#[command(name = "msal-build")]
#[command(about = "Build, test and measure coverage for the MSAL Xcode targets", version)]
struct Cli {
    /// Keep existing DerivedData instead of removing it first
    #[arg(long)]
    no_clean: bool,

    /// Do not pipe xcodebuild output through xcpretty
    #[arg(long)]
    no_xcpretty: bool,

    /// Print each target's build settings and exit
    #[arg(long)]
    show_build_settings: bool,

    /// Only run these targets (comma-separated names)
    #[arg(long, value_delimiter = ',')]
    targets: Vec<String>,

    /// Repo config file
    #[arg(long, short = 'c', default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Write a JSON run summary to this path
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Debug logging on stderr (RUST_LOG overrides)
    #[arg(long, short = 'v')]
    verbose: bool,
}

impl Cli {
    fn overrides(&self) -> Option<Value> {
        let mut map = Map::new();
        if self.no_clean {
            map.insert("clean".to_string(), Value::Bool(false));
        }
        if self.no_xcpretty {
            map.insert("use_xcpretty".to_string(), Value::Bool(false));
        }
        (!map.is_empty()).then_some(Value::Object(map))
    }
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    process::exit(run(cli));
}

fn run(cli: Cli) -> i32 {
    let effective = match EffectiveConfig::build(Some(cli.config.as_path()), cli.overrides()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return 1;
        }
    };
    let config = effective.config;

    let specs = match config.select(&cli.targets) {
        Ok(specs) => specs,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            eprintln!(
                "Available targets: {}",
                config.targets.iter().map(|t| t.name.as_str()).collect::<Vec<_>>().join(", ")
            );
            return 1;
        }
    };

    let options = OrchestratorOptions {
        clean: config.clean,
        derived_data_root: default_derived_data_root(),
        derived_data_prefix: config.derived_data_prefix.clone(),
        coverage_format: config.coverage_format,
        warm_up_simulator: !cli.show_build_settings,
    };
    let reporter = Reporter::default();
    let mut orchestrator = Orchestrator::new(Arc::new(SystemRunner::new()), config.environment(), options, reporter.clone());

    if cli.show_build_settings {
        return if orchestrator.show_build_settings(specs) { 0 } else { 1 };
    }

    let outcome = match orchestrator.run(specs) {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("Fatal: {}", e);
            if let Some(listing) = e.device_listing() {
                eprintln!("Device listing:\n{}", listing);
            }
            return 1;
        }
    };

    reporter.final_report(&outcome);

    if let Some(ref path) = cli.summary {
        let summary = RunSummary::from_outcome(&outcome);
        if let Err(e) = summary.write_to_file(path) {
            eprintln!("Warning: could not write run summary to {}: {}", path.display(), e);
        }
    }

    outcome.exit_code()
}

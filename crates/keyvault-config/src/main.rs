//! fetch-secret-config CLI

use std::path::PathBuf;
use std::process;

use clap::Parser;
use keyvault_config::{restore, AzCliSource};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fetch-secret-config")]
#[command(about = "Rebuild a config file stored base64-encoded across Key Vault secrets")]
struct Cli {
    /// Key Vault name
    #[arg(long, env = "KEYVAULT_NAME")]
    vault: String,

    /// Base secret name; parts are <secret>-1, <secret>-2, ...
    #[arg(long)]
    secret: String,

    /// Number of parts (default: read until the first missing part)
    #[arg(long)]
    parts: Option<usize>,

    /// File to write the decoded config to
    #[arg(long, short = 'o')]
    output: PathBuf,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let source = AzCliSource::new(&cli.vault);
    match restore(&source, &cli.secret, cli.parts, &cli.output) {
        Ok(bytes) => println!("Wrote {} bytes to {}", bytes, cli.output.display()),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

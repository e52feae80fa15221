#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

mod commands;
mod logging;

use clap::Parser;
use commands::resolve::ResolveArgs;
use dnpkit_core::dnp::REGISTRY_ENV;
use dnpkit_core::Config;
use miette::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "dnpkit")]
#[command(author, version, about = "Resolve DNP install requests into ordered install plans", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Compute the install plan for a package request
    Resolve {
        /// Package to install, as name[@version|range|latest|/ipfs/hash]
        request: String,

        /// Registry base URL or directory of <name>.json indexes
        #[arg(long, env = REGISTRY_ENV, value_name = "URL|DIR")]
        registry: Option<String>,

        /// JSON file listing the installed packages
        #[arg(long, value_name = "FILE")]
        installed: Option<PathBuf>,

        /// JSON file with resolver options
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Determine working directory
    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    let config = Config::new(cwd.clone())
        .with_verbosity(cli.verbose)
        .with_json_logs(cli.json);

    logging::init(config.verbosity, config.json_logs);

    match cli.command {
        Some(Commands::Version) | None => commands::version::run(),
        Some(Commands::Resolve {
            request,
            registry,
            installed,
            config: options_file,
        }) => {
            let span = tracing::info_span!("resolve", cmd = "resolve", cwd = %cwd.display());
            let _guard = span.enter();
            let args = ResolveArgs {
                request,
                registry,
                installed,
                config: options_file,
            };
            commands::resolve::run(&config.cwd, &args, config.json_logs)
        }
    }
}

// Copyright 2026 Authrecon Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use authrecon::cli;

#[derive(Parser)]
#[command(
    name = "authrecon",
    about = "Authrecon — portal record extraction and subscriber enrichment",
    version,
    after_help = "Run 'authrecon <command> --help' for details on each command."
)]
struct Cli {
    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the REST API (query + report endpoints)
    Serve {
        /// Listen port (default 8700, or AUTHRECON_HTTP_PORT)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Drive the portal search and download the record export
    Fetch {
        /// Search date, passed to the portal as-is (e.g. "2024-06-24")
        date: String,
        /// Search time, passed as-is (e.g. "13:34:17")
        time: String,
        /// IPv6 prefix, passed as-is (e.g. "2804:145c:86f7:fc00::/56")
        address: String,
    },
    /// Reconcile a downloaded export against the subscriber directory
    Enrich {
        /// Input spreadsheet (defaults to the last fetched export)
        #[arg(long)]
        input: Option<PathBuf>,
        /// Concurrent directory queries
        #[arg(long, default_value = "4")]
        concurrency: usize,
    },
    /// Full pipeline: fetch, then enrich
    Run {
        date: String,
        time: String,
        address: String,
    },
    /// Check environment and diagnose issues
    Doctor,
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    cli::init_tracing(args.verbose);

    let result = match args.command {
        Commands::Serve { port } => cli::serve::run(port).await,
        Commands::Fetch {
            date,
            time,
            address,
        } => cli::fetch_cmd::run(&date, &time, &address).await,
        Commands::Enrich { input, concurrency } => cli::enrich_cmd::run(input, concurrency).await,
        Commands::Run {
            date,
            time,
            address,
        } => cli::run_cmd::run(&date, &time, &address).await,
        Commands::Doctor => cli::doctor::run().await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "authrecon", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        eprintln!("  Error: {e:#}");
        std::process::exit(1);
    }

    result
}

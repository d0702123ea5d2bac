//! # kgraph
//!
//! Command-line binary for the kgraph consistency engine.
//!
//! ## Usage
//!
//! ```bash
//! kgraph init
//! kgraph seed
//! kgraph entity create "Bob" --id ne1 --label Person
//! kgraph statement create ne1 "Married @Anna" --mention ne3
//! kgraph entity relations ne1 --json-mode
//! ```

use clap::Parser;
use kgraph::cli;
use kgraph::config::{Config, LogFormat};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    let cli = cli::Cli::parse();

    // Tracing is not up yet, so config errors go straight to stderr.
    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    init_tracing(&config, cli.verbose);

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli, &config) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

fn load_config(cli: &cli::Cli) -> Result<Config, kgraph::AppError> {
    let mut config = Config::load(cli.config.as_deref())?;
    config.apply_process_env()?;
    cli.apply_overrides(&mut config);
    Ok(config)
}

/// `RUST_LOG` wins over the configured filter; `--verbose` raises both crates to debug.
fn init_tracing(config: &Config, verbose: bool) {
    let default_filter = if verbose {
        "kgraph=debug,kgraph_core=debug".to_string()
    } else {
        config.log.filter.clone()
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match config.log.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn print_banner() {
    println!(
        r#"
  kgraph v{}
  statements, entities and the relations between them
"#,
        env!("CARGO_PKG_VERSION")
    );
}

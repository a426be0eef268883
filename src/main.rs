//! exo - statechart compiler and runtime
//!
//! Inspects statechart sources and drives machines from YAML harnesses.

mod commands;
mod harness;
mod repl;

use clap::{Parser, Subcommand};
use colored::Colorize;
use harness::{parse_send_arg, HarnessConfig};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "exo")]
#[command(about = "Statechart DSL compiler and runtime")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the token stream of a source file
    Tokens {
        /// Statechart source file
        file: PathBuf,
    },

    /// Compile a source file and print its machines
    Check {
        /// Statechart source file
        file: PathBuf,

        /// Print a JSON outline instead of a tree
        #[arg(long)]
        json: bool,
    },

    /// Run a machine from a harness file
    Run {
        /// Harness YAML file
        #[arg(env = "EXO_HARNESS")]
        harness: Option<PathBuf>,

        /// Dispatch EVENT or EVENT=JSON instead of opening the REPL (repeatable)
        #[arg(short, long = "send", value_name = "EVENT[=JSON]")]
        send: Vec<String>,

        /// Trace every transition
        #[arg(long)]
        debug: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Tokens { file } => {
            let source = read_file(&file)?;
            print!("{}", commands::tokens(&source).map_err(|e| report(&file, e))?);
        }

        Commands::Check { file, json } => {
            let source = read_file(&file)?;
            let forest = commands::compile_outline(&source).map_err(|e| report(&file, e))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&commands::outline(&forest))?);
            } else {
                print!("{}", commands::format_forest(&forest));
                println!("{} {} machine(s)", "OK".green(), forest.len());
            }
        }

        Commands::Run {
            harness,
            send,
            debug,
        } => {
            let mut config = match harness {
                Some(path) => {
                    let mut config = HarnessConfig::from_file(&path)?;
                    config.apply_env_overrides();
                    tracing::info!("Loaded harness from {}", path.display());
                    config
                }
                None => HarnessConfig::load()?,
            };
            config.debug |= debug;

            let machine = config.build()?;

            if send.is_empty() {
                repl::run(machine).await?;
            } else {
                for arg in &send {
                    let (event, payload) = parse_send_arg(arg)?;
                    let changed = machine.send(&event, payload).await?;
                    tracing::info!(event = %event, changed, state = %machine.state(), "dispatched");
                }
                println!("{}", serde_json::to_string_pretty(&machine.snapshot())?);
            }
        }
    }

    Ok(())
}

fn read_file(path: &Path) -> Result<String, Box<dyn std::error::Error>> {
    std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read '{}': {}", path.display(), e).into())
}

fn report(file: &Path, err: exo_compiler::CompileError) -> Box<dyn std::error::Error> {
    eprintln!(
        "{} [{}] {}: {}",
        "error".red().bold(),
        err.error_code(),
        file.display(),
        err
    );
    err.into()
}

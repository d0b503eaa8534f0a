//! statewright - finite state machine toolkit
//!
//! Loads a machine definition and inspects, runs or renders it.

mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use statewright_core::MachineDefinition;
use statewright_viz::VisualizeType;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "statewright")]
#[command(about = "Inspect, run and render finite state machines")]
#[command(version)]
struct Cli {
    /// Machine definition (.json, .yaml/.yml, or a template)
    #[arg(short, long, env = "STATEWRIGHT_DEFINITION")]
    definition: PathBuf,

    /// Initial state (required for templates, overrides the definition otherwise)
    #[arg(short, long)]
    initial: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the events that can be fired from a state
    Events {
        /// State to inspect (defaults to the initial state)
        #[arg(short, long)]
        state: Option<String>,
    },

    /// Fire a sequence of events, printing each transition
    Run {
        /// Events to fire, in order
        #[arg(required = true)]
        events: Vec<String>,

        /// JSON arguments passed to every event (or @file.json)
        #[arg(short, long)]
        args: Option<String>,

        /// Keep going after a rejected event
        #[arg(short, long)]
        keep_going: bool,

        /// Print every callback phase
        #[arg(short, long)]
        verbose: bool,
    },

    /// Print a diagram of the machine
    Render {
        /// graphviz, mermaid, mermaid-state-diagram or mermaid-flow-chart
        #[arg(short, long, default_value = "graphviz")]
        format: VisualizeType,

        /// State to highlight (defaults to the initial state)
        #[arg(short, long)]
        state: Option<String>,
    },

    /// Validate the definition and print its checksum
    Check,
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let definition =
        match MachineDefinition::<String, String>::load(&cli.definition, cli.initial.as_deref()) {
            Ok(definition) => definition,
            Err(e) => {
                eprintln!("{}: {}", "Failed to load definition".red(), e);
                std::process::exit(1);
            }
        };
    tracing::debug!(
        "Loaded {} ({} transitions)",
        cli.definition.display(),
        definition.transitions.len()
    );

    match commands::execute(definition, cli.command) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    }
}

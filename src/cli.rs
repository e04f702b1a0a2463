//! Command line interface built on clap.
//!
//! [`Cli`] carries the [`Command`] subcommands (simulate, validate, items)
//! and the global `--verbose` flag.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Cart-side item picking for a mobile manipulator.
#[derive(Debug, Parser)]
#[command(name = "cartpick", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Debug-level logs for this crate.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Runs the task once against the simulated robot and prints the run report.
    Simulate {
        /// TOML task configuration. Without it a default setup is used.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Item to pick, overriding the configuration.
        #[arg(long)]
        item: Option<String>,

        /// Heading to face the cart with, degrees.
        #[arg(long, allow_negative_numbers = true)]
        angle: f64,

        /// Stand-off distance from the cart, meters.
        #[arg(long)]
        distance: Option<f64>,

        /// Start in the bench-test state.
        #[arg(long, default_value_t = false)]
        debug: bool,
    },

    /// Checks a task configuration without running anything.
    Validate {
        #[arg(long)]
        config: PathBuf,
    },

    /// Lists the items the task can pick and their tag ids.
    Items,
}

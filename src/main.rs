mod cli;

use std::path::Path;

use anyhow::{Context, Result, bail};
use clap::Parser;
use console::Style;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use cartpick::config::{ExecuteArgs, ITEM_CATALOG, TaskConfig, tag_for_item};
use cartpick::sim::{SimRobot, SimSettings};
use cartpick::task::TaskGraph;
use cartpick::ui::TaskProgress;
use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Simulate {
            config,
            item,
            angle,
            distance,
            debug,
        } => simulate(config.as_deref(), item, angle, distance, debug).await,
        Command::Validate { config } => validate(&config),
        Command::Items => {
            for (name, tag) in ITEM_CATALOG {
                println!("{tag:>3}  {name}");
            }
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let default_directive = if verbose {
        "cartpick=debug"
    } else {
        "cartpick=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

async fn simulate(
    config_path: Option<&Path>,
    item: Option<String>,
    angle: f64,
    distance: Option<f64>,
    debug: bool,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => TaskConfig::load(path)?,
        None => TaskConfig::new("nav_bottom", "sim_ward", "water bottle", 0.06),
    };
    if let Some(item) = item {
        config.item_name = item;
    }
    config.debug |= debug;

    let mut goal = ExecuteArgs::new(angle);
    if let Some(distance) = distance {
        goal.distance_to_goal = distance;
    }

    // Put the item's own marker in front of the simulated camera.
    let mut settings = SimSettings::default();
    let tag_id = tag_for_item(&config.item_name)?;
    if let Some(target) = settings.target.as_mut() {
        target.tag_id = tag_id;
    }

    let progress = TaskProgress::start(&config.item_name);
    let mut graph = TaskGraph::setup(config, SimRobot::new(settings), progress.clone())
        .await
        .context("task setup failed")?;
    let report = graph.execute(goal).await?;

    progress.finish(&report);
    progress.print_report(&report);
    if let Some(error) = report.error() {
        bail!("task aborted with code {}: {error}", error.code());
    }
    info!(run_id = %report.run_id, "simulation finished");
    Ok(())
}

fn validate(path: &Path) -> Result<()> {
    let config = TaskConfig::load(path)?;
    config
        .validate()
        .with_context(|| format!("{} is not a valid task configuration", path.display()))?;
    let tag_id = tag_for_item(&config.item_name)?;
    println!(
        "  {} {}: {} (tag {tag_id}) on map {}",
        Style::new().green().bold().apply_to("✓"),
        path.display(),
        config.item_name,
        config.map_name
    );
    Ok(())
}

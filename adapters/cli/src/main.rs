#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that replays scripted perception scenarios.

mod environment;
mod scenario;

use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context};
use clap::Parser;
use perception_core::{Command, Event, TargetStatus};
use perception_world::{self as world, query, SharedGrid, World};
use tracing_subscriber::{fmt, EnvFilter};

use crate::{
    environment::{Actors, AsciiGrid, GridRaycaster},
    scenario::Scenario,
};

/// Replays a scripted scenario and reports what the observers believe.
#[derive(Debug, Parser)]
#[command(
    name = "perception",
    author,
    version,
    about = "Replays scripted observer/target scenarios"
)]
struct Cli {
    /// Path to the scenario TOML file.
    #[arg(value_name = "FILE")]
    scenario: PathBuf,

    /// Override the number of steps to simulate.
    #[arg(long, value_name = "STEPS")]
    steps: Option<u32>,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, value_name = "FILTER", default_value = "info")]
    log_level: String,

    /// Print every target's belief grid after the final step.
    #[arg(long)]
    show_belief: bool,
}

/// Entry point for the perception command-line interface.
fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let scenario = Scenario::load(&cli.scenario)?;
    let steps = cli.steps.unwrap_or(scenario.steps);
    let grid = Arc::new(scenario.grid.clone());
    let mut world = build_world(&scenario, Arc::clone(&grid))?;
    let mut actors = Actors::from_scenario(&scenario);

    tracing::info!(
        scenario = %cli.scenario.display(),
        steps,
        observers = scenario.observers.len(),
        targets = scenario.targets.len(),
        "scenario loaded"
    );

    let mut events = Vec::new();
    for step in 1..=steps {
        actors.advance();
        events.clear();

        let oracle = GridRaycaster::new(&grid, &actors);
        world::step(&mut world, &actors, &oracle, &mut events);

        log_events(step, &events);
        print_step(step, &world);
    }

    if cli.show_belief {
        for target in query::targets(&world) {
            if let Some(belief) = query::belief(&world, target) {
                println!("belief of {target} after step {steps}:");
                print!("{}", grid.render_belief(belief));
            }
        }
    }

    Ok(())
}

fn init_logging(default_filter: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .with_context(|| format!("invalid log filter `{default_filter}`"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install the log subscriber")
}

fn build_world(scenario: &Scenario, grid: Arc<AsciiGrid>) -> anyhow::Result<World> {
    let shared: SharedGrid = grid;
    let mut world = World::with_grid(shared);
    let mut events = Vec::new();

    world::apply(
        &mut world,
        Command::ConfigureTuning {
            tuning: scenario.tuning,
        },
        &mut events,
    );
    for observer in &scenario.observers {
        world::apply(
            &mut world,
            Command::RegisterObserver {
                observer: observer.id,
                vision: observer.vision,
            },
            &mut events,
        );
    }
    for target in &scenario.targets {
        world::apply(
            &mut world,
            Command::RegisterTarget { target: target.id },
            &mut events,
        );
    }

    for event in &events {
        match event {
            Event::TuningRejected { reason } => bail!("scenario tuning rejected: {reason}"),
            Event::RegistrationRejected { reason } => {
                bail!("scenario registration rejected: {reason:?}")
            }
            _ => {}
        }
    }

    Ok(world)
}

fn log_events(step: u32, events: &[Event]) {
    for event in events {
        match event {
            Event::TargetStatusChanged { target, from, to } => {
                tracing::info!(step, target_guid = %target, ?from, ?to, "target status changed");
            }
            Event::BeliefCleared { target } => {
                tracing::info!(step, target_guid = %target, "belief cleared");
            }
            other => tracing::debug!(step, event = ?other),
        }
    }
}

fn print_step(step: u32, world: &World) {
    for target in query::targets(world) {
        let Some(cache) = query::target_cache(world, target) else {
            continue;
        };
        let status = match cache.status {
            TargetStatus::Unknown => "Unknown",
            TargetStatus::Immediate => "Immediate",
            TargetStatus::Hidden => "Hidden",
        };
        let mass = query::belief(world, target).map_or(0.0, |belief| belief.total_mass());

        if cache.status.is_known() {
            println!(
                "step {step:>4}  {target}  {status:<9}  ({:>8.1}, {:>8.1})  mass {mass:.3}",
                cache.position.x, cache.position.y
            );
        } else {
            println!("step {step:>4}  {target}  {status:<9}");
        }
    }
}

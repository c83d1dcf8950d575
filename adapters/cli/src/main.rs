#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Headless command-line runner for tower defence levels.
//!
//! Loads a level, builds the requested emplacements, starts the waves and
//! advances fixed-size frames until the level completes, the player is
//! defeated or the frame limit is reached. Events go to stdout, diagnostics to stderr.

mod placement;

use std::{
    io::{self, Write},
    path::PathBuf,
    time::Duration,
};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tower_defense_core::{Command, Event};
use tower_defense_world::{apply, query, World};
use tracing_subscriber::EnvFilter;

use placement::Placement;

/// Runs a tower defence level without presentation.
#[derive(Debug, Parser)]
#[command(name = "tower-defense", version, about)]
struct Args {
    /// Level document to load.
    #[arg(long)]
    level: PathBuf,
    /// Maximum number of frames to simulate.
    #[arg(long, default_value_t = 3_600)]
    frames: u64,
    /// Simulated milliseconds per frame, before the game speed is applied.
    #[arg(long = "dt-ms", default_value_t = 16)]
    dt_ms: u64,
    /// Game speed multiplier.
    #[arg(long, default_value_t = 1.0)]
    speed: f32,
    /// Emplacement to build before waves start. May be repeated.
    #[arg(long = "place", value_name = "ARCHETYPE@X,Y")]
    placements: Vec<Placement>,
    /// Print events and the summary as JSON lines.
    #[arg(long)]
    json: bool,
    /// Log filter used when `RUST_LOG` is not set.
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Final state of a run.
#[derive(Debug, Serialize)]
struct Summary<'a> {
    level: &'a str,
    frames: u64,
    elapsed_secs: f64,
    level_completed: bool,
    defeated: bool,
    lives: u32,
    waves_total: usize,
    all_spawns_issued: bool,
    units_remaining: usize,
    emplacements: usize,
    projectiles_in_flight: usize,
}

#[derive(Serialize)]
struct EventLine<'a> {
    frame: u64,
    event: &'a Event,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level)?;

    let mut world = World::load_level_file(&args.level)
        .with_context(|| format!("failed to load level {}", args.level.display()))?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut events = Vec::new();

    let setup = std::iter::once(Command::SetGameSpeed { speed: args.speed })
        .chain(args.placements.iter().map(Placement::command))
        .chain(std::iter::once(Command::StartWaves));
    for command in setup {
        apply(&mut world, command, &mut events);
    }
    write_events(&mut out, 0, &mut events, args.json)?;

    let dt = Duration::from_millis(args.dt_ms);
    let mut frames = 0;
    while frames < args.frames && !query::level_completed(&world) && !query::is_defeated(&world)
    {
        frames += 1;
        apply(&mut world, Command::Tick { dt }, &mut events);
        write_events(&mut out, frames, &mut events, args.json)?;
    }

    let progress = query::wave_progress(&world);
    let summary = Summary {
        level: query::level_id(&world),
        frames,
        elapsed_secs: query::elapsed(&world).as_secs_f64(),
        level_completed: query::level_completed(&world),
        defeated: query::is_defeated(&world),
        lives: query::lives(&world),
        waves_total: progress.total_waves,
        all_spawns_issued: progress.all_spawns_issued,
        units_remaining: query::unit_count(&world),
        emplacements: query::emplacements(&world).len(),
        projectiles_in_flight: query::projectile_count(&world),
    };
    write_summary(&mut out, &summary, args.json)?;
    tracing::info!(
        frames,
        completed = summary.level_completed,
        defeated = summary.defeated,
        "run finished"
    );
    Ok(())
}

fn init_tracing(default_filter: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter)
            .with_context(|| format!("invalid log filter '{default_filter}'"))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
    Ok(())
}

fn write_events(
    out: &mut impl Write,
    frame: u64,
    events: &mut Vec<Event>,
    json: bool,
) -> Result<()> {
    for event in events.drain(..) {
        if matches!(event, Event::TimeAdvanced { .. }) {
            continue;
        }
        if json {
            serde_json::to_writer(&mut *out, &EventLine {
                frame,
                event: &event,
            })
            .context("failed to encode event")?;
            writeln!(out)?;
        } else {
            writeln!(out, "[{frame:>6}] {event:?}")?;
        }
    }
    Ok(())
}

fn write_summary(out: &mut impl Write, summary: &Summary<'_>, json: bool) -> Result<()> {
    if json {
        serde_json::to_writer(&mut *out, summary).context("failed to encode summary")?;
        writeln!(out)?;
        return Ok(());
    }

    writeln!(out, "level:               {}", summary.level)?;
    writeln!(out, "frames:              {}", summary.frames)?;
    writeln!(out, "simulated seconds:   {:.2}", summary.elapsed_secs)?;
    writeln!(out, "level completed:     {}", summary.level_completed)?;
    writeln!(out, "defeated:            {}", summary.defeated)?;
    writeln!(out, "lives:               {}", summary.lives)?;
    writeln!(
        out,
        "waves:               {} ({})",
        summary.waves_total,
        if summary.all_spawns_issued {
            "all spawned"
        } else {
            "in progress"
        }
    )?;
    writeln!(out, "units remaining:     {}", summary.units_remaining)?;
    writeln!(out, "emplacements:        {}", summary.emplacements)?;
    writeln!(out, "projectiles:         {}", summary.projectiles_in_flight)?;
    Ok(())
}

//! Sandtris: falling tetrominoes that shatter into physics-driven sand, in the terminal.

mod app;
mod config;
mod game;
mod grain;
mod grid;
mod input;
mod observe;
mod physics;
mod piece;
mod render;
mod rollout;
mod theme;
mod ui;

use anyhow::{Context, Result};
use app::App;
use clap::{Parser, ValueEnum};
use config::SimConfig;
use game::Session;
use rollout::{NoopPolicy, Policy, RandomPolicy};
use std::path::{Path, PathBuf};

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.headless, args.log_file.as_deref())?;

    let config = args.sim_config();
    config.validate().context("invalid simulation settings")?;
    let mut session = Session::new(config)?;

    if args.headless {
        let mut policy: Box<dyn Policy> = match args.policy {
            PolicyKind::Random => Box::new(RandomPolicy::new(args.seed)),
            PolicyKind::Noop => Box::new(NoopPolicy),
        };
        let report = rollout::run(&mut session, policy.as_mut(), args.ticks)
            .context("headless rollout stopped")?;
        println!("{report}");
        return Ok(());
    }

    let theme = theme::Theme::load(args.theme.as_deref(), args.palette).unwrap_or_else(|e| {
        log::warn!("theme not loaded, using defaults: {e}");
        theme::Theme::default()
    });
    let mut app = App::new(session, theme, args.no_animation);
    app.run()?;
    Ok(())
}

/// Terminal mode logs only to `--log-file` so the screen stays clean; headless logs to stderr.
fn init_logging(headless: bool, log_file: Option<&Path>) -> Result<()> {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    match log_file {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("cannot create log file {}", path.display()))?;
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }
        None if headless => {
            builder.target(env_logger::Target::Stderr);
        }
        None => return Ok(()),
    }
    builder.try_init().context("logger already initialised")?;
    Ok(())
}

/// Sandtris: Tetris pieces that turn into sand.
#[derive(Debug, Parser)]
#[command(
    name = "sandtris",
    version,
    about = "Falling-sand block puzzle in the terminal. Landed pieces shatter into grains; fill a row with one colour to clear it.",
    long_about = "Sandtris is a terminal puzzle game where every landed tetromino shatters into \
        small physical grains that tumble and settle. A row clears when grains of a single \
        colour span it edge to edge.\n\n\
        CONTROLS:\n  Left/h Right/l  Move    Up/k/i  Rotate    Down/j  Soft drop\n  \
        P/Space Pause    R Restart    Q/Esc Quit\n\n\
        Use --headless to run the simulation without a terminal and print a summary."
)]
pub struct Args {
    /// Playfield width in blocks.
    #[arg(long, default_value = "10", value_name = "COLS")]
    pub width: u16,

    /// Playfield height in blocks.
    #[arg(long, default_value = "20", value_name = "ROWS")]
    pub height: u16,

    /// Block edge length in world units.
    #[arg(long, default_value = "20.0", value_name = "UNITS")]
    pub block_size: f32,

    /// Grain radius in world units.
    #[arg(long, default_value = "2.0", value_name = "UNITS")]
    pub grain_radius: f32,

    /// Number of colours in play (1-7).
    #[arg(short, long, default_value = "4", value_name = "N")]
    pub colors: usize,

    /// Seed for the piece sequence (and the random policy). Random if not set.
    #[arg(short, long, value_name = "SEED")]
    pub seed: Option<u64>,

    /// Simulation ticks per second.
    #[arg(long, default_value = "60", value_name = "RATE")]
    pub fps: u32,

    /// Automatic drop interval in ms.
    #[arg(long, default_value = "500", value_name = "MS")]
    pub drop_interval_ms: u64,

    /// Physics solver iterations per step.
    #[arg(long, default_value = "30", value_name = "N")]
    pub solver_iterations: usize,

    /// No side walls: grains may spill off the sides.
    #[arg(long)]
    pub no_walls: bool,

    /// Path to theme file (btop-style theme[key]=\"value\"). Uses One Dark if not set.
    #[arg(short, long, value_name = "FILE")]
    pub theme: Option<PathBuf>,

    /// Colour palette: normal (theme), high-contrast, or colorblind.
    #[arg(long, default_value = "normal")]
    pub palette: Palette,

    /// Disable the line-clear fade.
    #[arg(long)]
    pub no_animation: bool,

    /// Write logs to this file (RUST_LOG sets the level).
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Run without a terminal and print a summary.
    #[arg(long)]
    pub headless: bool,

    /// Headless: ticks to simulate.
    #[arg(long, default_value = "3600", value_name = "N")]
    pub ticks: u64,

    /// Headless: how actions are chosen.
    #[arg(long, default_value = "random")]
    pub policy: PolicyKind,
}

impl Args {
    fn sim_config(&self) -> SimConfig {
        SimConfig {
            columns: self.width,
            rows: self.height,
            block_size: self.block_size,
            grain_radius: self.grain_radius,
            colors: self.colors,
            seed: self.seed,
            fps: self.fps,
            drop_interval_ms: self.drop_interval_ms,
            solver_iterations: self.solver_iterations,
            side_walls: !self.no_walls,
            ..SimConfig::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Palette {
    #[default]
    Normal,

    #[value(alias = "highcontrast", alias = "contrast")]
    HighContrast,

    #[value(alias = "colourblind")]
    Colorblind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum PolicyKind {
    #[default]
    Random,
    Noop,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_sim_defaults() {
        let args = Args::parse_from(["sandtris"]);
        assert_eq!(args.sim_config(), SimConfig::default());
    }

    #[test]
    fn flags_reach_the_config() {
        let args = Args::parse_from([
            "sandtris",
            "--width",
            "12",
            "--colors",
            "7",
            "--seed",
            "9",
            "--no-walls",
            "--headless",
            "--policy",
            "noop",
        ]);
        let cfg = args.sim_config();
        assert_eq!((cfg.columns, cfg.colors, cfg.seed), (12, 7, Some(9)));
        assert!(!cfg.side_walls);
        assert_eq!(args.policy, PolicyKind::Noop);
    }

    #[test]
    fn palette_aliases_parse() {
        let args = Args::parse_from(["sandtris", "--palette", "colourblind"]);
        assert_eq!(args.palette, Palette::Colorblind);
    }
}

//! App: terminal init, fixed-timestep loop, key handling.

use crate::game::{Action, Session};
use crate::input::{Command, key_to_command};
use crate::theme::Theme;
use crate::ui::{self, View};
use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyEventKind};
use ratatui::DefaultTerminal;
use std::time::{Duration, Instant};
use tachyonfx::Effect;

/// DAS (Delayed Auto-Shift): delay before movement starts repeating when you hold a key.
const REPEAT_DELAY_MS: u64 = 170;
/// ARR (Auto-Repeat Rate): time between repeated moves while holding. 50 ms ≈ 20 moves/sec.
const REPEAT_INTERVAL_MS: u64 = 50;
/// Ticks we are willing to run in one frame to catch up after a stall.
const MAX_CATCH_UP_TICKS: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Playing,
    GameOver,
}

pub struct App {
    session: Session,
    theme: Theme,
    no_animation: bool,
    screen: Screen,
    paused: bool,
    /// Action for the next tick; later presses overwrite earlier ones.
    pending: Option<Action>,
    repeat_state: Option<(Action, Instant)>,
    last_repeat_fire: Option<Instant>,
    tick_interval: Duration,
    last_tick: Instant,
    /// World-space height bands of the rows cleared most recently.
    flash_bands: Vec<(f32, f32)>,
    /// TachyonFX fade effect for line-clear (created when the flash starts).
    line_clear_effect: Option<Effect>,
    /// Last time we processed the line-clear effect (for delta).
    line_clear_effect_process_time: Option<Instant>,
    /// Best score this run, not persisted.
    best: u64,
}

impl App {
    pub fn new(session: Session, theme: Theme, no_animation: bool) -> Self {
        let tick_interval = Duration::from_secs_f64(1.0 / f64::from(session.config().fps));
        Self {
            session,
            theme,
            no_animation,
            screen: Screen::Playing,
            paused: false,
            pending: None,
            repeat_state: None,
            last_repeat_fire: None,
            tick_interval,
            last_tick: Instant::now(),
            flash_bands: Vec::new(),
            line_clear_effect: None,
            line_clear_effect_process_time: None,
            best: 0,
        }
    }

    fn restart(&mut self) {
        self.session.reset();
        self.screen = Screen::Playing;
        self.paused = false;
        self.pending = None;
        self.repeat_state = None;
        self.last_repeat_fire = None;
        self.last_tick = Instant::now();
        self.clear_flash();
    }

    fn clear_flash(&mut self) {
        self.flash_bands.clear();
        self.line_clear_effect = None;
        self.line_clear_effect_process_time = None;
    }

    fn tick_repeat(&mut self) {
        let now = Instant::now();
        let Some((action, first)) = self.repeat_state else {
            return;
        };
        if first.elapsed() < Duration::from_millis(REPEAT_DELAY_MS) {
            return;
        }
        let next = self.last_repeat_fire.unwrap_or(first) + Duration::from_millis(REPEAT_INTERVAL_MS);
        if now >= next {
            self.pending = Some(action);
            self.last_repeat_fire = Some(now);
        }
    }

    /// One simulation tick. A fatal simulation error ends the app.
    fn tick(&mut self) -> Result<()> {
        let action = self.pending.take().unwrap_or(Action::NoOp);
        let out = self
            .session
            .step(action)
            .context("simulation stopped")?;
        if !out.report.cleared.is_empty() && !self.no_animation {
            let cell = self.session.config().grain_diameter();
            self.clear_flash();
            self.flash_bands = out
                .report
                .cleared
                .rows
                .iter()
                .map(|r| (r.row as f32 * cell, (r.row + 1) as f32 * cell))
                .collect();
        }
        if out.report.landed() {
            // A new piece should not inherit the old piece's held key.
            self.repeat_state = None;
        }
        self.best = self.best.max(self.session.stats().grains_cleared);
        if out.done {
            self.screen = Screen::GameOver;
            self.repeat_state = None;
        }
        Ok(())
    }

    pub fn run(&mut self) -> Result<()> {
        use crossterm::{
            event::{KeyboardEnhancementFlags, PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags},
            execute,
            terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
        };

        enable_raw_mode()?;
        let mut stdout = std::io::stdout();
        execute!(stdout, EnterAlternateScreen)?;

        // Attempt to enable enhanced keyboard for Release events
        let _ = execute!(
            stdout,
            PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
        );

        let mut terminal = ratatui::DefaultTerminal::new(ratatui::backend::CrosstermBackend::new(stdout))?;
        log::info!("terminal ready, {} Hz", self.session.config().fps);

        let result = self.run_loop(&mut terminal);

        // Restore
        let _ = execute!(std::io::stdout(), PopKeyboardEnhancementFlags);
        execute!(std::io::stdout(), LeaveAlternateScreen)?;
        disable_raw_mode()?;

        if let Err(e) = &result {
            log::error!("{e:#}");
        }
        result
    }

    fn run_loop(&mut self, terminal: &mut DefaultTerminal) -> Result<()> {
        loop {
            let now = Instant::now();
            terminal.draw(|f| {
                let view = View {
                    session: &self.session,
                    theme: &self.theme,
                    screen: self.screen,
                    paused: self.paused,
                    best: self.best,
                    flash_bands: &self.flash_bands,
                };
                ui::draw(
                    f,
                    &view,
                    &mut self.line_clear_effect,
                    &mut self.line_clear_effect_process_time,
                    now,
                );
            })?;

            if self.line_clear_effect.as_ref().is_some_and(|e| e.done()) {
                self.clear_flash();
            }

            let timeout = (self.last_tick + self.tick_interval).saturating_duration_since(Instant::now());
            if event::poll(timeout)? {
                while event::poll(Duration::ZERO)? {
                    let Event::Key(key) = event::read()? else {
                        continue;
                    };
                    let command = key_to_command(key);

                    // Only first presses count; releases stop our own repeat.
                    if key.kind != KeyEventKind::Press {
                        if key.kind == KeyEventKind::Release
                            && self.repeat_state.map(|(a, _)| Command::Game(a)) == Some(command)
                        {
                            self.repeat_state = None;
                            self.last_repeat_fire = None;
                        }
                        continue;
                    }
                    if self.repeat_state.map(|(a, _)| Command::Game(a)) == Some(command) {
                        continue;
                    }

                    match (self.screen, command) {
                        (_, Command::Quit) => return Ok(()),
                        (_, Command::Restart) => self.restart(),
                        (Screen::Playing, Command::Pause) => {
                            self.paused = !self.paused;
                            self.repeat_state = None;
                            self.last_tick = Instant::now();
                        }
                        (Screen::Playing, Command::Game(action)) if !self.paused => {
                            self.pending = Some(action);
                            if command.repeats() {
                                self.repeat_state = Some((action, Instant::now()));
                                self.last_repeat_fire = None;
                            }
                        }
                        _ => {}
                    }
                }
            }

            if self.screen == Screen::Playing && !self.paused {
                self.tick_repeat();
                let mut ran = 0;
                while self.last_tick.elapsed() >= self.tick_interval {
                    if ran == MAX_CATCH_UP_TICKS {
                        self.last_tick = Instant::now();
                        break;
                    }
                    self.last_tick += self.tick_interval;
                    self.tick()?;
                    ran += 1;
                    if self.screen != Screen::Playing {
                        break;
                    }
                }
            }
        }
    }
}

//! Headless rollouts: drive a session with a policy, no terminal involved.

use std::fmt;

use rand::prelude::*;

use crate::game::{Action, GameError, Session};
use crate::observe::Observation;

/// Picks the next action from the current board.
///
/// Object-safe so it can be used as `Box<dyn Policy>`.
pub trait Policy {
    fn choose(&mut self, observation: &Observation) -> Action;

    fn name(&self) -> &'static str;
}

pub struct RandomPolicy {
    rng: StdRng,
}

impl RandomPolicy {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }
}

impl Policy for RandomPolicy {
    fn choose(&mut self, _observation: &Observation) -> Action {
        Action::from_index(self.rng.gen_range(0..Action::ALL.len())).unwrap_or(Action::NoOp)
    }

    fn name(&self) -> &'static str {
        "random"
    }
}

/// Lets every piece fall straight down.
pub struct NoopPolicy;

impl Policy for NoopPolicy {
    fn choose(&mut self, _observation: &Observation) -> Action {
        Action::NoOp
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RolloutReport {
    pub policy: &'static str,
    pub ticks: u64,
    /// Finished episodes; a cut-off last episode is not counted.
    pub episodes: u64,
    pub pieces: u64,
    pub rows_cleared: u64,
    pub grains_cleared: u64,
    pub total_reward: f64,
}

impl RolloutReport {
    /// Reward per finished episode. None until an episode finishes.
    pub fn mean_reward(&self) -> Option<f64> {
        (self.episodes > 0).then(|| self.total_reward / self.episodes as f64)
    }
}

impl fmt::Display for RolloutReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<15}{}", "policy", self.policy)?;
        writeln!(f, "{:<15}{}", "ticks", self.ticks)?;
        writeln!(f, "{:<15}{}", "episodes", self.episodes)?;
        writeln!(f, "{:<15}{}", "pieces", self.pieces)?;
        writeln!(f, "{:<15}{}", "rows cleared", self.rows_cleared)?;
        writeln!(f, "{:<15}{}", "grains cleared", self.grains_cleared)?;
        writeln!(f, "{:<15}{:.2}", "total reward", self.total_reward)?;
        match self.mean_reward() {
            Some(mean) => write!(f, "{:<15}{:.2}", "mean reward", mean),
            None => write!(f, "{:<15}n/a", "mean reward"),
        }
    }
}

/// Steps `session` for `ticks` ticks, resetting whenever an episode ends.
/// A fatal session error stops the run.
pub fn run(session: &mut Session, policy: &mut dyn Policy, ticks: u64) -> Result<RolloutReport, GameError> {
    let mut report = RolloutReport {
        policy: policy.name(),
        ..RolloutReport::default()
    };
    if session.is_halted() {
        session.reset();
    }
    let mut observation = session.observation().clone();
    for _ in 0..ticks {
        let action = policy.choose(&observation);
        let out = session.step(action)?;
        report.ticks += 1;
        report.total_reward += f64::from(out.reward);
        report.rows_cleared += out.report.cleared.rows.len() as u64;
        report.grains_cleared += out.report.cleared.removed as u64;
        if out.report.landed() {
            report.pieces += 1;
        }
        observation = out.observation;
        if session.is_done() {
            report.episodes += 1;
            log::info!(
                "episode {} finished after {} ticks",
                report.episodes,
                session.stats().ticks
            );
            observation = session.reset().clone();
        }
    }
    Ok(report)
}

//! Turn-taking engine
//!
//! Decides who a confederate throws to and how long it "thinks" first.
//!
//! Two selection policies:
//! 1. Weighted random over all players, resampled until the recipient is not
//!    the thrower
//! 2. A scripted schedule of symbolic targets, consumed one per confederate
//!    throw; once exhausted, policy 1 takes over
//!
//! Players are addressed by roster index; the weights are aligned with the
//! roster (participant first, then confederates).

use std::collections::VecDeque;

use rand::Rng;

use crate::choice::{pick_another, skewed_random_time, uniform_time};

/// A symbolic recipient in a throw schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Participant,
    /// Some confederate other than the thrower
    Confederate,
}

impl Target {
    /// `'P'` is the participant; every other symbol means a confederate
    pub fn from_symbol(c: char) -> Self {
        if c == 'P' {
            Target::Participant
        } else {
            Target::Confederate
        }
    }

    pub fn parse_schedule(s: &str) -> Vec<Target> {
        s.chars()
            .filter(|c| !c.is_whitespace() && *c != ',')
            .map(Target::from_symbol)
            .collect()
    }
}

/// Confederate thinking-time window, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThinkTime {
    pub min: u64,
    pub max: u64,
    /// Extra uniform noise in `[0, jitter)`
    pub jitter: u64,
    /// Favor the low end of the window instead of sampling uniformly
    pub skewed: bool,
}

impl ThinkTime {
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u64 {
        let base = if self.skewed {
            skewed_random_time(rng, self.min, self.max)
        } else {
            uniform_time(rng, self.min, self.max)
        };
        let noise = if self.jitter > 0 {
            rng.random_range(0..self.jitter)
        } else {
            0
        };
        base + noise
    }
}

#[derive(Debug, Clone)]
pub struct TurnEngine {
    weights: Vec<f64>,
    schedule: VecDeque<Target>,
    think: ThinkTime,
}

impl TurnEngine {
    pub fn new(weights: Vec<f64>, schedule: Vec<Target>, think: ThinkTime) -> Self {
        Self {
            weights,
            schedule: schedule.into(),
            think,
        }
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Schedule entries not yet consumed
    pub fn remaining_script(&self) -> usize {
        self.schedule.len()
    }

    pub fn thinking_time<R: Rng + ?Sized>(&self, rng: &mut R) -> u64 {
        self.think.sample(rng)
    }

    /// Pick the recipient for a throw by `thrower`.
    ///
    /// `participant` is the participant's roster index; every other index
    /// below `weights.len()` is a confederate. Never returns `thrower`.
    pub fn select_recipient<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        thrower: usize,
        participant: usize,
    ) -> Option<usize> {
        if let Some(target) = self.schedule.pop_front() {
            let scripted = match target {
                Target::Participant if participant != thrower => Some(participant),
                Target::Participant => None,
                Target::Confederate => {
                    let others: Vec<usize> = (0..self.weights.len())
                        .filter(|&i| i != participant && i != thrower)
                        .collect();
                    match others.len() {
                        0 => None,
                        1 => Some(others[0]),
                        n => Some(others[rng.random_range(0..n)]),
                    }
                }
            };
            if scripted.is_some() {
                return scripted;
            }
            log::debug!("Schedule entry {target:?} has no valid recipient, using weights");
        }
        pick_another(rng, &self.weights, thrower)
    }
}

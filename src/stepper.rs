//! Gillespie direct method.
//!
//! Given propensities `a_j` with total `a0 > 0` and two independent draws
//! `r1, r2` from the open unit interval, the next event happens after
//! `dt = -ln(r1) / a0` and is the smallest `j` whose cumulative propensity
//! reaches `r2 * a0`.

use rand::Rng;
use rand::distributions::Open01;

use crate::propensity::{PropensityEngine, select_linear};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Event {
    pub dt: f64,
    pub reaction: usize,
}

#[inline]
pub fn waiting_time(total_propensity: f64, r1: f64) -> f64 {
    -r1.ln() / total_propensity
}

/// Pure form of one direct-method step. `None` when `a0 == 0`.
pub fn next_event(propensities: &[f64], total_propensity: f64, r1: f64, r2: f64) -> Option<Event> {
    if total_propensity <= 0.0 || propensities.is_empty() {
        return None;
    }
    Some(Event {
        dt: waiting_time(total_propensity, r1),
        reaction: select_linear(propensities, r2 * total_propensity),
    })
}

/// Wraps the random source for one replicate.
pub struct SsaStepper<R> {
    rng: R,
}

impl<R: Rng> SsaStepper<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    #[inline]
    fn uniform(&mut self) -> f64 {
        self.rng.sample(Open01)
    }

    pub fn step(&mut self, engine: &PropensityEngine<'_>) -> Option<Event> {
        let total = engine.total();
        if total <= 0.0 {
            return None;
        }
        let r1 = self.uniform();
        let r2 = self.uniform();
        Some(Event {
            dt: waiting_time(total, r1),
            reaction: engine.select(r2 * total),
        })
    }

    pub fn into_inner(self) -> R {
        self.rng
    }
}

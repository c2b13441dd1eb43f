//! Single-replicate simulation loop.
//!
//! Each replicate walks the phases `Running -> Sampling -> Running ... ->
//! Finished`, with `Absorbed` entered once no reaction can fire and
//! `Incomplete` entered when a [`RunLimits`] bound trips first. Samples are
//! taken from the right-continuous step function: the value recorded at `t` is
//! the state produced by the last event at or before `t`.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use rand::Rng;

use crate::error::{SimError, config_err};
use crate::network::ReactionNetwork;
use crate::propensity::{PropensityEngine, Selection};
use crate::recorder::{StateRecorder, TimeGrid};
use crate::stepper::{Event, SsaStepper};

const WALL_CLOCK_CHECK_INTERVAL: u64 = 1024;

/// Starting counts for a run.
///
/// Continuation runs pass the final counts of a previous run back in here.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum InitialState {
    /// The network's declared initial counts.
    #[default]
    Declared,
    /// One count per species, in network order.
    Counts(Vec<i64>),
    /// Counts keyed by species name; species not named keep their declared count.
    Named(HashMap<String, i64>),
    /// One count vector per replicate.
    PerReplicate(Vec<Vec<i64>>),
}

impl InitialState {
    pub fn named<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        Self::Named(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub(crate) fn resolve(
        &self,
        network: &ReactionNetwork,
        replicates: usize,
    ) -> Result<ResolvedInitial, SimError> {
        let n_species = network.n_species();
        match self {
            InitialState::Declared => Ok(ResolvedInitial::Shared(network.initial_counts())),
            InitialState::Counts(counts) => {
                if counts.len() != n_species {
                    return Err(SimError::Shape(format!(
                        "initial state length {} does not match number of species {}",
                        counts.len(),
                        n_species
                    )));
                }
                Ok(ResolvedInitial::Shared(non_negative(network, counts)?))
            }
            InitialState::Named(map) => {
                let mut counts: Vec<i64> =
                    network.initial_counts().into_iter().map(|c| c as i64).collect();
                for (name, &value) in map {
                    let idx = network.species_index(name).ok_or_else(|| {
                        config_err(format!("initial state names unknown species '{}'", name))
                    })?;
                    counts[idx] = value;
                }
                Ok(ResolvedInitial::Shared(non_negative(network, &counts)?))
            }
            InitialState::PerReplicate(rows) => {
                if rows.len() != replicates {
                    return Err(SimError::Shape(format!(
                        "initial_states length {} does not match number of replicates {}",
                        rows.len(),
                        replicates
                    )));
                }
                let mut resolved = Vec::with_capacity(rows.len());
                for (idx, row) in rows.iter().enumerate() {
                    if row.len() != n_species {
                        return Err(SimError::Shape(format!(
                            "initial_states row {} has length {} but network has {} species",
                            idx,
                            row.len(),
                            n_species
                        )));
                    }
                    resolved.push(non_negative(network, row)?);
                }
                Ok(ResolvedInitial::PerReplicate(resolved))
            }
        }
    }
}

fn non_negative(network: &ReactionNetwork, counts: &[i64]) -> Result<Vec<u64>, SimError> {
    counts
        .iter()
        .enumerate()
        .map(|(idx, &c)| {
            u64::try_from(c).map_err(|_| {
                config_err(format!(
                    "initial count for species '{}' is negative ({})",
                    network.species()[idx].name,
                    c
                ))
            })
        })
        .collect()
}

#[derive(Clone, Debug)]
pub(crate) enum ResolvedInitial {
    Shared(Vec<u64>),
    PerReplicate(Vec<Vec<u64>>),
}

impl ResolvedInitial {
    pub(crate) fn for_replicate(&self, replicate: usize) -> &[u64] {
        match self {
            ResolvedInitial::Shared(state) => state,
            ResolvedInitial::PerReplicate(rows) => &rows[replicate],
        }
    }
}

/// Per-replicate bounds. Tripping one yields [`ReplicateStatus::Incomplete`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RunLimits {
    pub max_steps: Option<u64>,
    pub max_wall_time: Option<Duration>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ReplicateStatus {
    /// Every sample time was reached by stepping.
    Finished,
    /// Total propensity hit zero at `at`; later samples repeat the final state.
    Absorbed { at: f64 },
    /// A run limit stopped stepping; only the first `recorded` samples are genuine.
    Incomplete { recorded: usize },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReplicateOutcome {
    pub status: ReplicateStatus,
    pub steps: u64,
    pub clock: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RunPhase {
    Running,
    Sampling,
    Absorbed,
    Incomplete,
    Finished,
}

/// Settings shared by every replicate of one run.
#[derive(Clone, Copy, Debug)]
pub struct ReplicateConfig<'a> {
    pub grid: &'a TimeGrid,
    pub limits: RunLimits,
    pub selection: Selection,
}

/// Simulates one replicate from `initial`, writing `[time, species]` rows into `output`.
pub fn simulate_replicate_into<R: Rng>(
    network: &ReactionNetwork,
    initial: &[u64],
    config: ReplicateConfig<'_>,
    rng: R,
    output: &mut [u64],
) -> Result<ReplicateOutcome, SimError> {
    let n_species = network.n_species();
    if initial.len() != n_species {
        return Err(SimError::Shape(format!(
            "initial state length {} does not match number of species {}",
            initial.len(),
            n_species
        )));
    }
    if output.len() != config.grid.len() * n_species {
        return Err(SimError::Shape(format!(
            "output buffer length {} does not match {} samples x {} species",
            output.len(),
            config.grid.len(),
            n_species
        )));
    }

    let mut state = initial.to_vec();
    let mut engine = PropensityEngine::new(network, config.selection);
    engine.recompute(&state)?;
    let mut stepper = SsaStepper::new(rng);
    let mut recorder = StateRecorder::new(config.grid.points(), output, n_species);

    let started = Instant::now();
    let mut clock = 0.0f64;
    let mut steps = 0u64;
    let mut pending: Option<Event> = None;
    let mut status = ReplicateStatus::Finished;
    let mut phase = RunPhase::Running;

    loop {
        phase = match phase {
            RunPhase::Running => {
                if recorder.is_full() {
                    RunPhase::Finished
                } else if limit_reached(&config.limits, steps, started) {
                    RunPhase::Incomplete
                } else {
                    match stepper.step(&engine) {
                        None => RunPhase::Absorbed,
                        Some(event) => {
                            let next_clock = clock + event.dt;
                            pending = Some(event);
                            if recorder.next_time().is_some_and(|t| t < next_clock) {
                                RunPhase::Sampling
                            } else {
                                fire(network, &mut engine, &mut state, &mut pending, &mut clock)?;
                                steps += 1;
                                RunPhase::Running
                            }
                        }
                    }
                }
            }
            RunPhase::Sampling => {
                let next_clock = pending.map_or(f64::INFINITY, |e| clock + e.dt);
                recorder.record_before(next_clock, &state);
                if recorder.is_full() {
                    RunPhase::Finished
                } else {
                    fire(network, &mut engine, &mut state, &mut pending, &mut clock)?;
                    steps += 1;
                    RunPhase::Running
                }
            }
            RunPhase::Absorbed => {
                status = ReplicateStatus::Absorbed { at: clock };
                recorder.fill_remaining(&state);
                RunPhase::Finished
            }
            RunPhase::Incomplete => {
                status = ReplicateStatus::Incomplete {
                    recorded: recorder.recorded(),
                };
                recorder.fill_remaining(&state);
                RunPhase::Finished
            }
            RunPhase::Finished => break,
        };
    }

    Ok(ReplicateOutcome {
        status,
        steps,
        clock,
    })
}

fn fire(
    network: &ReactionNetwork,
    engine: &mut PropensityEngine<'_>,
    state: &mut [u64],
    pending: &mut Option<Event>,
    clock: &mut f64,
) -> Result<(), SimError> {
    if let Some(event) = pending.take() {
        network.apply(event.reaction, state)?;
        *clock += event.dt;
        engine.update_after(event.reaction, state)?;
    }
    Ok(())
}

fn limit_reached(limits: &RunLimits, steps: u64, started: Instant) -> bool {
    if limits.max_steps.is_some_and(|max| steps >= max) {
        return true;
    }
    match limits.max_wall_time {
        Some(budget) if steps % WALL_CLOCK_CHECK_INTERVAL == 0 => started.elapsed() >= budget,
        _ => false,
    }
}

/// One replicate's recorded samples.
#[derive(Clone, Debug, PartialEq)]
pub struct Trajectory {
    pub times: Vec<f64>,
    pub states: Vec<u64>,
    pub n_species: usize,
    pub outcome: ReplicateOutcome,
}

impl Trajectory {
    pub fn sample(&self, time_idx: usize) -> &[u64] {
        let start = time_idx * self.n_species;
        &self.states[start..start + self.n_species]
    }

    pub fn samples(&self) -> impl Iterator<Item = (f64, &[u64])> + '_ {
        self.times
            .iter()
            .copied()
            .zip(self.states.chunks_exact(self.n_species.max(1)))
    }

    pub fn last(&self) -> &[u64] {
        self.sample(self.times.len() - 1)
    }
}

/// Runs a single replicate and returns its trajectory.
pub fn simulate_single<R: Rng>(
    network: &ReactionNetwork,
    initial: &InitialState,
    config: ReplicateConfig<'_>,
    rng: R,
) -> Result<Trajectory, SimError> {
    let resolved = initial.resolve(network, 1)?;
    let mut states = vec![0u64; config.grid.len() * network.n_species()];
    let outcome =
        simulate_replicate_into(network, resolved.for_replicate(0), config, rng, &mut states)?;
    Ok(Trajectory {
        times: config.grid.points().to_vec(),
        states,
        n_species: network.n_species(),
        outcome,
    })
}

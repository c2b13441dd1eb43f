//! Independent replicates run as a parallel map over replicate index.

use std::collections::HashMap;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;

use crate::driver::{
    InitialState, ReplicateConfig, ReplicateOutcome, ReplicateStatus, RunLimits, Trajectory,
    simulate_replicate_into,
};
use crate::error::{SimError, config_err};
use crate::network::ReactionNetwork;
use crate::propensity::Selection;
use crate::recorder::TimeGrid;

#[derive(Clone, Debug)]
pub struct SimulationOptions {
    pub time_grid: TimeGrid,
    pub replicates: usize,
    pub threads: Option<usize>,
    pub seed: Option<u64>,
    pub limits: RunLimits,
    pub selection: Selection,
}

impl SimulationOptions {
    pub fn new(time_grid: TimeGrid, replicates: usize) -> Self {
        Self {
            time_grid,
            replicates,
            threads: None,
            seed: None,
            limits: RunLimits::default(),
            selection: Selection::default(),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    pub fn with_limits(mut self, limits: RunLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }

    fn replicate_config(&self) -> ReplicateConfig<'_> {
        ReplicateConfig {
            grid: &self.time_grid,
            limits: self.limits,
            selection: self.selection,
        }
    }
}

#[derive(Debug)]
pub struct ReplicateFailure {
    pub replicate: usize,
    pub error: SimError,
}

/// Aggregate `[replicate, time, species]` counts plus per-replicate outcomes.
///
/// Rows of failed replicates are zeroed and listed in [`failures`](Self::failures).
#[derive(Debug)]
pub struct EnsembleResult {
    pub data: Vec<u64>,
    pub n_replicates: usize,
    pub n_times: usize,
    pub n_species: usize,
    pub species_names: Vec<String>,
    pub times: Vec<f64>,
    pub seed: u64,
    outcomes: Vec<Option<ReplicateOutcome>>,
    failures: Vec<ReplicateFailure>,
}

impl EnsembleResult {
    pub fn shape(&self) -> [usize; 3] {
        [self.n_replicates, self.n_times, self.n_species]
    }

    /// True when at least one replicate errored. Replicates stopped by a
    /// [`RunLimits`] bound are not failures; see [`incomplete`](Self::incomplete).
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Indices of replicates that ended `Incomplete`.
    pub fn incomplete(&self) -> Vec<usize> {
        self.outcomes
            .iter()
            .enumerate()
            .filter_map(|(r, outcome)| match outcome {
                Some(ReplicateOutcome {
                    status: ReplicateStatus::Incomplete { .. },
                    ..
                }) => Some(r),
                _ => None,
            })
            .collect()
    }

    pub fn failures(&self) -> &[ReplicateFailure] {
        &self.failures
    }

    pub fn outcome(&self, replicate: usize) -> Option<&ReplicateOutcome> {
        self.outcomes.get(replicate).and_then(Option::as_ref)
    }

    pub fn species_index(&self, name: &str) -> Option<usize> {
        self.species_names.iter().position(|s| s == name)
    }

    pub fn get(&self, replicate: usize, time_idx: usize, species: usize) -> u64 {
        self.data[(replicate * self.n_times + time_idx) * self.n_species + species]
    }

    pub fn row(&self, replicate: usize, time_idx: usize) -> &[u64] {
        let start = (replicate * self.n_times + time_idx) * self.n_species;
        &self.data[start..start + self.n_species]
    }

    pub fn trajectory(&self, replicate: usize) -> Option<Trajectory> {
        let outcome = *self.outcome(replicate)?;
        let stride = self.n_times * self.n_species;
        let start = replicate * stride;
        Some(Trajectory {
            times: self.times.clone(),
            states: self.data[start..start + stride].to_vec(),
            n_species: self.n_species,
            outcome,
        })
    }

    /// Last recorded row of `replicate`, keyed by species name, for a continuation run.
    pub fn final_state(&self, replicate: usize) -> Option<InitialState> {
        self.outcome(replicate)?;
        let row = self.row(replicate, self.n_times - 1);
        let named: HashMap<String, i64> = self
            .species_names
            .iter()
            .cloned()
            .zip(row.iter().map(|&c| c as i64))
            .collect();
        Some(InitialState::Named(named))
    }

    /// Last rows of every replicate, to continue the whole ensemble replicate by replicate.
    ///
    /// `None` if any replicate failed.
    pub fn final_states(&self) -> Option<InitialState> {
        if self.has_failures() {
            return None;
        }
        let rows = (0..self.n_replicates)
            .map(|r| {
                self.row(r, self.n_times - 1)
                    .iter()
                    .map(|&c| c as i64)
                    .collect()
            })
            .collect();
        Some(InitialState::PerReplicate(rows))
    }

    /// Mean count of `species` at `time_idx` over successful replicates.
    pub fn mean(&self, time_idx: usize, species: usize) -> f64 {
        let (sum, n) = (0..self.n_replicates)
            .filter(|&r| self.outcome(r).is_some())
            .fold((0.0, 0usize), |(sum, n), r| {
                (sum + self.get(r, time_idx, species) as f64, n + 1)
            });
        if n == 0 { f64::NAN } else { sum / n as f64 }
    }

    pub fn variance(&self, time_idx: usize, species: usize) -> f64 {
        let mean = self.mean(time_idx, species);
        let (sum, n) = (0..self.n_replicates)
            .filter(|&r| self.outcome(r).is_some())
            .fold((0.0, 0usize), |(sum, n), r| {
                let d = self.get(r, time_idx, species) as f64 - mean;
                (sum + d * d, n + 1)
            });
        if n < 2 { 0.0 } else { sum / (n - 1) as f64 }
    }
}

pub fn run_ensemble(
    network: &ReactionNetwork,
    initial: &InitialState,
    options: &SimulationOptions,
) -> Result<EnsembleResult, SimError> {
    if options.replicates == 0 {
        return Err(config_err("number of replicates must be greater than zero"));
    }
    if options.threads == Some(0) {
        return Err(config_err("thread count must be greater than zero"));
    }
    let resolved = initial.resolve(network, options.replicates)?;

    let n_species = network.n_species();
    let n_times = options.time_grid.len();
    let stride = n_times * n_species;
    let mut data = vec![0u64; options.replicates * stride];
    let master_seed = options.seed.unwrap_or_else(rand::random);
    let config = options.replicate_config();
    let threads = options.threads.unwrap_or_else(rayon::current_num_threads);
    log::debug!(
        "running {} replicates over {} samples ({} species, {} reactions, seed {:#x}, {} threads)",
        options.replicates,
        n_times,
        n_species,
        network.n_reactions(),
        master_seed,
        threads
    );

    let simulate = |data: &mut [u64]| -> Vec<Result<ReplicateOutcome, SimError>> {
        data.par_chunks_mut(stride)
            .enumerate()
            .map(|(replicate, chunk)| {
                let rng = ChaCha8Rng::seed_from_u64(derive_seed(master_seed, replicate as u64));
                simulate_replicate_into(
                    network,
                    resolved.for_replicate(replicate),
                    config,
                    rng,
                    chunk,
                )
            })
            .collect()
    };

    let results = match options.threads {
        Some(n) => ThreadPoolBuilder::new()
            .num_threads(n)
            .build()
            .map_err(|e| SimError::ThreadPool(e.to_string()))?
            .install(|| simulate(data.as_mut_slice())),
        None => simulate(data.as_mut_slice()),
    };

    let mut outcomes = Vec::with_capacity(results.len());
    let mut failures = Vec::new();
    for (replicate, result) in results.into_iter().enumerate() {
        match result {
            Ok(outcome) => {
                if let ReplicateStatus::Incomplete { recorded } = outcome.status {
                    log::warn!(
                        "replicate {} stopped after {} steps with {}/{} samples recorded",
                        replicate,
                        outcome.steps,
                        recorded,
                        n_times
                    );
                }
                outcomes.push(Some(outcome));
            }
            Err(error) => {
                log::warn!("replicate {} failed: {}", replicate, error);
                data[replicate * stride..(replicate + 1) * stride].fill(0);
                outcomes.push(None);
                failures.push(ReplicateFailure { replicate, error });
            }
        }
    }

    let absorbed = outcomes
        .iter()
        .flatten()
        .filter(|o| matches!(o.status, ReplicateStatus::Absorbed { .. }))
        .count();
    let incomplete = outcomes
        .iter()
        .flatten()
        .filter(|o| matches!(o.status, ReplicateStatus::Incomplete { .. }))
        .count();
    log::info!(
        "ensemble done: {} replicates, {} absorbed, {} incomplete, {} failed",
        options.replicates,
        absorbed,
        incomplete,
        failures.len()
    );

    Ok(EnsembleResult {
        data,
        n_replicates: options.replicates,
        n_times,
        n_species,
        species_names: network.species_names(),
        times: options.time_grid.points().to_vec(),
        seed: master_seed,
        outcomes,
        failures,
    })
}

/// Per-replicate seed derived from the master seed (SplitMix64 finaliser).
pub fn derive_seed(seed: u64, replicate: u64) -> u64 {
    const GOLDEN_GAMMA: u64 = 0x9E3779B97F4A7C15;
    let mut z = seed ^ replicate.wrapping_mul(GOLDEN_GAMMA);
    z = z.wrapping_add(GOLDEN_GAMMA);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

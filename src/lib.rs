//! Exact stochastic simulation (Gillespie direct method) of well-mixed
//! reaction networks under mass-action kinetics.
//!
//! Build a [`ReactionNetwork`], pick a [`TimeGrid`] and run
//! [`run_ensemble`]; the result is a `[replicate, time, species]` count array
//! plus a per-replicate outcome report.

pub mod description;
pub mod driver;
pub mod ensemble;
pub mod error;
pub mod network;
pub mod parameters;
pub mod propensity;
pub mod recorder;
pub mod stepper;

#[cfg(feature = "python")]
mod python;

pub use description::NetworkDescription;
pub use driver::{
    InitialState, ReplicateConfig, ReplicateOutcome, ReplicateStatus, RunLimits, Trajectory,
    simulate_replicate_into, simulate_single,
};
pub use ensemble::{
    EnsembleResult, ReplicateFailure, SimulationOptions, derive_seed, run_ensemble,
};
pub use error::SimError;
pub use network::{NetworkBuilder, ReactionDecl, ReactionNetwork};
pub use parameters::ParameterTable;
pub use propensity::{PropensityEngine, Selection, binomial, compute_propensities};
pub use recorder::TimeGrid;
pub use stepper::{Event, SsaStepper, next_event};

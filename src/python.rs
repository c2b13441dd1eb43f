use std::collections::BTreeMap;

use numpy::{PyArray1, PyArrayMethods, PyReadonlyArray1};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::driver::{InitialState, RunLimits};
use crate::ensemble::{SimulationOptions, run_ensemble};
use crate::error::SimError;
use crate::network::{NetworkBuilder, ReactionDecl};
use crate::recorder::TimeGrid;

impl From<SimError> for PyErr {
    fn from(err: SimError) -> Self {
        PyValueError::new_err(err.to_string())
    }
}

type ReactionTuple = (String, BTreeMap<String, i64>, BTreeMap<String, i64>, f64);

/// Returns `(counts[replicate, time, species], species_names, failures)`.
#[pyfunction(signature = (
    species,
    reactions,
    t_points,
    n_replicates,
    initial_state=None,
    seed=None,
    n_threads=None,
    max_steps=None
))]
#[allow(clippy::too_many_arguments)]
pub fn simulate_ensemble(
    py: Python<'_>,
    species: Vec<(String, i64)>,
    reactions: Vec<ReactionTuple>,
    t_points: PyReadonlyArray1<f64>,
    n_replicates: usize,
    initial_state: Option<BTreeMap<String, i64>>,
    seed: Option<u64>,
    n_threads: Option<usize>,
    max_steps: Option<u64>,
) -> PyResult<(Py<PyAny>, Vec<String>, Vec<(usize, String)>)> {
    let mut builder = NetworkBuilder::new();
    for (name, count) in species {
        builder.add_species(name, count);
    }
    for (name, reactants, products, rate_constant) in reactions {
        builder.add_reaction(ReactionDecl {
            name,
            reactants: reactants.into_iter().collect(),
            products: products.into_iter().collect(),
            rate_constant,
        });
    }
    let network = builder.build()?;

    let times = t_points
        .as_slice()
        .map_err(|_| PyValueError::new_err("t_points must be a contiguous float64 array"))?
        .to_vec();
    let mut options = SimulationOptions::new(TimeGrid::new(times)?, n_replicates).with_limits(
        RunLimits {
            max_steps,
            max_wall_time: None,
        },
    );
    options.seed = seed;
    options.threads = n_threads;
    let initial = match initial_state {
        Some(map) => InitialState::named(map),
        None => InitialState::Declared,
    };

    let result = py.detach(|| run_ensemble(&network, &initial, &options))?;
    let failures = result
        .failures()
        .iter()
        .map(|f| (f.replicate, f.error.to_string()))
        .collect();
    let shape = result.shape();
    let array = PyArray1::from_vec(py, result.data).reshape(shape)?;
    Ok((array.into_any().unbind(), result.species_names, failures))
}

#[pymodule]
fn ssakit(_py: Python<'_>, module: &Bound<'_, PyModule>) -> PyResult<()> {
    module.add_function(wrap_pyfunction!(simulate_ensemble, module)?)?;
    Ok(())
}

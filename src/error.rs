use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("shape mismatch: {0}")]
    Shape(String),
    #[error("parameter error: {0}")]
    Parameter(String),
    #[error("numerical degeneracy: reaction {reaction} has propensity {value}")]
    NumericalDegeneracy { reaction: usize, value: f64 },
    #[error("reaction {reaction} would drive species {species} below zero")]
    NegativePopulation { species: usize, reaction: usize },
    #[error("thread pool error: {0}")]
    ThreadPool(String),
}

impl SimError {
    /// True for errors raised before any stepping starts.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SimError::Configuration(_) | SimError::Shape(_) | SimError::Parameter(_)
        )
    }
}

pub(crate) fn config_err(msg: impl Into<String>) -> SimError {
    SimError::Configuration(msg.into())
}

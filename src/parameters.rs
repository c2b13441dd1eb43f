//! Named rate parameters for the model layer.
//!
//! Values may be given as arithmetic expressions over previously defined
//! names, e.g. `k4 = Br3on * Boost_up`. Everything resolves to plain `f64`
//! before the network is built; the engine never sees a parameter name.

use std::str::FromStr;

use meval::{Context, Expr};

use crate::error::SimError;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParameterTable {
    entries: Vec<(String, f64)>,
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl ParameterTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|&(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), *v))
    }

    /// Sets `name` to a literal value, replacing any earlier definition.
    pub fn set(&mut self, name: &str, value: f64) -> Result<(), SimError> {
        if !is_identifier(name) {
            return Err(SimError::Parameter(format!(
                "'{}' is not a valid parameter name",
                name
            )));
        }
        if !value.is_finite() {
            return Err(SimError::Parameter(format!(
                "parameter '{}' must be finite, got {}",
                name, value
            )));
        }
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name.to_string(), value)),
        }
        Ok(())
    }

    /// Evaluates `expression` against the current table and stores it as `name`.
    pub fn define(&mut self, name: &str, expression: &str) -> Result<f64, SimError> {
        let value = self
            .eval(expression)
            .map_err(|err| SimError::Parameter(format!("parameter '{}': {}", name, err)))?;
        self.set(name, value)?;
        Ok(value)
    }

    pub fn eval(&self, expression: &str) -> Result<f64, SimError> {
        let expr = Expr::from_str(expression).map_err(|err| {
            SimError::Parameter(format!("cannot parse '{}': {}", expression, err))
        })?;
        let mut ctx = Context::new();
        for (name, value) in &self.entries {
            ctx.var(name.as_str(), *value);
        }
        let value = expr.eval_with_context(ctx).map_err(|err| {
            SimError::Parameter(format!("cannot evaluate '{}': {}", expression, err))
        })?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(SimError::Parameter(format!(
                "'{}' evaluates to non-finite value {}",
                expression, value
            )))
        }
    }
}

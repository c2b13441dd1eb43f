//! Table-driven network definitions.
//!
//! ```toml
//! [[parameters]]
//! name = "Boost_up"
//! value = 50
//!
//! [[parameters]]
//! name = "Ar3on"
//! value = "0.0005 * STOCH"
//!
//! [[species]]
//! name = "Alk3"
//! initial = 3500
//!
//! [[reactions]]
//! name = "bind3"
//! reactants = { BMP2_Alk3 = 1, Alk3 = 1 }
//! products = { BMP2_Alk3_Alk3 = 1 }
//! rate = "Ar3on * Boost_up"
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::SimError;
use crate::network::{NetworkBuilder, ReactionDecl, ReactionNetwork};
use crate::parameters::ParameterTable;

/// A literal number or an expression over parameter names.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RateExpr {
    Value(f64),
    Expr(String),
}

impl RateExpr {
    fn resolve(&self, table: &ParameterTable) -> Result<f64, SimError> {
        match self {
            RateExpr::Value(v) => Ok(*v),
            RateExpr::Expr(e) => table.eval(e),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterEntry {
    pub name: String,
    pub value: RateExpr,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpeciesEntry {
    pub name: String,
    #[serde(default)]
    pub initial: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReactionEntry {
    pub name: String,
    pub rate: RateExpr,
    #[serde(default)]
    pub reactants: BTreeMap<String, i64>,
    #[serde(default)]
    pub products: BTreeMap<String, i64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkDescription {
    #[serde(default)]
    pub parameters: Vec<ParameterEntry>,
    #[serde(default)]
    pub species: Vec<SpeciesEntry>,
    #[serde(default)]
    pub reactions: Vec<ReactionEntry>,
}

impl NetworkDescription {
    pub fn from_toml_str(content: &str) -> Result<Self, SimError> {
        toml::from_str(content)
            .map_err(|err| SimError::Configuration(format!("invalid network table: {}", err)))
    }

    pub fn to_toml_string(&self) -> Result<String, SimError> {
        toml::to_string(self)
            .map_err(|err| SimError::Configuration(format!("cannot serialise network: {}", err)))
    }

    /// Resolves the parameter table in declaration order, after `inputs`.
    pub fn parameter_table(&self, inputs: &[(&str, f64)]) -> Result<ParameterTable, SimError> {
        let mut table = ParameterTable::new();
        for &(name, value) in inputs {
            table.set(name, value)?;
        }
        for entry in &self.parameters {
            let value = entry.value.resolve(&table).map_err(|err| {
                SimError::Parameter(format!("parameter '{}': {}", entry.name, err))
            })?;
            table.set(&entry.name, value)?;
        }
        Ok(table)
    }

    pub fn build(&self) -> Result<ReactionNetwork, SimError> {
        self.build_with(&[])
    }

    /// Builds the network with run-level `inputs` (e.g. ligand dose) in scope.
    pub fn build_with(&self, inputs: &[(&str, f64)]) -> Result<ReactionNetwork, SimError> {
        let table = self.parameter_table(inputs)?;
        let mut builder = NetworkBuilder::new();
        for species in &self.species {
            builder.add_species(species.name.clone(), species.initial);
        }
        for reaction in &self.reactions {
            let rate_constant = reaction.rate.resolve(&table).map_err(|err| {
                SimError::Parameter(format!("reaction '{}' rate: {}", reaction.name, err))
            })?;
            builder.add_reaction(ReactionDecl {
                name: reaction.name.clone(),
                reactants: reaction.reactants.clone().into_iter().collect(),
                products: reaction.products.clone().into_iter().collect(),
                rate_constant,
            });
        }
        builder.build()
    }
}

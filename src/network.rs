//! Species table and reaction set.
//!
//! A [`ReactionNetwork`] is assembled once through [`NetworkBuilder`] and is
//! immutable afterwards. Reaction indices are assigned in declaration order and
//! stay stable for the lifetime of the network, which the stepper relies on when
//! it inverts the cumulative propensity sum.

use std::collections::HashMap;

use crate::error::{SimError, config_err};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Species {
    pub name: String,
    pub initial_count: u64,
}

/// One side of a reaction: a species and its stoichiometric coefficient.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reactant {
    pub species: usize,
    pub count: u32,
}

/// Net change a reaction applies to one species.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpeciesDelta {
    pub species: usize,
    pub delta: i64,
}

#[derive(Clone, Debug)]
pub struct Reaction {
    pub name: String,
    pub rate_constant: f64,
    pub reactants: Vec<Reactant>,
    pub products: Vec<Reactant>,
}

impl Reaction {
    /// Sum of reactant coefficients.
    pub fn order(&self) -> u32 {
        self.reactants.iter().map(|r| r.count).sum()
    }
}

/// A reaction as declared by the model layer, with species referenced by name.
#[derive(Clone, Debug, PartialEq)]
pub struct ReactionDecl {
    pub name: String,
    pub reactants: Vec<(String, i64)>,
    pub products: Vec<(String, i64)>,
    pub rate_constant: f64,
}

impl ReactionDecl {
    pub fn new<S: Into<String>>(
        name: S,
        reactants: &[(&str, i64)],
        products: &[(&str, i64)],
        rate_constant: f64,
    ) -> Self {
        fn own(side: &[(&str, i64)]) -> Vec<(String, i64)> {
            side.iter()
                .map(|&(species, coeff)| (species.to_string(), coeff))
                .collect()
        }
        Self {
            name: name.into(),
            reactants: own(reactants),
            products: own(products),
            rate_constant,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct NetworkBuilder {
    species: Vec<(String, i64)>,
    reactions: Vec<ReactionDecl>,
}

impl NetworkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn species<S: Into<String>>(mut self, name: S, initial_count: i64) -> Self {
        self.species.push((name.into(), initial_count));
        self
    }

    pub fn reaction<S: Into<String>>(
        mut self,
        name: S,
        reactants: &[(&str, i64)],
        products: &[(&str, i64)],
        rate_constant: f64,
    ) -> Self {
        self.reactions
            .push(ReactionDecl::new(name, reactants, products, rate_constant));
        self
    }

    pub fn add_species<S: Into<String>>(&mut self, name: S, initial_count: i64) -> &mut Self {
        self.species.push((name.into(), initial_count));
        self
    }

    pub fn add_reaction(&mut self, decl: ReactionDecl) -> &mut Self {
        self.reactions.push(decl);
        self
    }

    pub fn build(self) -> Result<ReactionNetwork, SimError> {
        if self.species.is_empty() {
            return Err(config_err("network must declare at least one species"));
        }

        let mut species = Vec::with_capacity(self.species.len());
        let mut species_index = HashMap::with_capacity(self.species.len());
        for (name, initial) in self.species {
            if name.trim().is_empty() {
                return Err(config_err("species names must be non-empty"));
            }
            if initial < 0 {
                return Err(config_err(format!(
                    "species '{}' has negative initial count {}",
                    name, initial
                )));
            }
            if species_index.insert(name.clone(), species.len()).is_some() {
                return Err(config_err(format!("species '{}' declared twice", name)));
            }
            species.push(Species {
                name,
                initial_count: initial as u64,
            });
        }

        let mut reactions = Vec::with_capacity(self.reactions.len());
        for decl in self.reactions {
            if !decl.rate_constant.is_finite() || decl.rate_constant <= 0.0 {
                return Err(config_err(format!(
                    "reaction '{}' rate constant must be positive and finite, got {}",
                    decl.name, decl.rate_constant
                )));
            }
            let reactants = resolve_side(&decl.name, "reactant", &decl.reactants, &species_index)?;
            let products = resolve_side(&decl.name, "product", &decl.products, &species_index)?;
            reactions.push(Reaction {
                name: decl.name,
                rate_constant: decl.rate_constant,
                reactants,
                products,
            });
        }

        let reaction_deltas = build_reaction_deltas(&reactions);
        let dependencies = build_dependency_graph(species.len(), &reaction_deltas, &reactions);
        log::debug!(
            "built reaction network with {} species and {} reactions",
            species.len(),
            reactions.len()
        );

        Ok(ReactionNetwork {
            species,
            species_index,
            reactions,
            reaction_deltas,
            dependencies,
        })
    }
}

fn resolve_side(
    reaction: &str,
    role: &str,
    side: &[(String, i64)],
    species_index: &HashMap<String, usize>,
) -> Result<Vec<Reactant>, SimError> {
    let mut out: Vec<Reactant> = Vec::with_capacity(side.len());
    for (name, coeff) in side {
        let species = *species_index.get(name).ok_or_else(|| {
            config_err(format!(
                "reaction '{}' references undeclared species '{}'",
                reaction, name
            ))
        })?;
        if *coeff <= 0 || *coeff > u32::MAX as i64 {
            return Err(config_err(format!(
                "reaction '{}' {} '{}' has invalid coefficient {}",
                reaction, role, name, coeff
            )));
        }
        let count = *coeff as u32;
        // "A + A" and "2A" describe the same multiset
        match out.iter_mut().find(|r| r.species == species) {
            Some(existing) => {
                existing.count = existing.count.checked_add(count).ok_or_else(|| {
                    config_err(format!(
                        "reaction '{}' {} '{}' has a combined coefficient above {}",
                        reaction,
                        role,
                        name,
                        u32::MAX
                    ))
                })?;
            }
            None => out.push(Reactant { species, count }),
        }
    }
    Ok(out)
}

#[derive(Clone, Debug)]
pub struct ReactionNetwork {
    species: Vec<Species>,
    species_index: HashMap<String, usize>,
    reactions: Vec<Reaction>,
    reaction_deltas: Vec<Vec<SpeciesDelta>>,
    dependencies: Vec<Vec<usize>>,
}

impl ReactionNetwork {
    pub fn builder() -> NetworkBuilder {
        NetworkBuilder::new()
    }

    pub fn n_species(&self) -> usize {
        self.species.len()
    }

    pub fn n_reactions(&self) -> usize {
        self.reactions.len()
    }

    pub fn species(&self) -> &[Species] {
        &self.species
    }

    pub fn species_names(&self) -> Vec<String> {
        self.species.iter().map(|s| s.name.clone()).collect()
    }

    pub fn species_index(&self, name: &str) -> Option<usize> {
        self.species_index.get(name).copied()
    }

    pub fn reactions(&self) -> &[Reaction] {
        &self.reactions
    }

    pub fn reaction_deltas(&self, reaction: usize) -> &[SpeciesDelta] {
        &self.reaction_deltas[reaction]
    }

    /// Reactions whose propensity can change when `reaction` fires, including itself.
    pub fn dependents(&self, reaction: usize) -> &[usize] {
        &self.dependencies[reaction]
    }

    pub fn initial_counts(&self) -> Vec<u64> {
        self.species.iter().map(|s| s.initial_count).collect()
    }

    /// Applies the net stoichiometry of `reaction` to `state`.
    ///
    /// The state is left untouched if any count would go negative.
    pub fn apply(&self, reaction: usize, state: &mut [u64]) -> Result<(), SimError> {
        let deltas = &self.reaction_deltas[reaction];
        for delta in deltas {
            if state[delta.species].checked_add_signed(delta.delta).is_none() {
                return Err(SimError::NegativePopulation {
                    species: delta.species,
                    reaction,
                });
            }
        }
        for delta in deltas {
            state[delta.species] = state[delta.species].wrapping_add_signed(delta.delta);
        }
        Ok(())
    }
}

fn build_reaction_deltas(reactions: &[Reaction]) -> Vec<Vec<SpeciesDelta>> {
    reactions
        .iter()
        .map(|reaction| {
            let mut deltas: Vec<SpeciesDelta> = Vec::new();
            let sides = reaction
                .reactants
                .iter()
                .map(|r| (r.species, -(r.count as i64)))
                .chain(reaction.products.iter().map(|p| (p.species, p.count as i64)));
            for (species, change) in sides {
                match deltas.iter_mut().find(|d| d.species == species) {
                    Some(d) => d.delta += change,
                    None => deltas.push(SpeciesDelta {
                        species,
                        delta: change,
                    }),
                }
            }
            deltas.retain(|d| d.delta != 0);
            deltas
        })
        .collect()
}

fn build_dependency_graph(
    n_species: usize,
    reaction_deltas: &[Vec<SpeciesDelta>],
    reactions: &[Reaction],
) -> Vec<Vec<usize>> {
    let mut species_dependents: Vec<Vec<usize>> = vec![Vec::new(); n_species];
    for (idx, reaction) in reactions.iter().enumerate() {
        for reactant in &reaction.reactants {
            species_dependents[reactant.species].push(idx);
        }
    }

    let mut dependencies = vec![Vec::new(); reactions.len()];
    let mut visit_markers = vec![usize::MAX; reactions.len()];
    for (r, deps) in dependencies.iter_mut().enumerate() {
        visit_markers[r] = r;
        deps.push(r);
        for delta in &reaction_deltas[r] {
            for &dep in &species_dependents[delta.species] {
                if visit_markers[dep] != r {
                    visit_markers[dep] = r;
                    deps.push(dep);
                }
            }
        }
    }
    dependencies
}

//! Mass-action propensities.
//!
//! `a_j = k_j * prod_s C(x_s, nu_sj)` over the reactants of reaction `j`. A source
//! reaction (no reactants) fires at its bare rate constant.

use crate::error::SimError;
use crate::network::{Reaction, ReactionNetwork};

/// How the stepper inverts the cumulative propensity sum.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Selection {
    /// Linear scan over the running cumulative sum.
    Linear,
    /// Binary descent through a sum tree, O(log R) per draw.
    #[default]
    SumTree,
}

/// Binomial coefficient `C(n, k)` as `f64`; zero when `n < k`.
#[inline]
pub fn binomial(n: u64, k: u32) -> f64 {
    match k {
        0 => 1.0,
        1 => n as f64,
        _ if n < k as u64 => 0.0,
        2 => (n as f64) * ((n - 1) as f64) / 2.0,
        _ => {
            let mut acc = 1.0;
            for i in 0..k as u64 {
                acc = acc * (n - i) as f64 / (i + 1) as f64;
            }
            acc
        }
    }
}

impl Reaction {
    #[inline]
    pub fn propensity(&self, state: &[u64]) -> f64 {
        let mut propensity = self.rate_constant;
        for reactant in &self.reactants {
            let available = state[reactant.species];
            if available < reactant.count as u64 {
                return 0.0;
            }
            propensity *= binomial(available, reactant.count);
        }
        propensity
    }
}

#[inline]
fn checked(reaction: usize, value: f64) -> Result<f64, SimError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(SimError::NumericalDegeneracy { reaction, value })
    }
}

/// Rejects a total `a0` that overflowed even though every term was finite.
#[inline]
fn checked_total(reaction: usize, total: f64) -> Result<f64, SimError> {
    if total.is_finite() {
        Ok(total)
    } else {
        Err(SimError::NumericalDegeneracy {
            reaction,
            value: total,
        })
    }
}

/// Fills `out` with every reaction's propensity and returns their sum.
pub fn compute_propensities(
    network: &ReactionNetwork,
    state: &[u64],
    out: &mut [f64],
) -> Result<f64, SimError> {
    let mut total = 0.0;
    for (idx, reaction) in network.reactions().iter().enumerate() {
        let value = checked(idx, reaction.propensity(state))?;
        out[idx] = value;
        total = checked_total(idx, total + value)?;
    }
    Ok(total)
}

#[derive(Clone, Debug)]
pub struct PropensityTree {
    len: usize,
    leaf_count: usize,
    data: Vec<f64>,
}

impl PropensityTree {
    pub fn new(len: usize) -> Self {
        let leaf_count = len.max(1).next_power_of_two();
        Self {
            len,
            leaf_count,
            data: vec![0.0; leaf_count * 2],
        }
    }

    pub fn rebuild(&mut self, values: &[f64]) {
        debug_assert_eq!(values.len(), self.len);
        self.data.fill(0.0);
        self.data[self.leaf_count..self.leaf_count + values.len()].copy_from_slice(values);
        for idx in (1..self.leaf_count).rev() {
            self.data[idx] = self.data[idx << 1] + self.data[idx << 1 | 1];
        }
    }

    pub fn total(&self) -> f64 {
        self.data[1]
    }

    pub fn update(&mut self, idx: usize, value: f64) {
        let mut pos = self.leaf_count + idx;
        self.data[pos] = value;
        while pos > 1 {
            pos >>= 1;
            self.data[pos] = self.data[pos << 1] + self.data[pos << 1 | 1];
        }
    }

    /// Smallest index whose cumulative sum reaches `target`.
    pub fn select(&self, mut target: f64) -> usize {
        debug_assert!(self.len > 0);
        let mut node = 1usize;
        while node < self.leaf_count {
            let left = self.data[node << 1];
            if left > 0.0 && target <= left {
                node <<= 1;
            } else {
                target -= left;
                node = (node << 1) | 1;
            }
        }
        let idx = node - self.leaf_count;
        if idx >= self.len {
            // rounding pushed the target past the last leaf
            self.last_positive().unwrap_or(self.len - 1)
        } else if self.data[node] == 0.0 {
            self.last_positive_before(idx).unwrap_or(idx)
        } else {
            idx
        }
    }

    fn last_positive(&self) -> Option<usize> {
        self.last_positive_before(self.len)
    }

    fn last_positive_before(&self, end: usize) -> Option<usize> {
        (0..end).rev().find(|&i| self.data[self.leaf_count + i] > 0.0)
    }
}

/// Linear inverse-CDF scan: smallest `j` with `sum_{i<=j} a_i >= target`.
pub fn select_linear(propensities: &[f64], target: f64) -> usize {
    let mut cumulative = 0.0;
    let mut last_positive = None;
    for (idx, &value) in propensities.iter().enumerate() {
        if value <= 0.0 {
            continue;
        }
        cumulative += value;
        last_positive = Some(idx);
        if cumulative >= target {
            return idx;
        }
    }
    last_positive.unwrap_or(0)
}

/// Propensity vector for one replicate, kept current across steps.
///
/// After a reaction fires only its dependents are recomputed.
pub struct PropensityEngine<'a> {
    network: &'a ReactionNetwork,
    selection: Selection,
    values: Vec<f64>,
    tree: PropensityTree,
    total: f64,
}

impl<'a> PropensityEngine<'a> {
    pub fn new(network: &'a ReactionNetwork, selection: Selection) -> Self {
        let n = network.n_reactions();
        Self {
            network,
            selection,
            values: vec![0.0; n],
            tree: PropensityTree::new(n),
            total: 0.0,
        }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Total propensity `a0`.
    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn recompute(&mut self, state: &[u64]) -> Result<f64, SimError> {
        let total = compute_propensities(self.network, state, &mut self.values)?;
        let total = match self.selection {
            Selection::Linear => total,
            Selection::SumTree => {
                self.tree.rebuild(&self.values);
                self.tree.total()
            }
        };
        let last = self.values.len().saturating_sub(1);
        self.total = checked_total(last, total)?;
        Ok(self.total)
    }

    /// Refreshes the propensities invalidated by `fired`.
    pub fn update_after(&mut self, fired: usize, state: &[u64]) -> Result<f64, SimError> {
        let reactions = self.network.reactions();
        for &dep in self.network.dependents(fired) {
            let value = checked(dep, reactions[dep].propensity(state))?;
            self.values[dep] = value;
            if self.selection == Selection::SumTree {
                self.tree.update(dep, value);
            }
        }
        let total = match self.selection {
            Selection::Linear => self.values.iter().sum(),
            Selection::SumTree => self.tree.total(),
        };
        self.total = checked_total(fired, total)?;
        Ok(self.total)
    }

    pub fn select(&self, target: f64) -> usize {
        match self.selection {
            Selection::Linear => select_linear(&self.values, target),
            Selection::SumTree => self.tree.select(target),
        }
    }
}

use crate::error::{SimError, config_err};

/// Strictly increasing, non-negative sample times.
#[derive(Clone, Debug, PartialEq)]
pub struct TimeGrid {
    points: Vec<f64>,
}

impl TimeGrid {
    pub fn new(points: Vec<f64>) -> Result<Self, SimError> {
        let first = *points
            .first()
            .ok_or_else(|| config_err("time grid must contain at least one sample time"))?;
        if let Some(bad) = points.iter().find(|t| !t.is_finite()) {
            return Err(config_err(format!("time grid contains non-finite time {}", bad)));
        }
        if first < 0.0 {
            return Err(config_err(format!(
                "time grid starts before time 0 (first sample {})",
                first
            )));
        }
        if let Some(pos) = points.windows(2).position(|w| w[1] <= w[0]) {
            return Err(config_err(format!(
                "time grid must be strictly increasing (t[{}] = {} followed by {})",
                pos,
                points[pos],
                points[pos + 1]
            )));
        }
        Ok(Self { points })
    }

    /// `n` evenly spaced points from `start` to `end` inclusive.
    pub fn linspace(start: f64, end: f64, n: usize) -> Result<Self, SimError> {
        let points = match n {
            0 => Vec::new(),
            1 => vec![start],
            _ => {
                let step = (end - start) / (n - 1) as f64;
                (0..n).map(|i| start + step * i as f64).collect()
            }
        };
        Self::new(points)
    }

    pub fn points(&self) -> &[f64] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn end(&self) -> f64 {
        self.points[self.points.len() - 1]
    }
}

/// Writes snapshots for one replicate into its `[time, species]` slab.
pub(crate) struct StateRecorder<'a> {
    grid: &'a [f64],
    buffer: &'a mut [u64],
    next: usize,
    n_species: usize,
}

impl<'a> StateRecorder<'a> {
    pub(crate) fn new(grid: &'a [f64], buffer: &'a mut [u64], n_species: usize) -> Self {
        debug_assert_eq!(buffer.len(), grid.len() * n_species);
        Self {
            grid,
            buffer,
            next: 0,
            n_species,
        }
    }

    pub(crate) fn next_time(&self) -> Option<f64> {
        self.grid.get(self.next).copied()
    }

    pub(crate) fn is_full(&self) -> bool {
        self.next >= self.grid.len()
    }

    pub(crate) fn recorded(&self) -> usize {
        self.next
    }

    pub(crate) fn record(&mut self, state: &[u64]) {
        let start = self.next * self.n_species;
        self.buffer[start..start + self.n_species].copy_from_slice(state);
        self.next += 1;
    }

    /// Records `state` for every pending sample strictly before `until`.
    pub(crate) fn record_before(&mut self, until: f64, state: &[u64]) {
        while let Some(t) = self.next_time() {
            if t >= until {
                break;
            }
            self.record(state);
        }
    }

    pub(crate) fn fill_remaining(&mut self, state: &[u64]) {
        while !self.is_full() {
            self.record(state);
        }
    }
}

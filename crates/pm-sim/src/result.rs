//! Simulation results: saved time series plus termination metadata.

use crate::error::{SimError, SimResult};
use pm_core::VectorContainer;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Deferred per-sample computation `f(t, x)`.
pub type SampleFn = Arc<dyn Fn(f64, &VectorContainer) -> SimResult<VectorContainer> + Send + Sync>;

/// Series computed from saved states on first access, then memoized.
#[derive(Clone)]
pub struct LazySeries {
    times: Arc<[f64]>,
    states: Arc<[VectorContainer]>,
    fcn: SampleFn,
    cache: Vec<OnceLock<VectorContainer>>,
}

impl LazySeries {
    pub fn new(times: Arc<[f64]>, states: Arc<[VectorContainer]>, fcn: SampleFn) -> Self {
        let cache = (0..states.len()).map(|_| OnceLock::new()).collect();
        Self {
            times,
            states,
            fcn,
            cache,
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Whether sample `i` has already been computed.
    pub fn is_computed(&self, i: usize) -> bool {
        self.cache.get(i).is_some_and(|c| c.get().is_some())
    }

    pub fn get(&self, i: usize) -> SimResult<&VectorContainer> {
        let cell = self.cache.get(i).ok_or(SimError::IndexOob {
            what: "series sample",
            index: i,
            len: self.cache.len(),
        })?;
        if let Some(v) = cell.get() {
            return Ok(v);
        }
        let value = (self.fcn)(self.times[i], &self.states[i])?;
        // A concurrent reader may have won the race; both computed the same value.
        Ok(cell.get_or_init(|| value))
    }
}

impl fmt::Debug for LazySeries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let computed = self.cache.iter().filter(|c| c.get().is_some()).count();
        f.debug_struct("LazySeries")
            .field("len", &self.len())
            .field("computed", &computed)
            .finish()
    }
}

/// Ordered samples of one quantity, one per saved time.
#[derive(Clone, Debug)]
pub enum Series {
    Eager(Vec<VectorContainer>),
    Lazy(LazySeries),
}

impl Series {
    pub fn len(&self) -> usize {
        match self {
            Series::Eager(v) => v.len(),
            Series::Lazy(l) => l.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_lazy(&self) -> bool {
        matches!(self, Series::Lazy(_))
    }

    pub fn get(&self, i: usize) -> SimResult<&VectorContainer> {
        match self {
            Series::Eager(v) => v.get(i).ok_or(SimError::IndexOob {
                what: "series sample",
                index: i,
                len: v.len(),
            }),
            Series::Lazy(l) => l.get(i),
        }
    }

    pub fn last(&self) -> Option<SimResult<&VectorContainer>> {
        self.len().checked_sub(1).map(|i| self.get(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = SimResult<&VectorContainer>> + '_ {
        (0..self.len()).map(move |i| self.get(i))
    }

    /// Materialize every sample.
    pub fn to_vec(&self) -> SimResult<Vec<VectorContainer>> {
        self.iter().map(|r| r.cloned()).collect()
    }

    /// Per-field monotonicity in [0, 1]: |sum of step signs| / (n - 1).
    ///
    /// First column only. Fields of a series with fewer than two samples get 0.
    pub fn monotonicity(&self) -> SimResult<BTreeMap<String, f64>> {
        let mut out = BTreeMap::new();
        let Some(first) = self.iter().next().transpose()? else {
            return Ok(out);
        };
        let keys = first.keys().to_vec();
        let n = self.len();
        for (row, key) in keys.iter().enumerate() {
            if n < 2 {
                out.insert(key.clone(), 0.0);
                continue;
            }
            let mut sum = 0.0;
            let mut prev = first.matrix()[(row, 0)];
            for i in 1..n {
                let cur = self.get(i)?.matrix()[(row, 0)];
                let d = cur - prev;
                if d > 0.0 {
                    sum += 1.0;
                } else if d < 0.0 {
                    sum -= 1.0;
                }
                prev = cur;
            }
            out.insert(key.clone(), f64::abs(sum) / (n - 1) as f64);
        }
        Ok(out)
    }
}

/// Point where the simulated state became non-finite.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Divergence {
    pub time: f64,
    pub step: usize,
}

/// Why a simulation stopped.
#[derive(Clone, Debug, PartialEq)]
pub enum Termination {
    TimeReached,
    ThresholdMet { events: Vec<String> },
    MaxSteps,
    Diverged,
}

/// Read-only record of one simulation run.
#[derive(Clone, Debug)]
pub struct SimulationResult {
    times: Vec<f64>,
    inputs: Series,
    states: Series,
    outputs: Series,
    event_states: Series,
    termination: Termination,
    divergence: Option<Divergence>,
    event_times: BTreeMap<String, f64>,
}

pub(crate) struct ResultParts {
    pub(crate) times: Vec<f64>,
    pub(crate) inputs: Vec<VectorContainer>,
    pub(crate) states: Vec<VectorContainer>,
    pub(crate) outputs: Series,
    pub(crate) event_states: Series,
    pub(crate) termination: Termination,
    pub(crate) divergence: Option<Divergence>,
    pub(crate) event_times: BTreeMap<String, f64>,
}

impl SimulationResult {
    pub(crate) fn from_parts(parts: ResultParts) -> Self {
        Self {
            times: parts.times,
            inputs: Series::Eager(parts.inputs),
            states: Series::Eager(parts.states),
            outputs: parts.outputs,
            event_states: parts.event_states,
            termination: parts.termination,
            divergence: parts.divergence,
            event_times: parts.event_times,
        }
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// Time of sample `i`.
    pub fn time(&self, i: usize) -> SimResult<f64> {
        self.times.get(i).copied().ok_or(SimError::IndexOob {
            what: "times",
            index: i,
            len: self.times.len(),
        })
    }

    pub fn inputs(&self) -> &Series {
        &self.inputs
    }

    pub fn states(&self) -> &Series {
        &self.states
    }

    pub fn outputs(&self) -> &Series {
        &self.outputs
    }

    pub fn event_states(&self) -> &Series {
        &self.event_states
    }

    pub fn termination(&self) -> &Termination {
        &self.termination
    }

    pub fn divergence(&self) -> Option<Divergence> {
        self.divergence
    }

    /// First time each event's threshold was met during the run.
    pub fn event_times(&self) -> &BTreeMap<String, f64> {
        &self.event_times
    }

    pub fn event_time(&self, event: &str) -> Option<f64> {
        self.event_times.get(event).copied()
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn final_time(&self) -> Option<f64> {
        self.times.last().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pm_core::FieldSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn states(values: &[f64]) -> Vec<VectorContainer> {
        let fields = FieldSet::shared(["x"]).unwrap();
        values
            .iter()
            .map(|v| VectorContainer::from_column(&fields, &[*v]).unwrap())
            .collect()
    }

    #[test]
    fn lazy_series_computes_once_on_access() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let fcn: SampleFn = Arc::new(move |t, x| {
            counter.fetch_add(1, Ordering::SeqCst);
            let mut z = x.clone();
            z["x"] += t;
            Ok(z)
        });
        let lazy = LazySeries::new(
            Arc::from(vec![0.0, 1.0, 2.0]),
            Arc::from(states(&[10.0, 20.0, 30.0])),
            fcn,
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!lazy.is_computed(1));

        assert_eq!(lazy.get(1).unwrap()["x"], 21.0);
        assert_eq!(lazy.get(1).unwrap()["x"], 21.0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(lazy.is_computed(1));
        assert!(!lazy.is_computed(0));
        assert!(lazy.get(3).is_err());
    }

    #[test]
    fn monotonicity_of_ramp_and_zigzag() {
        let ramp = Series::Eager(states(&[0.0, 1.0, 2.0, 3.0]));
        assert_eq!(ramp.monotonicity().unwrap()["x"], 1.0);

        let zigzag = Series::Eager(states(&[0.0, 1.0, 0.0, 1.0, 0.0]));
        assert_eq!(zigzag.monotonicity().unwrap()["x"], 0.0);

        let single = Series::Eager(states(&[5.0]));
        assert_eq!(single.monotonicity().unwrap()["x"], 0.0);
        assert!(Series::Eager(vec![]).monotonicity().unwrap().is_empty());
    }

    #[test]
    fn eager_out_of_range_is_error() {
        let s = Series::Eager(states(&[1.0]));
        assert!(matches!(s.get(1), Err(SimError::IndexOob { index: 1, .. })));
        assert_eq!(s.last().unwrap().unwrap()["x"], 1.0);
    }
}

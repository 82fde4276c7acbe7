//! Fault labeling strategies.
//!
//! [`ParseFailureLabeler`] flags exactly the readings whose value could not be parsed.
//! [`SimulatedFaultLabeler`] ignores parse results and scatters synthetic faults: a few
//! contiguous clusters (wrapping around the end of the list) topped up with isolated
//! faults until a randomly drawn target count is reached.

use rand::Rng;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Mutex;
use tracing::{debug, info};
use crate::domain::error::AuditError;
use crate::domain::models::{ratio, LabelOutcome, Reading};
use crate::domain::ports::FaultLabeler;

const MIN_CLUSTERS: usize = 2;
const MAX_CLUSTERS: usize = 5;
const MIN_CLUSTER_LEN: usize = 1;
const MAX_CLUSTER_LEN: usize = 5;
const ISOLATED_ATTEMPTS: usize = 10;

/// Random draws used by the simulated labeler.
pub trait RandomSource {
    /// Uniform in `[low, high]`.
    fn rate(&mut self, low: f64, high: f64) -> f64;
    /// Uniform in `[0, len)`; `len` is never zero.
    fn index(&mut self, len: usize) -> usize;
    /// Uniform in the inclusive integer range `[low, high]`.
    fn between(&mut self, low: usize, high: usize) -> usize;
}

/// Adapts any `rand` generator.
pub struct RngSource<R>(pub R);

impl<R: Rng> RandomSource for RngSource<R> {
    fn rate(&mut self, low: f64, high: f64) -> f64 {
        if high <= low {
            low
        } else {
            self.0.gen_range(low..=high)
        }
    }

    fn index(&mut self, len: usize) -> usize {
        self.0.gen_range(0..len)
    }

    fn between(&mut self, low: usize, high: usize) -> usize {
        self.0.gen_range(low..=high)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NeighborMode {
    /// Index 0 and index N-1 are neighbors.
    #[default]
    Wrap,
    /// Out-of-range neighbors are ignored.
    Linear,
}

impl FromStr for NeighborMode {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "wrap" => Ok(NeighborMode::Wrap),
            "linear" => Ok(NeighborMode::Linear),
            other => Err(AuditError::Config(format!("unsupported neighbor mode '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationSettings {
    pub min_error_rate: f64,
    pub max_error_rate: f64,
    pub neighbor_mode: NeighborMode,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            min_error_rate: 0.02,
            max_error_rate: 0.07,
            neighbor_mode: NeighborMode::Wrap,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ParseFailureLabeler;

impl FaultLabeler for ParseFailureLabeler {
    fn label(&self, readings: &mut [Reading]) -> LabelOutcome {
        for reading in readings.iter_mut() {
            reading.has_error = reading.value.is_none();
        }
        let errors = readings.iter().filter(|r| r.has_error).count();
        debug!("Flagged {} unparsable readings out of {}", errors, readings.len());
        LabelOutcome::from_count(errors, readings.len())
    }
}

pub struct SimulatedFaultLabeler<R = RngSource<rand::rngs::StdRng>> {
    settings: SimulationSettings,
    source: Mutex<R>,
}

impl SimulatedFaultLabeler {
    /// Labeler drawing from an entropy-seeded generator.
    pub fn from_entropy(settings: SimulationSettings) -> Self {
        use rand::SeedableRng;
        Self::with_source(settings, RngSource(rand::rngs::StdRng::from_entropy()))
    }
}

impl<R: RandomSource> SimulatedFaultLabeler<R> {
    pub fn with_source(settings: SimulationSettings, source: R) -> Self {
        Self {
            settings,
            source: Mutex::new(source),
        }
    }
}

impl<R: RandomSource + Send> FaultLabeler for SimulatedFaultLabeler<R> {
    fn label(&self, readings: &mut [Reading]) -> LabelOutcome {
        let mut source = self
            .source
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        simulate_faults(readings, &self.settings, &mut *source)
    }
}

/// Overwrites every `has_error` flag with a synthetic fault pattern.
pub fn simulate_faults<R: RandomSource + ?Sized>(
    readings: &mut [Reading],
    settings: &SimulationSettings,
    source: &mut R,
) -> LabelOutcome {
    let n = readings.len();
    for reading in readings.iter_mut() {
        reading.has_error = false;
    }
    if n == 0 {
        return LabelOutcome::default();
    }

    let base_rate = source.rate(settings.min_error_rate, settings.max_error_rate);
    let requested_count = (n as f64 * base_rate).floor() as usize;
    let cluster_count = source.between(MIN_CLUSTERS, MAX_CLUSTERS);
    debug!(
        "Simulating faults: base rate {:.4}, target {} of {}, {} clusters",
        base_rate, requested_count, n, cluster_count
    );

    let mut faulty = BTreeSet::new();
    for _ in 0..cluster_count {
        let start = source.index(n);
        let length = source.between(MIN_CLUSTER_LEN, MAX_CLUSTER_LEN);
        for offset in 0..length {
            faulty.insert((start + offset) % n);
        }
    }
    let cluster_marked = faulty.len();

    let remaining = requested_count.saturating_sub(cluster_marked);
    for _ in 0..remaining {
        for _ in 0..ISOLATED_ATTEMPTS {
            let candidate = source.index(n);
            if is_isolated(candidate, n, &faulty, settings.neighbor_mode) {
                faulty.insert(candidate);
                break;
            }
        }
    }

    for &index in &faulty {
        readings[index].has_error = true;
    }

    let outcome = LabelOutcome {
        error_count: faulty.len(),
        error_rate: ratio(faulty.len(), n),
        requested_count,
        cluster_marked,
    };
    info!(
        "Simulated {} faults ({} from clusters) across {} readings",
        outcome.error_count, cluster_marked, n
    );
    outcome
}

fn is_isolated(index: usize, n: usize, faulty: &BTreeSet<usize>, mode: NeighborMode) -> bool {
    if faulty.contains(&index) {
        return false;
    }
    let (prev, next) = match mode {
        NeighborMode::Wrap => (Some((index + n - 1) % n), Some((index + 1) % n)),
        NeighborMode::Linear => (index.checked_sub(1), Some(index + 1).filter(|&i| i < n)),
    };
    !prev.is_some_and(|i| faulty.contains(&i)) && !next.is_some_and(|i| faulty.contains(&i))
}

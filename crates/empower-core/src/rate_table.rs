//! Per-station rate-control statistics.
//!
//! A [`RateTable`] mirrors the minstrel table an AP keeps for one station.
//! It is replaced wholesale on every `WIFI_RC_STATS_RES` and the derived
//! values (`best_ewma`, `best_cur`, `valid_ewma`, `valid_cur`) are recomputed
//! immediately, so readers never see a half-updated table.
//!
//! Keys are rate codes: the raw HT MCS index for HT-capable stations, and the
//! half-Mbps legacy code otherwise (see [`crate::LegacyRate`]).

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Default rate-validity cutoff.
pub const DEFAULT_PROB_THRESHOLD: f64 = 0.90;

/// Scale factor of probabilities on the wire.
pub const PROB_SCALE: u32 = 180;

/// A success probability in fixed point, `raw / 180`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Probability(u32);

impl Probability {
    pub const ZERO: Probability = Probability(0);
    pub const ONE: Probability = Probability(PROB_SCALE);

    /// Wrap a raw wire value, saturating at 1.0.
    pub fn from_raw(raw: u32) -> Self {
        Self(raw.min(PROB_SCALE))
    }

    /// Nearest fixed-point value for a fraction in [0, 1].
    pub fn from_fraction(fraction: f64) -> Self {
        let raw = (fraction.clamp(0.0, 1.0) * f64::from(PROB_SCALE)).round();
        Self(raw as u32)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn fraction(self) -> f64 {
        f64::from(self.0) / f64::from(PROB_SCALE)
    }

    /// `self >= threshold`, tolerant to the rounding of `threshold * 180`.
    pub fn meets(self, threshold: f64) -> bool {
        self.fraction() + 1e-9 >= threshold
    }
}

/// One row of a station's rate table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateEntry {
    pub ewma_prob: Probability,
    pub cur_prob: Probability,
    pub cur_tp: u32,
    pub last_attempts: u32,
    pub last_successes: u32,
    pub hist_attempts: u32,
    pub hist_successes: u32,
}

impl RateEntry {
    /// Entry with only the two probabilities set, for callers that do not
    /// track throughput and attempt counters.
    pub fn with_probs(ewma: Probability, cur: Probability) -> Self {
        Self {
            ewma_prob: ewma,
            cur_prob: cur,
            ..Self::default()
        }
    }
}

/// Rate table of one station plus its derived selections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateTable {
    rates: BTreeMap<u8, RateEntry>,
    prob_threshold: f64,
    best_ewma: u8,
    best_cur: u8,
    valid_ewma: BTreeSet<u8>,
    valid_cur: BTreeSet<u8>,
}

impl Default for RateTable {
    fn default() -> Self {
        Self::new(DEFAULT_PROB_THRESHOLD)
    }
}

impl RateTable {
    /// Empty table using `prob_threshold` as the validity cutoff.
    pub fn new(prob_threshold: f64) -> Self {
        Self {
            rates: BTreeMap::new(),
            prob_threshold,
            best_ewma: 0,
            best_cur: 0,
            valid_ewma: BTreeSet::new(),
            valid_cur: BTreeSet::new(),
        }
    }

    /// Build a table in one step. Later duplicates of a key win.
    pub fn from_entries(prob_threshold: f64, entries: impl IntoIterator<Item = (u8, RateEntry)>) -> Self {
        let mut table = Self::new(prob_threshold);
        table.update(entries);
        table
    }

    /// Replace the table contents and recompute the derived values.
    pub fn update(&mut self, entries: impl IntoIterator<Item = (u8, RateEntry)>) {
        self.rates = entries.into_iter().collect();
        self.recompute();
    }

    /// Change the validity cutoff and recompute.
    pub fn set_prob_threshold(&mut self, prob_threshold: f64) {
        self.prob_threshold = prob_threshold;
        self.recompute();
    }

    fn recompute(&mut self) {
        self.best_ewma = argmax(&self.rates, |e| e.ewma_prob);
        self.best_cur = argmax(&self.rates, |e| e.cur_prob);

        if self.best_ewma == 0 && self.best_cur == 0 {
            let lowest = self.rates.keys().next().copied().unwrap_or(0);
            self.best_ewma = lowest;
            self.best_cur = lowest;
        }

        let threshold = self.prob_threshold;
        self.valid_ewma = self
            .rates
            .iter()
            .filter(|(_, e)| e.ewma_prob.meets(threshold))
            .map(|(&mcs, _)| mcs)
            .collect();
        self.valid_cur = self
            .rates
            .iter()
            .filter(|(_, e)| e.cur_prob.meets(threshold))
            .map(|(&mcs, _)| mcs)
            .collect();
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn get(&self, mcs: u8) -> Option<&RateEntry> {
        self.rates.get(&mcs)
    }

    pub fn entries(&self) -> impl Iterator<Item = (u8, &RateEntry)> {
        self.rates.iter().map(|(&k, v)| (k, v))
    }

    pub fn prob_threshold(&self) -> f64 {
        self.prob_threshold
    }

    /// Rate with the highest EWMA probability, ties to the higher rate.
    pub fn best_ewma(&self) -> u8 {
        self.best_ewma
    }

    /// Rate with the highest current probability, ties to the higher rate.
    pub fn best_cur(&self) -> u8 {
        self.best_cur
    }

    /// Rates whose EWMA probability meets the threshold.
    pub fn valid_ewma(&self) -> &BTreeSet<u8> {
        &self.valid_ewma
    }

    /// Rates whose current probability meets the threshold.
    pub fn valid_cur(&self) -> &BTreeSet<u8> {
        &self.valid_cur
    }
}

/// Highest-probability key among entries with a non-zero probability; keys
/// iterate ascending so `>=` keeps the higher key on ties. Zero if none.
fn argmax(rates: &BTreeMap<u8, RateEntry>, prob: impl Fn(&RateEntry) -> Probability) -> u8 {
    let mut best = 0u8;
    let mut best_prob = Probability::ZERO;
    for (&mcs, entry) in rates {
        let p = prob(entry);
        if p > Probability::ZERO && p >= best_prob {
            best = mcs;
            best_prob = p;
        }
    }
    best
}

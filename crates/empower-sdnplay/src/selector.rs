//! Per-group MCS selection.
//!
//! For one group on one block, the selector looks at the receivers attached
//! to that block and picks the fastest rate every one of them can decode
//! reliably. When no common reliable rate exists it falls back to the rate
//! the weakest receiver can still sustain. The result never goes below the
//! block's lowest supported rate; `0` means "use DMS this cycle".

use std::collections::BTreeSet;

use empower_core::{BlockRef, MulticastGroup, RadioBlock, RateTable};
use empower_lvapp::ApRegistry;

/// Accumulator start value; a result still equal to it means no station
/// lowered it.
const SYS_MAX: u8 = u8::MAX;

/// Stateless MCS selector.
#[derive(Debug, Clone, Copy, Default)]
pub struct McsSelector;

impl McsSelector {
    /// MCS for `group` on `block`, or 0 when no receiver is attached there.
    pub fn select(group: &MulticastGroup, block: BlockRef, registry: &ApRegistry) -> u8 {
        let Some(state) = registry.block(block) else {
            return 0;
        };
        let receivers: Vec<&RateTable> = registry
            .stations_on(block)
            .filter(|sta| group.receivers.contains(&sta.addr))
            .map(|sta| &sta.rates)
            .collect();
        Self::select_for(&receivers, &state.block)
    }

    /// Core of [`select`](Self::select) over the receivers' rate tables.
    pub fn select_for(receivers: &[&RateTable], block: &RadioBlock) -> u8 {
        if receivers.is_empty() {
            return 0;
        }

        let mcs = if receivers.iter().all(|t| !t.valid_ewma().is_empty()) {
            match intersect(receivers).iter().next_back() {
                Some(&best) => best,
                None => slowest_best(receivers),
            }
        } else {
            slowest_best(receivers)
        };

        if mcs == SYS_MAX {
            return 0;
        }
        mcs.max(block.min_rate_code())
    }
}

/// Rates valid for every receiver.
fn intersect(receivers: &[&RateTable]) -> BTreeSet<u8> {
    let mut iter = receivers.iter();
    let Some(first) = iter.next() else {
        return BTreeSet::new();
    };
    iter.fold(first.valid_ewma().clone(), |acc, t| {
        acc.intersection(t.valid_ewma()).copied().collect()
    })
}

/// `min` over receivers of `max(valid_ewma ∪ {best_ewma})`.
fn slowest_best(receivers: &[&RateTable]) -> u8 {
    receivers.iter().fold(SYS_MAX, |acc, t| {
        let top = t
            .valid_ewma()
            .iter()
            .next_back()
            .copied()
            .map_or(t.best_ewma(), |v| v.max(t.best_ewma()));
        acc.min(top)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use empower_core::{Address, Band, Probability, RateEntry};

    fn block(band: Band) -> RadioBlock {
        RadioBlock::new(0, Address::parse("04:F0:21:09:F9:9E").unwrap(), 36, band).unwrap()
    }

    /// Table where `valid` rates are at probability 1.0 and `weak` rates at
    /// the given probability.
    fn table(valid: &[u8], weak: &[(u8, f64)]) -> RateTable {
        let full = RateEntry::with_probs(Probability::ONE, Probability::ONE);
        let entries = valid.iter().map(|&m| (m, full)).chain(weak.iter().map(|&(m, p)| {
            let prob = Probability::from_fraction(p);
            (m, RateEntry::with_probs(prob, prob))
        }));
        RateTable::from_entries(0.9, entries)
    }

    #[test]
    fn test_no_receivers_means_dms() {
        assert_eq!(McsSelector::select_for(&[], &block(Band::HT20)), 0);
    }

    #[test]
    fn test_intersection_picks_highest_common_rate() {
        let a = table(&[4, 5, 6], &[]);
        let b = table(&[5, 6, 7], &[]);
        assert_eq!(McsSelector::select_for(&[&a, &b], &block(Band::HT20)), 6);
    }

    #[test]
    fn test_disjoint_sets_fall_back_to_slowest_best() {
        let a = table(&[1, 2], &[]);
        let b = table(&[5, 6], &[]);
        // max(valid ∪ best) is 2 for a and 6 for b
        assert_eq!(McsSelector::select_for(&[&a, &b], &block(Band::HT20)), 2);
    }

    #[test]
    fn test_station_without_valid_rates_uses_best_ewma() {
        let weak = table(&[], &[(3, 0.5), (5, 0.7), (7, 0.2)]);
        let good = table(&[6, 7], &[]);
        assert_eq!(weak.best_ewma(), 5);
        assert_eq!(McsSelector::select_for(&[&weak, &good], &block(Band::HT20)), 5);
    }

    #[test]
    fn test_ht_result_clamped_to_lowest_supported() {
        let ht = block(Band::HT20).with_ht_supports([4, 5, 6, 7]);
        let a = table(&[1, 2], &[]);
        let b = table(&[1, 2, 3], &[]);
        assert_eq!(McsSelector::select_for(&[&a, &b], &ht), 4);
    }

    #[test]
    fn test_legacy_result_clamped_to_lowest_supported_rate() {
        // 5 GHz L20 block: lowest rate 6 Mbps, code 12
        let l20 = block(Band::L20);
        let a = table(&[2, 4], &[]);
        assert_eq!(McsSelector::select_for(&[&a], &l20), 12);
    }

    #[test]
    fn test_single_receiver_takes_its_top_valid_rate() {
        let a = table(&[4, 5, 6, 7], &[(8, 0.1)]);
        assert_eq!(McsSelector::select_for(&[&a], &block(Band::HT20)), 7);
    }
}

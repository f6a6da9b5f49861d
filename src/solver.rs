//! Local progressive filling.
//!
//! Each station splits the capacity among the stations it knows about,
//! saturating those whose claim is already below the equal share and
//! re-splitting what remains. Stations only ever see claims, never demands,
//! so the global max-min allocation emerges over repeated broadcasts: every
//! station bounds its own claim by the smallest offer it has heard.

use fnv::FnvHashSet;

use crate::neighbors::NeighborTable;
use crate::StationId;

/// Link throughput that maps to a full airtime share, in kbps.
pub const MAX_THROUGHPUT_KBPS: f64 = 5140.0;

/// Normalize an application rate to an airtime demand in `[0, capacity]`.
pub fn demand_from_rate(rate_kbps: f64, capacity: f64, max_throughput_kbps: f64) -> f64 {
    if max_throughput_kbps <= 0.0 || rate_kbps <= 0.0 {
        return 0.0;
    }

    capacity.min(rate_kbps * capacity / max_throughput_kbps)
}

/// The share this station offers itself given everyone's current claims.
pub fn fair_offer(table: &NeighborTable, capacity: f64) -> f64 {
    if table.is_empty() {
        return capacity;
    }

    let all: Vec<(&StationId, f64)> = table.iter().map(|(s, r)| (s, r.claim)).collect();
    let mut saturated: FnvHashSet<&StationId> = FnvHashSet::default();
    let mut residual = capacity;

    // every pass either saturates a station or finishes
    for _ in 0..=all.len() {
        let unsaturated: Vec<&(&StationId, f64)> = all
            .iter()
            .filter(|(s, _)| !saturated.contains(s))
            .collect();

        if unsaturated.is_empty() {
            // everyone fits under the split: hand out the leftover on top of
            // the largest claim
            let max_claim = all.iter().map(|&(_, c)| c).fold(0.0, f64::max);
            return residual + max_claim;
        }

        let offer = residual / unsaturated.len() as f64;
        let mut moved = false;
        for &&(s, claim) in &unsaturated {
            if claim < offer {
                saturated.insert(s);
                residual -= claim;
                moved = true;
            }
        }

        if !moved {
            return offer;
        }
    }

    unreachable!("progressive filling did not terminate")
}

/// Own claim: demand, bounded by the smallest offer known.
pub fn fair_claim(table: &NeighborTable, demand: f64) -> f64 {
    table
        .iter()
        .map(|(_, r)| r.offer)
        .fold(demand, f64::min)
}

/// Recompute the own offer and claim in place. Returns the new `(offer, claim)`.
pub fn solve(table: &mut NeighborTable, station: &StationId, capacity: f64) -> Option<(f64, f64)> {
    let offer = fair_offer(table, capacity);
    let me = table.get_mut(station)?;
    me.offer = offer;
    let demand = me.demand;

    let claim = fair_claim(table, demand);
    table.get_mut(station)?.claim = claim;
    Some((offer, claim))
}

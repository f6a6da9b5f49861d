use fnv::FnvHashMap;

use crate::StationId;

/// Fairness state of one station, as last heard.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NeighborRecord {
    /// Local monotonic time of the last update, in ns.
    pub timestamp: u64,
    pub offer: f64,
    pub claim: f64,
    /// Only meaningful for the own record; neighbors do not advertise it.
    pub demand: f64,
}

/// One record per station ever heard, until it goes quiet.
#[derive(Clone, Debug, Default)]
pub struct NeighborTable {
    records: FnvHashMap<StationId, NeighborRecord>,
}

impl NeighborTable {
    pub fn upsert(&mut self, station: StationId, record: NeighborRecord) {
        self.records.insert(station, record);
    }

    pub fn get(&self, station: &StationId) -> Option<&NeighborRecord> {
        self.records.get(station)
    }

    pub fn get_mut(&mut self, station: &StationId) -> Option<&mut NeighborRecord> {
        self.records.get_mut(station)
    }

    /// Remove every record whose age exceeds `timeout_ns`, returning the evicted stations.
    pub fn evict_expired(&mut self, now: u64, timeout_ns: u64) -> Vec<StationId> {
        let expired: Vec<StationId> = self
            .records
            .iter()
            .filter(|(_, r)| now.saturating_sub(r.timestamp) > timeout_ns)
            .map(|(s, _)| s.clone())
            .collect();

        for s in &expired {
            self.records.remove(s);
        }

        expired
    }

    pub fn snapshot(&self) -> FnvHashMap<StationId, NeighborRecord> {
        self.records.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StationId, &NeighborRecord)> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{NeighborRecord, NeighborTable};
    use crate::StationId;

    const SEC: u64 = 1_000_000_000;

    fn rec(timestamp: u64, claim: f64) -> NeighborRecord {
        NeighborRecord {
            timestamp,
            offer: 1.0,
            claim,
            demand: 0.0,
        }
    }

    #[test]
    fn one_record_per_station() {
        let mut t = NeighborTable::default();
        t.upsert(StationId::new("10.0.0.2"), rec(1, 0.1));
        t.upsert(StationId::new("10.0.0.2"), rec(2, 0.2));
        t.upsert(StationId::new("10.0.0.3"), rec(2, 0.3));
        assert_eq!(t.len(), 2);
        assert_eq!(t.get(&StationId::new("10.0.0.2")).unwrap().claim, 0.2);
    }

    #[test]
    fn eviction_boundary() {
        let i_time = 2 * SEC;
        let timeout = 5 * i_time;
        let now = 100 * SEC;
        let eps = 1_000;

        let mut t = NeighborTable::default();
        t.upsert(StationId::new("stale"), rec(now - timeout - eps, 0.1));
        t.upsert(StationId::new("fresh"), rec(now - timeout + eps, 0.1));
        t.upsert(StationId::new("edge"), rec(now - timeout, 0.1));

        let evicted = t.evict_expired(now, timeout);
        assert_eq!(evicted, vec![StationId::new("stale")]);
        assert!(t.get(&StationId::new("stale")).is_none());
        assert!(t.get(&StationId::new("fresh")).is_some());
        assert!(t.get(&StationId::new("edge")).is_some());
    }

    #[test]
    fn future_timestamps_survive() {
        let mut t = NeighborTable::default();
        t.upsert(StationId::new("a"), rec(50 * SEC, 0.1));
        assert!(t.evict_expired(10 * SEC, SEC).is_empty());
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn snapshot_is_detached() {
        let mut t = NeighborTable::default();
        t.upsert(StationId::new("a"), rec(1, 0.1));
        let snap = t.snapshot();
        t.get_mut(&StationId::new("a")).unwrap().claim = 0.9;
        assert_eq!(snap[&StationId::new("a")].claim, 0.1);
    }
}

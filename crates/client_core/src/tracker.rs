//! In-flight operation bookkeeping for row-level busy indicators.

use std::collections::HashMap;

use shared::domain::ServerId;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OperationKey {
    Ping(String),
    /// Saves have no target yet, so each one is keyed by its issuing generation.
    Save(u64),
    Delete(ServerId),
}

/// Keyed map of operations awaiting a response, each tagged with the
/// generation that issued it.
#[derive(Debug, Default)]
pub struct ActiveOperationTracker {
    in_flight: HashMap<OperationKey, u64>,
}

impl ActiveOperationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-issuing a key that is still in flight moves it to the newer generation.
    pub fn begin(&mut self, key: OperationKey, generation: u64) {
        self.in_flight.insert(key, generation);
    }

    /// Clears `key` only if it still belongs to `generation`, so an older
    /// response cannot clear a newer request for the same key.
    pub fn finish(&mut self, key: &OperationKey, generation: u64) -> bool {
        match self.in_flight.get(key) {
            Some(current) if *current == generation => {
                self.in_flight.remove(key);
                true
            }
            _ => false,
        }
    }

    pub fn is_active(&self, key: &OperationKey) -> bool {
        self.in_flight.contains_key(key)
    }

    /// The most recently issued ping still awaiting a response.
    pub fn active_ping(&self) -> Option<String> {
        self.in_flight
            .iter()
            .filter_map(|(key, generation)| match key {
                OperationKey::Ping(address) => Some((*generation, address)),
                _ => None,
            })
            .max_by_key(|(generation, _)| *generation)
            .map(|(_, address)| address.clone())
    }

    pub fn in_flight(&self) -> Vec<OperationKey> {
        let mut entries: Vec<(&OperationKey, &u64)> = self.in_flight.iter().collect();
        entries.sort_by_key(|(_, generation)| **generation);
        entries.into_iter().map(|(key, _)| key.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_issued_ping_wins_the_active_token() {
        let mut tracker = ActiveOperationTracker::new();
        tracker.begin(OperationKey::Ping("10.0.0.1".into()), 1);
        tracker.begin(OperationKey::Ping("10.0.0.2".into()), 2);

        assert_eq!(tracker.active_ping().as_deref(), Some("10.0.0.2"));
        assert!(tracker.is_active(&OperationKey::Ping("10.0.0.1".into())));
        assert!(tracker.is_active(&OperationKey::Ping("10.0.0.2".into())));
    }

    #[test]
    fn finishing_one_ping_keeps_the_other_tracked() {
        let mut tracker = ActiveOperationTracker::new();
        tracker.begin(OperationKey::Ping("10.0.0.1".into()), 1);
        tracker.begin(OperationKey::Ping("10.0.0.2".into()), 2);

        assert!(tracker.finish(&OperationKey::Ping("10.0.0.2".into()), 2));
        assert_eq!(tracker.active_ping().as_deref(), Some("10.0.0.1"));

        assert!(tracker.finish(&OperationKey::Ping("10.0.0.1".into()), 1));
        assert_eq!(tracker.active_ping(), None);
        assert!(tracker.in_flight().is_empty());
    }

    #[test]
    fn older_generation_cannot_clear_reissued_key() {
        let mut tracker = ActiveOperationTracker::new();
        let key = OperationKey::Ping("10.0.0.1".into());
        tracker.begin(key.clone(), 1);
        tracker.begin(key.clone(), 3);

        assert!(!tracker.finish(&key, 1));
        assert!(tracker.is_active(&key));
        assert!(tracker.finish(&key, 3));
    }

    #[test]
    fn tracks_non_ping_operations_by_kind() {
        let mut tracker = ActiveOperationTracker::new();
        tracker.begin(OperationKey::Delete(ServerId(4)), 5);
        tracker.begin(OperationKey::Save(6), 6);

        assert_eq!(tracker.active_ping(), None);
        assert_eq!(
            tracker.in_flight(),
            vec![OperationKey::Delete(ServerId(4)), OperationKey::Save(6)]
        );
    }

    #[test]
    fn overlapping_saves_clear_independently() {
        let mut tracker = ActiveOperationTracker::new();
        tracker.begin(OperationKey::Save(1), 1);
        tracker.begin(OperationKey::Save(2), 2);

        assert!(tracker.finish(&OperationKey::Save(2), 2));
        assert_eq!(tracker.in_flight(), vec![OperationKey::Save(1)]);
        assert!(tracker.finish(&OperationKey::Save(1), 1));
        assert!(tracker.in_flight().is_empty());
    }
}

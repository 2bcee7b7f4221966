//! Bounded store of active alerts.

use std::collections::VecDeque;

use pw_types::{Alert, AlertId};

/// Number of alerts kept when no capacity is configured.
pub const DEFAULT_ALERT_CAPACITY: usize = 10;

/// Active alerts, newest first.
///
/// Pushing beyond capacity evicts the oldest entry. Every mutation bumps
/// [`AlertStore::revision`], which orders alert-list publications.
#[derive(Debug, Clone)]
pub struct AlertStore {
    alerts: VecDeque<Alert>,
    capacity: usize,
    revision: u64,
}

impl Default for AlertStore {
    fn default() -> Self {
        Self::new(DEFAULT_ALERT_CAPACITY)
    }
}

impl AlertStore {
    /// Create a store holding at most `capacity` alerts (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            alerts: VecDeque::with_capacity(capacity + 1),
            capacity,
            revision: 0,
        }
    }

    /// Prepend `alert`; returns the alert evicted to stay within capacity.
    pub fn push(&mut self, alert: Alert) -> Option<Alert> {
        self.alerts.push_front(alert);
        self.revision += 1;
        if self.alerts.len() > self.capacity {
            self.alerts.pop_back()
        } else {
            None
        }
    }

    /// Remove the alert with `id`. Unknown ids are ignored; returns whether
    /// anything was removed.
    pub fn dismiss(&mut self, id: AlertId) -> bool {
        match self.alerts.iter().position(|a| a.id == id) {
            Some(index) => {
                self.alerts.remove(index);
                self.revision += 1;
                true
            }
            None => false,
        }
    }

    /// Current alerts, newest first.
    pub fn list(&self) -> Vec<Alert> {
        self.alerts.iter().cloned().collect()
    }

    pub fn get(&self, id: AlertId) -> Option<&Alert> {
        self.alerts.iter().find(|a| a.id == id)
    }

    pub fn reset(&mut self) {
        if !self.alerts.is_empty() {
            self.alerts.clear();
            self.revision += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pw_types::AlertType;

    fn alert(id: AlertId) -> Alert {
        Alert::new(
            id,
            AlertType::Info,
            "USDT",
            format!("alert {id}"),
            "test".into(),
        )
    }

    fn ids(store: &AlertStore) -> Vec<AlertId> {
        store.list().iter().map(|a| a.id).collect()
    }

    #[test]
    fn push_is_newest_first() {
        let mut store = AlertStore::default();
        store.push(alert(1));
        store.push(alert(2));
        store.push(alert(3));

        assert_eq!(ids(&store), [3, 2, 1]);
    }

    #[test]
    fn never_exceeds_capacity() {
        let mut store = AlertStore::new(DEFAULT_ALERT_CAPACITY);
        for id in 1..=100 {
            store.push(alert(id));
            assert!(store.len() <= DEFAULT_ALERT_CAPACITY);
        }
        assert_eq!(store.len(), DEFAULT_ALERT_CAPACITY);
    }

    #[test]
    fn overflow_evicts_oldest_and_keeps_order() {
        let mut store = AlertStore::new(10);
        for id in 1..=10 {
            assert!(store.push(alert(id)).is_none());
        }

        let evicted = store.push(alert(11)).expect("oldest should be evicted");
        assert_eq!(evicted.id, 1);
        assert!(store.get(1).is_none());
        assert_eq!(ids(&store), (2..=11).rev().collect::<Vec<_>>());
    }

    #[test]
    fn dismiss_removes_matching_entry() {
        let mut store = AlertStore::default();
        for id in 1..=3 {
            store.push(alert(id));
        }

        assert!(store.dismiss(2));
        assert_eq!(ids(&store), [3, 1]);
    }

    #[test]
    fn dismiss_unknown_id_is_noop() {
        let mut store = AlertStore::default();
        store.push(alert(1));
        let before = store.list();
        let revision = store.revision();

        assert!(!store.dismiss(42));
        assert_eq!(store.list(), before);
        assert_eq!(store.revision(), revision);
    }

    #[test]
    fn reset_clears_everything() {
        let mut store = AlertStore::new(3);
        store.push(alert(1));
        store.push(alert(2));
        store.reset();

        assert!(store.is_empty());
        assert_eq!(store.capacity(), 3);
    }

    #[test]
    fn revision_tracks_mutations() {
        let mut store = AlertStore::default();
        assert_eq!(store.revision(), 0);
        store.push(alert(1));
        store.push(alert(2));
        store.dismiss(1);
        assert_eq!(store.revision(), 3);
        store.reset();
        assert_eq!(store.revision(), 4);
        store.reset();
        assert_eq!(store.revision(), 4);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut store = AlertStore::new(0);
        store.push(alert(1));
        store.push(alert(2));
        assert_eq!(ids(&store), [2]);
    }
}

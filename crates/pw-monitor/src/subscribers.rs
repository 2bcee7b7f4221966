//! Subscriber registries for analysis and alert publications.
//!
//! Each registration gets a [`SubscriptionId`]; removal is a map delete.
//! Publication copies the current subscriber list out of the lock before
//! invoking anything, so a callback may unsubscribe itself (or others) while
//! being notified.
//!
//! Every publication carries a sequence number. A subscriber is only handed a
//! sequence number greater than the last one it received, so deliveries to a
//! given subscriber are in order and never duplicated even when two
//! publications race.
//!
//! A subscriber is never entered twice: while its callback is running, any
//! other publication skips it. A hung callback therefore pins at most one
//! thread and simply misses the publications made in the meantime.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Handle identifying one registration within a registry.
pub type SubscriptionId = u64;

/// Callback invoked with each published value.
pub type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Subscriber<T: ?Sized> {
    id: SubscriptionId,
    callback: Callback<T>,
    /// Last delivered sequence number plus one; zero means nothing delivered.
    delivered: AtomicU64,
    active: AtomicBool,
    /// Set while the callback is executing.
    busy: AtomicBool,
}

impl<T: ?Sized> Subscriber<T> {
    fn enter(&self) -> bool {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn leave(&self) {
        self.busy.store(false, Ordering::Release);
    }

    /// Claim `seq` for delivery. Fails if an equal or newer value already went out.
    fn claim(&self, seq: u64) -> bool {
        let ticket = seq.saturating_add(1);
        self.delivered.fetch_max(ticket, Ordering::AcqRel) < ticket
    }
}

/// Outcome of one publication.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    /// Subscribers that already had this or a newer publication.
    pub skipped: usize,
    /// Subscribers still inside an earlier callback.
    pub busy: usize,
    /// Subscribers whose callback panicked.
    pub failed: usize,
}

/// Registry of callbacks for one kind of publication.
pub struct SubscriberRegistry<T: ?Sized> {
    name: &'static str,
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<SubscriptionId, Arc<Subscriber<T>>>>,
    failures: AtomicU64,
}

impl<T: ?Sized> std::fmt::Debug for SubscriberRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("name", &self.name)
            .field("subscribers", &self.len())
            .field("failures", &self.failures())
            .finish()
    }
}

impl<T: ?Sized> SubscriberRegistry<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            next_id: AtomicU64::new(1),
            subscribers: Mutex::new(HashMap::new()),
            failures: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Register a callback. It receives nothing until the next delivery.
    pub fn register(&self, callback: Callback<T>) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let subscriber = Arc::new(Subscriber {
            id,
            callback,
            delivered: AtomicU64::new(0),
            active: AtomicBool::new(true),
            busy: AtomicBool::new(false),
        });
        self.subscribers.lock().insert(id, subscriber);
        debug!(registry = self.name, id, "subscriber registered");
        id
    }

    /// Deregister `id`. Returns false if it was not registered.
    pub fn remove(&self, id: SubscriptionId) -> bool {
        let removed = self.subscribers.lock().remove(&id);
        match removed {
            Some(subscriber) => {
                subscriber.active.store(false, Ordering::Release);
                debug!(registry = self.name, id, "subscriber removed");
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.subscribers.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total callback panics seen by this registry.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Deliver `value` to a single subscriber (replay on subscribe).
    pub fn deliver_to(&self, id: SubscriptionId, seq: u64, value: &T) -> bool {
        let subscriber = self.subscribers.lock().get(&id).cloned();
        match subscriber {
            Some(subscriber) => self.invoke(&subscriber, seq, value) == Delivery::Delivered,
            None => false,
        }
    }

    /// Deliver `value` to every registered subscriber, in registration order.
    pub fn publish(&self, seq: u64, value: &T) -> PublishReport {
        let mut subscribers: Vec<Arc<Subscriber<T>>> =
            self.subscribers.lock().values().cloned().collect();
        subscribers.sort_by_key(|s| s.id);

        let mut report = PublishReport::default();
        for subscriber in &subscribers {
            match self.invoke(subscriber, seq, value) {
                Delivery::Delivered => report.delivered += 1,
                Delivery::Panicked => report.failed += 1,
                Delivery::Stale => report.skipped += 1,
                Delivery::Busy => report.busy += 1,
            }
        }
        report
    }

    fn invoke(&self, subscriber: &Subscriber<T>, seq: u64, value: &T) -> Delivery {
        // Removed mid-publication.
        if !subscriber.active.load(Ordering::Acquire) {
            return Delivery::Stale;
        }
        if !subscriber.enter() {
            debug!(registry = self.name, id = subscriber.id, seq, "subscriber busy; skipped");
            return Delivery::Busy;
        }
        if !subscriber.claim(seq) {
            subscriber.leave();
            return Delivery::Stale;
        }

        let outcome = catch_unwind(AssertUnwindSafe(|| (subscriber.callback)(value)));
        subscriber.leave();

        match outcome {
            Ok(()) => Delivery::Delivered,
            Err(panic) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    registry = self.name,
                    id = subscriber.id,
                    seq,
                    panic = panic_message(&*panic),
                    "subscriber callback panicked"
                );
                Delivery::Panicked
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Delivered,
    Panicked,
    /// Removed, or already had this or a newer publication.
    Stale,
    Busy,
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic>"
    }
}

/// Removal side of a registry, independent of the published type.
pub(crate) trait Unsubscribe: Send + Sync {
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
    fn is_subscribed(&self, id: SubscriptionId) -> bool;
}

impl<T: ?Sized + 'static> Unsubscribe for SubscriberRegistry<T> {
    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.remove(id)
    }

    fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.contains(id)
    }
}

/// What a subscription listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionKind {
    Analyses,
    Alerts,
}

/// Token returned by the engine's subscribe calls.
///
/// Dropping the token leaves the subscription in place; call
/// [`Subscription::unsubscribe`] to remove exactly this listener. The token
/// does not keep the engine alive.
pub struct Subscription {
    id: SubscriptionId,
    kind: SubscriptionKind,
    registry: Weak<dyn Unsubscribe>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("active", &self.is_active())
            .finish()
    }
}

impl Subscription {
    pub(crate) fn new(id: SubscriptionId, kind: SubscriptionKind, registry: Weak<dyn Unsubscribe>) -> Self {
        Self { id, kind, registry }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn kind(&self) -> SubscriptionKind {
        self.kind
    }

    pub fn is_active(&self) -> bool {
        self.registry
            .upgrade()
            .map_or(false, |registry| registry.is_subscribed(self.id))
    }

    /// Deregister this listener. Safe to call from inside its own callback;
    /// returns false if it was already removed or the engine is gone.
    pub fn unsubscribe(&self) -> bool {
        self.registry
            .upgrade()
            .map_or(false, |registry| registry.unsubscribe(self.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<u32>>>, Callback<u32>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: Callback<u32> = Arc::new(move |v: &u32| sink.lock().push(*v));
        (seen, callback)
    }

    #[test]
    fn publishes_to_all_subscribers() {
        let registry = SubscriberRegistry::<u32>::new("test");
        let (a, cb_a) = recorder();
        let (b, cb_b) = recorder();
        registry.register(cb_a);
        registry.register(cb_b);

        let report = registry.publish(1, &10);
        assert_eq!(report.delivered, 2);
        assert_eq!(*a.lock(), [10]);
        assert_eq!(*b.lock(), [10]);
    }

    #[test]
    fn stale_and_duplicate_sequences_are_skipped() {
        let registry = SubscriberRegistry::<u32>::new("test");
        let (seen, cb) = recorder();
        registry.register(cb);

        registry.publish(2, &20);
        let report = registry.publish(1, &10);
        assert_eq!(report.skipped, 1);
        registry.publish(2, &20);
        registry.publish(3, &30);

        assert_eq!(*seen.lock(), [20, 30]);
    }

    #[test]
    fn sequence_zero_is_deliverable() {
        let registry = SubscriberRegistry::<[u32]>::new("slices");
        let count = Arc::new(AtomicU64::new(0));
        let sink = Arc::clone(&count);
        let id = registry.register(Arc::new(move |v: &[u32]| {
            assert!(v.is_empty());
            sink.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(registry.deliver_to(id, 0, &[]));
        assert!(!registry.deliver_to(id, 0, &[]));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn removed_subscriber_receives_nothing() {
        let registry = SubscriberRegistry::<u32>::new("test");
        let (seen, cb) = recorder();
        let id = registry.register(cb);

        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        registry.publish(1, &1);

        assert!(seen.lock().is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn panicking_subscriber_is_isolated() {
        let registry = SubscriberRegistry::<u32>::new("test");
        registry.register(Arc::new(|_: &u32| panic!("subscriber bug")));
        let (seen, cb) = recorder();
        registry.register(cb);

        let report = registry.publish(1, &5);
        assert_eq!(report.failed, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(*seen.lock(), [5]);
        assert_eq!(registry.failures(), 1);

        // Still registered and still isolated on the next round.
        registry.publish(2, &6);
        assert_eq!(*seen.lock(), [5, 6]);
        assert_eq!(registry.failures(), 2);
    }

    #[test]
    fn running_callback_is_not_entered_again() {
        let registry: Arc<SubscriberRegistry<u32>> = Arc::new(SubscriberRegistry::new("test"));
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let (entered_tx, release_rx) = (Mutex::new(entered_tx), Mutex::new(release_rx));
        let (seen, cb) = recorder();
        registry.register(Arc::new(move |v: &u32| {
            if *v == 1 {
                entered_tx.lock().send(()).unwrap();
                release_rx.lock().recv().unwrap();
            }
            cb(v);
        }));

        let publisher = {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || registry.publish(1, &1))
        };
        entered_rx.recv().unwrap();

        let report = registry.publish(2, &2);
        assert_eq!(report.busy, 1);
        assert_eq!(report.delivered, 0);

        release_tx.send(()).unwrap();
        assert_eq!(publisher.join().unwrap().delivered, 1);

        registry.publish(3, &3);
        assert_eq!(*seen.lock(), [1, 3]);
    }

    #[test]
    fn callback_can_unsubscribe_itself_during_publication() {
        let registry: Arc<SubscriberRegistry<u32>> = Arc::new(SubscriberRegistry::new("test"));
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let calls = Arc::new(AtomicU64::new(0));

        let handle = Arc::clone(&slot);
        let counter = Arc::clone(&calls);
        let id = registry.register(Arc::new(move |_: &u32| {
            counter.fetch_add(1, Ordering::SeqCst);
            if let Some(subscription) = handle.lock().as_ref() {
                subscription.unsubscribe();
            }
        }));
        let (others, cb) = recorder();
        registry.register(cb);

        let weak: Weak<dyn Unsubscribe> = Arc::downgrade(&registry) as Weak<dyn Unsubscribe>;
        *slot.lock() = Some(Subscription::new(id, SubscriptionKind::Analyses, weak));

        registry.publish(1, &1);
        registry.publish(2, &2);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*others.lock(), [1, 2]);
        assert!(!slot.lock().as_ref().unwrap().is_active());
    }

    #[test]
    fn subscription_outliving_registry_is_inert() {
        let registry: Arc<SubscriberRegistry<u32>> = Arc::new(SubscriberRegistry::new("test"));
        let id = registry.register(Arc::new(|_: &u32| {}));
        let weak: Weak<dyn Unsubscribe> = Arc::downgrade(&registry) as Weak<dyn Unsubscribe>;
        let subscription = Subscription::new(id, SubscriptionKind::Alerts, weak);

        assert!(subscription.is_active());
        drop(registry);
        assert!(!subscription.is_active());
        assert!(!subscription.unsubscribe());
    }
}

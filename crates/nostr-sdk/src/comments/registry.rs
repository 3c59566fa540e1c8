use std::{
  collections::HashMap,
  fmt,
  sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Mutex, MutexGuard, PoisonError, Weak,
  },
};

use log::debug;

use super::{Comment, Topic};

/// Called with the whole refreshed thread of a topic.
pub type Observer = Arc<dyn Fn(&[Comment]) + Send + Sync>;

struct Registration {
  id: u64,
  alive: Arc<AtomicBool>,
  observer: Observer,
}

#[derive(Default)]
struct RegistryInner {
  next_id: AtomicU64,
  topics: Mutex<HashMap<Topic, Vec<Registration>>>,
}

impl RegistryInner {
  fn topics(&self) -> MutexGuard<'_, HashMap<Topic, Vec<Registration>>> {
    // observers run outside the lock, a poisoned map is still consistent
    self.topics.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn remove(&self, topic: &str, id: u64) {
    let removed = {
      let mut topics = self.topics();
      let registrations = match topics.get_mut(topic) {
        Some(registrations) => registrations,
        None => return,
      };
      let removed = registrations
        .iter()
        .position(|registration| registration.id == id)
        .map(|position| registrations.remove(position));
      if registrations.is_empty() {
        topics.remove(topic);
      }
      removed
    };
    // an observer may own handles of its own, they unregister unlocked
    drop(removed);
  }
}

/// Per topic fan-out of thread updates.
///
/// Cloning gives another handle to the same registry.
#[derive(Clone, Default)]
pub struct SubscriptionRegistry {
  inner: Arc<RegistryInner>,
}

impl fmt::Debug for SubscriptionRegistry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SubscriptionRegistry")
      .field("topics", &self.inner.topics().len())
      .finish()
  }
}

impl SubscriptionRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Registers `observer` for `topic` until the returned handle is
  /// unsubscribed or dropped. Registering the same observer twice gives two
  /// independent registrations.
  #[must_use = "dropping the handle unregisters the observer"]
  pub fn register(&self, topic: &str, observer: Observer) -> SubscriptionHandle {
    let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
    let alive = Arc::new(AtomicBool::new(true));

    self
      .inner
      .topics()
      .entry(topic.to_string())
      .or_default()
      .push(Registration {
        id,
        alive: alive.clone(),
        observer,
      });
    debug!("Observer {id} registered for {topic}");

    SubscriptionHandle {
      id,
      topic: topic.to_string(),
      alive,
      registry: Arc::downgrade(&self.inner),
    }
  }

  /// Delivers the thread built by `producer` to every live observer of
  /// `topic`.
  ///
  /// `producer` runs at most once, and only when someone is listening.
  /// Returning `None` skips the delivery.
  pub fn notify<F>(&self, topic: &str, producer: F)
  where
    F: FnOnce() -> Option<Vec<Comment>>,
  {
    let observers: Vec<(Arc<AtomicBool>, Observer)> = match self.inner.topics().get(topic) {
      Some(registrations) => registrations
        .iter()
        .map(|registration| (registration.alive.clone(), registration.observer.clone()))
        .collect(),
      None => return,
    };

    if observers.is_empty() {
      return;
    }

    let thread = match producer() {
      Some(thread) => thread,
      None => return,
    };

    for (alive, observer) in observers {
      if alive.load(Ordering::SeqCst) {
        observer(&thread);
      }
    }
  }

  pub fn observer_count(&self, topic: &str) -> usize {
    self
      .inner
      .topics()
      .get(topic)
      .map(|registrations| {
        registrations
          .iter()
          .filter(|registration| registration.alive.load(Ordering::SeqCst))
          .count()
      })
      .unwrap_or(0)
  }
}

/// One observer's registration for one topic, released on drop.
#[derive(Debug)]
pub struct SubscriptionHandle {
  id: u64,
  topic: Topic,
  alive: Arc<AtomicBool>,
  registry: Weak<RegistryInner>,
}

impl SubscriptionHandle {
  pub fn topic(&self) -> &str {
    &self.topic
  }

  pub fn is_alive(&self) -> bool {
    self.alive.load(Ordering::SeqCst)
  }

  /// Stops deliveries right away, even one already in flight for another
  /// observer of the same topic.
  pub fn unsubscribe(&self) {
    if !self.alive.swap(false, Ordering::SeqCst) {
      return;
    }
    if let Some(registry) = self.registry.upgrade() {
      registry.remove(&self.topic, self.id);
    }
    debug!("Observer {} unregistered from {}", self.id, self.topic);
  }
}

impl Drop for SubscriptionHandle {
  fn drop(&mut self) {
    self.unsubscribe();
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use super::*;
  use crate::comments::tests::comment_event;

  #[cfg(test)]
  use pretty_assertions::assert_eq;

  struct Sut {
    registry: SubscriptionRegistry,
    delivered: Arc<Mutex<Vec<Vec<Comment>>>>,
  }

  impl Sut {
    fn new() -> Self {
      Self {
        registry: SubscriptionRegistry::new(),
        delivered: Arc::new(Mutex::new(vec![])),
      }
    }

    fn recording_observer(&self) -> Observer {
      let delivered = self.delivered.clone();
      Arc::new(move |thread: &[Comment]| delivered.lock().unwrap().push(thread.to_vec()))
    }

    fn deliveries(&self) -> usize {
      self.delivered.lock().unwrap().len()
    }
  }

  fn thread() -> Vec<Comment> {
    vec![Comment::from_event(&comment_event("10.1/abc", "hi", 1, None), 1).unwrap()]
  }

  #[test]
  fn notify_delivers_to_every_registration_of_the_topic() {
    let sut = Sut::new();
    let _first = sut.registry.register("10.1/abc", sut.recording_observer());
    let _second = sut.registry.register("10.1/abc", sut.recording_observer());
    let _other = sut.registry.register("10.1/other", sut.recording_observer());

    sut.registry.notify("10.1/abc", || Some(thread()));

    assert_eq!(sut.deliveries(), 2);
    assert_eq!(sut.delivered.lock().unwrap()[0], thread());
    assert_eq!(sut.registry.observer_count("10.1/abc"), 2);
    assert_eq!(sut.registry.observer_count("10.1/other"), 1);
  }

  #[test]
  fn producer_only_runs_when_someone_listens() {
    let sut = Sut::new();
    let runs = Arc::new(AtomicU64::new(0));

    let counting = |runs: Arc<AtomicU64>| {
      move || {
        runs.fetch_add(1, Ordering::SeqCst);
        Some(thread())
      }
    };

    sut.registry.notify("10.1/abc", counting(runs.clone()));
    assert_eq!(runs.load(Ordering::SeqCst), 0);

    let _a = sut.registry.register("10.1/abc", sut.recording_observer());
    let _b = sut.registry.register("10.1/abc", sut.recording_observer());
    sut.registry.notify("10.1/abc", counting(runs.clone()));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn skipped_production_delivers_nothing() {
    let sut = Sut::new();
    let _handle = sut.registry.register("10.1/abc", sut.recording_observer());

    sut.registry.notify("10.1/abc", || None);

    assert_eq!(sut.deliveries(), 0);
  }

  #[test]
  fn unsubscribed_observers_get_nothing() {
    let sut = Sut::new();
    let handle = sut.registry.register("10.1/abc", sut.recording_observer());

    handle.unsubscribe();
    sut.registry.notify("10.1/abc", || Some(thread()));

    assert!(!handle.is_alive());
    assert_eq!(handle.topic(), "10.1/abc");
    assert_eq!(sut.deliveries(), 0);
    assert_eq!(sut.registry.observer_count("10.1/abc"), 0);
  }

  #[test]
  fn unsubscribing_during_a_notification_stops_later_deliveries() {
    let sut = Sut::new();
    let second: Arc<Mutex<Option<SubscriptionHandle>>> = Arc::new(Mutex::new(None));

    // the first observer unsubscribes the second one while the
    // notification is being delivered
    let to_cancel = second.clone();
    let _first = sut.registry.register(
      "10.1/abc",
      Arc::new(move |_: &[Comment]| {
        if let Some(handle) = to_cancel.lock().unwrap().as_ref() {
          handle.unsubscribe();
        }
      }),
    );
    *second.lock().unwrap() = Some(sut.registry.register("10.1/abc", sut.recording_observer()));

    sut.registry.notify("10.1/abc", || Some(thread()));

    assert_eq!(sut.deliveries(), 0);
    assert_eq!(sut.registry.observer_count("10.1/abc"), 1);
  }

  #[test]
  fn dropping_the_handle_unregisters_the_observer() {
    let sut = Sut::new();
    let kept = sut.registry.register("10.1/abc", sut.recording_observer());
    let dropped = sut.registry.register("10.1/abc", sut.recording_observer());
    assert_eq!(sut.registry.observer_count("10.1/abc"), 2);

    drop(dropped);
    sut.registry.notify("10.1/abc", || Some(thread()));

    assert_eq!(sut.deliveries(), 1);
    assert_eq!(sut.registry.observer_count("10.1/abc"), 1);

    kept.unsubscribe();
    drop(kept);
    assert_eq!(sut.registry.observer_count("10.1/abc"), 0);
  }

  #[test]
  fn observers_owning_handles_can_be_dropped() {
    let sut = Sut::new();
    let inner = sut.registry.register("10.1/other", sut.recording_observer());
    let owning = Mutex::new(Some(inner));
    let outer = sut.registry.register(
      "10.1/abc",
      Arc::new(move |_: &[Comment]| {
        let _ = owning.lock().unwrap().as_ref().map(SubscriptionHandle::topic);
      }),
    );

    drop(outer);

    assert_eq!(sut.registry.observer_count("10.1/abc"), 0);
    assert_eq!(sut.registry.observer_count("10.1/other"), 0);
  }

  #[test]
  fn handles_outliving_the_registry_can_still_unsubscribe() {
    let registry = SubscriptionRegistry::new();
    let handle = registry.register("10.1/abc", Arc::new(|_: &[Comment]| {}));
    drop(registry);

    handle.unsubscribe();
    assert!(!handle.is_alive());
  }
}

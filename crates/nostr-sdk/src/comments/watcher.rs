use std::{
  collections::HashMap,
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
  },
};

use log::{debug, info, warn};
use tokio::{
  sync::{mpsc::UnboundedReceiver, Mutex},
  task::JoinHandle,
};
use uuid::Uuid;

use crate::{
  event::kind::EventKind,
  filter::Filter,
  relay::{RelayNotification, RelayTransport},
};

use super::{store::EventStore, Topic};

/// The relay subscription behind one watched topic.
struct RelaySubscription {
  subscription_id: String,
  interest: usize,
  forwarding: Option<JoinHandle<()>>,
  loaded: Arc<AtomicBool>,
}

/// Keeps one relay subscription per watched topic, shared by everyone
/// watching it, and feeds what comes in to the [`EventStore`].
pub struct RelaySubscriptionManager {
  transport: Arc<dyn RelayTransport>,
  store: Arc<Mutex<EventStore>>,
  subscriptions: Mutex<HashMap<Topic, RelaySubscription>>,
}

impl RelaySubscriptionManager {
  pub fn new(transport: Arc<dyn RelayTransport>, store: Arc<Mutex<EventStore>>) -> Self {
    Self {
      transport,
      store,
      subscriptions: Mutex::new(HashMap::new()),
    }
  }

  /// Starts following `topic` on the relays, or adds interest to the
  /// subscription already following it.
  ///
  /// Relays being unreachable does not fail the watch: whatever is already
  /// stored stays available and the next watch of the topic tries to
  /// subscribe again.
  pub async fn watch(&self, topic: &str) {
    let mut subscriptions = self.subscriptions.lock().await;
    if let Some(subscription) = subscriptions.get_mut(topic) {
      subscription.interest += 1;
      debug!("Interest in {topic} is now {}", subscription.interest);
      if subscription.forwarding.is_none() {
        subscription.forwarding = self
          .open(topic, &subscription.subscription_id, subscription.loaded.clone())
          .await;
      }
      return;
    }

    let subscription_id = Uuid::new_v4().to_string();
    let loaded = Arc::new(AtomicBool::new(false));
    let forwarding = self.open(topic, &subscription_id, loaded.clone()).await;

    subscriptions.insert(
      topic.to_string(),
      RelaySubscription {
        subscription_id,
        interest: 1,
        forwarding,
        loaded,
      },
    );
  }

  /// Opens the relay subscription of `topic`; `None` when no relay took it.
  async fn open(
    &self,
    topic: &str,
    subscription_id: &str,
    loaded: Arc<AtomicBool>,
  ) -> Option<JoinHandle<()>> {
    let filters = vec![Filter::paper_comments(topic, &[EventKind::Text])];

    match self
      .transport
      .subscribe(subscription_id.to_string(), filters.clone())
      .await
    {
      Ok(receiver) => {
        info!("Watching {topic} ({subscription_id})");
        Some(tokio::spawn(forward_events(
          topic.to_string(),
          filters,
          receiver,
          self.store.clone(),
          loaded,
        )))
      }
      Err(err) => {
        warn!("Could not subscribe to comments about {topic}: {err}");
        None
      }
    }
  }

  /// Drops one unit of interest in `topic`; the last one closes the relay
  /// subscription.
  pub async fn unwatch(&self, topic: &str) {
    let mut subscriptions = self.subscriptions.lock().await;
    let subscription = match subscriptions.get_mut(topic) {
      Some(subscription) => subscription,
      None => return,
    };

    subscription.interest -= 1;
    if subscription.interest > 0 {
      debug!("Interest in {topic} is now {}", subscription.interest);
      return;
    }

    if let Some(subscription) = subscriptions.remove(topic) {
      if let Some(forwarding) = subscription.forwarding {
        forwarding.abort();
        self.transport.unsubscribe(subscription.subscription_id).await;
      }
      info!("Stopped watching {topic}");
    }
  }

  /// Whether at least one relay finished sending its stored comments.
  pub async fn is_loaded(&self, topic: &str) -> bool {
    self
      .subscriptions
      .lock()
      .await
      .get(topic)
      .map(|subscription| subscription.loaded.load(Ordering::SeqCst))
      .unwrap_or(false)
  }

  pub async fn interest(&self, topic: &str) -> usize {
    self
      .subscriptions
      .lock()
      .await
      .get(topic)
      .map(|subscription| subscription.interest)
      .unwrap_or(0)
  }
}

/// Relays are not trusted to honour the filters, so anything outside them
/// is dropped before reaching the store. The store files an event under
/// its first DOI, which has to be the watched one.
async fn forward_events(
  topic: Topic,
  filters: Vec<Filter>,
  mut receiver: UnboundedReceiver<RelayNotification>,
  store: Arc<Mutex<EventStore>>,
  loaded: Arc<AtomicBool>,
) {
  while let Some(notification) = receiver.recv().await {
    match notification {
      RelayNotification::Event { relay_url, event } => {
        let about_topic = event.doi() == Some(topic.as_str());
        if !about_topic || !filters.iter().any(|filter| filter.matches(&event)) {
          warn!(
            "Dropping event {} from {relay_url}: it does not match the {topic} subscription",
            event.id
          );
          continue;
        }

        match store.lock().await.upsert(&event) {
          Ok(outcome) => debug!("{:?} {} from {relay_url}", outcome, event.id),
          Err(err) => warn!("Dropping event {} from {relay_url}: {err}", event.id),
        }
      }
      RelayNotification::EndOfStoredEvents { relay_url } => {
        if !loaded.swap(true, Ordering::SeqCst) {
          info!("Stored comments about {topic} loaded from {relay_url}");
        }
      }
      RelayNotification::Notice { relay_url, message } => {
        debug!("Notice from {relay_url} while watching {topic}: {message}");
      }
    }
  }

  debug!("Stopped forwarding events about {topic}");
}

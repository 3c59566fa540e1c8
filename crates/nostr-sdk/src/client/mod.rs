pub mod communication_with_relay;
pub mod database;

use std::{
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
  },
  time::Duration,
};

use log::{debug, info, warn};
use tokio::{
  sync::Mutex,
  time::{sleep, Instant},
};

use crate::{
  client::database::keys_table::KeysTable,
  comments::{
    self,
    publisher::{PublishCoordinator, PublishOutcome},
    registry::{Observer, SubscriptionHandle, SubscriptionRegistry},
    store::EventStore,
    watcher::RelaySubscriptionManager,
    Comment,
  },
  config::Settings,
  event::PubKey,
  metadata::{MetadataError, MetadataResolver, PaperMetadata},
  relay::{pool::RelayPool, RelayTransport},
  signer::{LocalSigner, Signer},
};

/// [`CommentsClient`] error
#[derive(thiserror::Error, Debug)]
pub enum Error {
  #[error(transparent)]
  Comments(#[from] comments::Error),
  #[error("invalid relay url {0}: {1}")]
  InvalidRelay(String, url::ParseError),
}

/// What the UI talks to: watch the comments about a paper, post new ones.
pub struct CommentsClient {
  store: Arc<Mutex<EventStore>>,
  registry: SubscriptionRegistry,
  manager: Arc<RelaySubscriptionManager>,
  publisher: PublishCoordinator,
  signer: Arc<dyn Signer>,
  metadata: Option<Arc<dyn MetadataResolver>>,
  pool: Option<Arc<RelayPool>>,
}

impl CommentsClient {
  pub fn new(
    transport: Arc<dyn RelayTransport>,
    store: EventStore,
    signer: Arc<dyn Signer>,
  ) -> Self {
    let registry = store.registry().clone();
    let store = Arc::new(Mutex::new(store));

    Self {
      manager: Arc::new(RelaySubscriptionManager::new(
        transport.clone(),
        store.clone(),
      )),
      publisher: PublishCoordinator::new(transport),
      store,
      registry,
      signer,
      metadata: None,
      pool: None,
    }
  }

  /// Opens the stores named in `settings`, loads (or creates) the local
  /// keys and starts connecting to the configured relays.
  ///
  /// Must be called from within a tokio runtime.
  pub async fn connect(settings: &Settings) -> Result<Self, Error> {
    let pool = RelayPool::new(settings.pool_options());
    for relay in &settings.relays {
      pool
        .add_relay(relay)
        .await
        .map_err(|err| Error::InvalidRelay(relay.clone(), err))?;
    }
    info!("Connecting to {} relays", settings.relays.len());

    let store = EventStore::new(&settings.db_name, SubscriptionRegistry::new())?;

    let keys = KeysTable::new(Some(settings.keys_db_name.clone()))
      .and_then(|keys_table| keys_table.get_or_create_client_keys())
      .map_err(comments::Error::from)?;
    let signer = LocalSigner::from_keys(&keys).map_err(comments::Error::from)?;
    debug!("Posting as {}", signer.public_key());

    let pool = Arc::new(pool);
    let mut client = Self::new(pool.clone(), store, Arc::new(signer));
    client.pool = Some(pool);
    Ok(client)
  }

  /// Waits until at least one relay is connected, or `timeout` passed.
  /// Returns how many relays are connected.
  pub async fn wait_for_relays(&self, timeout: Duration) -> usize {
    let pool = match &self.pool {
      Some(pool) => pool,
      None => return 0,
    };

    let deadline = Instant::now() + timeout;
    loop {
      let connected = pool.connected_relays().await;
      if connected > 0 || Instant::now() >= deadline {
        return connected;
      }
      sleep(Duration::from_millis(100)).await;
    }
  }

  /// Closes the relay connections opened by [`CommentsClient::connect`].
  pub async fn disconnect(&self) {
    if let Some(pool) = &self.pool {
      pool.disconnect().await;
    }
  }

  pub fn with_metadata_resolver(mut self, resolver: Arc<dyn MetadataResolver>) -> Self {
    self.metadata = Some(resolver);
    self
  }

  pub fn public_key(&self) -> PubKey {
    self.signer.public_key()
  }

  /// Follows the comments about `topic`.
  ///
  /// `on_update` is called right away with what is already stored, then
  /// with the whole refreshed thread every time it changes, until the
  /// returned [`TopicWatch`] is unsubscribed or dropped.
  pub async fn watch_topic(&self, topic: &str, on_update: Observer) -> Result<TopicWatch, Error> {
    let handle = {
      // mutations notify while holding the store, so nothing slips in
      // between the snapshot and the registration
      let store = self.store.lock().await;
      let snapshot = store.get_by_topic(topic)?;
      let handle = self.registry.register(topic, on_update.clone());
      on_update(&snapshot);
      handle
    };

    self.manager.watch(topic).await;

    Ok(TopicWatch {
      handle,
      manager: self.manager.clone(),
      released: AtomicBool::new(false),
    })
  }

  /// Current thread of `topic`, from the local store only.
  pub async fn thread(&self, topic: &str) -> Result<Vec<Comment>, Error> {
    Ok(self.store.lock().await.get_by_topic(topic)?)
  }

  /// Whether a relay finished sending the stored comments of a watched
  /// topic.
  pub async fn is_loaded(&self, topic: &str) -> bool {
    self.manager.is_loaded(topic).await
  }

  pub async fn post_comment(
    &self,
    topic: &str,
    content: &str,
    parent_id: Option<&str>,
  ) -> Result<PublishOutcome, Error> {
    let outcome = self
      .publisher
      .publish(content, topic, parent_id, self.signer.as_ref())
      .await?;
    Ok(outcome)
  }

  pub async fn paper_metadata(&self, doi: &str) -> Result<PaperMetadata, MetadataError> {
    match &self.metadata {
      Some(resolver) => resolver.resolve_metadata(doi.to_string()).await,
      None => Err(MetadataError::Lookup(String::from(
        "no metadata resolver configured",
      ))),
    }
  }
}

/// A live [`CommentsClient::watch_topic`].
///
/// Dropping it stops the updates as well; the relay subscription is then
/// released in the background.
pub struct TopicWatch {
  handle: SubscriptionHandle,
  manager: Arc<RelaySubscriptionManager>,
  released: AtomicBool,
}

impl TopicWatch {
  pub fn topic(&self) -> &str {
    self.handle.topic()
  }

  pub async fn unsubscribe(self) {
    self.released.store(true, Ordering::SeqCst);
    self.handle.unsubscribe();
    self.manager.unwatch(self.handle.topic()).await;
  }
}

impl Drop for TopicWatch {
  fn drop(&mut self) {
    if self.released.swap(true, Ordering::SeqCst) {
      return;
    }

    self.handle.unsubscribe();
    let topic = self.handle.topic().to_string();
    match tokio::runtime::Handle::try_current() {
      Ok(runtime) => {
        let manager = self.manager.clone();
        runtime.spawn(async move { manager.unwatch(&topic).await });
      }
      Err(_) => warn!("No runtime to release the relay subscription of {topic}"),
    }
  }
}

#[cfg(test)]
mod tests {
  use std::{sync::Mutex as StdMutex, time::Duration};

  use super::*;
  use crate::{
    comments::tests::{comment_event, MockTransport, TempDb, SECKEY},
    relay::{RelayAck, RelayNotification},
  };

  #[cfg(test)]
  use pretty_assertions::assert_eq;

  const TOPIC: &str = "10.1/abc";
  const RELAY: &str = "wss://potato.relay";

  struct Sut {
    client: CommentsClient,
    transport: Arc<MockTransport>,
    updates: Arc<StdMutex<Vec<Vec<Comment>>>>,
    _db: TempDb,
  }

  impl Sut {
    fn new(name: &str, transport: MockTransport) -> Self {
      let db = TempDb::new(name);
      let store = EventStore::new(name, SubscriptionRegistry::new()).unwrap();
      let transport = Arc::new(transport);
      let signer = Arc::new(LocalSigner::new(SECKEY.to_vec()).unwrap());

      Self {
        client: CommentsClient::new(transport.clone(), store, signer),
        transport,
        updates: Arc::new(StdMutex::new(vec![])),
        _db: db,
      }
    }

    fn observer(&self) -> Observer {
      let updates = self.updates.clone();
      Arc::new(move |thread: &[Comment]| updates.lock().unwrap().push(thread.to_vec()))
    }

    fn updates(&self) -> usize {
      self.updates.lock().unwrap().len()
    }

    async fn wait_for_updates(&self, expected: usize) {
      for _ in 0..100 {
        if self.updates() >= expected {
          return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
      }
      panic!("expected {expected} updates");
    }

    fn deliver(&self, content: &str, created_at: u64, parent: Option<&str>) -> String {
      let event = comment_event(TOPIC, content, created_at, parent);
      let id = event.id.clone();
      self.transport.deliver(RelayNotification::Event {
        relay_url: RELAY.to_string(),
        event,
      });
      id
    }
  }

  #[tokio::test]
  async fn watching_delivers_the_stored_thread_first() {
    let sut = Sut::new("client_snapshot", MockTransport::default());
    sut
      .client
      .store
      .lock()
      .await
      .upsert(&comment_event(TOPIC, "already here", 10, None))
      .unwrap();

    let _watch = sut.client.watch_topic(TOPIC, sut.observer()).await.unwrap();

    let updates = sut.updates.lock().unwrap().clone();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0][0].content, "already here");
  }

  #[tokio::test]
  async fn inbound_comments_refresh_the_thread() {
    let sut = Sut::new("client_live", MockTransport::default());
    let _watch = sut.client.watch_topic(TOPIC, sut.observer()).await.unwrap();

    let root = sut.deliver("root", 10, None);
    sut.deliver("reply", 20, Some(&root));
    sut.wait_for_updates(3).await;

    let thread = sut.updates.lock().unwrap()[2].clone();
    assert_eq!(thread.len(), 1);
    assert_eq!(thread[0].replies[0].content, "reply");
    assert_eq!(sut.client.thread(TOPIC).await.unwrap(), thread);
  }

  #[tokio::test]
  async fn unsubscribing_releases_the_observer_and_the_relays() {
    let sut = Sut::new("client_unsubscribe", MockTransport::default());
    let watch = sut.client.watch_topic(TOPIC, sut.observer()).await.unwrap();
    assert_eq!(watch.topic(), TOPIC);

    watch.unsubscribe().await;

    assert_eq!(sut.client.registry.observer_count(TOPIC), 0);
    assert_eq!(sut.client.manager.interest(TOPIC).await, 0);
    assert_eq!(sut.transport.closed.lock().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn dropping_the_watch_releases_it_too() {
    let sut = Sut::new("client_drop", MockTransport::default());
    let watch = sut.client.watch_topic(TOPIC, sut.observer()).await.unwrap();

    drop(watch);

    assert_eq!(sut.client.registry.observer_count(TOPIC), 0);
    for _ in 0..100 {
      if sut.client.manager.interest(TOPIC).await == 0 {
        return;
      }
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("relay interest was not released");
  }

  #[tokio::test]
  async fn two_watchers_share_one_relay_subscription() {
    let sut = Sut::new("client_shared", MockTransport::default());
    let first = sut.client.watch_topic(TOPIC, sut.observer()).await.unwrap();
    let _second = sut.client.watch_topic(TOPIC, sut.observer()).await.unwrap();

    assert_eq!(sut.transport.subscription_ids().len(), 1);

    first.unsubscribe().await;
    assert!(sut.transport.closed.lock().unwrap().is_empty());
    assert_eq!(sut.client.registry.observer_count(TOPIC), 1);
  }

  #[tokio::test]
  async fn posting_does_not_touch_the_local_thread() {
    let sut = Sut::new(
      "client_post",
      MockTransport::with_acks(vec![RelayAck::accepted(RELAY, "")]),
    );

    let outcome = sut
      .client
      .post_comment(TOPIC, "hello", None)
      .await
      .unwrap();

    assert_eq!(outcome.event.pubkey, sut.client.public_key());
    assert!(sut.client.thread(TOPIC).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn metadata_needs_a_resolver() {
    let sut = Sut::new("client_metadata", MockTransport::default());

    assert!(matches!(
      sut.client.paper_metadata(TOPIC).await,
      Err(MetadataError::Lookup(_))
    ));
  }
}

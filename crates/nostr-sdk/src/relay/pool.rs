use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::{
  collections::{HashMap, HashSet},
  sync::Arc,
  time::Duration,
};

use futures_util::{future::BoxFuture, FutureExt, SinkExt, StreamExt};
use log::{debug, error, info, warn};
use tokio::net::TcpStream;
use tokio::sync::{
  mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
  Mutex, MutexGuard,
};
use tokio::time::{sleep, timeout_at, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::{
  client::communication_with_relay::{
    close::ClientToRelayCommClose, event::ClientToRelayCommEvent,
    request::ClientToRelayCommRequest,
  },
  event::Event,
  filter::Filter,
  message::NostrMessage,
  relay::communication_with_client::{
    eose::RelayToClientCommEose, event::RelayToClientCommEvent, notice::RelayToClientCommNotice,
    ok::RelayToClientCommOk,
  },
};

use super::{Error, RelayAck, RelayNotification, RelayTransport};

#[derive(Debug)]
pub enum RelayPoolMessage {
  /// Relay sent something to this client
  ReceivedMsg { relay_url: String, msg: Message },
  /// A (re)connection to the relay succeeded
  Connected { relay_url: String },
}

type PoolTaskSender = UnboundedSender<RelayPoolMessage>;
type Relays = Arc<Mutex<HashMap<String, RelayData>>>;
type Subscriptions = Arc<Mutex<HashMap<String, SubscriptionData>>>;
/// Publishes waiting for `OK`s, by event id and then by publish call: the
/// same event may be in flight more than once.
type PendingOks = Arc<Mutex<HashMap<String, HashMap<u64, UnboundedSender<RelayAck>>>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayPoolOptions {
  /// Wait between a dropped connection and the next attempt.
  pub reconnect_delay: Duration,
  /// How long `publish` waits for `OK` answers.
  pub publish_timeout: Duration,
  /// Drop inbound events whose id or signature do not check out.
  pub verify_events: bool,
}

impl Default for RelayPoolOptions {
  fn default() -> Self {
    Self {
      reconnect_delay: Duration::from_secs(5),
      publish_timeout: Duration::from_secs(10),
      verify_events: true,
    }
  }
}

#[derive(Debug, Clone)]
struct SubscriptionData {
  filters: Vec<Filter>,
  sender: UnboundedSender<RelayNotification>,
}

impl SubscriptionData {
  fn request(&self, subscription_id: &str) -> Message {
    let request =
      ClientToRelayCommRequest::new_request(subscription_id.to_string(), self.filters.clone());
    Message::from(request.as_json())
  }
}

#[derive(Debug, Clone)]
pub struct RelayData {
  /// Url to connect to this relay.
  url: String,
  /// Tx used to send all messages received from this relay to the pool.
  pool_task_sender: PoolTaskSender,
  /// Tx part of the channel to send messages (by this client) to this relay.
  relay_tx: UnboundedSender<Message>,
  /// Rx part of the channel to send messages (by this client) to this relay.
  relay_rx: Arc<Mutex<UnboundedReceiver<Message>>>,
  /// Flag to signal if the connection must be closed
  close_communication: Arc<AtomicBool>,
  /// Flag to signal if the relay is currently connected
  is_connected: Arc<AtomicBool>,
}

impl RelayData {
  fn new(url: String, pool_task_sender: PoolTaskSender) -> Self {
    let (relay_tx, relay_rx) = unbounded_channel();

    Self {
      url,
      pool_task_sender,
      relay_tx,
      relay_rx: Arc::new(Mutex::new(relay_rx)),
      close_communication: Arc::new(AtomicBool::new(false)),
      is_connected: Arc::new(AtomicBool::new(false)),
    }
  }

  pub fn url(&self) -> &str {
    &self.url
  }

  pub fn is_connected(&self) -> bool {
    self.is_connected.load(Ordering::Relaxed)
  }

  /// Keeps a connection to the relay until [`RelayData::disconnect`] is
  /// called, reconnecting after `reconnect_delay` whenever it drops.
  async fn run(self, reconnect_delay: Duration) {
    while !self.close_communication.load(Ordering::Relaxed) {
      debug!("❯ Connecting to {}", self.url);

      match connect_async(self.url.clone()).await {
        Ok((ws_stream, _)) => {
          info!("❯ Connected to {}", self.url);
          self.is_connected.store(true, Ordering::Relaxed);
          let _ = self.pool_task_sender.send(RelayPoolMessage::Connected {
            relay_url: self.url.clone(),
          });

          self.exchange_messages(ws_stream).await;

          self.is_connected.store(false, Ordering::Relaxed);
          info!("❯ Connection to {} closed", self.url);
        }
        Err(err) => {
          error!("Impossible to connect to {}: {}", self.url, err);
        }
      }

      if self.close_communication.load(Ordering::Relaxed) {
        break;
      }
      sleep(reconnect_delay).await;
    }

    debug!("❯ Exited from relay task of {}", self.url);
  }

  /// Forwards whatever the relay sends to the pool and whatever this client
  /// queued to the relay, until either side goes away.
  async fn exchange_messages(&self, ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>) {
    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let mut relay_rx = self.relay_rx.lock().await;

    loop {
      tokio::select! {
        received = ws_rx.next() => match received {
          Some(Ok(msg)) if msg.is_text() => {
            let forwarded = self.pool_task_sender.send(RelayPoolMessage::ReceivedMsg {
              relay_url: self.url.clone(),
              msg,
            });
            if forwarded.is_err() {
              break;
            }
          }
          Some(Ok(msg)) if msg.is_close() => break,
          Some(Ok(_)) => {}
          Some(Err(err)) => {
            warn!("Error reading from {}: {}", self.url, err);
            break;
          }
          None => break,
        },
        outgoing = relay_rx.recv() => match outgoing {
          Some(msg) => {
            if self.close_communication.load(Ordering::Relaxed) {
              break;
            }
            if let Err(err) = ws_tx.send(msg).await {
              warn!("Error writing to {}: {}", self.url, err);
              break;
            }
          }
          None => break,
        },
      }
    }

    let _ = ws_tx.close().await;
  }

  fn disconnect(&self) {
    debug!("❯ Disconnecting from {}", self.url);
    self.close_communication.store(true, Ordering::Relaxed);
    self.is_connected.store(false, Ordering::Relaxed);
    // wakes the connection loop up so it notices the flag
    let _ = self.relay_tx.send(Message::Close(None));
  }

  fn send_message(&self, message: Message) -> Result<(), Error> {
    self
      .relay_tx
      .send(message)
      .map_err(|_| Error::ChannelClosed(self.url.clone()))
  }
}

/// The set of relays this client talks to.
///
/// Every relay gets its own connection task; everything relays send goes
/// through a single pool task which routes it to the right subscription
/// (or pending publish).
#[derive(Debug)]
pub struct RelayPool {
  relays: Relays,
  subscriptions: Subscriptions,
  pending_oks: PendingOks,
  next_publish: AtomicU64,
  pool_task_sender: PoolTaskSender,
  options: RelayPoolOptions,
}

impl Default for RelayPool {
  fn default() -> Self {
    Self::new(RelayPoolOptions::default())
  }
}

impl RelayPool {
  /// Must be called from within a tokio runtime: it spawns the pool task.
  pub fn new(options: RelayPoolOptions) -> Self {
    let (pool_task_sender, pool_task_receiver) = unbounded_channel();

    let relays: Relays = Arc::new(Mutex::new(HashMap::new()));
    let subscriptions: Subscriptions = Arc::new(Mutex::new(HashMap::new()));
    let pending_oks: PendingOks = Arc::new(Mutex::new(HashMap::new()));

    let relay_pool_task = RelayPoolTask {
      receiver: pool_task_receiver,
      relays: relays.clone(),
      subscriptions: subscriptions.clone(),
      pending_oks: pending_oks.clone(),
      verify_events: options.verify_events,
    };
    tokio::spawn(relay_pool_task.run());

    Self {
      relays,
      subscriptions,
      pending_oks,
      next_publish: AtomicU64::new(0),
      pool_task_sender,
      options,
    }
  }

  /// Gets a `read` version of the HashMap of relays.
  pub async fn relays(&self) -> HashMap<String, RelayData> {
    let relays = self.relays.lock().await;
    relays.clone()
  }

  /// Gets a `mutable` version of the HashMap of relays.
  pub async fn relays_mut(&self) -> MutexGuard<'_, HashMap<String, RelayData>> {
    self.relays.lock().await
  }

  /// Adds a relay to the pool and starts its connection task,
  /// unless the relay is already there.
  pub async fn add_relay(&self, url: &str) -> Result<(), url::ParseError> {
    Url::parse(url)?;

    let mut relays = self.relays_mut().await;
    if !relays.contains_key(url) {
      let relay = RelayData::new(url.to_string(), self.pool_task_sender.clone());
      relays.insert(url.to_string(), relay.clone());
      tokio::spawn(relay.run(self.options.reconnect_delay));
    }

    Ok(())
  }

  /// Removes from the pool and disconnects from the relay.
  pub async fn remove_relay(&self, url: &str) {
    if let Some(relay) = self.relays_mut().await.remove(url) {
      relay.disconnect();
    }
  }

  pub async fn connected_relays(&self) -> usize {
    self
      .relays
      .lock()
      .await
      .values()
      .filter(|relay| relay.is_connected())
      .count()
  }

  /// Disconnects from every relay (they stay in the pool).
  pub async fn disconnect(&self) {
    for relay in self.relays().await.values() {
      relay.disconnect();
    }
  }
}

impl Drop for RelayPool {
  fn drop(&mut self) {
    if let Ok(relays) = self.relays.try_lock() {
      for relay in relays.values() {
        relay.disconnect();
      }
    }
  }
}

impl RelayTransport for RelayPool {
  fn subscribe(
    &self,
    subscription_id: String,
    filters: Vec<Filter>,
  ) -> BoxFuture<'_, Result<UnboundedReceiver<RelayNotification>, Error>> {
    async move {
      let relays = self.relays().await;
      if relays.is_empty() {
        return Err(Error::NoRelays);
      }

      let (sender, receiver) = unbounded_channel();
      let subscription = SubscriptionData { filters, sender };
      let request = subscription.request(&subscription_id);
      self
        .subscriptions
        .lock()
        .await
        .insert(subscription_id.clone(), subscription);

      debug!("SUBSCRIBING {subscription_id} on {} relays", relays.len());

      // relays not connected yet get the request once they connect
      for relay in relays.values().filter(|relay| relay.is_connected()) {
        if let Err(err) = relay.send_message(request.clone()) {
          warn!("{err}");
        }
      }

      Ok(receiver)
    }
    .boxed()
  }

  fn unsubscribe(&self, subscription_id: String) -> BoxFuture<'_, ()> {
    async move {
      let removed = self.subscriptions.lock().await.remove(&subscription_id);
      if removed.is_none() {
        return;
      }

      debug!("UNSUBSCRIBING {subscription_id}");
      let close = Message::from(ClientToRelayCommClose::new_close(subscription_id).as_json());
      let relays = self.relays().await;
      for relay in relays.values().filter(|relay| relay.is_connected()) {
        let _ = relay.send_message(close.clone());
      }
    }
    .boxed()
  }

  fn publish(&self, event: Event) -> BoxFuture<'_, Vec<RelayAck>> {
    async move {
      let relays = self.relays().await;
      let (ack_sender, mut ack_receiver) = unbounded_channel();
      let publish_id = self.next_publish.fetch_add(1, Ordering::Relaxed);
      self
        .pending_oks
        .lock()
        .await
        .entry(event.id.clone())
        .or_default()
        .insert(publish_id, ack_sender);

      let message = Message::from(ClientToRelayCommEvent::new_event(event.clone()).as_json());
      let mut acks: Vec<RelayAck> = vec![];
      let mut waiting: HashSet<String> = HashSet::new();

      for relay in relays.values() {
        if !relay.is_connected() {
          acks.push(RelayAck::rejected(relay.url(), "not connected"));
          continue;
        }

        match relay.send_message(message.clone()) {
          Ok(()) => {
            waiting.insert(relay.url().to_string());
          }
          Err(err) => acks.push(RelayAck::rejected(relay.url(), &err.to_string())),
        }
      }

      let deadline = Instant::now() + self.options.publish_timeout;
      while !waiting.is_empty() {
        match timeout_at(deadline, ack_receiver.recv()).await {
          Ok(Some(ack)) => {
            if waiting.remove(&ack.relay_url) {
              acks.push(ack);
            }
          }
          Ok(None) | Err(_) => break,
        }
      }

      {
        let mut pending_oks = self.pending_oks.lock().await;
        if let Some(publishes) = pending_oks.get_mut(&event.id) {
          publishes.remove(&publish_id);
          if publishes.is_empty() {
            pending_oks.remove(&event.id);
          }
        }
      }

      for relay_url in waiting {
        acks.push(RelayAck::rejected(&relay_url, "timed out waiting for OK"));
      }
      acks.sort_by(|ack1, ack2| ack1.relay_url.cmp(&ack2.relay_url));

      debug!(
        "PUBLISHED {}: {} of {} relays accepted",
        event.id,
        acks.iter().filter(|ack| ack.accepted).count(),
        acks.len()
      );
      acks
    }
    .boxed()
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ParsedMessage {
  Eose(RelayToClientCommEose),
  Event(RelayToClientCommEvent),
  Notice(RelayToClientCommNotice),
  Ok(RelayToClientCommOk),
  NoOp,
}

#[derive(Debug)]
struct RelayPoolTask {
  receiver: UnboundedReceiver<RelayPoolMessage>,
  relays: Relays,
  subscriptions: Subscriptions,
  pending_oks: PendingOks,
  verify_events: bool,
}

impl RelayPoolTask {
  /// Helper to parse the message into EOSE, EVENT, NOTICE or OK.
  ///
  fn parse_message_received_from_relay(&self, msg: &str, relay_url: &str) -> ParsedMessage {
    if let Ok(eose_msg) = RelayToClientCommEose::from_json(msg) {
      debug!("EOSE from {relay_url}: {:?}", eose_msg);
      return ParsedMessage::Eose(eose_msg);
    }

    if let Ok(event_msg) = RelayToClientCommEvent::from_json(msg) {
      debug!("EVENT from {relay_url}: {:?}", event_msg);

      if self.verify_events
        && !(event_msg.event.check_event_id() && event_msg.event.check_event_signature())
      {
        error!("Received an event from {relay_url}, but its id or signature is not valid!");
        debug!("Event with error: {:?}", event_msg.event);
        return ParsedMessage::NoOp;
      }

      return ParsedMessage::Event(event_msg);
    }

    if let Ok(notice_msg) = RelayToClientCommNotice::from_json(msg) {
      info!("NOTICE from {relay_url}: {}", notice_msg.message);
      return ParsedMessage::Notice(notice_msg);
    }

    if let Ok(ok_msg) = RelayToClientCommOk::from_json(msg) {
      debug!("OK from {relay_url}: {:?}", ok_msg);
      return ParsedMessage::Ok(ok_msg);
    }

    debug!("NO-OP from {relay_url}: {:?}", msg);
    ParsedMessage::NoOp
  }

  async fn route(&self, parsed: ParsedMessage, relay_url: String) {
    match parsed {
      ParsedMessage::Event(event_msg) => {
        let notification = RelayNotification::Event {
          relay_url,
          event: event_msg.event,
        };
        self
          .forward(&event_msg.subscription_id, notification)
          .await;
      }
      ParsedMessage::Eose(eose_msg) => {
        let notification = RelayNotification::EndOfStoredEvents { relay_url };
        self.forward(&eose_msg.subscription_id, notification).await;
      }
      ParsedMessage::Notice(notice_msg) => {
        // notices are not tied to a subscription
        let subscriptions = self.subscriptions.lock().await;
        for subscription in subscriptions.values() {
          let _ = subscription.sender.send(RelayNotification::Notice {
            relay_url: relay_url.clone(),
            message: notice_msg.message.clone(),
          });
        }
      }
      ParsedMessage::Ok(ok_msg) => {
        let pending_oks = self.pending_oks.lock().await;
        match pending_oks.get(&ok_msg.event_id) {
          Some(publishes) => {
            for sender in publishes.values() {
              let _ = sender.send(RelayAck {
                relay_url: relay_url.clone(),
                accepted: ok_msg.accepted,
                message: ok_msg.message.clone(),
              });
            }
          }
          None => debug!("OK from {relay_url} for an event not being published"),
        }
      }
      ParsedMessage::NoOp => {}
    }
  }

  async fn forward(&self, subscription_id: &str, notification: RelayNotification) {
    let subscriptions = self.subscriptions.lock().await;
    match subscriptions.get(subscription_id) {
      Some(subscription) => {
        if subscription.sender.send(notification).is_err() {
          debug!("Nobody is listening to subscription {subscription_id} anymore");
        }
      }
      None => debug!("Message for unknown subscription {subscription_id}"),
    }
  }

  /// Sends every live `REQ` to a relay that just (re)connected.
  async fn resend_subscriptions(&self, relay_url: &str) {
    let relays = self.relays.lock().await;
    let relay = match relays.get(relay_url) {
      Some(relay) => relay,
      None => return,
    };

    let subscriptions = self.subscriptions.lock().await;
    for (subscription_id, subscription) in subscriptions.iter() {
      if let Err(err) = relay.send_message(subscription.request(subscription_id)) {
        warn!("{err}");
      }
    }
  }

  /// This is responsible for listening (via `receiver`)
  /// for any messages sent to the relay pool via `pool_task_sender`.
  async fn run(mut self) {
    debug!("RelayPool Thread Started");
    while let Some(msg) = self.receiver.recv().await {
      match msg {
        RelayPoolMessage::ReceivedMsg { relay_url, msg } => match msg.to_text() {
          Ok(text) => {
            let parsed = self.parse_message_received_from_relay(text, &relay_url);
            self.route(parsed, relay_url).await;
          }
          Err(err) => debug!("Non text message from {relay_url}: {err}"),
        },
        RelayPoolMessage::Connected { relay_url } => self.resend_subscriptions(&relay_url).await,
      }
    }
    debug!("RelayPool Thread Ended");
  }
}

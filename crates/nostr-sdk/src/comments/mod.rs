//! Threaded comments about papers, keyed by DOI.
//!
//! Events come in from relays through the [`watcher::RelaySubscriptionManager`],
//! are kept in the [`store::EventStore`] and handed out as threads built by
//! [`thread::reconstruct`] to whoever registered with the
//! [`registry::SubscriptionRegistry`]. Outgoing comments go through the
//! [`publisher::PublishCoordinator`].

pub mod publisher;
pub mod registry;
pub mod store;
pub mod thread;
pub mod watcher;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::{
  event::{Event, PubKey, Timestamp},
  relay::{self, RelayAck},
  signer::SigningDenied,
};

/// The DOI comments are attached to.
pub type Topic = String;

/// [`comments`] error
#[derive(thiserror::Error, Debug)]
pub enum Error {
  #[error("event {0} has no doi tag")]
  MalformedEvent(String),
  #[error(transparent)]
  TransportFailure(#[from] relay::Error),
  #[error("no relay accepted the event")]
  PublishFailure(Vec<RelayAck>),
  #[error(transparent)]
  StorageFailure(#[from] redb::Error),
  #[error(transparent)]
  SigningDenied(#[from] SigningDenied),
  /// A stored comment could not be decoded
  #[error(transparent)]
  Json(#[from] serde_json::Error),
}

#[cfg(not(test))]
fn get_time_now() -> SystemTime {
  SystemTime::now()
}

#[allow(dead_code)]
const SECONDS_AFTER_UNIX_EPOCH_FOR_TIME_NOW_CONFIG_TEST: u64 = 20u64;
#[cfg(test)]
fn get_time_now() -> SystemTime {
  UNIX_EPOCH + Duration::new(SECONDS_AFTER_UNIX_EPOCH_FOR_TIME_NOW_CONFIG_TEST, 0)
}

pub(crate) fn timestamp_in_seconds() -> Timestamp {
  get_time_now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or(Duration::ZERO)
    .as_secs()
}

/// A stored comment: an event about a paper plus what we derived from it.
///
/// `replies` is only filled on top level comments of a thread; the store
/// itself is flat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
  pub id: String,
  pub topic: Topic,
  pub parent_id: Option<String>,
  pub author: PubKey,
  pub content: String,
  pub created_at: Timestamp,
  pub signature: String,
  /// When this client first saw the event.
  pub received_at: Timestamp,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub replies: Vec<Comment>,
}

impl Comment {
  pub fn from_event(event: &Event, received_at: Timestamp) -> Result<Self, Error> {
    let topic = event
      .doi()
      .ok_or_else(|| Error::MalformedEvent(event.id.clone()))?;

    Ok(Self {
      id: event.id.clone(),
      topic: topic.to_string(),
      parent_id: event.reply_to().map(str::to_string),
      author: event.pubkey.clone(),
      content: event.content.clone(),
      created_at: event.created_at,
      signature: event.sig.clone(),
      received_at,
      replies: vec![],
    })
  }

  pub fn is_top_level(&self) -> bool {
    self.parent_id.is_none()
  }

  /// Same event as `other`, ignoring local bookkeeping.
  fn same_event(&self, other: &Comment) -> bool {
    self.id == other.id
      && self.topic == other.topic
      && self.parent_id == other.parent_id
      && self.author == other.author
      && self.content == other.content
      && self.created_at == other.created_at
      && self.signature == other.signature
  }
}

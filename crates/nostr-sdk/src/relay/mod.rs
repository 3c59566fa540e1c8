//! Talking to relays.
//!
//! [`RelayTransport`] is the narrow capability the comment machinery needs;
//! [`pool::RelayPool`] implements it over websockets.

pub mod communication_with_client;
pub mod pool;

use futures_util::future::BoxFuture;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::{event::Event, filter::Filter};

/// [`RelayTransport`] error
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
  #[error("no relays configured")]
  NoRelays,
  #[error("channel to {0} is closed")]
  ChannelClosed(String),
}

/// Something a relay sent for one of our subscriptions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayNotification {
  Event { relay_url: String, event: Event },
  EndOfStoredEvents { relay_url: String },
  Notice { relay_url: String, message: String },
}

/// Outcome of publishing one event to one relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayAck {
  pub relay_url: String,
  pub accepted: bool,
  pub message: String,
}

impl RelayAck {
  pub fn accepted(relay_url: &str, message: &str) -> Self {
    Self {
      relay_url: relay_url.to_string(),
      accepted: true,
      message: message.to_string(),
    }
  }

  pub fn rejected(relay_url: &str, message: &str) -> Self {
    Self {
      relay_url: relay_url.to_string(),
      accepted: false,
      message: message.to_string(),
    }
  }
}

pub trait RelayTransport: Send + Sync {
  /// Opens `subscription_id` on every relay. Notifications for it arrive on
  /// the returned receiver until [`RelayTransport::unsubscribe`] is called.
  fn subscribe(
    &self,
    subscription_id: String,
    filters: Vec<Filter>,
  ) -> BoxFuture<'_, Result<UnboundedReceiver<RelayNotification>, Error>>;

  fn unsubscribe(&self, subscription_id: String) -> BoxFuture<'_, ()>;

  /// Sends `event` to every relay and collects one ack per relay.
  fn publish(&self, event: Event) -> BoxFuture<'_, Vec<RelayAck>>;
}

use serde_json::{json, Value};

use crate::{
  event::Event,
  message::{decode, impl_serde_as_message, Error, NostrMessage},
};

/// An event the relay sends for one of our subscriptions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayToClientCommEvent {
  pub subscription_id: String,
  pub event: Event,
}

impl RelayToClientCommEvent {
  pub fn new_event(subscription_id: String, event: Event) -> Self {
    Self {
      subscription_id,
      event,
    }
  }
}

impl NostrMessage for RelayToClientCommEvent {
  const CODE: &'static str = "EVENT";

  fn elements(&self) -> Vec<Value> {
    vec![json!(self.subscription_id), json!(self.event)]
  }

  fn from_elements(elements: &[Value]) -> Result<Self, Error> {
    match elements {
      [subscription_id, event] => Ok(Self::new_event(decode(subscription_id)?, decode(event)?)),
      _ => Err(Error::InvalidData),
    }
  }
}

impl_serde_as_message!(RelayToClientCommEvent);

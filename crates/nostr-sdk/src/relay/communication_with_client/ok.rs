use serde_json::{json, Value};

use crate::message::{decode, impl_serde_as_message, Error, NostrMessage};

/// Relay's answer to an `EVENT` published by the client.
///
/// `["OK", <event_id>, <true|false>, <message>]`
///
/// Some relays omit the message, so a three element form is accepted too.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayToClientCommOk {
  pub event_id: String,
  pub accepted: bool,
  pub message: String,
}

impl RelayToClientCommOk {
  pub fn new_ok(event_id: String, accepted: bool, message: String) -> Self {
    Self {
      event_id,
      accepted,
      message,
    }
  }
}

impl NostrMessage for RelayToClientCommOk {
  const CODE: &'static str = "OK";

  fn elements(&self) -> Vec<Value> {
    vec![
      json!(self.event_id),
      json!(self.accepted),
      json!(self.message),
    ]
  }

  fn from_elements(elements: &[Value]) -> Result<Self, Error> {
    match elements {
      [event_id, accepted] => Ok(Self::new_ok(
        decode(event_id)?,
        decode(accepted)?,
        String::new(),
      )),
      [event_id, accepted, message] => Ok(Self::new_ok(
        decode(event_id)?,
        decode(accepted)?,
        decode(message)?,
      )),
      _ => Err(Error::InvalidData),
    }
  }
}

impl_serde_as_message!(RelayToClientCommOk);

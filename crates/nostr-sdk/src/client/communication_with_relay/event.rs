use serde_json::{json, Value};

use crate::{
  event::Event,
  message::{decode, impl_serde_as_message, Error, NostrMessage},
};

/// Publishes an event to a relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientToRelayCommEvent {
  pub event: Event,
}

impl ClientToRelayCommEvent {
  pub fn new_event(event: Event) -> Self {
    Self { event }
  }
}

impl NostrMessage for ClientToRelayCommEvent {
  const CODE: &'static str = "EVENT";

  fn elements(&self) -> Vec<Value> {
    vec![json!(self.event)]
  }

  fn from_elements(elements: &[Value]) -> Result<Self, Error> {
    match elements {
      [event] => Ok(Self::new_event(decode(event)?)),
      _ => Err(Error::InvalidData),
    }
  }
}

impl_serde_as_message!(ClientToRelayCommEvent);

#[cfg(test)]
mod tests {
  use super::*;
  use crate::event::tests::signed_event;

  #[cfg(test)]
  use pretty_assertions::assert_eq;

  #[test]
  fn serializes_as_a_two_element_array() {
    let message = ClientToRelayCommEvent::new_event(signed_event());
    let expected = json!(["EVENT", signed_event()]).to_string();

    assert_eq!(message.as_json(), expected);
  }

  #[test]
  fn deserializes_what_it_serializes() {
    let message = ClientToRelayCommEvent::new_event(signed_event());
    let parsed: ClientToRelayCommEvent = serde_json::from_str(&message.as_json()).unwrap();

    assert_eq!(parsed, message);
  }

  #[test]
  fn rejects_other_messages() {
    assert!(ClientToRelayCommEvent::from_json("").is_err());
    assert!(ClientToRelayCommEvent::from_json(r#"["EVENT"]"#).is_err());
    assert!(ClientToRelayCommEvent::from_json(&json!(["REQ", signed_event()]).to_string()).is_err());
    assert!(ClientToRelayCommEvent::from_json(r#"["EVENT", "sub", {}]"#).is_err());
  }
}

use serde_json::Value;

use crate::message::{decode, impl_serde_as_message, Error, NostrMessage};

/// Stops a subscription previously opened with a `REQ`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientToRelayCommClose {
  pub subscription_id: String,
}

impl ClientToRelayCommClose {
  pub fn new_close(subscription_id: String) -> Self {
    Self { subscription_id }
  }
}

impl NostrMessage for ClientToRelayCommClose {
  const CODE: &'static str = "CLOSE";

  fn elements(&self) -> Vec<Value> {
    vec![Value::from(self.subscription_id.as_str())]
  }

  fn from_elements(elements: &[Value]) -> Result<Self, Error> {
    match elements {
      [subscription_id] => Ok(Self::new_close(decode(subscription_id)?)),
      _ => Err(Error::InvalidData),
    }
  }
}

impl_serde_as_message!(ClientToRelayCommClose);

#[cfg(test)]
mod tests {
  use super::*;

  #[cfg(test)]
  use pretty_assertions::assert_eq;

  #[test]
  fn close_names_the_subscription() {
    let close = ClientToRelayCommClose::new_close(String::from("potato"));

    assert_eq!(close.as_json(), r#"["CLOSE","potato"]"#);
    assert_eq!(
      ClientToRelayCommClose::from_json(r#"["CLOSE","potato"]"#).unwrap(),
      close
    );
  }

  #[test]
  fn incomplete_close_is_refused() {
    assert!(ClientToRelayCommClose::from_json(r#"["",""]"#).is_err());
    assert!(ClientToRelayCommClose::from_json(r#"["CLOSE"]"#).is_err());
    assert!(ClientToRelayCommClose::from_json("[]").is_err());
  }
}

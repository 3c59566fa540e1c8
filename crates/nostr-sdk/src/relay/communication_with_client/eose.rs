use serde_json::Value;

use crate::message::{decode, impl_serde_as_message, Error, NostrMessage};

/// Marks the end of the stored events of a subscription: whatever comes
/// next is live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayToClientCommEose {
  pub subscription_id: String,
}

impl RelayToClientCommEose {
  pub fn new_eose(subscription_id: String) -> Self {
    Self { subscription_id }
  }
}

impl NostrMessage for RelayToClientCommEose {
  const CODE: &'static str = "EOSE";

  fn elements(&self) -> Vec<Value> {
    vec![Value::from(self.subscription_id.as_str())]
  }

  fn from_elements(elements: &[Value]) -> Result<Self, Error> {
    match elements {
      [subscription_id] => Ok(Self::new_eose(decode(subscription_id)?)),
      _ => Err(Error::InvalidData),
    }
  }
}

impl_serde_as_message!(RelayToClientCommEose);

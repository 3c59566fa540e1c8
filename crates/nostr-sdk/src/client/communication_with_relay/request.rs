use serde_json::{json, Value};

use crate::{
  filter::Filter,
  message::{decode, impl_serde_as_message, Error, NostrMessage},
};

/// Requests stored events and subscribes to new ones.
///
/// `["REQ", <subscription_id>, <filter JSON>, <filter JSON>...]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientToRelayCommRequest {
  pub subscription_id: String,
  pub filters: Vec<Filter>,
}

impl ClientToRelayCommRequest {
  pub fn new_request(subscription_id: String, filters: Vec<Filter>) -> Self {
    Self {
      subscription_id,
      filters,
    }
  }
}

impl NostrMessage for ClientToRelayCommRequest {
  const CODE: &'static str = "REQ";

  fn elements(&self) -> Vec<Value> {
    let mut elements = vec![json!(self.subscription_id)];
    elements.extend(self.filters.iter().map(|filter| json!(filter)));
    elements
  }

  fn from_elements(elements: &[Value]) -> Result<Self, Error> {
    match elements {
      [subscription_id, filters @ ..] if !filters.is_empty() => {
        let filters = filters
          .iter()
          .map(decode)
          .collect::<Result<Vec<Filter>, Error>>()?;
        Ok(Self::new_request(decode(subscription_id)?, filters))
      }
      _ => Err(Error::InvalidData),
    }
  }
}

impl_serde_as_message!(ClientToRelayCommRequest);

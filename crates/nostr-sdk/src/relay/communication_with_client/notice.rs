use serde_json::Value;

use crate::message::{decode, impl_serde_as_message, Error, NostrMessage};

/// Free form message from a relay (rate limits, errors, ...). Nothing is
/// expected from the client in return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayToClientCommNotice {
  pub message: String,
}

impl RelayToClientCommNotice {
  pub fn new_notice(message: String) -> Self {
    Self { message }
  }
}

impl NostrMessage for RelayToClientCommNotice {
  const CODE: &'static str = "NOTICE";

  fn elements(&self) -> Vec<Value> {
    vec![Value::from(self.message.as_str())]
  }

  fn from_elements(elements: &[Value]) -> Result<Self, Error> {
    match elements {
      [message] => Ok(Self::new_notice(decode(message)?)),
      _ => Err(Error::InvalidData),
    }
  }
}

impl_serde_as_message!(RelayToClientCommNotice);

#[cfg(test)]
mod tests {
  use super::*;

  #[cfg(test)]
  use pretty_assertions::assert_eq;

  #[test]
  fn notice_is_a_two_element_array() {
    let notice: RelayToClientCommNotice =
      serde_json::from_str(r#"["NOTICE","rate limited"]"#).unwrap();

    assert_eq!(notice.message, "rate limited");
    assert_eq!(
      serde_json::to_string(&notice).unwrap(),
      r#"["NOTICE","rate limited"]"#
    );
  }

  #[test]
  fn notice_message_must_be_text() {
    assert!(RelayToClientCommNotice::from_json(r#"["NOTICE", 1]"#).is_err());
    assert!(RelayToClientCommNotice::from_json(r#"["NOTICE","a","b"]"#).is_err());
  }
}

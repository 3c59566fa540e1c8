//! Shape shared by every message exchanged with relays: a JSON array whose
//! first element names the message, e.g. `["EOSE", <subscription_id>]`.

use serde::de::DeserializeOwned;
use serde_json::Value;

/// [`NostrMessage`] error
#[derive(thiserror::Error, Debug)]
pub enum Error {
  /// Error serializing or deserializing JSON data
  #[error(transparent)]
  Json(#[from] serde_json::Error),
  #[error("Invalid data")]
  InvalidData,
}

pub trait NostrMessage: Sized {
  /// First element of the array.
  const CODE: &'static str;

  /// Elements following the code.
  fn elements(&self) -> Vec<Value>;

  /// Builds the message out of the elements following the code.
  fn from_elements(elements: &[Value]) -> Result<Self, Error>;

  fn as_value(&self) -> Value {
    let mut data = vec![Value::from(Self::CODE)];
    data.extend(self.elements());
    Value::Array(data)
  }

  fn from_value(msg: Value) -> Result<Self, Error> {
    match msg.as_array().map(Vec::as_slice) {
      Some([code, elements @ ..]) if code.as_str() == Some(Self::CODE) => {
        Self::from_elements(elements)
      }
      _ => Err(Error::InvalidData),
    }
  }

  fn as_json(&self) -> String {
    self.as_value().to_string()
  }

  fn from_json(msg: &str) -> Result<Self, Error> {
    if msg.is_empty() {
      return Err(Error::InvalidData);
    }

    let value: Value = serde_json::from_str(msg)?;
    Self::from_value(value)
  }
}

/// Decodes one element of a message.
pub(crate) fn decode<T: DeserializeOwned>(element: &Value) -> Result<T, Error> {
  Ok(serde_json::from_value(element.clone())?)
}

/// `Serialize` and `Deserialize` going through [`NostrMessage`], so a
/// message always travels as its array form.
macro_rules! impl_serde_as_message {
  ($message:ty) => {
    impl serde::Serialize for $message {
      fn serialize<S>(&self, serializer: S) -> ::std::result::Result<S::Ok, S::Error>
      where
        S: serde::Serializer,
      {
        serde::Serialize::serialize(
          &$crate::message::NostrMessage::as_value(self),
          serializer,
        )
      }
    }

    impl<'de> serde::Deserialize<'de> for $message {
      fn deserialize<D>(deserializer: D) -> ::std::result::Result<Self, D::Error>
      where
        D: serde::Deserializer<'de>,
      {
        let value = <serde_json::Value as serde::Deserialize>::deserialize(deserializer)?;
        <$message as $crate::message::NostrMessage>::from_value(value)
          .map_err(serde::de::Error::custom)
      }
    }
  };
}

pub(crate) use impl_serde_as_message;

use serde::{Deserialize, Serialize};
use std::fmt;

/// The `<marker>` of an event tag (`"e"`).
///
/// Paper comments only ever write `reply`; the other
/// values are read so that parents can be resolved from
/// events published by other clients.
///
#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub enum Marker {
  Root,
  Reply,
  Mention,
  #[default]
  Default,
}

impl fmt::Display for Marker {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Self::Root => write!(f, "root"),
      Self::Reply => write!(f, "reply"),
      Self::Mention => write!(f, "mention"),
      Self::Default => write!(f, ""),
    }
  }
}

impl<S> From<S> for Marker
where
  S: Into<String>,
{
  fn from(s: S) -> Self {
    let s: String = s.into();
    match s.as_str() {
      "root" => Self::Root,
      "reply" => Self::Reply,
      "mention" => Self::Mention,
      _ => Self::Default,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[cfg(test)]
  use pretty_assertions::assert_eq;

  #[test]
  fn unknown_markers_fall_back_to_default() {
    assert_eq!(Marker::from("reply"), Marker::Reply);
    assert_eq!(Marker::from("root"), Marker::Root);
    assert_eq!(Marker::from("quote"), Marker::Default);
    assert_eq!(Marker::Default.to_string(), "");
  }
}

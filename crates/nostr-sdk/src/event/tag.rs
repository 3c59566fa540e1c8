use serde::de::Error as DeserializerError;
use serde::{ser::SerializeSeq, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use url::Url;

use super::{EventId, Marker, PubKey};

/// [`Tag`] error
#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error("kind invalid or not implemented")]
  KindNotFound,
}

/// Holds the value of a Recommended Relay URL
/// that is send on an event.
///
#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct UncheckedRecommendRelayURL(pub String);

impl UncheckedRecommendRelayURL {
  pub fn check_if_url(&self) -> bool {
    Url::parse(&self.0).is_ok()
  }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub enum TagKind {
  /// `["p", <pub-key> or <list-of-pub-keys>, <relay-url>]`
  ///
  PubKey,
  /// `["e", <event-id>, <relay-url>, <marker>]`
  ///
  /// where:
  ///   - `<event-id>`: id of the other event that this event is replying/mentioning to.
  ///   - `<relay-url>`: URL of a recommended relay associated with this reference.
  ///      It is OPTIONAL. It can be left with just `""`.
  ///   - `<marker>`: `root`, `reply` or `mention`. It is OPTIONAL.
  ///
  /// A paper comment carrying an `e` tag is a reply to the referenced comment.
  ///
  Event,
  /// `["doi", <doi>]`
  ///
  /// Attaches the event to the paper identified by `<doi>`.
  /// Every paper comment must carry one.
  ///
  Doi,
  /// Custom tag
  Custom(String),
}

impl fmt::Display for TagKind {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Self::PubKey => write!(f, "p"),
      Self::Event => write!(f, "e"),
      Self::Doi => write!(f, "doi"),
      Self::Custom(tag) => write!(f, "{tag}"),
    }
  }
}

impl<S> From<S> for TagKind
where
  S: Into<String>,
{
  fn from(s: S) -> Self {
    let s: String = s.into();
    match s.as_str() {
      "p" => Self::PubKey,
      "e" => Self::Event,
      "doi" => Self::Doi,
      tag => Self::Custom(tag.to_string()),
    }
  }
}

impl From<&Tag> for TagKind {
  fn from(data: &Tag) -> Self {
    match data {
      Tag::Generic(kind, _) => kind.clone(),
      Tag::Event(..) => TagKind::Event,
      Tag::PubKey(_, _) => TagKind::PubKey,
      Tag::Doi(_) => TagKind::Doi,
    }
  }
}

/// A tag is an array of strings whose first element is its [`TagKind`].
///
///   `["p", <32-bytes hex of the key>, <recommended relay URL>]`
///   ```json
///   ["p", "02c7e1b1e9c175ab2d100baf1d5a66e73ecc044e9f8093d0c965741f26aa3abf76", ""]
///   ```
///
///   `["e", <32-bytes hex of the id of another event>, <recommended relay URL>, <marker>, <pubkey>]`
///   (the trailing pubkey is optional)
///   ```json
///   ["e", "688787d8ff144c502c7f5cffaafe2cc588d86079f9de88304c26b0cb99ce91c6", "", "reply"]
///   ```
///
///   `["doi", <doi of the paper being discussed>]`
///   ```json
///   ["doi", "10.1038/nphys1170"]
///   ```
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tag {
  /// Any tag we don't interpret, e.g. `["t", "paper-comment"]`.
  Generic(TagKind, Vec<String>),
  Event(
    EventId,
    Option<UncheckedRecommendRelayURL>,
    Option<Marker>,
    Option<PubKey>,
  ),
  PubKey(Vec<PubKey>, Option<UncheckedRecommendRelayURL>),
  Doi(String),
}

impl Tag {
  pub fn kind(&self) -> TagKind {
    TagKind::from(self)
  }

  pub fn as_vec(&self) -> Vec<String> {
    self.clone().into()
  }

  pub fn from_vec(data: Vec<String>) -> Result<Self, Error> {
    Self::try_from(data)
  }

  /// `["t", <hashtag>]`
  pub fn hashtag(value: &str) -> Self {
    Self::Generic(TagKind::Custom("t".to_string()), vec![value.to_string()])
  }
}

/// Helper function to check pubkey ("p") tag.
/// If the last element is empty, the URL is `None`; if it is not empty,
/// check if it can be parsed to URL. If it can, then `Some(url)`,
/// otherwise it is one more pubkey.
///
fn match_pubkey_tag_helper(tag: Vec<String>) -> Result<Tag, Error> {
  let Some((last_value, pubkeys)) = tag[1..].split_last() else {
    return Err(Error::KindNotFound);
  };
  let mut pubkeys = pubkeys.to_vec();

  if last_value.is_empty() {
    return Ok(Tag::PubKey(pubkeys, None));
  }

  let url = UncheckedRecommendRelayURL(last_value.clone());
  if url.check_if_url() {
    Ok(Tag::PubKey(pubkeys, Some(url)))
  } else {
    pubkeys.push(last_value.clone());
    Ok(Tag::PubKey(pubkeys, None))
  }
}

impl<S> TryFrom<Vec<S>> for Tag
where
  S: Into<String>,
{
  type Error = Error;

  fn try_from(tag: Vec<S>) -> Result<Self, Self::Error> {
    let tag: Vec<String> = tag.into_iter().map(|v| v.into()).collect();
    let tag_kind: TagKind = match tag.first() {
      Some(kind) => TagKind::from(kind),
      None => return Err(Error::KindNotFound),
    };

    match (tag_kind, tag.len()) {
      (tag_kind, 1) => Ok(Self::Generic(tag_kind, vec![])),
      (TagKind::Doi, _) => Ok(Self::Doi(tag[1].clone())),
      (TagKind::PubKey, 2) => Ok(Self::PubKey(vec![tag[1].clone()], None)),
      (TagKind::PubKey, _) => match_pubkey_tag_helper(tag),
      (TagKind::Event, _) => Ok(Self::Event(
        EventId(tag[1].clone()),
        tag
          .get(2)
          .filter(|url| !url.is_empty())
          .map(|url| UncheckedRecommendRelayURL(url.clone())),
        tag
          .get(3)
          .filter(|marker| !marker.is_empty())
          .map(Marker::from),
        tag.get(4).filter(|pubkey| !pubkey.is_empty()).cloned(),
      )),
      (tag_kind, _) => Ok(Self::Generic(tag_kind, tag[1..].to_vec())),
    }
  }
}

impl From<Tag> for Vec<String> {
  fn from(data: Tag) -> Self {
    match data {
      Tag::Generic(kind, content) => vec![vec![kind.to_string()], content].concat(),
      Tag::Event(event_id, recommended_relay_url, marker, pubkey) => {
        let mut event_tag = vec![
          TagKind::Event.to_string(),
          event_id.0,
          recommended_relay_url.map(|url| url.0).unwrap_or_default(),
          marker.map(|marker| marker.to_string()).unwrap_or_default(),
          pubkey.unwrap_or_default(),
        ];
        // empty trailing slots are left out
        while event_tag.len() > 2 && event_tag.last().map_or(false, String::is_empty) {
          event_tag.pop();
        }

        event_tag
      }
      Tag::PubKey(pubkey, recommended_relay_url) => {
        let mut pubkey_tag = vec![vec![TagKind::PubKey.to_string()], pubkey].concat();
        pubkey_tag.push(recommended_relay_url.map(|url| url.0).unwrap_or_default());
        pubkey_tag
      }
      Tag::Doi(doi) => vec![TagKind::Doi.to_string(), doi],
    }
  }
}

impl Serialize for Tag {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: Serializer,
  {
    let is_pubkey_tag = matches!(self, Tag::PubKey(_, _));
    let data: Vec<String> = self.as_vec();
    // Tag::PubKey(vec!["potato"], None) is sent as ["p", "potato"], not ["p", "potato", ""]
    let data: Vec<&String> = data
      .iter()
      .filter(|element| !(is_pubkey_tag && element.is_empty()))
      .collect();

    let mut seq = serializer.serialize_seq(Some(data.len()))?;
    for element in data {
      seq.serialize_element(element)?;
    }
    seq.end()
  }
}

impl<'de> Deserialize<'de> for Tag {
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: Deserializer<'de>,
  {
    // Deserialize into something serde knows (Vec<String>) and
    // then use `TryFrom<Vec<S>> for Tag` to get the enum.
    let vec: Vec<String> = Vec::<String>::deserialize(deserializer)?;
    Self::try_from(vec).map_err(DeserializerError::custom)
  }
}

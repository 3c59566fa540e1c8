use serde::{Deserialize, Serialize};

// Event Modules
pub mod id;
pub mod kind;
pub mod marker;
pub mod tag;

use self::id::EventId;
use self::kind::EventKind;
use self::marker::Marker;
use self::tag::Tag;
use crate::schnorr::{self, SchnorrError};

pub type PubKey = String;
pub type Timestamp = u64;

///
/// Event is the only object that exists in the Nostr protocol.
/// A comment on a paper is a `Text` event carrying a `doi` tag
/// (and an `e` tag when it replies to another comment).
///
/// Example (id's and other hashes are not valid for the information presented):
///   ```json
///   {
///     "id": "ca978112ca1bbdcafac231b39a23dc4da786eff8147c4e72b9807785afee48bb",
///     "pubkey": "c7e1b1e9c175ab2d100baf1d5a66e73ecc044e9f8093d0c965741f26aa3abf76",
///     "created_at": 1673002822,
///     "kind": 1,
///     "tags": [
///       ["doi", "10.1038/nphys1170"],
///       ["t", "paper-comment"],
///       ["e", "688787d8ff144c502c7f5cffaafe2cc588d86079f9de88304c26b0cb99ce91c6", "", "reply"]
///     ],
///     "content": "Lorem ipsum dolor sit amet",
///     "sig": "e8551d85f530113366e8da481354c2756605e3f58149cedc1fb9385d35251712b954af8ef891cb0467d50ddc6685063d4190c97e9e131f903e6e4176dc13ce7c"
///   }
///   ```
///
#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct Event {
  /// 32-bytes SHA256 of the serialized event data
  pub id: String,
  /// 32-bytes hex-encoded public key of the event creator
  pub pubkey: PubKey,
  /// Unix timestamp in seconds
  pub created_at: Timestamp,
  /// Kind of event
  pub kind: EventKind,
  /// An array of arrays with more info about the event,
  /// like, for example, the paper it talks about or the comment it replies to.
  pub tags: Vec<Tag>,
  /// Arbitrary string. Meaning depends on the kind of the event.
  pub content: String,
  /// 64-bytes hex signature of the id field
  pub sig: String,
}

impl Event {
  pub fn new_without_signature(
    pubkey: PubKey,
    created_at: Timestamp,
    kind: EventKind,
    tags: Vec<Tag>,
    content: String,
  ) -> Self {
    let id = EventId::new(&pubkey, created_at, kind, &tags, &content);
    Self {
      id: id.0,
      pubkey,
      created_at,
      kind,
      tags,
      content,
      ..Default::default()
    }
  }

  pub fn sign_event(&mut self, seckey: &[u8]) -> Result<(), SchnorrError> {
    self.sig = schnorr::sign(&self.id, seckey)?.to_string();
    Ok(())
  }

  pub fn check_event_id(&self) -> bool {
    EventId::new(
      &self.pubkey,
      self.created_at,
      self.kind,
      &self.tags,
      &self.content,
    )
    .0 == self.id
  }

  pub fn check_event_signature(&self) -> bool {
    schnorr::verify(&self.id, &self.sig, &self.pubkey).is_ok()
  }

  /// DOI of the paper this event is attached to: the value of the first
  /// non-empty `doi` tag.
  pub fn doi(&self) -> Option<&str> {
    self.tags.iter().find_map(|tag| match tag {
      Tag::Doi(doi) if !doi.trim().is_empty() => Some(doi.as_str()),
      _ => None,
    })
  }

  /// Id of the event this one replies to.
  ///
  /// Prefers the `e` tag marked `reply`, then the one marked `root`,
  /// then the first `e` tag.
  pub fn reply_to(&self) -> Option<&str> {
    let event_tags: Vec<(&EventId, Option<&Marker>)> = self
      .tags
      .iter()
      .filter_map(|tag| match tag {
        Tag::Event(id, _, marker, _) if !id.0.is_empty() => Some((id, marker.as_ref())),
        _ => None,
      })
      .collect();

    let marked = |wanted: Marker| {
      event_tags
        .iter()
        .find(|(_, marker)| *marker == Some(&wanted))
        .map(|(id, _)| *id)
    };

    marked(Marker::Reply)
      .or_else(|| marked(Marker::Root))
      .or_else(|| event_tags.first().map(|(id, _)| *id))
      .map(|id| id.0.as_str())
  }
}

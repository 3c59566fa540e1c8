use serde::{Deserialize, Serialize};

use crate::event::{id::EventId, kind::EventKind, tag::Tag, Event, PubKey, Timestamp};

///
/// Filters are data structures that clients send to relays
/// to request data from other clients.
/// The attributes of a Filter work as `&&` (in other words, all the conditions set must be present
/// in the event in order to pass the filter).
/// P.S.: a "REQ" communication from the client can have multiple filters. In this case, all filters will be
/// used as `||` operator: anything that matches any of the filters will be sent.
///
/// - ids: a list of events of prefixes
/// - authors: a list of publickeys or prefixes, the pubkey of an event must be one of these
/// - kinds: a list of kind numbers
/// - e: a list of event ids that are referenced in an "e" tag,
/// - doi: a list of DOIs that are referenced in a "doi" tag,
/// - since: a timestamp. Events must be newer than this to pass
/// - until: a timestamp. Events must be older than this to pass
/// - limit: maximum number of events to be returned in the initial query (it can be ignored afterwards)
///
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Filter {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub ids: Option<Vec<EventId>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub authors: Option<Vec<PubKey>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub kinds: Option<Vec<EventKind>>,
  #[serde(alias = "#e", rename(serialize = "#e"), skip_serializing_if = "Option::is_none")]
  pub e: Option<Vec<String>>,
  #[serde(alias = "#doi", rename(serialize = "#doi"), skip_serializing_if = "Option::is_none")]
  pub doi: Option<Vec<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub since: Option<Timestamp>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub until: Option<Timestamp>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub limit: Option<u64>,
}

impl Filter {
  pub fn new() -> Self {
    Self::default()
  }

  /// Filter used to follow every comment posted about a paper.
  pub fn paper_comments(doi: &str, kinds: &[EventKind]) -> Self {
    let mut filter = Self::new();
    filter
      .add_kinds(kinds.iter().map(|kind| kind.as_u64()).collect())
      .add_doi_tags(vec![doi.to_string()]);
    filter
  }

  pub fn add_ids(&mut self, ids: Vec<String>) -> &mut Self {
    if ids.is_empty() {
      return self;
    }

    self.ids = Some(ids.into_iter().map(EventId).collect());
    self
  }

  pub fn add_authors(&mut self, authors: Vec<String>) -> &mut Self {
    if authors.is_empty() {
      return self;
    }

    self.authors = Some(authors);
    self
  }

  pub fn add_kinds(&mut self, kinds: Vec<u64>) -> &mut Self {
    if kinds.is_empty() {
      return self;
    }

    self.kinds = Some(kinds.into_iter().map(EventKind::from).collect());
    self
  }

  pub fn add_e_tags(&mut self, e_tags: Vec<String>) -> &mut Self {
    if e_tags.is_empty() {
      return self;
    }

    self.e = Some(e_tags);
    self
  }

  pub fn add_doi_tags(&mut self, dois: Vec<String>) -> &mut Self {
    if dois.is_empty() {
      return self;
    }

    self.doi = Some(dois);
    self
  }

  pub fn add_since(&mut self, since: u64) -> &mut Self {
    self.since = Some(since);
    self
  }

  pub fn add_until(&mut self, until: u64) -> &mut Self {
    self.until = Some(until);
    self
  }

  pub fn add_limit(&mut self, limit: u64) -> &mut Self {
    self.limit = Some(limit);
    self
  }

  /// Checks locally whether `event` passes this filter.
  ///
  /// Relays apply filters on their side too, but nothing guarantees they do
  /// it right, so inbound events are checked again.
  pub fn matches(&self, event: &Event) -> bool {
    if let Some(ids) = &self.ids {
      if !ids.iter().any(|id| event.id.starts_with(&id.0)) {
        return false;
      }
    }

    if let Some(authors) = &self.authors {
      if !authors.iter().any(|author| event.pubkey.starts_with(author)) {
        return false;
      }
    }

    if let Some(kinds) = &self.kinds {
      if !kinds.contains(&event.kind) {
        return false;
      }
    }

    if let Some(since) = self.since {
      if event.created_at < since {
        return false;
      }
    }

    if let Some(until) = self.until {
      if event.created_at > until {
        return false;
      }
    }

    if let Some(event_ids) = &self.e {
      let referenced = event.tags.iter().any(|tag| match tag {
        Tag::Event(id, ..) => event_ids.contains(&id.0),
        _ => false,
      });
      if !referenced {
        return false;
      }
    }

    if let Some(dois) = &self.doi {
      let referenced = event.tags.iter().any(|tag| match tag {
        Tag::Doi(doi) => dois.contains(doi),
        _ => false,
      });
      if !referenced {
        return false;
      }
    }

    true
  }
}

use std::{fs, path::Path, result};

use log::{debug, warn};
use redb::{
  Database, MultimapTableDefinition, ReadableMultimapTable, ReadableTable, TableDefinition,
};

use crate::event::Event;

use super::{registry::SubscriptionRegistry, thread, timestamp_in_seconds, Comment, Error};

type Result<T> = result::Result<T, redb::Error>;

const DB_DIR: &str = "db";

type Index = MultimapTableDefinition<'static, &'static str, &'static str>;

/// id -> comment (JSON)
const COMMENTS: TableDefinition<&str, &str> = TableDefinition::new("comments");
/// topic -> id
const COMMENTS_BY_TOPIC: Index = MultimapTableDefinition::new("comments_by_topic");
/// parent id -> id
const COMMENTS_BY_PARENT: Index = MultimapTableDefinition::new("comments_by_parent");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
  Inserted,
  Updated,
  Duplicate,
}

/// Durable, flat set of comments indexed by topic and by parent.
///
/// Every committed change to a topic is announced through the
/// [`SubscriptionRegistry`] before the mutating call returns.
pub struct EventStore {
  db: Database,
  registry: SubscriptionRegistry,
}

impl EventStore {
  /// Opens (or creates) `db/<name>.redb`.
  pub fn new(name: &str, registry: SubscriptionRegistry) -> result::Result<Self, Error> {
    fs::create_dir_all(DB_DIR).map_err(redb::Error::Io)?;
    Self::open(format!("{DB_DIR}/{name}.redb"), registry)
  }

  pub fn open(path: impl AsRef<Path>, registry: SubscriptionRegistry) -> result::Result<Self, Error> {
    let db = Database::create(path).map_err(redb::Error::from)?;

    // creates the tables if they don't exist yet
    let write_txn = db.begin_write().map_err(redb::Error::from)?;
    {
      write_txn
        .open_table(COMMENTS)
        .map_err(redb::Error::from)?;
      write_txn
        .open_multimap_table(COMMENTS_BY_TOPIC)
        .map_err(redb::Error::from)?;
      write_txn
        .open_multimap_table(COMMENTS_BY_PARENT)
        .map_err(redb::Error::from)?;
    }
    write_txn.commit().map_err(redb::Error::from)?;

    Ok(Self { db, registry })
  }

  pub fn registry(&self) -> &SubscriptionRegistry {
    &self.registry
  }

  /// Stores `event` as a comment.
  ///
  /// A second copy of a known event is a `Duplicate` and changes nothing.
  /// A different event under a known id replaces the stored one (keeping
  /// when it was first received) and is reported as `Updated`.
  pub fn upsert(&mut self, event: &Event) -> result::Result<UpsertOutcome, Error> {
    let mut comment = Comment::from_event(event, timestamp_in_seconds())?;
    let previous = self.get(&comment.id)?;

    let outcome = match &previous {
      Some(previous) if previous.same_event(&comment) => {
        debug!("Duplicate comment {}", comment.id);
        return Ok(UpsertOutcome::Duplicate);
      }
      Some(previous) => {
        comment.received_at = previous.received_at;
        UpsertOutcome::Updated
      }
      None => UpsertOutcome::Inserted,
    };

    let record = serde_json::to_string(&comment)?;
    self.write(&comment, &record, previous.as_ref())?;
    debug!("{:?} comment {} about {}", outcome, comment.id, comment.topic);

    self.notify(&comment.topic);
    if let Some(previous) = previous {
      if previous.topic != comment.topic {
        self.notify(&previous.topic);
      }
    }

    Ok(outcome)
  }

  /// Thread of `topic`: top level comments with their replies.
  pub fn get_by_topic(&self, topic: &str) -> result::Result<Vec<Comment>, Error> {
    let records = self.records_by(COMMENTS_BY_TOPIC, topic)?;
    let comments = decode(&records)?;
    Ok(thread::reconstruct(comments))
  }

  /// Removes a comment. Removing an unknown id does nothing.
  pub fn delete(&mut self, id: &str, topic: &str) -> result::Result<(), Error> {
    let comment = match self.get(id)? {
      Some(comment) => comment,
      None => return Ok(()),
    };
    if comment.topic != topic {
      debug!("Comment {id} is stored under {}, not {topic}", comment.topic);
    }

    self.remove(&comment)?;
    debug!("Deleted comment {id} about {}", comment.topic);

    self.notify(&comment.topic);
    Ok(())
  }

  pub fn get(&self, id: &str) -> result::Result<Option<Comment>, Error> {
    match self.record(id)? {
      Some(record) => Ok(Some(serde_json::from_str(&record)?)),
      None => Ok(None),
    }
  }

  /// Direct replies to `parent_id`, oldest first.
  pub fn replies_to(&self, parent_id: &str) -> result::Result<Vec<Comment>, Error> {
    let records = self.records_by(COMMENTS_BY_PARENT, parent_id)?;
    let mut replies = decode(&records)?;
    replies.sort_by(|reply1, reply2| {
      reply1
        .created_at
        .cmp(&reply2.created_at)
        .then_with(|| reply1.id.cmp(&reply2.id))
    });
    Ok(replies)
  }

  pub fn len(&self) -> result::Result<u64, Error> {
    Ok(self.count()?)
  }

  pub fn is_empty(&self) -> result::Result<bool, Error> {
    Ok(self.len()? == 0)
  }

  fn notify(&self, topic: &str) {
    self
      .registry
      .notify(topic, || match self.get_by_topic(topic) {
        Ok(thread) => Some(thread),
        Err(err) => {
          warn!("Could not rebuild the thread of {topic}: {err}");
          None
        }
      });
  }

  fn write(&self, comment: &Comment, record: &str, previous: Option<&Comment>) -> Result<()> {
    let write_txn = self.db.begin_write()?;
    {
      let mut comments = write_txn.open_table(COMMENTS)?;
      let mut by_topic = write_txn.open_multimap_table(COMMENTS_BY_TOPIC)?;
      let mut by_parent = write_txn.open_multimap_table(COMMENTS_BY_PARENT)?;

      if let Some(previous) = previous {
        by_topic.remove(previous.topic.as_str(), previous.id.as_str())?;
        if let Some(parent_id) = &previous.parent_id {
          by_parent.remove(parent_id.as_str(), previous.id.as_str())?;
        }
      }

      comments.insert(comment.id.as_str(), record)?;
      by_topic.insert(comment.topic.as_str(), comment.id.as_str())?;
      if let Some(parent_id) = &comment.parent_id {
        by_parent.insert(parent_id.as_str(), comment.id.as_str())?;
      }
    }
    write_txn.commit()?;
    Ok(())
  }

  fn remove(&self, comment: &Comment) -> Result<()> {
    let write_txn = self.db.begin_write()?;
    {
      let mut comments = write_txn.open_table(COMMENTS)?;
      let mut by_topic = write_txn.open_multimap_table(COMMENTS_BY_TOPIC)?;
      let mut by_parent = write_txn.open_multimap_table(COMMENTS_BY_PARENT)?;

      comments.remove(comment.id.as_str())?;
      by_topic.remove(comment.topic.as_str(), comment.id.as_str())?;
      if let Some(parent_id) = &comment.parent_id {
        by_parent.remove(parent_id.as_str(), comment.id.as_str())?;
      }
    }
    write_txn.commit()?;
    Ok(())
  }

  fn record(&self, id: &str) -> Result<Option<String>> {
    let read_txn = self.db.begin_read()?;
    let comments = read_txn.open_table(COMMENTS)?;
    let record = comments.get(id)?.map(|record| record.value().to_string());
    Ok(record)
  }

  /// Records whose id is listed under `key` in `index`.
  fn records_by(&self, index: Index, key: &str) -> Result<Vec<String>> {
    let read_txn = self.db.begin_read()?;
    let ids = read_txn.open_multimap_table(index)?;
    let comments = read_txn.open_table(COMMENTS)?;

    let mut records = vec![];
    for id in ids.get(key)? {
      let id = id?;
      match comments.get(id.value())? {
        Some(record) => records.push(record.value().to_string()),
        None => warn!("Index entry {key} -> {} has no comment", id.value()),
      }
    }

    Ok(records)
  }

  fn count(&self) -> Result<u64> {
    let read_txn = self.db.begin_read()?;
    let comments = read_txn.open_table(COMMENTS)?;
    Ok(comments.len()?)
  }
}

fn decode(records: &[String]) -> result::Result<Vec<Comment>, Error> {
  records
    .iter()
    .map(|record| serde_json::from_str(record).map_err(Error::Json))
    .collect()
}

#[cfg(test)]
mod tests {
  use std::sync::{Arc, Mutex};

  use super::*;
  use crate::{
    comments::{
      registry::{Observer, SubscriptionHandle},
      tests::TempDb,
    },
    event::{id::EventId, kind::EventKind, marker::Marker, tag::Tag},
  };

  #[cfg(test)]
  use pretty_assertions::assert_eq;

  const TOPIC: &str = "10.1/abc";

  struct Sut {
    store: EventStore,
    deliveries: Arc<Mutex<Vec<Vec<Comment>>>>,
    _handle: SubscriptionHandle,
    _db: TempDb,
  }

  impl Sut {
    fn new(name: &str) -> Self {
      let db = TempDb::new(name);
      let registry = SubscriptionRegistry::new();
      let deliveries: Arc<Mutex<Vec<Vec<Comment>>>> = Arc::new(Mutex::new(vec![]));

      let recorded = deliveries.clone();
      let observer: Observer =
        Arc::new(move |thread: &[Comment]| recorded.lock().unwrap().push(thread.to_vec()));
      let handle = registry.register(TOPIC, observer);

      Self {
        store: EventStore::new(name, registry).unwrap(),
        deliveries,
        _handle: handle,
        _db: db,
      }
    }

    fn deliveries(&self) -> usize {
      self.deliveries.lock().unwrap().len()
    }
  }

  fn event(id: &str, doi: Option<&str>, created_at: u64, parent: Option<&str>) -> Event {
    let mut tags = vec![];
    if let Some(doi) = doi {
      tags.push(Tag::Doi(doi.to_string()));
    }
    if let Some(parent) = parent {
      tags.push(Tag::Event(EventId(parent.to_string()), None, Some(Marker::Reply), None));
    }

    Event {
      id: id.to_string(),
      pubkey: String::from("author"),
      created_at,
      kind: EventKind::Text,
      tags,
      content: format!("comment {id}"),
      sig: String::from("sig"),
    }
  }

  fn ids(comments: &[Comment]) -> Vec<&str> {
    comments.iter().map(|comment| comment.id.as_str()).collect()
  }

  #[test]
  fn reply_is_nested_under_its_parent() {
    let mut sut = Sut::new("store_reply_nested");

    sut.store.upsert(&event("1", Some(TOPIC), 100, None)).unwrap();
    sut.store.upsert(&event("2", Some(TOPIC), 200, Some("1"))).unwrap();

    let thread = sut.store.get_by_topic(TOPIC).unwrap();
    assert_eq!(ids(&thread), vec!["1"]);
    assert_eq!(ids(&thread[0].replies), vec!["2"]);
  }

  #[test]
  fn replies_are_ordered_by_creation_not_arrival() {
    let mut sut = Sut::new("store_reply_order");

    sut.store.upsert(&event("1", Some(TOPIC), 100, None)).unwrap();
    sut.store.upsert(&event("2", Some(TOPIC), 200, Some("1"))).unwrap();
    sut.store.upsert(&event("3", Some(TOPIC), 150, Some("1"))).unwrap();

    let thread = sut.store.get_by_topic(TOPIC).unwrap();
    assert_eq!(ids(&thread[0].replies), vec!["3", "2"]);
  }

  #[test]
  fn events_without_topic_are_rejected() {
    let mut sut = Sut::new("store_malformed");

    let result = sut.store.upsert(&event("1", None, 100, None));

    assert!(matches!(result, Err(Error::MalformedEvent(_))));
    assert!(sut.store.is_empty().unwrap());
    assert_eq!(sut.store.get("1").unwrap(), None);
    assert_eq!(sut.deliveries(), 0);
  }

  #[test]
  fn upserting_twice_is_a_no_op() {
    let mut sut = Sut::new("store_idempotent");
    let comment = event("1", Some(TOPIC), 100, None);

    assert_eq!(sut.store.upsert(&comment).unwrap(), UpsertOutcome::Inserted);
    let thread = sut.store.get_by_topic(TOPIC).unwrap();

    assert_eq!(sut.store.upsert(&comment).unwrap(), UpsertOutcome::Duplicate);
    assert_eq!(sut.store.get_by_topic(TOPIC).unwrap(), thread);
    assert_eq!(sut.store.len().unwrap(), 1);
    assert_eq!(sut.deliveries(), 1);
  }

  #[test]
  fn changed_content_under_the_same_id_is_an_update() {
    let mut sut = Sut::new("store_update");
    let original = event("1", Some(TOPIC), 100, None);
    let mut edited = original.clone();
    edited.content = String::from("edited");

    sut.store.upsert(&original).unwrap();
    assert_eq!(sut.store.upsert(&edited).unwrap(), UpsertOutcome::Updated);

    let thread = sut.store.get_by_topic(TOPIC).unwrap();
    assert_eq!(thread.len(), 1);
    assert_eq!(thread[0].content, "edited");
    assert_eq!(sut.deliveries(), 2);
    assert_eq!(sut.deliveries.lock().unwrap()[1], thread);
  }

  #[test]
  fn child_arriving_first_is_nested_once_the_parent_arrives() {
    let mut sut = Sut::new("store_out_of_order");

    sut.store.upsert(&event("2", Some(TOPIC), 200, Some("1"))).unwrap();
    assert_eq!(ids(&sut.store.get_by_topic(TOPIC).unwrap()), vec!["2"]);

    sut.store.upsert(&event("1", Some(TOPIC), 100, None)).unwrap();
    let thread = sut.store.get_by_topic(TOPIC).unwrap();
    assert_eq!(ids(&thread), vec!["1"]);
    assert_eq!(ids(&thread[0].replies), vec!["2"]);
    assert_eq!(sut.store.len().unwrap(), 2);
  }

  #[test]
  fn topics_do_not_leak_into_each_other() {
    let mut sut = Sut::new("store_isolation");

    sut.store.upsert(&event("1", Some(TOPIC), 100, None)).unwrap();
    sut.store.upsert(&event("2", Some("10.1/other"), 100, None)).unwrap();

    assert_eq!(ids(&sut.store.get_by_topic(TOPIC).unwrap()), vec!["1"]);
    assert_eq!(ids(&sut.store.get_by_topic("10.1/other").unwrap()), vec!["2"]);
    assert!(sut.store.get_by_topic("10.1/unknown").unwrap().is_empty());
    // only the watched topic was announced
    assert_eq!(sut.deliveries(), 1);
  }

  #[test]
  fn moving_a_comment_to_another_topic_updates_both() {
    let mut sut = Sut::new("store_topic_move");
    let original = event("1", Some(TOPIC), 100, None);
    let moved = event("1", Some("10.1/other"), 100, None);

    sut.store.upsert(&original).unwrap();
    assert_eq!(sut.store.upsert(&moved).unwrap(), UpsertOutcome::Updated);

    assert!(sut.store.get_by_topic(TOPIC).unwrap().is_empty());
    assert_eq!(ids(&sut.store.get_by_topic("10.1/other").unwrap()), vec!["1"]);
    assert_eq!(sut.deliveries(), 2);
    assert!(sut.deliveries.lock().unwrap()[1].is_empty());
  }

  #[test]
  fn first_received_time_survives_updates() {
    let mut sut = Sut::new("store_received_at");
    sut.store.upsert(&event("1", Some(TOPIC), 100, None)).unwrap();

    let mut stored = sut.store.get("1").unwrap().unwrap();
    assert_eq!(stored.received_at, timestamp_in_seconds());

    // pretend it was received long ago
    stored.received_at = 1;
    let record = serde_json::to_string(&stored).unwrap();
    sut.store.write(&stored, &record, Some(&stored)).unwrap();

    let mut edited = event("1", Some(TOPIC), 100, None);
    edited.content = String::from("edited");
    sut.store.upsert(&edited).unwrap();

    assert_eq!(sut.store.get("1").unwrap().unwrap().received_at, 1);
  }

  #[test]
  fn delete_removes_the_comment_and_is_idempotent() {
    let mut sut = Sut::new("store_delete");
    sut.store.upsert(&event("1", Some(TOPIC), 100, None)).unwrap();
    sut.store.upsert(&event("2", Some(TOPIC), 200, Some("1"))).unwrap();

    sut.store.delete("2", TOPIC).unwrap();
    assert_eq!(sut.deliveries(), 3);
    assert!(sut.store.replies_to("1").unwrap().is_empty());
    assert_eq!(sut.store.get("2").unwrap(), None);

    sut.store.delete("2", TOPIC).unwrap();
    assert_eq!(sut.deliveries(), 3);
    assert_eq!(ids(&sut.store.get_by_topic(TOPIC).unwrap()), vec!["1"]);
  }

  #[test]
  fn replies_to_lists_direct_children_oldest_first() {
    let mut sut = Sut::new("store_replies_to");
    sut.store.upsert(&event("1", Some(TOPIC), 100, None)).unwrap();
    sut.store.upsert(&event("3", Some(TOPIC), 300, Some("1"))).unwrap();
    sut.store.upsert(&event("2", Some(TOPIC), 200, Some("1"))).unwrap();
    sut.store.upsert(&event("4", Some(TOPIC), 400, Some("2"))).unwrap();

    assert_eq!(ids(&sut.store.replies_to("1").unwrap()), vec!["2", "3"]);
    assert_eq!(ids(&sut.store.replies_to("2").unwrap()), vec!["4"]);
    assert!(sut.store.replies_to("4").unwrap().is_empty());
  }

  #[test]
  fn comments_survive_reopening_the_store() {
    let name = "store_durability";
    let _db = TempDb::new(name);

    {
      let mut store = EventStore::new(name, SubscriptionRegistry::new()).unwrap();
      store.upsert(&event("1", Some(TOPIC), 100, None)).unwrap();
      store.upsert(&event("2", Some(TOPIC), 200, Some("1"))).unwrap();
    }

    let store = EventStore::new(name, SubscriptionRegistry::new()).unwrap();
    let thread = store.get_by_topic(TOPIC).unwrap();
    assert_eq!(ids(&thread), vec!["1"]);
    assert_eq!(ids(&thread[0].replies), vec!["2"]);
    assert_eq!(store.len().unwrap(), 2);
  }
}

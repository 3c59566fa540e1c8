use std::sync::Arc;

use log::{debug, info, warn};

use crate::{
  event::{id::EventId, kind::EventKind, marker::Marker, tag::Tag, Event},
  relay::{RelayAck, RelayTransport},
  signer::{EventDraft, Signer},
};

use super::{timestamp_in_seconds, Error};

const COMMENT_HASHTAG: &str = "paper-comment";

/// What happened to a published comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
  pub event: Event,
  pub acks: Vec<RelayAck>,
}

impl PublishOutcome {
  pub fn accepted_by(&self) -> Vec<&str> {
    self
      .acks
      .iter()
      .filter(|ack| ack.accepted)
      .map(|ack| ack.relay_url.as_str())
      .collect()
  }
}

/// Sends new comments to the relays.
///
/// Nothing is written locally: a published comment shows up in the thread
/// once a relay sends it back through the watched subscription.
pub struct PublishCoordinator {
  transport: Arc<dyn RelayTransport>,
}

impl PublishCoordinator {
  pub fn new(transport: Arc<dyn RelayTransport>) -> Self {
    Self { transport }
  }

  /// The unsigned comment event about `topic`, replying to `parent_id` if
  /// any.
  pub fn draft(content: &str, topic: &str, parent_id: Option<&str>) -> EventDraft {
    let mut tags = vec![Tag::Doi(topic.to_string()), Tag::hashtag(COMMENT_HASHTAG)];
    if let Some(parent_id) = parent_id {
      tags.push(Tag::Event(EventId(parent_id.to_string()), None, Some(Marker::Reply), None));
    }

    EventDraft {
      kind: EventKind::Text,
      tags,
      content: content.to_string(),
      created_at: timestamp_in_seconds(),
    }
  }

  /// Signs and publishes a comment. Succeeds when at least one relay
  /// accepted it.
  pub async fn publish(
    &self,
    content: &str,
    topic: &str,
    parent_id: Option<&str>,
    signer: &dyn Signer,
  ) -> Result<PublishOutcome, Error> {
    if topic.trim().is_empty() {
      return Err(Error::MalformedEvent(String::from("<unsigned>")));
    }

    let event = signer.sign(Self::draft(content, topic, parent_id))?;
    debug!("Publishing {} about {topic}", event.id);

    let acks = self.transport.publish(event.clone()).await;
    for ack in acks.iter().filter(|ack| !ack.accepted) {
      warn!("{} rejected {}: {}", ack.relay_url, event.id, ack.message);
    }

    if !acks.iter().any(|ack| ack.accepted) {
      return Err(Error::PublishFailure(acks));
    }

    let outcome = PublishOutcome { event, acks };
    info!(
      "Published {} to {}",
      outcome.event.id,
      outcome.accepted_by().join(", ")
    );
    Ok(outcome)
  }
}

use crate::{
  client::database::keys_table::Keys,
  event::{kind::EventKind, tag::Tag, Event, PubKey, Timestamp},
  schnorr,
};

/// The signer refused, or was unable, to sign.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("signing denied: {0}")]
pub struct SigningDenied(pub String);

/// Everything an event needs except who signs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDraft {
  pub kind: EventKind,
  pub tags: Vec<Tag>,
  pub content: String,
  pub created_at: Timestamp,
}

/// Turns drafts into signed events.
pub trait Signer: Send + Sync {
  fn public_key(&self) -> PubKey;
  fn sign(&self, draft: EventDraft) -> Result<Event, SigningDenied>;
}

/// Signs with a secret key held in memory.
pub struct LocalSigner {
  private_key: Vec<u8>,
  public_key: PubKey,
}

impl LocalSigner {
  pub fn new(private_key: Vec<u8>) -> Result<Self, SigningDenied> {
    let public_key = schnorr::x_only_public_key_hex(&private_key)
      .map_err(|err| SigningDenied(err.to_string()))?;

    Ok(Self {
      private_key,
      public_key,
    })
  }

  /// Signer for keys read from the keys table. A stored public key that
  /// does not belong to the stored secret key is refused.
  pub fn from_keys(keys: &Keys) -> Result<Self, SigningDenied> {
    let signer = Self::new(keys.private_key.clone())?;
    if !keys.public_key.is_empty() && hex::encode(&keys.public_key) != signer.public_key {
      return Err(SigningDenied(String::from(
        "stored public key does not match the secret key",
      )));
    }
    Ok(signer)
  }
}

impl Signer for LocalSigner {
  fn public_key(&self) -> PubKey {
    self.public_key.clone()
  }

  fn sign(&self, draft: EventDraft) -> Result<Event, SigningDenied> {
    let mut event = Event::new_without_signature(
      self.public_key.clone(),
      draft.created_at,
      draft.kind,
      draft.tags,
      draft.content,
    );
    event
      .sign_event(&self.private_key)
      .map_err(|err| SigningDenied(err.to_string()))?;

    Ok(event)
  }
}

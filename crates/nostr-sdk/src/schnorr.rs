//! BIP-340 signatures over event ids.

use std::str::FromStr;

use bitcoin_hashes::{
  hex::{FromHex, ToHex},
  sha256,
};
use secp256k1::{schnorr::Signature, KeyPair, Message, PublicKey, Secp256k1, SecretKey, XOnlyPublicKey};

#[derive(Debug)]
pub struct AsymmetricKeys {
  pub private_key: SecretKey,
  pub public_key: PublicKey,
}

#[derive(thiserror::Error, Debug)]
pub enum SchnorrError {
  /// The event id is not a hex encoded sha256 digest
  #[error(transparent)]
  SHA256(#[from] bitcoin_hashes::hex::Error),

  #[error(transparent)]
  SECP256K1(#[from] secp256k1::Error),
}

fn message_from_event_id(event_id: &str) -> Result<Message, SchnorrError> {
  let digest = sha256::Hash::from_hex(event_id)?;
  Ok(Message::from_slice(digest.as_ref())?)
}

/// Signs an event id (hex sha256) with a 32 bytes secret key.
///
/// No auxiliary randomness is used, so the same id and key always give the
/// same signature.
///
/// ```
/// use bitcoin_hashes::{hex::ToHex, sha256, Hash};
/// use pubnostr_sdk::schnorr::*;
///
/// let keys = generate_keys();
/// let event_id = sha256::Hash::hash(b"some serialized event").to_hex();
/// let sig = sign(&event_id, &keys.private_key.secret_bytes()).unwrap();
///
/// let pubkey = x_only_public_key_hex(&keys.private_key.secret_bytes()).unwrap();
/// assert!(verify(&event_id, &sig.to_string(), &pubkey).is_ok());
/// ```
pub fn sign(event_id: &str, seckey: &[u8]) -> Result<Signature, SchnorrError> {
  let msg = message_from_event_id(event_id)?;
  let seckey = SecretKey::from_slice(seckey).map_err(|err| {
    log::error!("[schnorr::sign] {err}");
    err
  })?;

  let secp = Secp256k1::signing_only();
  let keypair = KeyPair::from_secret_key(&secp, &seckey);
  Ok(secp.sign_schnorr_no_aux_rand(&msg, &keypair))
}

/// Checks a hex signature of an event id against a hex x-only public key.
pub fn verify(event_id: &str, sig: &str, pubkey: &str) -> Result<(), SchnorrError> {
  let msg = message_from_event_id(event_id)?;
  let sig = Signature::from_str(sig)?;
  let pubkey = XOnlyPublicKey::from_str(pubkey)?;

  Secp256k1::verification_only()
    .verify_schnorr(&sig, &msg, &pubkey)
    .map_err(|err| {
      log::debug!("[schnorr::verify] {err}");
      SchnorrError::SECP256K1(err)
    })
}

/// Hex encoded x-only public key (the nostr `pubkey`) of a secret key.
pub fn x_only_public_key_hex(seckey: &[u8]) -> Result<String, SchnorrError> {
  let secp = Secp256k1::signing_only();
  let seckey = SecretKey::from_slice(seckey)?;
  let keypair = KeyPair::from_secret_key(&secp, &seckey);
  Ok(XOnlyPublicKey::from_keypair(&keypair).0.to_hex())
}

pub fn generate_keys() -> AsymmetricKeys {
  let (private_key, public_key) = Secp256k1::new().generate_keypair(&mut rand::thread_rng());

  AsymmetricKeys {
    private_key,
    public_key,
  }
}

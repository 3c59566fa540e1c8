//! Threaded comments about papers (identified by their DOI) carried over
//! nostr relays.
//!
//! [`client::CommentsClient`] is the entry point: it watches the comments
//! about a paper and posts new ones. The building blocks live in
//! [`comments`]; [`relay::pool::RelayPool`] talks to the relays.

pub mod client;
pub mod comments;
pub mod config;
pub mod event;
pub mod filter;
pub mod message;
pub mod metadata;
pub mod relay;
pub mod schnorr;
pub mod signer;

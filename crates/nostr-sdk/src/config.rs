use std::{env, time::Duration};

use url::Url;

use crate::relay::pool::RelayPoolOptions;

pub const DEFAULT_RELAYS: [&str; 3] = [
  "wss://relay.damus.io",
  "wss://relay.nostr.band",
  "wss://nos.lol",
];
const DEFAULT_DB: &str = "comments";
const DEFAULT_KEYS_DB: &str = "keys";

/// [`Settings`] error
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
  #[error("{key} is not a valid relay url: {value}")]
  InvalidRelay { key: String, value: String },
  #[error("{key} must be a number of seconds, got {value}")]
  InvalidSeconds { key: String, value: String },
  #[error("{key} must be true or false, got {value}")]
  InvalidFlag { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
  pub relays: Vec<String>,
  /// Name of the comment store, `db/<db_name>.redb`.
  pub db_name: String,
  pub keys_db_name: String,
  pub publish_timeout: Duration,
  pub reconnect_delay: Duration,
  pub verify_signatures: bool,
}

impl Default for Settings {
  fn default() -> Self {
    let pool = RelayPoolOptions::default();
    Self {
      relays: DEFAULT_RELAYS.iter().map(|relay| relay.to_string()).collect(),
      db_name: DEFAULT_DB.to_string(),
      keys_db_name: DEFAULT_KEYS_DB.to_string(),
      publish_timeout: pool.publish_timeout,
      reconnect_delay: pool.reconnect_delay,
      verify_signatures: pool.verify_events,
    }
  }
}

impl Settings {
  /// Reads the `PUBNOSTR_*` environment variables; unset ones keep their
  /// default.
  pub fn from_env() -> Result<Self, Error> {
    Self::from_lookup(|key| env::var(key).ok())
  }

  pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
  where
    F: Fn(&str) -> Option<String>,
  {
    let mut settings = Self::default();
    let lookup = |key: &str| {
      lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
    };

    if let Some(relays) = lookup("PUBNOSTR_RELAYS") {
      settings.relays = parse_relays("PUBNOSTR_RELAYS", &relays)?;
    }
    if let Some(db_name) = lookup("PUBNOSTR_DB") {
      settings.db_name = db_name;
    }
    if let Some(keys_db_name) = lookup("PUBNOSTR_KEYS_DB") {
      settings.keys_db_name = keys_db_name;
    }
    if let Some(seconds) = lookup("PUBNOSTR_PUBLISH_TIMEOUT_SECS") {
      settings.publish_timeout = parse_seconds("PUBNOSTR_PUBLISH_TIMEOUT_SECS", &seconds)?;
    }
    if let Some(seconds) = lookup("PUBNOSTR_RECONNECT_DELAY_SECS") {
      settings.reconnect_delay = parse_seconds("PUBNOSTR_RECONNECT_DELAY_SECS", &seconds)?;
    }
    if let Some(flag) = lookup("PUBNOSTR_VERIFY_SIGNATURES") {
      settings.verify_signatures = parse_flag("PUBNOSTR_VERIFY_SIGNATURES", &flag)?;
    }

    Ok(settings)
  }

  pub fn pool_options(&self) -> RelayPoolOptions {
    RelayPoolOptions {
      reconnect_delay: self.reconnect_delay,
      publish_timeout: self.publish_timeout,
      verify_events: self.verify_signatures,
    }
  }
}

fn parse_relays(key: &str, value: &str) -> Result<Vec<String>, Error> {
  value
    .split(',')
    .map(str::trim)
    .filter(|relay| !relay.is_empty())
    .map(|relay| match Url::parse(relay) {
      Ok(url) if url.scheme() == "ws" || url.scheme() == "wss" => Ok(relay.to_string()),
      _ => Err(Error::InvalidRelay {
        key: key.to_string(),
        value: relay.to_string(),
      }),
    })
    .collect()
}

fn parse_seconds(key: &str, value: &str) -> Result<Duration, Error> {
  value
    .parse::<u64>()
    .map(Duration::from_secs)
    .map_err(|_| Error::InvalidSeconds {
      key: key.to_string(),
      value: value.to_string(),
    })
}

fn parse_flag(key: &str, value: &str) -> Result<bool, Error> {
  match value.to_lowercase().as_str() {
    "true" | "1" | "yes" => Ok(true),
    "false" | "0" | "no" => Ok(false),
    _ => Err(Error::InvalidFlag {
      key: key.to_string(),
      value: value.to_string(),
    }),
  }
}

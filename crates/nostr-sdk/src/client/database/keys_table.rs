use std::fs;

use log::info;
use redb::{Database, ReadableTable, TableDefinition};

use crate::schnorr;

use super::{ClientDatabase, Result};

const TABLE_NAME: &str = "keys";
const KEYS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new(TABLE_NAME);

const PRIVATE_KEY: &str = "private_key";
const PUBLIC_KEY: &str = "public_key";

/// Secret key and x-only public key (32 bytes each) of the local author.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Keys {
  pub private_key: Vec<u8>,
  pub public_key: Vec<u8>,
}

pub struct KeysTable {
  db: Database,
}

impl<'a> ClientDatabase<'a> for KeysTable {
  type K = &'a str;
  type V = &'a [u8];

  fn write_to_db(&self, k: Self::K, v: Self::V) -> Result<()> {
    let write_txn = self.db.begin_write()?;
    {
      let mut table = write_txn.open_table(KEYS_TABLE)?;
      table.insert(k, v)?;
    }
    write_txn.commit()?;
    Ok(())
  }

  fn remove_from_db(&self, k: Self::K) -> Result<()> {
    let write_txn = self.db.begin_write()?;
    {
      let mut table = write_txn.open_table(KEYS_TABLE)?;
      table.remove(k)?;
    }
    write_txn.commit()?;
    Ok(())
  }
}

impl KeysTable {
  /// Opens (or creates) `db/<name>.redb`, `db/keys.redb` by default.
  pub fn new(keys_table_name: Option<String>) -> Result<Self> {
    fs::create_dir_all("db/").map_err(redb::Error::Io)?;
    let table_name = keys_table_name.unwrap_or_else(|| TABLE_NAME.to_string());
    let db = Database::create(format!("db/{table_name}.redb"))?;

    {
      let write_txn = db.begin_write()?;
      write_txn.open_table(KEYS_TABLE)?; // this basically just creates the table if doesn't exist
      write_txn.commit()?;
    }

    Ok(Self { db })
  }

  pub fn get_client_keys(&self) -> Result<Option<Keys>> {
    let read_txn = self.db.begin_read()?;
    let table = read_txn.open_table(KEYS_TABLE)?;

    let private_key = table
      .get(PRIVATE_KEY)?
      .map(|private_key| private_key.value().to_vec())
      .unwrap_or_default();
    let public_key = table
      .get(PUBLIC_KEY)?
      .map(|public_key| public_key.value().to_vec())
      .unwrap_or_default();

    if private_key.is_empty() || public_key.is_empty() {
      return Ok(None);
    }

    Ok(Some(Keys {
      private_key,
      public_key,
    }))
  }

  /// Keys stored by a previous run, or a freshly generated pair that is
  /// stored for the next ones.
  pub fn get_or_create_client_keys(&self) -> Result<Keys> {
    if let Some(keys) = self.get_client_keys()? {
      return Ok(keys);
    }

    let generated = schnorr::generate_keys();
    let keys = Keys {
      private_key: generated.private_key.secret_bytes().to_vec(),
      public_key: generated
        .public_key
        .x_only_public_key()
        .0
        .serialize()
        .to_vec(),
    };

    self.write_to_db(PRIVATE_KEY, &keys.private_key)?;
    self.write_to_db(PUBLIC_KEY, &keys.public_key)?;
    info!("Generated new client keys");

    Ok(keys)
  }

  /// Forgets the stored keys; the next run generates new ones.
  pub fn reset(&self) -> Result<()> {
    self.remove_from_db(PRIVATE_KEY)?;
    self.remove_from_db(PUBLIC_KEY)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[cfg(test)]
  use pretty_assertions::assert_eq;

  struct Sut {
    keys_table: KeysTable,
    table_name: String,
  }

  impl Drop for Sut {
    fn drop(&mut self) {
      let _ = fs::remove_file(format!("db/{}.redb", self.table_name));
    }
  }

  impl Sut {
    fn new(table_name: &str) -> Sut {
      let _ = fs::remove_file(format!("db/{table_name}.redb"));
      Sut {
        keys_table: KeysTable::new(Some(table_name.to_string())).unwrap(),
        table_name: table_name.to_string(),
      }
    }
  }

  #[test]
  fn write_to_db() {
    let sut = Sut::new("keys_write_to_db");
    let private_key = vec![1u8, 2u8, 3u8, 4u8];
    let public_key = vec![0u8, 1u8, 2u8, 3u8];

    assert!(sut.keys_table.write_to_db(PRIVATE_KEY, &private_key).is_ok());
    assert!(sut.keys_table.write_to_db(PUBLIC_KEY, &public_key).is_ok());

    let keys = sut.keys_table.get_client_keys().unwrap();
    assert_eq!(
      keys,
      Some(Keys {
        private_key,
        public_key
      })
    );
  }

  #[test]
  fn half_stored_keys_are_no_keys() {
    let sut = Sut::new("keys_half_stored");

    sut.keys_table.write_to_db(PRIVATE_KEY, &[1u8, 2u8]).unwrap();

    assert_eq!(sut.keys_table.get_client_keys().unwrap(), None);
  }

  #[test]
  fn keys_are_generated_once() {
    let sut = Sut::new("keys_generated_once");

    let first = sut.keys_table.get_or_create_client_keys().unwrap();
    let second = sut.keys_table.get_or_create_client_keys().unwrap();

    assert_eq!(first, second);
    assert_eq!(first.private_key.len(), 32);
    assert_eq!(
      hex::encode(&first.public_key),
      schnorr::x_only_public_key_hex(&first.private_key).unwrap()
    );
  }

  #[test]
  fn reset_forgets_the_keys() {
    let sut = Sut::new("keys_reset");
    let first = sut.keys_table.get_or_create_client_keys().unwrap();

    sut.keys_table.reset().unwrap();
    assert_eq!(sut.keys_table.get_client_keys().unwrap(), None);

    let second = sut.keys_table.get_or_create_client_keys().unwrap();
    assert_ne!(first.private_key, second.private_key);
  }
}

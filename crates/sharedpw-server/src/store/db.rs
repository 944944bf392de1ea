use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use redb::{Database, ReadableTable, TableDefinition};
use tokio::time;
use tracing::{debug, info, warn};

use super::gateway::StoreGateway;
use super::model::{now, Secret};
use super::StoreError;

/// Where the gateway keeps its data.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Logical store (table) name, `$APPLICATION`.
    pub table: String,
    /// Locality selector, `$REGION`. Picks the database file inside `data_dir`.
    pub region: String,
    pub data_dir: PathBuf,
}

pub const DEFAULT_TABLE: &str = "sharedpw";
pub const DEFAULT_REGION: &str = "us-east-1";

impl StoreConfig {
    /// Read `APPLICATION` and `REGION` from the process environment.
    pub fn new(data_dir: PathBuf) -> Self {
        Self::from_lookup(data_dir, |key| std::env::var(key).ok())
    }

    pub fn from_lookup(data_dir: PathBuf, lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            table: lookup("APPLICATION").unwrap_or_else(|| DEFAULT_TABLE.into()),
            region: lookup("REGION").unwrap_or_else(|| DEFAULT_REGION.into()),
            data_dir,
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.redb", self.region))
    }
}

/// Store gateway over an embedded redb database.
///
/// The database file is opened on first use, so a bad data directory shows up
/// as a `StoreError` from the first call rather than at construction.
#[derive(Clone)]
pub struct RedbGateway {
    config: Arc<StoreConfig>,
    db: Arc<Mutex<Option<Arc<Database>>>>,
}

impl RedbGateway {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config: Arc::new(config),
            db: Arc::new(Mutex::new(None)),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn table(&self) -> TableDefinition<'_, &'static str, &'static [u8]> {
        TableDefinition::new(&self.config.table)
    }

    fn database(&self) -> Result<Arc<Database>, StoreError> {
        let mut slot = self.db.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(db) = slot.as_ref() {
            return Ok(Arc::clone(db));
        }

        let path = self.config.db_path();
        let db = Database::create(&path)?;
        let write_txn = db.begin_write()?;
        write_txn.open_table(self.table())?;
        write_txn.commit()?;
        info!(path = %path.display(), table = %self.config.table, "opened store");

        let db = Arc::new(db);
        *slot = Some(Arc::clone(&db));
        Ok(db)
    }

    /// Remove all records past their expiry. Returns how many were dropped.
    pub fn prune(&self) -> Result<usize, StoreError> {
        let db = self.database()?;
        let now = now();

        // Collect expired keys in a read pass first.
        let expired: Vec<String> = {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(self.table())?;
            let mut keys = Vec::new();
            for item in table.iter()? {
                let (k, v) = item?;
                if decode(v.value())?.is_expired(now) {
                    keys.push(k.value().to_owned());
                }
            }
            keys
        };

        if expired.is_empty() {
            return Ok(0);
        }

        let removed = self.remove_expired(&db, &expired, now)?;
        info!(removed, "pruned expired secrets");
        Ok(removed)
    }

    /// Remove each of `keys` that is still expired under the write lock. A
    /// key may have been replaced or taken since it was collected.
    fn remove_expired(
        &self,
        db: &Database,
        keys: &[String],
        now: i64,
    ) -> Result<usize, StoreError> {
        let write_txn = db.begin_write()?;
        let mut removed = 0;
        {
            let mut table = write_txn.open_table(self.table())?;
            for key in keys {
                let still_expired = match table.get(key.as_str())? {
                    Some(guard) => decode(guard.value())?.is_expired(now),
                    None => false,
                };
                if still_expired {
                    table.remove(key.as_str())?;
                    removed += 1;
                }
            }
        }
        write_txn.commit()?;
        Ok(removed)
    }

    /// Spawn a background Tokio task that calls `prune()` every `interval`.
    pub fn spawn_sweep(self, interval: Duration) {
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.tick().await; // skip first immediate tick
            loop {
                ticker.tick().await;
                if let Err(e) = self.prune() {
                    warn!(error = %e, "background sweep error");
                }
            }
        });
    }
}

impl StoreGateway for RedbGateway {
    fn put(&self, secret: &Secret) -> Result<(), StoreError> {
        if secret.id.is_empty() {
            return Err(StoreError::Unavailable("empty partition key".into()));
        }
        let db = self.database()?;
        let bytes = encode(secret)?;
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(self.table())?;
            table.insert(secret.id.as_str(), bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn query(&self, id: &str) -> Result<Vec<Secret>, StoreError> {
        let db = self.database()?;
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(self.table())?;

        let raw_bytes: Option<Vec<u8>> = table.get(id)?.map(|guard| guard.value().to_vec());
        match raw_bytes {
            None => Ok(Vec::new()),
            Some(bytes) => {
                let secret = decode(&bytes)?;
                // Expired records stay invisible until the sweep removes them.
                if secret.is_expired(now()) {
                    return Ok(Vec::new());
                }
                Ok(vec![secret])
            }
        }
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        let db = self.database()?;
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(self.table())?;
            table.remove(id)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn take(&self, id: &str) -> Result<Option<Secret>, StoreError> {
        let db = self.database()?;

        // redb allows a single writer at a time, so remove-and-return inside
        // one write transaction hands the record to exactly one caller.
        let write_txn = db.begin_write()?;
        let raw_bytes: Option<Vec<u8>> = {
            let mut table = write_txn.open_table(self.table())?;
            let removed = table.remove(id)?.map(|guard| guard.value().to_vec());
            removed
        };
        write_txn.commit()?;

        match raw_bytes {
            None => Ok(None),
            Some(bytes) => {
                let secret = decode(&bytes)?;
                if secret.is_expired(now()) {
                    debug!("take found an expired record");
                    return Ok(None);
                }
                Ok(Some(secret))
            }
        }
    }
}

fn encode(secret: &Secret) -> Result<Vec<u8>, StoreError> {
    Ok(bincode::serde::encode_to_vec(
        secret,
        bincode::config::standard(),
    )?)
}

fn decode(bytes: &[u8]) -> Result<Secret, StoreError> {
    let (secret, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
    Ok(secret)
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;
    use std::thread;

    use super::*;
    use tempfile::tempdir;

    fn make_gateway() -> (RedbGateway, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let config = StoreConfig {
            table: "sharedpw".into(),
            region: "us-east-1".into(),
            data_dir: dir.path().to_owned(),
        };
        (RedbGateway::new(config), dir)
    }

    fn record(id: &str, expire_at: i64) -> Secret {
        let mut s = Secret::new().unwrap();
        s.id = id.into();
        s.expire_at = expire_at;
        s.payload = "c2VjcmV0".into();
        s
    }

    #[test]
    fn put_query_delete() {
        let (gw, _dir) = make_gateway();
        let s = record("0123456789abcdef", now() + 3600);
        gw.put(&s).unwrap();
        assert_eq!(gw.query("0123456789abcdef").unwrap(), vec![s]);
        gw.delete("0123456789abcdef").unwrap();
        assert!(gw.query("0123456789abcdef").unwrap().is_empty());
    }

    #[test]
    fn delete_missing_key_is_not_an_error() {
        let (gw, _dir) = make_gateway();
        gw.delete("ffffffffffffffff").unwrap();
    }

    #[test]
    fn expired_records_are_invisible() {
        let (gw, _dir) = make_gateway();
        gw.put(&record("aaaaaaaaaaaaaaaa", now() - 1)).unwrap();
        assert!(gw.query("aaaaaaaaaaaaaaaa").unwrap().is_empty());
        assert!(gw.take("aaaaaaaaaaaaaaaa").unwrap().is_none());
    }

    #[test]
    fn prune_removes_only_expired() {
        let (gw, _dir) = make_gateway();
        gw.put(&record("aaaaaaaaaaaaaaaa", now() - 1)).unwrap();
        gw.put(&record("bbbbbbbbbbbbbbbb", now() + 3600)).unwrap();
        assert_eq!(gw.prune().unwrap(), 1);
        assert_eq!(gw.prune().unwrap(), 0);
        assert_eq!(gw.query("bbbbbbbbbbbbbbbb").unwrap().len(), 1);
    }

    #[test]
    fn prune_counts_only_records_it_removed() {
        let (gw, _dir) = make_gateway();
        gw.put(&record("aaaaaaaaaaaaaaaa", now() - 1)).unwrap();
        gw.put(&record("bbbbbbbbbbbbbbbb", now() + 3600)).unwrap();
        let db = gw.database().unwrap();

        // Keys collected as expired, then refreshed or taken before removal.
        let keys = vec![
            "aaaaaaaaaaaaaaaa".to_owned(),
            "bbbbbbbbbbbbbbbb".to_owned(),
            "cccccccccccccccc".to_owned(),
        ];
        assert_eq!(gw.remove_expired(&db, &keys, now()).unwrap(), 1);
        assert_eq!(gw.query("bbbbbbbbbbbbbbbb").unwrap().len(), 1);
    }

    #[test]
    fn take_returns_record_once() {
        let (gw, _dir) = make_gateway();
        let s = record("0123456789abcdef", now() + 3600);
        gw.put(&s).unwrap();
        assert_eq!(gw.take("0123456789abcdef").unwrap(), Some(s));
        assert_eq!(gw.take("0123456789abcdef").unwrap(), None);
    }

    #[test]
    fn concurrent_takes_have_one_winner() {
        let (gw, _dir) = make_gateway();
        gw.put(&record("0123456789abcdef", now() + 3600)).unwrap();

        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gw = gw.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    gw.take("0123456789abcdef").unwrap().is_some()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn region_selects_database_file() {
        let (gw, dir) = make_gateway();
        gw.put(&record("0123456789abcdef", now() + 3600)).unwrap();
        assert!(dir.path().join("us-east-1.redb").exists());
    }

    #[test]
    fn store_config_defaults_when_env_unset() {
        let cfg = StoreConfig::from_lookup(PathBuf::from("/data"), |_| None);
        assert_eq!(cfg.table, "sharedpw");
        assert_eq!(cfg.region, "us-east-1");
        assert_eq!(cfg.db_path(), PathBuf::from("/data/us-east-1.redb"));
    }

    #[test]
    fn store_config_env_overrides_defaults() {
        let cfg = StoreConfig::from_lookup(PathBuf::from("/data"), |key| match key {
            "APPLICATION" => Some("vault".into()),
            "REGION" => Some("eu-west-2".into()),
            _ => None,
        });
        assert_eq!(cfg.table, "vault");
        assert_eq!(cfg.region, "eu-west-2");
        assert_eq!(cfg.db_path(), PathBuf::from("/data/eu-west-2.redb"));
    }

    #[test]
    fn unusable_data_dir_fails_on_first_use() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();
        let gw = RedbGateway::new(StoreConfig {
            table: "sharedpw".into(),
            region: "us-east-1".into(),
            data_dir: file,
        });
        assert!(gw.query("0123456789abcdef").is_err());
    }
}

//! Durable client-side key-value storage.
//!
//! Plays the part a browser's local storage plays for a web client: string
//! values under string keys, surviving restarts. Backed by a single SQLite
//! table so that multi-key writes can be made atomic.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use time::OffsetDateTime;

use crate::config::{ConfigPaths, StorageOptions};

mod schema;

#[derive(Clone)]
pub struct StorageHandle {
    db_path: Arc<PathBuf>,
    options: Arc<StorageOptions>,
}

impl std::fmt::Debug for StorageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageHandle")
            .field("db_path", &self.db_path)
            .finish_non_exhaustive()
    }
}

impl StorageHandle {
    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&*self.db_path)
            .with_context(|| format!("opening database {}", self.db_path.display()))?;
        prepare_connection(&conn, &self.options)?;
        Ok(conn)
    }

    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.connect()?;
        f(&conn)
    }

    pub fn get_item(&self, key: &str) -> Result<Option<String>> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("reading key {key}"))
        })
    }

    pub fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.set_items(&[(key, value)])
    }

    /// Writes every pair or none of them.
    pub fn set_items(&self, items: &[(&str, &str)]) -> Result<()> {
        self.with_connection(|conn| {
            let tx = conn
                .unchecked_transaction()
                .context("starting key-value transaction")?;
            let now = OffsetDateTime::now_utc().unix_timestamp();
            for (key, value) in items {
                tx.execute(
                    "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                                    updated_at = excluded.updated_at",
                    params![key, value, now],
                )
                .with_context(|| format!("writing key {key}"))?;
            }
            tx.commit().context("committing key-value transaction")?;
            Ok(())
        })
    }

    pub fn remove_item(&self, key: &str) -> Result<bool> {
        Ok(self.remove_items(&[key])? > 0)
    }

    /// Removes every listed key in one transaction; returns how many existed.
    pub fn remove_items(&self, keys: &[&str]) -> Result<usize> {
        self.with_connection(|conn| {
            let tx = conn
                .unchecked_transaction()
                .context("starting key-value transaction")?;
            let mut removed = 0;
            for key in keys {
                removed += tx
                    .execute("DELETE FROM kv_store WHERE key = ?1", params![key])
                    .with_context(|| format!("removing key {key}"))?;
            }
            tx.commit().context("committing key-value transaction")?;
            Ok(removed)
        })
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare("SELECT key FROM kv_store ORDER BY key")?;
            let keys = stmt
                .query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()
                .context("listing keys")?;
            Ok(keys)
        })
    }
}

pub fn init(paths: &ConfigPaths, storage: &StorageOptions) -> Result<StorageHandle> {
    let db_path = if storage.database_path.as_os_str().is_empty() {
        &paths.database_path
    } else {
        &storage.database_path
    };
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating data directory {}", parent.display()))?;
    }
    let conn = Connection::open(db_path)
        .with_context(|| format!("opening database {}", db_path.display()))?;
    prepare_connection(&conn, storage)?;
    schema::apply(&conn)?;
    tracing::debug!(path = %db_path.display(), "client storage ready");
    Ok(StorageHandle {
        db_path: Arc::new(db_path.clone()),
        options: Arc::new(storage.clone()),
    })
}

fn prepare_connection(conn: &Connection, storage: &StorageOptions) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")
        .context("setting journal_mode=WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("setting synchronous=NORMAL")?;
    conn.pragma_update(
        None,
        "wal_autocheckpoint",
        storage.wal_autocheckpoint.to_string(),
    )
    .context("setting wal_autocheckpoint")?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    pub(crate) fn init_storage() -> anyhow::Result<(TempDir, StorageHandle)> {
        let temp = TempDir::new()?;
        let paths = ConfigPaths::rooted_at(temp.path());
        let mut options = StorageOptions::default();
        options.database_path = paths.database_path.clone();
        let storage = init(&paths, &options)?;
        Ok((temp, storage))
    }

    #[test]
    fn set_get_and_overwrite_item() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        assert_eq!(storage.get_item("greeting")?, None);
        storage.set_item("greeting", "hello")?;
        storage.set_item("greeting", "hi")?;
        assert_eq!(storage.get_item("greeting")?.as_deref(), Some("hi"));
        Ok(())
    }

    #[test]
    fn values_survive_reopening() -> anyhow::Result<()> {
        let (temp, storage) = init_storage()?;
        storage.set_items(&[("a", "1"), ("b", "2")])?;
        drop(storage);

        let paths = ConfigPaths::rooted_at(temp.path());
        let mut options = StorageOptions::default();
        options.database_path = paths.database_path.clone();
        let reopened = init(&paths, &options)?;
        assert_eq!(reopened.keys()?, vec!["a".to_string(), "b".to_string()]);
        Ok(())
    }

    #[test]
    fn remove_items_reports_existing_keys_only() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        storage.set_items(&[("token", "t"), ("user", "{}")])?;
        assert_eq!(storage.remove_items(&["token", "user", "missing"])?, 2);
        assert!(!storage.remove_item("token")?);
        assert!(storage.keys()?.is_empty());
        Ok(())
    }
}

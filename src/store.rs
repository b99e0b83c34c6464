// src/store.rs
//! String-keyed JSON document storage.
//!
//! Every service keeps its aggregates under `<prefix><id>` keys. Two backends
//! exist: [`PgStore`], a `documents` table with a `JSONB` column, and
//! [`MemoryStore`], which lives and dies with the process.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt::Display;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sqlx::{PgPool, Row};
use thiserror::Error;
use tokio::sync::RwLock;

pub const VOTES_PREFIX: &str = "votes:";
pub const POLLS_PREFIX: &str = "polls:";
pub const VOTERS_PREFIX: &str = "voters:";

pub fn key_for(prefix: &str, id: impl Display) -> String {
    format!("{prefix}{id}")
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no document stored under {key}")]
    NotFound { key: String },

    #[error("a document is already stored under {key}")]
    AlreadyExists { key: String },

    #[error("store backend error: {0}")]
    Backend(String),

    #[error("document under {key} could not be (de)serialized: {source}")]
    Codec {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Value, StoreError>;
    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;
    /// Store `value` only if `key` is free, otherwise [`StoreError::AlreadyExists`].
    async fn create(&self, key: &str, value: Value) -> Result<(), StoreError>;
    /// Fails with [`StoreError::NotFound`] when nothing was stored under `key`.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
    /// Keys starting with `prefix`, in ascending key order.
    async fn list_keys_by_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

pub async fn get_json<T: DeserializeOwned>(
    store: &dyn RecordStore,
    key: &str,
) -> Result<T, StoreError> {
    let value = store.get(key).await?;
    serde_json::from_value(value).map_err(|source| StoreError::Codec {
        key: key.to_string(),
        source,
    })
}

pub async fn set_json<T: Serialize + Sync>(
    store: &dyn RecordStore,
    key: &str,
    item: &T,
) -> Result<(), StoreError> {
    let value = serde_json::to_value(item).map_err(|source| StoreError::Codec {
        key: key.to_string(),
        source,
    })?;
    store.set(key, value).await
}

pub async fn create_json<T: Serialize + Sync>(
    store: &dyn RecordStore,
    key: &str,
    item: &T,
) -> Result<(), StoreError> {
    let value = serde_json::to_value(item).map_err(|source| StoreError::Codec {
        key: key.to_string(),
        source,
    })?;
    store.create(key, value).await
}

/// Whether anything is stored under `key`. Backend failures are not folded into `false`.
pub async fn exists(store: &dyn RecordStore, key: &str) -> Result<bool, StoreError> {
    match store.get(key).await {
        Ok(_) => Ok(true),
        Err(StoreError::NotFound { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Load every document whose key starts with `prefix`.
pub async fn load_all<T: DeserializeOwned>(
    store: &dyn RecordStore,
    prefix: &str,
) -> Result<Vec<T>, StoreError> {
    let mut items = Vec::new();
    for key in store.list_keys_by_prefix(prefix).await? {
        match get_json(store, &key).await {
            Ok(item) => items.push(item),
            // deleted between the scan and the read
            Err(StoreError::NotFound { .. }) => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(items)
}

// --- Postgres ---

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn like_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[async_trait]
impl RecordStore for PgStore {
    async fn get(&self, key: &str) -> Result<Value, StoreError> {
        let row = sqlx::query("SELECT value FROM documents WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(row.try_get::<Value, _>("value")?),
            None => Err(StoreError::NotFound {
                key: key.to_string(),
            }),
        }
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO documents (key, value, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (key) DO UPDATE
            SET value = EXCLUDED.value, updated_at = now()
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn create(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO documents (key, value, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (key) DO NOTHING
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::AlreadyExists {
                key: key.to_string(),
            });
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM documents WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                key: key.to_string(),
            });
        }
        Ok(())
    }

    async fn list_keys_by_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query("SELECT key FROM documents WHERE key LIKE $1 ORDER BY key")
            .bind(like_pattern(prefix))
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("key").map_err(StoreError::from))
            .collect()
    }
}

// --- Memory ---

#[derive(Default)]
pub struct MemoryStore {
    documents: RwLock<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Value, StoreError> {
        self.documents
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                key: key.to_string(),
            })
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.documents.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn create(&self, key: &str, value: Value) -> Result<(), StoreError> {
        match self.documents.write().await.entry(key.to_string()) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists {
                key: key.to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(value);
                Ok(())
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        match self.documents.write().await.remove(key) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound {
                key: key.to_string(),
            }),
        }
    }

    async fn list_keys_by_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .documents
            .read()
            .await
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }
}

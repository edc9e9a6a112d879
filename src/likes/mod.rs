mod fallback;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::params;
use rusqlite::types::Type;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{Config, FallbackKind};
use crate::db::models::LikeRecord;
use crate::db::DocumentStore;
use crate::posts::RepositoryError;

pub use self::fallback::{FallbackError, FallbackStore, FileFallback, MemoryFallback};

/// Owner recorded on like records saved without a signed-in user.
pub const ANONYMOUS_USER: &str = "anonymous";

/// Only produced when saves are configured as strict; the default adapter
/// absorbs every backend failure.
#[derive(Debug, Error)]
pub enum LikeSaveError {
    #[error("Document store is not configured")]
    BackendUnavailable,

    #[error("Backend write failed: {0}")]
    Backend(String),
}

#[async_trait]
pub trait LikePersistence: Send + Sync {
    /// The saved liked flag, or `None` when nothing is known.
    async fn load_like(&self, photo_id: &str, user_id: Option<&str>) -> Option<bool>;

    async fn save_like(
        &self,
        photo_id: &str,
        liked: bool,
        user_id: Option<&str>,
    ) -> Result<(), LikeSaveError>;
}

pub type DynLikePersistence = Arc<dyn LikePersistence>;

/// Primary key of a like record: per-user when a user is known, shared
/// otherwise.
pub fn like_key(photo_id: &str, user_id: Option<&str>) -> String {
    match user_id {
        Some(uid) => format!("{}_{}", photo_id, uid),
        None => photo_id.to_string(),
    }
}

/// Fallback cache key. Not user-scoped: users sharing a device overwrite each
/// other's entry.
pub fn fallback_key(photo_id: &str) -> String {
    format!("like_{}", photo_id)
}

/// Document store first, local fallback second.
pub struct LikeAdapter {
    store: DocumentStore,
    fallback: Option<Arc<dyn FallbackStore>>,
    strict: bool,
}

impl LikeAdapter {
    pub fn new(store: DocumentStore, fallback: Option<Arc<dyn FallbackStore>>) -> Self {
        Self {
            store,
            fallback,
            strict: false,
        }
    }

    /// Surface backend save failures instead of absorbing them.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Build the adapter from the `[likes]` config section.
    pub fn from_config(store: DocumentStore, config: &Config, data_dir: &std::path::Path) -> Self {
        let fallback: Option<Arc<dyn FallbackStore>> = match config.likes.fallback {
            FallbackKind::Memory => Some(Arc::new(MemoryFallback::new())),
            FallbackKind::File => match FileFallback::open(data_dir) {
                Ok(store) => Some(Arc::new(store)),
                Err(e) => {
                    tracing::warn!("Local fallback store unavailable: {}", e);
                    None
                }
            },
            FallbackKind::None => None,
        };

        Self::new(store, fallback).strict(config.likes.strict_saves)
    }

    fn record_from_store(
        &self,
        photo_id: &str,
        user_id: Option<&str>,
    ) -> Result<Option<LikeRecord>, RepositoryError> {
        let pool = self.store.pool().ok_or(RepositoryError::BackendUnavailable)?;
        let conn = pool.get()?;

        let result = conn.query_row(
            "SELECT id, photo_id, user_id, liked, updated_at FROM likes WHERE id = ?1",
            params![like_key(photo_id, user_id)],
            |row| {
                let updated_at: String = row.get(4)?;
                let updated_at = DateTime::parse_from_rfc3339(&updated_at)
                    .map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e))
                    })?
                    .with_timezone(&Utc);

                Ok(LikeRecord {
                    id: row.get(0)?,
                    photo_id: row.get(1)?,
                    user_id: row.get(2)?,
                    liked: row.get(3)?,
                    updated_at,
                })
            },
        );

        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save_to_store(
        &self,
        photo_id: &str,
        liked: bool,
        user_id: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let pool = self.store.pool().ok_or(RepositoryError::BackendUnavailable)?;
        let conn = pool.get()?;

        conn.execute(
            "INSERT INTO likes (id, photo_id, user_id, liked, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
               liked = excluded.liked,
               user_id = excluded.user_id,
               updated_at = excluded.updated_at",
            params![
                like_key(photo_id, user_id),
                photo_id,
                user_id.unwrap_or(ANONYMOUS_USER),
                liked,
                Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            ],
        )?;

        Ok(())
    }

    fn load_from_fallback(&self, photo_id: &str) -> Option<bool> {
        let fallback = self.fallback.as_ref()?;
        match fallback.get(&fallback_key(photo_id)) {
            Ok(Some(value)) => match value.parse::<bool>() {
                Ok(liked) => Some(liked),
                Err(_) => {
                    tracing::warn!("Ignoring malformed fallback like for {}: {:?}", photo_id, value);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Fallback read failed for {}: {}", photo_id, e);
                None
            }
        }
    }

    fn mirror_to_fallback(&self, photo_id: &str, liked: bool) {
        if let Some(fallback) = &self.fallback {
            if let Err(e) = fallback.set(&fallback_key(photo_id), &liked.to_string()) {
                tracing::warn!("Fallback write failed for {}: {}", photo_id, e);
            }
        }
    }
}

#[async_trait]
impl LikePersistence for LikeAdapter {
    async fn load_like(&self, photo_id: &str, user_id: Option<&str>) -> Option<bool> {
        match self.record_from_store(photo_id, user_id) {
            Ok(record) => record.map(|r| r.liked),
            Err(e) => {
                tracing::warn!("Loading like for {} from store failed: {}", photo_id, e);
                self.load_from_fallback(photo_id)
            }
        }
    }

    async fn save_like(
        &self,
        photo_id: &str,
        liked: bool,
        user_id: Option<&str>,
    ) -> Result<(), LikeSaveError> {
        let stored = self.save_to_store(photo_id, liked, user_id);

        // Mirrored whether or not the store write succeeded
        self.mirror_to_fallback(photo_id, liked);

        match stored {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!("Saving like for {} to store failed: {}", photo_id, e);
                if !self.strict {
                    return Ok(());
                }
                match e {
                    RepositoryError::BackendUnavailable => Err(LikeSaveError::BackendUnavailable),
                    other => Err(LikeSaveError::Backend(other.to_string())),
                }
            }
        }
    }
}

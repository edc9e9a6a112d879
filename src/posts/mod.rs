// Post repository - creates and lists posts newest-first
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::params;
use rusqlite::types::Type;
use std::sync::Arc;
use thiserror::Error;

use crate::db::models::{NewPost, Post};
use crate::db::DocumentStore;

pub const DEFAULT_FEED_LIMIT: usize = 10;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Document store is not configured")]
    BackendUnavailable,

    #[error("Database error: {0}")]
    Database(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),
}

#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Store a new post, assigning its id and creation time.
    async fn create(&self, post: NewPost) -> Result<Post, RepositoryError>;

    /// At most `limit` posts, newest first.
    async fn list(&self, limit: usize) -> Result<Vec<Post>, RepositoryError>;

    /// Every post owned by `user_id`, newest first.
    async fn list_by_user(&self, user_id: &str) -> Result<Vec<Post>, RepositoryError>;
}

pub type DynPostRepository = Arc<dyn PostRepository>;

/// SQLite implementation
pub struct SqlitePostRepository {
    store: DocumentStore,
}

impl SqlitePostRepository {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }

    fn query(&self, limit: Option<usize>) -> Result<Vec<Post>, RepositoryError> {
        let pool = self.store.pool().ok_or(RepositoryError::BackendUnavailable)?;
        let conn = pool.get()?;

        // SQLite treats a negative LIMIT as unbounded
        let limit = limit.map(|l| l as i64).unwrap_or(-1);

        let mut stmt = conn.prepare(
            "SELECT id, image_src, photographer_name, username, avatar_src, caption,
                    likes, comments, created_at, user_id
             FROM posts
             ORDER BY created_at DESC, seq DESC
             LIMIT ?1",
        )?;

        let posts = stmt
            .query_map(params![limit], |row| {
                let created_at: String = row.get(8)?;
                let created_at = DateTime::parse_from_rfc3339(&created_at)
                    .map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(8, Type::Text, Box::new(e))
                    })?
                    .with_timezone(&Utc);

                Ok(Post {
                    id: row.get(0)?,
                    image_src: row.get(1)?,
                    photographer_name: row.get(2)?,
                    username: row.get(3)?,
                    avatar_src: row.get(4)?,
                    caption: row.get(5)?,
                    likes: row.get(6)?,
                    comments: row.get(7)?,
                    created_at,
                    user_id: row.get(9)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(posts)
    }
}

#[async_trait]
impl PostRepository for SqlitePostRepository {
    async fn create(&self, post: NewPost) -> Result<Post, RepositoryError> {
        let pool = self.store.pool().ok_or(RepositoryError::BackendUnavailable)?;
        let conn = pool.get()?;

        let id = uuid::Uuid::now_v7().to_string();
        // Stored at microsecond precision
        let created_at = Utc::now().trunc_subsecs(6);

        conn.execute(
            "INSERT INTO posts (id, image_src, photographer_name, username, avatar_src,
                                caption, likes, comments, created_at, user_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                id,
                post.image_src,
                post.photographer_name,
                post.username,
                post.avatar_src,
                post.caption,
                post.likes,
                post.comments,
                timestamp(&created_at),
                post.user_id,
            ],
        )?;

        tracing::info!("Created post {} for user '{}'", id, post.user_id);

        Ok(Post {
            id,
            image_src: post.image_src,
            photographer_name: post.photographer_name,
            username: post.username,
            avatar_src: post.avatar_src,
            caption: post.caption,
            likes: post.likes,
            comments: post.comments,
            created_at,
            user_id: post.user_id,
        })
    }

    async fn list(&self, limit: usize) -> Result<Vec<Post>, RepositoryError> {
        self.query(Some(limit))
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<Post>, RepositoryError> {
        // No index-level filter: fetch everything and keep the owner's posts
        let posts = self.query(None)?;
        Ok(posts.into_iter().filter(|p| p.user_id == user_id).collect())
    }
}

/// Fixed-width RFC 3339 so lexical order in SQLite matches time order.
fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn new_post(caption: &str, user_id: &str) -> NewPost {
        NewPost {
            image_src: "/monochrome-street-scene.png".to_string(),
            photographer_name: "Jordan Lee".to_string(),
            username: "jordanlee".to_string(),
            avatar_src: "/portrait-avatar.png".to_string(),
            caption: caption.to_string(),
            likes: 0,
            comments: 0,
            user_id: user_id.to_string(),
        }
    }

    fn create_test_repo() -> SqlitePostRepository {
        let pool = db::memory_pool().unwrap();
        SqlitePostRepository::new(DocumentStore::Configured(pool))
    }

    #[tokio::test]
    async fn test_create_assigns_id_and_timestamp() {
        let repo = create_test_repo();
        let before = Utc::now();

        let post = repo.create(new_post("Angles and light.", "u1")).await.unwrap();

        assert!(!post.id.is_empty());
        assert!(post.created_at >= before.trunc_subsecs(6));
        assert_eq!(post.caption, "Angles and light.");

        let listed = repo.list(DEFAULT_FEED_LIMIT).await.unwrap();
        assert_eq!(listed, vec![post]);
    }

    #[tokio::test]
    async fn test_create_ids_are_unique() {
        let repo = create_test_repo();
        let a = repo.create(new_post("a", "u1")).await.unwrap();
        let b = repo.create(new_post("b", "u1")).await.unwrap();
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn test_list_returns_newest_first_within_limit() {
        let repo = create_test_repo();
        for caption in ["first", "second", "third"] {
            repo.create(new_post(caption, "u1")).await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        let posts = repo.list(2).await.unwrap();
        let captions: Vec<&str> = posts.iter().map(|p| p.caption.as_str()).collect();
        assert_eq!(captions, vec!["third", "second"]);
        assert!(posts[0].created_at > posts[1].created_at);
    }

    #[tokio::test]
    async fn test_list_by_user_filters_and_orders() {
        let repo = create_test_repo();
        repo.create(new_post("ava 1", "ava")).await.unwrap();
        repo.create(new_post("sam 1", "sam")).await.unwrap();
        repo.create(new_post("ava 2", "ava")).await.unwrap();

        let posts = repo.list_by_user("ava").await.unwrap();
        let captions: Vec<&str> = posts.iter().map(|p| p.caption.as_str()).collect();
        assert_eq!(captions, vec!["ava 2", "ava 1"]);
        assert!(posts.iter().all(|p| p.user_id == "ava"));

        assert!(repo.list_by_user("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_by_user_is_not_limited() {
        let repo = create_test_repo();
        for i in 0..(DEFAULT_FEED_LIMIT + 3) {
            repo.create(new_post(&format!("post {}", i), "u1")).await.unwrap();
        }
        let posts = repo.list_by_user("u1").await.unwrap();
        assert_eq!(posts.len(), DEFAULT_FEED_LIMIT + 3);
    }

    #[tokio::test]
    async fn test_unconfigured_store_is_backend_unavailable() {
        let repo = SqlitePostRepository::new(DocumentStore::Unconfigured);

        let err = repo.create(new_post("x", "u1")).await.unwrap_err();
        assert!(matches!(err, RepositoryError::BackendUnavailable));

        let err = repo.list(DEFAULT_FEED_LIMIT).await.unwrap_err();
        assert!(matches!(err, RepositoryError::BackendUnavailable));

        let err = repo.list_by_user("u1").await.unwrap_err();
        assert!(matches!(err, RepositoryError::BackendUnavailable));
    }
}

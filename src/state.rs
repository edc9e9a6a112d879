use std::path::{Path, PathBuf};
use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::Config;
use crate::db::DocumentStore;
use crate::identity::{IdentityClient, IdentitySession};
use crate::interaction::InteractionController;
use crate::likes::LikeAdapter;
use crate::posts::{DynPostRepository, SqlitePostRepository};

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub uploads_dir: PathBuf,
    pub posts: DynPostRepository,
    pub session: Arc<IdentitySession>,
    pub interactions: Arc<InteractionController>,
}

impl AppState {
    /// Wire every component from config. Starts the identity session, so it
    /// must run inside a Tokio runtime.
    pub fn build(config: Config, data_dir: &Path) -> anyhow::Result<Self> {
        let store = DocumentStore::from_config(&config)?;
        let likes = LikeAdapter::from_config(store.clone(), &config, data_dir);
        let session = IdentitySession::start(IdentityClient::from_config(&config)?);

        Ok(Self::from_parts(
            config,
            Arc::new(SqlitePostRepository::new(store)),
            Arc::new(likes),
            session,
        ))
    }

    pub fn from_parts(
        config: Config,
        posts: DynPostRepository,
        likes: crate::likes::DynLikePersistence,
        session: Arc<IdentitySession>,
    ) -> Self {
        let interactions = Arc::new(InteractionController::new(likes, session.clone()));
        Self {
            uploads_dir: config.uploads_path(),
            config,
            posts,
            session,
            interactions,
        }
    }

    /// Tear down in reverse order of construction.
    pub async fn shutdown(&self) {
        self.interactions.shutdown().await;
        self.session.shutdown();
    }
}

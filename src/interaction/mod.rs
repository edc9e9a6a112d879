// Per-post optimistic like/comment state
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::db::models::Post;
use crate::identity::IdentitySession;
use crate::likes::DynLikePersistence;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InteractionError {
    #[error("Post {0} is not mounted")]
    NotMounted(String),

    #[error("A like toggle is already in flight for post {0}")]
    ToggleInFlight(String),
}

/// What is known about the viewer's like on a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeStatus {
    /// The initial load has not completed.
    Unknown,
    /// The load completed and nothing was ever saved.
    Absent,
    Resolved(bool),
}

/// Display cache for one mounted post. Never the source of truth.
#[derive(Debug)]
struct InteractionState {
    status: LikeStatus,
    like_count: u32,
    comment_count: u32,
    composer_open: bool,
    comment_text: String,
    toggle_in_flight: bool,
    /// User the current like status was loaded for.
    loaded_for: Option<String>,
    cancel: CancellationToken,
}

impl InteractionState {
    fn from_post(post: &Post, user_id: Option<String>) -> Self {
        Self {
            status: LikeStatus::Unknown,
            like_count: post.likes,
            comment_count: post.comments,
            composer_open: false,
            comment_text: String::new(),
            toggle_in_flight: false,
            loaded_for: user_id,
            cancel: CancellationToken::new(),
        }
    }

    fn liked(&self) -> bool {
        matches!(self.status, LikeStatus::Resolved(true))
    }

    fn view(&self, post_id: &str) -> InteractionView {
        InteractionView {
            post_id: post_id.to_string(),
            liked: self.liked(),
            like_count: self.like_count,
            comment_count: self.comment_count,
            composer_open: self.composer_open,
            comment_text: self.comment_text.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InteractionView {
    pub post_id: String,
    pub liked: bool,
    pub like_count: u32,
    pub comment_count: u32,
    pub composer_open: bool,
    pub comment_text: String,
}

type StateMap = Arc<Mutex<HashMap<String, InteractionState>>>;

/// Owns the interaction state of every mounted post and reconciles it with
/// persisted like records.
///
/// The state lock is never held across a persistence call. Every mounted post
/// carries a cancellation token; unmounting cancels it so late load results
/// are dropped instead of applied.
pub struct InteractionController {
    likes: DynLikePersistence,
    session: Arc<IdentitySession>,
    posts: StateMap,
}

impl InteractionController {
    pub fn new(likes: DynLikePersistence, session: Arc<IdentitySession>) -> Self {
        Self {
            likes,
            session,
            posts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start tracking `post` and load its like status in the background.
    ///
    /// Returns the load task, or `None` when the post is already mounted for
    /// the current user. A mounted post is reloaded when the signed-in user
    /// has changed since its last load, unless a toggle is in flight.
    pub async fn mount(&self, post: &Post) -> Option<JoinHandle<()>> {
        let user_id = self.session.current_user_id();

        let token = {
            let mut posts = self.posts.lock().await;
            match posts.get_mut(&post.id) {
                Some(state) if state.loaded_for == user_id || state.toggle_in_flight => {
                    return None;
                }
                Some(state) => {
                    tracing::debug!("Reloading like for {} after user change", post.id);
                    state.cancel.cancel();
                    state.cancel = CancellationToken::new();
                    // The previous user's optimistic adjustment is not theirs
                    state.status = LikeStatus::Unknown;
                    state.like_count = post.likes;
                    state.loaded_for = user_id.clone();
                    state.cancel.clone()
                }
                None => {
                    let state = InteractionState::from_post(post, user_id.clone());
                    let token = state.cancel.clone();
                    posts.insert(post.id.clone(), state);
                    token
                }
            }
        };

        Some(self.spawn_load(post.id.clone(), user_id, token))
    }

    fn spawn_load(
        &self,
        post_id: String,
        user_id: Option<String>,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let likes = self.likes.clone();
        let posts = self.posts.clone();

        tokio::spawn(async move {
            let saved = tokio::select! {
                _ = token.cancelled() => return,
                saved = likes.load_like(&post_id, user_id.as_deref()) => saved,
            };

            let mut posts = posts.lock().await;
            if token.is_cancelled() {
                return;
            }
            let Some(state) = posts.get_mut(&post_id) else {
                return;
            };

            // A toggle that beat the load decided the state already
            if state.status != LikeStatus::Unknown {
                tracing::debug!("Discarding late like load for {}", post_id);
                return;
            }

            state.status = match saved {
                Some(liked) => LikeStatus::Resolved(liked),
                None => LikeStatus::Absent,
            };
        })
    }

    /// Stop tracking a post. In-flight loads for it are cancelled and
    /// in-flight toggles no longer touch its state.
    pub async fn unmount(&self, post_id: &str) {
        if let Some(state) = self.posts.lock().await.remove(post_id) {
            state.cancel.cancel();
        }
    }

    /// Mount `posts` and return their views once the like loads have
    /// settled. Posts mounted by earlier renders stay mounted until they are
    /// unmounted explicitly.
    pub async fn render(&self, posts: &[Post]) -> Vec<InteractionView> {
        let mut loads = Vec::new();
        for post in posts {
            if let Some(load) = self.mount(post).await {
                loads.push(load);
            }
        }
        for load in loads {
            if let Err(e) = load.await {
                tracing::warn!("Like load task failed: {}", e);
            }
        }

        let mounted = self.posts.lock().await;
        posts
            .iter()
            .filter_map(|p| mounted.get(&p.id).map(|s| s.view(&p.id)))
            .collect()
    }

    pub async fn view(&self, post_id: &str) -> Result<InteractionView, InteractionError> {
        let posts = self.posts.lock().await;
        posts
            .get(post_id)
            .map(|s| s.view(post_id))
            .ok_or_else(|| InteractionError::NotMounted(post_id.to_string()))
    }

    pub async fn status(&self, post_id: &str) -> Result<LikeStatus, InteractionError> {
        let posts = self.posts.lock().await;
        posts
            .get(post_id)
            .map(|s| s.status)
            .ok_or_else(|| InteractionError::NotMounted(post_id.to_string()))
    }

    /// Flip the like optimistically, persist it, and restore the previous
    /// state if the save fails.
    ///
    /// If the post is unmounted while the save is running, a successful save
    /// still reports the toggled view; a failed one reports `NotMounted`.
    pub async fn toggle_like(&self, post_id: &str) -> Result<InteractionView, InteractionError> {
        let user_id = self.session.current_user_id();

        let (next, before, optimistic, token) = {
            let mut posts = self.posts.lock().await;
            let state = posts
                .get_mut(post_id)
                .ok_or_else(|| InteractionError::NotMounted(post_id.to_string()))?;
            if state.toggle_in_flight {
                return Err(InteractionError::ToggleInFlight(post_id.to_string()));
            }

            let before = (state.status, state.like_count);
            let next = !state.liked();

            state.status = LikeStatus::Resolved(next);
            state.like_count = if next {
                state.like_count.saturating_add(1)
            } else {
                state.like_count.saturating_sub(1)
            };
            state.toggle_in_flight = true;

            (next, before, state.view(post_id), state.cancel.clone())
        };

        let saved = self.likes.save_like(post_id, next, user_id.as_deref()).await;

        let mut posts = self.posts.lock().await;
        let state = match posts.get_mut(post_id) {
            Some(state) if !token.is_cancelled() => state,
            _ => {
                return match saved {
                    Ok(()) => Ok(optimistic),
                    Err(e) => {
                        tracing::warn!("Like save for unmounted {} failed: {}", post_id, e);
                        Err(InteractionError::NotMounted(post_id.to_string()))
                    }
                };
            }
        };
        state.toggle_in_flight = false;

        if let Err(e) = saved {
            tracing::warn!("Reverting like on {}: {}", post_id, e);
            state.status = before.0;
            state.like_count = before.1;
        }

        Ok(state.view(post_id))
    }

    pub async fn toggle_composer(&self, post_id: &str) -> Result<InteractionView, InteractionError> {
        self.update(post_id, |state| state.composer_open = !state.composer_open)
            .await
    }

    pub async fn set_comment_text(
        &self,
        post_id: &str,
        text: &str,
    ) -> Result<InteractionView, InteractionError> {
        self.update(post_id, |state| state.comment_text = text.to_string())
            .await
    }

    /// Count a comment locally. Blank text, or a closed composer, leaves
    /// everything as it was. The comment body is discarded.
    pub async fn submit_comment(&self, post_id: &str) -> Result<InteractionView, InteractionError> {
        self.update(post_id, |state| {
            if !state.composer_open || state.comment_text.trim().is_empty() {
                return;
            }
            state.comment_count = state.comment_count.saturating_add(1);
            state.comment_text.clear();
            state.composer_open = false;
        })
        .await
    }

    /// Unmount every post, cancelling outstanding loads.
    pub async fn shutdown(&self) {
        let mut posts = self.posts.lock().await;
        for (_, state) in posts.drain() {
            state.cancel.cancel();
        }
    }

    async fn update<F>(&self, post_id: &str, f: F) -> Result<InteractionView, InteractionError>
    where
        F: FnOnce(&mut InteractionState),
    {
        let mut posts = self.posts.lock().await;
        let state = posts
            .get_mut(post_id)
            .ok_or_else(|| InteractionError::NotMounted(post_id.to_string()))?;
        f(state);
        Ok(state.view(post_id))
    }
}

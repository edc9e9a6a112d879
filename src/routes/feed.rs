use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::db::models::Post;
use crate::error::{AppError, AppResult};
use crate::identity::Identity;
use crate::interaction::InteractionView;
use crate::posts::DEFAULT_FEED_LIMIT;
use crate::state::AppState;
use crate::upload::{self, ANONYMOUS_NAME, DEFAULT_AVATAR};

pub const DEFAULT_BIO: &str = "Street photographer capturing moments in monochrome.";

/// A post as rendered, with the viewer's interaction state.
#[derive(Debug, Serialize)]
pub struct PostCard {
    #[serde(flatten)]
    pub post: Post,
    pub interaction: InteractionView,
}

/// Who the profile belongs to, shown above the gallery.
#[derive(Debug, Serialize)]
pub struct ProfileHeader {
    pub display_name: String,
    pub handle: String,
    pub avatar_src: String,
    pub bio: String,
    pub photo_count: usize,
}

impl ProfileHeader {
    fn for_identity(identity: &Identity, photo_count: usize) -> Self {
        let display_name = match identity.display_name.trim() {
            "" => ANONYMOUS_NAME.to_string(),
            name => name.to_string(),
        };
        Self {
            display_name,
            handle: upload::handle_for(Some(identity)),
            avatar_src: identity
                .avatar_url
                .clone()
                .unwrap_or_else(|| DEFAULT_AVATAR.to_string()),
            bio: DEFAULT_BIO.to_string(),
            photo_count,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProfilePage {
    pub profile: ProfileHeader,
    pub posts: Vec<PostCard>,
}

#[derive(Deserialize)]
pub struct FeedQuery {
    pub limit: Option<usize>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/feed", get(feed))
        .route("/api/profile", get(own_profile))
        .route("/api/users/{user_id}/posts", get(user_posts))
}

async fn feed(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> AppResult<Json<Vec<PostCard>>> {
    let limit = query.limit.unwrap_or(DEFAULT_FEED_LIMIT);
    let posts = state.posts.list(limit).await?;
    Ok(Json(render_cards(&state, posts).await))
}

async fn user_posts(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<Vec<PostCard>>> {
    let posts = state.posts.list_by_user(&user_id).await?;
    Ok(Json(render_cards(&state, posts).await))
}

async fn own_profile(State(state): State<AppState>) -> AppResult<Json<ProfilePage>> {
    let identity = state
        .session
        .snapshot()
        .identity
        .ok_or(AppError::Unauthorized)?;
    let posts = state.posts.list_by_user(&identity.uid).await?;
    let posts = render_cards(&state, posts).await;

    Ok(Json(ProfilePage {
        profile: ProfileHeader::for_identity(&identity, posts.len()),
        posts,
    }))
}

async fn render_cards(state: &AppState, posts: Vec<Post>) -> Vec<PostCard> {
    let views = state.interactions.render(&posts).await;
    posts
        .into_iter()
        .filter_map(|post| {
            let interaction = views.iter().find(|v| v.post_id == post.id)?.clone();
            Some(PostCard { post, interaction })
        })
        .collect()
}

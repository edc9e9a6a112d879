use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::error::AppResult;
use crate::interaction::InteractionView;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CommentForm {
    pub text: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/posts/{id}/like", post(toggle_like))
        .route("/api/posts/{id}/composer", post(toggle_composer))
        .route("/api/posts/{id}/comments", post(submit_comment))
        .route("/api/posts/{id}/interaction", delete(unmount))
}

async fn toggle_like(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> AppResult<Json<InteractionView>> {
    Ok(Json(state.interactions.toggle_like(&post_id).await?))
}

async fn toggle_composer(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> AppResult<Json<InteractionView>> {
    Ok(Json(state.interactions.toggle_composer(&post_id).await?))
}

/// Counts the comment locally; the text itself is not kept.
async fn submit_comment(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Json(form): Json<CommentForm>,
) -> AppResult<Json<InteractionView>> {
    state
        .interactions
        .set_comment_text(&post_id, &form.text)
        .await?;
    Ok(Json(state.interactions.submit_comment(&post_id).await?))
}

/// Drops the post's interaction state once it is off screen.
async fn unmount(State(state): State<AppState>, Path(post_id): Path<String>) -> StatusCode {
    state.interactions.unmount(&post_id).await;
    StatusCode::NO_CONTENT
}

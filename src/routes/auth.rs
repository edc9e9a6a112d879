use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use crate::error::AppResult;
use crate::identity::{Identity, SessionState};
use crate::state::AppState;

#[derive(Serialize)]
pub struct SessionView {
    #[serde(flatten)]
    pub state: SessionState,
    pub authenticated: bool,
}

pub fn router() -> axum::Router<AppState> {
    Router::new()
        .route("/auth/session", get(session))
        .route("/auth/sign-in", post(sign_in))
        .route("/auth/sign-out", post(sign_out))
}

async fn session(State(state): State<AppState>) -> Json<SessionView> {
    let snapshot = state.session.snapshot();
    Json(SessionView {
        authenticated: snapshot.is_authenticated(),
        state: snapshot,
    })
}

async fn sign_in(State(state): State<AppState>) -> AppResult<Json<Identity>> {
    let identity = state.session.sign_in().await?;
    Ok(Json(identity))
}

async fn sign_out(State(state): State<AppState>) -> AppResult<StatusCode> {
    state.session.sign_out().await?;
    Ok(StatusCode::NO_CONTENT)
}

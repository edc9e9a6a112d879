use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};

use crate::db::models::Post;
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::upload::{self, UploadedImage};

/// Headroom for the caption and multipart framing around the image.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new().route(
        "/api/posts",
        post(create_post).layer(DefaultBodyLimit::max(max_upload_bytes + FORM_OVERHEAD_BYTES)),
    )
}

async fn create_post(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<Post>)> {
    let max_bytes = state.config.storage.max_upload_bytes;
    let mut image: Option<UploadedImage> = None;
    let mut caption = String::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| form_error(e, max_bytes))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("image") => {
                let file_name = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| form_error(e, max_bytes))?;
                image = Some(UploadedImage {
                    file_name,
                    content_type,
                    bytes,
                });
            }
            Some("caption") => {
                caption = field
                    .text()
                    .await
                    .map_err(|e| form_error(e, max_bytes))?;
            }
            _ => {}
        }
    }

    upload::validate_upload(image.as_ref(), &caption, max_bytes)?;
    let Some(image) = image else {
        return Err(upload::ValidationError::MissingImage.into());
    };

    let identity = state.session.snapshot().identity;
    let image_src = upload::store_image(&state.uploads_dir, &image).await?;
    let new_post = upload::new_post_for(identity.as_ref(), image_src.clone(), &caption);
    let post = match state.posts.create(new_post).await {
        Ok(post) => post,
        Err(e) => {
            upload::discard_image(&state.uploads_dir, &image_src).await;
            return Err(e.into());
        }
    };

    Ok((StatusCode::CREATED, Json(post)))
}

/// A body cut off by the request limit can only be an oversized image.
fn form_error(err: MultipartError, max_bytes: usize) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        upload::ValidationError::too_large(max_bytes).into()
    } else {
        AppError::BadRequest(err.body_text())
    }
}

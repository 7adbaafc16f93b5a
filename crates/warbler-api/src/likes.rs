use axum::{
    Extension,
    extract::{Path, State},
    response::Response,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{AppState, blocking};
use crate::convert::message_from_row;
use crate::error::{AppError, found};
use crate::middleware::CurrentUser;
use crate::templates::{LikesTemplate, MessageCard, Nav, render};
use crate::users::profile_header;

/// Like or unlike someone else's message.
pub async fn toggle_like(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(message_id): Path<Uuid>,
) -> Result<Response, AppError> {
    blocking(&state, move |state| {
        let mid = message_id.to_string();
        let uid = user.id.to_string();

        let message = state.db.get_message(&mid)?.ok_or(AppError::NotFound)?;
        if message.user_id == uid {
            warn!("{} tried to like their own message {}", user.username, mid);
            return Err(AppError::Unauthorized);
        }

        let like_id = Uuid::new_v4();
        let added = state.db.toggle_like(&like_id.to_string(), &uid, &mid)?;
        if added {
            info!("{} liked message {}", user.username, mid);
        } else {
            info!("{} unliked message {}", user.username, mid);
        }

        Ok(found("/"))
    })
    .await
}

pub async fn show_likes(
    State(state): State<AppState>,
    Extension(viewer): Extension<CurrentUser>,
    Path(user_id): Path<Uuid>,
) -> Result<Response, AppError> {
    blocking(&state, move |state| {
        let uid = user_id.to_string();
        let row = state.db.get_user_by_id(&uid)?.ok_or(AppError::NotFound)?;

        let viewer_likes = state.db.liked_message_ids(&viewer.id.to_string())?;
        let messages = state
            .db
            .liked_messages(&uid)?
            .into_iter()
            .map(|row| MessageCard::new(message_from_row(row), Some(&viewer), &viewer_likes))
            .collect();

        render(&LikesTemplate {
            nav: Nav::for_user(&viewer),
            profile: profile_header(state, row, Some(&viewer))?,
            messages,
        })
    })
    .await
}

use std::collections::HashSet;

use axum::{
    Extension, Form,
    extract::{Path, State},
    response::Response,
};
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use warbler_types::api::MessageForm;

use crate::{AppState, blocking};
use crate::auth::describe;
use crate::convert::message_from_row;
use crate::error::{AppError, found};
use crate::middleware::{CurrentUser, Session};
use crate::templates::{
    HomeAnonTemplate, HomeTemplate, MessageCard, MessageShowTemplate, Nav, NewMessageTemplate,
    render,
};

/// Newest messages shown on the home feed.
const HOME_FEED_LIMIT: u32 = 100;

const TOO_LONG: &str = "Messages are limited to 140 characters.";

/// Landing page for visitors, home feed for logged-in users.
pub async fn homepage(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Response, AppError> {
    let Some(user) = session.0 else {
        return render(&HomeAnonTemplate { nav: Nav::anonymous() });
    };

    blocking(&state, move |state| {
        let uid = user.id.to_string();
        let rows = state.db.home_feed(&uid, HOME_FEED_LIMIT)?;
        let liked_ids = state.db.liked_message_ids(&uid)?;
        let stats = state.db.user_stats(&uid)?;

        let messages = rows
            .into_iter()
            .map(|row| MessageCard::new(message_from_row(row), Some(&user), &liked_ids))
            .collect();

        render(&HomeTemplate {
            nav: Nav::for_user(&user),
            stats,
            messages,
        })
    })
    .await
}

pub async fn new_message_form(Extension(user): Extension<CurrentUser>) -> Result<Response, AppError> {
    render(&NewMessageTemplate {
        nav: Nav::for_user(&user),
        error: String::new(),
        text: String::new(),
    })
}

pub async fn add_message(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Form(form): Form<MessageForm>,
) -> Result<Response, AppError> {
    let form = form.trimmed();
    let rerender = |error: String| {
        render(&NewMessageTemplate {
            nav: Nav::for_user(&user),
            error,
            text: form.text.clone(),
        })
    };

    if let Err(errors) = form.validate() {
        return rerender(describe(&errors));
    }

    let message_id = Uuid::new_v4();
    let uid = user.id.to_string();
    let text = form.text.clone();
    let created = blocking(&state, move |state| {
        Ok(state.db.create_message(&message_id.to_string(), &uid, &text)?)
    })
    .await;

    match created {
        Ok(_) => {
            info!("{} posted message {}", user.username, message_id);
            Ok(found(&format!("/users/{}", user.id)))
        }
        Err(AppError::Db(e)) if e.is_data() => rerender(TOO_LONG.to_string()),
        Err(e) => Err(e),
    }
}

pub async fn show_message(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(message_id): Path<Uuid>,
) -> Result<Response, AppError> {
    blocking(&state, move |state| {
        let row = state
            .db
            .get_message(&message_id.to_string())?
            .ok_or(AppError::NotFound)?;

        let liked_ids = match session.user() {
            Some(user) => state.db.liked_message_ids(&user.id.to_string())?,
            None => HashSet::new(),
        };

        render(&MessageShowTemplate {
            nav: Nav::from_session(&session),
            card: MessageCard::new(message_from_row(row), session.user(), &liked_ids),
        })
    })
    .await
}

/// Only the author may delete a message.
pub async fn delete_message(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(message_id): Path<Uuid>,
) -> Result<Response, AppError> {
    blocking(&state, move |state| {
        let mid = message_id.to_string();
        let uid = user.id.to_string();

        let row = state.db.get_message(&mid)?.ok_or(AppError::NotFound)?;
        if row.user_id != uid {
            warn!("{} tried to delete message {} owned by {}", user.username, mid, row.user_id);
            return Err(AppError::Unauthorized);
        }

        state.db.delete_message(&mid, &uid)?;
        info!("{} deleted message {}", user.username, mid);

        Ok(found(&format!("/users/{}", user.id)))
    })
    .await
}

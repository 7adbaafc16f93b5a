use std::collections::HashSet;

use axum::{
    Extension, Form,
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::{debug, info};
use uuid::Uuid;
use validator::Validate;

use warbler_db::models::{UserRow, UserUpdate};
use warbler_types::api::{SearchQuery, UserEditForm, non_empty};

use crate::{AppState, blocking};
use crate::auth::{authenticate, describe, log_out};
use crate::convert::{message_from_row, user_from_row};
use crate::error::{AppError, found};
use crate::middleware::{CurrentUser, Session};
use crate::templates::{
    EditProfileTemplate, MessageCard, Nav, ProfileHeader, RelationsTemplate, UserCard,
    UserShowTemplate, UsersIndexTemplate, render,
};

/// Messages listed on a profile page.
const PROFILE_MESSAGE_LIMIT: u32 = 100;

pub async fn list_users(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Query(query): Query<SearchQuery>,
) -> Result<Response, AppError> {
    blocking(&state, move |state| {
        let q = query.q.unwrap_or_default();
        let rows = state.db.search_users(Some(q.as_str()))?;
        let following_ids = following_ids(state, session.user())?;

        let users = rows
            .into_iter()
            .map(|row| UserCard::new(user_from_row(row), session.user(), &following_ids))
            .collect();

        render(&UsersIndexTemplate {
            nav: Nav::from_session(&session),
            q,
            users,
        })
    })
    .await
}

pub async fn show_user(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(user_id): Path<Uuid>,
) -> Result<Response, AppError> {
    blocking(&state, move |state| {
        let uid = user_id.to_string();
        let row = state.db.get_user_by_id(&uid)?.ok_or(AppError::NotFound)?;
        let profile = profile_header(state, row, session.user())?;

        let liked_ids = match session.user() {
            Some(viewer) => state.db.liked_message_ids(&viewer.id.to_string())?,
            None => HashSet::new(),
        };
        let messages = state
            .db
            .messages_for_user(&uid, PROFILE_MESSAGE_LIMIT)?
            .into_iter()
            .map(|row| MessageCard::new(message_from_row(row), session.user(), &liked_ids))
            .collect();

        render(&UserShowTemplate {
            nav: Nav::from_session(&session),
            profile,
            messages,
        })
    })
    .await
}

pub async fn show_following(
    State(state): State<AppState>,
    Extension(viewer): Extension<CurrentUser>,
    Path(user_id): Path<Uuid>,
) -> Result<Response, AppError> {
    blocking(&state, move |state| {
        let uid = user_id.to_string();
        let row = state.db.get_user_by_id(&uid)?.ok_or(AppError::NotFound)?;
        let users = state.db.following(&uid)?;
        relations_page(state, &viewer, row, "Following", users)
    })
    .await
}

pub async fn show_followers(
    State(state): State<AppState>,
    Extension(viewer): Extension<CurrentUser>,
    Path(user_id): Path<Uuid>,
) -> Result<Response, AppError> {
    blocking(&state, move |state| {
        let uid = user_id.to_string();
        let row = state.db.get_user_by_id(&uid)?.ok_or(AppError::NotFound)?;
        let users = state.db.followers(&uid)?;
        relations_page(state, &viewer, row, "Followers", users)
    })
    .await
}

pub async fn add_follow(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(follow_id): Path<Uuid>,
) -> Result<Response, AppError> {
    blocking(&state, move |state| {
        let followed = state
            .db
            .get_user_by_id(&follow_id.to_string())?
            .ok_or(AppError::NotFound)?;

        match state.db.follow(&user.id.to_string(), &followed.id) {
            Ok(()) => info!("{} now follows {}", user.username, followed.username),
            Err(e) if e.is_integrity() => {
                debug!("{} already follows {}", user.username, followed.username);
            }
            Err(e) => return Err(e.into()),
        }

        Ok(found(&format!("/users/{}/following", user.id)))
    })
    .await
}

pub async fn stop_following(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(follow_id): Path<Uuid>,
) -> Result<Response, AppError> {
    blocking(&state, move |state| {
        let followed = state
            .db
            .get_user_by_id(&follow_id.to_string())?
            .ok_or(AppError::NotFound)?;

        if state.db.unfollow(&user.id.to_string(), &followed.id)? {
            info!("{} stopped following {}", user.username, followed.username);
        }

        Ok(found(&format!("/users/{}/following", user.id)))
    })
    .await
}

pub async fn edit_profile_form(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Response, AppError> {
    blocking(&state, move |state| {
        let row = state
            .db
            .get_user_by_id(&user.id.to_string())?
            .ok_or(AppError::NotFound)?;

        render(&edit_page(&user, user_from_row(row), String::new()))
    })
    .await
}

/// Updates the profile after re-checking the current password.
pub async fn edit_profile(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Form(form): Form<UserEditForm>,
) -> Result<Response, AppError> {
    let form = form.trimmed();
    blocking(&state, move |state| {
        let row = state
            .db
            .get_user_by_id(&user.id.to_string())?
            .ok_or(AppError::NotFound)?;
        let current = user_from_row(row);

        if let Err(errors) = form.validate() {
            return render(&edit_page(&user, current, describe(&errors)));
        }

        if authenticate(&state.db, &user.username, &form.password)?.is_none() {
            return render(&edit_page(
                &user,
                current,
                "Wrong password, please try again.".to_string(),
            ));
        }

        let image_url = non_empty(form.image_url);
        let header_image_url = non_empty(form.header_image_url);
        let bio = non_empty(form.bio);
        let location = non_empty(form.location);

        let update = UserUpdate {
            username: &form.username,
            email: &form.email,
            image_url: image_url.as_deref(),
            header_image_url: header_image_url.as_deref(),
            bio: bio.as_deref(),
            location: location.as_deref(),
        };

        match state.db.update_user(&user.id.to_string(), &update) {
            Ok(_) => {
                info!("{} updated their profile", update.username);
                Ok(found(&format!("/users/{}", user.id)))
            }
            Err(e) if e.is_integrity() => render(&edit_page(
                &user,
                current,
                "Username or email already taken".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    })
    .await
}

/// Deletes the logged-in account and everything it owns.
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    jar: CookieJar,
) -> Result<Response, AppError> {
    blocking(&state, move |state| {
        state.db.delete_user(&user.id.to_string())?;
        info!("Deleted user {} ({})", user.username, user.id);

        Ok((log_out(jar), found("/signup")).into_response())
    })
    .await
}

pub(crate) fn following_ids(
    state: &AppState,
    viewer: Option<&CurrentUser>,
) -> Result<HashSet<String>, AppError> {
    match viewer {
        Some(viewer) => Ok(state.db.following_ids(&viewer.id.to_string())?),
        None => Ok(HashSet::new()),
    }
}

pub(crate) fn profile_header(
    state: &AppState,
    row: UserRow,
    viewer: Option<&CurrentUser>,
) -> Result<ProfileHeader, AppError> {
    let stats = state.db.user_stats(&row.id)?;
    let followed_by_me = match viewer {
        Some(viewer) => state.db.is_followed_by(&row.id, &viewer.id.to_string())?,
        None => false,
    };
    Ok(ProfileHeader::new(user_from_row(row), stats, viewer, followed_by_me))
}

fn relations_page(
    state: &AppState,
    viewer: &CurrentUser,
    row: UserRow,
    title: &str,
    users: Vec<UserRow>,
) -> Result<Response, AppError> {
    let following_ids = following_ids(state, Some(viewer))?;
    let users = users
        .into_iter()
        .map(|u| UserCard::new(user_from_row(u), Some(viewer), &following_ids))
        .collect();

    render(&RelationsTemplate {
        nav: Nav::for_user(viewer),
        title: title.to_string(),
        profile: profile_header(state, row, Some(viewer))?,
        users,
    })
}

fn edit_page(viewer: &CurrentUser, user: warbler_types::models::User, error: String) -> EditProfileTemplate {
    EditProfileTemplate {
        nav: Nav::for_user(viewer),
        error,
        bio: user.bio.clone().unwrap_or_default(),
        location: user.location.clone().unwrap_or_default(),
        user,
    }
}

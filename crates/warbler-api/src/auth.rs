use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use axum::{
    Extension, Form,
    extract::State,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{EncodingKey, Header, encode};
use rand_core::OsRng;
use tracing::{info, warn};
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use warbler_db::Database;
use warbler_db::models::{NewUser, UserRow};
use warbler_types::api::{Claims, LoginForm, SignupForm, non_empty};

use crate::{AppState, blocking};
use crate::convert::parse_id;
use crate::error::{AppError, found};
use crate::middleware::{CURR_USER_KEY, Session};
use crate::templates::{LoginTemplate, Nav, SignupTemplate, render};

/// Session lifetime.
const SESSION_DAYS: i64 = 30;

// -- User entity manager --

/// Create a user with an Argon2id-hashed password.
///
/// A duplicate username or email fails with `DbError::Integrity`.
pub fn signup(
    db: &Database,
    username: &str,
    email: &str,
    raw_password: &str,
    image_url: Option<&str>,
) -> Result<UserRow, AppError> {
    let password_hash = hash_password(raw_password)?;
    let user_id = Uuid::new_v4();

    let row = db.create_user(
        &user_id.to_string(),
        &NewUser {
            username,
            email,
            password_hash: &password_hash,
            image_url,
        },
    )?;

    info!("New user signed up: {} ({})", row.username, row.id);
    Ok(row)
}

/// Returns the user only when `raw_password` matches their stored hash.
pub fn authenticate(
    db: &Database,
    username: &str,
    raw_password: &str,
) -> Result<Option<UserRow>, AppError> {
    let Some(user) = db.get_user_by_username(username)? else {
        return Ok(None);
    };

    let parsed_hash = match PasswordHash::new(&user.password) {
        Ok(hash) => hash,
        Err(e) => {
            warn!("Stored password for '{}' is not a valid hash: {}", user.username, e);
            return Ok(None);
        }
    };

    let verified = Argon2::default()
        .verify_password(raw_password.as_bytes(), &parsed_hash)
        .is_ok();

    Ok(verified.then_some(user))
}

pub fn hash_password(raw_password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(raw_password.as_bytes(), &salt)
        .map_err(|e| AppError::PasswordHash(e.to_string()))?
        .to_string();
    Ok(hash)
}

// -- Handlers --

pub async fn show_signup(Extension(session): Extension<Session>) -> Result<Response, AppError> {
    render(&SignupTemplate {
        nav: Nav::from_session(&session),
        error: String::new(),
        username: String::new(),
        email: String::new(),
        image_url: String::new(),
    })
}

pub async fn handle_signup(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    jar: CookieJar,
    Form(form): Form<SignupForm>,
) -> Result<Response, AppError> {
    let form = form.trimmed();
    let rerender = |error: String| {
        render(&SignupTemplate {
            nav: Nav::from_session(&session),
            error,
            username: form.username.clone(),
            email: form.email.clone(),
            image_url: form.image_url.clone().unwrap_or_default(),
        })
    };

    if let Err(errors) = form.validate() {
        return rerender(describe(&errors));
    }

    let image_url = non_empty(form.image_url.clone());
    let username = form.username.clone();
    let email = form.email.clone();
    let password = form.password.clone();
    let created = blocking(&state, move |state| {
        signup(&state.db, &username, &email, &password, image_url.as_deref())
    })
    .await;

    let user = match created {
        Ok(user) => user,
        Err(AppError::Db(e)) if e.is_integrity() => {
            return rerender("Username already taken".to_string());
        }
        Err(e) => return Err(e),
    };

    let jar = log_in(&state, jar, &user)?;
    Ok((jar, found("/")).into_response())
}

pub async fn show_login(Extension(session): Extension<Session>) -> Result<Response, AppError> {
    render(&LoginTemplate {
        nav: Nav::from_session(&session),
        error: String::new(),
        username: String::new(),
    })
}

pub async fn handle_login(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    let rerender = |error: String| {
        render(&LoginTemplate {
            nav: Nav::from_session(&session),
            error,
            username: form.username.clone(),
        })
    };

    if let Err(errors) = form.validate() {
        return rerender(describe(&errors));
    }

    let username = form.username.clone();
    let password = form.password.clone();
    let user = blocking(&state, move |state| authenticate(&state.db, &username, &password)).await?;

    match user {
        Some(user) => {
            info!("User logged in: {}", user.username);
            let jar = log_in(&state, jar, &user)?;
            Ok((jar, found("/")).into_response())
        }
        None => rerender("Invalid credentials.".to_string()),
    }
}

pub async fn logout(jar: CookieJar) -> Response {
    (log_out(jar), found("/login")).into_response()
}

/// Attach a fresh session cookie for `user`.
pub(crate) fn log_in(state: &AppState, jar: CookieJar, user: &UserRow) -> Result<CookieJar, AppError> {
    let user_id = parse_id(&user.id, "user id");
    let token = create_token(&state.jwt_secret, user_id, &user.username)?;

    let cookie = Cookie::build((CURR_USER_KEY, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(cookie::time::Duration::days(SESSION_DAYS));
    Ok(jar.add(cookie))
}

pub(crate) fn log_out(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(CURR_USER_KEY).path("/"))
}

pub fn create_token(
    secret: &str,
    user_id: Uuid,
    username: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(SESSION_DAYS)).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Flatten validation failures into one line for the form banner.
pub(crate) fn describe(errors: &ValidationErrors) -> String {
    let mut messages: Vec<String> = errors
        .field_errors()
        .into_values()
        .flat_map(|errs| errs.iter())
        .map(|e| {
            e.message
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| e.code.to_string())
        })
        .collect();
    messages.sort();
    messages.join(" ")
}

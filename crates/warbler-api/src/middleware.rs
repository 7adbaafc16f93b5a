use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::{debug, warn};
use uuid::Uuid;

use warbler_types::api::Claims;

use crate::{AppState, blocking};
use crate::error::{AppError, MissingPage, not_found_page};

/// Cookie holding the logged-in user's session token.
pub const CURR_USER_KEY: &str = "curr_user";

#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: Uuid,
    pub username: String,
    pub image_url: String,
}

/// The visitor of the current request; `None` when anonymous.
#[derive(Debug, Clone, Default)]
pub struct Session(pub Option<CurrentUser>);

impl Session {
    pub fn user(&self) -> Option<&CurrentUser> {
        self.0.as_ref()
    }
}

/// Decode the session cookie and reload the user it names. A bad token or a
/// deleted user leaves the request anonymous.
///
/// A handler's bare `404` is replaced here by the rendered 404 page.
pub async fn load_session(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let jar = CookieJar::from_headers(req.headers());

    let claims = jar
        .get(CURR_USER_KEY)
        .and_then(|cookie| match decode_token(&state.jwt_secret, cookie.value()) {
            Ok(claims) => Some(claims),
            Err(e) => {
                debug!("Ignoring invalid session token: {}", e);
                None
            }
        });

    let current = match claims {
        Some(claims) => {
            let lookup = blocking(&state, move |state| {
                Ok(state.db.get_user_by_id(&claims.sub.to_string())?.map(|row| CurrentUser {
                    id: claims.sub,
                    username: row.username,
                    image_url: row.image_url,
                }))
            })
            .await;
            lookup.unwrap_or_else(|e| {
                warn!("Session user lookup failed: {}", e);
                None
            })
        }
        None => None,
    };

    let session = Session(current);
    req.extensions_mut().insert(session.clone());

    let resp = next.run(req).await;
    if resp.extensions().get::<MissingPage>().is_some() {
        return not_found_page(&session);
    }
    resp
}

/// Reject anonymous requests. Must run after [`load_session`].
pub async fn require_login(mut req: Request, next: Next) -> Response {
    let current = req
        .extensions()
        .get::<Session>()
        .and_then(|session| session.0.clone());

    match current {
        Some(user) => {
            req.extensions_mut().insert(user);
            next.run(req).await
        }
        None => AppError::Unauthorized.into_response(),
    }
}

pub fn decode_token(secret: &str, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

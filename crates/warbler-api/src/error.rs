use askama::Template;
use axum::{
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use warbler_db::DbError;

use crate::middleware::Session;
use crate::templates::{Nav, NotFoundTemplate};

#[derive(Debug, Error)]
pub enum AppError {
    /// Not logged in, or acting on someone else's data.
    #[error("access unauthorized")]
    Unauthorized,

    #[error("not found")]
    NotFound,

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("template error: {0}")]
    Template(#[from] askama::Error),

    #[error("password hashing failed: {0}")]
    PasswordHash(String),

    #[error("session token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Unauthorized => found("/"),
            AppError::NotFound => {
                let mut resp = StatusCode::NOT_FOUND.into_response();
                resp.extensions_mut().insert(MissingPage);
                resp
            }
            other => {
                error!("Request failed: {}", other);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

/// Marks a bare 404 whose page is filled in by `load_session`, which knows
/// the visitor.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MissingPage;

/// The 404 page, with the nav bar of whoever is visiting.
pub(crate) fn not_found_page(session: &Session) -> Response {
    let page = NotFoundTemplate {
        nav: Nav::from_session(session),
    };
    match page.render() {
        Ok(html) => (StatusCode::NOT_FOUND, Html(html)).into_response(),
        Err(e) => {
            error!("Failed to render 404 page: {}", e);
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

/// `302 Found` redirect.
pub fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, Response, header},
};
use http_body_util::BodyExt;
use tower::ServiceExt;

use warbler_db::Database;
use warbler_db::models::UserRow;

use crate::auth::{create_token, signup};
use crate::convert::parse_id;
use crate::{AppState, AppStateInner, router};

pub const TEST_PASSWORD: &str = "testuser";

pub fn test_state() -> AppState {
    Arc::new(AppStateInner {
        db: Database::open_in_memory().unwrap(),
        jwt_secret: "test-secret".to_string(),
    })
}

pub fn add_user(state: &AppState, username: &str) -> UserRow {
    signup(
        &state.db,
        username,
        &format!("{username}@test.com"),
        TEST_PASSWORD,
        None,
    )
    .unwrap()
}

/// `Cookie` header value logging in as `user`.
pub fn session_cookie(state: &AppState, user: &UserRow) -> String {
    let token = create_token(&state.jwt_secret, parse_id(&user.id, "user id"), &user.username).unwrap();
    format!("curr_user={token}")
}

pub fn get_request(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn form_post(uri: &str, body: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub async fn send(state: &AppState, req: Request<Body>) -> Response<Body> {
    router(state.clone()).oneshot(req).await.unwrap()
}

pub async fn body_text(resp: Response<Body>) -> String {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub fn location(resp: &Response<Body>) -> &str {
    resp.headers()[header::LOCATION].to_str().unwrap()
}

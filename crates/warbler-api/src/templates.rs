//! Page templates. Every page extends `base.html`, which reads `nav`.

use std::collections::HashSet;

use askama::Template;
use axum::response::{Html, IntoResponse, Response};

use warbler_types::models::{Message, User, UserStats};

use crate::error::AppError;
use crate::middleware::{CurrentUser, Session};

/// Navbar state shared by every page.
pub struct Nav {
    pub logged_in: bool,
    pub user_id: String,
    pub username: String,
    pub image_url: String,
}

impl Nav {
    pub fn anonymous() -> Self {
        Self {
            logged_in: false,
            user_id: String::new(),
            username: String::new(),
            image_url: String::new(),
        }
    }

    pub fn for_user(user: &CurrentUser) -> Self {
        Self {
            logged_in: true,
            user_id: user.id.to_string(),
            username: user.username.clone(),
            image_url: user.image_url.clone(),
        }
    }

    pub fn from_session(session: &Session) -> Self {
        session.user().map(Self::for_user).unwrap_or_else(Self::anonymous)
    }
}

/// A message as listed on a page.
pub struct MessageCard {
    pub msg: Message,
    /// Written by the visitor.
    pub own: bool,
    pub liked: bool,
    /// The visitor may like it: logged in and not the author.
    pub can_like: bool,
}

impl MessageCard {
    pub fn new(msg: Message, viewer: Option<&CurrentUser>, liked_ids: &HashSet<String>) -> Self {
        let own = viewer.is_some_and(|v| v.id == msg.user_id);
        let liked = liked_ids.contains(&msg.id.to_string());
        Self {
            own,
            liked,
            can_like: viewer.is_some() && !own,
            msg,
        }
    }
}

pub struct UserCard {
    pub user: User,
    pub is_me: bool,
    pub followed_by_me: bool,
}

impl UserCard {
    pub fn new(user: User, viewer: Option<&CurrentUser>, following_ids: &HashSet<String>) -> Self {
        Self {
            is_me: viewer.is_some_and(|v| v.id == user.id),
            followed_by_me: following_ids.contains(&user.id.to_string()),
            user,
        }
    }
}

/// Header block of every profile page.
pub struct ProfileHeader {
    pub user: User,
    pub stats: UserStats,
    pub bio: String,
    pub location: String,
    pub is_me: bool,
    pub followed_by_me: bool,
}

impl ProfileHeader {
    pub fn new(user: User, stats: UserStats, viewer: Option<&CurrentUser>, followed_by_me: bool) -> Self {
        Self {
            bio: user.bio.clone().unwrap_or_default(),
            location: user.location.clone().unwrap_or_default(),
            is_me: viewer.is_some_and(|v| v.id == user.id),
            followed_by_me,
            stats,
            user,
        }
    }
}

#[derive(Template)]
#[template(path = "home_anon.html")]
pub struct HomeAnonTemplate {
    pub nav: Nav,
}

#[derive(Template)]
#[template(path = "home.html")]
pub struct HomeTemplate {
    pub nav: Nav,
    pub stats: UserStats,
    pub messages: Vec<MessageCard>,
}

#[derive(Template)]
#[template(path = "users/signup.html")]
pub struct SignupTemplate {
    pub nav: Nav,
    pub error: String,
    pub username: String,
    pub email: String,
    pub image_url: String,
}

#[derive(Template)]
#[template(path = "users/login.html")]
pub struct LoginTemplate {
    pub nav: Nav,
    pub error: String,
    pub username: String,
}

#[derive(Template)]
#[template(path = "users/index.html")]
pub struct UsersIndexTemplate {
    pub nav: Nav,
    pub q: String,
    pub users: Vec<UserCard>,
}

#[derive(Template)]
#[template(path = "users/show.html")]
pub struct UserShowTemplate {
    pub nav: Nav,
    pub profile: ProfileHeader,
    pub messages: Vec<MessageCard>,
}

/// Following and followers pages.
#[derive(Template)]
#[template(path = "users/relations.html")]
pub struct RelationsTemplate {
    pub nav: Nav,
    pub title: String,
    pub profile: ProfileHeader,
    pub users: Vec<UserCard>,
}

#[derive(Template)]
#[template(path = "users/likes.html")]
pub struct LikesTemplate {
    pub nav: Nav,
    pub profile: ProfileHeader,
    pub messages: Vec<MessageCard>,
}

#[derive(Template)]
#[template(path = "users/edit.html")]
pub struct EditProfileTemplate {
    pub nav: Nav,
    pub error: String,
    pub user: User,
    pub bio: String,
    pub location: String,
}

#[derive(Template)]
#[template(path = "messages/new.html")]
pub struct NewMessageTemplate {
    pub nav: Nav,
    pub error: String,
    pub text: String,
}

#[derive(Template)]
#[template(path = "messages/show.html")]
pub struct MessageShowTemplate {
    pub nav: Nav,
    pub card: MessageCard,
}

#[derive(Template)]
#[template(path = "404.html")]
pub struct NotFoundTemplate {
    pub nav: Nav,
}

/// Render a page with `200 OK`.
pub fn render<T: Template>(page: &T) -> Result<Response, AppError> {
    Ok(Html(page.render()?).into_response())
}

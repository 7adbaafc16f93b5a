use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use warbler_db::models::{MessageRow, UserRow};
use warbler_types::models::{Message, User};

pub(crate) fn parse_id(raw: &str, what: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", what, raw, e);
        Uuid::default()
    })
}

pub(crate) fn parse_timestamp(raw: &str, owner: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>().unwrap_or_else(|e| {
        warn!("Corrupt timestamp '{}' on '{}': {}", raw, owner, e);
        DateTime::default()
    })
}

pub(crate) fn user_from_row(row: UserRow) -> User {
    User {
        id: parse_id(&row.id, "user id"),
        created_at: parse_timestamp(&row.created_at, &row.id),
        username: row.username,
        email: row.email,
        image_url: row.image_url,
        header_image_url: row.header_image_url,
        bio: row.bio,
        location: row.location,
    }
}

pub(crate) fn message_from_row(row: MessageRow) -> Message {
    Message {
        id: parse_id(&row.id, "message id"),
        timestamp: parse_timestamp(&row.timestamp, &row.id),
        user_id: parse_id(&row.user_id, "message author"),
        text: row.text,
        username: row.username,
        user_image_url: row.user_image_url,
    }
}

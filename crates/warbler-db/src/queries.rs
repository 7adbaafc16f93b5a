use std::collections::HashSet;

use rusqlite::{Connection, Row};
use warbler_types::models::{DEFAULT_HEADER_IMAGE_URL, DEFAULT_IMAGE_URL, UserStats};

use crate::models::{MessageRow, NewUser, UserRow, UserUpdate};
use crate::{Database, DbError, Result};

const USER_COLUMNS: &str =
    "u.id, u.username, u.email, u.image_url, u.header_image_url, u.bio, u.location, u.password, u.created_at";

const MESSAGE_SELECT: &str = "SELECT m.id, m.text, m.timestamp, m.user_id, u.username, u.image_url
     FROM messages m
     JOIN users u ON m.user_id = u.id";

impl Database {
    // -- Users --

    pub fn create_user(&self, id: &str, user: &NewUser<'_>) -> Result<UserRow> {
        self.transaction(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, email, password, image_url) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    id,
                    user.username,
                    user.email,
                    user.password_hash,
                    user.image_url.unwrap_or(DEFAULT_IMAGE_URL),
                ],
            )?;
            query_user_by_id(conn, id)?
                .ok_or_else(|| DbError::Integrity(format!("user {id} vanished after insert")))
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_username(conn, username))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    /// All users, or those whose username contains `q` (case-insensitive).
    pub fn search_users(&self, q: Option<&str>) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| match q.map(str::trim).filter(|q| !q.is_empty()) {
            Some(q) => {
                let pattern = format!("%{}%", escape_like(q));
                query_users(
                    conn,
                    &format!(
                        "SELECT {USER_COLUMNS} FROM users u WHERE u.username LIKE ?1 ESCAPE '\\' ORDER BY u.username"
                    ),
                    [pattern],
                )
            }
            None => query_users(
                conn,
                &format!("SELECT {USER_COLUMNS} FROM users u ORDER BY u.username"),
                (),
            ),
        })
    }

    /// Returns false when no user has this id.
    pub fn update_user(&self, id: &str, update: &UserUpdate<'_>) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users
                 SET username = ?1, email = ?2, image_url = ?3, header_image_url = ?4, bio = ?5, location = ?6
                 WHERE id = ?7",
                rusqlite::params![
                    update.username,
                    update.email,
                    update.image_url.unwrap_or(DEFAULT_IMAGE_URL),
                    update.header_image_url.unwrap_or(DEFAULT_HEADER_IMAGE_URL),
                    update.bio,
                    update.location,
                    id,
                ],
            )?;
            Ok(changed > 0)
        })
    }

    /// Deletes the user together with their messages, likes and follow edges.
    pub fn delete_user(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM users WHERE id = ?1", [id])?;
            Ok(deleted > 0)
        })
    }

    pub fn user_stats(&self, id: &str) -> Result<UserStats> {
        self.with_conn(|conn| {
            let stats = conn.query_row(
                "SELECT
                    (SELECT COUNT(*) FROM messages WHERE user_id = ?1),
                    (SELECT COUNT(*) FROM follows WHERE follower_id = ?1),
                    (SELECT COUNT(*) FROM follows WHERE followed_id = ?1),
                    (SELECT COUNT(*) FROM likes WHERE user_id = ?1)",
                [id],
                |row| {
                    Ok(UserStats {
                        messages: row.get(0)?,
                        following: row.get(1)?,
                        followers: row.get(2)?,
                        likes: row.get(3)?,
                    })
                },
            )?;
            Ok(stats)
        })
    }

    // -- Messages --

    pub fn create_message(&self, id: &str, user_id: &str, text: &str) -> Result<MessageRow> {
        self.transaction(|conn| {
            conn.execute(
                "INSERT INTO messages (id, text, user_id) VALUES (?1, ?2, ?3)",
                (id, text, user_id),
            )?;
            query_message(conn, id)?
                .ok_or_else(|| DbError::Integrity(format!("message {id} vanished after insert")))
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| query_message(conn, id))
    }

    pub fn messages_for_user(&self, user_id: &str, limit: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            query_messages(
                conn,
                &format!(
                    "{MESSAGE_SELECT}
                     WHERE m.user_id = ?1
                     ORDER BY m.timestamp DESC, m.rowid DESC
                     LIMIT ?2"
                ),
                rusqlite::params![user_id, limit],
            )
        })
    }

    /// The user's own messages plus those of everyone they follow.
    pub fn home_feed(&self, user_id: &str, limit: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            query_messages(
                conn,
                &format!(
                    "{MESSAGE_SELECT}
                     WHERE m.user_id = ?1
                        OR m.user_id IN (SELECT followed_id FROM follows WHERE follower_id = ?1)
                     ORDER BY m.timestamp DESC, m.rowid DESC
                     LIMIT ?2"
                ),
                rusqlite::params![user_id, limit],
            )
        })
    }

    /// Deletes the message only if `requester_id` wrote it.
    pub fn delete_message(&self, id: &str, requester_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM messages WHERE id = ?1 AND user_id = ?2",
                (id, requester_id),
            )?;
            Ok(deleted > 0)
        })
    }

    // -- Follows --

    /// Fails with [`DbError::Integrity`] if the edge already exists or either
    /// user is missing.
    pub fn follow(&self, follower_id: &str, followed_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO follows (follower_id, followed_id) VALUES (?1, ?2)",
                (follower_id, followed_id),
            )?;
            Ok(())
        })
    }

    /// Idempotent; returns whether an edge was removed.
    pub fn unfollow(&self, follower_id: &str, followed_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM follows WHERE follower_id = ?1 AND followed_id = ?2",
                (follower_id, followed_id),
            )?;
            Ok(deleted > 0)
        })
    }

    /// Does `user_id` follow `other_id`?
    pub fn is_following(&self, user_id: &str, other_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let exists = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM follows WHERE follower_id = ?1 AND followed_id = ?2)",
                (user_id, other_id),
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    /// Is `user_id` followed by `other_id`?
    pub fn is_followed_by(&self, user_id: &str, other_id: &str) -> Result<bool> {
        self.is_following(other_id, user_id)
    }

    /// Users that `user_id` follows.
    pub fn following(&self, user_id: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            query_users(
                conn,
                &format!(
                    "SELECT {USER_COLUMNS} FROM follows f
                     JOIN users u ON u.id = f.followed_id
                     WHERE f.follower_id = ?1
                     ORDER BY f.created_at DESC"
                ),
                [user_id],
            )
        })
    }

    /// Users following `user_id`.
    pub fn followers(&self, user_id: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            query_users(
                conn,
                &format!(
                    "SELECT {USER_COLUMNS} FROM follows f
                     JOIN users u ON u.id = f.follower_id
                     WHERE f.followed_id = ?1
                     ORDER BY f.created_at DESC"
                ),
                [user_id],
            )
        })
    }

    pub fn following_ids(&self, user_id: &str) -> Result<HashSet<String>> {
        self.with_conn(|conn| {
            query_ids(
                conn,
                "SELECT followed_id FROM follows WHERE follower_id = ?1",
                user_id,
            )
        })
    }

    // -- Likes --

    /// Toggle a like: removes if exists, inserts if not.
    /// Returns true when the like was added.
    pub fn toggle_like(&self, id: &str, user_id: &str, message_id: &str) -> Result<bool> {
        self.transaction(|conn| {
            let removed = conn.execute(
                "DELETE FROM likes WHERE user_id = ?1 AND message_id = ?2",
                (user_id, message_id),
            )?;
            if removed > 0 {
                return Ok(false);
            }

            conn.execute(
                "INSERT INTO likes (id, user_id, message_id) VALUES (?1, ?2, ?3)",
                (id, user_id, message_id),
            )?;
            Ok(true)
        })
    }

    pub fn liked_messages(&self, user_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            query_messages(
                conn,
                &format!(
                    "{MESSAGE_SELECT}
                     JOIN likes l ON l.message_id = m.id
                     WHERE l.user_id = ?1
                     ORDER BY l.created_at DESC, l.rowid DESC"
                ),
                [user_id],
            )
        })
    }

    pub fn liked_message_ids(&self, user_id: &str) -> Result<HashSet<String>> {
        self.with_conn(|conn| {
            query_ids(conn, "SELECT message_id FROM likes WHERE user_id = ?1", user_id)
        })
    }
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        image_url: row.get(3)?,
        header_image_url: row.get(4)?,
        bio: row.get(5)?,
        location: row.get(6)?,
        password: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn map_message(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        text: row.get(1)?,
        timestamp: row.get(2)?,
        user_id: row.get(3)?,
        username: row.get(4)?,
        user_image_url: row.get(5)?,
    })
}

fn query_user_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let mut stmt =
        conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users u WHERE u.username = ?1"))?;
    stmt.query_row([username], map_user).optional()
}

fn query_user_by_id(conn: &Connection, id: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = ?1"))?;
    stmt.query_row([id], map_user).optional()
}

fn query_users<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<UserRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, map_user)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn query_message(conn: &Connection, id: &str) -> Result<Option<MessageRow>> {
    let mut stmt = conn.prepare(&format!("{MESSAGE_SELECT} WHERE m.id = ?1"))?;
    stmt.query_row([id], map_message).optional()
}

fn query_messages<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<MessageRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, map_message)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn query_ids(conn: &Connection, sql: &str, key: &str) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare(sql)?;
    let ids = stmt
        .query_map([key], |row| row.get(0))?
        .collect::<std::result::Result<HashSet<String>, _>>()?;
    Ok(ids)
}

/// Escape LIKE wildcards so user input matches literally.
fn escape_like(q: &str) -> String {
    let mut out = String::with_capacity(q.len());
    for c in q.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn test_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn new_id() -> String {
        Uuid::new_v4().to_string()
    }

    fn add_user(db: &Database, username: &str) -> UserRow {
        let email = format!("{username}@test.com");
        db.create_user(
            &new_id(),
            &NewUser {
                username,
                email: &email,
                password_hash: "HASHED_PASSWORD",
                image_url: None,
            },
        )
        .unwrap()
    }

    #[test]
    fn fresh_user_has_no_messages_or_followers() {
        let db = test_db();
        let u = add_user(&db, "testuser");

        assert_eq!(u.image_url, DEFAULT_IMAGE_URL);
        assert_eq!(u.header_image_url, DEFAULT_HEADER_IMAGE_URL);
        assert_eq!(db.user_stats(&u.id).unwrap(), UserStats::default());
        assert!(db.messages_for_user(&u.id, 100).unwrap().is_empty());
        assert!(db.followers(&u.id).unwrap().is_empty());
    }

    #[test]
    fn unique_user_is_retrievable() {
        let db = test_db();
        let u = add_user(&db, "testuser");

        let by_name = db.get_user_by_username("testuser").unwrap().unwrap();
        assert_eq!(by_name.id, u.id);
        assert_eq!(by_name.email, "testuser@test.com");
        assert!(db.get_user_by_id(&u.id).unwrap().is_some());
        assert!(db.get_user_by_id(&new_id()).unwrap().is_none());
    }

    #[test]
    fn duplicate_username_is_integrity_error() {
        let db = test_db();
        add_user(&db, "testuser");

        let err = db
            .create_user(
                &new_id(),
                &NewUser {
                    username: "testuser",
                    email: "other@test.com",
                    password_hash: "HASHED_PASSWORD",
                    image_url: None,
                },
            )
            .unwrap_err();
        assert!(err.is_integrity(), "unexpected error: {err}");
    }

    #[test]
    fn duplicate_email_is_integrity_error() {
        let db = test_db();
        add_user(&db, "testuser");

        let err = db
            .create_user(
                &new_id(),
                &NewUser {
                    username: "someoneelse",
                    email: "testuser@test.com",
                    password_hash: "HASHED_PASSWORD",
                    image_url: None,
                },
            )
            .unwrap_err();
        assert!(err.is_integrity(), "unexpected error: {err}");
    }

    #[test]
    fn message_over_140_chars_is_data_error() {
        let db = test_db();
        let u = add_user(&db, "testuser");

        let err = db
            .create_message(&new_id(), &u.id, &"x".repeat(141))
            .unwrap_err();
        assert!(err.is_data(), "unexpected error: {err}");
        assert_eq!(db.user_stats(&u.id).unwrap().messages, 0);
    }

    #[test]
    fn message_length_counts_characters_not_bytes() {
        let db = test_db();
        let u = add_user(&db, "testuser");

        let text = "é".repeat(140);
        let m = db.create_message(&new_id(), &u.id, &text).unwrap();
        assert_eq!(m.text, text);
        assert_eq!(m.username, "testuser");
    }

    #[test]
    fn message_for_missing_user_is_integrity_error() {
        let db = test_db();

        let err = db
            .create_message(&new_id(), &new_id(), "Test for message")
            .unwrap_err();
        assert!(err.is_integrity(), "unexpected error: {err}");
    }

    #[test]
    fn follow_is_directed() {
        let db = test_db();
        let u = add_user(&db, "u1");
        let u2 = add_user(&db, "u2");
        let u3 = add_user(&db, "u3");

        db.follow(&u.id, &u2.id).unwrap();

        assert!(db.is_following(&u.id, &u2.id).unwrap());
        assert!(db.is_followed_by(&u2.id, &u.id).unwrap());
        assert!(!db.is_following(&u2.id, &u.id).unwrap());
        assert!(!db.is_following(&u.id, &u3.id).unwrap());

        let following: Vec<String> = db.following(&u.id).unwrap().into_iter().map(|r| r.username).collect();
        assert_eq!(following, vec!["u2"]);
        let followers: Vec<String> = db.followers(&u2.id).unwrap().into_iter().map(|r| r.username).collect();
        assert_eq!(followers, vec!["u1"]);
        assert!(db.following_ids(&u.id).unwrap().contains(&u2.id));
    }

    #[test]
    fn duplicate_follow_is_integrity_error() {
        let db = test_db();
        let u = add_user(&db, "u1");
        let u2 = add_user(&db, "u2");

        db.follow(&u.id, &u2.id).unwrap();
        let err = db.follow(&u.id, &u2.id).unwrap_err();
        assert!(err.is_integrity(), "unexpected error: {err}");
    }

    #[test]
    fn unfollow_is_idempotent() {
        let db = test_db();
        let u = add_user(&db, "u1");
        let u2 = add_user(&db, "u2");

        db.follow(&u.id, &u2.id).unwrap();
        assert!(db.unfollow(&u.id, &u2.id).unwrap());
        assert!(!db.unfollow(&u.id, &u2.id).unwrap());
        assert!(!db.is_following(&u.id, &u2.id).unwrap());
    }

    #[test]
    fn self_follow_is_not_rejected_by_schema() {
        let db = test_db();
        let u = add_user(&db, "u1");

        db.follow(&u.id, &u.id).unwrap();
        assert!(db.is_following(&u.id, &u.id).unwrap());
    }

    #[test]
    fn deleting_message_drops_owner_count_by_one() {
        let db = test_db();
        let u = add_user(&db, "testuser");

        let m1 = db.create_message(&new_id(), &u.id, "testing").unwrap();
        db.create_message(&new_id(), &u.id, "testing2").unwrap();
        assert_eq!(db.messages_for_user(&u.id, 100).unwrap().len(), 2);

        assert!(db.delete_message(&m1.id, &u.id).unwrap());

        let remaining = db.messages_for_user(&u.id, 100).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].text, "testing2");
    }

    #[test]
    fn only_owner_can_delete_message() {
        let db = test_db();
        let owner = add_user(&db, "owner");
        let other = add_user(&db, "other");

        let m = db.create_message(&new_id(), &owner.id, "mine").unwrap();
        assert!(!db.delete_message(&m.id, &other.id).unwrap());
        assert!(db.get_message(&m.id).unwrap().is_some());
    }

    #[test]
    fn messages_are_newest_first() {
        let db = test_db();
        let u = add_user(&db, "testuser");

        for text in ["first", "second", "third"] {
            db.create_message(&new_id(), &u.id, text).unwrap();
        }

        let texts: Vec<String> = db
            .messages_for_user(&u.id, 2)
            .unwrap()
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, vec!["third", "second"]);
    }

    #[test]
    fn home_feed_covers_self_and_followed_only() {
        let db = test_db();
        let u = add_user(&db, "u1");
        let followed = add_user(&db, "u2");
        let stranger = add_user(&db, "u3");

        db.follow(&u.id, &followed.id).unwrap();
        db.create_message(&new_id(), &u.id, "own").unwrap();
        db.create_message(&new_id(), &followed.id, "followed").unwrap();
        db.create_message(&new_id(), &stranger.id, "stranger").unwrap();

        let mut texts: Vec<String> = db
            .home_feed(&u.id, 100)
            .unwrap()
            .into_iter()
            .map(|m| m.text)
            .collect();
        texts.sort();
        assert_eq!(texts, vec!["followed", "own"]);
    }

    #[test]
    fn deleting_user_cascades() {
        let db = test_db();
        let u = add_user(&db, "u1");
        let u2 = add_user(&db, "u2");

        let m = db.create_message(&new_id(), &u.id, "bye").unwrap();
        db.follow(&u.id, &u2.id).unwrap();
        db.follow(&u2.id, &u.id).unwrap();
        db.toggle_like(&new_id(), &u2.id, &m.id).unwrap();

        assert!(db.delete_user(&u.id).unwrap());

        assert!(db.get_message(&m.id).unwrap().is_none());
        assert_eq!(db.user_stats(&u2.id).unwrap(), UserStats::default());
        assert!(!db.delete_user(&u.id).unwrap());
    }

    #[test]
    fn update_user_enforces_uniqueness() {
        let db = test_db();
        let u = add_user(&db, "u1");
        add_user(&db, "u2");

        let ok = db
            .update_user(
                &u.id,
                &UserUpdate {
                    username: "renamed",
                    email: "renamed@test.com",
                    image_url: Some("http://img/a.png"),
                    header_image_url: None,
                    bio: Some("hello"),
                    location: None,
                },
            )
            .unwrap();
        assert!(ok);
        let row = db.get_user_by_id(&u.id).unwrap().unwrap();
        assert_eq!(row.username, "renamed");
        assert_eq!(row.image_url, "http://img/a.png");
        assert_eq!(row.bio.as_deref(), Some("hello"));

        let err = db
            .update_user(
                &u.id,
                &UserUpdate {
                    username: "u2",
                    email: "renamed@test.com",
                    image_url: None,
                    header_image_url: None,
                    bio: None,
                    location: None,
                },
            )
            .unwrap_err();
        assert!(err.is_integrity());
    }

    #[test]
    fn search_matches_substring_literally() {
        let db = test_db();
        add_user(&db, "alice");
        add_user(&db, "malice");
        add_user(&db, "bob");
        add_user(&db, "per_cent");

        let names = |q: Option<&str>| -> Vec<String> {
            db.search_users(q).unwrap().into_iter().map(|u| u.username).collect()
        };

        assert_eq!(names(Some("ALIC")), vec!["alice", "malice"]);
        assert_eq!(names(Some("_")), vec!["per_cent"]);
        assert_eq!(names(None).len(), 4);
        assert_eq!(names(Some("  ")).len(), 4);
    }

    #[test]
    fn toggle_like_twice_leaves_nothing() {
        let db = test_db();
        let author = add_user(&db, "author");
        let fan = add_user(&db, "fan");
        let m = db.create_message(&new_id(), &author.id, "likeable").unwrap();

        assert!(db.toggle_like(&new_id(), &fan.id, &m.id).unwrap());
        assert!(db.liked_message_ids(&fan.id).unwrap().contains(&m.id));
        assert_eq!(db.liked_messages(&fan.id).unwrap().len(), 1);

        assert!(!db.toggle_like(&new_id(), &fan.id, &m.id).unwrap());
        assert!(db.liked_messages(&fan.id).unwrap().is_empty());
    }

    #[test]
    fn connect_accepts_memory_url() {
        let db = Database::connect("sqlite://:memory:").unwrap();
        add_user(&db, "someone");
        assert_eq!(db.search_users(None).unwrap().len(), 1);
    }
}

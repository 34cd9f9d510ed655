use crate::Database;
use crate::error::{ConstraintViolation, classify};
use crate::models::{
    MESSAGE_COLUMNS, MessageRow, NewUser, ProfileUpdate, USER_COLUMNS, UserRow, avatar_or_default,
};
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::info;
use warbler_types::MAX_MESSAGE_LEN;
use warbler_types::models::Profile;

impl Database {
    // -- Users --

    /// Inserts a user whose password has already been hashed.
    /// Most callers want [`Database::signup`] instead.
    pub fn create_user(&self, new: &NewUser, password_hash: &str) -> Result<UserRow> {
        let id = self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (email, username, image_url, header_image_url, bio, location, password)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    new.email,
                    new.username,
                    avatar_or_default(new.image_url.as_deref()),
                    new.header_image_url,
                    new.bio,
                    new.location,
                    password_hash,
                ],
            )
            .map_err(classify)?;
            Ok(conn.last_insert_rowid())
        })?;

        info!(user_id = id, username = %new.username, "User created");
        self.get_user_by_id(id)?
            .ok_or_else(|| anyhow::anyhow!("User {} vanished after insert", id))
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM users u WHERE u.username = ?1", USER_COLUMNS);
            Ok(conn.query_row(&sql, [username], UserRow::from_row).optional()?)
        })
    }

    /// Applies a profile edit. Returns `None` when the user does not exist.
    pub fn update_profile(&self, id: i64, update: &ProfileUpdate) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE users SET
                        email = COALESCE(?2, email),
                        username = COALESCE(?3, username),
                        image_url = COALESCE(?4, image_url),
                        header_image_url = COALESCE(?5, header_image_url),
                        bio = COALESCE(?6, bio),
                        location = COALESCE(?7, location)
                     WHERE id = ?1",
                    params![
                        id,
                        update.email,
                        update.username,
                        update
                            .image_url
                            .as_deref()
                            .map(|url| avatar_or_default(Some(url))),
                        update.header_image_url,
                        update.bio,
                        update.location,
                    ],
                )
                .map_err(classify)?;

            if changed == 0 {
                return Ok(None);
            }
            query_user_by_id(conn, id)
        })
    }

    /// Deletes a user. Their messages, follows in both directions and likes
    /// go with them through `ON DELETE CASCADE`.
    pub fn delete_user(&self, id: i64) -> Result<bool> {
        let deleted = self.with_conn(|conn| Ok(conn.execute("DELETE FROM users WHERE id = ?1", [id])?))?;
        if deleted > 0 {
            info!(user_id = id, "User deleted");
        }
        Ok(deleted > 0)
    }

    /// Profile page data: the user plus message, follower, following and like counts.
    pub fn profile(&self, id: i64) -> Result<Option<Profile>> {
        self.with_conn(|conn| {
            let Some(user) = query_user_by_id(conn, id)? else {
                return Ok(None);
            };

            Ok(Some(Profile {
                user: user.into(),
                messages: count(conn, "SELECT COUNT(*) FROM messages WHERE user_id = ?1", id)?,
                followers: count(conn, "SELECT COUNT(*) FROM follows WHERE followee_id = ?1", id)?,
                following: count(conn, "SELECT COUNT(*) FROM follows WHERE follower_id = ?1", id)?,
                likes: count(conn, "SELECT COUNT(*) FROM likes WHERE user_id = ?1", id)?,
            }))
        })
    }

    // -- Messages --

    pub fn insert_message(&self, user_id: i64, text: &str) -> Result<MessageRow> {
        // SQLite's length() stops at the first NUL, so count here as well
        if text.chars().count() > MAX_MESSAGE_LEN {
            return Err(ConstraintViolation::MessageTooLong.into());
        }

        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "INSERT INTO messages (text, user_id) VALUES (?1, ?2)
                     RETURNING id, text, timestamp, user_id",
                    params![text, user_id],
                    MessageRow::from_row,
                )
                .map_err(classify)?;
            Ok(row)
        })
    }

    pub fn get_message(&self, id: i64) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM messages m WHERE m.id = ?1", MESSAGE_COLUMNS);
            Ok(conn.query_row(&sql, [id], MessageRow::from_row).optional()?)
        })
    }

    /// A user's own messages, newest first.
    pub fn messages_for_user(&self, user_id: i64, limit: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM messages m
                 WHERE m.user_id = ?1
                 ORDER BY m.timestamp DESC, m.id DESC
                 LIMIT ?2",
                MESSAGE_COLUMNS
            );
            query_messages(conn, &sql, params![user_id, limit])
        })
    }

    /// Home feed: messages by the user and everyone they follow, newest first.
    pub fn timeline(&self, user_id: i64, limit: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM messages m
                 WHERE m.user_id = ?1
                    OR m.user_id IN (SELECT followee_id FROM follows WHERE follower_id = ?1)
                 ORDER BY m.timestamp DESC, m.id DESC
                 LIMIT ?2",
                MESSAGE_COLUMNS
            );
            query_messages(conn, &sql, params![user_id, limit])
        })
    }

    /// Deletes a message and, by cascade, every like on it.
    pub fn delete_message(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM messages WHERE id = ?1", [id])? > 0))
    }
}

pub(crate) fn query_user_by_id(conn: &Connection, id: i64) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {} FROM users u WHERE u.id = ?1", USER_COLUMNS);
    Ok(conn.query_row(&sql, [id], UserRow::from_row).optional()?)
}

pub(crate) fn query_users(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<UserRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, UserRow::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub(crate) fn query_messages(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<MessageRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, MessageRow::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub(crate) fn count(conn: &Connection, sql: &str, id: i64) -> Result<u64> {
    let n: i64 = conn.query_row(sql, [id], |r| r.get(0))?;
    Ok(n as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{db, user};

    fn violation(err: &anyhow::Error) -> Option<ConstraintViolation> {
        err.downcast_ref::<ConstraintViolation>().copied()
    }

    #[test]
    fn create_user_applies_default_avatar() {
        let db = db();
        let alice = user(&db, "alice");

        assert_eq!(alice.image_url, warbler_types::DEFAULT_IMAGE_URL);
        assert_eq!(alice.email, "alice@example.com");
        assert_eq!(db.get_user_by_id(alice.id).unwrap(), Some(alice.clone()));
        assert_eq!(db.get_user_by_username("alice").unwrap(), Some(alice));
        assert_eq!(db.get_user_by_username("nobody").unwrap(), None);
    }

    #[test]
    fn duplicate_username_and_email_are_classified() {
        let db = db();
        user(&db, "alice");

        let same_name = NewUser {
            email: "other@example.com".into(),
            username: "alice".into(),
            ..Default::default()
        };
        let err = db.create_user(&same_name, "x").unwrap_err();
        assert_eq!(violation(&err), Some(ConstraintViolation::DuplicateUsername));

        let same_email = NewUser {
            email: "alice@example.com".into(),
            username: "alice2".into(),
            ..Default::default()
        };
        let err = db.create_user(&same_email, "x").unwrap_err();
        assert_eq!(violation(&err), Some(ConstraintViolation::DuplicateEmail));
    }

    #[test]
    fn update_profile_changes_only_given_fields() {
        let db = db();
        let alice = user(&db, "alice");

        let updated = db
            .update_profile(
                alice.id,
                &ProfileUpdate {
                    bio: Some("birdwatcher".into()),
                    location: Some("Oakland".into()),
                    image_url: Some(String::new()),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();

        assert_eq!(updated.username, "alice");
        assert_eq!(updated.bio.as_deref(), Some("birdwatcher"));
        assert_eq!(updated.location.as_deref(), Some("Oakland"));
        assert_eq!(updated.image_url, warbler_types::DEFAULT_IMAGE_URL);

        assert_eq!(db.update_profile(9999, &ProfileUpdate::default()).unwrap(), None);
    }

    #[test]
    fn update_profile_reports_taken_username() {
        let db = db();
        let alice = user(&db, "alice");
        user(&db, "bob");

        let err = db
            .update_profile(
                alice.id,
                &ProfileUpdate {
                    username: Some("bob".into()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert_eq!(violation(&err), Some(ConstraintViolation::DuplicateUsername));
    }

    #[test]
    fn insert_message_sets_timestamp() {
        let db = db();
        let alice = user(&db, "alice");

        let before = chrono::Utc::now() - chrono::Duration::seconds(5);
        let msg = db.insert_message(alice.id, "hello world").unwrap();

        assert_eq!(msg.text, "hello world");
        assert_eq!(msg.user_id, alice.id);
        assert!(msg.timestamp > before);
        assert_eq!(db.get_message(msg.id).unwrap(), Some(msg));
    }

    #[test]
    fn message_length_limit() {
        let db = db();
        let alice = user(&db, "alice");

        let exact = "a".repeat(140);
        assert!(db.insert_message(alice.id, &exact).is_ok());

        // counted in characters, not bytes
        let multibyte = "é".repeat(140);
        assert!(db.insert_message(alice.id, &multibyte).is_ok());

        let long = "a".repeat(141);
        let err = db.insert_message(alice.id, &long).unwrap_err();
        assert_eq!(violation(&err), Some(ConstraintViolation::MessageTooLong));
    }

    #[test]
    fn message_with_nul_cannot_exceed_limit() {
        let db = db();
        let alice = user(&db, "alice");

        let long = format!("a\0{}", "b".repeat(300));
        let err = db.insert_message(alice.id, &long).unwrap_err();
        assert_eq!(violation(&err), Some(ConstraintViolation::MessageTooLong));
        assert!(db.messages_for_user(alice.id, 10).unwrap().is_empty());

        let at_limit = format!("a\0{}", "b".repeat(MAX_MESSAGE_LEN));
        assert!(db.insert_message(alice.id, &at_limit).is_err());
    }

    #[test]
    fn schema_rejects_nul_in_text() {
        let db = db();
        let alice = user(&db, "alice");

        let raw = db.with_conn(|conn| {
            Ok(conn.execute(
                "INSERT INTO messages (text, user_id) VALUES (?1, ?2)",
                params![format!("a\0{}", "b".repeat(300)), alice.id],
            )?)
        });
        assert!(raw.is_err());
        assert!(db.messages_for_user(alice.id, 10).unwrap().is_empty());
    }

    #[test]
    fn message_for_missing_user_is_rejected() {
        let db = db();
        let err = db.insert_message(42, "orphan").unwrap_err();
        assert_eq!(violation(&err), Some(ConstraintViolation::MissingReference));
    }

    #[test]
    fn messages_for_user_newest_first_with_limit() {
        let db = db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");

        let first = db.insert_message(alice.id, "one").unwrap();
        let second = db.insert_message(alice.id, "two").unwrap();
        let third = db.insert_message(alice.id, "three").unwrap();
        db.insert_message(bob.id, "bob's").unwrap();

        let ids: Vec<i64> = db
            .messages_for_user(alice.id, 10)
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec![third.id, second.id, first.id]);

        assert_eq!(db.messages_for_user(alice.id, 2).unwrap().len(), 2);
    }

    #[test]
    fn timeline_includes_own_and_followed_only() {
        let db = db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        let carol = user(&db, "carol");

        db.follow(alice.id, bob.id).unwrap();

        let own = db.insert_message(alice.id, "mine").unwrap();
        let followed = db.insert_message(bob.id, "from bob").unwrap();
        db.insert_message(carol.id, "from carol").unwrap();

        let mut ids: Vec<i64> = db
            .timeline(alice.id, 100)
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec![own.id, followed.id]);

        // following is one-directional
        let bob_feed = db.timeline(bob.id, 100).unwrap();
        assert_eq!(bob_feed.len(), 1);
        assert_eq!(bob_feed[0].id, followed.id);
    }

    #[test]
    fn profile_counts() {
        let db = db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");

        let msg = db.insert_message(bob.id, "likeable").unwrap();
        db.insert_message(alice.id, "hi").unwrap();
        db.follow(alice.id, bob.id).unwrap();
        db.like(alice.id, msg.id).unwrap();

        let profile = db.profile(alice.id).unwrap().unwrap();
        assert_eq!(profile.user.username, "alice");
        assert_eq!(profile.messages, 1);
        assert_eq!(profile.followers, 0);
        assert_eq!(profile.following, 1);
        assert_eq!(profile.likes, 1);

        let profile = db.profile(bob.id).unwrap().unwrap();
        assert_eq!(profile.followers, 1);
        assert_eq!(profile.following, 0);

        assert_eq!(db.profile(9999).unwrap(), None);
    }

    #[test]
    fn delete_message_removes_likes() {
        let db = db();
        let alice = user(&db, "alice");
        let msg = db.insert_message(alice.id, "soon gone").unwrap();
        db.like(alice.id, msg.id).unwrap();

        assert!(db.delete_message(msg.id).unwrap());
        assert!(!db.delete_message(msg.id).unwrap());
        assert_eq!(db.total_likes(alice.id).unwrap(), 0);
    }
}

use crate::Database;
use crate::error::classify;
use crate::models::{MESSAGE_COLUMNS, MessageRow, USER_COLUMNS, UserRow};
use crate::queries::{query_messages, query_users};
use anyhow::Result;
use rusqlite::{Connection, params};
use tracing::debug;

impl Database {
    // -- Follows --

    /// Records that `follower_id` follows `followee_id`.
    /// Returns `false` when the follow already existed.
    pub fn follow(&self, follower_id: i64, followee_id: i64) -> Result<bool> {
        let inserted = self.with_conn(|conn| {
            let n = conn
                .execute(
                    "INSERT INTO follows (follower_id, followee_id) VALUES (?1, ?2)
                     ON CONFLICT (follower_id, followee_id) DO NOTHING",
                    params![follower_id, followee_id],
                )
                .map_err(classify)?;
            Ok(n > 0)
        })?;

        debug!(follower_id, followee_id, inserted, "follow");
        Ok(inserted)
    }

    /// Returns whether a follow was removed.
    pub fn unfollow(&self, follower_id: i64, followee_id: i64) -> Result<bool> {
        let removed = self.with_conn(|conn| {
            let n = conn.execute(
                "DELETE FROM follows WHERE follower_id = ?1 AND followee_id = ?2",
                params![follower_id, followee_id],
            )?;
            Ok(n > 0)
        })?;

        debug!(follower_id, followee_id, removed, "unfollow");
        Ok(removed)
    }

    /// Whether `other_id` is among `user_id`'s followers.
    pub fn is_followed_by(&self, user_id: i64, other_id: i64) -> Result<bool> {
        self.with_conn(|conn| follow_exists(conn, other_id, user_id))
    }

    /// Whether `user_id` follows `other_id`.
    pub fn is_following(&self, user_id: i64, other_id: i64) -> Result<bool> {
        self.with_conn(|conn| follow_exists(conn, user_id, other_id))
    }

    /// Users following `user_id`, ordered by username.
    pub fn followers(&self, user_id: i64) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM follows f
                 JOIN users u ON u.id = f.follower_id
                 WHERE f.followee_id = ?1
                 ORDER BY u.username",
                USER_COLUMNS
            );
            query_users(conn, &sql, [user_id])
        })
    }

    /// Users `user_id` follows, ordered by username.
    pub fn following(&self, user_id: i64) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM follows f
                 JOIN users u ON u.id = f.followee_id
                 WHERE f.follower_id = ?1
                 ORDER BY u.username",
                USER_COLUMNS
            );
            query_users(conn, &sql, [user_id])
        })
    }

    // -- Likes --

    /// Returns `false` when the like already existed.
    pub fn like(&self, user_id: i64, message_id: i64) -> Result<bool> {
        self.with_conn(|conn| insert_like(conn, user_id, message_id))
    }

    /// Returns whether a like was removed.
    pub fn unlike(&self, user_id: i64, message_id: i64) -> Result<bool> {
        self.with_conn(|conn| delete_like(conn, user_id, message_id))
    }

    /// Toggle a like: removes it if present, adds it otherwise.
    /// Returns true if the message is liked afterwards.
    pub fn toggle_like(&self, user_id: i64, message_id: i64) -> Result<bool> {
        let liked = self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let liked = if like_exists(&tx, user_id, message_id)? {
                delete_like(&tx, user_id, message_id)?;
                false
            } else {
                insert_like(&tx, user_id, message_id)?;
                true
            };

            tx.commit()?;
            Ok(liked)
        })?;

        debug!(user_id, message_id, liked, "toggle_like");
        Ok(liked)
    }

    pub fn has_liked(&self, user_id: i64, message_id: i64) -> Result<bool> {
        self.with_conn(|conn| like_exists(conn, user_id, message_id))
    }

    /// Number of messages `user_id` has liked.
    pub fn total_likes(&self, user_id: i64) -> Result<u64> {
        self.with_conn(|conn| {
            crate::queries::count(conn, "SELECT COUNT(*) FROM likes WHERE user_id = ?1", user_id)
        })
    }

    /// Messages `user_id` has liked, newest first.
    pub fn liked_messages(&self, user_id: i64) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM likes l
                 JOIN messages m ON m.id = l.message_id
                 WHERE l.user_id = ?1
                 ORDER BY m.timestamp DESC, m.id DESC",
                MESSAGE_COLUMNS
            );
            query_messages(conn, &sql, [user_id])
        })
    }

    /// Users who liked `message_id`, ordered by username.
    pub fn liked_by(&self, message_id: i64) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM likes l
                 JOIN users u ON u.id = l.user_id
                 WHERE l.message_id = ?1
                 ORDER BY u.username",
                USER_COLUMNS
            );
            query_users(conn, &sql, [message_id])
        })
    }
}

fn follow_exists(conn: &Connection, follower_id: i64, followee_id: i64) -> Result<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM follows WHERE follower_id = ?1 AND followee_id = ?2)",
        params![follower_id, followee_id],
        |r| r.get(0),
    )?;
    Ok(exists)
}

fn like_exists(conn: &Connection, user_id: i64, message_id: i64) -> Result<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM likes WHERE user_id = ?1 AND message_id = ?2)",
        params![user_id, message_id],
        |r| r.get(0),
    )?;
    Ok(exists)
}

fn insert_like(conn: &Connection, user_id: i64, message_id: i64) -> Result<bool> {
    let n = conn
        .execute(
            "INSERT INTO likes (user_id, message_id) VALUES (?1, ?2)
             ON CONFLICT (message_id, user_id) DO NOTHING",
            params![user_id, message_id],
        )
        .map_err(classify)?;
    Ok(n > 0)
}

fn delete_like(conn: &Connection, user_id: i64, message_id: i64) -> Result<bool> {
    let n = conn.execute(
        "DELETE FROM likes WHERE user_id = ?1 AND message_id = ?2",
        params![user_id, message_id],
    )?;
    Ok(n > 0)
}

//! Users and the social graph around them.

use super::{Message, Notification, Post};
use crate::error::{BlogError, Result};
use crate::store::{Database, Entity, EntryId, Page, Pagination, Session, Unindexed};
use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

/// A registered user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Option<i64>,
    pub username: String,
    pub email: String,
    pub about_me: Option<String>,
    pub last_seen: DateTime<Utc>,
    /// Last time the user opened their messages.
    pub last_message_read_time: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: None,
            username: username.into(),
            email: email.into(),
            about_me: None,
            last_seen: Utc::now(),
            last_message_read_time: None,
        }
    }

    /// Gravatar URL for this user's email, falling back to an identicon.
    pub fn avatar(&self, size: u32) -> String {
        let digest = Md5::digest(self.email.to_lowercase().as_bytes());
        format!(
            "https://www.gravatar.com/avatar/{}?d=identicon&s={}",
            hex::encode(digest),
            size
        )
    }

    fn require_id(&self) -> Result<i64> {
        self.id.ok_or_else(|| {
            BlogError::validation("id", format!("user {} is not persisted", self.username))
        })
    }

    pub fn find_by_username(db: &Database, username: &str) -> Result<Option<User>> {
        Self::find_by(db, "username", username)
    }

    pub fn find_by_email(db: &Database, email: &str) -> Result<Option<User>> {
        Self::find_by(db, "email", email)
    }

    fn find_by(db: &Database, column: &str, value: &str) -> Result<Option<User>> {
        db.with_connection(|conn| {
            let sql = format!("{} WHERE {} = ?1", Self::select_clause(), column);
            Ok(conn
                .query_row(&sql, params![value], |row| Self::from_row(row))
                .optional()?)
        })
    }

    /// Stage following `other`. Following twice is a no-op.
    pub fn follow(&self, session: &mut Session<'_>, other: &User) -> Result<()> {
        let (me, them) = (self.require_id()?, other.require_id()?);
        session.execute(
            "INSERT OR IGNORE INTO followers (follower_id, followed_id) VALUES (?1, ?2)",
            vec![Value::Integer(me), Value::Integer(them)],
        );
        Ok(())
    }

    /// Stage unfollowing `other`.
    pub fn unfollow(&self, session: &mut Session<'_>, other: &User) -> Result<()> {
        let (me, them) = (self.require_id()?, other.require_id()?);
        session.execute(
            "DELETE FROM followers WHERE follower_id = ?1 AND followed_id = ?2",
            vec![Value::Integer(me), Value::Integer(them)],
        );
        Ok(())
    }

    pub fn is_following(&self, db: &Database, other: &User) -> Result<bool> {
        let (me, them) = (self.require_id()?, other.require_id()?);
        db.with_connection(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM followers WHERE follower_id = ?1 AND followed_id = ?2",
                params![me, them],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    pub fn followers_count(&self, db: &Database) -> Result<usize> {
        let me = self.require_id()?;
        count(db, "SELECT COUNT(*) FROM followers WHERE followed_id = ?1", me)
    }

    pub fn following_count(&self, db: &Database) -> Result<usize> {
        let me = self.require_id()?;
        count(db, "SELECT COUNT(*) FROM followers WHERE follower_id = ?1", me)
    }

    pub fn posts_count(&self, db: &Database) -> Result<usize> {
        let me = self.require_id()?;
        count(db, "SELECT COUNT(*) FROM post WHERE user_id = ?1", me)
    }

    /// Users following this user, by username.
    pub fn followers(&self, db: &Database, pagination: Pagination) -> Result<Page<User>> {
        let me = self.require_id()?;
        page_of::<User>(
            db,
            "id IN (SELECT follower_id FROM followers WHERE followed_id = ?1)",
            "username",
            me,
            pagination,
        )
    }

    /// Users this user follows, by username.
    pub fn following(&self, db: &Database, pagination: Pagination) -> Result<Page<User>> {
        let me = self.require_id()?;
        page_of::<User>(
            db,
            "id IN (SELECT followed_id FROM followers WHERE follower_id = ?1)",
            "username",
            me,
            pagination,
        )
    }

    /// Own posts plus posts of followed users, newest first.
    pub fn following_posts(&self, db: &Database, pagination: Pagination) -> Result<Page<Post>> {
        let me = self.require_id()?;
        page_of::<Post>(
            db,
            "user_id = ?1 OR user_id IN (SELECT followed_id FROM followers WHERE follower_id = ?1)",
            "timestamp DESC, id DESC",
            me,
            pagination,
        )
    }

    /// This user's posts, newest first.
    pub fn posts(&self, db: &Database, pagination: Pagination) -> Result<Page<Post>> {
        let me = self.require_id()?;
        page_of::<Post>(db, "user_id = ?1", "timestamp DESC, id DESC", me, pagination)
    }

    /// Received messages, newest first.
    pub fn messages_received(
        &self,
        db: &Database,
        pagination: Pagination,
    ) -> Result<Page<Message>> {
        let me = self.require_id()?;
        page_of::<Message>(db, "recipient_id = ?1", "timestamp DESC, id DESC", me, pagination)
    }

    /// Sent messages, newest first.
    pub fn messages_sent(&self, db: &Database, pagination: Pagination) -> Result<Page<Message>> {
        let me = self.require_id()?;
        page_of::<Message>(db, "sender_id = ?1", "timestamp DESC, id DESC", me, pagination)
    }

    /// Received messages newer than the last time the user read them.
    pub fn unread_message_count(&self, db: &Database) -> Result<usize> {
        let me = self.require_id()?;
        match self.last_message_read_time {
            Some(since) => db.with_connection(|conn| {
                let count: usize = conn.query_row(
                    "SELECT COUNT(*) FROM message WHERE recipient_id = ?1 AND timestamp > ?2",
                    params![me, since],
                    |row| row.get(0),
                )?;
                Ok(count)
            }),
            None => count(db, "SELECT COUNT(*) FROM message WHERE recipient_id = ?1", me),
        }
    }

    /// Record that messages were read; stage the user with `Session::update` to persist.
    pub fn mark_messages_read(&mut self, at: DateTime<Utc>) {
        self.last_message_read_time = Some(at);
    }

    /// Replace any notification of the same name with a new one.
    pub fn add_notification(
        &self,
        session: &mut Session<'_>,
        name: &str,
        data: &serde_json::Value,
    ) -> Result<EntryId> {
        let me = self.require_id()?;
        session.execute(
            "DELETE FROM notification WHERE user_id = ?1 AND name = ?2",
            vec![Value::Integer(me), Value::Text(name.to_string())],
        );
        let notification = Notification::new(me, name, data)?;
        Ok(session.add(notification))
    }

    /// Notifications newer than `since` (epoch seconds), oldest first.
    pub fn notifications_since(&self, db: &Database, since: f64) -> Result<Vec<Notification>> {
        let me = self.require_id()?;
        db.with_connection(|conn| {
            let sql = format!(
                "{} WHERE user_id = ?1 AND timestamp > ?2 ORDER BY timestamp ASC, id ASC",
                Notification::select_clause()
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![me, since], |row| Notification::from_row(row))?;
            let mut notifications = Vec::new();
            for row in rows {
                notifications.push(row?);
            }
            Ok(notifications)
        })
    }
}

fn count(db: &Database, sql: &str, id: i64) -> Result<usize> {
    db.with_connection(|conn| Ok(conn.query_row(sql, params![id], |row| row.get(0))?))
}

/// Page through `E` rows matching a filter bound to a single id parameter.
fn page_of<E: Entity>(
    db: &Database,
    filter: &str,
    order_by: &str,
    id: i64,
    pagination: Pagination,
) -> Result<Page<E>> {
    db.with_connection(|conn: &Connection| {
        let total: usize = conn.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE {}", E::TABLE, filter),
            params![id],
            |row| row.get(0),
        )?;

        let sql = format!(
            "{} WHERE {} ORDER BY {} LIMIT ?2 OFFSET ?3",
            E::select_clause(),
            filter,
            order_by
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![id, pagination.limit() as i64, pagination.offset() as i64],
            |row| E::from_row(row),
        )?;
        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }
        Ok(Page::new(items, total, pagination))
    })
}

impl Entity for User {
    const TABLE: &'static str = "user";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "username",
        "email",
        "about_me",
        "last_seen",
        "last_message_read_time",
    ];

    type Index = Unindexed;

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            username: row.get(1)?,
            email: row.get(2)?,
            about_me: row.get(3)?,
            last_seen: row.get(4)?,
            last_message_read_time: row.get(5)?,
        })
    }

    fn insert(&self, conn: &Connection) -> rusqlite::Result<i64> {
        conn.execute(
            "INSERT INTO user (id, username, email, about_me, last_seen, last_message_read_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                self.id,
                self.username,
                self.email,
                self.about_me,
                self.last_seen,
                self.last_message_read_time,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn update(&self, conn: &Connection) -> rusqlite::Result<usize> {
        conn.execute(
            "UPDATE user SET username = ?2, email = ?3, about_me = ?4, last_seen = ?5,
                             last_message_read_time = ?6
             WHERE id = ?1",
            params![
                self.id,
                self.username,
                self.email,
                self.about_me,
                self.last_seen,
                self.last_message_read_time,
            ],
        )
    }
}

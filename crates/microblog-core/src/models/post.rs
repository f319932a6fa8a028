//! Posts: the only searchable entity.

use crate::search::Searchable;
use crate::store::{Entity, Indexed};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

/// A short post authored by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: Option<i64>,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    pub user_id: i64,
    /// Language code supplied by the caller (detection happens upstream).
    pub language: Option<String>,
}

impl Post {
    pub fn new(user_id: i64, body: impl Into<String>) -> Self {
        Self {
            id: None,
            body: body.into(),
            timestamp: Utc::now(),
            user_id,
            language: None,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

impl Entity for Post {
    const TABLE: &'static str = "post";
    const COLUMNS: &'static [&'static str] = &["id", "body", "timestamp", "user_id", "language"];

    type Index = Indexed;

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            body: row.get(1)?,
            timestamp: row.get(2)?,
            user_id: row.get(3)?,
            language: row.get(4)?,
        })
    }

    fn insert(&self, conn: &Connection) -> rusqlite::Result<i64> {
        conn.execute(
            "INSERT INTO post (id, body, timestamp, user_id, language)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![self.id, self.body, self.timestamp, self.user_id, self.language],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn update(&self, conn: &Connection) -> rusqlite::Result<usize> {
        conn.execute(
            "UPDATE post SET body = ?2, timestamp = ?3, user_id = ?4, language = ?5
             WHERE id = ?1",
            params![self.id, self.body, self.timestamp, self.user_id, self.language],
        )
    }
}

impl Searchable for Post {
    const SEARCHABLE_FIELDS: &'static [&'static str] = &["body"];

    fn field_value(&self, field: &str) -> Option<String> {
        match field {
            "body" => Some(self.body.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::IndexSource;

    #[test]
    fn test_index_record_has_only_declared_fields() {
        let mut post = Post::new(1, "hello world").with_language("en");
        assert!(post.index_record().is_none());

        post.id = Some(12);
        let record = post.index_record().unwrap();
        assert_eq!(record.namespace, "post");
        assert_eq!(record.id, 12);
        assert_eq!(record.fields.len(), 1);
        assert_eq!(record.fields["body"], "hello world");
    }
}

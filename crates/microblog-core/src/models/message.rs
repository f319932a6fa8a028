//! Private messages between users.

use crate::store::{Entity, Unindexed};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Option<i64>,
    pub sender_id: i64,
    pub recipient_id: i64,
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(sender_id: i64, recipient_id: i64, body: impl Into<String>) -> Self {
        Self {
            id: None,
            sender_id,
            recipient_id,
            body: body.into(),
            timestamp: Utc::now(),
        }
    }
}

impl Entity for Message {
    const TABLE: &'static str = "message";
    const COLUMNS: &'static [&'static str] =
        &["id", "sender_id", "recipient_id", "body", "timestamp"];

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
            sender_id: row.get(1)?,
            recipient_id: row.get(2)?,
            body: row.get(3)?,
            timestamp: row.get(4)?,
        })
    }

    fn insert(&self, conn: &Connection) -> rusqlite::Result<i64> {
        conn.execute(
            "INSERT INTO message (id, sender_id, recipient_id, body, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![self.id, self.sender_id, self.recipient_id, self.body, self.timestamp],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn update(&self, conn: &Connection) -> rusqlite::Result<usize> {
        conn.execute(
            "UPDATE message SET sender_id = ?2, recipient_id = ?3, body = ?4, timestamp = ?5
             WHERE id = ?1",
            params![self.id, self.sender_id, self.recipient_id, self.body, self.timestamp],
        )
    }
}

//! Per-user notifications with a JSON payload.

use crate::error::Result;
use crate::store::{Entity, Unindexed};
use rusqlite::{params, Connection, Row};
use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Option<i64>,
    pub name: String,
    pub user_id: i64,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    pub payload_json: String,
}

impl Notification {
    pub fn new(user_id: i64, name: impl Into<String>, data: &serde_json::Value) -> Result<Self> {
        Ok(Self {
            id: None,
            name: name.into(),
            user_id,
            timestamp: epoch_seconds(),
            payload_json: serde_json::to_string(data)?,
        })
    }

    /// Decode the payload.
    pub fn data(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_str(&self.payload_json)?)
    }
}

fn epoch_seconds() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1e6
}

impl Entity for Notification {
    const TABLE: &'static str = "notification";
    const COLUMNS: &'static [&'static str] =
        &["id", "name", "user_id", "timestamp", "payload_json"];

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
            name: row.get(1)?,
            user_id: row.get(2)?,
            timestamp: row.get(3)?,
            payload_json: row.get(4)?,
        })
    }

    fn insert(&self, conn: &Connection) -> rusqlite::Result<i64> {
        conn.execute(
            "INSERT INTO notification (id, name, user_id, timestamp, payload_json)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![self.id, self.name, self.user_id, self.timestamp, self.payload_json],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn update(&self, conn: &Connection) -> rusqlite::Result<usize> {
        conn.execute(
            "UPDATE notification SET name = ?2, user_id = ?3, timestamp = ?4, payload_json = ?5
             WHERE id = ?1",
            params![self.id, self.name, self.user_id, self.timestamp, self.payload_json],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_roundtrip_through_json_text() {
        let data = serde_json::json!({"task_id": "abc", "progress": 40});
        let notification = Notification::new(1, "task_progress", &data).unwrap();
        assert!(notification.timestamp > 0.0);
        assert_eq!(notification.data().unwrap()["progress"], 40);
    }

    #[test]
    fn test_timestamp_tracks_wall_clock() {
        let before = Utc::now().timestamp() as f64;
        let notification =
            Notification::new(1, "unread_message_count", &serde_json::json!(0)).unwrap();
        let after = Utc::now().timestamp() as f64 + 1.0;
        assert!(notification.timestamp >= before && notification.timestamp <= after);
    }

    #[test]
    fn test_corrupt_payload_is_json_error() {
        let mut notification = Notification::new(1, "x", &serde_json::json!(null)).unwrap();
        notification.payload_json = "{not json".into();
        assert!(matches!(
            notification.data().unwrap_err(),
            crate::BlogError::Json { .. }
        ));
    }
}

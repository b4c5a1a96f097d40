//! Session persistence using SQLite
//!
//! Concurrent writers (e.g. two processes on the same database file) are
//! last-writer-wins; histories are never merged.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};

use crate::session::Session;
use crate::{Error, Result};

const ACTIVE_KEY: &str = "active_session";

/// SQLite-backed session store
pub struct SessionStore {
    conn: Connection,
}

impl SessionStore {
    /// Open a session store at the given database path
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        let store = Self { conn };
        store.init_tables()?;
        Ok(store)
    }

    /// Create an in-memory session store (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_tables()?;
        Ok(store)
    }

    fn init_tables(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                title TEXT,
                messages TEXT NOT NULL,
                context TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT
            )",
            [],
        )?;

        Ok(())
    }

    /// Save (insert or replace) a session
    pub fn save(&self, session: &Session) -> Result<()> {
        let messages_json = serde_json::to_string(&session.messages)?;
        let context_json = serde_json::to_string(&session.context)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO sessions (id, title, messages, context, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                session.id,
                session.title,
                messages_json,
                context_json,
                session.created_at.to_rfc3339(),
                session.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Load every session, in creation order
    pub fn load_all(&self) -> Result<Vec<Session>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, messages, context, created_at, updated_at FROM sessions
             ORDER BY created_at ASC",
        )?;

        let rows = stmt.query_map([], |row| {
            let messages_json: String = row.get(2)?;
            let messages = serde_json::from_str(&messages_json)
                .map_err(|_| rusqlite::Error::InvalidQuery)?;

            let context_json: String = row.get(3)?;
            let context = serde_json::from_str(&context_json)
                .map_err(|_| rusqlite::Error::InvalidQuery)?;

            let created_at_str: String = row.get(4)?;
            let updated_at_str: String = row.get(5)?;

            let created_at = DateTime::parse_from_rfc3339(&created_at_str)
                .map_err(|_| rusqlite::Error::InvalidQuery)?
                .with_timezone(&Utc);

            let updated_at = DateTime::parse_from_rfc3339(&updated_at_str)
                .map_err(|_| rusqlite::Error::InvalidQuery)?
                .with_timezone(&Utc);

            Ok(Session {
                id: row.get(0)?,
                title: row.get(1)?,
                messages,
                context,
                created_at,
                updated_at,
            })
        })?;

        let mut sessions = Vec::new();
        for session in rows {
            sessions.push(session?);
        }
        Ok(sessions)
    }

    /// Delete a session by ID
    pub fn delete(&self, id: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Delete every session and the active marker
    pub fn clear(&self) -> Result<()> {
        self.conn.execute("DELETE FROM sessions", [])?;
        self.conn
            .execute("DELETE FROM meta WHERE key = ?1", params![ACTIVE_KEY])?;
        Ok(())
    }

    /// Persist which session is active
    pub fn set_active(&self, id: Option<&str>) -> Result<()> {
        match id {
            Some(id) => {
                self.conn.execute(
                    "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
                    params![ACTIVE_KEY, id],
                )?;
            }
            None => {
                self.conn
                    .execute("DELETE FROM meta WHERE key = ?1", params![ACTIVE_KEY])?;
            }
        }
        Ok(())
    }

    /// Read back the persisted active session id
    pub fn active_session(&self) -> Result<Option<String>> {
        let result = self.conn.query_row(
            "SELECT value FROM meta WHERE key = ?1",
            params![ACTIVE_KEY],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(id) => Ok(Some(id)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Error::from(e)),
        }
    }

    /// Count stored sessions
    pub fn count(&self) -> Result<usize> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Message;

    #[test]
    fn test_save_and_load() {
        let store = SessionStore::in_memory().unwrap();
        let mut session = Session::new();
        session.add_message(Message::user("Busan please"));
        session.add_message(Message::assistant("Busan it is!"));

        store.save(&session).unwrap();
        let loaded = store.load_all().unwrap();

        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, session.id);
        assert_eq!(loaded[0].title.as_deref(), Some("Busan please"));
        assert_eq!(loaded[0].messages.len(), 2);
        assert_eq!(loaded[0].messages[0].content, "Busan please");
        assert_eq!(loaded[0].messages[1].content, "Busan it is!");
    }

    #[test]
    fn test_load_all_in_creation_order() {
        let store = SessionStore::in_memory().unwrap();
        let mut first = Session::new();
        let mut second = Session::new();
        // force distinct, ordered timestamps
        second.created_at = first.created_at + chrono::Duration::seconds(1);
        first.add_message(Message::user("first"));
        second.add_message(Message::user("second"));

        store.save(&second).unwrap();
        store.save(&first).unwrap();

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, first.id);
        assert_eq!(loaded[1].id, second.id);
    }

    #[test]
    fn test_delete_and_clear() {
        let store = SessionStore::in_memory().unwrap();
        let session = Session::new();
        let other = Session::new();
        store.save(&session).unwrap();
        store.save(&other).unwrap();

        store.delete(&session.id).unwrap();
        assert_eq!(store.count().unwrap(), 1);

        store.clear().unwrap();
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_active_session_round_trip() {
        let store = SessionStore::in_memory().unwrap();
        assert!(store.active_session().unwrap().is_none());

        store.set_active(Some("abc")).unwrap();
        assert_eq!(store.active_session().unwrap().as_deref(), Some("abc"));

        store.set_active(None).unwrap();
        assert!(store.active_session().unwrap().is_none());
    }

    #[test]
    fn test_reopen_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.db");
        let path = path.to_str().unwrap();

        let mut session = Session::new();
        session.add_message(Message::user("제주 2박3일"));
        {
            let store = SessionStore::open(path).unwrap();
            store.save(&session).unwrap();
            store.set_active(Some(&session.id)).unwrap();
        }

        let store = SessionStore::open(path).unwrap();
        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].messages[0].content, "제주 2박3일");
        assert_eq!(store.active_session().unwrap().as_deref(), Some(session.id.as_str()));
    }
}

//! Per-chat session storage.
//!
//! SQLite is the single source of truth for conversation state: which mode a
//! chat is in, the last quote it saw, its saved quotes, and how far a search
//! has paged. One handle is constructed at startup and injected into every
//! component that needs it. WAL mode for concurrent read access.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The mode governing which handler processes a chat's next message.
///
/// Stored as text; an unrecognized value is a hard error, not a silent
/// fallback. Only a *missing* record defaults (to [`SessionState::Menu`],
/// decided by the router).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// At the main menu, choosing what to see next.
    Menu,
    /// Asked for a search term, the next message is the query.
    AwaitingSearchTerm,
    /// Looking at a random quote, feedback buttons active.
    ShowingRandom,
    /// Paging through search results.
    ShowingSearchResult,
    /// Browsing previously saved quotes.
    ShowingSaved,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Menu => "menu",
            SessionState::AwaitingSearchTerm => "awaiting_search_term",
            SessionState::ShowingRandom => "showing_random",
            SessionState::ShowingSearchResult => "showing_search_result",
            SessionState::ShowingSaved => "showing_saved",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for SessionState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "menu" => Ok(SessionState::Menu),
            "awaiting_search_term" => Ok(SessionState::AwaitingSearchTerm),
            "showing_random" => Ok(SessionState::ShowingRandom),
            "showing_search_result" => Ok(SessionState::ShowingSearchResult),
            "showing_saved" => Ok(SessionState::ShowingSaved),
            _ => Err(Error::Other(format!("unknown session state: {s}"))),
        }
    }
}

/// Where a chat's search stands: the query, the next result index to show,
/// and the quote currently on screen (vote target).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchProgress {
    pub query: String,
    pub position: u32,
    pub quote_id: Option<String>,
}

/// One chat's session row, as listed by the operator CLI.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub chat_id: i64,
    pub state: SessionState,
    pub last_quote: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Session store handle. Owns the SQLite connection.
pub struct SessionStore {
    conn: Mutex<Connection>,
}

impl SessionStore {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init()?;
        Ok(store)
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<()> {
        let conn = self.lock();
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS sessions (
                chat_id     INTEGER PRIMARY KEY,
                state       TEXT NOT NULL DEFAULT 'menu',
                last_quote  TEXT,
                updated_at  TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS saved_quotes (
                chat_id   INTEGER NOT NULL,
                quote_id  TEXT NOT NULL,
                saved_at  TEXT NOT NULL,
                PRIMARY KEY (chat_id, quote_id)
            );

            CREATE TABLE IF NOT EXISTS searches (
                chat_id   INTEGER PRIMARY KEY,
                query     TEXT NOT NULL,
                position  INTEGER NOT NULL DEFAULT 0,
                quote_id  TEXT
            );
            ",
        )?;

        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("session store mutex poisoned")
    }

    // -----------------------------------------------------------------------
    // Session state
    // -----------------------------------------------------------------------

    /// Record which mode a chat is in.
    pub fn set_state(&self, chat_id: i64, state: SessionState) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.lock().execute(
            "INSERT INTO sessions (chat_id, state, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(chat_id) DO UPDATE SET state = ?2, updated_at = ?3",
            params![chat_id, state.to_string(), now],
        )?;
        Ok(())
    }

    /// The chat's recorded mode, or None if it has never been seen.
    pub fn state(&self, chat_id: i64) -> Result<Option<SessionState>> {
        let state: Option<String> = self
            .lock()
            .query_row(
                "SELECT state FROM sessions WHERE chat_id = ?1",
                params![chat_id],
                |row| row.get(0),
            )
            .optional()?;

        state.map(|s| s.parse()).transpose()
    }

    // -----------------------------------------------------------------------
    // Last quote
    // -----------------------------------------------------------------------

    /// Remember the quote most recently shown to a chat (vote/save target).
    pub fn set_last_quote(&self, chat_id: i64, quote_id: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.lock().execute(
            "INSERT INTO sessions (chat_id, last_quote, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(chat_id) DO UPDATE SET last_quote = ?2, updated_at = ?3",
            params![chat_id, quote_id, now],
        )?;
        Ok(())
    }

    pub fn last_quote(&self, chat_id: i64) -> Result<Option<String>> {
        let quote: Option<Option<String>> = self
            .lock()
            .query_row(
                "SELECT last_quote FROM sessions WHERE chat_id = ?1",
                params![chat_id],
                |row| row.get(0),
            )
            .optional()?;

        Ok(quote.flatten())
    }

    // -----------------------------------------------------------------------
    // Saved quotes
    // -----------------------------------------------------------------------

    /// Add a quote to a chat's saved set. Saving twice is a no-op.
    pub fn save_quote(&self, chat_id: i64, quote_id: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.lock().execute(
            "INSERT OR IGNORE INTO saved_quotes (chat_id, quote_id, saved_at) VALUES (?1, ?2, ?3)",
            params![chat_id, quote_id, now],
        )?;
        Ok(())
    }

    /// All quote ids a chat has saved, oldest first.
    pub fn saved_quotes(&self, chat_id: i64) -> Result<Vec<String>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT quote_id FROM saved_quotes WHERE chat_id = ?1 ORDER BY saved_at ASC, quote_id ASC",
        )?;
        let ids = stmt
            .query_map(params![chat_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    /// Remove a quote from a chat's saved set. Returns whether it was there.
    pub fn delete_saved_quote(&self, chat_id: i64, quote_id: &str) -> Result<bool> {
        let affected = self.lock().execute(
            "DELETE FROM saved_quotes WHERE chat_id = ?1 AND quote_id = ?2",
            params![chat_id, quote_id],
        )?;
        Ok(affected > 0)
    }

    // -----------------------------------------------------------------------
    // Search progress
    // -----------------------------------------------------------------------

    /// Record where a chat's search stands.
    pub fn set_search(
        &self,
        chat_id: i64,
        query: &str,
        position: u32,
        quote_id: Option<&str>,
    ) -> Result<()> {
        self.lock().execute(
            "INSERT INTO searches (chat_id, query, position, quote_id) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(chat_id) DO UPDATE SET query = ?2, position = ?3, quote_id = ?4",
            params![chat_id, query, position, quote_id],
        )?;
        Ok(())
    }

    pub fn search(&self, chat_id: i64) -> Result<Option<SearchProgress>> {
        self.lock()
            .query_row(
                "SELECT query, position, quote_id FROM searches WHERE chat_id = ?1",
                params![chat_id],
                |row| {
                    Ok(SearchProgress {
                        query: row.get(0)?,
                        position: row.get(1)?,
                        quote_id: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(Error::from)
    }

    // -----------------------------------------------------------------------
    // Resets
    // -----------------------------------------------------------------------

    /// Put one chat back at the menu: state reset, last quote and search
    /// forgotten. Saved quotes are kept.
    pub fn reset_chat(&self, chat_id: i64) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.lock();
        conn.execute(
            "INSERT INTO sessions (chat_id, state, last_quote, updated_at) VALUES (?1, 'menu', NULL, ?2)
             ON CONFLICT(chat_id) DO UPDATE SET state = 'menu', last_quote = NULL, updated_at = ?2",
            params![chat_id, now],
        )?;
        conn.execute("DELETE FROM searches WHERE chat_id = ?1", params![chat_id])?;
        Ok(())
    }

    /// Drop all transient state (sessions and searches) across every chat.
    /// Saved quotes survive. Run at startup so stale modes from a previous
    /// process never route a message to the wrong handler.
    pub fn reset_transient(&self) -> Result<()> {
        let conn = self.lock();
        conn.execute("DELETE FROM sessions", [])?;
        conn.execute("DELETE FROM searches", [])?;
        Ok(())
    }

    /// Forget a chat entirely, saved quotes included (operator CLI).
    pub fn delete_chat(&self, chat_id: i64) -> Result<()> {
        let conn = self.lock();
        conn.execute("DELETE FROM sessions WHERE chat_id = ?1", params![chat_id])?;
        conn.execute("DELETE FROM searches WHERE chat_id = ?1", params![chat_id])?;
        conn.execute(
            "DELETE FROM saved_quotes WHERE chat_id = ?1",
            params![chat_id],
        )?;
        Ok(())
    }

    /// All known sessions, most recently active first (operator CLI).
    pub fn list_sessions(&self) -> Result<Vec<SessionRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT chat_id, state, last_quote, updated_at FROM sessions ORDER BY updated_at DESC",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut records = Vec::with_capacity(rows.len());
        for (chat_id, state, last_quote, updated_at) in rows {
            records.push(SessionRecord {
                chat_id,
                state: state.parse()?,
                last_quote,
                updated_at: updated_at
                    .parse()
                    .map_err(|_| Error::Other(format!("bad timestamp for chat {chat_id}")))?,
            });
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_state_string_is_an_error() {
        let store = SessionStore::in_memory().unwrap();
        store
            .lock()
            .execute(
                "INSERT INTO sessions (chat_id, state, updated_at) VALUES (1, 'jazzed', '2026-01-01T00:00:00Z')",
                [],
            )
            .unwrap();

        assert!(store.state(1).is_err());
    }

    #[test]
    fn state_round_trips_through_text() {
        for state in [
            SessionState::Menu,
            SessionState::AwaitingSearchTerm,
            SessionState::ShowingRandom,
            SessionState::ShowingSearchResult,
            SessionState::ShowingSaved,
        ] {
            assert_eq!(state.to_string().parse::<SessionState>().unwrap(), state);
        }
    }
}

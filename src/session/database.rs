//! SQLite storage for the undo ledger and the auth snapshot.
//!
//! These are the only pieces of state that survive the host process being
//! killed and respawned. Ledger rows are keyed by a scope (one per tab
//! session) so a respawned host with the same scope finds its entries again.

use rusqlite::{params, Connection, OptionalExtension};

use super::auth::AuthState;
use super::errors::SessionError;
use super::types::{UndoType, UndoableAction};

// ─── LedgerStore ─────────────────────────────────────────────────────────────

/// SQLite handle for durable session state.
pub struct LedgerStore {
    conn: Connection,
}

impl LedgerStore {
    /// Open (or create) the store at the given path.
    ///
    /// Pass `":memory:"` for an in-memory database (tests).
    pub fn open(path: &str) -> Result<Self, SessionError> {
        let conn = Connection::open(path)?;

        // WAL lets a second connection read the auth snapshot while the
        // controller writes ledger rows.
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        let store = Self { conn };
        store.create_tables()?;
        Ok(store)
    }

    fn create_tables(&self) -> Result<(), SessionError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS undo_ledger (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                scope TEXT NOT NULL,
                id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                tool_name TEXT NOT NULL,
                tool_input TEXT NOT NULL,
                description TEXT NOT NULL,
                undo_type TEXT NOT NULL,
                undo_data TEXT NOT NULL,
                UNIQUE (scope, id)
            );

            CREATE INDEX IF NOT EXISTS idx_undo_ledger_scope
                ON undo_ledger(scope, seq);

            CREATE TABLE IF NOT EXISTS auth_snapshot (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                state TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            ",
        )?;
        Ok(())
    }

    // ─── Ledger ──────────────────────────────────────────────────────────────

    /// Append an action to the end of the scope's ledger.
    pub fn insert_action(&self, scope: &str, action: &UndoableAction) -> Result<(), SessionError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO undo_ledger
                (scope, id, timestamp, tool_name, tool_input, description, undo_type, undo_data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                scope,
                action.id,
                action.timestamp.to_rfc3339(),
                action.tool_name,
                serde_json::to_string(&action.tool_input)?,
                action.description,
                action.undo_type.as_str(),
                serde_json::to_string(&action.undo_data)?,
            ],
        )?;
        Ok(())
    }

    /// Remove one action. Returns whether a row was deleted.
    pub fn delete_action(&self, scope: &str, id: &str) -> Result<bool, SessionError> {
        let n = self.conn.execute(
            "DELETE FROM undo_ledger WHERE scope = ?1 AND id = ?2",
            params![scope, id],
        )?;
        Ok(n > 0)
    }

    /// All actions in the scope, oldest first.
    pub fn load_actions(&self, scope: &str) -> Result<Vec<UndoableAction>, SessionError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, timestamp, tool_name, tool_input, description, undo_type, undo_data
             FROM undo_ledger WHERE scope = ?1 ORDER BY seq ASC",
        )?;

        let rows = stmt.query_map(params![scope], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;

        let mut actions = Vec::new();
        for row in rows {
            let (id, timestamp, tool_name, tool_input, description, undo_type, undo_data) = row?;
            let Some(undo_type) = UndoType::parse(&undo_type) else {
                tracing::warn!(id = %id, undo_type = %undo_type, "skipping ledger row with unknown undo type");
                continue;
            };
            let timestamp = chrono::DateTime::parse_from_rfc3339(&timestamp)
                .map(|t| t.with_timezone(&chrono::Utc))
                .unwrap_or_else(|_| chrono::Utc::now());
            actions.push(UndoableAction {
                id,
                timestamp,
                tool_name,
                tool_input: serde_json::from_str(&tool_input)?,
                description,
                undo_type,
                undo_data: serde_json::from_str(&undo_data)?,
            });
        }
        Ok(actions)
    }

    /// Delete all but the newest `keep` actions in the scope.
    pub fn trim(&self, scope: &str, keep: usize) -> Result<usize, SessionError> {
        let n = self.conn.execute(
            "DELETE FROM undo_ledger WHERE scope = ?1 AND seq NOT IN (
                SELECT seq FROM undo_ledger WHERE scope = ?1 ORDER BY seq DESC LIMIT ?2
             )",
            params![scope, keep as i64],
        )?;
        Ok(n)
    }

    /// Drop every action in the scope.
    pub fn clear_scope(&self, scope: &str) -> Result<usize, SessionError> {
        let n = self
            .conn
            .execute("DELETE FROM undo_ledger WHERE scope = ?1", params![scope])?;
        Ok(n)
    }

    // ─── Auth snapshot ───────────────────────────────────────────────────────

    pub fn save_auth(&self, state: &AuthState) -> Result<(), SessionError> {
        self.conn.execute(
            "INSERT INTO auth_snapshot (id, state, updated_at) VALUES (1, ?1, datetime('now'))
             ON CONFLICT(id) DO UPDATE SET state = excluded.state, updated_at = excluded.updated_at",
            params![serde_json::to_string(state)?],
        )?;
        Ok(())
    }

    /// The last stored snapshot, if any was ever written.
    pub fn load_auth(&self) -> Result<Option<AuthState>, SessionError> {
        let raw: Option<String> = self
            .conn
            .query_row("SELECT state FROM auth_snapshot WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn action(id: &str) -> UndoableAction {
        let mut data = Map::new();
        data.insert("id".into(), json!("42"));
        UndoableAction {
            id: id.into(),
            timestamp: chrono::Utc::now(),
            tool_name: "create_signup".into(),
            tool_input: Map::new(),
            description: format!("Created person {id}"),
            undo_type: UndoType::DeleteCreated,
            undo_data: data,
        }
    }

    #[test]
    fn test_insert_and_load_in_order() {
        let store = LedgerStore::open(":memory:").unwrap();
        store.insert_action("tab-1", &action("a")).unwrap();
        store.insert_action("tab-1", &action("b")).unwrap();
        store.insert_action("tab-2", &action("c")).unwrap();

        let loaded = store.load_actions("tab-1").unwrap();
        let ids: Vec<_> = loaded.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(loaded[0].undo_data["id"], "42");
        assert_eq!(loaded[0].undo_type, UndoType::DeleteCreated);
    }

    #[test]
    fn test_delete_and_clear() {
        let store = LedgerStore::open(":memory:").unwrap();
        store.insert_action("s", &action("a")).unwrap();
        store.insert_action("s", &action("b")).unwrap();

        assert!(store.delete_action("s", "a").unwrap());
        assert!(!store.delete_action("s", "a").unwrap());
        assert_eq!(store.clear_scope("s").unwrap(), 1);
        assert!(store.load_actions("s").unwrap().is_empty());
    }

    #[test]
    fn test_trim_keeps_newest() {
        let store = LedgerStore::open(":memory:").unwrap();
        for i in 0..5 {
            store.insert_action("s", &action(&format!("a{i}"))).unwrap();
        }
        assert_eq!(store.trim("s", 3).unwrap(), 2);
        let ids: Vec<_> = store
            .load_actions("s")
            .unwrap()
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec!["a2", "a3", "a4"]);
    }

    #[test]
    fn test_auth_snapshot_upsert() {
        let store = LedgerStore::open(":memory:").unwrap();
        assert!(store.load_auth().unwrap().is_none());

        let mut state = AuthState {
            authenticated: true,
            ..AuthState::default()
        };
        store.save_auth(&state).unwrap();
        state.external_connected = true;
        store.save_auth(&state).unwrap();

        assert_eq!(store.load_auth().unwrap(), Some(state));
    }

    #[test]
    fn test_rows_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overlay.db");
        let path = path.to_str().unwrap();

        {
            let store = LedgerStore::open(path).unwrap();
            store.insert_action("tab-1", &action("persisted")).unwrap();
        }

        let reopened = LedgerStore::open(path).unwrap();
        let loaded = reopened.load_actions("tab-1").unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "persisted");
    }
}

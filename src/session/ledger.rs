//! Session Ledger: bounded log of reversible actions.
//!
//! In-memory `VecDeque` mirrored to SQLite so a respawned host process
//! rehydrates the same entries. Oldest entries are evicted first once the
//! capacity is reached.

use std::collections::VecDeque;

use serde_json::{Map, Value};

use super::database::LedgerStore;
use super::errors::SessionError;
use super::types::UndoableAction;
use super::undo;

/// Default number of entries kept.
pub const DEFAULT_LEDGER_CAPACITY: usize = 50;

pub struct SessionLedger {
    entries: VecDeque<UndoableAction>,
    capacity: usize,
    scope: String,
    store: LedgerStore,
    /// Set by the first mutation after `open`; a touched ledger is never
    /// seeded from a panel copy.
    touched: bool,
}

impl SessionLedger {
    /// Load the scope's entries from `store`, trimmed to `capacity`.
    pub fn open(store: LedgerStore, scope: &str, capacity: usize) -> Result<Self, SessionError> {
        let capacity = capacity.max(1);
        let trimmed = store.trim(scope, capacity)?;
        let entries: VecDeque<_> = store.load_actions(scope)?.into();

        tracing::info!(
            scope = %scope,
            entries = entries.len(),
            trimmed,
            capacity,
            "undo ledger loaded"
        );

        Ok(Self {
            entries,
            capacity,
            scope: scope.to_string(),
            store,
            touched: false,
        })
    }

    /// Record an executed tool call.
    ///
    /// Returns `None`, leaving the ledger untouched, for tools without an
    /// undo strategy.
    pub fn record(
        &mut self,
        tool_name: &str,
        input: &Map<String, Value>,
        result: &Value,
    ) -> Option<UndoableAction> {
        let action = undo::build_action(tool_name, input, result)?;
        self.append(action.clone());
        tracing::info!(
            tool = %tool_name,
            action_id = %action.id,
            undo_type = action.undo_type.as_str(),
            entries = self.entries.len(),
            "undo entry recorded"
        );
        Some(action)
    }

    fn append(&mut self, action: UndoableAction) {
        self.touched = true;
        if let Err(e) = self.store.insert_action(&self.scope, &action) {
            tracing::error!(error = %e, action_id = %action.id, "failed to persist undo entry");
        }
        self.entries.push_back(action);

        while self.entries.len() > self.capacity {
            if let Some(evicted) = self.entries.pop_front() {
                tracing::debug!(action_id = %evicted.id, "evicting oldest undo entry");
                if let Err(e) = self.store.delete_action(&self.scope, &evicted.id) {
                    tracing::error!(error = %e, action_id = %evicted.id, "failed to evict undo entry");
                }
            }
        }
    }

    /// Seed a freshly opened, empty ledger from a copy the panel kept for
    /// its tab. Ignored once the ledger has been recorded into, undone from
    /// or cleared, so a stale copy cannot bring back a removed entry.
    /// Returns how many were taken.
    pub fn adopt(&mut self, entries: Vec<UndoableAction>) -> usize {
        if self.touched || !self.entries.is_empty() || entries.is_empty() {
            return 0;
        }
        let count = entries.len().min(self.capacity);
        for action in entries {
            self.append(action);
        }
        tracing::info!(scope = %self.scope, adopted = count, "undo ledger adopted from panel");
        count
    }

    /// Most recent entry.
    pub fn peek(&self) -> Option<&UndoableAction> {
        self.entries.back()
    }

    /// Remove the most recent entry, in memory and on disk.
    pub fn pop(&mut self) -> Result<Option<UndoableAction>, SessionError> {
        self.touched = true;
        let Some(action) = self.entries.pop_back() else {
            return Ok(None);
        };
        self.store.delete_action(&self.scope, &action.id)?;
        Ok(Some(action))
    }

    /// Detach the most recent entry from memory only; the stored row stays
    /// until `commit_removal`, so a host restart mid-undo does not lose it.
    pub fn take_last(&mut self) -> Option<UndoableAction> {
        self.touched = true;
        self.entries.pop_back()
    }

    /// Permanently delete an entry previously detached by `take_last`.
    pub fn commit_removal(&mut self, action: &UndoableAction) -> Result<(), SessionError> {
        self.touched = true;
        self.store.delete_action(&self.scope, &action.id)?;
        Ok(())
    }

    /// Put a detached entry back on top.
    pub fn restore(&mut self, action: UndoableAction) {
        tracing::info!(action_id = %action.id, "undo entry restored");
        self.entries.push_back(action);
    }

    /// Drop every entry in the current scope.
    pub fn clear(&mut self) -> Result<(), SessionError> {
        self.touched = true;
        self.entries.clear();
        self.store.clear_scope(&self.scope)?;
        Ok(())
    }

    /// Oldest-first copy of the entries.
    pub fn snapshot(&self) -> Vec<UndoableAction> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

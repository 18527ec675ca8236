//! SQLite-backed tree accessor and result writer.
//!
//! Hosts that keep their items in SQLite can use [`SqliteStore`] directly:
//! it implements [`TreeAccessor`] over an `items` table and offers
//! [`SqliteStore::apply_derived`] to persist a propagation result in one
//! transaction. The engine itself stays read-only; this module is the
//! caller-side persistence the contract expects.
//!
//! Reparenting through [`SqliteStore::reparent`] records the pre-move
//! parent in `former_parent_id`, which is what lets the resolver revisit
//! the abandoned chain afterwards.

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::collections::HashSet;

use crate::error::{RollupError, Stage};
use crate::model::WorkItem;
use crate::rollup::Affected;
use crate::tree::TreeAccessor;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS items (
    item_id                   TEXT PRIMARY KEY,
    parent_id                 TEXT,
    former_parent_id          TEXT,
    status_closed             INTEGER NOT NULL DEFAULT 0,
    status_default_done_ratio INTEGER,
    done_ratio                INTEGER,
    estimated_hours           REAL,
    remaining_hours           REAL,
    ignore_non_working_days   INTEGER NOT NULL DEFAULT 0,
    schedule_manually         INTEGER NOT NULL DEFAULT 0,
    derived_done_ratio        INTEGER,
    derived_estimated_hours   REAL,
    derived_remaining_hours   REAL
);
CREATE INDEX IF NOT EXISTS idx_items_parent ON items(parent_id);
";

const ITEM_COLUMNS: &str = "item_id, parent_id, status_closed, status_default_done_ratio, \
     done_ratio, estimated_hours, remaining_hours, ignore_non_working_days, \
     schedule_manually, derived_done_ratio, derived_estimated_hours, derived_remaining_hours";

/// A work-item tree stored in SQLite.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Wrap an existing connection, creating the schema if needed.
    ///
    /// # Errors
    ///
    /// Returns an error when the schema cannot be created.
    pub fn new(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA).context("create items schema")?;
        Ok(Self { conn })
    }

    /// Open a fresh in-memory store (tests, scratch work).
    ///
    /// # Errors
    ///
    /// Returns an error when the connection cannot be opened.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory db")?;
        Self::new(conn)
    }

    /// Insert or replace an item row.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure.
    pub fn upsert(&self, item: &WorkItem) -> Result<()> {
        self.conn
            .execute(
                &format!(
                    "INSERT OR REPLACE INTO items ({ITEM_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
                ),
                params![
                    item.id,
                    item.parent_id,
                    item.status_closed,
                    item.status_default_done_ratio,
                    item.done_ratio,
                    item.estimated_hours,
                    item.remaining_hours,
                    item.ignore_non_working_days,
                    item.schedule_manually,
                    item.derived_done_ratio,
                    item.derived_estimated_hours,
                    item.derived_remaining_hours,
                ],
            )
            .with_context(|| format!("upsert item '{}'", item.id))?;
        Ok(())
    }

    /// Move an item to a new parent (or the root), recording the former
    /// parent for the resolver.
    ///
    /// # Errors
    ///
    /// Returns an error when the item does not exist or on database
    /// failure.
    pub fn reparent(&self, node_id: &str, new_parent: Option<&str>) -> Result<()> {
        let updated = self
            .conn
            .execute(
                "UPDATE items SET former_parent_id = parent_id, parent_id = ?2 \
                 WHERE item_id = ?1",
                params![node_id, new_parent],
            )
            .with_context(|| format!("reparent '{node_id}'"))?;
        anyhow::ensure!(updated == 1, "no item '{node_id}' to reparent");
        Ok(())
    }

    /// Persist a propagation result: every entry's derived values, in one
    /// transaction.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure; nothing is applied then.
    pub fn apply_derived(&mut self, entries: &[Affected]) -> Result<()> {
        let tx = self.conn.transaction().context("begin apply transaction")?;
        for entry in entries {
            tx.execute(
                "UPDATE items SET derived_done_ratio = ?2, derived_estimated_hours = ?3, \
                 derived_remaining_hours = ?4, ignore_non_working_days = ?5 \
                 WHERE item_id = ?1",
                params![
                    entry.node_id,
                    entry.values.done_ratio,
                    entry.values.estimated_hours,
                    entry.values.remaining_hours,
                    entry.values.ignore_non_working_days,
                ],
            )
            .with_context(|| format!("apply derived values for '{}'", entry.node_id))?;
        }
        tx.commit().context("commit apply transaction")
    }

    fn fetch(&self, node_id: &str) -> Result<Option<WorkItem>> {
        self.conn
            .query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM items WHERE item_id = ?1"),
                params![node_id],
                row_to_item,
            )
            .optional()
            .with_context(|| format!("get item '{node_id}'"))
    }

    fn fetch_children(&self, node_id: &str) -> Result<Vec<WorkItem>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {ITEM_COLUMNS} FROM items WHERE parent_id = ?1 ORDER BY item_id"
            ))
            .context("prepare children query")?;
        let rows = stmt
            .query_map(params![node_id], row_to_item)
            .with_context(|| format!("children of '{node_id}'"))?;

        let mut children = Vec::new();
        for row in rows {
            children.push(row.with_context(|| format!("decode child of '{node_id}'"))?);
        }
        Ok(children)
    }
}

fn row_to_item(row: &Row<'_>) -> rusqlite::Result<WorkItem> {
    Ok(WorkItem {
        id: row.get(0)?,
        parent_id: row.get(1)?,
        status_closed: row.get(2)?,
        status_default_done_ratio: row.get(3)?,
        done_ratio: row.get(4)?,
        estimated_hours: row.get(5)?,
        remaining_hours: row.get(6)?,
        ignore_non_working_days: row.get(7)?,
        schedule_manually: row.get(8)?,
        derived_done_ratio: row.get(9)?,
        derived_estimated_hours: row.get(10)?,
        derived_remaining_hours: row.get(11)?,
    })
}

impl TreeAccessor for SqliteStore {
    fn item(&self, node_id: &str) -> Result<WorkItem, RollupError> {
        let found = self
            .fetch(node_id)
            .map_err(|e| RollupError::collaborator(node_id, Stage::Item, e))?;
        found.ok_or_else(|| RollupError::ItemNotFound {
            node_id: node_id.to_string(),
        })
    }

    fn children_of(&self, node_id: &str) -> Result<Vec<WorkItem>, RollupError> {
        self.fetch_children(node_id)
            .map_err(|e| RollupError::collaborator(node_id, Stage::Children, e))
    }

    fn ancestor_chain_of(&self, node_id: &str) -> Result<Vec<WorkItem>, RollupError> {
        let start = self.item(node_id)?;

        let mut chain: Vec<WorkItem> = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(start.id);

        let mut current_parent_id = start.parent_id;
        while let Some(parent_id) = current_parent_id {
            if !visited.insert(parent_id.clone()) {
                return Err(RollupError::CycleDetected { node_id: parent_id });
            }
            let parent = self.item(&parent_id).map_err(|e| match e {
                // A dangling parent_id is a backend consistency problem,
                // not a caller mistake.
                RollupError::ItemNotFound { node_id } => RollupError::collaborator(
                    node_id.clone(),
                    Stage::Ancestors,
                    anyhow::anyhow!("parent row '{node_id}' is missing"),
                ),
                other => other,
            })?;
            current_parent_id = parent.parent_id.clone();
            chain.push(parent);
        }

        Ok(chain)
    }

    fn former_parent_of(&self, node_id: &str) -> Result<Option<String>, RollupError> {
        self.conn
            .query_row(
                "SELECT former_parent_id FROM items WHERE item_id = ?1",
                params![node_id],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()
            .with_context(|| format!("former parent of '{node_id}'"))
            .map_err(|e| RollupError::collaborator(node_id, Stage::FormerParent, e))
            .map(Option::flatten)
    }

    fn current_parent_of(&self, node_id: &str) -> Result<Option<String>, RollupError> {
        Ok(self.item(node_id)?.parent_id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

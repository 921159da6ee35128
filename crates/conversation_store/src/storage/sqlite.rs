//! Relational deployment: conversations, branches and nodes as tables.
//!
//! Node ids are primary keys across the whole database. Pointer columns on
//! `conversations` carry no foreign keys; healing validates them on load.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use branch_tree::timestamp::parse_lenient;
use branch_tree::{Branch, BranchId, ConversationDocument, ConversationId, Node, NodeId};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, warn};

use super::TreeStorage;
use crate::error::{StoreError, StoreResult};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS conversations (
    id TEXT PRIMARY KEY,
    title TEXT,
    current_branch_id TEXT,
    current_node_id TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS nodes (
    id TEXT PRIMARY KEY,
    conversation_id TEXT NOT NULL,
    position INTEGER NOT NULL,
    user_msg TEXT,
    ai_msg TEXT,
    parent_id TEXT,
    annotations TEXT NOT NULL DEFAULT '',
    timestamp TEXT NOT NULL,
    FOREIGN KEY(conversation_id) REFERENCES conversations(id) ON DELETE CASCADE,
    FOREIGN KEY(parent_id) REFERENCES nodes(id) ON DELETE SET NULL DEFERRABLE INITIALLY DEFERRED
);

CREATE TABLE IF NOT EXISTS branches (
    id TEXT PRIMARY KEY,
    conversation_id TEXT NOT NULL,
    position INTEGER NOT NULL,
    name TEXT NOT NULL,
    root_node_id TEXT NOT NULL,
    node_ids TEXT NOT NULL,
    created_at TEXT NOT NULL,
    FOREIGN KEY(conversation_id) REFERENCES conversations(id) ON DELETE CASCADE,
    FOREIGN KEY(root_node_id) REFERENCES nodes(id) DEFERRABLE INITIALLY DEFERRED
);

CREATE INDEX IF NOT EXISTS idx_nodes_conversation ON nodes(conversation_id, position);
CREATE INDEX IF NOT EXISTS idx_branches_conversation ON branches(conversation_id, position);
"#;

#[derive(Debug, Clone)]
pub struct SqliteTreeStorage {
    db_path: PathBuf,
}

impl SqliteTreeStorage {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    async fn with_connection<T, F>(&self, func: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = open_connection(&db_path)?;
            func(&mut connection)
        })
        .await
        .map_err(|error| StoreError::Task(error.to_string()))?
    }
}

#[async_trait]
impl TreeStorage for SqliteTreeStorage {
    async fn init(&self) -> StoreResult<()> {
        self.with_connection(|connection| {
            connection.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await
    }

    async fn load_document(
        &self,
        id: &ConversationId,
    ) -> StoreResult<Option<ConversationDocument>> {
        let id = id.clone();
        self.with_connection(move |connection| read_document(connection, &id))
            .await
    }

    async fn save_document(
        &self,
        id: &ConversationId,
        document: &ConversationDocument,
    ) -> StoreResult<()> {
        let id = id.clone();
        let document = document.clone();
        self.with_connection(move |connection| write_document(connection, &id, &document))
            .await
    }

    async fn delete_document(&self, id: &ConversationId) -> StoreResult<bool> {
        let id = id.clone();
        self.with_connection(move |connection| {
            let removed = connection.execute(
                "DELETE FROM conversations WHERE id = ?1",
                params![id.as_str()],
            )?;
            if removed > 0 {
                debug!(conversation_id = %id, "SqliteStorage: deleted conversation");
            }
            Ok(removed > 0)
        })
        .await
    }

    async fn list_documents(&self) -> StoreResult<Vec<ConversationId>> {
        self.with_connection(|connection| {
            let mut statement = connection.prepare("SELECT id FROM conversations ORDER BY id")?;
            let rows = statement.query_map([], |row| row.get::<_, String>(0))?;
            let mut ids = Vec::new();
            for row in rows {
                ids.push(ConversationId::from_raw(row?));
            }
            Ok(ids)
        })
        .await
    }

    async fn exists(&self, id: &ConversationId) -> StoreResult<bool> {
        let id = id.clone();
        self.with_connection(move |connection| {
            let found = connection
                .query_row(
                    "SELECT 1 FROM conversations WHERE id = ?1",
                    params![id.as_str()],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }
}

fn open_connection(path: &Path) -> StoreResult<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let connection = Connection::open(path)?;
    connection.busy_timeout(std::time::Duration::from_secs(5))?;
    connection.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA foreign_keys = ON;
        PRAGMA synchronous = NORMAL;
        "#,
    )?;
    Ok(connection)
}

fn read_document(
    connection: &mut Connection,
    id: &ConversationId,
) -> StoreResult<Option<ConversationDocument>> {
    let header = connection
        .query_row(
            "SELECT title, current_branch_id, current_node_id FROM conversations WHERE id = ?1",
            params![id.as_str()],
            |row| {
                Ok((
                    row.get::<_, Option<String>>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            },
        )
        .optional()?;
    let Some((title, current_branch_id, current_node_id)) = header else {
        return Ok(None);
    };

    let mut statement = connection.prepare(
        r#"
        SELECT id, user_msg, ai_msg, parent_id, annotations, timestamp
        FROM nodes WHERE conversation_id = ?1 ORDER BY position
        "#,
    )?;
    let nodes = statement
        .query_map(params![id.as_str()], |row| {
            Ok(Node {
                id: NodeId::from_raw(row.get::<_, String>(0)?),
                user_msg: row.get(1)?,
                ai_msg: row.get(2)?,
                parent_id: row.get::<_, Option<String>>(3)?.map(NodeId::from_raw),
                annotations: row.get(4)?,
                timestamp: parse_column_timestamp(row.get(5)?),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut statement = connection.prepare(
        r#"
        SELECT id, name, root_node_id, node_ids, created_at
        FROM branches WHERE conversation_id = ?1 ORDER BY position
        "#,
    )?;
    let rows = statement
        .query_map(params![id.as_str()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut branches = Vec::with_capacity(rows.len());
    for (branch_id, name, root_node_id, node_ids, created_at) in rows {
        let node_ids: Vec<NodeId> = match serde_json::from_str(&node_ids) {
            Ok(node_ids) => node_ids,
            Err(error) => {
                warn!(
                    conversation_id = %id,
                    branch_id = %branch_id,
                    error = %error,
                    "SqliteStorage: unreadable branch history, starting from an empty tree"
                );
                return Ok(None);
            }
        };
        branches.push(Branch {
            id: BranchId::from_raw(branch_id),
            name,
            root_node_id: NodeId::from_raw(root_node_id),
            node_ids,
            created_at: parse_column_timestamp(created_at),
        });
    }

    Ok(Some(ConversationDocument {
        title,
        nodes,
        branches,
        current_node_id: current_node_id.map(NodeId::from_raw),
        current_branch_id: current_branch_id.map(BranchId::from_raw),
    }))
}

fn write_document(
    connection: &mut Connection,
    id: &ConversationId,
    document: &ConversationDocument,
) -> StoreResult<()> {
    let now = Utc::now().to_rfc3339();
    let node_set: HashSet<&NodeId> = document.nodes.iter().map(|node| &node.id).collect();

    let tx = connection.transaction()?;
    tx.execute(
        r#"
        INSERT INTO conversations (
            id, title, current_branch_id, current_node_id, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?5)
        ON CONFLICT(id) DO UPDATE SET
            title = excluded.title,
            current_branch_id = excluded.current_branch_id,
            current_node_id = excluded.current_node_id,
            updated_at = excluded.updated_at
        "#,
        params![
            id.as_str(),
            document.title,
            document.current_branch_id.as_ref().map(|b| b.as_str()),
            document.current_node_id.as_ref().map(|n| n.as_str()),
            now,
        ],
    )?;
    tx.execute(
        "DELETE FROM branches WHERE conversation_id = ?1",
        params![id.as_str()],
    )?;
    tx.execute(
        "DELETE FROM nodes WHERE conversation_id = ?1",
        params![id.as_str()],
    )?;

    {
        let mut insert_node = tx.prepare(
            r#"
            INSERT INTO nodes (
                id, conversation_id, position, user_msg, ai_msg, parent_id, annotations, timestamp
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )?;
        for (position, node) in document.nodes.iter().enumerate() {
            // The parent column is a foreign key; provenance that points
            // outside this document is stored as NULL.
            let parent_id = node
                .parent_id
                .as_ref()
                .filter(|parent| node_set.contains(parent))
                .map(|parent| parent.as_str());
            insert_node.execute(params![
                node.id.as_str(),
                id.as_str(),
                position as i64,
                node.user_msg,
                node.ai_msg,
                parent_id,
                node.annotations,
                node.timestamp.to_rfc3339(),
            ])?;
        }

        let mut insert_branch = tx.prepare(
            r#"
            INSERT INTO branches (
                id, conversation_id, position, name, root_node_id, node_ids, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )?;
        for (position, branch) in document.branches.iter().enumerate() {
            insert_branch.execute(params![
                branch.id.as_str(),
                id.as_str(),
                position as i64,
                branch.name,
                branch.root_node_id.as_str(),
                serde_json::to_string(&branch.node_ids)?,
                branch.created_at.to_rfc3339(),
            ])?;
        }
    }
    tx.commit()?;

    debug!(
        conversation_id = %id,
        nodes = document.nodes.len(),
        branches = document.branches.len(),
        "SqliteStorage: saved conversation"
    );
    Ok(())
}

fn parse_column_timestamp(raw: String) -> DateTime<Utc> {
    parse_lenient(&raw).unwrap_or_else(Utc::now)
}

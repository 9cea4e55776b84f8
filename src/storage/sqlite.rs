//! SQLite storage backend
//!
//! A property-graph layout over two tables: `nodes` keyed by `(label, key)`
//! and `edges` keyed by `(rel_type, source, target)`. Properties live in JSON
//! columns and are queried through SQLite's JSON functions.

use super::traits::{GraphStore, NodeFilter, OpenStore, StorageError, StorageResult};
use crate::graph::{Citation, Endpoint, Label, Node, Properties, Relationship, RelationshipType};
use rusqlite::{params, Connection, OptionalExtension, ToSql};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite-backed graph store
///
/// Thread-safe via internal mutex on the connection. Foreign keys cascade
/// node deletes to their edges, which gives `DETACH DELETE` semantics.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

const NODE_COLUMNS: &str = "label, key, properties_json, citations_json";
const EDGE_COLUMNS: &str = "rel_type, source_label, source_key, target_label, target_key, properties_json";

impl SqliteStore {
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS nodes (
                label TEXT NOT NULL,
                key TEXT NOT NULL,
                properties_json TEXT NOT NULL,
                citations_json TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (label, key)
            );

            CREATE TABLE IF NOT EXISTS edges (
                rel_type TEXT NOT NULL,
                source_label TEXT NOT NULL,
                source_key TEXT NOT NULL,
                target_label TEXT NOT NULL,
                target_key TEXT NOT NULL,
                properties_json TEXT NOT NULL,
                PRIMARY KEY (rel_type, source_label, source_key, target_label, target_key),
                FOREIGN KEY (source_label, source_key) REFERENCES nodes(label, key) ON DELETE CASCADE,
                FOREIGN KEY (target_label, target_key) REFERENCES nodes(label, key) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source_label, source_key);
            CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target_label, target_key);
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    fn row_to_node(label: String, key: String, properties: String, citations: String) -> StorageResult<Node> {
        let label: Label = label
            .parse()
            .map_err(|e: crate::graph::UnknownLabel| StorageError::InvalidRow(e.to_string()))?;
        let properties: Properties = serde_json::from_str(&properties)?;
        let citations: Vec<Citation> = serde_json::from_str(&citations)?;
        Ok(Node {
            label,
            key,
            properties,
            citations,
        })
    }

    fn row_to_relationship(row: EdgeRow) -> StorageResult<Relationship> {
        let (rel_type, source_label, source_key, target_label, target_key, properties) = row;
        let parse = |s: String| -> StorageResult<Label> {
            s.parse()
                .map_err(|e: crate::graph::UnknownLabel| StorageError::InvalidRow(e.to_string()))
        };
        Ok(Relationship {
            rel_type: RelationshipType::from_stored(&rel_type),
            source: Endpoint::new(parse(source_label)?, source_key),
            target: Endpoint::new(parse(target_label)?, target_key),
            properties: serde_json::from_str(&properties)?,
        })
    }

    fn query_edges(&self, sql: &str, endpoint: &Endpoint) -> StorageResult<Vec<Relationship>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params![endpoint.label.as_str(), endpoint.key], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut relationships = Vec::new();
        for row in rows {
            relationships.push(Self::row_to_relationship(row?)?);
        }
        Ok(relationships)
    }

    fn node_exists(conn: &Connection, endpoint: &Endpoint) -> StorageResult<bool> {
        let exists = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM nodes WHERE label = ?1 AND key = ?2)",
            params![endpoint.label.as_str(), endpoint.key],
            |row| row.get(0),
        )?;
        Ok(exists)
    }
}

type EdgeRow = (String, String, String, String, String, String);

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl GraphStore for SqliteStore {
    // === Schema ===

    fn ensure_label_schema(&self, label: Label) -> StorageResult<()> {
        let conn = self.lock()?;
        // Label names are a closed set of [A-Za-z_] identifiers, safe to inline.
        let name = label.as_str();
        let slug = name.to_lowercase();
        conn.execute_batch(&format!(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS uq_{slug}_key
                ON nodes(key) WHERE label = '{name}';
            CREATE INDEX IF NOT EXISTS idx_{slug}_name
                ON nodes(json_extract(properties_json, '$.name')) WHERE label = '{name}';
            CREATE INDEX IF NOT EXISTS idx_{slug}_identifier
                ON nodes(json_extract(properties_json, '$.identifier')) WHERE label = '{name}';
            "#
        ))?;
        Ok(())
    }

    // === Node Operations ===

    fn upsert_node(&self, node: &Node) -> StorageResult<()> {
        let properties = serde_json::to_string(&node.properties)?;
        let citations = serde_json::to_string(&node.citations)?;
        let now = chrono::Utc::now().to_rfc3339();

        let conn = self.lock()?;
        // DO UPDATE rather than REPLACE: a replace would cascade-delete edges.
        conn.execute(
            r#"
            INSERT INTO nodes (label, key, properties_json, citations_json, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(label, key) DO UPDATE SET
                properties_json = excluded.properties_json,
                citations_json = excluded.citations_json,
                updated_at = excluded.updated_at
            "#,
            params![node.label.as_str(), node.key, properties, citations, now],
        )?;
        Ok(())
    }

    fn get_node(&self, label: Label, key: &str) -> StorageResult<Option<Node>> {
        let conn = self.lock()?;
        let row: Option<(String, String, String, String)> = conn
            .query_row(
                &format!("SELECT {NODE_COLUMNS} FROM nodes WHERE label = ?1 AND key = ?2"),
                params![label.as_str(), key],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        match row {
            Some((label, key, properties, citations)) => {
                Ok(Some(Self::row_to_node(label, key, properties, citations)?))
            }
            None => Ok(None),
        }
    }

    fn find_nodes(&self, filter: &NodeFilter) -> StorageResult<Vec<Node>> {
        let mut sql = format!("SELECT {NODE_COLUMNS} FROM nodes WHERE 1 = 1");
        let mut params_vec: Vec<Box<dyn ToSql>> = Vec::new();

        if !filter.labels.is_empty() {
            let placeholders = vec!["?"; filter.labels.len()].join(", ");
            sql.push_str(&format!(" AND label IN ({placeholders})"));
            for label in &filter.labels {
                params_vec.push(Box::new(label.as_str().to_string()));
            }
        }

        if let Some((key, value)) = &filter.property_eq {
            sql.push_str(" AND json_extract(properties_json, ?) = ?");
            params_vec.push(Box::new(format!("$.{key}")));
            params_vec.push(Box::new(value.clone()));
        }

        // instr() with an empty needle matches everything, so blanks are dropped.
        let keywords: Vec<&str> = filter
            .keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .collect();

        if !keywords.is_empty() {
            let fields = filter.fields;
            let mut clauses = Vec::new();
            for keyword in keywords {
                if fields.name {
                    clauses.push(
                        "instr(lower(coalesce(json_extract(properties_json, '$.name'), \
                         json_extract(properties_json, '$.title'), '')), lower(?)) > 0",
                    );
                    params_vec.push(Box::new(keyword.to_string()));
                }
                if fields.description {
                    clauses.push(
                        "instr(lower(coalesce(json_extract(properties_json, '$.description'), '')), lower(?)) > 0",
                    );
                    params_vec.push(Box::new(keyword.to_string()));
                }
                if fields.identifier {
                    clauses.push(
                        "instr(lower(coalesce(json_extract(properties_json, '$.identifier'), '')), lower(?)) > 0",
                    );
                    params_vec.push(Box::new(keyword.to_string()));
                }
                if fields.aliases {
                    clauses.push(
                        "EXISTS (SELECT 1 FROM json_each(nodes.properties_json, '$.aliases') AS alias \
                         WHERE instr(lower(alias.value), lower(?)) > 0)",
                    );
                    params_vec.push(Box::new(keyword.to_string()));
                }
            }
            if clauses.is_empty() {
                return Ok(Vec::new());
            }
            sql.push_str(&format!(" AND ({})", clauses.join(" OR ")));
        }

        sql.push_str(" ORDER BY rowid");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let params_refs: Vec<&dyn ToSql> = params_vec.iter().map(|b| b.as_ref()).collect();

        let rows = stmt.query_map(params_refs.as_slice(), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut nodes = Vec::new();
        for row in rows {
            let (label, key, properties, citations) = row?;
            nodes.push(Self::row_to_node(label, key, properties, citations)?);
        }
        Ok(nodes)
    }

    fn count_nodes(&self, label: Option<Label>) -> StorageResult<usize> {
        let conn = self.lock()?;
        let count: i64 = match label {
            Some(label) => conn.query_row(
                "SELECT COUNT(*) FROM nodes WHERE label = ?1",
                params![label.as_str()],
                |row| row.get(0),
            )?,
            None => conn.query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))?,
        };
        Ok(count as usize)
    }

    fn delete_labels(&self, labels: &[Label]) -> StorageResult<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut removed = 0;
        for label in labels {
            removed += tx.execute("DELETE FROM nodes WHERE label = ?1", params![label.as_str()])?;
        }
        tx.commit()?;
        Ok(removed)
    }

    fn delete_node(&self, label: Label, key: &str) -> StorageResult<bool> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "DELETE FROM nodes WHERE label = ?1 AND key = ?2",
            params![label.as_str(), key],
        )?;
        Ok(rows > 0)
    }

    // === Relationship Operations ===

    fn upsert_relationship(&self, relationship: &Relationship) -> StorageResult<()> {
        let properties = serde_json::to_string(&relationship.properties)?;

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for endpoint in [&relationship.source, &relationship.target] {
            if !Self::node_exists(&tx, endpoint)? {
                return Err(StorageError::MissingEndpoint(endpoint.clone()));
            }
        }

        tx.execute(
            &format!(
                r#"
                INSERT INTO edges ({EDGE_COLUMNS})
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(rel_type, source_label, source_key, target_label, target_key) DO UPDATE SET
                    properties_json = json_patch(edges.properties_json, excluded.properties_json)
                "#
            ),
            params![
                relationship.rel_type.as_str(),
                relationship.source.label.as_str(),
                relationship.source.key,
                relationship.target.label.as_str(),
                relationship.target.key,
                properties,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn relationships_from(&self, endpoint: &Endpoint) -> StorageResult<Vec<Relationship>> {
        self.query_edges(
            &format!(
                "SELECT {EDGE_COLUMNS} FROM edges WHERE source_label = ?1 AND source_key = ?2 ORDER BY rowid"
            ),
            endpoint,
        )
    }

    fn relationships_to(&self, endpoint: &Endpoint) -> StorageResult<Vec<Relationship>> {
        self.query_edges(
            &format!(
                "SELECT {EDGE_COLUMNS} FROM edges WHERE target_label = ?1 AND target_key = ?2 ORDER BY rowid"
            ),
            endpoint,
        )
    }

    fn count_relationships(&self) -> StorageResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM edges", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    // === Whole-graph Operations ===

    fn clear(&self) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute_batch("DELETE FROM edges; DELETE FROM nodes;")?;
        Ok(())
    }
}

//! SQLite-backed persistence for techniques and signatures.
//!
//! Two keyed collections: techniques by `id`, signatures by
//! `(technique_id, format)`, plus `technique_tactics` / `technique_platforms`
//! side tables that give filtered listing an index to walk. All writes are
//! atomic per technique or per signature; the single connection behind a
//! mutex serializes concurrent upserts on the same key (and, as an accepted
//! embedded-store trade-off, on different keys too).

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use sigsmith_catalog::Technique;
use sigsmith_convert::{Format, Signature};
use tracing::debug;

use crate::error::{Result, StoreError};

/// Outcome of a technique upsert, carrying the now-current revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TechniqueUpsert {
    Inserted(u64),
    Updated(u64),
    Unchanged(u64),
}

impl TechniqueUpsert {
    pub fn revision(&self) -> u64 {
        match self {
            TechniqueUpsert::Inserted(rev)
            | TechniqueUpsert::Updated(rev)
            | TechniqueUpsert::Unchanged(rev) => *rev,
        }
    }
}

/// Technique listing filters. Tactic matching is exact (labels are
/// normalized lowercase kebab); platform matching is case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TechniqueFilter {
    All,
    Tactic(String),
    Platform(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureFilter {
    All,
    Format(Format),
    Technique(String),
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS techniques (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL,
    tactics TEXT NOT NULL,
    platforms TEXT NOT NULL,
    data_sources TEXT NOT NULL,
    detection TEXT,
    is_subtechnique INTEGER NOT NULL,
    parent_id TEXT,
    revision INTEGER NOT NULL,
    content_hash TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS technique_tactics (
    technique_id TEXT NOT NULL REFERENCES techniques(id),
    tactic TEXT NOT NULL,
    PRIMARY KEY (technique_id, tactic)
);
CREATE INDEX IF NOT EXISTS idx_technique_tactics_tactic
    ON technique_tactics(tactic);

CREATE TABLE IF NOT EXISTS technique_platforms (
    technique_id TEXT NOT NULL REFERENCES techniques(id),
    platform TEXT NOT NULL,
    PRIMARY KEY (technique_id, platform)
);
CREATE INDEX IF NOT EXISTS idx_technique_platforms_platform
    ON technique_platforms(platform);

CREATE TABLE IF NOT EXISTS signatures (
    technique_id TEXT NOT NULL,
    format TEXT NOT NULL,
    rule_name TEXT NOT NULL,
    body TEXT NOT NULL,
    generated_from_revision INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (technique_id, format)
);
CREATE INDEX IF NOT EXISTS idx_signatures_format ON signatures(format);
"#;

const TECHNIQUE_COLUMNS: &str = "id, name, description, tactics, platforms, data_sources, \
     detection, is_subtechnique, parent_id, revision";

const SIGNATURE_COLUMNS: &str =
    "technique_id, format, rule_name, body, generated_from_revision, created_at, updated_at";

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database at `path`, creating parent directories
    /// and the schema as needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).map_err(|source| StoreError::CreateDir {
                    path: dir.to_path_buf(),
                    source,
                })?;
            }
        }
        let conn = Connection::open(path).map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let store = Store {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| StoreError::Open {
            path: ":memory:".into(),
            source,
        })?;
        let store = Store {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(SCHEMA).map_err(StoreError::Schema)
    }

    // -----------------------------------------------------------------------
    // Techniques
    // -----------------------------------------------------------------------

    /// Insert or update one technique, atomically with its index rows.
    ///
    /// Insert assigns revision 1. An update bumps the revision only when the
    /// incoming content hash differs from the stored one; identical content
    /// is a no-op, so repeated ingestion of the same catalog is idempotent.
    pub fn upsert_technique(&self, technique: &Technique) -> Result<TechniqueUpsert> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction()
            .map_err(StoreError::keyed("upsert_technique", &technique.id))?;

        let existing: Option<(i64, String)> = tx
            .query_row(
                "SELECT revision, content_hash FROM techniques WHERE id = ?1",
                params![technique.id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(StoreError::keyed("upsert_technique", &technique.id))?;

        let hash = technique.content_hash();
        let now = Utc::now();
        let keyed = || StoreError::keyed("upsert_technique", &technique.id);

        let outcome = match existing {
            Some((revision, stored_hash)) if stored_hash == hash => {
                TechniqueUpsert::Unchanged(revision as u64)
            }
            Some((revision, _)) => {
                let new_revision = revision + 1;
                tx.execute(
                    "UPDATE techniques SET name = ?2, description = ?3, tactics = ?4, \
                     platforms = ?5, data_sources = ?6, detection = ?7, is_subtechnique = ?8, \
                     parent_id = ?9, revision = ?10, content_hash = ?11, updated_at = ?12 \
                     WHERE id = ?1",
                    params![
                        technique.id,
                        technique.name,
                        technique.description,
                        json(&technique.tactics),
                        json(&technique.platforms),
                        json(&technique.data_sources),
                        technique.detection,
                        technique.is_subtechnique,
                        technique.parent_id,
                        new_revision,
                        hash,
                        now,
                    ],
                )
                .map_err(keyed())?;
                refresh_index_rows(&tx, technique).map_err(keyed())?;
                TechniqueUpsert::Updated(new_revision as u64)
            }
            None => {
                tx.execute(
                    "INSERT INTO techniques (id, name, description, tactics, platforms, \
                     data_sources, detection, is_subtechnique, parent_id, revision, \
                     content_hash, created_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 1, ?10, ?11, ?11)",
                    params![
                        technique.id,
                        technique.name,
                        technique.description,
                        json(&technique.tactics),
                        json(&technique.platforms),
                        json(&technique.data_sources),
                        technique.detection,
                        technique.is_subtechnique,
                        technique.parent_id,
                        hash,
                        now,
                    ],
                )
                .map_err(keyed())?;
                refresh_index_rows(&tx, technique).map_err(keyed())?;
                TechniqueUpsert::Inserted(1)
            }
        };

        tx.commit().map_err(keyed())?;
        debug!(id = %technique.id, ?outcome, "technique upsert");
        Ok(outcome)
    }

    pub fn get_technique(&self, id: &str) -> Result<Option<Technique>> {
        let conn = self.conn.lock().unwrap();
        let raw = conn
            .query_row(
                &format!("SELECT {TECHNIQUE_COLUMNS} FROM techniques WHERE id = ?1"),
                params![id],
                raw_technique,
            )
            .optional()
            .map_err(StoreError::keyed("get_technique", id))?;
        raw.map(decode_technique).transpose()
    }

    pub fn list_techniques(&self, filter: &TechniqueFilter) -> Result<Vec<Technique>> {
        let conn = self.conn.lock().unwrap();
        let (sql, param): (String, Option<&str>) = match filter {
            TechniqueFilter::All => (
                format!("SELECT {TECHNIQUE_COLUMNS} FROM techniques ORDER BY id"),
                None,
            ),
            TechniqueFilter::Tactic(tactic) => (
                format!(
                    "SELECT {TECHNIQUE_COLUMNS} FROM techniques \
                     JOIN technique_tactics tt ON tt.technique_id = techniques.id \
                     WHERE tt.tactic = ?1 ORDER BY id"
                ),
                Some(tactic.as_str()),
            ),
            TechniqueFilter::Platform(platform) => (
                format!(
                    "SELECT {TECHNIQUE_COLUMNS} FROM techniques \
                     JOIN technique_platforms tp ON tp.technique_id = techniques.id \
                     WHERE tp.platform = ?1 COLLATE NOCASE ORDER BY id"
                ),
                Some(platform.as_str()),
            ),
        };

        let mut stmt = conn
            .prepare(&sql)
            .map_err(StoreError::query("list_techniques"))?;
        let rows = match param {
            Some(p) => stmt.query_map(params![p], raw_technique),
            None => stmt.query_map([], raw_technique),
        }
        .map_err(StoreError::query("list_techniques"))?;

        let mut techniques = Vec::new();
        for row in rows {
            let raw = row.map_err(StoreError::query("list_techniques"))?;
            techniques.push(decode_technique(raw)?);
        }
        Ok(techniques)
    }

    /// Stored sub-techniques of the given parent, in id order.
    pub fn subtechniques_of(&self, parent_id: &str) -> Result<Vec<Technique>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {TECHNIQUE_COLUMNS} FROM techniques WHERE parent_id = ?1 ORDER BY id"
            ))
            .map_err(StoreError::query("subtechniques_of"))?;
        let rows = stmt
            .query_map(params![parent_id], raw_technique)
            .map_err(StoreError::query("subtechniques_of"))?;

        let mut techniques = Vec::new();
        for row in rows {
            let raw = row.map_err(StoreError::query("subtechniques_of"))?;
            techniques.push(decode_technique(raw)?);
        }
        Ok(techniques)
    }

    pub fn technique_count(&self) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT COUNT(*) FROM techniques", [], |row| {
            row.get::<_, i64>(0)
        })
        .map(|n| n as u64)
        .map_err(StoreError::query("technique_count"))
    }

    /// All distinct tactic labels present in the store, sorted.
    pub fn list_tactics(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT DISTINCT tactic FROM technique_tactics ORDER BY tactic")
            .map_err(StoreError::query("list_tactics"))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(StoreError::query("list_tactics"))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::query("list_tactics"))
    }

    // -----------------------------------------------------------------------
    // Signatures
    // -----------------------------------------------------------------------

    /// Insert or replace the signature for its `(technique_id, format)` key.
    /// A replace keeps the original `created_at`; there is never a second
    /// row for the same pair.
    pub fn upsert_signature(&self, signature: &Signature) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let key = signature_key(&signature.technique_id, signature.format);
        conn.execute(
            "INSERT INTO signatures (technique_id, format, rule_name, body, \
             generated_from_revision, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
             ON CONFLICT (technique_id, format) DO UPDATE SET \
             rule_name = excluded.rule_name, \
             body = excluded.body, \
             generated_from_revision = excluded.generated_from_revision, \
             updated_at = excluded.updated_at",
            params![
                signature.technique_id,
                signature.format.as_str(),
                signature.rule_name,
                signature.body,
                signature.generated_from_revision as i64,
                signature.created_at,
                signature.updated_at,
            ],
        )
        .map_err(StoreError::keyed("upsert_signature", key))?;
        Ok(())
    }

    pub fn get_signature(&self, technique_id: &str, format: Format) -> Result<Option<Signature>> {
        let conn = self.conn.lock().unwrap();
        let raw = conn
            .query_row(
                &format!(
                    "SELECT {SIGNATURE_COLUMNS} FROM signatures \
                     WHERE technique_id = ?1 AND format = ?2"
                ),
                params![technique_id, format.as_str()],
                raw_signature,
            )
            .optional()
            .map_err(StoreError::keyed(
                "get_signature",
                signature_key(technique_id, format),
            ))?;
        raw.map(decode_signature).transpose()
    }

    pub fn list_signatures(&self, filter: &SignatureFilter) -> Result<Vec<Signature>> {
        let conn = self.conn.lock().unwrap();
        let (sql, param): (String, Option<String>) = match filter {
            SignatureFilter::All => (
                format!(
                    "SELECT {SIGNATURE_COLUMNS} FROM signatures ORDER BY technique_id, format"
                ),
                None,
            ),
            SignatureFilter::Format(format) => (
                format!(
                    "SELECT {SIGNATURE_COLUMNS} FROM signatures WHERE format = ?1 \
                     ORDER BY technique_id, format"
                ),
                Some(format.as_str().to_string()),
            ),
            SignatureFilter::Technique(id) => (
                format!(
                    "SELECT {SIGNATURE_COLUMNS} FROM signatures WHERE technique_id = ?1 \
                     ORDER BY technique_id, format"
                ),
                Some(id.clone()),
            ),
        };

        let mut stmt = conn
            .prepare(&sql)
            .map_err(StoreError::query("list_signatures"))?;
        let rows = match &param {
            Some(p) => stmt.query_map(params![p], raw_signature),
            None => stmt.query_map([], raw_signature),
        }
        .map_err(StoreError::query("list_signatures"))?;

        let mut signatures = Vec::new();
        for row in rows {
            let raw = row.map_err(StoreError::query("list_signatures"))?;
            signatures.push(decode_signature(raw)?);
        }
        Ok(signatures)
    }

    /// The engine's skip map: every persisted `(technique_id, format)` pair
    /// with the revision its body was generated from.
    pub fn existing_revisions(&self) -> Result<HashMap<(String, Format), u64>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT technique_id, format, generated_from_revision FROM signatures")
            .map_err(StoreError::query("existing_revisions"))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })
            .map_err(StoreError::query("existing_revisions"))?;

        let mut map = HashMap::new();
        for row in rows {
            let (id, format, revision) = row.map_err(StoreError::query("existing_revisions"))?;
            let format = Format::from_str(&format).ok_or(StoreError::UnknownFormat(format))?;
            map.insert((id, format), revision as u64);
        }
        Ok(map)
    }

    /// Pairs whose signature was generated from an older technique revision.
    pub fn stale_signatures(&self) -> Result<Vec<(String, Format)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT s.technique_id, s.format FROM signatures s \
                 JOIN techniques t ON t.id = s.technique_id \
                 WHERE s.generated_from_revision != t.revision \
                 ORDER BY s.technique_id, s.format",
            )
            .map_err(StoreError::query("stale_signatures"))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(StoreError::query("stale_signatures"))?;

        let mut stale = Vec::new();
        for row in rows {
            let (id, format) = row.map_err(StoreError::query("stale_signatures"))?;
            let format = Format::from_str(&format).ok_or(StoreError::UnknownFormat(format))?;
            stale.push((id, format));
        }
        Ok(stale)
    }

    /// Remove all signatures for a technique. Returns how many were removed.
    pub fn purge_signatures(&self, technique_id: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM signatures WHERE technique_id = ?1",
            params![technique_id],
        )
        .map_err(StoreError::keyed("purge_signatures", technique_id))
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

struct RawTechnique {
    id: String,
    name: String,
    description: String,
    tactics: String,
    platforms: String,
    data_sources: String,
    detection: Option<String>,
    is_subtechnique: bool,
    parent_id: Option<String>,
    revision: i64,
}

fn raw_technique(row: &Row<'_>) -> rusqlite::Result<RawTechnique> {
    Ok(RawTechnique {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        tactics: row.get(3)?,
        platforms: row.get(4)?,
        data_sources: row.get(5)?,
        detection: row.get(6)?,
        is_subtechnique: row.get(7)?,
        parent_id: row.get(8)?,
        revision: row.get(9)?,
    })
}

fn decode_technique(raw: RawTechnique) -> Result<Technique> {
    let decode = |column: &'static str, value: &str| -> Result<Vec<String>> {
        serde_json::from_str(value).map_err(|source| StoreError::Decode {
            column,
            key: raw.id.clone(),
            source,
        })
    };
    Ok(Technique {
        tactics: decode("tactics", &raw.tactics)?,
        platforms: decode("platforms", &raw.platforms)?,
        data_sources: decode("data_sources", &raw.data_sources)?,
        id: raw.id,
        name: raw.name,
        description: raw.description,
        detection: raw.detection,
        is_subtechnique: raw.is_subtechnique,
        parent_id: raw.parent_id,
        revision: raw.revision as u64,
    })
}

struct RawSignature {
    technique_id: String,
    format: String,
    rule_name: String,
    body: String,
    generated_from_revision: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn raw_signature(row: &Row<'_>) -> rusqlite::Result<RawSignature> {
    Ok(RawSignature {
        technique_id: row.get(0)?,
        format: row.get(1)?,
        rule_name: row.get(2)?,
        body: row.get(3)?,
        generated_from_revision: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn decode_signature(raw: RawSignature) -> Result<Signature> {
    let format = Format::from_str(&raw.format).ok_or(StoreError::UnknownFormat(raw.format))?;
    Ok(Signature {
        technique_id: raw.technique_id,
        format,
        rule_name: raw.rule_name,
        body: raw.body,
        generated_from_revision: raw.generated_from_revision as u64,
        created_at: raw.created_at,
        updated_at: raw.updated_at,
    })
}

fn refresh_index_rows(tx: &rusqlite::Transaction<'_>, t: &Technique) -> rusqlite::Result<()> {
    tx.execute(
        "DELETE FROM technique_tactics WHERE technique_id = ?1",
        params![t.id],
    )?;
    tx.execute(
        "DELETE FROM technique_platforms WHERE technique_id = ?1",
        params![t.id],
    )?;
    for tactic in &t.tactics {
        tx.execute(
            "INSERT OR IGNORE INTO technique_tactics (technique_id, tactic) VALUES (?1, ?2)",
            params![t.id, tactic],
        )?;
    }
    for platform in &t.platforms {
        tx.execute(
            "INSERT OR IGNORE INTO technique_platforms (technique_id, platform) VALUES (?1, ?2)",
            params![t.id, platform],
        )?;
    }
    Ok(())
}

fn json(values: &[String]) -> String {
    serde_json::to_string(values).expect("string vec serializes")
}

fn signature_key(technique_id: &str, format: Format) -> String {
    format!("{technique_id}/{format}")
}

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::FighterId;
use crate::features::{FeatureStats, FighterFeatures};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no feature row for fighter {fighter_id}")]
    NotFound { fighter_id: FighterId },
    #[error("fighter {fighter_id} does not exist")]
    UnknownFighter { fighter_id: FighterId },
    #[error("feature values for fighter {fighter_id} must be finite and non-negative")]
    InvalidStats { fighter_id: FighterId },
    #[error("fighter name {0:?} is empty or already taken")]
    InvalidName(String),
    #[error("sqlite: {0}")]
    Backend(#[from] rusqlite::Error),
    #[error("store lock poisoned")]
    Poisoned,
}

/// Read/write access to per-fighter feature rows.
pub trait FeatureStore: Send + Sync {
    fn get_features(&self, fighter_id: FighterId) -> Result<FighterFeatures, StoreError>;

    /// Replaces the row if present, inserts otherwise. Always restamps
    /// `updated_at`.
    fn upsert_features(
        &self,
        fighter_id: FighterId,
        stats: &FeatureStats,
    ) -> Result<FighterFeatures, StoreError>;
}

impl<T: FeatureStore + ?Sized> FeatureStore for Arc<T> {
    fn get_features(&self, fighter_id: FighterId) -> Result<FighterFeatures, StoreError> {
        (**self).get_features(fighter_id)
    }

    fn upsert_features(
        &self,
        fighter_id: FighterId,
        stats: &FeatureStats,
    ) -> Result<FighterFeatures, StoreError> {
        (**self).upsert_features(fighter_id, stats)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fighter {
    pub id: FighterId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

pub struct SqliteFeatureStore {
    conn: Mutex<Connection>,
}

impl SqliteFeatureStore {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)
            .with_context(|| format!("open sqlite db {}", path.display()))?;
        init_schema(&conn).context("create sqlite schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn insert_fighter(&self, name: &str) -> Result<Fighter, StoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        let created_at = Utc::now();
        let conn = self.lock()?;
        let inserted = conn.execute(
            "INSERT INTO fighters (name, created_at) VALUES (?1, ?2)",
            params![name, created_at],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::ConstraintViolation =>
            {
                return Err(StoreError::InvalidName(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        }
        Ok(Fighter {
            id: FighterId(conn.last_insert_rowid()),
            name: name.to_string(),
            created_at,
        })
    }

    pub fn find_fighter_by_name(&self, name: &str) -> Result<Option<Fighter>, StoreError> {
        let conn = self.lock()?;
        let fighter = conn
            .query_row(
                "SELECT id, name, created_at FROM fighters WHERE name = ?1",
                params![name.trim()],
                fighter_from_row,
            )
            .optional()?;
        Ok(fighter)
    }

    pub fn list_fighters(&self) -> Result<Vec<Fighter>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id, name, created_at FROM fighters ORDER BY id ASC")?;
        let rows = stmt.query_map([], fighter_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Removes the fighter; the feature row goes with it.
    pub fn delete_fighter(&self, fighter_id: FighterId) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let n = conn.execute("DELETE FROM fighters WHERE id = ?1", params![fighter_id.0])?;
        Ok(n > 0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl FeatureStore for SqliteFeatureStore {
    fn get_features(&self, fighter_id: FighterId) -> Result<FighterFeatures, StoreError> {
        let conn = self.lock()?;
        conn.query_row(
            r#"
            SELECT
                fighter_id, avg_sig_str_landed, avg_sig_str_pct, avg_sub_att,
                avg_td_landed, avg_td_pct, wins_by_ko, wins_by_submission, updated_at
            FROM fighter_features
            WHERE fighter_id = ?1
            "#,
            params![fighter_id.0],
            |row| {
                Ok(FighterFeatures {
                    fighter_id: FighterId(row.get(0)?),
                    stats: FeatureStats {
                        avg_sig_str_landed: row.get(1)?,
                        avg_sig_str_pct: row.get(2)?,
                        avg_sub_att: row.get(3)?,
                        avg_td_landed: row.get(4)?,
                        avg_td_pct: row.get(5)?,
                        wins_by_ko: row.get(6)?,
                        wins_by_submission: row.get(7)?,
                    },
                    updated_at: row.get(8)?,
                })
            },
        )
        .optional()?
        .ok_or(StoreError::NotFound { fighter_id })
    }

    fn upsert_features(
        &self,
        fighter_id: FighterId,
        stats: &FeatureStats,
    ) -> Result<FighterFeatures, StoreError> {
        if !stats.is_valid() {
            return Err(StoreError::InvalidStats { fighter_id });
        }
        let updated_at = Utc::now();
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let exists = tx
            .query_row(
                "SELECT 1 FROM fighters WHERE id = ?1",
                params![fighter_id.0],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !exists {
            return Err(StoreError::UnknownFighter { fighter_id });
        }
        tx.execute(
            r#"
            INSERT INTO fighter_features (
                fighter_id, avg_sig_str_landed, avg_sig_str_pct, avg_sub_att,
                avg_td_landed, avg_td_pct, wins_by_ko, wins_by_submission, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(fighter_id) DO UPDATE SET
                avg_sig_str_landed = excluded.avg_sig_str_landed,
                avg_sig_str_pct = excluded.avg_sig_str_pct,
                avg_sub_att = excluded.avg_sub_att,
                avg_td_landed = excluded.avg_td_landed,
                avg_td_pct = excluded.avg_td_pct,
                wins_by_ko = excluded.wins_by_ko,
                wins_by_submission = excluded.wins_by_submission,
                updated_at = excluded.updated_at
            "#,
            params![
                fighter_id.0,
                stats.avg_sig_str_landed,
                stats.avg_sig_str_pct,
                stats.avg_sub_att,
                stats.avg_td_landed,
                stats.avg_td_pct,
                stats.wins_by_ko,
                stats.wins_by_submission,
                updated_at,
            ],
        )?;
        tx.commit()?;
        Ok(FighterFeatures {
            fighter_id,
            stats: *stats,
            updated_at,
        })
    }
}

pub fn init_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA foreign_keys = ON;
        CREATE TABLE IF NOT EXISTS fighters (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS fighter_features (
            fighter_id INTEGER PRIMARY KEY REFERENCES fighters(id) ON DELETE CASCADE,
            avg_sig_str_landed REAL NOT NULL DEFAULT 0 CHECK (avg_sig_str_landed >= 0),
            avg_sig_str_pct REAL NOT NULL DEFAULT 0 CHECK (avg_sig_str_pct >= 0),
            avg_sub_att REAL NOT NULL DEFAULT 0 CHECK (avg_sub_att >= 0),
            avg_td_landed REAL NOT NULL DEFAULT 0 CHECK (avg_td_landed >= 0),
            avg_td_pct REAL NOT NULL DEFAULT 0 CHECK (avg_td_pct >= 0),
            wins_by_ko INTEGER NOT NULL DEFAULT 0 CHECK (wins_by_ko >= 0),
            wins_by_submission INTEGER NOT NULL DEFAULT 0 CHECK (wins_by_submission >= 0),
            updated_at TEXT NOT NULL
        );
        "#,
    )
}

fn fighter_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Fighter> {
    Ok(Fighter {
        id: FighterId(row.get(0)?),
        name: row.get(1)?,
        created_at: row.get(2)?,
    })
}

/// Feature rows held in a map. Any fighter id is accepted.
#[derive(Debug, Default)]
pub struct InMemoryFeatureStore {
    rows: Mutex<HashMap<FighterId, FighterFeatures>>,
}

impl InMemoryFeatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FeatureStore for InMemoryFeatureStore {
    fn get_features(&self, fighter_id: FighterId) -> Result<FighterFeatures, StoreError> {
        let rows = self.rows.lock().map_err(|_| StoreError::Poisoned)?;
        rows.get(&fighter_id)
            .cloned()
            .ok_or(StoreError::NotFound { fighter_id })
    }

    fn upsert_features(
        &self,
        fighter_id: FighterId,
        stats: &FeatureStats,
    ) -> Result<FighterFeatures, StoreError> {
        if !stats.is_valid() {
            return Err(StoreError::InvalidStats { fighter_id });
        }
        let row = FighterFeatures {
            fighter_id,
            stats: *stats,
            updated_at: Utc::now(),
        };
        let mut rows = self.rows.lock().map_err(|_| StoreError::Poisoned)?;
        rows.insert(fighter_id, row.clone());
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_missing_row_is_not_found() {
        let store = InMemoryFeatureStore::new();
        let err = store.get_features(FighterId(4)).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { fighter_id } if fighter_id == FighterId(4)));
    }

    #[test]
    fn in_memory_rejects_negative_values() {
        let store = InMemoryFeatureStore::new();
        let stats = FeatureStats {
            avg_sub_att: -0.5,
            ..FeatureStats::zeros()
        };
        assert!(matches!(
            store.upsert_features(FighterId(1), &stats),
            Err(StoreError::InvalidStats { .. })
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn sqlite_duplicate_name_is_rejected() {
        let store = SqliteFeatureStore::open_in_memory().unwrap();
        store.insert_fighter("Alex Pereira").unwrap();
        assert!(matches!(
            store.insert_fighter(" Alex Pereira "),
            Err(StoreError::InvalidName(_))
        ));
        assert!(matches!(
            store.insert_fighter("   "),
            Err(StoreError::InvalidName(_))
        ));
    }
}

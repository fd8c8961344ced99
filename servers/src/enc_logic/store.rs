//! # ENC Store
//!
//! Access to the private SQLite database of the plugin. The file `enc.db`
//! lives inside the location handed over in the `PluginDatabasePath` path
//! parameter and is opened (and migrated) once per request.
//!
//! Tables keep the names the manager's schema uses: `encs` for overrides,
//! `regexes` for rules, `regex_sls_maps` for rule classes. Every read orders by
//! `id`, so results come back in insertion order.

use std::path::Path;
use std::time::Duration;

use lib_common::Database;
use tracing::debug;

use super::error::EncError;
use super::model::{ClassName, EncRecord, NodeKey, RegexClass, RegexRule};

/// Name of the database file inside the private database location.
pub const DB_FILE_NAME: &str = "enc.db";

/// Schema objects, created if absent. Order matters: indexes follow their table.
const SCHEMA: &[(&str, &str)] = &[
    (
        "encs table",
        "CREATE TABLE IF NOT EXISTS encs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            salt_id TEXT NOT NULL DEFAULT '',
            formula TEXT NOT NULL DEFAULT '',
            state_file TEXT,
            dc TEXT NOT NULL DEFAULT '',
            env TEXT NOT NULL DEFAULT ''
        )",
    ),
    (
        "idx_enc_salt_id index",
        "CREATE INDEX IF NOT EXISTS idx_enc_salt_id ON encs (salt_id)",
    ),
    (
        "regexes table",
        "CREATE TABLE IF NOT EXISTS regexes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            regex TEXT NOT NULL DEFAULT '',
            dc TEXT NOT NULL DEFAULT '',
            env TEXT NOT NULL DEFAULT ''
        )",
    ),
    (
        "regex_sls_maps table",
        "CREATE TABLE IF NOT EXISTS regex_sls_maps (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            regex_id INTEGER NOT NULL,
            formula TEXT NOT NULL,
            state_file TEXT
        )",
    ),
    (
        "idx_regex_sls_maps_regex_id index",
        "CREATE INDEX IF NOT EXISTS idx_regex_sls_maps_regex_id ON regex_sls_maps (regex_id)",
    ),
];

/// Handle on one private database for the duration of a request.
pub struct EncStore {
    db: Database,
}

impl EncStore {
    /// Opens `<location>/enc.db`, creating the file and schema if needed.
    pub async fn open(location: &str, acquire_timeout: Duration) -> Result<Self, EncError> {
        let path = Path::new(location).join(DB_FILE_NAME);
        let db = Database::open(&path, acquire_timeout)
            .await
            .map_err(|source| EncError::StoreOpen {
                location: location.to_string(),
                source,
            })?;
        let store = Self { db };
        store.migrate().await?;
        debug!(path = %store.db.path().display(), "ENC store opened");
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), EncError> {
        for &(object, statement) in SCHEMA {
            sqlx::query(statement)
                .execute(&self.db.pool)
                .await
                .map_err(|source| EncError::Schema { object, source })?;
        }
        Ok(())
    }

    /// All overrides of one node, in insertion order.
    pub async fn overrides_for(&self, key: &NodeKey<'_>) -> Result<Vec<EncRecord>, EncError> {
        sqlx::query_as::<_, EncRecord>(
            "SELECT id, salt_id, formula, state_file, dc, env FROM encs
             WHERE salt_id = ? AND dc = ? AND env = ? ORDER BY id",
        )
        .bind(key.salt_id)
        .bind(key.dc)
        .bind(key.env)
        .fetch_all(&self.db.pool)
        .await
        .map_err(EncError::Query)
    }

    /// All rules scoped to a data centre and environment, in insertion order.
    pub async fn rules_for(&self, dc: &str, env: &str) -> Result<Vec<RegexRule>, EncError> {
        sqlx::query_as::<_, RegexRule>(
            "SELECT id, regex, dc, env FROM regexes WHERE dc = ? AND env = ? ORDER BY id",
        )
        .bind(dc)
        .bind(env)
        .fetch_all(&self.db.pool)
        .await
        .map_err(EncError::Query)
    }

    /// Classes a rule expands to, in insertion order.
    pub async fn classes_for_rule(&self, rule_id: i64) -> Result<Vec<RegexClass>, EncError> {
        sqlx::query_as::<_, RegexClass>(
            "SELECT id, regex_id, formula, state_file FROM regex_sls_maps
             WHERE regex_id = ? ORDER BY id",
        )
        .bind(rule_id)
        .fetch_all(&self.db.pool)
        .await
        .map_err(EncError::Query)
    }

    /// Replaces every override of `key` with `classes`.
    ///
    /// The delete and the inserts run in one transaction: either the new set is
    /// fully in place or the old one is untouched. Returns how many old records
    /// were removed.
    pub async fn replace_overrides(&self, key: &NodeKey<'_>, classes: &[ClassName]) -> Result<u64, EncError> {
        let mutation = |source: sqlx::Error| EncError::Mutation {
            salt_id: key.salt_id.to_string(),
            source,
        };

        let mut tx = self.db.pool.begin().await.map_err(mutation)?;

        let removed = sqlx::query("DELETE FROM encs WHERE salt_id = ? AND dc = ? AND env = ?")
            .bind(key.salt_id)
            .bind(key.dc)
            .bind(key.env)
            .execute(&mut *tx)
            .await
            .map_err(mutation)?
            .rows_affected();

        for class in classes {
            sqlx::query("INSERT INTO encs (salt_id, formula, state_file, dc, env) VALUES (?, ?, ?, ?, ?)")
                .bind(key.salt_id)
                .bind(class.formula.as_str())
                .bind(class.state_file.as_deref())
                .bind(key.dc)
                .bind(key.env)
                .execute(&mut *tx)
                .await
                .map_err(mutation)?;
        }

        tx.commit().await.map_err(mutation)?;
        Ok(removed)
    }

    /// Releases the database file.
    pub async fn close(self) {
        self.db.close().await;
    }

    /// Adds a rule. Rules are administered outside the service; this is for seeding tests.
    #[cfg(test)]
    pub async fn insert_rule(&self, regex: &str, dc: &str, env: &str) -> i64 {
        sqlx::query("INSERT INTO regexes (regex, dc, env) VALUES (?, ?, ?)")
            .bind(regex)
            .bind(dc)
            .bind(env)
            .execute(&self.db.pool)
            .await
            .expect("insert rule")
            .last_insert_rowid()
    }

    #[cfg(test)]
    pub async fn insert_rule_class(&self, rule_id: i64, formula: &str, state_file: Option<&str>) {
        sqlx::query("INSERT INTO regex_sls_maps (regex_id, formula, state_file) VALUES (?, ?, ?)")
            .bind(rule_id)
            .bind(formula)
            .bind(state_file)
            .execute(&self.db.pool)
            .await
            .expect("insert rule class");
    }
}

//! SQLite-based Storage Provider
//!
//! Provides persistent storage for:
//! - Group states with their current epoch
//! - Locally issued key packages and their HPKE private keys
//! - The ledger of key packages consumed by create or add
//!
//! Uses connection pooling for concurrent access and one SQLite transaction
//! per [`StorageTransaction`] for atomicity.

use crate::core_mls::errors::{MlsError, MlsResult};
use crate::core_mls::traits::storage::{
    StorageProvider, StorageTransaction, StoredGroup, StoredKeyPackage,
};
use crate::core_mls::types::{current_timestamp, GroupId, KeyPackageRef};
use async_trait::async_trait;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Database file name used when no identity is given
const DEFAULT_IDENTITY: &str = "default";

/// Schema version written on first open
const SCHEMA_VERSION: i64 = 1;

/// SQLite-backed storage provider
pub struct SqlStorageProvider {
    pool: Arc<Pool<SqliteConnectionManager>>,
    path: PathBuf,
}

impl SqlStorageProvider {
    /// Open the database for `identity` under `dir`
    ///
    /// The file is `<dir>/<identity>mls.db`; an empty identity maps to
    /// `defaultmls.db`. The directory is created if missing.
    pub fn open<P: AsRef<Path>>(dir: P, identity: &str) -> MlsResult<Self> {
        Self::new(Self::database_path(dir, identity)?)
    }

    /// Database path for `identity` under `dir`
    pub fn database_path<P: AsRef<Path>>(dir: P, identity: &str) -> MlsResult<PathBuf> {
        let identity = if identity.is_empty() { DEFAULT_IDENTITY } else { identity };
        if identity.contains(['/', '\\']) || identity == "." || identity == ".." {
            return Err(MlsError::InvalidInput(format!(
                "Identity '{}' cannot be used as a file name",
                identity
            )));
        }

        std::fs::create_dir_all(dir.as_ref())
            .map_err(|e| MlsError::Storage(format!("Failed to create data directory: {}", e)))?;

        Ok(dir.as_ref().join(format!("{}mls.db", identity)))
    }

    /// Create a new SQL storage provider
    ///
    /// # Arguments
    /// * `db_path` - Path to SQLite database file
    pub fn new<P: AsRef<Path>>(db_path: P) -> MlsResult<Self> {
        let path = db_path.as_ref().to_path_buf();
        let manager = SqliteConnectionManager::file(&path)
            .with_init(|conn| {
                // Deleted and overwritten rows hold key material; zero them on disk
                conn.execute_batch("PRAGMA busy_timeout = 5000; PRAGMA secure_delete = ON;")
            });
        let pool = Pool::builder()
            .max_size(8)
            .build(manager)
            .map_err(|e| MlsError::Storage(format!("Failed to create connection pool: {}", e)))?;

        let provider = Self { pool: Arc::new(pool), path };

        provider.init_schema()?;
        tracing::debug!(path = %provider.path.display(), "Opened SQL storage");

        Ok(provider)
    }

    /// Location of the database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Initialize database schema
    fn init_schema(&self) -> MlsResult<()> {
        let conn = self
            .pool
            .get()
            .map_err(|e| MlsError::Storage(format!("Failed to get connection: {}", e)))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS group_states (
                group_id BLOB PRIMARY KEY,
                epoch INTEGER NOT NULL,
                state_data BLOB NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS key_packages (
                key_package_ref BLOB PRIMARY KEY,
                identity TEXT NOT NULL,
                key_package_data BLOB NOT NULL,
                init_private_key BLOB NOT NULL,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_key_packages_expires
                ON key_packages(expires_at);

            CREATE TABLE IF NOT EXISTS consumed_key_packages (
                key_package_ref BLOB PRIMARY KEY,
                consumed_at INTEGER NOT NULL
            );
            "#,
        )
        .map_err(|e| MlsError::Storage(format!("Failed to initialize schema: {}", e)))?;

        conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?, ?)",
            params![SCHEMA_VERSION, now()],
        )
        .map_err(|e| MlsError::Storage(format!("Failed to set schema version: {}", e)))?;

        Ok(())
    }

    /// Run `f` on a pooled connection off the async runtime
    async fn with_conn<T, F>(&self, f: F) -> MlsResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut rusqlite::Connection) -> MlsResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| MlsError::Storage(format!("Failed to get connection: {}", e)))?;
            f(&mut *conn)
        })
        .await
        .map_err(|e| MlsError::Storage(format!("Task join error: {}", e)))?
    }
}

#[async_trait]
impl StorageProvider for SqlStorageProvider {
    async fn commit(&self, tx: StorageTransaction) -> MlsResult<()> {
        if tx.is_empty() {
            return Ok(());
        }

        self.with_conn(move |conn| {
            let sql_tx = conn
                .transaction()
                .map_err(|e| MlsError::Storage(format!("Failed to begin transaction: {}", e)))?;
            let now = now();

            for group_id in &tx.delete_groups {
                sql_tx
                    .execute("DELETE FROM group_states WHERE group_id = ?", params![group_id.as_bytes()])
                    .map_err(|e| MlsError::Storage(format!("Failed to delete group: {}", e)))?;
            }

            for key_package_ref in &tx.delete_key_packages {
                sql_tx
                    .execute(
                        "DELETE FROM key_packages WHERE key_package_ref = ?",
                        params![key_package_ref.as_bytes()],
                    )
                    .map_err(|e| MlsError::Storage(format!("Failed to delete key package: {}", e)))?;
            }

            for group in &tx.put_groups {
                sql_tx
                    .execute(
                        r#"
                        INSERT INTO group_states (group_id, epoch, state_data, created_at, updated_at)
                        VALUES (?, ?, ?, ?, ?)
                        ON CONFLICT(group_id) DO UPDATE SET
                            epoch = excluded.epoch,
                            state_data = excluded.state_data,
                            updated_at = excluded.updated_at
                        "#,
                        params![group.group_id.as_bytes(), to_sql_int(group.epoch), &group.state, now, now],
                    )
                    .map_err(|e| MlsError::Storage(format!("Failed to save group state: {}", e)))?;
            }

            for key_package in &tx.put_key_packages {
                sql_tx
                    .execute(
                        r#"
                        INSERT INTO key_packages
                            (key_package_ref, identity, key_package_data, init_private_key, created_at, expires_at)
                        VALUES (?, ?, ?, ?, ?, ?)
                        ON CONFLICT(key_package_ref) DO UPDATE SET
                            key_package_data = excluded.key_package_data,
                            init_private_key = excluded.init_private_key,
                            expires_at = excluded.expires_at
                        "#,
                        params![
                            key_package.key_package_ref.as_bytes(),
                            &key_package.identity,
                            &key_package.encoded,
                            &key_package.init_private_key,
                            now,
                            to_sql_int(key_package.expires_at),
                        ],
                    )
                    .map_err(|e| MlsError::Storage(format!("Failed to store key package: {}", e)))?;
            }

            for key_package_ref in &tx.consume_key_packages {
                sql_tx
                    .execute(
                        "INSERT OR IGNORE INTO consumed_key_packages (key_package_ref, consumed_at) VALUES (?, ?)",
                        params![key_package_ref.as_bytes(), now],
                    )
                    .map_err(|e| MlsError::Storage(format!("Failed to mark key package consumed: {}", e)))?;
            }

            sql_tx
                .commit()
                .map_err(|e| MlsError::Storage(format!("Failed to commit transaction: {}", e)))
        })
        .await
    }

    async fn load_group(&self, group_id: &GroupId) -> MlsResult<Option<StoredGroup>> {
        let group_id = group_id.clone();

        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT epoch, state_data FROM group_states WHERE group_id = ?",
                params![group_id.as_bytes()],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?)),
            )
            .optional()
            .map_err(|e| MlsError::Storage(format!("Failed to load group state: {}", e)))
            .map(|found| {
                found.map(|(epoch, state)| StoredGroup {
                    group_id,
                    epoch: from_sql_int(epoch),
                    state,
                })
            })
        })
        .await
    }

    async fn list_groups(&self) -> MlsResult<Vec<GroupId>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT group_id FROM group_states ORDER BY group_id")
                .map_err(|e| MlsError::Storage(format!("Failed to prepare statement: {}", e)))?;

            let groups = stmt
                .query_map([], |row| row.get::<_, Vec<u8>>(0))
                .map_err(|e| MlsError::Storage(format!("Failed to query groups: {}", e)))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| MlsError::Storage(format!("Failed to collect groups: {}", e)))?;

            Ok(groups.into_iter().map(GroupId::new).collect())
        })
        .await
    }

    async fn load_key_package(
        &self,
        key_package_ref: &KeyPackageRef,
    ) -> MlsResult<Option<StoredKeyPackage>> {
        let key_package_ref = key_package_ref.clone();

        self.with_conn(move |conn| {
            conn.query_row(
                r#"
                SELECT key_package_ref, identity, key_package_data, init_private_key, expires_at
                FROM key_packages WHERE key_package_ref = ?
                "#,
                params![key_package_ref.as_bytes()],
                key_package_from_row,
            )
            .optional()
            .map_err(|e| MlsError::Storage(format!("Failed to load key package: {}", e)))
        })
        .await
    }

    async fn list_key_packages(&self) -> MlsResult<Vec<StoredKeyPackage>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    r#"
                    SELECT key_package_ref, identity, key_package_data, init_private_key, expires_at
                    FROM key_packages ORDER BY created_at
                    "#,
                )
                .map_err(|e| MlsError::Storage(format!("Failed to prepare statement: {}", e)))?;

            let packages = stmt
                .query_map([], key_package_from_row)
                .map_err(|e| MlsError::Storage(format!("Failed to query key packages: {}", e)))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| MlsError::Storage(format!("Failed to collect key packages: {}", e)))?;

            Ok(packages)
        })
        .await
    }

    async fn is_consumed(&self, key_package_ref: &KeyPackageRef) -> MlsResult<bool> {
        let key_package_ref = key_package_ref.clone();

        self.with_conn(move |conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM consumed_key_packages WHERE key_package_ref = ?",
                    params![key_package_ref.as_bytes()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| MlsError::Storage(format!("Failed to query consumed ledger: {}", e)))?;

            Ok(found.is_some())
        })
        .await
    }
}

fn key_package_from_row(row: &Row<'_>) -> rusqlite::Result<StoredKeyPackage> {
    Ok(StoredKeyPackage {
        key_package_ref: KeyPackageRef(row.get(0)?),
        identity: row.get(1)?,
        encoded: row.get(2)?,
        init_private_key: row.get(3)?,
        expires_at: from_sql_int(row.get(4)?),
    })
}

// SQLite integers are signed; saturate instead of wrapping
fn to_sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_sql_int(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn now() -> i64 {
    to_sql_int(current_timestamp())
}

//! # Storage Session
//!
//! Connection pool plus change tracker: one [`Session`] per logical unit
//! of work.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Storage Session                            │
//! │                                                                 │
//! │  Host creates Session::new(config) per unit of work             │
//! │       │                                                         │
//! │       ├── session.repository::<Appointment>()                   │
//! │       ├── session.repository::<Sample>()                        │
//! │       │        │                                                │
//! │       │        ├── create/update/remove  → own transaction      │
//! │       │        └── prepare_*             → change tracker       │
//! │       │                                                         │
//! │       ▼                                                         │
//! │  session.save()                                                 │
//! │       │                                                         │
//! │       ▼                                                         │
//! │  ┌─────────────────────────────────────────┐                    │
//! │  │           SINGLE TRANSACTION            │                    │
//! │  │  every staged change, in staging order  │                    │
//! │  └─────────────────────────────────────────┘                    │
//! │       │                                                         │
//! │       ▼                                                         │
//! │  COMMIT ← all staged changes persist, or none do                │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Clones of a `Session` share the pool and the change tracker, so any
//! number of repositories can stage into one unit of work. A session is
//! meant for one logical unit of work at a time; staging from several
//! tasks concurrently interleaves their changes without further
//! guarantees.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::entity::Entity;
use crate::error::{DbError, DbResult};
use crate::repository::EntityRepository;
use crate::value::{self, Value};

// =============================================================================
// Configuration
// =============================================================================

/// Storage session configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/path/to/medilab.db")
///     .max_connections(5)
///     .min_connections(1);
/// let session = Session::new(config).await?;
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,

    /// Maximum number of connections in the pool.
    /// Default: 5
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    /// Default: 1
    pub min_connections: u32,

    /// Connection timeout duration.
    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// Idle timeout before closing a connection.
    /// Default: 10 minutes
    pub idle_timeout: Duration,
}

impl DbConfig {
    /// Creates a new configuration with the given database path.
    /// The file is created if it doesn't exist.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
        }
    }

    /// Sets the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the minimum number of connections.
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Sets the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Creates an in-memory database configuration (for testing).
    ///
    /// ## Usage
    /// ```rust,ignore
    /// let session = Session::new(DbConfig::in_memory()).await?;
    /// ```
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(":memory:"),
            max_connections: 1, // In-memory requires single connection
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

// =============================================================================
// Pending operations
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A staged mutation, rendered to SQL at staging time.
///
/// Values are copied out of the entity when the operation is rendered, so
/// staging never mutates the entity and later edits to it do not alter
/// what was staged.
#[derive(Debug, Clone)]
pub(crate) struct PendingOp {
    kind: ChangeKind,
    entity: &'static str,
    sql: String,
    values: Vec<Value>,
}

impl PendingOp {
    pub(crate) fn insert<T: Entity>(entity: &T) -> Self {
        let placeholders: Vec<String> = (1..=T::COLUMNS.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            T::TABLE,
            T::COLUMNS.join(", "),
            placeholders.join(", ")
        );

        PendingOp {
            kind: ChangeKind::Insert,
            entity: T::TABLE,
            sql,
            values: entity.values(),
        }
    }

    /// Renders a whole-row overwrite: every non-identity column is written
    /// from the supplied entity, with no diffing against stored state.
    pub(crate) fn update<T: Entity>(entity: &T) -> Self {
        let mut assignments = Vec::new();
        let mut values = Vec::new();
        for (column, bound) in T::COLUMNS.iter().zip(entity.values()) {
            if *column == T::ID_COLUMN {
                continue;
            }
            values.push(bound);
            assignments.push(format!("{} = ?{}", column, values.len()));
        }
        values.push(entity.key().into_value());
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?{}",
            T::TABLE,
            assignments.join(", "),
            T::ID_COLUMN,
            values.len()
        );

        PendingOp {
            kind: ChangeKind::Update,
            entity: T::TABLE,
            sql,
            values,
        }
    }

    pub(crate) fn delete<T: Entity>(entity: &T) -> Self {
        PendingOp {
            kind: ChangeKind::Delete,
            entity: T::TABLE,
            sql: format!("DELETE FROM {} WHERE {} = ?1", T::TABLE, T::ID_COLUMN),
            values: vec![entity.key().into_value()],
        }
    }
}

// =============================================================================
// Session
// =============================================================================

/// Shared storage session: connection pool plus staged-change tracker.
///
/// Created per logical unit of work by the hosting application, handed to
/// any number of repositories, and closed by the host. Cloning is cheap
/// and clones share state.
#[derive(Debug, Clone)]
pub struct Session {
    pool: SqlitePool,
    tracker: Arc<Mutex<Vec<PendingOp>>>,
}

impl Session {
    /// Opens the connection pool described by `config`.
    ///
    /// ## What This Does
    /// 1. Creates the database file if it doesn't exist
    /// 2. Configures SQLite:
    ///    - WAL mode for concurrent reads
    ///    - NORMAL synchronous
    ///    - Foreign keys enabled
    /// 3. Creates the connection pool
    ///
    /// ## Returns
    /// * `Ok(Session)` - Ready-to-use session
    /// * `Err(DbError::ConnectionFailed)` - Pool could not be created
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            "Initializing storage session"
        );

        // sqlite://path creates the file if not exists
        let connect_url = format!("sqlite://{}?mode=rwc", config.database_path.display());

        let connect_options = SqliteConnectOptions::from_str(&connect_url)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            // WAL mode: readers don't block writers, writers don't block readers
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            // SQLite ships with foreign keys off; this layer relies on them
            .foreign_keys(true)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            "Storage session pool created"
        );

        Ok(Session {
            pool,
            tracker: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Returns a repository over `T` bound to this session.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let appointments = session.repository::<Appointment>();
    /// let pending = appointments.filter(Filter::eq("status", "pending"));
    /// ```
    pub fn repository<T: Entity>(&self) -> EntityRepository<T> {
        EntityRepository::new(self.clone())
    }

    /// Returns a reference to the connection pool.
    ///
    /// For advanced statements not covered by repositories.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Number of staged changes awaiting [`Session::save`].
    pub fn pending_changes(&self) -> usize {
        self.lock().len()
    }

    /// Records a staged change on the tracker without touching the store.
    pub(crate) fn stage(&self, op: PendingOp) {
        debug!(entity = op.entity, kind = ?op.kind, "Staging change");
        self.lock().push(op);
    }

    /// Commits every staged change in one transaction, in staging order,
    /// returning the total number of affected rows. A save with nothing
    /// staged returns 0.
    ///
    /// On failure the transaction rolls back, the staged set is restored
    /// and the engine error propagates unchanged, so the unit of work can
    /// be retried or discarded by the caller.
    pub async fn save(&self) -> DbResult<u64> {
        let staged: Vec<PendingOp> = {
            let mut tracker = self.lock();
            std::mem::take(&mut *tracker)
        };
        if staged.is_empty() {
            return Ok(0);
        }

        debug!(count = staged.len(), "Committing staged changes");
        match commit_batch(&self.pool, &staged).await {
            Ok(affected) => Ok(affected),
            Err(err) => {
                let mut tracker = self.lock();
                let mut restored = staged;
                restored.extend(tracker.drain(..));
                *tracker = restored;
                Err(err)
            }
        }
    }

    /// Commits a single operation in its own transaction, leaving the
    /// staged set untouched.
    pub(crate) async fn commit_detached(&self, op: PendingOp) -> DbResult<u64> {
        commit_batch(&self.pool, std::slice::from_ref(&op)).await
    }

    /// Closes the connection pool. After this, all operations fail.
    pub async fn close(&self) {
        info!("Closing storage session pool");
        self.pool.close().await;
    }

    /// Checks whether the store can execute statements.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PendingOp>> {
        // A poisoning panic cannot leave the Vec mid-edit; keep going.
        self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Executes `ops` inside one transaction and sums their affected rows.
/// The first failing statement aborts the batch; the transaction rolls
/// back when dropped uncommitted.
async fn commit_batch(pool: &SqlitePool, ops: &[PendingOp]) -> DbResult<u64> {
    let mut tx = pool.begin().await?;
    let mut affected = 0u64;
    for op in ops {
        let mut query = sqlx::query(&op.sql);
        for bound in &op.values {
            query = value::bind(query, bound);
        }
        affected += query.execute(&mut *tx).await?.rows_affected();
    }
    tx.commit().await?;
    Ok(affected)
}

// =============================================================================
// Unit Tests
// =============================================================================

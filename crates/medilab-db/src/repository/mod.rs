//! # Repository Contract
//!
//! The operation surface every entity-typed repository exposes. Calling
//! code depends on this trait, never on the storage engine, so business
//! logic stays decoupled from persistence.
//!
//! ## Operation Groups
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Repository<T>                               │
//! │                                                                 │
//! │  CRUD (commit per call)    get_all, get_by_*, count,            │
//! │                            create, update, remove               │
//! │                                                                 │
//! │  Query composition (lazy)  query, include, filter,              │
//! │                            order_by, order_by_desc              │
//! │                                                                 │
//! │  Staged (no I/O)           prepare_create, prepare_update,      │
//! │                            prepare_remove                       │
//! │                                                                 │
//! │  Unit of work              save                                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod generic;

pub use generic::EntityRepository;

use async_trait::async_trait;
use uuid::Uuid;

use crate::entity::Entity;
use crate::error::DbResult;
use crate::query::{EntityQuery, Filter, OrderedEntityQuery};

/// Full operation surface of an entity-typed repository.
///
/// Keyed lookups come in the four identity shapes entities use; absence
/// is `Ok(None)`, never an error. Mutating operations commit before
/// returning, except the `prepare_*` group, which stages onto the owning
/// session until [`Repository::save`].
#[async_trait]
pub trait Repository<T: Entity>: Send + Sync {
    // -------------------------------------------------------------------------
    // CRUD
    // -------------------------------------------------------------------------

    /// Materializes every row of the entity's table.
    async fn get_all(&self) -> DbResult<Vec<T>>;

    /// Looks up an entity by 32-bit integer id.
    async fn get_by_int_id(&self, id: i32) -> DbResult<Option<T>>;

    /// Looks up an entity by 64-bit integer id.
    async fn get_by_long_id(&self, id: i64) -> DbResult<Option<T>>;

    /// Looks up an entity by string code.
    async fn get_by_code(&self, code: &str) -> DbResult<Option<T>>;

    /// Looks up an entity by UUID.
    async fn get_by_uuid(&self, id: Uuid) -> DbResult<Option<T>>;

    /// Counts the rows of the entity's table.
    async fn count(&self) -> DbResult<i64>;

    /// Inserts the entity and commits, returning the affected-row count.
    ///
    /// Commits in its own transaction: staged changes on the session are
    /// left untouched.
    async fn create(&self, entity: &T) -> DbResult<u64>;

    /// Overwrites the entity's whole row from the supplied value and
    /// commits, returning the affected-row count. No diffing: every
    /// non-identity column is rewritten.
    ///
    /// Commits in its own transaction: staged changes on the session are
    /// left untouched.
    async fn update(&self, entity: &T) -> DbResult<u64>;

    /// Deletes the entity's row and commits. Returns whether a row was
    /// actually deleted.
    ///
    /// Commits in its own transaction: staged changes on the session are
    /// left untouched.
    async fn remove(&self, entity: &T) -> DbResult<bool>;

    // -------------------------------------------------------------------------
    // Query composition
    // -------------------------------------------------------------------------

    /// The full, unfiltered lazy query over the entity's table.
    fn query(&self) -> EntityQuery<T>;

    /// A lazy query carrying an eager-load directive for `relation`.
    fn include(&self, relation: &str) -> EntityQuery<T>;

    /// A lazy query restricted by `filter`.
    fn filter(&self, filter: Filter) -> EntityQuery<T>;

    /// A lazy query sorted ascending on `column`. Secondary sorts chain
    /// with [`OrderedEntityQuery::then_by`].
    fn order_by(&self, column: &str) -> OrderedEntityQuery<T>;

    /// A lazy query sorted descending on `column`.
    fn order_by_desc(&self, column: &str) -> OrderedEntityQuery<T>;

    // -------------------------------------------------------------------------
    // Staged operations: record onto the session, commit on save
    // -------------------------------------------------------------------------

    /// Stages an insert of the entity without committing.
    fn prepare_create(&self, entity: &T);

    /// Stages a whole-row overwrite of the entity without committing.
    fn prepare_update(&self, entity: &T);

    /// Stages a delete of the entity without committing.
    fn prepare_remove(&self, entity: &T);

    /// Commits every change staged on the owning session, across all of
    /// its repositories, in one transaction. Returns the total number of
    /// affected rows.
    async fn save(&self) -> DbResult<u64>;
}

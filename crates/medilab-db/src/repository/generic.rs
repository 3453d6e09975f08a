//! # Generic Repository
//!
//! The single [`Repository`] implementation, usable for any [`Entity`]
//! without per-entity subclassing. Every operation delegates to the shared
//! [`Session`], scoped to the entity's table.
//!
//! Entity-specific rules (validation, cascades, business logic) belong to
//! calling code, never here.

use std::fmt;
use std::marker::PhantomData;

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use crate::entity::{Entity, Key};
use crate::error::DbResult;
use crate::query::{EntityQuery, Filter, OrderedEntityQuery};
use crate::repository::Repository;
use crate::session::{PendingOp, Session};
use crate::value;

/// Repository over one entity type, backed by a shared [`Session`].
///
/// Holds nothing but the session reference: no per-call state, no
/// disposable resources, no lifecycle beyond the session it wraps. The
/// session is a required constructor argument, so a repository without a
/// backing store cannot be built.
///
/// ## Usage
/// ```rust,ignore
/// let appointments = session.repository::<Appointment>();
///
/// // Commit-per-call
/// appointments.create(&booked).await?;
///
/// // Staged unit of work
/// appointments.prepare_create(&first);
/// appointments.prepare_create(&second);
/// appointments.save().await?;
/// ```
pub struct EntityRepository<T: Entity> {
    session: Session,
    marker: PhantomData<fn() -> T>,
}

impl<T: Entity> EntityRepository<T> {
    /// Creates a repository over `T` bound to `session`.
    pub fn new(session: Session) -> Self {
        EntityRepository {
            session,
            marker: PhantomData,
        }
    }

    /// The session this repository stages into and commits through.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Keyed lookup shared by the four identity shapes.
    async fn find(&self, key: Key) -> DbResult<Option<T>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?1",
            T::COLUMNS.join(", "),
            T::TABLE,
            T::ID_COLUMN
        );
        debug!(entity = T::TABLE, key = %key, "Looking up by key");

        let query = value::bind_as(sqlx::query_as::<_, T>(&sql), &key.into_value());
        Ok(query.fetch_optional(self.session.pool()).await?)
    }
}

impl<T: Entity> Clone for EntityRepository<T> {
    fn clone(&self) -> Self {
        EntityRepository {
            session: self.session.clone(),
            marker: PhantomData,
        }
    }
}

impl<T: Entity> fmt::Debug for EntityRepository<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityRepository")
            .field("table", &T::TABLE)
            .finish()
    }
}

#[async_trait]
impl<T: Entity> Repository<T> for EntityRepository<T> {
    async fn get_all(&self) -> DbResult<Vec<T>> {
        self.query().fetch_all().await
    }

    async fn get_by_int_id(&self, id: i32) -> DbResult<Option<T>> {
        self.find(Key::Int(id)).await
    }

    async fn get_by_long_id(&self, id: i64) -> DbResult<Option<T>> {
        self.find(Key::Long(id)).await
    }

    async fn get_by_code(&self, code: &str) -> DbResult<Option<T>> {
        self.find(Key::Code(code.to_owned())).await
    }

    async fn get_by_uuid(&self, id: Uuid) -> DbResult<Option<T>> {
        self.find(Key::Uuid(id)).await
    }

    async fn count(&self) -> DbResult<i64> {
        self.query().count().await
    }

    async fn create(&self, entity: &T) -> DbResult<u64> {
        debug!(entity = T::TABLE, "Creating");
        self.session.commit_detached(PendingOp::insert(entity)).await
    }

    async fn update(&self, entity: &T) -> DbResult<u64> {
        debug!(entity = T::TABLE, key = %entity.key(), "Updating");
        self.session.commit_detached(PendingOp::update(entity)).await
    }

    async fn remove(&self, entity: &T) -> DbResult<bool> {
        debug!(entity = T::TABLE, key = %entity.key(), "Removing");
        let affected = self.session.commit_detached(PendingOp::delete(entity)).await?;
        Ok(affected > 0)
    }

    fn query(&self) -> EntityQuery<T> {
        EntityQuery::new(self.session.clone())
    }

    fn include(&self, relation: &str) -> EntityQuery<T> {
        self.query().include(relation)
    }

    fn filter(&self, filter: Filter) -> EntityQuery<T> {
        self.query().filter(filter)
    }

    fn order_by(&self, column: &str) -> OrderedEntityQuery<T> {
        self.query().order_by(column)
    }

    fn order_by_desc(&self, column: &str) -> OrderedEntityQuery<T> {
        self.query().order_by_desc(column)
    }

    fn prepare_create(&self, entity: &T) {
        self.session.stage(PendingOp::insert(entity));
    }

    fn prepare_update(&self, entity: &T) {
        self.session.stage(PendingOp::update(entity));
    }

    fn prepare_remove(&self, entity: &T) {
        self.session.stage(PendingOp::delete(entity));
    }

    async fn save(&self) -> DbResult<u64> {
        self.session.save().await
    }
}

//! # Composable Queries
//!
//! Lazy query descriptors over one entity table.
//!
//! ## Laziness
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Query Lifecycle                             │
//! │                                                                 │
//! │  repo.filter(..)          ← no I/O, returns descriptor          │
//! │      .filter(..)          ← no I/O                              │
//! │      .order_by("dept")    ← no I/O                              │
//! │      .then_by("name")     ← no I/O                              │
//! │      .fetch_all().await   ← ONE SELECT reflecting all operators │
//! │                                                                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Descriptors are `Clone` and re-enterable: every terminal call executes
//! a fresh statement against the current store state.
//!
//! Operators referencing a column or relation the entity does not declare
//! are remembered at composition time and fail the terminal call, so
//! chaining stays infallible.

use std::marker::PhantomData;

use sqlx::sqlite::SqliteRow;
use tracing::debug;

use crate::entity::{Entity, Relation};
use crate::error::{DbError, DbResult};
use crate::session::Session;
use crate::value::{self, Value};

// =============================================================================
// Filters
// =============================================================================

/// Comparison operator of a [`Filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
    IsNull,
    IsNotNull,
}

impl Op {
    fn sql(self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::NotEq => "<>",
            Op::Lt => "<",
            Op::Lte => "<=",
            Op::Gt => ">",
            Op::Gte => ">=",
            Op::Like => "LIKE",
            Op::IsNull => "IS NULL",
            Op::IsNotNull => "IS NOT NULL",
        }
    }

    fn takes_value(self) -> bool {
        !matches!(self, Op::IsNull | Op::IsNotNull)
    }
}

/// A predicate on one entity column.
///
/// ## Example
/// ```rust,ignore
/// let pending = repo
///     .filter(Filter::eq("status", "pending"))
///     .filter(Filter::like("patient_name", "Ng%"))
///     .fetch_all()
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct Filter {
    column: String,
    op: Op,
    value: Option<Value>,
}

impl Filter {
    fn new(column: impl Into<String>, op: Op, value: Option<Value>) -> Self {
        Filter {
            column: column.into(),
            op,
            value,
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::new(column, Op::Eq, Some(value.into()))
    }

    pub fn ne(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::new(column, Op::NotEq, Some(value.into()))
    }

    pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::new(column, Op::Lt, Some(value.into()))
    }

    pub fn lte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::new(column, Op::Lte, Some(value.into()))
    }

    pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::new(column, Op::Gt, Some(value.into()))
    }

    pub fn gte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::new(column, Op::Gte, Some(value.into()))
    }

    pub fn like(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Filter::new(column, Op::Like, Some(Value::Text(pattern.into())))
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Filter::new(column, Op::IsNull, None)
    }

    pub fn is_not_null(column: impl Into<String>) -> Self {
        Filter::new(column, Op::IsNotNull, None)
    }

    pub fn column(&self) -> &str {
        &self.column
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Asc,
    Desc,
}

impl Direction {
    fn sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone)]
struct OrderClause {
    column: String,
    direction: Direction,
}

/// First invalid composition step, replayed when the query materializes.
#[derive(Debug, Clone)]
enum Defect {
    Column(String),
    Relation(String),
}

// =============================================================================
// EntityQuery
// =============================================================================

/// A lazy, composable query over one entity table.
///
/// Obtained from a repository (`query`, `filter`, `include`); nothing
/// touches the store until a terminal call (`fetch_all`, `fetch_first`,
/// `count`).
#[derive(Debug, Clone)]
pub struct EntityQuery<T: Entity> {
    session: Session,
    filters: Vec<Filter>,
    order: Vec<OrderClause>,
    includes: Vec<&'static Relation>,
    limit: Option<i64>,
    offset: Option<i64>,
    defect: Option<Defect>,
    marker: PhantomData<fn() -> T>,
}

impl<T: Entity> EntityQuery<T> {
    pub(crate) fn new(session: Session) -> Self {
        EntityQuery {
            session,
            filters: Vec::new(),
            order: Vec::new(),
            includes: Vec::new(),
            limit: None,
            offset: None,
            defect: None,
            marker: PhantomData,
        }
    }

    /// Adds a predicate. Predicates combine with AND; commuting predicates
    /// may be added in any order.
    pub fn filter(mut self, filter: Filter) -> Self {
        if T::has_column(filter.column()) {
            self.filters.push(filter);
        } else {
            self.flag(Defect::Column(filter.column().to_owned()));
        }
        self
    }

    /// Adds an eager-load directive for a declared relation.
    ///
    /// Materialization fetches the related rows in one batched statement
    /// per relation and hands them to [`Entity::attach_related`].
    pub fn include(mut self, relation: &str) -> Self {
        match T::relation(relation) {
            Some(rel) if T::has_column(rel.local_key) => self.includes.push(rel),
            Some(rel) => self.flag(Defect::Column(rel.local_key.to_owned())),
            None => self.flag(Defect::Relation(relation.to_owned())),
        }
        self
    }

    /// Establishes the primary sort, ascending.
    pub fn order_by(self, column: &str) -> OrderedEntityQuery<T> {
        OrderedEntityQuery {
            inner: self.push_order(column, Direction::Asc),
        }
    }

    /// Establishes the primary sort, descending.
    pub fn order_by_desc(self, column: &str) -> OrderedEntityQuery<T> {
        OrderedEntityQuery {
            inner: self.push_order(column, Direction::Desc),
        }
    }

    /// Caps the number of rows materialized.
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips rows before materializing.
    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    fn push_order(mut self, column: &str, direction: Direction) -> Self {
        if T::has_column(column) {
            self.order.push(OrderClause {
                column: column.to_owned(),
                direction,
            });
        } else {
            self.flag(Defect::Column(column.to_owned()));
        }
        self
    }

    fn flag(&mut self, defect: Defect) {
        // Only the first defect is kept; later operators cannot repair it.
        self.defect.get_or_insert(defect);
    }

    fn guard(&self) -> DbResult<()> {
        match &self.defect {
            None => Ok(()),
            Some(Defect::Column(column)) => Err(DbError::UnknownColumn {
                entity: T::TABLE,
                column: column.clone(),
            }),
            Some(Defect::Relation(relation)) => Err(DbError::UnknownRelation {
                entity: T::TABLE,
                relation: relation.clone(),
            }),
        }
    }

    fn select_sql(&self, limit_override: Option<i64>) -> (String, Vec<Value>) {
        let mut sql = format!("SELECT {} FROM {}", T::COLUMNS.join(", "), T::TABLE);
        let mut binds = Vec::new();
        push_where(&mut sql, &mut binds, &self.filters);

        if !self.order.is_empty() {
            let clauses: Vec<String> = self
                .order
                .iter()
                .map(|c| format!("{} {}", c.column, c.direction.sql()))
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&clauses.join(", "));
        }

        // SQLite accepts OFFSET only after a LIMIT; -1 means unbounded.
        match (limit_override.or(self.limit), self.offset) {
            (Some(limit), Some(offset)) => {
                sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}"));
            }
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
            (None, None) => {}
        }

        (sql, binds)
    }

    /// Executes the query and materializes every matching row.
    pub async fn fetch_all(&self) -> DbResult<Vec<T>> {
        self.guard()?;

        let (sql, binds) = self.select_sql(None);
        debug!(entity = T::TABLE, sql = %sql, "materializing query");

        let mut query = sqlx::query_as::<_, T>(&sql);
        for bound in &binds {
            query = value::bind_as(query, bound);
        }
        let mut rows = query.fetch_all(self.session.pool()).await?;

        if !rows.is_empty() {
            for relation in &self.includes {
                self.load_related(relation, &mut rows).await?;
            }
        }

        Ok(rows)
    }

    /// Executes the query and materializes the first matching row, if any.
    pub async fn fetch_first(&self) -> DbResult<Option<T>> {
        self.guard()?;

        let (sql, binds) = self.select_sql(Some(1));
        debug!(entity = T::TABLE, sql = %sql, "materializing query");

        let mut query = sqlx::query_as::<_, T>(&sql);
        for bound in &binds {
            query = value::bind_as(query, bound);
        }
        let mut first = query.fetch_optional(self.session.pool()).await?;

        if let Some(row) = first.as_mut() {
            for relation in &self.includes {
                self.load_related(relation, std::slice::from_mut(row)).await?;
            }
        }

        Ok(first)
    }

    /// Counts the matching rows without materializing them.
    pub async fn count(&self) -> DbResult<i64> {
        self.guard()?;

        let mut sql = format!("SELECT COUNT(*) FROM {}", T::TABLE);
        let mut binds = Vec::new();
        push_where(&mut sql, &mut binds, &self.filters);

        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        for bound in &binds {
            query = value::bind_scalar(query, bound);
        }

        Ok(query.fetch_one(self.session.pool()).await?)
    }

    /// Fetches the rows of one relation for every materialized entity in a
    /// single batched statement and hands each entity its share.
    async fn load_related(&self, relation: &Relation, rows: &mut [T]) -> DbResult<()> {
        let Some(local) = T::COLUMNS.iter().position(|c| *c == relation.local_key) else {
            return Err(DbError::UnknownColumn {
                entity: T::TABLE,
                column: relation.local_key.to_owned(),
            });
        };

        let keys: Vec<Value> = rows
            .iter()
            .map(|row| row.values().get(local).cloned().unwrap_or(Value::Null))
            .collect();

        let placeholders: Vec<String> = (1..=keys.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "SELECT * FROM {} WHERE {} IN ({})",
            relation.related_table,
            relation.foreign_key,
            placeholders.join(", ")
        );
        debug!(entity = T::TABLE, relation = relation.name, sql = %sql, "loading relation");

        let mut query = sqlx::query(&sql);
        for key in &keys {
            query = value::bind(query, key);
        }
        let fetched = query.fetch_all(self.session.pool()).await?;

        let mut tagged: Vec<(Value, SqliteRow)> = Vec::with_capacity(fetched.len());
        for row in fetched {
            tagged.push((value::column_value(&row, relation.foreign_key)?, row));
        }

        for (entity, key) in rows.iter_mut().zip(keys) {
            let (matched, rest): (Vec<_>, Vec<_>) =
                tagged.into_iter().partition(|(fk, _)| *fk == key);
            tagged = rest;
            entity.attach_related(relation, matched.into_iter().map(|(_, row)| row).collect())?;
        }

        Ok(())
    }
}

// =============================================================================
// OrderedEntityQuery
// =============================================================================

/// An [`EntityQuery`] with an established primary sort.
///
/// Secondary sorts are only reachable from here, so a tie-break without a
/// primary sort does not typecheck.
#[derive(Debug, Clone)]
pub struct OrderedEntityQuery<T: Entity> {
    inner: EntityQuery<T>,
}

impl<T: Entity> OrderedEntityQuery<T> {
    /// Adds a secondary sort, ascending. Ties from the preceding sorts are
    /// broken in composition order.
    pub fn then_by(mut self, column: &str) -> Self {
        self.inner = self.inner.push_order(column, Direction::Asc);
        self
    }

    /// Adds a secondary sort, descending.
    pub fn then_by_desc(mut self, column: &str) -> Self {
        self.inner = self.inner.push_order(column, Direction::Desc);
        self
    }

    /// Adds a predicate to the ordered query.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.inner = self.inner.filter(filter);
        self
    }

    /// Adds an eager-load directive to the ordered query.
    pub fn include(mut self, relation: &str) -> Self {
        self.inner = self.inner.include(relation);
        self
    }

    /// Caps the number of rows materialized.
    pub fn limit(mut self, limit: i64) -> Self {
        self.inner = self.inner.limit(limit);
        self
    }

    /// Skips rows before materializing.
    pub fn offset(mut self, offset: i64) -> Self {
        self.inner = self.inner.offset(offset);
        self
    }

    /// Executes the query and materializes every matching row.
    pub async fn fetch_all(&self) -> DbResult<Vec<T>> {
        self.inner.fetch_all().await
    }

    /// Executes the query and materializes the first matching row, if any.
    pub async fn fetch_first(&self) -> DbResult<Option<T>> {
        self.inner.fetch_first().await
    }

    /// Counts the matching rows without materializing them.
    pub async fn count(&self) -> DbResult<i64> {
        self.inner.count().await
    }
}

fn push_where(sql: &mut String, binds: &mut Vec<Value>, filters: &[Filter]) {
    if filters.is_empty() {
        return;
    }

    sql.push_str(" WHERE ");
    for (i, filter) in filters.iter().enumerate() {
        if i > 0 {
            sql.push_str(" AND ");
        }
        match (&filter.value, filter.op.takes_value()) {
            (Some(bound), true) => {
                binds.push(bound.clone());
                sql.push_str(&format!("{} {} ?{}", filter.column, filter.op.sql(), binds.len()));
            }
            _ => {
                sql.push_str(&format!("{} {}", filter.column, filter.op.sql()));
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn where_clause_numbers_placeholders_in_order() {
        let mut sql = String::from("SELECT COUNT(*) FROM appointments");
        let mut binds = Vec::new();
        push_where(
            &mut sql,
            &mut binds,
            &[
                Filter::eq("status", "pending"),
                Filter::gt("id", 10_i64),
            ],
        );

        assert_eq!(
            sql,
            "SELECT COUNT(*) FROM appointments WHERE status = ?1 AND id > ?2"
        );
        assert_eq!(
            binds,
            vec![Value::Text("pending".to_string()), Value::Int(10)]
        );
    }

    #[test]
    fn null_checks_bind_nothing() {
        let mut sql = String::from("SELECT COUNT(*) FROM samples");
        let mut binds = Vec::new();
        push_where(&mut sql, &mut binds, &[Filter::is_null("kind")]);

        assert_eq!(sql, "SELECT COUNT(*) FROM samples WHERE kind IS NULL");
        assert!(binds.is_empty());
    }

    #[test]
    fn like_filters_keep_their_pattern() {
        let mut sql = String::from("SELECT COUNT(*) FROM appointments");
        let mut binds = Vec::new();
        push_where(&mut sql, &mut binds, &[Filter::like("patient_name", "Ng%")]);

        assert_eq!(
            sql,
            "SELECT COUNT(*) FROM appointments WHERE patient_name LIKE ?1"
        );
        assert_eq!(binds, vec![Value::Text("Ng%".to_string())]);
    }
}

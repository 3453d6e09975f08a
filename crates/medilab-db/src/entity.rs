//! # Entity Seam
//!
//! The repository is entity-agnostic: it works against any type that
//! describes its own table through the [`Entity`] trait. Implementations
//! live with the domain code, never in this crate.
//!
//! An entity declares:
//! - its table name, column list and identity column,
//! - the relations navigable from it (for eager loading),
//! - how to read its key and its column values.

use std::fmt;

use sqlx::sqlite::SqliteRow;
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::DbResult;
use crate::value::Value;

/// A relation navigable from an entity, usable as an eager-load target.
///
/// `local_key` is a column of the owning entity; related rows are the rows
/// of `related_table` whose `foreign_key` column equals it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relation {
    pub name: &'static str,
    pub related_table: &'static str,
    pub local_key: &'static str,
    pub foreign_key: &'static str,
}

/// An entity identity in one of the four recognized shapes.
///
/// Different entities key on different shapes (surrogate integer keys,
/// natural string codes, UUIDs); lookups accept all four without boxing
/// or conversion on the caller's side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    Int(i32),
    Long(i64),
    Code(String),
    Uuid(Uuid),
}

impl Key {
    /// The key as a bindable column value. UUIDs bind as canonical
    /// lowercase hyphenated TEXT.
    pub fn into_value(self) -> Value {
        match self {
            Key::Int(v) => Value::Int(i64::from(v)),
            Key::Long(v) => Value::Int(v),
            Key::Code(v) => Value::Text(v),
            Key::Uuid(v) => Value::Text(v.to_string()),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(v) => write!(f, "{v}"),
            Key::Long(v) => write!(f, "{v}"),
            Key::Code(v) => write!(f, "{v}"),
            Key::Uuid(v) => write!(f, "{v}"),
        }
    }
}

impl From<i32> for Key {
    fn from(v: i32) -> Self {
        Key::Int(v)
    }
}

impl From<i64> for Key {
    fn from(v: i64) -> Self {
        Key::Long(v)
    }
}

impl From<&str> for Key {
    fn from(v: &str) -> Self {
        Key::Code(v.to_owned())
    }
}

impl From<String> for Key {
    fn from(v: String) -> Self {
        Key::Code(v)
    }
}

impl From<Uuid> for Key {
    fn from(v: Uuid) -> Self {
        Key::Uuid(v)
    }
}

/// Table description an entity type provides to the generic repository.
///
/// ## Invariants
/// - `COLUMNS` lists every persisted column, including `ID_COLUMN`.
/// - `values()` returns one value per entry of `COLUMNS`, in the same
///   order.
/// - `key()` returns the value stored in `ID_COLUMN`.
///
/// ## Example
/// ```rust,ignore
/// #[derive(Clone, sqlx::FromRow)]
/// struct Appointment {
///     id: i64,
///     patient_name: String,
///     status: String,
/// }
///
/// impl Entity for Appointment {
///     const TABLE: &'static str = "appointments";
///     const COLUMNS: &'static [&'static str] = &["id", "patient_name", "status"];
///
///     fn key(&self) -> Key {
///         Key::Long(self.id)
///     }
///
///     fn values(&self) -> Vec<Value> {
///         vec![
///             self.id.into(),
///             self.patient_name.clone().into(),
///             self.status.clone().into(),
///         ]
///     }
/// }
/// ```
pub trait Entity:
    Clone + Send + Sync + Unpin + for<'r> FromRow<'r, SqliteRow> + 'static
{
    /// Table the entity persists to.
    const TABLE: &'static str;

    /// Every persisted column, in statement order.
    const COLUMNS: &'static [&'static str];

    /// The identity column. Must appear in [`Entity::COLUMNS`].
    const ID_COLUMN: &'static str = "id";

    /// Relations navigable from this entity.
    const RELATIONS: &'static [Relation] = &[];

    /// The entity's identity value.
    fn key(&self) -> Key;

    /// The entity's column values, aligned with [`Entity::COLUMNS`].
    fn values(&self) -> Vec<Value>;

    /// Hydrates an eager-loaded relation from its fetched rows.
    ///
    /// Called once per included relation during materialization with the
    /// related rows belonging to this entity. The default keeps the rows
    /// unmapped; entities with navigable collections override it.
    fn attach_related(&mut self, relation: &Relation, rows: Vec<SqliteRow>) -> DbResult<()> {
        let _ = (relation, rows);
        Ok(())
    }

    /// Whether `column` is declared by this entity.
    fn has_column(column: &str) -> bool {
        Self::COLUMNS.contains(&column)
    }

    /// Looks up a declared relation by name.
    fn relation(name: &str) -> Option<&'static Relation> {
        Self::RELATIONS.iter().find(|r| r.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_bind_by_shape() {
        assert_eq!(Key::Int(7).into_value(), Value::Int(7));
        assert_eq!(Key::Long(7).into_value(), Value::Int(7));
        assert_eq!(
            Key::Code("SMP-01".to_string()).into_value(),
            Value::Text("SMP-01".to_string())
        );

        let id = Uuid::new_v4();
        assert_eq!(Key::Uuid(id).into_value(), Value::Text(id.to_string()));
    }

    #[test]
    fn keys_display_their_raw_form() {
        assert_eq!(Key::Long(42).to_string(), "42");
        assert_eq!(Key::from("SMP-01").to_string(), "SMP-01");
    }
}

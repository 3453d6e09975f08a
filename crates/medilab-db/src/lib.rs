//! # medilab-db: Data Access Layer for MediLab
//!
//! This crate provides database access for the MediLab system: a generic,
//! entity-agnostic repository over SQLite via sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     MediLab Data Flow                           │
//! │                                                                 │
//! │  Application service (book_appointment, publish_result, ...)    │
//! │       │                                                         │
//! │       ▼                                                         │
//! │  ┌───────────────────────────────────────────────────────────┐  │
//! │  │                 medilab-db (THIS CRATE)                   │  │
//! │  │                                                           │  │
//! │  │  ┌──────────────┐   ┌────────────────┐   ┌─────────────┐  │  │
//! │  │  │   Session    │   │ EntityRepo<T>  │   │ EntityQuery │  │  │
//! │  │  │ (session.rs) │◄──│ (repository/)  │──►│ (query.rs)  │  │  │
//! │  │  │              │   │                │   │             │  │  │
//! │  │  │ SqlitePool   │   │ CRUD, staged   │   │ filter/sort │  │  │
//! │  │  │ + tracker    │   │ unit of work   │   │ lazy eval   │  │  │
//! │  │  └──────────────┘   └────────────────┘   └─────────────┘  │  │
//! │  └───────────────────────────────────────────────────────────┘  │
//! │       │                                                         │
//! │       ▼                                                         │
//! │  SQLite database                                                │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`session`] - Storage session: pool, config, staged-change tracker
//! - [`repository`] - Repository contract and its generic implementation
//! - [`query`] - Lazy composable queries (filter, order, eager load)
//! - [`entity`] - The [`Entity`] seam domain types implement
//! - [`value`] - Dynamically typed column values
//! - [`error`] - Error taxonomy
//!
//! ## Usage
//!
//! ```rust,ignore
//! use medilab_db::{DbConfig, Filter, Repository, Session};
//!
//! // One session per logical unit of work
//! let session = Session::new(DbConfig::new("medilab.db")).await?;
//!
//! let appointments = session.repository::<Appointment>();
//! let samples = session.repository::<Sample>();
//!
//! // Commit-per-call
//! appointments.create(&booked).await?;
//!
//! // Staged unit of work: both commit together, or neither does
//! appointments.prepare_update(&rescheduled);
//! samples.prepare_create(&drawn);
//! session.save().await?;
//!
//! // Lazy composable reads
//! let backlog = appointments
//!     .filter(Filter::eq("status", "pending"))
//!     .order_by("scheduled_at")
//!     .then_by("patient_name")
//!     .fetch_all()
//!     .await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod entity;
pub mod error;
pub mod query;
pub mod repository;
pub mod session;
pub mod value;

// =============================================================================
// Re-exports
// =============================================================================

pub use entity::{Entity, Key, Relation};
pub use error::{DbError, DbResult};
pub use query::{EntityQuery, Filter, Op, OrderedEntityQuery};
pub use repository::{EntityRepository, Repository};
pub use session::{DbConfig, Session};
pub use value::Value;

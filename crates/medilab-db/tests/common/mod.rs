//! Shared fixtures: an in-memory session plus the sample entities the
//! integration tests persist (appointments, lab results, samples).

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use medilab_db::{DbConfig, DbError, DbResult, Entity, Key, Relation, Session, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::FromRow;

/// A patient appointment, keyed by a 64-bit surrogate id, with a
/// one-to-many relation to lab results.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Appointment {
    pub id: i64,
    pub patient_name: String,
    pub department: String,
    pub scheduled_at: DateTime<Utc>,
    pub status: String,
    #[sqlx(skip)]
    pub results: Vec<LabResult>,
}

impl Entity for Appointment {
    const TABLE: &'static str = "appointments";
    const COLUMNS: &'static [&'static str] =
        &["id", "patient_name", "department", "scheduled_at", "status"];
    const RELATIONS: &'static [Relation] = &[Relation {
        name: "results",
        related_table: "results",
        local_key: "id",
        foreign_key: "appointment_id",
    }];

    fn key(&self) -> Key {
        Key::Long(self.id)
    }

    fn values(&self) -> Vec<Value> {
        vec![
            self.id.into(),
            self.patient_name.clone().into(),
            self.department.clone().into(),
            self.scheduled_at.into(),
            self.status.clone().into(),
        ]
    }

    fn attach_related(&mut self, relation: &Relation, rows: Vec<SqliteRow>) -> DbResult<()> {
        if relation.name == "results" {
            self.results = rows
                .iter()
                .map(LabResult::from_row)
                .collect::<Result<_, _>>()
                .map_err(DbError::from)?;
        }
        Ok(())
    }
}

/// A lab result row, keyed by a 32-bit id.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct LabResult {
    pub id: i32,
    pub appointment_id: i64,
    pub test_name: String,
    pub outcome: String,
}

impl Entity for LabResult {
    const TABLE: &'static str = "results";
    const COLUMNS: &'static [&'static str] = &["id", "appointment_id", "test_name", "outcome"];

    fn key(&self) -> Key {
        Key::Int(self.id)
    }

    fn values(&self) -> Vec<Value> {
        vec![
            self.id.into(),
            self.appointment_id.into(),
            self.test_name.clone().into(),
            self.outcome.clone().into(),
        ]
    }
}

/// A specimen, keyed by a natural string code (UUIDs in some tests).
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Sample {
    pub code: String,
    pub kind: String,
    pub taken_at: DateTime<Utc>,
}

impl Entity for Sample {
    const TABLE: &'static str = "samples";
    const COLUMNS: &'static [&'static str] = &["code", "kind", "taken_at"];
    const ID_COLUMN: &'static str = "code";

    fn key(&self) -> Key {
        Key::Code(self.code.clone())
    }

    fn values(&self) -> Vec<Value> {
        vec![
            self.code.clone().into(),
            self.kind.clone().into(),
            self.taken_at.into(),
        ]
    }
}

const SCHEMA: &[&str] = &[
    "CREATE TABLE appointments (
        id INTEGER PRIMARY KEY,
        patient_name TEXT NOT NULL,
        department TEXT NOT NULL,
        scheduled_at TEXT NOT NULL,
        status TEXT NOT NULL
    )",
    "CREATE TABLE results (
        id INTEGER PRIMARY KEY,
        appointment_id INTEGER NOT NULL REFERENCES appointments(id),
        test_name TEXT NOT NULL,
        outcome TEXT NOT NULL
    )",
    "CREATE TABLE samples (
        code TEXT PRIMARY KEY,
        kind TEXT NOT NULL,
        taken_at TEXT NOT NULL
    )",
];

/// Opens an isolated in-memory session with the test schema applied.
pub async fn session() -> Session {
    let session = Session::new(DbConfig::in_memory())
        .await
        .expect("open in-memory store");
    for ddl in SCHEMA {
        sqlx::query(ddl)
            .execute(session.pool())
            .await
            .expect("create test schema");
    }
    session
}

pub fn appointment(id: i64, patient_name: &str, department: &str, status: &str) -> Appointment {
    let base = Utc.with_ymd_and_hms(2026, 3, 10, 8, 0, 0).unwrap();
    Appointment {
        id,
        patient_name: patient_name.to_string(),
        department: department.to_string(),
        scheduled_at: base + Duration::minutes(id * 15),
        status: status.to_string(),
        results: Vec::new(),
    }
}

pub fn lab_result(id: i32, appointment_id: i64, test_name: &str, outcome: &str) -> LabResult {
    LabResult {
        id,
        appointment_id,
        test_name: test_name.to_string(),
        outcome: outcome.to_string(),
    }
}

pub fn sample(code: &str, kind: &str) -> Sample {
    Sample {
        code: code.to_string(),
        kind: kind.to_string(),
        taken_at: Utc.with_ymd_and_hms(2026, 3, 9, 14, 30, 0).unwrap(),
    }
}

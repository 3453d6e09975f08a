//! Lazy composable queries: filtering, ordering, bounds, eager loading,
//! and composition-error surfacing.

mod common;

use common::{appointment, lab_result, session};
use medilab_db::{DbError, Filter, Repository};

async fn seeded() -> medilab_db::Session {
    let session = session().await;
    let repo = session.repository::<common::Appointment>();
    repo.create(&appointment(1, "Anna", "cardiology", "pending"))
        .await
        .unwrap();
    repo.create(&appointment(2, "Ben", "hematology", "pending"))
        .await
        .unwrap();
    repo.create(&appointment(3, "Chloe", "cardiology", "confirmed"))
        .await
        .unwrap();
    repo.create(&appointment(4, "Aaron", "cardiology", "pending"))
        .await
        .unwrap();
    session
}

#[tokio::test]
async fn commuting_filters_compose_in_any_order() {
    let session = seeded().await;
    let repo = session.repository::<common::Appointment>();

    let one_way = repo
        .filter(Filter::eq("department", "cardiology"))
        .filter(Filter::eq("status", "pending"))
        .fetch_all()
        .await
        .unwrap();
    let other_way = repo
        .filter(Filter::eq("status", "pending"))
        .filter(Filter::eq("department", "cardiology"))
        .fetch_all()
        .await
        .unwrap();

    assert_eq!(one_way, other_way);
    let ids: Vec<i64> = one_way.iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![1, 4]);
}

#[tokio::test]
async fn order_by_then_by_breaks_ties_ascending() {
    let session = seeded().await;
    let repo = session.repository::<common::Appointment>();

    let sorted = repo
        .order_by("department")
        .then_by("patient_name")
        .fetch_all()
        .await
        .unwrap();

    let names: Vec<&str> = sorted.iter().map(|a| a.patient_name.as_str()).collect();
    assert_eq!(names, vec!["Aaron", "Anna", "Chloe", "Ben"]);
}

#[tokio::test]
async fn order_by_desc_reverses_the_primary_sort() {
    let session = seeded().await;
    let repo = session.repository::<common::Appointment>();

    let sorted = repo
        .order_by_desc("patient_name")
        .fetch_all()
        .await
        .unwrap();

    let names: Vec<&str> = sorted.iter().map(|a| a.patient_name.as_str()).collect();
    assert_eq!(names, vec!["Chloe", "Ben", "Anna", "Aaron"]);
}

#[tokio::test]
async fn ordered_queries_still_accept_filters() {
    let session = seeded().await;
    let repo = session.repository::<common::Appointment>();

    let sorted = repo
        .order_by("patient_name")
        .filter(Filter::eq("department", "cardiology"))
        .fetch_all()
        .await
        .unwrap();

    let names: Vec<&str> = sorted.iter().map(|a| a.patient_name.as_str()).collect();
    assert_eq!(names, vec!["Aaron", "Anna", "Chloe"]);
}

#[tokio::test]
async fn like_filters_match_prefixes() {
    let session = seeded().await;
    let repo = session.repository::<common::Appointment>();

    let matched = repo
        .filter(Filter::like("patient_name", "A%"))
        .fetch_all()
        .await
        .unwrap();

    assert_eq!(matched.len(), 2);
    assert!(matched.iter().all(|a| a.patient_name.starts_with('A')));
}

#[tokio::test]
async fn limit_offset_and_fetch_first_bound_the_result() {
    let session = seeded().await;
    let repo = session.repository::<common::Appointment>();

    let page = repo
        .order_by("id")
        .limit(2)
        .offset(1)
        .fetch_all()
        .await
        .unwrap();
    let ids: Vec<i64> = page.iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![2, 3]);

    let first = repo.order_by("patient_name").fetch_first().await.unwrap();
    assert_eq!(first.unwrap().patient_name, "Aaron");

    let none = repo
        .filter(Filter::eq("status", "cancelled"))
        .fetch_first()
        .await
        .unwrap();
    assert!(none.is_none());
}

#[tokio::test]
async fn count_respects_filters() {
    let session = seeded().await;
    let repo = session.repository::<common::Appointment>();

    let pending = repo
        .filter(Filter::eq("status", "pending"))
        .count()
        .await
        .unwrap();
    assert_eq!(pending, 3);
}

#[tokio::test]
async fn queries_are_lazy_and_reenterable() {
    let session = seeded().await;
    let repo = session.repository::<common::Appointment>();

    // One descriptor, materialized twice: each terminal call runs a fresh
    // statement, so the second sees rows inserted in between.
    let pending = repo.filter(Filter::eq("status", "pending"));
    assert_eq!(pending.fetch_all().await.unwrap().len(), 3);

    repo.create(&appointment(5, "Dana", "hematology", "pending"))
        .await
        .unwrap();
    assert_eq!(pending.fetch_all().await.unwrap().len(), 4);
}

#[tokio::test]
async fn unknown_column_surfaces_at_materialization() {
    let session = seeded().await;
    let repo = session.repository::<common::Appointment>();

    // Composition stays chainable; the defect is reported by the terminal.
    let broken = repo.filter(Filter::eq("no_such_column", 1_i64));
    let err = broken.fetch_all().await.unwrap_err();
    assert!(matches!(err, DbError::UnknownColumn { .. }));

    let err = broken.count().await.unwrap_err();
    assert!(matches!(err, DbError::UnknownColumn { .. }));

    let err = repo.order_by("nope").fetch_all().await.unwrap_err();
    assert!(matches!(err, DbError::UnknownColumn { .. }));
}

#[tokio::test]
async fn unknown_relation_surfaces_at_materialization() {
    let session = seeded().await;
    let repo = session.repository::<common::Appointment>();

    let err = repo.include("prescriptions").fetch_all().await.unwrap_err();
    assert!(matches!(err, DbError::UnknownRelation { .. }));
}

#[tokio::test]
async fn include_hydrates_each_entity_with_its_own_rows() {
    let session = seeded().await;
    let results = session.repository::<common::LabResult>();
    results
        .create(&lab_result(1, 1, "glucose", "normal"))
        .await
        .unwrap();
    results
        .create(&lab_result(2, 1, "cbc", "flagged"))
        .await
        .unwrap();
    results
        .create(&lab_result(3, 2, "glucose", "normal"))
        .await
        .unwrap();

    let repo = session.repository::<common::Appointment>();
    let loaded = repo
        .include("results")
        .order_by("id")
        .fetch_all()
        .await
        .unwrap();

    assert_eq!(
        loaded[0].results,
        vec![
            lab_result(1, 1, "glucose", "normal"),
            lab_result(2, 1, "cbc", "flagged"),
        ]
    );
    assert_eq!(loaded[1].results, vec![lab_result(3, 2, "glucose", "normal")]);
    assert!(loaded[2].results.is_empty());
    assert!(loaded[3].results.is_empty());
}

#[tokio::test]
async fn include_composes_with_filters_and_first() {
    let session = seeded().await;
    let results = session.repository::<common::LabResult>();
    results
        .create(&lab_result(1, 2, "ferritin", "low"))
        .await
        .unwrap();

    let repo = session.repository::<common::Appointment>();
    let loaded = repo
        .include("results")
        .filter(Filter::eq("department", "hematology"))
        .fetch_first()
        .await
        .unwrap()
        .unwrap();

    assert_eq!(loaded.id, 2);
    assert_eq!(loaded.results, vec![lab_result(1, 2, "ferritin", "low")]);
}

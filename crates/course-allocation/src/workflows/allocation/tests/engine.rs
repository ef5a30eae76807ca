use std::sync::Arc;

use super::common::*;

use crate::workflows::allocation::domain::{
    CourseId, FacultyId, PreferenceSetId, PreferenceSetStatus, TermId,
};
use crate::workflows::allocation::repository::{EscalationEvent, PreferenceSetRepository};
use crate::workflows::allocation::{
    AllocationEngine, AllocationError, AllocationPolicy, FacultyAssignment,
};

fn fall() -> TermId {
    TermId::new(TERM)
}

fn entry<'a>(results: &'a [FacultyAssignment], faculty_id: &str) -> &'a FacultyAssignment {
    results
        .iter()
        .find(|result| result.faculty_id.as_str() == faculty_id)
        .expect("faculty present in results")
}

fn assigned_ids(result: &FacultyAssignment) -> Vec<&str> {
    result
        .assigned_courses
        .iter()
        .map(|course| course.course_id.as_str())
        .collect()
}

#[test]
fn more_senior_faculty_wins_shared_first_choice() {
    let (engine, catalog, sets, escalations) = build_engine(department());
    sets.closed("pset-1", "fac-f", &["c1"]);
    sets.closed("pset-2", "fac-g", &["c1"]);

    let results = engine.run(&fall()).expect("run succeeds");

    assert_eq!(results.len(), 2);
    assert_eq!(assigned_ids(entry(&results, "fac-f")), vec!["c1"]);
    assert!(entry(&results, "fac-g").assigned_courses.is_empty());
    assert!(entry(&results, "fac-g").unassigned_course_ids.is_empty());
    assert!(catalog.roster("c1").contains(&FacultyId::new("fac-f")));
    assert!(escalations.events().is_empty());
}

#[test]
fn higher_rating_breaks_seniority_tie() {
    let catalog = MemoryCatalog::with(
        vec![faculty("fac-a", 2, 3.0, 20), faculty("fac-b", 2, 4.5, 20)],
        vec![course("c1", 3)],
    );
    let (engine, _, sets, _) = build_engine(catalog);
    sets.closed("pset-1", "fac-a", &["c1"]);
    sets.closed("pset-2", "fac-b", &["c1"]);

    let results = engine.run(&fall()).expect("run succeeds");

    assert_eq!(assigned_ids(entry(&results, "fac-b")), vec!["c1"]);
    assert!(entry(&results, "fac-a").assigned_courses.is_empty());
}

#[test]
fn larger_remaining_capacity_breaks_rating_tie() {
    let catalog = MemoryCatalog::with(
        vec![faculty("fac-a", 1, 4.0, 10), faculty("fac-b", 1, 4.0, 20)],
        vec![course("c1", 3)],
    );
    let (engine, _, sets, _) = build_engine(catalog);
    sets.closed("pset-1", "fac-a", &["c1"]);
    sets.closed("pset-2", "fac-b", &["c1"]);

    let results = engine.run(&fall()).expect("run succeeds");

    assert_eq!(assigned_ids(entry(&results, "fac-b")), vec!["c1"]);
}

#[test]
fn unplaceable_course_escalates_once_per_candidate() {
    let catalog = MemoryCatalog::with(
        vec![faculty("fac-f", 1, 5.0, 20), faculty("fac-g", 2, 5.0, 20)],
        vec![course("c1", 30), course("c2", 3)],
    );
    let (engine, catalog, sets, escalations) = build_engine(catalog);
    sets.closed("pset-1", "fac-f", &["c1", "c2"]);
    sets.closed("pset-2", "fac-g", &["c2", "c1"]);

    let results = engine.run(&fall()).expect("run succeeds");

    let events = escalations.events();
    assert_eq!(events.len(), 2);
    assert!(events.contains(&EscalationEvent {
        faculty_id: FacultyId::new("fac-f"),
        course_id: CourseId::new("c1"),
        term_id: fall(),
        preference_rank: 1,
    }));
    assert!(events.contains(&EscalationEvent {
        faculty_id: FacultyId::new("fac-g"),
        course_id: CourseId::new("c1"),
        term_id: fall(),
        preference_rank: 2,
    }));

    for result in &results {
        assert_eq!(result.unassigned_course_ids, vec![CourseId::new("c1")]);
    }
    assert_eq!(assigned_ids(entry(&results, "fac-f")), vec!["c2"]);
    assert!(catalog.roster("c1").is_empty());
}

#[test]
fn course_limit_caps_each_faculty_at_two() {
    let (engine, catalog, sets, escalations) = build_engine(department());
    sets.closed("pset-1", "fac-f", &["c1", "c2", "c3"]);

    let results = engine.run(&fall()).expect("run succeeds");

    let only = entry(&results, "fac-f");
    assert_eq!(only.assigned_courses.len(), 2);
    assert_eq!(only.unassigned_course_ids, vec![CourseId::new("c3")]);
    assert_eq!(catalog.courses_of("fac-f").len(), 2);

    let events = escalations.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].preference_rank, 3);
}

#[test]
fn first_choices_are_resolved_before_second_choices() {
    let catalog = MemoryCatalog::with(
        vec![faculty("fac-f", 1, 5.0, 3), faculty("fac-g", 2, 5.0, 20)],
        vec![course("c1", 3), course("c2", 3), course("c3", 3)],
    );
    let (engine, _, sets, _) = build_engine(catalog);
    sets.closed("pset-1", "fac-f", &["c2", "c1"]);
    sets.closed("pset-2", "fac-g", &["c3", "c1"]);

    let results = engine.run(&fall()).expect("run succeeds");

    assert_eq!(assigned_ids(entry(&results, "fac-f")), vec!["c2"]);
    assert_eq!(assigned_ids(entry(&results, "fac-g")), vec!["c3", "c1"]);
    assert!(entry(&results, "fac-f").unassigned_course_ids.is_empty());
}

#[test]
fn run_requires_closed_sets_and_known_term() {
    let (engine, catalog, sets, _) = build_engine(department());

    let empty = engine.run(&fall()).expect_err("no closed sets");
    assert!(matches!(empty, AllocationError::InvalidInput(_)));

    sets.closed("pset-1", "fac-f", &["c1"]);
    let mut open = sets.stored(&PreferenceSetId::new("pset-1"));
    open.status = PreferenceSetStatus::Open;
    sets.update(open).expect("reopen");
    let still_empty = engine.run(&fall()).expect_err("open sets are ignored");
    assert!(matches!(still_empty, AllocationError::InvalidInput(_)));
    assert!(catalog.roster("c1").is_empty());

    let unknown = engine
        .run(&TermId::new("term-x"))
        .expect_err("unknown term");
    assert!(matches!(unknown, AllocationError::NotFound { .. }));
}

#[test]
fn rerun_does_not_duplicate_existing_rosters() {
    let (engine, catalog, sets, escalations) = build_engine(department());
    sets.closed("pset-1", "fac-f", &["c1"]);

    engine.run(&fall()).expect("first run");
    let second = engine.run(&fall()).expect("second run");

    assert_eq!(catalog.roster("c1").len(), 1);
    assert!(catalog.roster("c1").contains(&FacultyId::new("fac-f")));
    assert!(entry(&second, "fac-f").assigned_courses.is_empty());
    assert_eq!(escalations.events().len(), 1);
}

#[test]
fn concurrent_runs_for_one_term_are_serialized() {
    let (engine, catalog, sets, escalations) = build_engine(department());
    sets.closed("pset-1", "fac-f", &["c1"]);
    sets.closed("pset-2", "fac-g", &["c2"]);
    let term = fall();

    let outcomes: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4).map(|_| scope.spawn(|| engine.run(&term))).collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("run thread"))
            .collect()
    });

    assert!(outcomes.iter().all(Result::is_ok));
    assert_eq!(
        catalog.roster("c1").into_iter().collect::<Vec<_>>(),
        vec![FacultyId::new("fac-f")]
    );
    assert_eq!(
        catalog.roster("c2").into_iter().collect::<Vec<_>>(),
        vec![FacultyId::new("fac-g")]
    );
    // One run assigns both courses; each later run finds them taught and escalates both.
    assert_eq!(escalations.events().len(), 3 * 2);
}

#[test]
fn pass_limits_count_only_assignments_made_in_that_pass() {
    let (engine, catalog, sets, _) = build_engine(department());
    engine
        .update_faculty_assignments(&FacultyId::new("fac-f"), &course_ids(&["c1", "c2"]))
        .expect("override applied");
    sets.closed("pset-1", "fac-f", &["c3"]);

    let results = engine.run(&fall()).expect("run succeeds");

    assert_eq!(assigned_ids(entry(&results, "fac-f")), vec!["c3"]);
    assert_eq!(catalog.courses_of("fac-f").len(), 3);
}

#[test]
fn publish_failure_fails_run_after_committing_other_courses() {
    let catalog = Arc::new(MemoryCatalog::with(
        vec![faculty("fac-f", 1, 5.0, 20), faculty("fac-g", 2, 5.0, 20)],
        vec![course("c1", 30), course("c2", 3)],
    ));
    let sets = Arc::new(MemorySets::default());
    sets.closed("pset-1", "fac-f", &["c1", "c2"]);
    sets.closed("pset-2", "fac-g", &["c1"]);
    let engine = AllocationEngine::new(
        catalog.clone(),
        sets,
        Arc::new(OfflineEscalations),
        AllocationPolicy::default(),
    );

    let err = engine.run(&fall()).expect_err("publish failure surfaces");

    match err {
        AllocationError::Escalation { failed, .. } => assert_eq!(failed, 2),
        other => panic!("unexpected error: {other}"),
    }
    assert!(catalog.roster("c2").contains(&FacultyId::new("fac-f")));
}

#[test]
fn queries_report_unassigned_and_per_faculty_courses() {
    let catalog = MemoryCatalog::with(
        vec![faculty("fac-f", 1, 5.0, 20), faculty("fac-g", 2, 5.0, 20)],
        vec![course("c1", 30), course("c2", 3)],
    );
    let (engine, _, sets, _) = build_engine(catalog);
    sets.closed("pset-1", "fac-f", &["c1", "c2"]);
    engine.run(&fall()).expect("run succeeds");

    let unassigned = engine.unassigned_courses(&fall()).expect("query");
    assert_eq!(
        unassigned
            .iter()
            .map(|course| course.id.as_str())
            .collect::<Vec<_>>(),
        vec!["c1"]
    );

    let teaching = engine
        .faculty_assignments(&FacultyId::new("fac-f"), &fall())
        .expect("query");
    assert_eq!(teaching.len(), 1);
    assert_eq!(teaching[0].id, CourseId::new("c2"));

    let without_set = engine
        .faculty_assignments(&FacultyId::new("fac-g"), &fall())
        .expect("query");
    assert!(without_set.is_empty());
}

use std::cmp::Ordering;

use super::candidates::Candidate;
use super::pass::AllocationPass;
use crate::workflows::allocation::domain::Course;
use crate::workflows::allocation::workload::AllocationPolicy;

/// Candidates that can still take `course` in this pass.
pub(crate) fn eligible<'a>(
    course: &Course,
    candidates: &'a [Candidate],
    pass: &AllocationPass,
    policy: &AllocationPolicy,
) -> Vec<&'a Candidate> {
    candidates
        .iter()
        .filter(|candidate| {
            let faculty = &candidate.faculty;
            pass.workload(&faculty.id)
                .admits(faculty, course.hours_required_per_week, policy)
                .is_ok()
                && !course.is_taught_by(&faculty.id)
        })
        .collect()
}

/// Seniority, then rating, then remaining weekly hours, then preference rank.
pub(crate) fn compare(a: &Candidate, b: &Candidate, pass: &AllocationPass) -> Ordering {
    a.faculty
        .seniority_score
        .cmp(&b.faculty.seniority_score)
        .then_with(|| b.faculty.rating.total_cmp(&a.faculty.rating))
        .then_with(|| {
            let remaining_a = pass.workload(&a.faculty.id).remaining_hours(&a.faculty);
            let remaining_b = pass.workload(&b.faculty.id).remaining_hours(&b.faculty);
            remaining_b.cmp(&remaining_a)
        })
        .then_with(|| a.preference_rank.cmp(&b.preference_rank))
}

/// Best eligible candidate, or `None` when the course must be escalated.
/// Candidates equal on every key resolve to the earliest in `candidates`.
pub(crate) fn select<'a>(
    course: &Course,
    candidates: &'a [Candidate],
    pass: &AllocationPass,
    policy: &AllocationPolicy,
) -> Option<&'a Candidate> {
    eligible(course, candidates, pass, policy)
        .into_iter()
        .min_by(|a, b| compare(a, b, pass))
}

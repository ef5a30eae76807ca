use std::collections::BTreeSet;

use super::domain::{CourseId, RankedPreference};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RankingViolation {
    #[error("course {0} is ranked more than once")]
    DuplicateCourse(CourseId),
    #[error("course {0} is not a candidate of this preference set")]
    NotACandidate(CourseId),
}

/// Turns an ordered course list into ranks 1..=k, rejecting duplicates and non-candidates.
pub fn rank_courses(
    ranked: &[CourseId],
    candidates: &[CourseId],
) -> Result<Vec<RankedPreference>, RankingViolation> {
    let mut seen = BTreeSet::new();
    for course_id in ranked {
        if !seen.insert(course_id) {
            return Err(RankingViolation::DuplicateCourse(course_id.clone()));
        }
    }

    if let Some(outside) = ranked.iter().find(|id| !candidates.contains(id)) {
        return Err(RankingViolation::NotACandidate(outside.clone()));
    }

    Ok(ranked
        .iter()
        .zip(1u32..)
        .map(|(course_id, rank)| RankedPreference {
            course_id: course_id.clone(),
            rank,
        })
        .collect())
}

/// True when ranks run 1..=k in list order.
pub(crate) fn ranks_are_contiguous(preferences: &[RankedPreference]) -> bool {
    preferences
        .iter()
        .zip(1u32..)
        .all(|(preference, expected)| preference.rank == expected)
}

/// Removes repeated ids while keeping first-seen order.
pub fn distinct(ids: &[CourseId]) -> Vec<CourseId> {
    let mut seen = BTreeSet::new();
    ids.iter()
        .filter(|id| seen.insert(*id))
        .cloned()
        .collect()
}

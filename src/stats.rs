use crate::model::{ProjectRecord, ProjectStatus};
use serde::Serialize;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct SummaryStatistics {
    pub total: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub pending: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub average_score: i64,
}

/// Statistics over the whole working set, regardless of any filter.
pub fn statistics(projects: &[ProjectRecord]) -> SummaryStatistics {
    let count = |status: ProjectStatus| projects.iter().filter(|p| p.status == status).count();
    SummaryStatistics {
        total: projects.len(),
        completed: count(ProjectStatus::Completed),
        in_progress: count(ProjectStatus::InProgress),
        pending: count(ProjectStatus::Pending),
        failed: count(ProjectStatus::Failed),
        cancelled: count(ProjectStatus::Cancelled),
        average_score: average_score(projects),
    }
}

/// Mean score rounded half-up (ties go toward positive infinity, so
/// `82.5` gives `83` and `-1.5` gives `-1`). An empty set averages to `0`.
pub fn average_score(projects: &[ProjectRecord]) -> i64 {
    if projects.is_empty() {
        return 0;
    }
    let sum: i64 = projects.iter().map(|p| i64::from(p.score)).sum();
    #[allow(clippy::cast_possible_wrap)]
    let count = projects.len() as i64;
    // floor((sum + count/2) / count), computed exactly as floor((2*sum + count) / (2*count)).
    (2 * sum + count).div_euclid(2 * count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::record;

    fn scored(scores: &[i32]) -> Vec<ProjectRecord> {
        scores
            .iter()
            .zip(1..)
            .map(|(&s, id)| record(id, "Student", "Project", ProjectStatus::Pending, s))
            .collect()
    }

    #[test]
    fn two_project_scenario() {
        let projects = vec![
            record(1, "A", "P1", ProjectStatus::Pending, 80),
            record(2, "B", "P2", ProjectStatus::Completed, 100),
        ];
        assert_eq!(
            statistics(&projects),
            SummaryStatistics {
                total: 2,
                completed: 1,
                in_progress: 0,
                pending: 1,
                failed: 0,
                cancelled: 0,
                average_score: 90,
            }
        );
    }

    #[test]
    fn empty_set_averages_to_zero() {
        assert_eq!(statistics(&[]), SummaryStatistics::default());
    }

    #[test]
    fn rounding_is_half_up() {
        assert_eq!(average_score(&scored(&[80, 85])), 83);
        assert_eq!(average_score(&scored(&[80, 84])), 82);
        assert_eq!(average_score(&scored(&[1, 1, 2])), 1);
        assert_eq!(average_score(&scored(&[1, 2, 2])), 2);
        assert_eq!(average_score(&scored(&[-1, -2])), -1);
        assert_eq!(average_score(&scored(&[-1, -3])), -2);
    }

    #[test]
    fn out_of_range_scores_are_averaged_raw() {
        assert_eq!(average_score(&scored(&[150, -50])), 50);
    }

    #[test]
    fn every_status_is_counted_in_total() {
        let projects = vec![
            record(1, "A", "P", ProjectStatus::Failed, 0),
            record(2, "B", "P", ProjectStatus::Cancelled, 0),
            record(3, "C", "P", ProjectStatus::InProgress, 0),
        ];
        let stats = statistics(&projects);
        assert_eq!(stats.total, 3);
        assert_eq!((stats.failed, stats.cancelled, stats.in_progress), (1, 1, 1));
        assert_eq!(stats.completed + stats.pending, 0);
    }
}

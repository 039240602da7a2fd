use crate::model::ProjectRecord;
use eyre::{Error, bail};
use std::collections::HashSet;
use tracing::warn;

pub fn ensure_unique_ids(projects: &[ProjectRecord]) -> Result<(), Error> {
    let mut seen = HashSet::new();
    if let Some(duplicate) = projects.iter().find(|p| !seen.insert(p.id)) {
        bail!("project {} appears more than once", duplicate.id);
    }
    Ok(())
}

/// Scores are displayed as percentages; anything outside `0..=100` gets clamped.
pub fn warn_out_of_range_scores(projects: &[ProjectRecord]) -> usize {
    let mut count = 0;
    for p in projects.iter().filter(|p| !(0..=100).contains(&p.score)) {
        warn!(project = %p, score = p.score, "score outside of 0..=100, display will be clamped");
        count += 1;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ProjectStatus, record};

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut projects = vec![
            record(1, "A", "P1", ProjectStatus::Pending, 10),
            record(2, "B", "P2", ProjectStatus::Pending, 20),
        ];
        assert!(ensure_unique_ids(&projects).is_ok());
        projects.push(record(1, "C", "P3", ProjectStatus::Completed, 30));
        let err = ensure_unique_ids(&projects).unwrap_err();
        assert_eq!(err.to_string(), "project #1 appears more than once");
    }

    #[test]
    fn out_of_range_scores_are_counted() {
        let projects = vec![
            record(1, "A", "P1", ProjectStatus::Pending, -1),
            record(2, "B", "P2", ProjectStatus::Pending, 100),
            record(3, "C", "P3", ProjectStatus::Pending, 101),
        ];
        assert_eq!(warn_out_of_range_scores(&projects), 2);
    }
}

use super::{ProjectId, ProjectRecord, ProjectStatus};
use crate::analysis::{AnalysisError, AnalysisReport, Analyzer};
use crate::stats::{self, SummaryStatistics};
use eyre::{Error, bail};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

/// Status filters offered by the dashboard. `failed` and `cancelled`
/// projects only ever show up under `All`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusFilter {
    #[default]
    All,
    Pending,
    InProgress,
    Completed,
}

impl StatusFilter {
    pub fn accepts(self, status: ProjectStatus) -> bool {
        match self {
            Self::All => true,
            Self::Pending => status == ProjectStatus::Pending,
            Self::InProgress => status == ProjectStatus::InProgress,
            Self::Completed => status == ProjectStatus::Completed,
        }
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::All => "all",
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
        })
    }
}

impl FromStr for StatusFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "all" => Self::All,
            "pending" => Self::Pending,
            "in-progress" => Self::InProgress,
            "completed" => Self::Completed,
            other => bail!(
                "unknown status filter: {other} (expected all, pending, in-progress or completed)"
            ),
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DashboardState {
    pub projects: Vec<ProjectRecord>,
    pub search_term: String,
    pub status_filter: StatusFilter,
    pub selected_project_id: Option<ProjectId>,
    pub analysis_in_flight: bool,
}

impl DashboardState {
    pub fn new(projects: Vec<ProjectRecord>) -> DashboardState {
        DashboardState {
            projects,
            ..DashboardState::default()
        }
    }

    pub fn project(&self, id: ProjectId) -> Option<&ProjectRecord> {
        self.projects.iter().find(|p| p.id == id)
    }

    /// Projects matching both the status filter and the search term, in
    /// working set order.
    pub fn filtered_projects(&self) -> impl Iterator<Item = &ProjectRecord> {
        let needle = self.search_term.to_lowercase();
        self.projects
            .iter()
            .filter(move |p| self.status_filter.accepts(p.status) && p.matches_search(&needle))
    }

    /// The selected project, or `None` when nothing is selected or the
    /// selection does not designate an existing project.
    pub fn selected_project(&self) -> Option<&ProjectRecord> {
        self.selected_project_id.and_then(|id| self.project(id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisOutcome {
    Completed(AnalysisReport),
    /// Another analysis was already in flight; nothing happened.
    Skipped,
}

/// Shared handle on the review dashboard. Clones observe and mutate the
/// same state. Every mutation bumps the revision published by
/// [`Dashboard::subscribe`].
pub struct Dashboard<A> {
    state: Arc<Mutex<DashboardState>>,
    analyzer: Arc<A>,
    timeout: Duration,
    revision: Arc<watch::Sender<u64>>,
}

impl<A> Clone for Dashboard<A> {
    fn clone(&self) -> Self {
        Dashboard {
            state: Arc::clone(&self.state),
            analyzer: Arc::clone(&self.analyzer),
            timeout: self.timeout,
            revision: Arc::clone(&self.revision),
        }
    }
}

impl<A> Dashboard<A> {
    fn state(&self) -> MutexGuard<'_, DashboardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn changed(&self) {
        self.revision.send_modify(|r| *r += 1);
    }
}

/// Clears the analysis flag when dropped, including when the analysis
/// future itself is dropped before completion.
struct InFlight<'a, A>(&'a Dashboard<A>);

impl<A> Drop for InFlight<'_, A> {
    fn drop(&mut self) {
        self.0.state().analysis_in_flight = false;
        self.0.changed();
    }
}

impl<A: Analyzer> Dashboard<A> {
    pub fn new(projects: Vec<ProjectRecord>, analyzer: A, timeout: Duration) -> Dashboard<A> {
        let (revision, _) = watch::channel(0);
        Dashboard {
            state: Arc::new(Mutex::new(DashboardState::new(projects))),
            analyzer: Arc::new(analyzer),
            timeout,
            revision: Arc::new(revision),
        }
    }

    #[allow(dead_code)]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn snapshot(&self) -> DashboardState {
        self.state().clone()
    }

    pub fn set_search_term(&self, term: impl Into<String>) {
        self.state().search_term = term.into();
        self.changed();
    }

    pub fn set_status_filter(&self, filter: StatusFilter) {
        self.state().status_filter = filter;
        self.changed();
    }

    pub fn select_project(&self, id: Option<ProjectId>) {
        self.state().selected_project_id = id;
        self.changed();
    }

    pub fn filtered_projects(&self) -> Vec<ProjectRecord> {
        self.state().filtered_projects().cloned().collect()
    }

    pub fn summary_statistics(&self) -> SummaryStatistics {
        stats::statistics(&self.state().projects)
    }

    pub fn selected_project(&self) -> Option<ProjectRecord> {
        self.state().selected_project().cloned()
    }

    /// Run the analysis collaborator on a project and mark it `completed`
    /// on success. Only one analysis runs at a time for the whole
    /// dashboard: a call made while another one is pending returns
    /// [`AnalysisOutcome::Skipped`] without touching anything.
    #[instrument(skip(self))]
    pub async fn analyze_project(&self, id: ProjectId) -> Result<AnalysisOutcome, AnalysisError> {
        let project = {
            let mut state = self.state();
            if state.analysis_in_flight {
                debug!("an analysis is already in flight");
                return Ok(AnalysisOutcome::Skipped);
            }
            let project = state
                .project(id)
                .cloned()
                .ok_or(AnalysisError::UnknownProject(id))?;
            state.analysis_in_flight = true;
            project
        };
        let in_flight = InFlight(self);
        self.changed();
        let result = tokio::time::timeout(self.timeout, self.analyzer.analyze(&project))
            .await
            .unwrap_or(Err(AnalysisError::TimedOut(self.timeout)));
        if result.is_ok() {
            if let Some(p) = self.state().projects.iter_mut().find(|p| p.id == id) {
                p.status = ProjectStatus::Completed;
            }
        }
        drop(in_flight);
        match result {
            Ok(report) => {
                info!(project = %project, score = report.total_score, "analysis completed");
                Ok(AnalysisOutcome::Completed(report))
            }
            Err(e) => {
                warn!(project = %project, error = %e, "analysis failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::SimulatedAnalyzer;
    use crate::model::record;

    const DELAY: Duration = Duration::from_secs(2);
    const TIMEOUT: Duration = Duration::from_secs(30);

    fn projects() -> Vec<ProjectRecord> {
        vec![
            record(1, "James Muganzi Imoli", "Weather App", ProjectStatus::Pending, 80),
            record(2, "Omollo Victor", "Chat Server", ProjectStatus::Completed, 100),
            record(3, "Amina Otieno", "Jam Session Planner", ProjectStatus::InProgress, 65),
            record(4, "Brian Kamau", "Budget Tracker", ProjectStatus::Failed, 40),
            record(5, "Grace Wanjiru", "Portfolio", ProjectStatus::Cancelled, 0),
        ]
    }

    fn dashboard() -> Dashboard<SimulatedAnalyzer> {
        Dashboard::new(projects(), SimulatedAnalyzer::new(DELAY, 0.0), TIMEOUT)
    }

    fn ids(projects: &[ProjectRecord]) -> Vec<i64> {
        projects.iter().map(|p| p.id.0).collect()
    }

    struct Stalled;

    impl Analyzer for Stalled {
        async fn analyze(&self, _: &ProjectRecord) -> Result<AnalysisReport, AnalysisError> {
            std::future::pending().await
        }
    }

    #[test]
    fn filtering_keeps_order_and_matches_both_predicates() {
        let d = dashboard();
        let all = projects();
        for term in ["", "o", "JAM", "app", "zzz"] {
            for filter in [
                StatusFilter::All,
                StatusFilter::Pending,
                StatusFilter::InProgress,
                StatusFilter::Completed,
            ] {
                d.set_search_term(term);
                d.set_status_filter(filter);
                let needle = term.to_lowercase();
                let expected = all
                    .iter()
                    .filter(|p| {
                        filter.accepts(p.status)
                            && (p.student_name.to_lowercase().contains(&needle)
                                || p.project_title.to_lowercase().contains(&needle))
                    })
                    .cloned()
                    .collect::<Vec<_>>();
                let filtered = d.filtered_projects();
                assert_eq!(filtered, expected, "term {term:?}, filter {filter}");
                assert!(filtered.windows(2).all(|w| w[0].id < w[1].id));
                assert_eq!(d.filtered_projects(), filtered);
            }
        }
    }

    #[test]
    fn search_is_case_insensitive() {
        let d = Dashboard::new(
            vec![
                record(1, "James Muganzi Imoli", "Weather App", ProjectStatus::Pending, 80),
                record(2, "Omollo Victor", "Chat Server", ProjectStatus::Pending, 90),
            ],
            SimulatedAnalyzer::new(DELAY, 0.0),
            TIMEOUT,
        );
        d.set_search_term("jam");
        assert_eq!(ids(&d.filtered_projects()), vec![1]);
        d.set_search_term("JAM");
        assert_eq!(ids(&d.filtered_projects()), vec![1]);
    }

    #[test]
    fn search_matches_titles_too() {
        let d = dashboard();
        d.set_search_term("jam");
        assert_eq!(ids(&d.filtered_projects()), vec![1, 3]);
    }

    #[test]
    fn completed_filter_excludes_every_other_status() {
        let d = dashboard();
        d.set_status_filter(StatusFilter::Completed);
        assert_eq!(ids(&d.filtered_projects()), vec![2]);
        d.set_status_filter(StatusFilter::All);
        assert_eq!(ids(&d.filtered_projects()), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn statistics_ignore_filters() {
        let d = dashboard();
        d.set_status_filter(StatusFilter::Completed);
        d.set_search_term("nobody");
        let stats = d.summary_statistics();
        assert_eq!(stats.total, 5);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.in_progress, 1);
        assert_eq!(stats.pending, 1);
        // (80 + 100 + 65 + 40 + 0) / 5 = 57
        assert_eq!(stats.average_score, 57);
    }

    #[test]
    fn unknown_selection_shows_nothing() {
        let d = dashboard();
        assert_eq!(d.selected_project(), None);
        d.select_project(Some(ProjectId(3)));
        assert_eq!(d.selected_project().map(|p| p.id), Some(ProjectId(3)));
        d.select_project(Some(ProjectId(99)));
        assert_eq!(d.snapshot().selected_project_id, Some(ProjectId(99)));
        assert_eq!(d.selected_project(), None);
        d.select_project(None);
        assert_eq!(d.selected_project(), None);
    }

    #[test]
    fn status_filter_parsing() {
        assert_eq!(
            "in-progress".parse::<StatusFilter>().unwrap(),
            StatusFilter::InProgress
        );
        assert_eq!("all".parse::<StatusFilter>().unwrap(), StatusFilter::All);
        assert!("failed".parse::<StatusFilter>().is_err());
        assert!("cancelled".parse::<StatusFilter>().is_err());
    }

    #[test]
    fn mutations_are_published() {
        let d = dashboard();
        let mut rx = d.subscribe();
        assert!(!rx.has_changed().unwrap());
        d.set_search_term("omollo");
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), 1);
        d.select_project(Some(ProjectId(2)));
        d.set_status_filter(StatusFilter::Pending);
        assert_eq!(*rx.borrow_and_update(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn successful_analysis_completes_only_that_project() {
        let d = dashboard();
        let before = d.snapshot();
        let outcome = d.analyze_project(ProjectId(1)).await.unwrap();
        let AnalysisOutcome::Completed(report) = outcome else {
            panic!("analysis was skipped");
        };
        assert_eq!(report.project, ProjectId(1));
        let after = d.snapshot();
        assert!(!after.analysis_in_flight);
        for (old, new) in before.projects.iter().zip(&after.projects) {
            if old.id == ProjectId(1) {
                assert_eq!(new.status, ProjectStatus::Completed);
                assert_eq!(
                    ProjectRecord {
                        status: old.status,
                        ..new.clone()
                    },
                    *old
                );
            } else {
                assert_eq!(new, old);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn flag_is_set_while_analysis_is_pending() {
        let d = dashboard();
        let background = d.clone();
        let task = tokio::spawn(async move { background.analyze_project(ProjectId(3)).await });
        tokio::time::sleep(DELAY / 2).await;
        assert!(d.snapshot().analysis_in_flight);
        assert!(matches!(task.await.unwrap(), Ok(AnalysisOutcome::Completed(_))));
        assert!(!d.snapshot().analysis_in_flight);
    }

    #[tokio::test(start_paused = true)]
    async fn second_analysis_while_pending_is_a_no_op() {
        let d = dashboard();
        let (first, second) = tokio::join!(
            d.analyze_project(ProjectId(1)),
            d.analyze_project(ProjectId(3))
        );
        assert!(matches!(first, Ok(AnalysisOutcome::Completed(_))));
        assert_eq!(second, Ok(AnalysisOutcome::Skipped));

        let reference = dashboard();
        reference.analyze_project(ProjectId(1)).await.unwrap();
        assert_eq!(d.snapshot(), reference.snapshot());
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_analysis_releases_the_dashboard() {
        let d = dashboard();
        let abandoned = tokio::time::timeout(DELAY / 2, d.analyze_project(ProjectId(1))).await;
        assert!(abandoned.is_err());
        let state = d.snapshot();
        assert!(!state.analysis_in_flight);
        assert_eq!(state.projects, projects());
        let outcome = d.analyze_project(ProjectId(3)).await;
        assert!(matches!(outcome, Ok(AnalysisOutcome::Completed(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn aborted_analysis_task_releases_the_dashboard() {
        let d = dashboard();
        let background = d.clone();
        let task = tokio::spawn(async move { background.analyze_project(ProjectId(1)).await });
        tokio::time::sleep(DELAY / 2).await;
        assert!(d.snapshot().analysis_in_flight);
        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        assert!(!d.snapshot().analysis_in_flight);
        assert_eq!(d.snapshot().projects, projects());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_analysis_resets_flag_and_keeps_status() {
        let d = Dashboard::new(projects(), SimulatedAnalyzer::new(DELAY, 1.0), TIMEOUT);
        let result = d.analyze_project(ProjectId(1)).await;
        assert!(matches!(result, Err(AnalysisError::Collaborator(_))));
        let state = d.snapshot();
        assert!(!state.analysis_in_flight);
        assert_eq!(state.projects, projects());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_analysis_times_out() {
        let d = Dashboard::new(projects(), Stalled, TIMEOUT);
        let result = d.analyze_project(ProjectId(1)).await;
        assert_eq!(result, Err(AnalysisError::TimedOut(TIMEOUT)));
        assert!(!d.snapshot().analysis_in_flight);
        assert_eq!(d.snapshot().projects, projects());
        // The dashboard accepts new analyses afterwards.
        let result = d.analyze_project(ProjectId(2)).await;
        assert_eq!(result, Err(AnalysisError::TimedOut(TIMEOUT)));
    }

    #[tokio::test]
    async fn unknown_project_cannot_be_analyzed() {
        let d = dashboard();
        let result = d.analyze_project(ProjectId(42)).await;
        assert_eq!(result, Err(AnalysisError::UnknownProject(ProjectId(42))));
        assert!(!d.snapshot().analysis_in_flight);
        assert_eq!(d.snapshot().projects, projects());
    }
}

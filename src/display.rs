use crate::analysis::AnalysisReport;
use crate::model::{DashboardState, ProjectRecord};
use crate::stats::SummaryStatistics;
use std::fmt::Write;

pub fn render_projects(state: &DashboardState) -> String {
    let mut output = String::new();
    let projects = state.filtered_projects().collect::<Vec<_>>();
    let _ = write!(output, "Projects ({}", state.status_filter);
    if !state.search_term.is_empty() {
        let _ = write!(output, ", matching \"{}\"", state.search_term);
    }
    let _ = writeln!(output, "): {}/{}", projects.len(), state.projects.len());
    if projects.is_empty() {
        let _ = writeln!(output, "  No projects found.");
    }
    for p in projects {
        let _ = writeln!(
            output,
            "  - {:>4} {} by {} [{}, {}] {}%",
            p.id.to_string(),
            p.project_title,
            p.student_name,
            p.status,
            p.project_type,
            p.score_percent()
        );
    }
    output
}

pub fn render_stats(stats: &SummaryStatistics) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "Total projects: {}", stats.total);
    let _ = writeln!(
        output,
        "Completed/in progress/pending: {}/{}/{}",
        stats.completed, stats.in_progress, stats.pending
    );
    if stats.failed + stats.cancelled > 0 {
        let _ = writeln!(
            output,
            "Failed/cancelled: {}/{}",
            stats.failed, stats.cancelled
        );
    }
    let _ = writeln!(output, "Average score: {}", stats.average_score);
    output
}

pub fn render_details(project: Option<&ProjectRecord>) -> String {
    let Some(p) = project else {
        return "No project selected.\n".to_owned();
    };
    let mut output = String::new();
    let _ = writeln!(output, "{} {}", p.id, p.project_title);
    let _ = writeln!(output, "  Student: {}", p.student_name);
    let _ = writeln!(output, "  Repository: {}", p.repository_url);
    if !p.technologies.is_empty() {
        let _ = writeln!(output, "  Technologies: {}", p.technologies.join(", "));
    }
    let _ = writeln!(output, "  Type: {}", p.project_type);
    let _ = writeln!(output, "  Status: {}", p.status);
    let _ = writeln!(output, "  Score: {}%", p.score_percent());
    if !p.last_updated.is_empty() {
        let _ = writeln!(output, "  Last updated: {}", p.last_updated);
    }
    if !p.feedback.is_empty() {
        let _ = writeln!(output, "  Feedback: {}", p.feedback);
    }
    output
}

pub fn render_history(scores: &[i32]) -> String {
    if scores.is_empty() {
        return "  Never analyzed.\n".to_owned();
    }
    let scores = scores.iter().map(ToString::to_string).collect::<Vec<_>>();
    format!("  Past analyses: {}\n", scores.join(", "))
}

pub fn render_report(report: &AnalysisReport) -> String {
    let mut output = String::new();
    let _ = writeln!(
        output,
        "Analysis of project {}: {}/100",
        report.project, report.total_score
    );
    for c in &report.categories {
        let _ = writeln!(output, "  - {} ({}%): {}/100", c.name, c.weight, c.score);
    }
    if !report.feedback.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "{}", report.feedback);
    }
    if !report.recommendations.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "Recommendations:");
        for r in &report.recommendations {
            let _ = writeln!(output, "  - {r}");
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ProjectStatus, StatusFilter, record};
    use crate::stats::statistics;

    #[test]
    fn list_shows_filtered_projects_with_clamped_scores() {
        let mut state = DashboardState::new(vec![
            record(1, "James Muganzi Imoli", "Weather App", ProjectStatus::Pending, 130),
            record(2, "Omollo Victor", "Chat Server", ProjectStatus::Completed, 90),
        ]);
        state.search_term = "JAM".into();
        let output = render_projects(&state);
        assert!(output.starts_with("Projects (all, matching \"JAM\"): 1/2\n"));
        assert!(output.contains("Weather App by James Muganzi Imoli [pending, individual] 100%"));
        assert!(!output.contains("Chat Server"));

        state.status_filter = StatusFilter::Completed;
        assert!(render_projects(&state).contains("No projects found."));
    }

    #[test]
    fn stats_hide_empty_failure_line() {
        let projects = vec![record(1, "A", "P", ProjectStatus::Completed, 70)];
        let output = render_stats(&statistics(&projects));
        assert_eq!(
            output,
            "Total projects: 1\nCompleted/in progress/pending: 1/0/0\nAverage score: 70\n"
        );
        let projects = vec![record(1, "A", "P", ProjectStatus::Failed, 70)];
        assert!(render_stats(&statistics(&projects)).contains("Failed/cancelled: 1/0"));
    }

    #[test]
    fn details_of_nothing() {
        assert_eq!(render_details(None), "No project selected.\n");
        let p = record(4, "A", "Portfolio", ProjectStatus::Pending, -3);
        let output = render_details(Some(&p));
        assert!(output.starts_with("#4 Portfolio\n"));
        assert!(output.contains("  Score: 0%\n"));
        assert!(output.contains("  Technologies: rust\n"));
    }

    #[test]
    fn history_lists_scores_in_order() {
        assert_eq!(render_history(&[]), "  Never analyzed.\n");
        assert_eq!(render_history(&[61, 77]), "  Past analyses: 61, 77\n");
    }
}

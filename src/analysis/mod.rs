use crate::model::{ProjectId, ProjectRecord};
use serde::Serialize;
use std::future::Future;
use std::time::Duration;

pub use self::checkout::CheckoutAnalyzer;
pub use self::simulated::SimulatedAnalyzer;

mod checkout;
mod simulated;

/// An external service evaluating a single project.
pub trait Analyzer: Send + Sync {
    fn analyze(
        &self,
        project: &ProjectRecord,
    ) -> impl Future<Output = Result<AnalysisReport, AnalysisError>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalysisError {
    #[error("project {0} does not exist")]
    UnknownProject(ProjectId),
    #[error("analysis did not complete within {0:?}")]
    TimedOut(Duration),
    #[error("analysis failed: {0}")]
    Collaborator(String),
}

/// Categories of a full analysis, with their weight in percent.
pub const CATEGORIES: [(&str, u32); 4] = [
    ("code quality", 25),
    ("structure", 20),
    ("documentation", 15),
    ("functionality", 40),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryScore {
    pub name: &'static str,
    pub score: i32,
    /// Weight in percent in the total score.
    pub weight: u32,
}

impl CategoryScore {
    /// Scores of the [`CATEGORIES`], given in the same order.
    pub fn standard(scores: [i32; 4]) -> Vec<CategoryScore> {
        CATEGORIES
            .iter()
            .zip(scores)
            .map(|(&(name, weight), score)| CategoryScore {
                name,
                score,
                weight,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisReport {
    pub project: ProjectId,
    pub total_score: i32,
    pub categories: Vec<CategoryScore>,
    pub feedback: String,
    pub recommendations: Vec<String>,
}

impl AnalysisReport {
    pub fn category_score(&self, name: &str) -> Option<i32> {
        self.categories
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.score)
    }

    /// Weighted total of the category scores, clamped to `0..=100`.
    pub fn weighted_total(categories: &[CategoryScore]) -> i32 {
        let total: i64 = categories
            .iter()
            .map(|c| i64::from(c.score) * i64::from(c.weight))
            .sum();
        #[allow(clippy::cast_possible_truncation)]
        let total = (total / 100).clamp(0, 100) as i32;
        total
    }
}

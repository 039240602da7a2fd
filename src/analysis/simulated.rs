use super::{AnalysisError, AnalysisReport, Analyzer};
use crate::model::ProjectRecord;
use rand::Rng;
use std::time::Duration;
use tracing::{debug, instrument};

/// Stand-in for a remote analysis service: waits for `delay`, then
/// succeeds, except for a random share `failure_rate` of the calls.
#[derive(Debug, Clone)]
pub struct SimulatedAnalyzer {
    delay: Duration,
    failure_rate: f64,
}

impl SimulatedAnalyzer {
    pub fn new(delay: Duration, failure_rate: f64) -> SimulatedAnalyzer {
        SimulatedAnalyzer {
            delay,
            failure_rate: failure_rate.clamp(0.0, 1.0),
        }
    }
}

impl Analyzer for SimulatedAnalyzer {
    #[instrument(skip_all, fields(project = %project.id))]
    async fn analyze(&self, project: &ProjectRecord) -> Result<AnalysisReport, AnalysisError> {
        tokio::time::sleep(self.delay).await;
        if self.failure_rate > 0.0 && rand::rng().random_bool(self.failure_rate) {
            debug!("simulated analysis failure");
            return Err(AnalysisError::Collaborator(
                "analysis service reported an error".to_owned(),
            ));
        }
        Ok(AnalysisReport {
            project: project.id,
            total_score: project.score,
            categories: Vec::new(),
            feedback: "Analysis completed.".to_owned(),
            recommendations: Vec::new(),
        })
    }
}

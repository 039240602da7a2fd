pub use self::dashboard::{AnalysisOutcome, Dashboard, DashboardState, StatusFilter};
pub use self::project::{ProjectId, ProjectRecord, ProjectStatus, ProjectType};

#[cfg(test)]
pub(crate) use self::project::record;

mod dashboard;
mod project;

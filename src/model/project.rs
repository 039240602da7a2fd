use eyre::{Error, bail};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub i64);

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl FromStr for ProjectId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim_start_matches('#').parse().map(ProjectId)
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProjectStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl ProjectStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "pending" => Self::Pending,
            // Stored by older databases as "analyzing".
            "in-progress" | "analyzing" => Self::InProgress,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "cancelled" => Self::Cancelled,
            other => bail!("unknown project status: {other}"),
        })
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProjectType {
    Individual,
    Team,
    Hackathon,
    Assignment,
}

impl ProjectType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Individual => "individual",
            Self::Team => "team",
            Self::Hackathon => "hackathon",
            Self::Assignment => "assignment",
        }
    }
}

impl fmt::Display for ProjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "individual" => Self::Individual,
            "team" => Self::Team,
            "hackathon" => Self::Hackathon,
            "assignment" => Self::Assignment,
            other => bail!("unknown project type: {other}"),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: ProjectId,
    pub student_name: String,
    pub project_title: String,
    pub repository_url: String,
    pub technologies: Vec<String>,
    pub score: i32,
    pub status: ProjectStatus,
    #[serde(rename = "type")]
    pub project_type: ProjectType,
    pub feedback: String,
    pub last_updated: String,
}

impl ProjectRecord {
    /// Score as a percentage, clamped to `0..=100`.
    pub fn score_percent(&self) -> u8 {
        score_percent(self.score)
    }

    /// `needle` must already be lowercase.
    pub fn matches_search(&self, needle: &str) -> bool {
        needle.is_empty()
            || self.student_name.to_lowercase().contains(needle)
            || self.project_title.to_lowercase().contains(needle)
    }
}

impl fmt::Display for ProjectRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.project_title, self.student_name)
    }
}

#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
pub fn score_percent(score: i32) -> u8 {
    score.clamp(0, 100) as u8
}

#[cfg(test)]
pub(crate) fn record(
    id: i64,
    student: &str,
    title: &str,
    status: ProjectStatus,
    score: i32,
) -> ProjectRecord {
    ProjectRecord {
        id: ProjectId(id),
        student_name: student.into(),
        project_title: title.into(),
        repository_url: format!("https://github.com/example/{id}"),
        technologies: vec!["rust".into()],
        score,
        status,
        project_type: ProjectType::Individual,
        feedback: String::new(),
        last_updated: "2 days ago".into(),
    }
}

#[test]
fn test_score_percent() {
    assert_eq!(score_percent(85), 85);
    assert_eq!(score_percent(-5), 0);
    assert_eq!(score_percent(140), 100);
}

#[test]
fn test_status_names() {
    for status in [
        ProjectStatus::Pending,
        ProjectStatus::InProgress,
        ProjectStatus::Completed,
        ProjectStatus::Failed,
        ProjectStatus::Cancelled,
    ] {
        assert_eq!(status.as_str().parse::<ProjectStatus>().unwrap(), status);
    }
    assert_eq!(
        "analyzing".parse::<ProjectStatus>().unwrap(),
        ProjectStatus::InProgress
    );
    assert!("done".parse::<ProjectStatus>().is_err());
    assert!("solo".parse::<ProjectType>().is_err());
}

#[test]
fn test_project_id_parsing() {
    assert_eq!("#12".parse::<ProjectId>().unwrap(), ProjectId(12));
    assert_eq!("7".parse::<ProjectId>().unwrap(), ProjectId(7));
    assert!("x".parse::<ProjectId>().is_err());
}

#[test]
fn test_search_is_case_insensitive_on_names_and_titles() {
    let r = record(1, "James Muganzi Imoli", "Weather App", ProjectStatus::Pending, 0);
    assert!(r.matches_search("jam"));
    assert!(r.matches_search("weather"));
    assert!(!r.matches_search("rust"));
    assert!(r.matches_search(""));
}

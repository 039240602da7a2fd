use crate::analysis::{AnalysisReport, CATEGORIES, CategoryScore};
use crate::model::{ProjectId, ProjectRecord, ProjectStatus, ProjectType};
use eyre::{Error, WrapErr, ensure};
use serde::{Deserialize, Serialize};
use sqlx::any::{AnyConnectOptions, AnyRow};
use sqlx::{AnyConnection, Connection, Row};
use std::io;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, trace};

const SCHEMA: [&str; 2] = [
    r"
    CREATE TABLE IF NOT EXISTS projects (
        id BIGINT PRIMARY KEY,
        student_name VARCHAR(255) NOT NULL,
        project_title VARCHAR(255) NOT NULL,
        repository_url TEXT NOT NULL,
        technologies TEXT NOT NULL,
        score BIGINT NOT NULL,
        status VARCHAR(16) NOT NULL,
        project_type VARCHAR(16) NOT NULL,
        feedback TEXT NOT NULL,
        last_updated VARCHAR(64) NOT NULL
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS analysis_results (
        project_id BIGINT NOT NULL,
        analysis_number BIGINT NOT NULL,
        total_score BIGINT NOT NULL,
        code_quality_score BIGINT,
        structure_score BIGINT,
        documentation_score BIGINT,
        functionality_score BIGINT,
        feedback TEXT NOT NULL,
        recommendations TEXT NOT NULL,
        PRIMARY KEY (project_id, analysis_number)
    )
    ",
];

/// Columns holding the scores of [`CATEGORIES`], in the same order.
const CATEGORY_COLUMNS: [&str; 4] = [
    "code_quality_score",
    "structure_score",
    "documentation_score",
    "functionality_score",
];

pub struct Loader {
    conn: AnyConnection,
}

impl Loader {
    pub async fn new(s: &str) -> Result<Self, Error> {
        sqlx::any::install_default_drivers();
        Ok(Self {
            conn: AnyConnection::connect_with(&AnyConnectOptions::from_str(s)?)
                .await
                .wrap_err_with(|| format!("cannot connect to {s}"))?,
        })
    }

    pub async fn init_schema(&mut self) -> Result<(), Error> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&mut self.conn)
                .await
                .wrap_err("cannot create schema")?;
        }
        Ok(())
    }

    pub async fn load(&mut self) -> Result<Vec<ProjectRecord>, Error> {
        let projects = sqlx::query(
            "SELECT id, student_name, project_title, repository_url, technologies, score, \
             status, project_type, feedback, last_updated FROM projects ORDER BY id",
        )
        .map(|row: AnyRow| record_from_row(&row))
        .fetch_all(&mut self.conn)
        .await
        .wrap_err("cannot load projects")?
        .into_iter()
        .collect::<Result<Vec<_>, _>>()?;
        debug!(count = projects.len(), "projects loaded");
        Ok(projects)
    }

    /// Insert or replace the given projects.
    pub async fn import(&mut self, projects: &[ProjectRecord]) -> Result<usize, Error> {
        let mut trans = self.conn.begin().await?;
        for p in projects {
            trace!(project = %p, "importing");
            sqlx::query("DELETE FROM projects WHERE id = ?")
                .bind(p.id.0)
                .execute(&mut *trans)
                .await
                .wrap_err_with(|| format!("cannot replace project {}", p.id))?;
            sqlx::query(
                "INSERT INTO projects (id, student_name, project_title, repository_url, \
                 technologies, score, status, project_type, feedback, last_updated) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(p.id.0)
            .bind(p.student_name.as_str())
            .bind(p.project_title.as_str())
            .bind(p.repository_url.as_str())
            .bind(serde_json::to_string(&p.technologies)?)
            .bind(i64::from(p.score))
            .bind(p.status.as_str())
            .bind(p.project_type.as_str())
            .bind(p.feedback.as_str())
            .bind(p.last_updated.as_str())
            .execute(&mut *trans)
            .await
            .wrap_err_with(|| format!("cannot import project {}", p.id))?;
        }
        trans
            .commit()
            .await
            .wrap_err("error when committing transaction")?;
        Ok(projects.len())
    }

    pub async fn save_status(&mut self, id: ProjectId, status: ProjectStatus) -> Result<(), Error> {
        sqlx::query("UPDATE projects SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id.0)
            .execute(&mut self.conn)
            .await
            .wrap_err_with(|| format!("cannot save status of project {id}"))?;
        Ok(())
    }

    /// Record a successful analysis: the project becomes `completed` and
    /// the report is appended to its analysis history. Category scores are
    /// left empty for reports without categories.
    pub async fn save_analysis(&mut self, report: &AnalysisReport) -> Result<(), Error> {
        let mut trans = self.conn.begin().await?;
        sqlx::query("UPDATE projects SET status = ? WHERE id = ?")
            .bind(ProjectStatus::Completed.as_str())
            .bind(report.project.0)
            .execute(&mut *trans)
            .await
            .wrap_err("cannot save project status")?;
        let last = sqlx::query(
            "SELECT analysis_number FROM analysis_results WHERE project_id = ? \
             ORDER BY analysis_number DESC LIMIT 1",
        )
        .bind(report.project.0)
        .fetch_optional(&mut *trans)
        .await
        .wrap_err("cannot number analysis result")?;
        let number = match last {
            Some(row) => row.try_get::<i64, _>("analysis_number")? + 1,
            None => 1,
        };
        let mut query = sqlx::query(
            "INSERT INTO analysis_results (project_id, analysis_number, total_score, \
             code_quality_score, structure_score, documentation_score, functionality_score, \
             feedback, recommendations) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(report.project.0)
        .bind(number)
        .bind(i64::from(report.total_score));
        for (name, _) in CATEGORIES {
            query = query.bind(report.category_score(name).map(i64::from));
        }
        query
            .bind(report.feedback.as_str())
            .bind(serde_json::to_string(&report.recommendations)?)
            .execute(&mut *trans)
            .await
            .wrap_err("cannot save analysis result")?;
        trans
            .commit()
            .await
            .wrap_err("error when committing transaction")?;
        Ok(())
    }

    /// Total scores of past analyses of a project, oldest first.
    pub async fn analysis_history(&mut self, id: ProjectId) -> Result<Vec<i32>, Error> {
        sqlx::query(
            "SELECT total_score FROM analysis_results WHERE project_id = ? \
             ORDER BY analysis_number",
        )
        .bind(id.0)
        .map(|row: AnyRow| -> Result<i32, Error> {
            Ok(i32::try_from(row.try_get::<i64, _>("total_score")?)?)
        })
        .fetch_all(&mut self.conn)
        .await
        .wrap_err("cannot load analysis history")?
        .into_iter()
        .collect()
    }

    pub async fn latest_analysis(
        &mut self,
        id: ProjectId,
    ) -> Result<Option<AnalysisReport>, Error> {
        sqlx::query(
            "SELECT total_score, code_quality_score, structure_score, documentation_score, \
             functionality_score, feedback, recommendations FROM analysis_results \
             WHERE project_id = ? ORDER BY analysis_number DESC LIMIT 1",
        )
        .bind(id.0)
        .map(|row: AnyRow| report_from_row(id, &row))
        .fetch_optional(&mut self.conn)
        .await
        .wrap_err_with(|| format!("cannot load analysis of project {id}"))?
        .transpose()
    }

    /// One row per project with its latest analysis, for all projects when
    /// `ids` is empty.
    pub async fn export_rows(&mut self, ids: &[ProjectId]) -> Result<Vec<ExportRow>, Error> {
        let projects = self.load().await?;
        for id in ids {
            ensure!(projects.iter().any(|p| p.id == *id), "project {id} does not exist");
        }
        let mut rows = Vec::new();
        for p in projects.iter().filter(|p| ids.is_empty() || ids.contains(&p.id)) {
            let report = self.latest_analysis(p.id).await?;
            rows.push(ExportRow::new(p, report.as_ref()));
        }
        Ok(rows)
    }
}

fn report_from_row(project: ProjectId, row: &AnyRow) -> Result<AnalysisReport, Error> {
    let mut scores = [0; 4];
    let mut complete = true;
    for (score, column) in scores.iter_mut().zip(CATEGORY_COLUMNS) {
        match row.try_get::<Option<i64>, _>(column)? {
            Some(s) => *score = i32::try_from(s)?,
            None => complete = false,
        }
    }
    let recommendations: String = row.try_get("recommendations")?;
    Ok(AnalysisReport {
        project,
        total_score: i32::try_from(row.try_get::<i64, _>("total_score")?)?,
        categories: if complete {
            CategoryScore::standard(scores)
        } else {
            Vec::new()
        },
        feedback: row.try_get("feedback")?,
        recommendations: serde_json::from_str(&recommendations)
            .wrap_err_with(|| format!("invalid recommendations for project {project}"))?,
    })
}

fn record_from_row(row: &AnyRow) -> Result<ProjectRecord, Error> {
    let id = ProjectId(row.try_get("id")?);
    let technologies: String = row.try_get("technologies")?;
    Ok(ProjectRecord {
        id,
        student_name: row.try_get("student_name")?,
        project_title: row.try_get("project_title")?,
        repository_url: row.try_get("repository_url")?,
        technologies: serde_json::from_str(&technologies)
            .wrap_err_with(|| format!("invalid technologies for project {id}"))?,
        score: i32::try_from(row.try_get::<i64, _>("score")?)
            .wrap_err_with(|| format!("score out of range for project {id}"))?,
        status: row.try_get::<String, _>("status")?.parse()?,
        project_type: row.try_get::<String, _>("project_type")?.parse()?,
        feedback: row.try_get("feedback")?,
        last_updated: row.try_get("last_updated")?,
    })
}

#[derive(Deserialize)]
struct CsvRow {
    id: i64,
    student_name: String,
    project_title: String,
    #[serde(default)]
    repository_url: String,
    /// Technologies separated by `;`.
    #[serde(default)]
    technologies: String,
    #[serde(default)]
    score: i32,
    status: ProjectStatus,
    project_type: ProjectType,
    #[serde(default)]
    feedback: String,
    #[serde(default)]
    last_updated: String,
}

impl From<CsvRow> for ProjectRecord {
    fn from(row: CsvRow) -> ProjectRecord {
        ProjectRecord {
            id: ProjectId(row.id),
            student_name: row.student_name,
            project_title: row.project_title,
            repository_url: row.repository_url,
            technologies: row
                .technologies
                .split(';')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect(),
            score: row.score,
            status: row.status,
            project_type: row.project_type,
            feedback: row.feedback,
            last_updated: row.last_updated,
        }
    }
}

pub fn read_csv(path: &Path) -> Result<Vec<ProjectRecord>, Error> {
    let file =
        std::fs::File::open(path).wrap_err_with(|| format!("cannot open {}", path.display()))?;
    parse_csv(file).wrap_err_with(|| format!("cannot read projects from {}", path.display()))
}

fn parse_csv<R: io::Read>(reader: R) -> Result<Vec<ProjectRecord>, Error> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    reader
        .deserialize::<CsvRow>()
        .enumerate()
        .map(|(line, row)| {
            row.map(ProjectRecord::from)
                .wrap_err_with(|| format!("invalid record {}", line + 1))
        })
        .collect()
}

/// A project and the scores of its latest analysis, if any.
#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct ExportRow {
    pub student_name: String,
    pub project_title: String,
    pub total_score: Option<i32>,
    pub code_quality_score: Option<i32>,
    pub structure_score: Option<i32>,
    pub documentation_score: Option<i32>,
    pub functionality_score: Option<i32>,
    pub feedback: Option<String>,
}

impl ExportRow {
    pub fn new(project: &ProjectRecord, report: Option<&AnalysisReport>) -> ExportRow {
        let category = |name| report.and_then(|r| r.category_score(name));
        ExportRow {
            student_name: project.student_name.clone(),
            project_title: project.project_title.clone(),
            total_score: report.map(|r| r.total_score),
            code_quality_score: category(CATEGORIES[0].0),
            structure_score: category(CATEGORIES[1].0),
            documentation_score: category(CATEGORIES[2].0),
            functionality_score: category(CATEGORIES[3].0),
            feedback: report.map(|r| r.feedback.clone()),
        }
    }
}

pub fn export_csv(path: &Path, rows: &[ExportRow]) -> Result<(), Error> {
    let file = std::fs::File::create(path)
        .wrap_err_with(|| format!("cannot create {}", path.display()))?;
    write_export(file, rows).wrap_err_with(|| format!("cannot export to {}", path.display()))
}

fn write_export<W: io::Write>(writer: W, rows: &[ExportRow]) -> Result<(), Error> {
    let mut writer = csv::Writer::from_writer(writer);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

use crate::analysis::{AnalysisReport, Analyzer, CheckoutAnalyzer, SimulatedAnalyzer};
use crate::config::{Config, get_config, parse_config};
use crate::loaders::Loader;
use crate::model::{
    AnalysisOutcome, Dashboard, ProjectId, ProjectRecord, ProjectStatus, StatusFilter,
};
use clap::{ArgAction, Parser, Subcommand};
use eyre::{Error, WrapErr, bail, ensure};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{Level, info};

mod analysis;
mod checks;
mod config;
mod display;
mod loaders;
mod model;
mod stats;

const DEFAULT_DATABASE_URL: &str = "sqlite://r3viewer.db?mode=rwc";

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Use FILE instead of r3viewer.toml
    #[arg(short, long, value_name = "FILE", default_value = "r3viewer.toml")]
    config: PathBuf,
    /// Do not write back results to database
    #[arg(short = 'n', long)]
    dry_run: bool,
    /// Read projects from a CSV file instead of the database
    #[arg(long, value_name = "FILE")]
    csv: Option<PathBuf>,
    /// Set verbosity level
    #[arg(short, action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the database schema
    InitDb,
    /// Import projects from a CSV file into the database
    Import { file: PathBuf },
    /// List projects matching a search term and a status
    List {
        #[arg(short, long)]
        search: Option<String>,
        /// One of all, pending, in-progress or completed
        #[arg(long, default_value_t = StatusFilter::All)]
        status: StatusFilter,
        #[arg(long)]
        json: bool,
    },
    /// Display summary statistics over all projects
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// Display a project
    Show { id: ProjectId },
    /// Analyze a project and mark it as completed
    Analyze {
        id: ProjectId,
        /// Scan a local checkout of the repository instead of using the simulated service
        #[arg(long, value_name = "DIR")]
        checkout: Option<PathBuf>,
    },
    /// Set the status of a project in the database
    Status { id: ProjectId, status: ProjectStatus },
    /// Export the latest analysis scores of projects to a CSV file
    Export {
        file: PathBuf,
        /// Projects to export, all of them if none is given
        ids: Vec<ProjectId>,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        3 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

async fn load_projects(
    csv: Option<&Path>,
    database_url: &str,
) -> Result<(Vec<ProjectRecord>, Option<Loader>), Error> {
    let (projects, loader) = match csv {
        Some(file) => (loaders::read_csv(file)?, None),
        None => {
            let mut loader = Loader::new(database_url).await?;
            (loader.load().await?, Some(loader))
        }
    };
    checks::ensure_unique_ids(&projects)?;
    checks::warn_out_of_range_scores(&projects);
    Ok((projects, loader))
}

async fn analyze<A: Analyzer>(
    dashboard: &Dashboard<A>,
    id: ProjectId,
) -> Result<AnalysisReport, Error> {
    dashboard.select_project(Some(id));
    match dashboard.analyze_project(id).await? {
        AnalysisOutcome::Completed(report) => Ok(report),
        AnalysisOutcome::Skipped => bail!("another analysis is already in progress"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = Config::load(&cli.config)?;
    let database_url =
        get_config(&config, "database", "url").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_owned());
    let timeout = Duration::from_millis(parse_config(&config, "analysis", "timeout_ms", 30_000)?);
    let simulated = SimulatedAnalyzer::new(
        Duration::from_millis(parse_config(&config, "analysis", "delay_ms", 2000)?),
        parse_config(&config, "analysis", "failure_rate", 0.0)?,
    );
    match cli.command {
        Command::InitDb => {
            Loader::new(&database_url).await?.init_schema().await?;
            println!("Schema ready.");
        }
        Command::Import { file } => {
            let projects = loaders::read_csv(&file)?;
            checks::ensure_unique_ids(&projects)?;
            let mut loader = Loader::new(&database_url).await?;
            loader.init_schema().await?;
            let imported = loader.import(&projects).await?;
            println!("Imported {imported} projects from {}.", file.display());
        }
        Command::List {
            search,
            status,
            json,
        } => {
            let (projects, _) = load_projects(cli.csv.as_deref(), &database_url).await?;
            let dashboard = Dashboard::new(projects, simulated, timeout);
            dashboard.set_search_term(search.unwrap_or_default());
            dashboard.set_status_filter(status);
            if json {
                println!("{}", serde_json::to_string_pretty(&dashboard.filtered_projects())?);
            } else {
                print!("{}", display::render_projects(&dashboard.snapshot()));
            }
        }
        Command::Stats { json } => {
            let (projects, _) = load_projects(cli.csv.as_deref(), &database_url).await?;
            let stats = Dashboard::new(projects, simulated, timeout).summary_statistics();
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print!("{}", display::render_stats(&stats));
            }
        }
        Command::Show { id } => {
            let (projects, loader) = load_projects(cli.csv.as_deref(), &database_url).await?;
            let dashboard = Dashboard::new(projects, simulated, timeout);
            dashboard.select_project(Some(id));
            let selected = dashboard.selected_project();
            print!("{}", display::render_details(selected.as_ref()));
            if let (Some(mut loader), Some(_)) = (loader, selected) {
                let history = loader.analysis_history(id).await?;
                print!("{}", display::render_history(&history));
                if let Some(report) = loader.latest_analysis(id).await? {
                    println!();
                    print!("{}", display::render_report(&report));
                }
            }
        }
        Command::Analyze { id, checkout } => {
            let (projects, loader) = load_projects(cli.csv.as_deref(), &database_url).await?;
            let report = match checkout {
                Some(dir) => {
                    let analyzer = CheckoutAnalyzer::new(dir);
                    analyze(&Dashboard::new(projects, analyzer, timeout), id).await
                }
                None => analyze(&Dashboard::new(projects, simulated, timeout), id).await,
            }
            .wrap_err_with(|| format!("cannot analyze project {id}"))?;
            print!("{}", display::render_report(&report));
            match loader {
                Some(mut loader) if !cli.dry_run => {
                    loader.save_analysis(&report).await?;
                    info!(project = %id, "analysis saved");
                }
                _ => info!(project = %id, "analysis not saved"),
            }
        }
        Command::Status { id, status } => {
            let mut loader = Loader::new(&database_url).await?;
            let projects = loader.load().await?;
            ensure!(projects.iter().any(|p| p.id == id), "project {id} does not exist");
            if cli.dry_run {
                info!(project = %id, %status, "dry run, status not saved");
            } else {
                loader.save_status(id, status).await?;
                println!("Project {id} is now {status}.");
            }
        }
        Command::Export { file, ids } => {
            let rows = Loader::new(&database_url).await?.export_rows(&ids).await?;
            loaders::export_csv(&file, &rows)?;
            println!("Exported {} projects to {}.", rows.len(), file.display());
        }
    }
    Ok(())
}

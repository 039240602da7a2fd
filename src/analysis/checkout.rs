use super::{AnalysisError, AnalysisReport, Analyzer, CategoryScore};
use crate::model::ProjectRecord;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument, trace};

const SKIPPED_DIRECTORIES: [&str; 5] = [".git", "node_modules", "target", "__pycache__", "venv"];
const MAX_TEXT_SIZE: u64 = 1 << 20;

/// Static analysis of a project checked out in a local directory.
#[derive(Debug, Clone)]
pub struct CheckoutAnalyzer {
    root: PathBuf,
}

impl CheckoutAnalyzer {
    pub fn new(root: impl Into<PathBuf>) -> CheckoutAnalyzer {
        CheckoutAnalyzer { root: root.into() }
    }
}

impl Analyzer for CheckoutAnalyzer {
    #[instrument(skip_all, fields(project = %project.id, root = %self.root.display()))]
    async fn analyze(&self, project: &ProjectRecord) -> Result<AnalysisReport, AnalysisError> {
        let root = self.root.clone();
        let mut stacks = Vec::new();
        for stack in project.technologies.iter().filter_map(|t| Stack::from_name(t)) {
            if !stacks.contains(&stack) {
                stacks.push(stack);
            }
        }
        let checkout = tokio::task::spawn_blocking(move || Checkout::scan(&root))
            .await
            .map_err(|e| AnalysisError::Collaborator(format!("scanner crashed: {e}")))?
            .map_err(|e| AnalysisError::Collaborator(format!("cannot scan checkout: {e}")))?;
        debug!(
            files = checkout.files.len(),
            directories = checkout.directories.len(),
            "checkout scanned"
        );
        if checkout.files.is_empty() {
            return Err(AnalysisError::Collaborator("checkout is empty".to_owned()));
        }
        Ok(checkout.report(project, &stacks))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Stack {
    JavaScript,
    Python,
    Java,
    Rust,
}

impl Stack {
    fn from_name(name: &str) -> Option<Stack> {
        match name.to_lowercase().as_str() {
            "javascript" | "typescript" | "nodejs" | "node.js" | "react" | "vue" | "angular"
            | "next.js" | "express" => Some(Stack::JavaScript),
            "python" | "django" | "flask" | "fastapi" => Some(Stack::Python),
            "java" | "spring-boot" | "spring boot" => Some(Stack::Java),
            "rust" => Some(Stack::Rust),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct FileInfo {
    /// Path relative to the checkout root, with `/` separators.
    path: String,
    name: String,
    size: u64,
    content: Option<String>,
}

impl FileInfo {
    fn extension(&self) -> Option<&str> {
        self.name.rsplit_once('.').map(|(_, ext)| ext)
    }

    fn is_test(&self) -> bool {
        let name = self.name.to_lowercase();
        name.contains("test")
            || name.contains("spec")
            || self.path.contains("__tests__")
            || self.path.split('/').any(|d| d == "test" || d == "tests")
    }
}

#[derive(Debug, Default)]
struct Checkout {
    files: Vec<FileInfo>,
    directories: Vec<String>,
}

impl Checkout {
    fn scan(root: &Path) -> io::Result<Checkout> {
        let mut checkout = Checkout::default();
        checkout.walk(root, "")?;
        Ok(checkout)
    }

    fn walk(&mut self, dir: &Path, prefix: &str) -> io::Result<()> {
        let mut entries = fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
        entries.sort_by_key(fs::DirEntry::file_name);
        for entry in entries {
            let name = entry.file_name().to_string_lossy().into_owned();
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}/{name}")
            };
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                if SKIPPED_DIRECTORIES.contains(&name.as_str()) {
                    trace!(directory = %path, "skipping");
                    continue;
                }
                self.directories.push(path.clone());
                self.walk(&entry.path(), &path)?;
            } else if file_type.is_file() {
                let size = entry.metadata()?.len();
                let content = if size <= MAX_TEXT_SIZE {
                    read_text(&entry.path())
                } else {
                    None
                };
                self.files.push(FileInfo {
                    path,
                    name,
                    size,
                    content,
                });
            }
        }
        Ok(())
    }

    fn text_files(&self) -> impl Iterator<Item = &FileInfo> {
        self.files.iter().filter(|f| f.content.is_some())
    }

    fn file(&self, path: &str) -> Option<&FileInfo> {
        self.files.iter().find(|f| f.path == path)
    }

    fn has_file(&self, path: &str) -> bool {
        self.file(path).is_some()
    }

    fn has_directory(&self, name: &str) -> bool {
        self.directories.iter().any(|d| d == name)
    }

    fn readme(&self) -> Option<&FileInfo> {
        self.files
            .iter()
            .filter(|f| !f.path.contains('/'))
            .find(|f| f.name.to_lowercase().starts_with("readme"))
    }

    fn report(&self, project: &ProjectRecord, stacks: &[Stack]) -> AnalysisReport {
        let quality = self.code_quality(stacks);
        let structure = self.structure();
        let documentation = self.documentation();
        let functionality = self.functionality(stacks);
        let categories = CategoryScore::standard([
            quality.score,
            structure.score,
            documentation.score,
            functionality.score,
        ]);
        let total_score = AnalysisReport::weighted_total(&categories);
        let feedback = feedback(&categories, &quality, &functionality);
        let recommendations = recommendations(&quality, &structure, &documentation, &functionality);
        AnalysisReport {
            project: project.id,
            total_score,
            categories,
            feedback,
            recommendations,
        }
    }

    fn code_quality(&self, stacks: &[Stack]) -> QualityMetrics {
        let lint_issues = stacks
            .iter()
            .map(|&stack| self.lint_issues(stack))
            .sum::<usize>();
        let complexity = self.complexity_score();
        let duplicate_percentage = self.duplicate_percentage();
        let test_percentage = self.test_percentage();
        let security_issues = self
            .text_files()
            .filter(|f| {
                f.content.as_deref().is_some_and(|c| {
                    c.contains("password") || c.contains("secret") || c.contains("api_key")
                })
            })
            .map(|f| f.path.clone())
            .collect::<Vec<_>>();
        let lint_penalty = i32::try_from(lint_issues.min(50)).unwrap_or(50);
        #[allow(clippy::cast_possible_truncation)]
        let duplicate_penalty = (duplicate_percentage as i32).min(30);
        let security_penalty = i32::try_from(10 * security_issues.len()).unwrap_or(i32::MAX);
        let mut score = (100 - lint_penalty + complexity) / 2 - duplicate_penalty;
        if test_percentage > 50.0 {
            score += 10;
        }
        score = score.saturating_sub(security_penalty);
        QualityMetrics {
            score: score.clamp(0, 100),
            lint_issues,
            test_percentage,
            security_issues,
        }
    }

    fn lint_issues(&self, stack: Stack) -> usize {
        self.text_files()
            .map(|f| {
                let content = f.content.as_deref().unwrap_or_default();
                match (stack, f.extension()) {
                    (Stack::JavaScript, Some("js" | "ts" | "jsx" | "tsx")) => {
                        usize::from(content.contains("console.log"))
                            + usize::from(content.contains("var "))
                            + usize::from(content.contains("==") && !content.contains("==="))
                    }
                    (Stack::Python, Some("py")) => {
                        usize::from(content.contains("print(") && !f.is_test())
                            + usize::from(content.lines().any(|l| l.len() > 120))
                    }
                    (Stack::Java, Some("java")) => {
                        usize::from(content.contains("System.out.println") && !f.is_test())
                            + usize::from(!content.contains("package "))
                    }
                    (Stack::Rust, Some("rs")) => {
                        usize::from(content.contains(".unwrap()") && !f.is_test())
                            + usize::from(
                                content.contains("println!") && !f.path.ends_with("main.rs"),
                            )
                    }
                    _ => 0,
                }
            })
            .sum()
    }

    fn complexity_score(&self) -> i32 {
        let sizes = self
            .text_files()
            .filter(|f| f.size > 0)
            .map(|f| match f.size {
                0..=1000 => 100,
                1001..=5000 => 80,
                5001..=10000 => 60,
                _ => 40,
            })
            .collect::<Vec<i32>>();
        if sizes.is_empty() {
            100
        } else {
            #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
            let count = sizes.len() as i32;
            sizes.iter().sum::<i32>() / count
        }
    }

    /// Share of non-trivial text files sharing their exact size with another one.
    fn duplicate_percentage(&self) -> f64 {
        let mut by_size: HashMap<u64, usize> = HashMap::new();
        let mut total = 0;
        let mut duplicates = 0;
        for f in self.text_files().filter(|f| f.size > 100) {
            total += 1;
            let count = by_size.entry(f.size).or_insert(0);
            *count += 1;
            if *count >= 2 {
                duplicates += 1;
            }
        }
        percentage(duplicates, total)
    }

    fn test_percentage(&self) -> f64 {
        let sources = self
            .text_files()
            .filter(|f| !f.name.starts_with('.'))
            .collect::<Vec<_>>();
        percentage(sources.iter().filter(|f| f.is_test()).count(), sources.len())
    }

    fn comment_percentage(&self) -> f64 {
        let (mut total, mut comments) = (0, 0);
        for f in self.text_files() {
            let markers: &[&str] = match f.extension() {
                Some("py") => &["#"],
                Some("js" | "ts" | "jsx" | "tsx" | "java" | "rs" | "go" | "c" | "cpp") => {
                    &["//", "/*", "*"]
                }
                _ => continue,
            };
            for line in f.content.as_deref().unwrap_or_default().lines() {
                let line = line.trim_start();
                if line.is_empty() {
                    continue;
                }
                total += 1;
                if markers.iter().any(|m| line.starts_with(m)) {
                    comments += 1;
                }
            }
        }
        percentage(comments, total)
    }

    fn structure(&self) -> StructureMetrics {
        let top_level = |patterns: &[&str]| {
            self.directories
                .iter()
                .any(|d| patterns.iter().any(|p| d.split('/').any(|c| c == *p)))
        };
        let mut organization = 100;
        if !top_level(&["src", "lib", "app"]) {
            organization -= 20;
        }
        if !top_level(&["test", "tests", "spec", "__tests__"]) {
            organization -= 15;
        }
        if !top_level(&["doc", "docs"]) {
            organization -= 10;
        }
        let max_depth = self
            .directories
            .iter()
            .map(|d| d.matches('/').count())
            .max()
            .unwrap_or(0);
        if max_depth > 5 {
            organization -= 15;
        }

        let violations = self
            .files
            .iter()
            .filter(|f| {
                f.name.contains(' ')
                    || (f.name.chars().any(char::is_uppercase) && f.name.contains('-'))
            })
            .count();
        let naming = 100 - i32::try_from(violations * 5).unwrap_or(50).min(50);

        let mut layout = 100;
        if self.readme().is_none() {
            layout -= 20;
        }
        if !self.has_file(".gitignore") {
            layout -= 10;
        }
        if !self.has_package_file() {
            layout -= 15;
        }

        let mut configuration = 70;
        if self.files.iter().any(|f| f.name.to_lowercase().contains("docker")) {
            configuration += 10;
        }
        if self.files.iter().any(|f| matches!(f.extension(), Some("yml" | "yaml"))) {
            configuration += 10;
        }
        if self.has_package_file() {
            configuration += 10;
        }

        StructureMetrics {
            score: (organization + naming + layout + configuration) / 4,
            organization,
            naming,
        }
    }

    fn has_package_file(&self) -> bool {
        [
            "package.json",
            "requirements.txt",
            "pyproject.toml",
            "pom.xml",
            "build.gradle",
            "Cargo.toml",
            "go.mod",
        ]
        .iter()
        .any(|p| self.has_file(p))
    }

    fn documentation(&self) -> DocumentationMetrics {
        let readme = self
            .readme()
            .and_then(|f| f.content.as_deref())
            .map_or(0, readme_quality);
        let api = if self.files.iter().any(|f| {
            let name = f.name.to_lowercase();
            name.contains("api") || name.contains("swagger") || name.contains("openapi")
        }) {
            75
        } else {
            50
        };
        let comment_percentage = self.comment_percentage();
        #[allow(clippy::cast_possible_truncation)]
        let inline = (40 + (comment_percentage * 2.0) as i32).min(100);
        DocumentationMetrics {
            score: (readme + api + inline) / 3,
            readme,
            comment_percentage,
        }
    }

    fn functionality(&self, stacks: &[Stack]) -> FunctionalityMetrics {
        let builds = stacks.first().is_none_or(|&stack| self.builds(stack));
        let has_tests = ["test", "tests", "__tests__", "spec"]
            .iter()
            .any(|d| self.has_directory(d))
            || self.files.iter().any(FileInfo::is_test);
        let completeness = match self.files.len() {
            0..=5 => 30,
            6..=15 => 60,
            16..=30 => 80,
            _ => 90,
        };
        let error_handling = if self.files.iter().any(|f| {
            let name = f.name.to_lowercase();
            name.contains("error") || name.contains("exception") || name.contains("handler")
        }) {
            75
        } else {
            50
        };
        let performance = if self.files.iter().any(|f| {
            let name = f.name.to_lowercase();
            name.contains("cache") || name.contains("optimize") || name.contains("performance")
        }) {
            80
        } else {
            70
        };
        let mut score = completeness;
        if builds {
            score += 20;
        }
        if has_tests {
            score += 20;
        }
        FunctionalityMetrics {
            score: ((score + error_handling + performance) / 3).min(100),
            builds,
            has_tests,
            error_handling,
        }
    }

    /// Whether the checkout looks buildable for the given stack.
    fn builds(&self, stack: Stack) -> bool {
        match stack {
            Stack::JavaScript => self
                .file("package.json")
                .and_then(|f| f.content.as_deref())
                .is_some_and(|c| serde_json::from_str::<serde_json::Value>(c).is_ok()),
            Stack::Python => self
                .text_files()
                .filter(|f| !f.path.contains('/') && f.extension() == Some("py"))
                .any(|f| {
                    f.content
                        .as_deref()
                        .is_some_and(|c| c.contains("def ") || c.contains("class "))
                }),
            Stack::Java => {
                self.has_directory("src")
                    && (self.has_file("pom.xml") || self.has_file("build.gradle"))
            }
            Stack::Rust => self.has_file("Cargo.toml") && self.has_directory("src"),
        }
    }
}

#[derive(Debug)]
struct QualityMetrics {
    score: i32,
    lint_issues: usize,
    test_percentage: f64,
    security_issues: Vec<String>,
}

#[derive(Debug)]
struct StructureMetrics {
    score: i32,
    organization: i32,
    naming: i32,
}

#[derive(Debug)]
struct DocumentationMetrics {
    score: i32,
    readme: i32,
    comment_percentage: f64,
}

#[derive(Debug)]
struct FunctionalityMetrics {
    score: i32,
    builds: bool,
    has_tests: bool,
    error_handling: i32,
}

fn read_text(path: &Path) -> Option<String> {
    let bytes = fs::read(path).ok()?;
    if bytes.iter().take(8000).any(|&b| b == 0) {
        return None;
    }
    String::from_utf8(bytes).ok()
}

#[allow(clippy::cast_precision_loss)]
fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        100.0 * part as f64 / total as f64
    }
}

fn readme_quality(content: &str) -> i32 {
    let lower = content.to_lowercase();
    let mut score = 50;
    if lower.contains("installation") {
        score += 10;
    }
    if lower.contains("usage") {
        score += 10;
    }
    if lower.contains("description") || lower.contains("about") {
        score += 10;
    }
    if lower.contains("contributing") {
        score += 5;
    }
    if lower.contains("license") {
        score += 5;
    }
    if content.contains("```") {
        score += 10;
    }
    score.min(100)
}

fn feedback(
    categories: &[CategoryScore],
    quality: &QualityMetrics,
    functionality: &FunctionalityMetrics,
) -> String {
    let mut lines = categories
        .iter()
        .map(|c| format!("{}: {}/100", c.name, c.score))
        .collect::<Vec<_>>();
    lines.push(match quality.lint_issues {
        0 => "No common lint issues detected.".to_owned(),
        1..=10 => format!("{} minor lint issues found.", quality.lint_issues),
        n => format!("{n} lint issues found, consider running a linter."),
    });
    if !quality.security_issues.is_empty() {
        lines.push(format!(
            "Possible hardcoded credentials in: {}.",
            quality.security_issues.join(", ")
        ));
    }
    lines.push(if functionality.builds {
        "Build configuration looks valid.".to_owned()
    } else {
        "Build configuration is missing or invalid.".to_owned()
    });
    lines.push(if functionality.has_tests {
        "Tests are present.".to_owned()
    } else {
        "No tests were found.".to_owned()
    });
    lines.join("\n")
}

fn recommendations(
    quality: &QualityMetrics,
    structure: &StructureMetrics,
    documentation: &DocumentationMetrics,
    functionality: &FunctionalityMetrics,
) -> Vec<String> {
    let checks = [
        (quality.lint_issues > 5, "Set up a linter for the project's technology stack"),
        (quality.test_percentage < 50.0, "Increase the share of test files"),
        (!quality.security_issues.is_empty(), "Move credentials out of the source code"),
        (
            structure.organization < 70,
            "Reorganize sources, tests and docs into dedicated directories",
        ),
        (structure.naming < 70, "Use consistent file names without spaces"),
        (documentation.readme < 70, "Add installation and usage sections to the README"),
        (documentation.comment_percentage < 10.0, "Comment the non-obvious parts of the code"),
        (!functionality.builds, "Fix the build configuration"),
        (!functionality.has_tests, "Add a test suite"),
        (functionality.error_handling < 60, "Handle and report errors explicitly"),
    ];
    checks
        .iter()
        .filter(|(applies, _)| *applies)
        .map(|(_, text)| (*text).to_owned())
        .collect()
}

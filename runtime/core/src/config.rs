use std::path::{Path, PathBuf};

use config_validator::{Location, Severity, ValidationIssue};
use rule_builder::{build_from_path, build_from_str, BuildError};
use rule_format::RuleTable;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticSeverity {
    Error,
    Warning,
    Info,
}

impl From<Severity> for DiagnosticSeverity {
    fn from(value: Severity) -> Self {
        match value {
            Severity::Error => DiagnosticSeverity::Error,
            Severity::Warning => DiagnosticSeverity::Warning,
            Severity::Info => DiagnosticSeverity::Info,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub path: String,
    pub message: String,
    pub location: Option<Location>,
    pub severity: DiagnosticSeverity,
}

#[derive(Debug)]
pub struct LoadedRules {
    pub path: Option<PathBuf>,
    pub table: RuleTable,
    pub diagnostics: Vec<Diagnostic>,
    /// Configuration entries left out of the table (unknown status).
    pub skipped: Vec<usize>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("I/O error while reading config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] config_validator::ConfigError),
    #[error("Invalid rule file ({} errors)", count_errors(.0))]
    Validation(Vec<Diagnostic>),
}

impl From<BuildError> for LoadError {
    fn from(value: BuildError) -> Self {
        match value {
            BuildError::NotFound(path) => LoadError::NotFound(path),
            BuildError::Io(err) => LoadError::Io(err),
            BuildError::Parse(err) => LoadError::Parse(err),
            BuildError::Validation(issues) => LoadError::Validation(convert_issues(issues)),
        }
    }
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<LoadedRules, LoadError> {
    let path_ref = path.as_ref();
    let output = build_from_path(path_ref)?;
    Ok(LoadedRules {
        path: Some(path_ref.to_path_buf()),
        table: output.table,
        diagnostics: convert_issues(output.diagnostics),
        skipped: output.skipped,
    })
}

pub fn load_from_str(content: &str) -> Result<LoadedRules, LoadError> {
    let output = build_from_str(content)?;
    Ok(LoadedRules {
        path: None,
        table: output.table,
        diagnostics: convert_issues(output.diagnostics),
        skipped: output.skipped,
    })
}

/// Emits each diagnostic through `tracing` at a level matching its severity.
pub fn log_diagnostics(diagnostics: &[Diagnostic]) {
    for diag in diagnostics {
        let location = diag
            .location
            .map(|loc| format!(" (line {}, column {})", loc.line, loc.column))
            .unwrap_or_default();
        match diag.severity {
            DiagnosticSeverity::Error => error!("{}: {}{}", diag.path, diag.message, location),
            DiagnosticSeverity::Warning => warn!("{}: {}{}", diag.path, diag.message, location),
            DiagnosticSeverity::Info => info!("{}: {}{}", diag.path, diag.message, location),
        }
    }
}

impl LoadedRules {
    pub fn log_summary(&self) {
        log_diagnostics(&self.diagnostics);
        for (status, rules) in self.table.buckets() {
            for rule in rules {
                debug!(
                    status = %format!("{status:#04X}"),
                    "Config: {}\n{}\n",
                    rule.name,
                    rule.description
                );
            }
        }
        info!(
            rules = self.table.len(),
            skipped = self.skipped.len(),
            "Rule table loaded"
        );
    }
}

fn count_errors(diagnostics: &[Diagnostic]) -> usize {
    diagnostics
        .iter()
        .filter(|diag| diag.severity == DiagnosticSeverity::Error)
        .count()
}

fn convert_issues(issues: Vec<ValidationIssue>) -> Vec<Diagnostic> {
    issues.into_iter().map(convert_issue).collect()
}

fn convert_issue(issue: ValidationIssue) -> Diagnostic {
    Diagnostic {
        path: issue.path,
        message: issue.message,
        location: issue.location,
        severity: DiagnosticSeverity::from(issue.severity),
    }
}

use std::fs;
use std::path::{Path, PathBuf};

use config_validator::schema::{
    Config, RuleRecord, command_action, default_status, resolve_channel, resolve_data,
};
use config_validator::{ConfigError, ValidationIssue, parse_config_str, validate_config};
use rule_format::{CommandTemplate, Rule, RuleAction, RuleTable};
use thiserror::Error;

#[derive(Debug)]
pub struct BuildOutput {
    pub table: RuleTable,
    pub diagnostics: Vec<ValidationIssue>,
    /// Indices of configuration entries left out of the table.
    pub skipped: Vec<usize>,
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] ConfigError),
    #[error("Validation errors encountered")]
    Validation(Vec<ValidationIssue>),
}

pub fn build_from_path(path: impl AsRef<Path>) -> Result<BuildOutput, BuildError> {
    let path_ref = path.as_ref();
    if !path_ref.exists() {
        return Err(BuildError::NotFound(path_ref.to_path_buf()));
    }
    let content = fs::read_to_string(path_ref)?;
    build_from_str(&content)
}

pub fn build_from_str(content: &str) -> Result<BuildOutput, BuildError> {
    let config = parse_config_str(content)?;
    build_from_config(&config, content)
}

fn build_from_config(config: &Config, source: &str) -> Result<BuildOutput, BuildError> {
    let diagnostics = validate_config(config, source);
    if diagnostics
        .iter()
        .any(|issue| matches!(issue.severity, config_validator::Severity::Error))
    {
        return Err(BuildError::Validation(diagnostics));
    }

    let mut table = RuleTable::new();
    let mut skipped = Vec::new();
    for (index, entry) in config.rules.iter().enumerate() {
        match entry.record().ok().and_then(|record| compile_rule(&record)) {
            Some(rule) => table.push(rule),
            None => skipped.push(index),
        }
    }

    Ok(BuildOutput {
        table,
        diagnostics,
        skipped,
    })
}

/// Converts a validated record; `None` for rules the validator flagged as
/// ignorable (unknown status).
fn compile_rule(record: &RuleRecord) -> Option<Rule> {
    let status = match &record.status {
        Some(status) => status.resolve().ok()?,
        None => default_status(),
    };
    let source = record.command.as_deref()?;
    Some(Rule {
        name: record.name.clone().unwrap_or_default(),
        description: record.description.clone().unwrap_or_default(),
        status,
        channel: resolve_channel(record.channel).ok()?,
        data: resolve_data(record.data.as_ref()).ok()?,
        command: CommandTemplate::parse(source).ok()?,
        // Unsplittable commands stay external and fail when dispatched.
        action: command_action(source).unwrap_or(RuleAction::External),
    })
}

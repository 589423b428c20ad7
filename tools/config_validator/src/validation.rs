use rule_format::{
    CommandTemplate, DataFilter, Field, InternalTarget, MessageType, RuleAction, StatusSelector,
    SYSTEM_STATUS_THRESHOLD,
};

use crate::schema::{
    Config, FieldError, RuleRecord, command_action, default_status, resolve_channel, resolve_data,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
    pub location: Option<Location>,
    pub severity: Severity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl ValidationIssue {
    pub fn new(path: String, message: String, severity: Severity) -> Self {
        Self {
            path,
            message,
            location: None,
            severity,
        }
    }
}

/// Path of a rule (or one of its fields) inside the document.
pub fn rule_path(index: usize, field: Option<&str>) -> String {
    match field {
        Some(field) => format!("rules[{index}].{field}"),
        None => format!("rules[{index}]"),
    }
}

pub fn validate_config(config: &Config, source: &str) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if config.rules.is_empty() {
        issues.push(ValidationIssue::new(
            "rules".into(),
            "Configuration defines no rules".into(),
            Severity::Warning,
        ));
    }

    for (index, entry) in config.rules.iter().enumerate() {
        match entry.record() {
            Ok(record) => validate_record(index, &record, &mut issues),
            Err(message) => issues.push(ValidationIssue::new(
                rule_path(index, None),
                message,
                Severity::Error,
            )),
        }
    }

    attach_locations(source, issues)
}

fn validate_record(index: usize, record: &RuleRecord, issues: &mut Vec<ValidationIssue>) {
    let status = match record.status.as_ref().map(|s| s.resolve()) {
        None => Some(default_status()),
        Some(Ok(status)) => Some(status),
        Some(Err(err)) => {
            issues.push(ValidationIssue::new(
                rule_path(index, Some("status")),
                format!("{}; ignoring rule", capitalize(&err.to_string())),
                Severity::Warning,
            ));
            None
        }
    };

    if let Some(StatusSelector::Raw(code)) = status {
        let never_matches = code < 0x80
            || (code < SYSTEM_STATUS_THRESHOLD && code & 0x0F != 0);
        if never_matches {
            issues.push(ValidationIssue::new(
                rule_path(index, Some("status")),
                format!(
                    "Status code {code:#04X} is not a message category and will never match"
                ),
                Severity::Warning,
            ));
        }
    }

    if let Err(err) = resolve_channel(record.channel) {
        issues.push(field_issue(index, "channel", err));
    } else if record.channel.is_some()
        && matches!(status, Some(StatusSelector::Raw(code)) if code >= SYSTEM_STATUS_THRESHOLD)
    {
        issues.push(ValidationIssue::new(
            rule_path(index, Some("channel")),
            "System messages carry no channel; the channel filter is ignored".into(),
            Severity::Info,
        ));
    }

    match resolve_data(record.data.as_ref()) {
        Err(err) => issues.push(field_issue(index, "data", err)),
        Ok(DataFilter::Pair(..)) if status.is_some_and(carries_single_data_byte) => {
            issues.push(ValidationIssue::new(
                rule_path(index, Some("data")),
                "Message type carries a single data byte; a two-value data filter never matches"
                    .into(),
                Severity::Warning,
            ));
        }
        Ok(_) => {}
    }

    let Some(command) = record.command.as_deref() else {
        issues.push(ValidationIssue::new(
            rule_path(index, Some("command")),
            "Rule is missing a `command`".into(),
            Severity::Error,
        ));
        return;
    };
    if command.trim().is_empty() {
        issues.push(ValidationIssue::new(
            rule_path(index, Some("command")),
            "Command must not be empty".into(),
            Severity::Error,
        ));
        return;
    }

    match CommandTemplate::parse(command) {
        Ok(template) => {
            let system = matches!(status, Some(StatusSelector::Raw(code)) if code >= SYSTEM_STATUS_THRESHOLD);
            if system && template.fields().any(|field| field == Field::Channel) {
                issues.push(ValidationIssue::new(
                    rule_path(index, Some("command")),
                    "`channel` placeholder is always empty for system messages".into(),
                    Severity::Info,
                ));
            }
        }
        Err(err) => issues.push(ValidationIssue::new(
            rule_path(index, Some("command")),
            format!("Invalid command template: {err}"),
            Severity::Error,
        )),
    }

    match command_action(command) {
        None => issues.push(ValidationIssue::new(
            rule_path(index, Some("command")),
            "Command has unbalanced quotes or escapes; every dispatch will fail".into(),
            Severity::Warning,
        )),
        Some(RuleAction::Internal(InternalTarget::Unknown(name))) => {
            issues.push(ValidationIssue::new(
                rule_path(index, Some("command")),
                format!("Unknown internal target `{name}`; the command does nothing"),
                Severity::Warning,
            ));
        }
        Some(_) => {}
    }
}

fn carries_single_data_byte(status: StatusSelector) -> bool {
    matches!(
        status,
        StatusSelector::Known(MessageType::ProgramChange | MessageType::ChannelPressure)
    )
}

fn field_issue(index: usize, field: &str, err: FieldError) -> ValidationIssue {
    ValidationIssue::new(
        rule_path(index, Some(field)),
        capitalize(&err.to_string()),
        Severity::Error,
    )
}

fn capitalize(message: &str) -> String {
    let mut chars = message.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn attach_locations(source: &str, mut issues: Vec<ValidationIssue>) -> Vec<ValidationIssue> {
    for issue in &mut issues {
        issue.location = find_location(source, &issue.path);
    }
    issues
}

/// Best-effort lookup of `rules[N]` / `rules[N].field` in the source text.
/// Only top-level list items (a `-` in the first column) are counted.
fn find_location(source: &str, path: &str) -> Option<Location> {
    let rest = path.strip_prefix("rules[")?;
    let (index, rest) = rest.split_once(']')?;
    let index: usize = index.parse().ok()?;
    let field = rest.strip_prefix('.');

    let lines: Vec<&str> = source.lines().collect();
    let item_starts: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| line.starts_with('-'))
        .map(|(idx, _)| idx)
        .collect();
    let start = *item_starts.get(index)?;
    let end = item_starts.get(index + 1).copied().unwrap_or(lines.len());

    if let Some(field) = field {
        let needle = format!("{field}:");
        for (idx, line) in lines.iter().enumerate().take(end).skip(start) {
            if let Some(column) = line.find(&needle) {
                return Some(Location {
                    line: idx + 1,
                    column: column + 1,
                });
            }
        }
    }

    Some(Location {
        line: start + 1,
        column: 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_config_str;

    fn issues_for(yaml: &str) -> Vec<ValidationIssue> {
        let cfg = parse_config_str(yaml).expect("parse");
        validate_config(&cfg, yaml)
    }

    #[test]
    fn documented_rules_pass() {
        let yaml = r#"- name: My Backingtracks
  description: Play audio file matching <data1>-playback.mp3
  status: programchange
  channel: 16
  command: plaympeg %(data1)03i-playback.mp3
- name: My Lead Sheets
  description: Open PDF matching <data2>-sheet.pdf
  status: controllerchange
  channel: 16
  data: 14
  command: evince %(data2)03i-sheet.pdf
"#;
        let issues = issues_for(yaml);
        assert!(issues.is_empty(), "{issues:?}");
    }

    #[test]
    fn unknown_status_warns_and_is_located() {
        let yaml = r#"- name: ok
  status: noteon
  command: echo on
- name: bad
  status: sysex
  command: echo bad
"#;
        let issues = issues_for(yaml);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].path, "rules[1].status");
        assert_eq!(issues[0].severity, Severity::Warning);
        assert!(issues[0].message.contains("sysex"));
        assert_eq!(issues[0].location, Some(Location { line: 5, column: 3 }));
    }

    #[test]
    fn missing_command_is_an_error() {
        let issues = issues_for("- name: silent\n  status: noteon\n");
        assert!(issues.iter().any(|i| {
            i.path == "rules[0].command" && i.severity == Severity::Error
        }));
    }

    #[test]
    fn malformed_fields_are_errors() {
        let yaml = r#"- status: noteon
  channel: 17
  command: echo
- status: noteon
  data: "1 2 3"
  command: echo
- status: noteon
  command: echo %(velocity)d
- [lonely]
"#;
        let issues = issues_for(yaml);
        let errors: Vec<_> = issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .map(|i| i.path.as_str())
            .collect();
        assert_eq!(
            errors,
            vec![
                "rules[0].channel",
                "rules[1].data",
                "rules[2].command",
                "rules[3]"
            ]
        );
    }

    #[test]
    fn suspicious_rules_warn() {
        let yaml = r#"- status: programchange
  data: "1 2"
  command: echo pair
- status: noteon
  command: internal lights
- status: "0xB3"
  command: echo never
- status: noteon
  command: echo 'open
"#;
        let issues = issues_for(yaml);
        assert_eq!(issues.len(), 4, "{issues:?}");
        assert!(issues.iter().all(|i| i.severity == Severity::Warning));
    }

    #[test]
    fn system_status_notes() {
        let yaml = r#"- status: 248
  channel: 1
  command: echo %(channel)d
"#;
        let issues = issues_for(yaml);
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().all(|i| i.severity == Severity::Info));
    }

    #[test]
    fn empty_config_warns() {
        let issues = issues_for("[]");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Warning);
    }
}

use rule_format::{DataFilter, InternalTarget, MessageType, RuleAction, StatusSelector};
use serde::Deserialize;
use serde_yaml::Value;
use thiserror::Error;

/// Keyword introducing an in-process command, e.g. `internal camera`.
pub const INTERNAL_KEYWORD: &str = "internal";

/// Top-level document: an ordered list of rules.
#[derive(Debug, Deserialize)]
#[serde(transparent)]
pub struct Config {
    pub rules: Vec<RuleEntry>,
}

/// One list item, either a mapping or a positional sequence
/// `[name, description, status, channel, data, command]`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RuleEntry {
    Positional(Vec<Value>),
    Record(RuleRecord),
    Other(Value),
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RuleRecord {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<StatusValue>,
    #[serde(default)]
    pub channel: Option<i64>,
    #[serde(default)]
    pub data: Option<DataValue>,
    #[serde(default)]
    pub command: Option<String>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum StatusValue {
    Code(i64),
    Name(String),
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum DataValue {
    Single(i64),
    Text(String),
    List(Vec<i64>),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FieldError {
    #[error("unknown status `{0}`")]
    UnknownStatus(String),
    #[error("status code {0} is outside 0..=255")]
    StatusOutOfRange(i64),
    #[error("channel {0} is outside 1..=16")]
    ChannelOutOfRange(i64),
    #[error("data value {0} is outside 0..=127")]
    DataOutOfRange(i64),
    #[error("could not parse data field `{0}`")]
    InvalidData(String),
}

const POSITIONAL_FIELDS: [&str; 6] = ["name", "description", "status", "channel", "data", "command"];

impl RuleEntry {
    /// Normalizes the entry into named fields.
    pub fn record(&self) -> Result<RuleRecord, String> {
        match self {
            RuleEntry::Record(record) => Ok(record.clone()),
            RuleEntry::Positional(values) => positional_record(values),
            RuleEntry::Other(_) => Err(
                "rule must be a mapping with a `command` field or a list of at least two values"
                    .into(),
            ),
        }
    }
}

fn positional_record(values: &[Value]) -> Result<RuleRecord, String> {
    if values.len() < 2 {
        return Err(format!(
            "positional rule needs at least two values, found {}",
            values.len()
        ));
    }
    if values.len() > POSITIONAL_FIELDS.len() {
        return Err(format!(
            "positional rule accepts at most {} values ({}), found {}",
            POSITIONAL_FIELDS.len(),
            POSITIONAL_FIELDS.join(", "),
            values.len()
        ));
    }

    fn field<T: serde::de::DeserializeOwned>(
        values: &[Value],
        index: usize,
    ) -> Result<Option<T>, String> {
        match values.get(index) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_yaml::from_value(value.clone())
                .map(Some)
                .map_err(|err| format!("{}: {err}", POSITIONAL_FIELDS[index])),
        }
    }

    Ok(RuleRecord {
        name: field(values, 0)?,
        description: field(values, 1)?,
        status: field(values, 2)?,
        channel: field(values, 3)?,
        data: field(values, 4)?,
        command: field(values, 5)?,
    })
}

impl StatusValue {
    /// Keyword, integer, or integer string (decimal or `0x` hex).
    pub fn resolve(&self) -> Result<StatusSelector, FieldError> {
        let code = match self {
            StatusValue::Code(code) => *code,
            StatusValue::Name(name) => {
                if let Some(ty) = MessageType::from_keyword(name) {
                    return Ok(StatusSelector::Known(ty));
                }
                parse_integer(name.trim())
                    .ok_or_else(|| FieldError::UnknownStatus(name.clone()))?
            }
        };
        u8::try_from(code)
            .map(StatusSelector::Raw)
            .map_err(|_| FieldError::StatusOutOfRange(code))
    }
}

/// Status used when a rule omits one.
pub fn default_status() -> StatusSelector {
    StatusSelector::Known(MessageType::ControllerChange)
}

impl DataValue {
    pub fn resolve(&self) -> Result<DataFilter, FieldError> {
        let values: Vec<i64> = match self {
            DataValue::Single(value) => vec![*value],
            DataValue::List(values) => values.clone(),
            DataValue::Text(text) => text
                .split_whitespace()
                .map(|part| {
                    parse_integer(part).ok_or_else(|| FieldError::InvalidData(text.clone()))
                })
                .collect::<Result<_, _>>()?,
        };
        let bytes = values
            .iter()
            .map(|value| data_byte(*value))
            .collect::<Result<Vec<_>, _>>()?;
        match bytes.as_slice() {
            [single] => Ok(DataFilter::Single(*single)),
            [first, second] => Ok(DataFilter::Pair(*first, *second)),
            _ => Err(FieldError::InvalidData(self.describe())),
        }
    }

    fn describe(&self) -> String {
        match self {
            DataValue::Single(value) => value.to_string(),
            DataValue::Text(text) => text.clone(),
            DataValue::List(values) => format!("{values:?}"),
        }
    }
}

pub fn resolve_channel(channel: Option<i64>) -> Result<Option<u8>, FieldError> {
    match channel {
        None => Ok(None),
        Some(value @ 1..=16) => Ok(Some(value as u8)),
        Some(value) => Err(FieldError::ChannelOutOfRange(value)),
    }
}

pub fn resolve_data(data: Option<&DataValue>) -> Result<DataFilter, FieldError> {
    data.map_or(Ok(DataFilter::Any), DataValue::resolve)
}

/// Classifies a raw command template by its first shell word. `None` when
/// the template cannot be split into words.
pub fn command_action(command: &str) -> Option<RuleAction> {
    let words = shlex::split(command)?;
    let mut words = words.iter().map(String::as_str);
    match words.next() {
        Some(INTERNAL_KEYWORD) => Some(RuleAction::Internal(InternalTarget::from_name(
            words.next(),
        ))),
        _ => Some(RuleAction::External),
    }
}

fn data_byte(value: i64) -> Result<u8, FieldError> {
    match value {
        0..=127 => Ok(value as u8),
        _ => Err(FieldError::DataOutOfRange(value)),
    }
}

fn parse_integer(text: &str) -> Option<i64> {
    match text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        Some(hex) => i64::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_keywords_and_codes() {
        assert_eq!(
            StatusValue::Name("ControllerChange".into()).resolve(),
            Ok(StatusSelector::Known(MessageType::ControllerChange))
        );
        assert_eq!(
            StatusValue::Name("248".into()).resolve(),
            Ok(StatusSelector::Raw(0xF8))
        );
        assert_eq!(
            StatusValue::Name("0xFA".into()).resolve(),
            Ok(StatusSelector::Raw(0xFA))
        );
        assert_eq!(StatusValue::Code(0xFC).resolve(), Ok(StatusSelector::Raw(0xFC)));
        assert_eq!(
            StatusValue::Name("sysex".into()).resolve(),
            Err(FieldError::UnknownStatus("sysex".into()))
        );
        assert_eq!(
            StatusValue::Code(300).resolve(),
            Err(FieldError::StatusOutOfRange(300))
        );
    }

    #[test]
    fn data_forms() {
        assert_eq!(DataValue::Single(14).resolve(), Ok(DataFilter::Single(14)));
        assert_eq!(
            DataValue::Text("14 3".into()).resolve(),
            Ok(DataFilter::Pair(14, 3))
        );
        assert_eq!(DataValue::Text(" 7 ".into()).resolve(), Ok(DataFilter::Single(7)));
        assert_eq!(DataValue::List(vec![1, 2]).resolve(), Ok(DataFilter::Pair(1, 2)));
        assert_eq!(
            DataValue::Text("1 2 3".into()).resolve(),
            Err(FieldError::InvalidData("1 2 3".into()))
        );
        assert_eq!(
            DataValue::Text("fourteen".into()).resolve(),
            Err(FieldError::InvalidData("fourteen".into()))
        );
        assert_eq!(
            DataValue::Single(128).resolve(),
            Err(FieldError::DataOutOfRange(128))
        );
        assert_eq!(resolve_data(None), Ok(DataFilter::Any));
    }

    #[test]
    fn channel_bounds() {
        assert_eq!(resolve_channel(Some(16)), Ok(Some(16)));
        assert_eq!(resolve_channel(None), Ok(None));
        assert_eq!(resolve_channel(Some(0)), Err(FieldError::ChannelOutOfRange(0)));
        assert_eq!(resolve_channel(Some(17)), Err(FieldError::ChannelOutOfRange(17)));
    }

    #[test]
    fn positional_entries_fill_in_order() {
        let entry: RuleEntry =
            serde_yaml::from_str(r#"["Backing", "Play", "programchange", 16, null, "echo"]"#)
                .expect("parse");
        let record = entry.record().expect("record");
        assert_eq!(record.name.as_deref(), Some("Backing"));
        assert_eq!(record.status, Some(StatusValue::Name("programchange".into())));
        assert_eq!(record.channel, Some(16));
        assert_eq!(record.data, None);
        assert_eq!(record.command.as_deref(), Some("echo"));

        let short: RuleEntry = serde_yaml::from_str(r#"["only"]"#).expect("parse");
        assert!(short.record().is_err());
    }

    #[test]
    fn commands_are_classified() {
        assert_eq!(command_action("echo %(data1)i"), Some(RuleAction::External));
        assert_eq!(
            command_action("internal camera"),
            Some(RuleAction::Internal(InternalTarget::Camera))
        );
        assert_eq!(
            command_action("internal lights"),
            Some(RuleAction::Internal(InternalTarget::Unknown("lights".into())))
        );
        assert_eq!(command_action("echo 'unbalanced"), None);
    }
}

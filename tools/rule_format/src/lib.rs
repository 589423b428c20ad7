//! Compiled rule types shared by the builder and the runtime.

use std::collections::BTreeMap;

use serde::Serialize;

pub mod template;

pub use template::{CommandTemplate, Field, TemplateError, TemplateFields};

pub const NOTE_OFF: u8 = 0x80;
pub const NOTE_ON: u8 = 0x90;
pub const POLY_PRESSURE: u8 = 0xA0;
pub const CONTROLLER_CHANGE: u8 = 0xB0;
pub const PROGRAM_CHANGE: u8 = 0xC0;
pub const CHANNEL_PRESSURE: u8 = 0xD0;
pub const PITCH_BEND: u8 = 0xE0;

/// First status byte value that carries no channel nibble.
pub const SYSTEM_STATUS_THRESHOLD: u8 = 0xF0;

/// Channel voice message categories addressable by keyword in configs.
#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    NoteOn,
    NoteOff,
    ProgramChange,
    ControllerChange,
    PitchBend,
    PolyPressure,
    ChannelPressure,
}

impl MessageType {
    pub const ALL: [MessageType; 7] = [
        MessageType::NoteOn,
        MessageType::NoteOff,
        MessageType::ProgramChange,
        MessageType::ControllerChange,
        MessageType::PitchBend,
        MessageType::PolyPressure,
        MessageType::ChannelPressure,
    ];

    /// Looks up a config keyword, ignoring case and surrounding whitespace.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        let keyword = keyword.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|ty| ty.keyword() == keyword)
    }

    pub fn keyword(self) -> &'static str {
        match self {
            MessageType::NoteOn => "noteon",
            MessageType::NoteOff => "noteoff",
            MessageType::ProgramChange => "programchange",
            MessageType::ControllerChange => "controllerchange",
            MessageType::PitchBend => "pitchbend",
            MessageType::PolyPressure => "polypressure",
            MessageType::ChannelPressure => "channelpressure",
        }
    }

    pub fn code(self) -> u8 {
        match self {
            MessageType::NoteOn => NOTE_ON,
            MessageType::NoteOff => NOTE_OFF,
            MessageType::ProgramChange => PROGRAM_CHANGE,
            MessageType::ControllerChange => CONTROLLER_CHANGE,
            MessageType::PitchBend => PITCH_BEND,
            MessageType::PolyPressure => POLY_PRESSURE,
            MessageType::ChannelPressure => CHANNEL_PRESSURE,
        }
    }
}

/// Status a rule listens for.
#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum StatusSelector {
    Known(MessageType),
    /// Raw status byte, usually a system message (>= 0xF0).
    Raw(u8),
}

impl StatusSelector {
    pub fn code(self) -> u8 {
        match self {
            StatusSelector::Known(ty) => ty.code(),
            StatusSelector::Raw(code) => code,
        }
    }
}

/// Constraint on the data bytes following the status byte.
#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "snake_case")]
pub enum DataFilter {
    #[default]
    Any,
    Single(u8),
    Pair(u8, u8),
}

/// In-process targets reachable with `internal <target>` commands.
#[derive(Debug, Serialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "snake_case")]
pub enum InternalTarget {
    Camera,
    Unknown(String),
}

impl InternalTarget {
    pub fn from_name(name: Option<&str>) -> Self {
        match name {
            Some("camera") => InternalTarget::Camera,
            Some(other) => InternalTarget::Unknown(other.to_string()),
            None => InternalTarget::Unknown(String::new()),
        }
    }
}

/// Execution path selected for a rule when it was compiled.
#[derive(Debug, Serialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    External,
    Internal(InternalTarget),
}

/// A compiled rule ready for matching at runtime.
#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct Rule {
    pub name: String,
    pub description: String,
    pub status: StatusSelector,
    /// 1-based MIDI channel; `None` matches every channel.
    pub channel: Option<u8>,
    pub data: DataFilter,
    pub command: CommandTemplate,
    pub action: RuleAction,
}

/// Rules bucketed by status code, each bucket in configuration order.
#[derive(Debug, Serialize, PartialEq, Clone, Default)]
pub struct RuleTable {
    buckets: BTreeMap<u8, Vec<Rule>>,
}

impl RuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, rule: Rule) {
        self.buckets
            .entry(rule.status.code())
            .or_default()
            .push(rule);
    }

    /// Rules registered for `status`, or `None` when no bucket exists.
    pub fn bucket(&self, status: u8) -> Option<&[Rule]> {
        self.buckets.get(&status).map(Vec::as_slice)
    }

    pub fn buckets(&self) -> impl Iterator<Item = (u8, &[Rule])> {
        self.buckets
            .iter()
            .map(|(status, rules)| (*status, rules.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

impl FromIterator<Rule> for RuleTable {
    fn from_iter<I: IntoIterator<Item = Rule>>(iter: I) -> Self {
        let mut table = RuleTable::new();
        for rule in iter {
            table.push(rule);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(name: &str, status: StatusSelector) -> Rule {
        Rule {
            name: name.into(),
            description: String::new(),
            status,
            channel: None,
            data: DataFilter::Any,
            command: CommandTemplate::parse("echo hi").expect("template"),
            action: RuleAction::External,
        }
    }

    #[test]
    fn keywords_resolve_case_insensitively() {
        assert_eq!(
            MessageType::from_keyword("  ProgramChange "),
            Some(MessageType::ProgramChange)
        );
        assert_eq!(MessageType::from_keyword("sysex"), None);
        for ty in MessageType::ALL {
            assert_eq!(MessageType::from_keyword(ty.keyword()), Some(ty));
        }
    }

    #[test]
    fn table_keeps_insertion_order_per_status() {
        let table: RuleTable = vec![
            rule("first", StatusSelector::Known(MessageType::ControllerChange)),
            rule("clock", StatusSelector::Raw(0xF8)),
            rule("second", StatusSelector::Raw(CONTROLLER_CHANGE)),
        ]
        .into_iter()
        .collect();

        assert_eq!(table.len(), 3);
        let names: Vec<_> = table
            .bucket(CONTROLLER_CHANGE)
            .expect("bucket")
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(names, vec!["first", "second"]);
        assert_eq!(table.bucket(0xF8).map(<[Rule]>::len), Some(1));
        assert!(table.bucket(NOTE_ON).is_none());
    }

    #[test]
    fn table_serializes_for_inspection() {
        let table: RuleTable = vec![rule("pc", StatusSelector::Known(MessageType::ProgramChange))]
            .into_iter()
            .collect();
        let yaml = serde_yaml::to_string(&table).expect("serialize");
        assert!(yaml.contains("programchange"));
        assert!(yaml.contains("echo hi"));
    }
}

//! printf-style command templates with named placeholders.
//!
//! A template such as `plaympeg %(data1)03i-playback.mp3` is parsed once when
//! the rule table is built and rendered for every matching event. Only the
//! four event fields can be referenced. A placeholder whose field is absent
//! (the channel of a system message, a data byte the message did not carry)
//! renders as an empty string whatever its width or flags.

use std::fmt::Write as _;

use serde::{Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unterminated placeholder name starting at offset {offset}")]
    UnterminatedName { offset: usize },
    #[error("placeholder at offset {offset} must be named, e.g. %(data1)i")]
    UnnamedPlaceholder { offset: usize },
    #[error("unknown placeholder `{name}` (expected channel, data1, data2 or status)")]
    UnknownField { name: String },
    #[error("unsupported conversion `{conversion}` at offset {offset}")]
    UnsupportedConversion { conversion: char, offset: usize },
    #[error("placeholder at offset {offset} is missing a conversion character")]
    MissingConversion { offset: usize },
}

/// Event fields a template may reference.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Field {
    Channel,
    Data1,
    Data2,
    Status,
}

impl Field {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "channel" => Some(Field::Channel),
            "data1" => Some(Field::Data1),
            "data2" => Some(Field::Data2),
            "status" => Some(Field::Status),
            _ => None,
        }
    }
}

/// Values substituted into a template for one event.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct TemplateFields {
    pub status: u8,
    pub channel: Option<u8>,
    pub data1: Option<u8>,
    pub data2: Option<u8>,
}

impl TemplateFields {
    fn get(&self, field: Field) -> Option<u8> {
        match field {
            Field::Channel => self.channel,
            Field::Data1 => self.data1,
            Field::Data2 => self.data2,
            Field::Status => Some(self.status),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum Conversion {
    Decimal,
    Octal,
    HexLower,
    HexUpper,
    Char,
    Str,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
struct Flags {
    left: bool,
    zero: bool,
    plus: bool,
    space: bool,
    alternate: bool,
}

#[derive(Debug, PartialEq, Eq, Clone)]
struct Placeholder {
    field: Field,
    flags: Flags,
    width: Option<usize>,
    precision: Option<usize>,
    conversion: Conversion,
}

#[derive(Debug, PartialEq, Eq, Clone)]
enum Segment {
    Literal(String),
    Placeholder(Placeholder),
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct CommandTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl CommandTemplate {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.char_indices().peekable();

        while let Some((offset, ch)) = chars.next() {
            if ch != '%' {
                literal.push(ch);
                continue;
            }
            match chars.peek() {
                Some((_, '%')) => {
                    chars.next();
                    literal.push('%');
                    continue;
                }
                Some((_, '(')) => {
                    chars.next();
                }
                _ => return Err(TemplateError::UnnamedPlaceholder { offset }),
            }

            let mut name = String::new();
            loop {
                match chars.next() {
                    Some((_, ')')) => break,
                    Some((_, c)) => name.push(c),
                    None => return Err(TemplateError::UnterminatedName { offset }),
                }
            }
            let field = Field::from_name(&name).ok_or(TemplateError::UnknownField { name })?;

            let mut flags = Flags::default();
            while let Some(&(_, c)) = chars.peek() {
                match c {
                    '-' => flags.left = true,
                    '0' => flags.zero = true,
                    '+' => flags.plus = true,
                    ' ' => flags.space = true,
                    '#' => flags.alternate = true,
                    _ => break,
                }
                chars.next();
            }

            let width = take_number(&mut chars);
            let precision = match chars.peek() {
                Some((_, '.')) => {
                    chars.next();
                    Some(take_number(&mut chars).unwrap_or(0))
                }
                _ => None,
            };
            // Length modifiers carry no meaning for byte-sized values.
            while matches!(chars.peek(), Some((_, 'h' | 'l' | 'L'))) {
                chars.next();
            }

            let conversion = match chars.next() {
                Some((_, 'd' | 'i' | 'u')) => Conversion::Decimal,
                Some((_, 'o')) => Conversion::Octal,
                Some((_, 'x')) => Conversion::HexLower,
                Some((_, 'X')) => Conversion::HexUpper,
                Some((_, 'c')) => Conversion::Char,
                Some((_, 's' | 'r')) => Conversion::Str,
                Some((at, conversion)) => {
                    return Err(TemplateError::UnsupportedConversion {
                        conversion,
                        offset: at,
                    });
                }
                None => return Err(TemplateError::MissingConversion { offset }),
            };

            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Placeholder(Placeholder {
                field,
                flags,
                width,
                precision,
                conversion,
            }));
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Fields referenced by the template, in order of appearance.
    pub fn fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Placeholder(p) => Some(p.field),
            Segment::Literal(_) => None,
        })
    }

    pub fn render(&self, fields: &TemplateFields) -> String {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(p) => {
                    if let Some(value) = fields.get(p.field) {
                        out.push_str(&format_value(value, p));
                    }
                }
            }
        }
        out
    }
}

impl Serialize for CommandTemplate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

fn take_number<I>(chars: &mut std::iter::Peekable<I>) -> Option<usize>
where
    I: Iterator<Item = (usize, char)>,
{
    let mut value: Option<usize> = None;
    while let Some(&(_, c)) = chars.peek() {
        let Some(digit) = c.to_digit(10) else { break };
        value = Some(value.unwrap_or(0).saturating_mul(10).saturating_add(digit as usize));
        chars.next();
    }
    value
}

fn format_value(value: u8, p: &Placeholder) -> String {
    let numeric = !matches!(p.conversion, Conversion::Char | Conversion::Str);

    let mut digits = match p.conversion {
        Conversion::Decimal | Conversion::Str => value.to_string(),
        Conversion::Octal => format!("{value:o}"),
        Conversion::HexLower => format!("{value:x}"),
        Conversion::HexUpper => format!("{value:X}"),
        Conversion::Char => char::from(value).to_string(),
    };
    match (numeric, p.precision) {
        (true, Some(precision)) if digits.len() < precision => {
            digits = format!("{}{digits}", "0".repeat(precision - digits.len()));
        }
        (false, Some(precision)) if p.conversion == Conversion::Str => {
            digits = digits.chars().take(precision).collect();
        }
        _ => {}
    }

    let mut prefix = String::new();
    if numeric {
        if p.flags.plus {
            prefix.push('+');
        } else if p.flags.space {
            prefix.push(' ');
        }
        if p.flags.alternate {
            prefix.push_str(match p.conversion {
                Conversion::Octal => "0o",
                Conversion::HexLower => "0x",
                Conversion::HexUpper => "0X",
                _ => "",
            });
        }
    }

    let len = prefix.chars().count() + digits.chars().count();
    let pad = p.width.unwrap_or(0).saturating_sub(len);
    let mut out = String::with_capacity(len + pad);
    if p.flags.left {
        let _ = write!(out, "{prefix}{digits}{}", " ".repeat(pad));
    } else if p.flags.zero && numeric {
        let _ = write!(out, "{prefix}{}{digits}", "0".repeat(pad));
    } else {
        let _ = write!(out, "{}{prefix}{digits}", " ".repeat(pad));
    }
    out
}

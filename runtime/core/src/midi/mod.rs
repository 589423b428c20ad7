//! Raw MIDI message decoding.

use std::time::{SystemTime, UNIX_EPOCH};

use rule_format::{TemplateFields, SYSTEM_STATUS_THRESHOLD};

pub mod input;

/// One message as delivered by the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMidiEvent {
    pub bytes: Vec<u8>,
    /// Seconds since the previous message on the same port.
    pub delta: f64,
}

/// Logical fields of a message. Only the first two data bytes are kept.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodedEvent {
    pub status: u8,
    /// 1-based channel, absent for system messages.
    pub channel: Option<u8>,
    pub data1: Option<u8>,
    pub data2: Option<u8>,
    /// Accumulated wall clock in seconds; diagnostic only.
    pub timestamp: f64,
}

impl DecodedEvent {
    pub fn from_bytes(bytes: &[u8], timestamp: f64) -> Option<Self> {
        let (&first, data) = bytes.split_first()?;
        let (status, channel) = if first < SYSTEM_STATUS_THRESHOLD {
            (first & 0xF0, Some((first & 0x0F) + 1))
        } else {
            (first, None)
        };
        Some(Self {
            status,
            channel,
            data1: data.first().copied(),
            data2: data.get(1).copied(),
            timestamp,
        })
    }

    pub fn has_data(&self) -> bool {
        self.data1.is_some()
    }

    pub fn template_fields(&self) -> TemplateFields {
        TemplateFields {
            status: self.status,
            channel: self.channel,
            data1: self.data1,
            data2: self.data2,
        }
    }
}

/// Turns raw events into [`DecodedEvent`]s while keeping a running clock.
#[derive(Debug)]
pub struct EventDecoder {
    wallclock: f64,
}

impl Default for EventDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDecoder {
    pub fn new() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        Self::starting_at(now)
    }

    pub fn starting_at(wallclock: f64) -> Self {
        Self { wallclock }
    }

    pub fn wallclock(&self) -> f64 {
        self.wallclock
    }

    /// Advances the clock by `delta` and decodes `bytes`. Empty input yields
    /// `None` but still advances the clock.
    pub fn decode(&mut self, bytes: &[u8], delta: f64) -> Option<DecodedEvent> {
        if delta.is_finite() && delta > 0.0 {
            self.wallclock += delta;
        }
        DecodedEvent::from_bytes(bytes, self.wallclock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_presence_follows_length() {
        let one = DecodedEvent::from_bytes(&[0xF8], 0.0).expect("event");
        assert_eq!((one.data1, one.data2), (None, None));
        assert!(!one.has_data());

        let two = DecodedEvent::from_bytes(&[0xC3, 5], 0.0).expect("event");
        assert_eq!((two.data1, two.data2), (Some(5), None));

        let three = DecodedEvent::from_bytes(&[0x90, 60, 100], 0.0).expect("event");
        assert_eq!((three.data1, three.data2), (Some(60), Some(100)));

        let long = DecodedEvent::from_bytes(&[0xF0, 0x7E, 0x7F, 0x06, 0x01, 0xF7], 0.0)
            .expect("event");
        assert_eq!((long.data1, long.data2), (Some(0x7E), Some(0x7F)));
    }

    #[test]
    fn channel_messages_split_status_and_channel() {
        for category in (0x80u8..0xF0).step_by(16) {
            for nibble in 0u8..16 {
                let event = DecodedEvent::from_bytes(&[category | nibble, 1, 2], 0.0)
                    .expect("event");
                assert_eq!(event.status, category);
                assert_eq!(event.channel, Some(nibble + 1));
            }
        }
    }

    #[test]
    fn system_messages_have_no_channel() {
        for status in 0xF0u8..=0xFF {
            let event = DecodedEvent::from_bytes(&[status], 0.0).expect("event");
            assert_eq!(event.status, status);
            assert_eq!(event.channel, None);
        }
    }

    #[test]
    fn empty_input_is_not_an_event() {
        assert!(DecodedEvent::from_bytes(&[], 0.0).is_none());
    }

    #[test]
    fn decoder_accumulates_deltas() {
        let mut decoder = EventDecoder::starting_at(100.0);
        let first = decoder.decode(&[0x90, 60, 1], 0.5).expect("event");
        assert!((first.timestamp - 100.5).abs() < 1e-9);
        assert!(decoder.decode(&[], 0.25).is_none());
        let second = decoder.decode(&[0x80, 60, 0], 0.25).expect("event");
        assert!((second.timestamp - 101.0).abs() < 1e-9);
        assert!((decoder.wallclock() - 101.0).abs() < 1e-9);
    }
}

//! Rule selection for decoded events.

use rule_format::{DataFilter, Rule, RuleTable};

use crate::midi::DecodedEvent;

/// Every rule of the event's status bucket whose filters pass, in table
/// order. All of them fire; order only decides firing order.
pub fn matching_rules<'a>(
    table: &'a RuleTable,
    event: &'a DecodedEvent,
) -> impl Iterator<Item = &'a Rule> + 'a {
    table
        .bucket(event.status)
        .unwrap_or_default()
        .iter()
        .filter(move |rule| rule_matches(rule, event))
}

pub fn rule_matches(rule: &Rule, event: &DecodedEvent) -> bool {
    channel_matches(rule.channel, event.channel) && data_matches(rule.data, event)
}

fn channel_matches(rule_channel: Option<u8>, event_channel: Option<u8>) -> bool {
    match (rule_channel, event_channel) {
        (Some(wanted), Some(actual)) => wanted == actual,
        _ => true,
    }
}

fn data_matches(filter: DataFilter, event: &DecodedEvent) -> bool {
    if !event.has_data() {
        return true;
    }
    match filter {
        DataFilter::Any => true,
        DataFilter::Single(value) => event.data1 == Some(value),
        DataFilter::Pair(first, second) => {
            event.data1 == Some(first) && event.data2 == Some(second)
        }
    }
}

//! Ingress adapter between the chat bot and the message buffer.
//!
//! The bot hands over raw decimal identifiers (or a small JSON object). They
//! are validated here so malformed input never reaches the buffer.

use serde::{Deserialize, Serialize};
use tracing::debug;

use engage_core::{Error, Event, Result};

use crate::buffer::{Admission, MessageBuffer};

/// Outcome reported back to the bot for one message event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitOutcome {
    Accepted,
    InvalidFormat,
    DroppedOverflow,
    DroppedClosed,
}

impl From<Admission> for SubmitOutcome {
    fn from(admission: Admission) -> Self {
        match admission {
            Admission::Accepted => SubmitOutcome::Accepted,
            Admission::Overflow => SubmitOutcome::DroppedOverflow,
            Admission::Closed => SubmitOutcome::DroppedClosed,
        }
    }
}

/// Largest id the counter tables can store (`BIGINT`).
pub const MAX_PLATFORM_ID: u64 = i64::MAX as u64;

/// Parse a platform identifier: non-empty ASCII digits, non-zero, at most
/// [`MAX_PLATFORM_ID`].
pub fn parse_platform_id(raw: &str, field: &str) -> Result<u64> {
    if raw.is_empty() {
        return Err(Error::InvalidEventFormat(format!("{} is empty", field)));
    }
    if !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidEventFormat(format!(
            "{} '{}' is not a decimal id",
            field, raw
        )));
    }
    let id: u64 = raw.parse().map_err(|_| {
        Error::InvalidEventFormat(format!("{} '{}' does not fit in 64 bits", field, raw))
    })?;
    check_range(id, field)
}

fn check_range(id: u64, field: &str) -> Result<u64> {
    if id == 0 {
        return Err(Error::InvalidEventFormat(format!("{} must be non-zero", field)));
    }
    if id > MAX_PLATFORM_ID {
        return Err(Error::InvalidEventFormat(format!(
            "{} {} exceeds the storable range",
            field, id
        )));
    }
    Ok(id)
}

/// Build an event from raw user and channel ids.
pub fn parse_event(raw_user: &str, raw_channel: &str) -> Result<Event> {
    Ok(Event::new(
        parse_platform_id(raw_user, "discord_id")?,
        parse_platform_id(raw_channel, "channel_id")?,
    ))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(u64),
    Text(String),
}

impl RawId {
    fn into_id(self, field: &str) -> Result<u64> {
        match self {
            RawId::Number(id) => check_range(id, field),
            RawId::Text(raw) => parse_platform_id(&raw, field),
        }
    }
}

#[derive(Deserialize)]
struct RawEvent {
    discord_id: RawId,
    channel_id: RawId,
}

/// Parse `{"discord_id": .., "channel_id": ..}`; ids may be numbers or
/// decimal strings.
pub fn parse_event_json(input: &str) -> Result<Event> {
    let raw: RawEvent = serde_json::from_str(input)
        .map_err(|e| Error::InvalidEventFormat(format!("malformed event JSON: {}", e)))?;
    Ok(Event::new(
        raw.discord_id.into_id("discord_id")?,
        raw.channel_id.into_id("channel_id")?,
    ))
}

/// Validate raw ids and submit the event.
pub fn submit_message_event(
    buffer: &MessageBuffer,
    raw_user: &str,
    raw_channel: &str,
) -> SubmitOutcome {
    submit_parsed(buffer, parse_event(raw_user, raw_channel))
}

/// Validate a JSON event and submit it.
pub fn submit_json_event(buffer: &MessageBuffer, input: &str) -> SubmitOutcome {
    submit_parsed(buffer, parse_event_json(input))
}

fn submit_parsed(buffer: &MessageBuffer, parsed: Result<Event>) -> SubmitOutcome {
    match parsed {
        Ok(event) => buffer.submit(event).into(),
        Err(e) => {
            debug!(
                subsystem = "ingress",
                component = "message_event",
                error = %e,
                "Rejected malformed message event"
            );
            SubmitOutcome::InvalidFormat
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_ids() {
        let event = parse_event("123456789012345678", "42").unwrap();
        assert_eq!(event, Event::new(123_456_789_012_345_678, 42));
    }

    #[test]
    fn test_parse_rejects_bad_ids() {
        for raw in [
            "",
            "abc",
            "-5",
            "1.5",
            " 7",
            "0",
            "9223372036854775808",
            "18446744073709551615",
            "18446744073709551616",
        ] {
            assert!(
                matches!(parse_platform_id(raw, "discord_id"), Err(Error::InvalidEventFormat(_))),
                "accepted {:?}",
                raw
            );
        }
        assert_eq!(
            parse_platform_id("9223372036854775807", "channel_id").unwrap(),
            MAX_PLATFORM_ID
        );
        assert!(matches!(
            parse_event("10", "18446744073709551615"),
            Err(Error::InvalidEventFormat(_))
        ));
    }

    #[test]
    fn test_parse_json_numbers_and_strings() {
        let event = parse_event_json(r#"{"discord_id": 7, "channel_id": "100"}"#).unwrap();
        assert_eq!(event, Event::new(7, 100));

        let event =
            parse_event_json(r#"{"discord_id": "900000000000000001", "channel_id": 3}"#).unwrap();
        assert_eq!(event, Event::new(900_000_000_000_000_001, 3));
    }

    #[test]
    fn test_parse_json_rejects_bad_input() {
        for input in [
            "not json",
            r#"{"discord_id": 7}"#,
            r#"{"discord_id": 0, "channel_id": 1}"#,
            r#"{"discord_id": -1, "channel_id": 1}"#,
            r#"{"discord_id": "x", "channel_id": 1}"#,
            r#"{"discord_id": 7, "channel_id": 18446744073709551615}"#,
            r#"{"discord_id": 9223372036854775808, "channel_id": 1}"#,
        ] {
            assert!(
                matches!(parse_event_json(input), Err(Error::InvalidEventFormat(_))),
                "accepted {}",
                input
            );
        }
    }

    #[test]
    fn test_admission_maps_to_outcome() {
        assert_eq!(SubmitOutcome::from(Admission::Accepted), SubmitOutcome::Accepted);
        assert_eq!(
            SubmitOutcome::from(Admission::Overflow),
            SubmitOutcome::DroppedOverflow
        );
        assert_eq!(
            SubmitOutcome::from(Admission::Closed),
            SubmitOutcome::DroppedClosed
        );
    }

    #[test]
    fn test_outcome_serializes_snake_case() {
        let json = serde_json::to_string(&SubmitOutcome::DroppedOverflow).unwrap();
        assert_eq!(json, "\"dropped_overflow\"");
    }
}

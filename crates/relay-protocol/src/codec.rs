//! JSON codec for relay events.
//!
//! Inbound frames are decoded in two steps: the envelope first, then only the
//! routing fields of `data`. Payload fields stay raw so forwarding never
//! reorders keys or drops fields the relay does not know about.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::value::RawValue;
use thiserror::Error;

use crate::events::{names, InboundEvent, OutboundEvent, Payload};

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Malformed JSON or a missing routing field.
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Event name the relay does not handle.
    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    /// Event arrived without a `data` field.
    #[error("Event {0} is missing data")]
    MissingData(&'static str),

    /// Binary frame that is not UTF-8 text.
    #[error("Frame is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),
}

#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Option<Payload>,
}

/// Channel id given either bare (`"general"`) or as `{"channelId": "general"}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum ChannelArg {
    Bare(String),
    Object {
        #[serde(rename = "channelId")]
        channel_id: String,
    },
}

impl ChannelArg {
    fn into_id(self) -> String {
        match self {
            Self::Bare(id) | Self::Object { channel_id: id } => id,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelTarget {
    channel_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceiverTarget {
    receiver_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelMessageData {
    channel_id: String,
    #[serde(default)]
    message: Option<Payload>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DirectMessageData {
    receiver_id: String,
    #[serde(default)]
    message: Option<Payload>,
}

/// Payload to forward in place of an absent `message`.
fn message_or_null(message: Option<Payload>) -> Result<Payload, ProtocolError> {
    match message {
        Some(message) => Ok(message),
        None => Ok(RawValue::from_string("null".to_string())?),
    }
}

fn parse<T: DeserializeOwned>(data: &RawValue) -> Result<T, ProtocolError> {
    Ok(serde_json::from_str(data.get())?)
}

/// Decode an inbound text frame.
///
/// # Errors
///
/// Returns an error if the frame is not a known event envelope or if the
/// routing fields of its data cannot be read.
pub fn decode(text: &str) -> Result<InboundEvent, ProtocolError> {
    let envelope: Envelope = serde_json::from_str(text)?;
    let name = known_event(&envelope.event)?;
    let data = envelope.data.ok_or(ProtocolError::MissingData(name))?;

    let event = match name {
        names::JOIN_CHANNEL => InboundEvent::JoinChannel {
            channel_id: parse::<ChannelArg>(&data)?.into_id(),
        },
        names::LEAVE_CHANNEL => InboundEvent::LeaveChannel {
            channel_id: parse::<ChannelArg>(&data)?.into_id(),
        },
        names::SEND_CHANNEL_MESSAGE => {
            let body: ChannelMessageData = parse(&data)?;
            InboundEvent::ChannelMessage {
                channel_id: body.channel_id,
                message: message_or_null(body.message)?,
            }
        }
        names::SEND_DIRECT_MESSAGE => {
            let body: DirectMessageData = parse(&data)?;
            InboundEvent::DirectMessage {
                receiver_id: body.receiver_id,
                message: message_or_null(body.message)?,
            }
        }
        names::TYPING_START | names::TYPING_STOP => InboundEvent::Typing {
            channel_id: parse::<ChannelTarget>(&data)?.channel_id,
            active: name == names::TYPING_START,
            data,
        },
        names::DM_TYPING_START | names::DM_TYPING_STOP => InboundEvent::DmTyping {
            receiver_id: parse::<ReceiverTarget>(&data)?.receiver_id,
            active: name == names::DM_TYPING_START,
            data,
        },
        _ => InboundEvent::StatusUpdate {
            status: parse(&data)?,
        },
    };

    Ok(event)
}

/// Decode an inbound binary frame holding UTF-8 JSON.
///
/// # Errors
///
/// Returns an error if the bytes are not UTF-8 or fail [`decode`].
pub fn decode_bytes(data: &[u8]) -> Result<InboundEvent, ProtocolError> {
    decode(std::str::from_utf8(data)?)
}

fn known_event(name: &str) -> Result<&'static str, ProtocolError> {
    const KNOWN: [&str; 9] = [
        names::JOIN_CHANNEL,
        names::LEAVE_CHANNEL,
        names::SEND_CHANNEL_MESSAGE,
        names::SEND_DIRECT_MESSAGE,
        names::TYPING_START,
        names::TYPING_STOP,
        names::DM_TYPING_START,
        names::DM_TYPING_STOP,
        names::STATUS_UPDATE,
    ];
    KNOWN
        .into_iter()
        .find(|known| *known == name)
        .ok_or_else(|| ProtocolError::UnknownEvent(name.to_string()))
}

/// Encode an outbound event to JSON bytes.
///
/// The bytes are always valid UTF-8 and can be sent as a text frame.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode(event: &OutboundEvent) -> Result<Bytes, ProtocolError> {
    Ok(Bytes::from(serde_json::to_vec(event)?))
}

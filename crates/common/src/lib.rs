// ================
// common/src/lib.rs
// ================
//! Wire types shared by the meeting relay and its clients.
//!
//! Every signaling frame is a UTF-8 JSON object `{ "type": ..., "data": {...} }`.
//! The relay is permissive: anything that does not decode into an [`Envelope`]
//! becomes [`MessageType::Unknown`] and is ignored.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Identifier of a meeting, handed out by the relay at creation time
pub type MeetingId = String;

/// Caller-supplied identifier of a participant, unique within a meeting
pub type UserId = String;

/// Signaling message kinds, serialized as their kebab-case literal
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(from = "String", into = "String")]
pub enum MessageType {
    /// Client asks to join the meeting bound to its socket
    JoinMeeting,
    /// Relay confirms a join to the joining client
    JoinedMeeting,
    /// Relay tells existing participants about a new one
    UserJoined,
    /// One peer asks another to start negotiating
    ConnectionRequest,
    /// Reserved literal, never emitted by this relay
    IncomingConnectionRequest,
    /// SDP offer for a specific peer
    OfferSdp,
    /// SDP answer for a specific peer
    AnswerSdp,
    /// Client announces it is leaving
    LeaveMeeting,
    /// Client ends the meeting for everyone; also sent by the relay on expiry
    EndMeeting,
    /// Relay tells participants someone left
    UserLeft,
    /// Relay tells participants the meeting was ended by someone
    MeetingEnded,
    /// ICE candidate for a specific peer
    IceCandidate,
    VideoToggle,
    AudioToggle,
    /// Free-form chat message, relayed as is
    Message,
    /// Liveness ping from a client
    Heartbeat,
    /// Meeting bound to the socket does not exist
    NotFound,
    /// Anything unparseable or unrecognised
    Unknown,
}

impl MessageType {
    /// The literal used on the wire
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::JoinMeeting => "join-meeting",
            Self::JoinedMeeting => "joined-meeting",
            Self::UserJoined => "user-joined",
            Self::ConnectionRequest => "connection-request",
            Self::IncomingConnectionRequest => "incoming-connection-request",
            Self::OfferSdp => "offer-sdp",
            Self::AnswerSdp => "answer-sdp",
            Self::LeaveMeeting => "leave-meeting",
            Self::EndMeeting => "end-meeting",
            Self::UserLeft => "user-left",
            Self::MeetingEnded => "meeting-ended",
            Self::IceCandidate => "icecandidate",
            Self::VideoToggle => "video-toggle",
            Self::AudioToggle => "audio-toggle",
            Self::Message => "message",
            Self::Heartbeat => "heartbeat",
            Self::NotFound => "not-found",
            Self::Unknown => "unknown",
        }
    }

    /// Map a wire literal to its kind; unrecognised literals become `Unknown`
    pub fn parse(literal: &str) -> Self {
        match literal {
            "join-meeting" => Self::JoinMeeting,
            "joined-meeting" => Self::JoinedMeeting,
            "user-joined" => Self::UserJoined,
            "connection-request" => Self::ConnectionRequest,
            "incoming-connection-request" => Self::IncomingConnectionRequest,
            "offer-sdp" => Self::OfferSdp,
            "answer-sdp" => Self::AnswerSdp,
            "leave-meeting" => Self::LeaveMeeting,
            "end-meeting" => Self::EndMeeting,
            "user-left" => Self::UserLeft,
            "meeting-ended" => Self::MeetingEnded,
            "icecandidate" => Self::IceCandidate,
            "video-toggle" => Self::VideoToggle,
            "audio-toggle" => Self::AudioToggle,
            "message" => Self::Message,
            "heartbeat" => Self::Heartbeat,
            "not-found" => Self::NotFound,
            _ => Self::Unknown,
        }
    }
}

impl From<String> for MessageType {
    fn from(literal: String) -> Self {
        Self::parse(&literal)
    }
}

impl From<MessageType> for String {
    fn from(kind: MessageType) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single signaling frame
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Message kind
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// Kind-specific payload; always a JSON object when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
}

impl Envelope {
    /// Envelope without a payload
    pub fn new(kind: MessageType) -> Self {
        Self { kind, data: None }
    }

    /// Envelope carrying `data`
    pub fn with_data(kind: MessageType, data: Map<String, Value>) -> Self {
        Self {
            kind,
            data: Some(data),
        }
    }

    /// Envelope whose payload is just `{ "userId": ... }`
    pub fn for_user(kind: MessageType, user_id: &str) -> Self {
        let mut data = Map::new();
        data.insert("userId".to_string(), Value::String(user_id.to_string()));
        Self::with_data(kind, data)
    }

    /// The sentinel produced for frames that cannot be understood
    pub fn unknown() -> Self {
        Self::new(MessageType::Unknown)
    }

    /// Decode a text frame. Never fails: malformed input, non-object payloads
    /// and unrecognised types all come back as [`MessageType::Unknown`].
    pub fn decode(text: &str) -> Self {
        serde_json::from_str(text).unwrap_or_else(|_| Self::unknown())
    }

    /// Encode for the wire
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Interpret the payload as `T`. A missing payload is treated as `{}`.
    pub fn payload<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_value(Value::Object(self.data.clone().unwrap_or_default()))
    }

    /// The raw payload object, empty when absent
    pub fn data_or_empty(&self) -> Map<String, Value> {
        self.data.clone().unwrap_or_default()
    }
}

/// Payload of `join-meeting`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub user_id: UserId,
    #[serde(default)]
    pub name: Option<String>,
}

/// Payload of the peer-directed messages: `connection-request`, `offer-sdp`,
/// `answer-sdp` and `icecandidate`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PeerSignal {
    /// Sender, as claimed by the client
    pub user_id: UserId,
    /// Recipient
    pub other_user_id: UserId,
    #[serde(default)]
    pub name: Option<String>,
    /// Opaque session description
    #[serde(default)]
    pub sdp: Option<Value>,
    /// Opaque ICE candidate
    #[serde(default)]
    pub candidate: Option<Value>,
}

/// Payload that only names a user: `leave-meeting`, `end-meeting` and the
/// generic relays
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
    pub user_id: UserId,
}

/// Public metadata of a meeting. Never carries participants.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MeetingInfo {
    pub id: MeetingId,
    pub host_id: UserId,
    pub host_name: String,
    /// Creation time, milliseconds since the Unix epoch on the wire
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub start_time: DateTime<Utc>,
}

/// Body of `POST /meeting/start`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StartMeetingRequest {
    /// Display name of the host
    pub name: String,
    pub user_id: UserId,
}

/// Response of `POST /meeting/start`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StartMeetingResponse {
    pub meeting_id: MeetingId,
}

// ==================
// crates/backend-lib/src/hub.rs
// ==================
//! Signaling Hub
//!
//! Routes decoded signaling frames between the participants of a meeting.
//!
//! - `join-meeting` registers the sender's connection in the registry
//! - peer-directed messages (`connection-request`, `offer-sdp`, `answer-sdp`,
//!   `icecandidate`) go to exactly one other participant
//! - announcements (`leave-meeting`, `end-meeting`, toggles, chat) go to
//!   every other participant
//! - `heartbeat` confirms the sender is alive for the next sweep
//!
//! Delivery is at most once. A recipient that is absent, closed or too slow
//! simply misses the frame; nothing is reported back to the sender.
//! Frames the hub cannot make sense of are dropped the same way.

use crate::connection::{ConnectionHandle, ConnectionId};
use crate::error::AppError;
use crate::metrics::{MEETING_ENDED, SIGNAL_RELAYED};
use crate::registry::MeetingRegistry;
use axum::extract::Query;
use axum::http::Uri;
use meeting_relay_common::{
    Envelope, JoinRequest, MeetingId, MessageType, PeerSignal, UserRef,
};
use metrics::counter;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Per-connection context bound when the socket is accepted
#[derive(Clone, Debug)]
pub struct Session {
    meeting_id: Option<MeetingId>,
    connection: ConnectionHandle,
}

impl Session {
    pub fn new(meeting_id: Option<MeetingId>, connection: ConnectionHandle) -> Self {
        Self {
            meeting_id,
            connection,
        }
    }

    pub fn meeting_id(&self) -> Option<&str> {
        self.meeting_id.as_deref()
    }

    pub fn connection(&self) -> &ConnectionHandle {
        &self.connection
    }

    fn bound_meeting(&self) -> Result<&str, AppError> {
        self.meeting_id()
            .ok_or_else(|| AppError::MeetingNotFound("no meeting bound to connection".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct ConnectParams {
    #[serde(default)]
    id: Option<String>,
}

/// Meeting identifier carried in the `id` query parameter of the upgrade
/// request. Missing, empty or unparseable queries yield `None`.
pub fn meeting_id_from_uri(uri: &Uri) -> Option<MeetingId> {
    let Query(params) = Query::<ConnectParams>::try_from_uri(uri).ok()?;
    params.id.filter(|id| !id.is_empty())
}

/// Message dispatcher shared by every connection task
#[derive(Clone, Debug)]
pub struct SignalingHub {
    registry: Arc<MeetingRegistry>,
}

impl SignalingHub {
    pub fn new(registry: Arc<MeetingRegistry>) -> Self {
        Self { registry }
    }

    #[cfg(test)]
    pub(crate) fn registry(&self) -> &Arc<MeetingRegistry> {
        &self.registry
    }

    /// # Handle one inbound text frame
    /// Decoding never fails; malformed frames become `unknown` and are
    /// ignored. Handler errors are logged and swallowed so that one
    /// misbehaving client cannot affect anyone else. All writes are
    /// non-blocking, so the frame is fully handled when this returns.
    pub fn dispatch(&self, session: &Session, text: &str) {
        let envelope = Envelope::decode(text);
        let kind = envelope.kind;
        if let Err(e) = self.handle_envelope(session, &envelope) {
            tracing::debug!(
                connection = %session.connection.id(),
                kind = %kind,
                "frame dropped: {}",
                e
            );
        }
    }

    fn handle_envelope(&self, session: &Session, envelope: &Envelope) -> Result<(), AppError> {
        match envelope.kind {
            MessageType::JoinMeeting => self.join_meeting(session, envelope),
            MessageType::ConnectionRequest => self.forward_connection_request(session, envelope),
            MessageType::OfferSdp | MessageType::AnswerSdp => self.forward_sdp(session, envelope),
            MessageType::IceCandidate => self.forward_ice_candidate(session, envelope),
            MessageType::LeaveMeeting => self.user_left(session, envelope),
            MessageType::EndMeeting => self.end_meeting(session, envelope),
            MessageType::VideoToggle | MessageType::AudioToggle | MessageType::Message => {
                self.relay_event(session, envelope)
            },
            MessageType::Heartbeat => {
                self.heartbeat(session);
                Ok(())
            },
            // unknown input and server-to-client kinds
            _ => Ok(()),
        }
    }

    fn join_meeting(&self, session: &Session, envelope: &Envelope) -> Result<(), AppError> {
        let Some(meeting_id) = session
            .meeting_id()
            .filter(|meeting_id| self.registry.exists(meeting_id))
        else {
            session.connection.send(&Envelope::new(MessageType::NotFound));
            return Ok(());
        };

        let request: JoinRequest = payload(envelope)?;
        // the meeting may have ended since the existence check
        if !self.registry.upsert_participant(
            meeting_id,
            &request.user_id,
            request.name.clone(),
            session.connection.clone(),
        ) {
            session.connection.send(&Envelope::new(MessageType::NotFound));
            return Ok(());
        }
        tracing::info!(meeting = %meeting_id, user = %request.user_id, "user joined meeting");

        session
            .connection
            .send(&Envelope::for_user(MessageType::JoinedMeeting, &request.user_id));

        let data = spread(&request.user_id, request.name.as_deref(), envelope.data_or_empty());
        self.broadcast_others(
            meeting_id,
            session.connection.id(),
            &Envelope::with_data(MessageType::UserJoined, data),
        );
        Ok(())
    }

    fn forward_connection_request(
        &self,
        session: &Session,
        envelope: &Envelope,
    ) -> Result<(), AppError> {
        let meeting_id = session.bound_meeting()?;
        let signal: PeerSignal = payload(envelope)?;
        let data = spread(&signal.user_id, signal.name.as_deref(), envelope.data_or_empty());
        self.send_to_user(
            meeting_id,
            &signal.other_user_id,
            &Envelope::with_data(MessageType::ConnectionRequest, data),
        )
    }

    /// `offer-sdp` and `answer-sdp` share a shape; the kind is preserved
    fn forward_sdp(&self, session: &Session, envelope: &Envelope) -> Result<(), AppError> {
        let meeting_id = session.bound_meeting()?;
        let signal: PeerSignal = payload(envelope)?;
        let mut data = user_data(&signal.user_id);
        if let Some(sdp) = signal.sdp {
            data.insert("sdp".to_string(), sdp);
        }
        self.send_to_user(
            meeting_id,
            &signal.other_user_id,
            &Envelope::with_data(envelope.kind, data),
        )
    }

    fn forward_ice_candidate(&self, session: &Session, envelope: &Envelope) -> Result<(), AppError> {
        let meeting_id = session.bound_meeting()?;
        let signal: PeerSignal = payload(envelope)?;
        let mut data = user_data(&signal.user_id);
        if let Some(candidate) = signal.candidate {
            data.insert("candidate".to_string(), candidate);
        }
        self.send_to_user(
            meeting_id,
            &signal.other_user_id,
            &Envelope::with_data(MessageType::IceCandidate, data),
        )
    }

    /// Announcement only. The record stays until its socket is found dead.
    fn user_left(&self, session: &Session, envelope: &Envelope) -> Result<(), AppError> {
        let meeting_id = session.bound_meeting()?;
        let user: UserRef = payload(envelope)?;
        self.broadcast_others(
            meeting_id,
            session.connection.id(),
            &Envelope::for_user(MessageType::UserLeft, &user.user_id),
        );
        Ok(())
    }

    fn end_meeting(&self, session: &Session, envelope: &Envelope) -> Result<(), AppError> {
        let meeting_id = session.bound_meeting()?;
        let user: UserRef = payload(envelope)?;
        let meeting = self
            .registry
            .delete_meeting(meeting_id)
            .ok_or_else(|| AppError::MeetingNotFound(meeting_id.to_string()))?;

        let ended = Envelope::for_user(MessageType::MeetingEnded, &user.user_id);
        let sender = session.connection.id();
        for participant in &meeting.participants {
            if participant.connection.id() != sender {
                participant.connection.send(&ended);
            }
        }
        for participant in &meeting.participants {
            participant.connection.close();
        }

        counter!(MEETING_ENDED).increment(1);
        tracing::info!(
            meeting = %meeting_id,
            user = %user.user_id,
            participants = meeting.participants.len(),
            "meeting ended by participant"
        );
        Ok(())
    }

    /// `video-toggle`, `audio-toggle` and `message`: relayed with their payload
    fn relay_event(&self, session: &Session, envelope: &Envelope) -> Result<(), AppError> {
        let meeting_id = session.bound_meeting()?;
        let user: UserRef = payload(envelope)?;
        let data = spread(&user.user_id, None, envelope.data_or_empty());
        self.broadcast_others(
            meeting_id,
            session.connection.id(),
            &Envelope::with_data(envelope.kind, data),
        );
        Ok(())
    }

    fn heartbeat(&self, session: &Session) {
        if let Some(meeting_id) = session.meeting_id() {
            self.registry.mark_alive(meeting_id, session.connection.id());
        }
    }

    /// Write to every participant except `sender`; closed connections are
    /// skipped. Returns how many frames were queued.
    fn broadcast_others(&self, meeting_id: &str, sender: ConnectionId, envelope: &Envelope) -> usize {
        self.registry
            .list_participants(meeting_id)
            .iter()
            .filter(|p| p.connection.id() != sender)
            .filter(|p| p.connection.send(envelope))
            .count()
    }

    fn send_to_user(&self, meeting_id: &str, user_id: &str, envelope: &Envelope) -> Result<(), AppError> {
        let stale = || AppError::StaleTarget {
            user_id: user_id.to_string(),
        };
        let target = self
            .registry
            .find_participant(meeting_id, user_id)
            .ok_or_else(stale)?;
        if !target.connection.send(envelope) {
            return Err(stale());
        }
        counter!(SIGNAL_RELAYED).increment(1);
        Ok(())
    }
}

fn payload<T: DeserializeOwned>(envelope: &Envelope) -> Result<T, AppError> {
    envelope
        .payload()
        .map_err(|e| AppError::MalformedMessage(format!("{}: {}", envelope.kind, e)))
}

fn user_data(user_id: &str) -> Map<String, Value> {
    let mut data = Map::new();
    data.insert("userId".to_string(), Value::String(user_id.to_string()));
    data
}

/// `{ userId, name, ...payload }`: payload keys win
fn spread(user_id: &str, name: Option<&str>, payload: Map<String, Value>) -> Map<String, Value> {
    let mut data = user_data(user_id);
    if let Some(name) = name {
        data.insert("name".to_string(), Value::String(name.to_string()));
    }
    data.extend(payload);
    data
}

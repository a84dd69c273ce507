// ============================
// meeting-relay-lib/src/registry.rs
// ============================
//! In-memory store of active meetings and their participants.
//!
//! Each meeting lives in its own `DashMap` entry; every read or write of a
//! participant list happens under that entry's shard lock, so readers never
//! observe a half-applied join or removal.
use crate::connection::{ConnectionHandle, ConnectionId};
use crate::error::AppError;
use crate::metrics::{MEETING_ACTIVE, MEETING_CREATED, PARTICIPANT_JOINED};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use meeting_relay_common::{MeetingId, MeetingInfo, UserId};
use metrics::{counter, gauge};
use uuid::Uuid;

/// A participant's record inside a meeting
#[derive(Clone, Debug)]
pub struct Participant {
    pub user_id: UserId,
    pub display_name: Option<String>,
    pub connection: ConnectionHandle,
    /// Set by `heartbeat`, cleared by every sweep
    pub alive: bool,
}

/// State of one meeting
#[derive(Debug)]
pub struct Meeting {
    id: MeetingId,
    host_id: UserId,
    host_name: String,
    start_time: DateTime<Utc>,
    /// In join order
    pub participants: Vec<Participant>,
}

impl Meeting {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn info(&self) -> MeetingInfo {
        MeetingInfo {
            id: self.id.clone(),
            host_id: self.host_id.clone(),
            host_name: self.host_name.clone(),
            start_time: self.start_time,
        }
    }
}

/// What a [`MeetingRegistry::for_each_meeting`] visitor wants done with the
/// meeting it just saw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    Keep,
    Remove,
}

/// Registry of all active meetings
#[derive(Debug, Default)]
pub struct MeetingRegistry {
    meetings: DashMap<MeetingId, Meeting>,
}

impl MeetingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty meeting hosted by `host_user_id` and return its id
    pub fn create_meeting(&self, host_name: &str, host_user_id: &str) -> MeetingId {
        self.create_meeting_at(host_name, host_user_id, Utc::now())
    }

    /// Create a meeting with an explicit start time
    pub fn create_meeting_at(
        &self,
        host_name: &str,
        host_user_id: &str,
        start_time: DateTime<Utc>,
    ) -> MeetingId {
        let id = Uuid::new_v4().to_string();
        let meeting = Meeting {
            id: id.clone(),
            host_id: host_user_id.to_string(),
            host_name: host_name.to_string(),
            start_time,
            participants: Vec::new(),
        };
        self.meetings.insert(id.clone(), meeting);

        counter!(MEETING_CREATED).increment(1);
        gauge!(MEETING_ACTIVE).set(self.meetings.len() as f64);
        tracing::info!(meeting = %id, host = %host_user_id, "meeting created");

        id
    }

    pub fn exists(&self, meeting_id: &str) -> bool {
        self.meetings.contains_key(meeting_id)
    }

    /// Host identity and start time of a meeting
    pub fn get_metadata(&self, meeting_id: &str) -> Result<MeetingInfo, AppError> {
        self.meetings
            .get(meeting_id)
            .map(|meeting| meeting.info())
            .ok_or_else(|| AppError::MeetingNotFound(meeting_id.to_string()))
    }

    /// Snapshot of the participants in join order; empty when the meeting is
    /// absent
    pub fn list_participants(&self, meeting_id: &str) -> Vec<Participant> {
        self.meetings
            .get(meeting_id)
            .map(|meeting| meeting.participants.clone())
            .unwrap_or_default()
    }

    pub fn find_participant(&self, meeting_id: &str, user_id: &str) -> Option<Participant> {
        let meeting = self.meetings.get(meeting_id)?;
        meeting
            .participants
            .iter()
            .find(|p| p.user_id == user_id)
            .cloned()
    }

    /// Insert a participant, or on rejoin swap in the new connection and name
    /// while keeping its join position. The previous connection is not
    /// closed here. Returns false, and does nothing, if the meeting is absent.
    pub fn upsert_participant(
        &self,
        meeting_id: &str,
        user_id: &str,
        display_name: Option<String>,
        connection: ConnectionHandle,
    ) -> bool {
        let Some(mut meeting) = self.meetings.get_mut(meeting_id) else {
            return false;
        };

        if let Some(existing) = meeting
            .participants
            .iter_mut()
            .find(|p| p.user_id == user_id)
        {
            existing.connection = connection;
            existing.display_name = display_name;
            existing.alive = true;
            tracing::debug!(meeting = %meeting_id, user = %user_id, "participant reconnected");
        } else {
            meeting.participants.push(Participant {
                user_id: user_id.to_string(),
                display_name,
                connection,
                alive: true,
            });
            counter!(PARTICIPANT_JOINED).increment(1);
            tracing::debug!(meeting = %meeting_id, user = %user_id, "participant added");
        }
        true
    }

    pub fn remove_participant(&self, meeting_id: &str, user_id: &str) -> Option<Participant> {
        let mut meeting = self.meetings.get_mut(meeting_id)?;
        let index = meeting
            .participants
            .iter()
            .position(|p| p.user_id == user_id)?;
        Some(meeting.participants.remove(index))
    }

    /// Confirm liveness of the participant currently using `connection`
    pub fn mark_alive(&self, meeting_id: &str, connection: ConnectionId) -> bool {
        let Some(mut meeting) = self.meetings.get_mut(meeting_id) else {
            return false;
        };
        match meeting
            .participants
            .iter_mut()
            .find(|p| p.connection.id() == connection)
        {
            Some(participant) => {
                participant.alive = true;
                true
            },
            None => false,
        }
    }

    /// Remove a meeting and hand back its final state
    pub fn delete_meeting(&self, meeting_id: &str) -> Option<Meeting> {
        let removed = self.meetings.remove(meeting_id).map(|(_, meeting)| meeting);
        if removed.is_some() {
            gauge!(MEETING_ACTIVE).set(self.meetings.len() as f64);
        }
        removed
    }

    /// Visit every meeting with exclusive access; meetings for which the
    /// visitor answers [`Visit::Remove`] are dropped from the registry.
    pub fn for_each_meeting<F>(&self, mut visitor: F)
    where
        F: FnMut(&mut Meeting) -> Visit,
    {
        self.meetings
            .retain(|_, meeting| visitor(meeting) == Visit::Keep);
        gauge!(MEETING_ACTIVE).set(self.meetings.len() as f64);
    }

    pub fn meeting_count(&self) -> usize {
        self.meetings.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_lookup() {
        let registry = MeetingRegistry::new();
        let id = registry.create_meeting("Alice", "u1");

        assert!(registry.exists(&id));
        assert!(!registry.exists("never-created"));

        let info = registry.get_metadata(&id).unwrap();
        assert_eq!(info.id, id);
        assert_eq!(info.host_id, "u1");
        assert_eq!(info.host_name, "Alice");
        assert!(registry.list_participants(&id).is_empty());
    }

    #[test]
    fn test_ids_are_unique_uuids() {
        let registry = MeetingRegistry::new();
        let a = registry.create_meeting("Alice", "u1");
        let b = registry.create_meeting("Alice", "u1");
        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
        assert_eq!(registry.meeting_count(), 2);
    }

    #[test]
    fn test_metadata_of_missing_meeting() {
        let registry = MeetingRegistry::new();
        assert!(matches!(
            registry.get_metadata("nope"),
            Err(AppError::MeetingNotFound(_))
        ));
    }

    #[test]
    fn test_upsert_keeps_one_record_per_user() {
        let registry = MeetingRegistry::new();
        let id = registry.create_meeting("Alice", "u1");
        let (first, _rx1) = ConnectionHandle::channel(4);
        let (other, _rx2) = ConnectionHandle::channel(4);
        let (second, _rx3) = ConnectionHandle::channel(4);

        assert!(registry.upsert_participant(&id, "u1", Some("Alice".into()), first));
        assert!(registry.upsert_participant(&id, "u2", Some("Bob".into()), other));
        assert!(registry.upsert_participant(&id, "u1", Some("Alice 2".into()), second.clone()));

        let participants = registry.list_participants(&id);
        assert_eq!(participants.len(), 2);
        // rejoin keeps the original position
        assert_eq!(participants[0].user_id, "u1");
        assert_eq!(participants[0].connection.id(), second.id());
        assert_eq!(participants[0].display_name.as_deref(), Some("Alice 2"));
        assert_eq!(participants[1].user_id, "u2");
    }

    #[test]
    fn test_upsert_restores_liveness() {
        let registry = MeetingRegistry::new();
        let id = registry.create_meeting("Alice", "u1");
        let (conn, _rx) = ConnectionHandle::channel(4);
        registry.upsert_participant(&id, "u1", None, conn.clone());

        registry.for_each_meeting(|meeting| {
            meeting.participants[0].alive = false;
            Visit::Keep
        });
        assert!(!registry.find_participant(&id, "u1").unwrap().alive);

        registry.upsert_participant(&id, "u1", None, conn);
        assert!(registry.find_participant(&id, "u1").unwrap().alive);
    }

    #[test]
    fn test_upsert_into_missing_meeting_is_ignored() {
        let registry = MeetingRegistry::new();
        let (conn, _rx) = ConnectionHandle::channel(4);
        assert!(!registry.upsert_participant("ghost", "u1", None, conn));
        assert!(!registry.exists("ghost"));
        assert!(registry.find_participant("ghost", "u1").is_none());
    }

    #[test]
    fn test_remove_participant_and_meeting() {
        let registry = MeetingRegistry::new();
        let id = registry.create_meeting("Alice", "u1");
        let (conn, _rx) = ConnectionHandle::channel(4);
        registry.upsert_participant(&id, "u1", None, conn);

        assert!(registry.remove_participant(&id, "u1").is_some());
        assert!(registry.remove_participant(&id, "u1").is_none());
        // a meeting without participants is still a meeting
        assert!(registry.exists(&id));

        assert!(registry.delete_meeting(&id).is_some());
        assert!(!registry.exists(&id));
        assert!(registry.delete_meeting(&id).is_none());
    }

    #[test]
    fn test_mark_alive_by_connection() {
        let registry = MeetingRegistry::new();
        let id = registry.create_meeting("Alice", "u1");
        let (conn, _rx) = ConnectionHandle::channel(4);
        let (stranger, _rx2) = ConnectionHandle::channel(4);
        registry.upsert_participant(&id, "u1", None, conn.clone());

        assert!(registry.mark_alive(&id, conn.id()));
        assert!(!registry.mark_alive(&id, stranger.id()));
        assert!(!registry.mark_alive("ghost", conn.id()));
    }

    #[test]
    fn test_for_each_meeting_can_remove() {
        let registry = MeetingRegistry::new();
        let keep = registry.create_meeting("Alice", "u1");
        let drop_me = registry.create_meeting("Bob", "u2");

        let mut seen = 0;
        registry.for_each_meeting(|meeting| {
            seen += 1;
            if meeting.id() == drop_me {
                Visit::Remove
            } else {
                Visit::Keep
            }
        });

        assert_eq!(seen, 2);
        assert!(registry.exists(&keep));
        assert!(!registry.exists(&drop_me));
    }

    #[test]
    fn test_concurrent_upserts_keep_one_record_per_user() {
        let registry = MeetingRegistry::new();
        let id = registry.create_meeting("Alice", "u1");

        std::thread::scope(|scope| {
            for _ in 0..16 {
                scope.spawn(|| {
                    let mut receivers = Vec::new();
                    for _ in 0..200 {
                        let (conn, rx) = ConnectionHandle::channel(1);
                        assert!(registry.upsert_participant(&id, "u1", None, conn));
                        receivers.push(rx);
                    }
                });
            }
        });

        assert_eq!(registry.list_participants(&id).len(), 1);
    }

    #[test]
    fn test_concurrent_join_and_remove_never_duplicates() {
        let registry = MeetingRegistry::new();
        let id = registry.create_meeting("Alice", "u1");

        std::thread::scope(|scope| {
            for worker in 0..8 {
                let registry = &registry;
                let id = &id;
                scope.spawn(move || {
                    for round in 0..200 {
                        if (worker + round) % 3 == 0 {
                            registry.remove_participant(id, "u1");
                        } else {
                            let (conn, _rx) = ConnectionHandle::channel(1);
                            registry.upsert_participant(id, "u1", None, conn);
                        }
                        assert!(registry.list_participants(id).len() <= 1);
                    }
                });
            }
        });

        assert!(registry.list_participants(&id).len() <= 1);
    }
}

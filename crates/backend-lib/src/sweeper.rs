// ============================
// meeting-relay-lib/src/sweeper.rs
// ============================
//! Periodic liveness sweep.
//!
//! Every pass ends meetings older than the maximum lifetime and evicts
//! participants whose socket is closed or who sent no `heartbeat` since the
//! previous pass.
use crate::config::Settings;
use crate::metrics::{MEETING_EXPIRED, PARTICIPANT_EVICTED};
use crate::registry::{Meeting, MeetingRegistry, Visit};
use chrono::{DateTime, Utc};
use meeting_relay_common::{Envelope, MessageType};
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Outcome of one pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_meetings: usize,
    pub evicted_participants: usize,
}

#[derive(Debug, Clone)]
pub struct Sweeper {
    registry: Arc<MeetingRegistry>,
    interval: Duration,
    max_meeting_age: Duration,
}

impl Sweeper {
    pub fn new(registry: Arc<MeetingRegistry>, interval: Duration, max_meeting_age: Duration) -> Self {
        Self {
            registry,
            interval,
            max_meeting_age,
        }
    }

    pub fn from_settings(registry: Arc<MeetingRegistry>, settings: &Settings) -> Self {
        Self::new(registry, settings.sweep_interval(), settings.max_meeting_age())
    }

    /// Run a pass against the current wall clock
    pub fn sweep(&self) -> SweepReport {
        self.sweep_at(Utc::now())
    }

    /// Run a pass as if the time were `now`
    pub fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        self.registry.for_each_meeting(|meeting| {
            if self.is_expired(meeting, now) {
                end_meeting_by_system(meeting);
                report.expired_meetings += 1;
                return Visit::Remove;
            }
            report.evicted_participants += evict_dead_participants(meeting);
            Visit::Keep
        });

        if report != SweepReport::default() {
            tracing::info!(
                expired_meetings = report.expired_meetings,
                evicted_participants = report.evicted_participants,
                active_meetings = self.registry.meeting_count(),
                "liveness sweep"
            );
        }
        report
    }

    fn is_expired(&self, meeting: &Meeting, now: DateTime<Utc>) -> bool {
        (now - meeting.start_time())
            .to_std()
            .is_ok_and(|age| age >= self.max_meeting_age)
    }

    /// Sweep forever on a fixed period; the first pass runs one period after
    /// the call
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::debug!(interval = ?self.interval, "sweeper started");
            loop {
                ticker.tick().await;
                self.sweep();
            }
        })
    }
}

fn end_meeting_by_system(meeting: &mut Meeting) {
    let ended = Envelope::new(MessageType::EndMeeting);
    for participant in meeting.participants.drain(..) {
        participant.connection.send(&ended);
        participant.connection.close();
    }
    counter!(MEETING_EXPIRED).increment(1);
    tracing::info!(meeting = %meeting.id(), "meeting expired");
}

/// Drop participants that are closed or missed the heartbeat challenge, tell
/// the survivors, and re-arm the challenge for the next pass
fn evict_dead_participants(meeting: &mut Meeting) -> usize {
    let (dead, mut alive): (Vec<_>, Vec<_>) = std::mem::take(&mut meeting.participants)
        .into_iter()
        .partition(|p| !p.connection.is_open() || !p.alive);

    for participant in &mut alive {
        participant.alive = false;
    }
    meeting.participants = alive;

    for gone in &dead {
        let left = Envelope::for_user(MessageType::UserLeft, &gone.user_id);
        for survivor in &meeting.participants {
            survivor.connection.send(&left);
        }
        gone.connection.close();
        counter!(PARTICIPANT_EVICTED).increment(1);
        tracing::debug!(meeting = %meeting.id(), user = %gone.user_id, "participant evicted");
    }
    dead.len()
}

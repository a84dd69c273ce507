// ==============
// crates/backend-lib/src/metrics.rs

//! Central place for metric keys
pub const WS_CONNECTION: &str = "ws.connection";
pub const WS_ACTIVE: &str = "ws.active";
pub const WS_FRAME_DROPPED: &str = "ws.frame_dropped";
pub const MEETING_CREATED: &str = "meeting.created";
pub const MEETING_ENDED: &str = "meeting.ended";
pub const MEETING_EXPIRED: &str = "meeting.expired";
pub const MEETING_ACTIVE: &str = "meeting.active";
pub const PARTICIPANT_JOINED: &str = "participant.joined";
pub const PARTICIPANT_EVICTED: &str = "participant.evicted";
pub const SIGNAL_RELAYED: &str = "signal.relayed";

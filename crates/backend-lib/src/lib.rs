// ============================
// meeting-relay-lib/src/lib.rs
// ============================
//! WebRTC signaling relay: meeting registry, signaling hub and liveness
//! sweeper, served over axum.

pub mod config;
pub mod connection;
pub mod error;
pub mod handlers;
pub mod hub;
pub mod metrics;
pub mod registry;
pub mod sweeper;
pub mod ws_router;

use crate::config::Settings;
use crate::hub::SignalingHub;
use crate::registry::MeetingRegistry;
use crate::sweeper::Sweeper;
use std::sync::Arc;

/// Application state shared across all handlers
#[derive(Clone, Debug)]
pub struct AppState {
    /// Active meetings
    pub registry: Arc<MeetingRegistry>,
    /// Signaling dispatcher, shares `registry`
    pub hub: SignalingHub,
    /// Settings the server was started with
    pub settings: Arc<Settings>,
}

impl AppState {
    /// Create a new application state with an empty registry
    pub fn new(settings: Settings) -> Self {
        let registry = Arc::new(MeetingRegistry::new());
        let hub = SignalingHub::new(registry.clone());
        Self {
            registry,
            hub,
            settings: Arc::new(settings),
        }
    }

    /// Sweeper bound to this state's registry and settings
    pub fn sweeper(&self) -> Sweeper {
        Sweeper::from_settings(self.registry.clone(), &self.settings)
    }
}

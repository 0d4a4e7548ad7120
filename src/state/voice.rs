use crate::api::models::VoiceRoom;
use crate::error::{ApiError, Result};

pub const INTRO: &str = "Start a voice conversation with Virtual-G. \
Voice chat uses 100 credits to start and additional credits based on usage.";

#[derive(Debug, Clone, PartialEq)]
pub enum VoicePhase {
    Idle,
    Connecting { room_name: String },
    Connected(VoiceRoom),
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomOutcome {
    /// The overlay is still waiting for this room; open the link.
    Join,
    /// Nobody is waiting for this room any more.
    Abandon(String),
}

/// Lifecycle of the voice overlay. Media is the room service's business;
/// this only tracks whether a room exists and must be torn down.
#[derive(Debug)]
pub struct VoiceOverlay {
    phase: VoicePhase,
}

impl Default for VoiceOverlay {
    fn default() -> Self {
        Self { phase: VoicePhase::Idle }
    }
}

impl VoiceOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> &VoicePhase {
        &self.phase
    }

    pub fn start_label(&self) -> &'static str {
        match self.phase {
            VoicePhase::Connecting { .. } => "Connecting...",
            _ => "Start Voice Chat",
        }
    }

    /// Returns the room name to request, only from idle.
    pub fn start(&mut self) -> Option<String> {
        if self.phase != VoicePhase::Idle {
            return None;
        }
        let room_name = crate::utils::voice_room_name();
        self.phase = VoicePhase::Connecting { room_name: room_name.clone() };
        Some(room_name)
    }

    /// Result of `create_voice_room` for `requested`. A 402 shows the
    /// shortfall message. A room that arrives after the overlay was closed
    /// or restarted is handed back as [`RoomOutcome::Abandon`] and must be
    /// ended server-side.
    pub fn room_created(&mut self, requested: &str, result: Result<VoiceRoom>) -> Result<RoomOutcome> {
        let current = matches!(&self.phase, VoicePhase::Connecting { room_name } if room_name == requested);
        match result {
            Ok(room) if current => {
                self.phase = VoicePhase::Connected(room);
                Ok(RoomOutcome::Join)
            }
            Ok(room) => Ok(RoomOutcome::Abandon(room.room_name)),
            Err(e) => {
                if current {
                    let msg = match &e {
                        ApiError::InsufficientCredits(s) => s.message.clone(),
                        other => format!("Failed to start voice chat: {}", other.user_message()),
                    };
                    self.phase = VoicePhase::Error(msg);
                }
                Err(e)
            }
        }
    }

    /// The signalling link failed after the room was created.
    pub fn link_failed(&mut self, message: String) -> Option<String> {
        let room = self.end();
        self.phase = VoicePhase::Error(message);
        room
    }

    /// "Try again" from the error screen.
    pub fn retry(&mut self) {
        if matches!(self.phase, VoicePhase::Error(_)) {
            self.phase = VoicePhase::Idle;
        }
    }

    /// Back to idle. Returns the room to end server-side, if one was created.
    pub fn end(&mut self) -> Option<String> {
        match std::mem::replace(&mut self.phase, VoicePhase::Idle) {
            VoicePhase::Connected(room) => Some(room.room_name),
            _ => None,
        }
    }
}
